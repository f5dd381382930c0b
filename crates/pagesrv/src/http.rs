//! HTTP/1.1 request parser and response serializer
//!
//! One request per connection: the head is read up to the blank line, then
//! `Content-Length` bytes of body. Responses always carry `Connection: close`.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use nom::{
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, crlf, space0},
    combinator::all_consuming,
    multi::many0,
    sequence::{delimited, terminated, tuple},
    IResult,
};
use std::fmt;

/// Maximum request size (head + body) - matches a 64K receive buffer
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

const HEAD_END: &[u8] = b"\r\n\r\n";

/// Request method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// Anything else, kept verbatim
    Other(String),
}

impl Method {
    fn from_bytes(raw: &[u8]) -> Self {
        match raw {
            b"GET" => Method::Get,
            b"POST" => Method::Post,
            other => Method::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Other(m) => write!(f, "{}", m),
        }
    }
}

/// Request parse failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request line or headers do not follow HTTP syntax
    Malformed(String),
    /// Head or declared body exceeds [`MAX_REQUEST_SIZE`]
    TooLarge(usize),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Malformed(msg) => write!(f, "malformed request: {}", msg),
            ParseError::TooLarge(size) => write!(
                f,
                "request too large: {} bytes (max: {} bytes)",
                size, MAX_REQUEST_SIZE
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method
    pub method: Method,
    /// Raw request target (path, possibly with query)
    pub target: String,
    /// Header fields in arrival order
    pub headers: Vec<(String, String)>,
    /// Body bytes (empty unless `Content-Length` was sent)
    pub body: Bytes,
}

impl Request {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse one request from the front of `buf`
    ///
    /// Returns `Ok(None)` while more data is needed. On success the request's
    /// bytes are consumed from `buf`.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Request>, ParseError> {
        let head_end = match find(&buf[..], HEAD_END) {
            Some(pos) => pos,
            None if buf.len() > MAX_REQUEST_SIZE => {
                return Err(ParseError::TooLarge(buf.len()))
            }
            None => return Ok(None),
        };

        // Keep the CRLF that ends the last header line
        let head = &buf[..head_end + 2];
        let (_, ((method, target), headers)) = all_consuming(request_head)(head)
            .map_err(|e| ParseError::Malformed(format!("{:?}", e.map(|e| e.code))))?;

        let method = Method::from_bytes(method);
        let target = String::from_utf8(target.to_vec())
            .map_err(|_| ParseError::Malformed("target is not UTF-8".to_string()))?;
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| {
                (
                    String::from_utf8_lossy(k).into_owned(),
                    String::from_utf8_lossy(v).trim_end().to_string(),
                )
            })
            .collect();

        let body_len = match headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        {
            Some((_, v)) => v
                .parse::<usize>()
                .map_err(|_| ParseError::Malformed(format!("bad Content-Length: {}", v)))?,
            None => 0,
        };

        let body_start = head_end + HEAD_END.len();
        let total = body_start.saturating_add(body_len);
        if total > MAX_REQUEST_SIZE {
            return Err(ParseError::TooLarge(total));
        }
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame = buf.split_to(total);
        let body = frame.split_off(body_start).freeze();

        Ok(Some(Request {
            method,
            target,
            headers,
            body,
        }))
    }
}

fn is_token(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&c)
}

type Head<'a> = ((&'a [u8], &'a [u8]), Vec<(&'a [u8], &'a [u8])>);

/// `METHOD SP TARGET SP HTTP/x.y CRLF`
fn request_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    let (input, (method, target, _version)) = tuple((
        terminated(take_while1(is_token), char(' ')),
        terminated(take_while1(|c: u8| c > b' ' && c != 0x7f), char(' ')),
        terminated(
            tuple((tag("HTTP/"), take_while1(|c: u8| c.is_ascii_digit() || c == b'.'))),
            crlf,
        ),
    ))(input)?;
    Ok((input, (method, target)))
}

/// `NAME ":" OWS VALUE CRLF`
fn header_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    tuple((
        terminated(take_while1(is_token), char(':')),
        delimited(space0, take_till(|c: u8| c == b'\r' || c == b'\n'), crlf),
    ))(input)
}

fn request_head(input: &[u8]) -> IResult<&[u8], Head<'_>> {
    tuple((request_line, many0(header_line)))(input)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 200
    Ok,
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 500
    InternalServerError,
    /// 503
    ServiceUnavailable,
}

impl Status {
    /// Numeric status code
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::InternalServerError => 500,
            Status::ServiceUnavailable => 503,
        }
    }

    /// Reason phrase
    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "BAD REQUEST",
            Status::NotFound => "NOT FOUND",
            Status::MethodNotAllowed => "METHOD NOT ALLOWED",
            Status::InternalServerError => "INTERNAL SERVER ERROR",
            Status::ServiceUnavailable => "SERVICE UNAVAILABLE",
        }
    }
}

/// Assembled response would exceed the configured frame size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTooLarge {
    /// Size the frame would have had
    pub size: usize,
    /// Configured maximum
    pub max: usize,
}

impl fmt::Display for FrameTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "response too large: {} bytes (max: {} bytes)",
            self.size, self.max
        )
    }
}

impl std::error::Error for FrameTooLarge {}

/// Response ready to be framed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status line
    pub status: Status,
    /// `Content-Type` value
    pub content_type: String,
    /// Body
    pub body: Bytes,
}

impl Response {
    /// Build a response
    pub fn new(status: Status, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Plain text response with a trailing newline
    pub fn text(status: Status, message: &str) -> Self {
        Self::new(status, "text/plain", format!("{}\n", message))
    }

    /// Serialize with the current time in the `Date` header
    pub fn serialize(&self, max_frame: usize) -> Result<Vec<u8>, FrameTooLarge> {
        self.serialize_at(Utc::now(), max_frame)
    }

    /// Size of the serialized frame (head + body)
    ///
    /// The `Date` header has a fixed width, so this does not depend on when
    /// the frame is built.
    pub fn frame_len(&self) -> usize {
        self.head(Utc::now()).len() + self.body.len()
    }

    /// Serialize the full frame, refusing to build one larger than `max_frame`
    pub fn serialize_at(&self, date: DateTime<Utc>, max_frame: usize) -> Result<Vec<u8>, FrameTooLarge> {
        let head = self.head(date);

        let size = head.len() + self.body.len();
        if size > max_frame {
            return Err(FrameTooLarge {
                size,
                max: max_frame,
            });
        }

        let mut frame = Vec::with_capacity(size);
        frame.extend_from_slice(head.as_bytes());
        frame.extend_from_slice(&self.body);
        Ok(frame)
    }

    fn head(&self, date: DateTime<Utc>) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Date: {}\r\n\
             Connection: close\r\n\
             Content-Length: {}\r\n\
             Content-Type: {}\r\n\
             \r\n",
            self.status.code(),
            self.status.reason(),
            date.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.body.len(),
            self.content_type,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_get() {
        let mut buf = BytesMut::from(&b"GET /docs/a.txt HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n"[..]);
        let req = Request::parse(&mut buf).unwrap().unwrap();

        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/docs/a.txt");
        assert_eq!(req.header("host"), Some("localhost"));
        assert_eq!(req.header("ACCEPT"), Some("*/*"));
        assert!(req.body.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_no_headers() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.0\r\n\r\n"[..]);
        let req = Request::parse(&mut buf).unwrap().unwrap();
        assert_eq!(req.target, "/");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_parse_post_body() {
        let mut buf = BytesMut::from(
            &b"POST /save/note.txt HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello"[..],
        );
        let req = Request::parse(&mut buf).unwrap().unwrap();

        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body.as_ref(), b"hello");
    }

    #[test]
    fn test_incomplete_head() {
        let mut buf = BytesMut::from(&b"GET /index.html HTTP/1.1\r\nHost: x\r\n"[..]);
        assert!(Request::parse(&mut buf).unwrap().is_none());
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_incomplete_body() {
        let mut buf = BytesMut::from(&b"POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"[..]);
        assert!(Request::parse(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"defghij");
        let req = Request::parse(&mut buf).unwrap().unwrap();
        assert_eq!(req.body.as_ref(), b"abcdefghij");
    }

    #[test]
    fn test_other_method() {
        let mut buf = BytesMut::from(&b"DELETE /a HTTP/1.1\r\n\r\n"[..]);
        let req = Request::parse(&mut buf).unwrap().unwrap();
        assert_eq!(req.method, Method::Other("DELETE".to_string()));
        assert_eq!(req.method.to_string(), "DELETE");
    }

    #[test]
    fn test_malformed_request_line() {
        let mut buf = BytesMut::from(&b"GARBAGE\r\n\r\n"[..]);
        assert!(matches!(
            Request::parse(&mut buf),
            Err(ParseError::Malformed(_))
        ));

        let mut buf = BytesMut::from(&b"GET /a FTP/1.1\r\n\r\n"[..]);
        assert!(Request::parse(&mut buf).is_err());
    }

    #[test]
    fn test_malformed_header() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nno colon here\r\n\r\n"[..]);
        assert!(matches!(
            Request::parse(&mut buf),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_bad_content_length() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n"[..]);
        assert!(matches!(
            Request::parse(&mut buf),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_too_large() {
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 1000000\r\n\r\n"[..]);
        assert!(matches!(
            Request::parse(&mut buf),
            Err(ParseError::TooLarge(_))
        ));

        let mut buf = BytesMut::from(&vec![b'a'; MAX_REQUEST_SIZE + 1][..]);
        assert!(matches!(
            Request::parse(&mut buf),
            Err(ParseError::TooLarge(_))
        ));
    }

    #[test]
    fn test_serialize_frame() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let resp = Response::new(Status::Ok, "text/html", "<p>hi</p>");
        let frame = resp.serialize_at(date, 4096).unwrap();

        let expected = "HTTP/1.1 200 OK\r\n\
                        Date: Tue, 02 Jan 2024 03:04:05 GMT\r\n\
                        Connection: close\r\n\
                        Content-Length: 9\r\n\
                        Content-Type: text/html\r\n\
                        \r\n\
                        <p>hi</p>";
        assert_eq!(String::from_utf8(frame).unwrap(), expected);
    }

    #[test]
    fn test_serialize_binary_length() {
        let body = vec![0u8, 159, 146, 150];
        let frame = Response::new(Status::Ok, "application/octet-stream", body.clone())
            .serialize(4096)
            .unwrap();

        assert!(frame.ends_with(&body));
        let text = String::from_utf8_lossy(&frame);
        assert!(text.contains("Content-Length: 4\r\n"));
    }

    #[test]
    fn test_serialize_too_large() {
        let resp = Response::new(Status::Ok, "text/plain", vec![b'x'; 1000]);
        let err = resp.serialize(512).unwrap_err();
        assert_eq!(err.max, 512);
        assert!(err.size > 1000);
        assert_eq!(err.size, resp.frame_len());
    }

    #[test]
    fn test_frame_len_matches_serialized() {
        let resp = Response::new(Status::NotFound, "text/html", "<h1>404</h1>");
        let frame = resp.serialize(4096).unwrap();
        assert_eq!(frame.len(), resp.frame_len());
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(Status::NotFound.code(), 404);
        assert_eq!(Status::NotFound.reason(), "NOT FOUND");
        assert_eq!(Status::ServiceUnavailable.code(), 503);
    }
}
