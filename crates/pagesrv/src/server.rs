//! Accept loop and per-connection request/response cycle

use anyhow::Result;
use bytes::BytesMut;
use pagecache::ResponseCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::handler::RequestHandler;
use crate::http::{Request, Response, Status};

/// Serve connections from `listener` until the task is dropped
///
/// Each connection runs in its own task holding one admission permit.
/// Connections arriving while all permits are taken get a 503.
pub async fn run(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    cache: Arc<ResponseCache>,
) -> Result<()> {
    let max_frame = config.max_response_bytes;
    let read_timeout = config.read_timeout;
    let limiter = Arc::new(Semaphore::new(config.max_connections));
    let handler = Arc::new(RequestHandler::new(config, cache));

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let permit = match Arc::clone(&limiter).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("Connection limit reached; rejecting {}", addr);
                        tokio::spawn(async move {
                            let busy = Response::text(Status::ServiceUnavailable, "server busy");
                            if let Err(e) = send(stream, &busy, max_frame).await {
                                debug!("Failed to reject {}: {}", addr, e);
                            }
                        });
                        continue;
                    }
                };

                debug!("New connection from {}", addr);
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, handler, max_frame, read_timeout).await {
                        error!("Error handling client {}: {}", addr, e);
                    }
                    drop(permit);
                    debug!("Connection closed: {}", addr);
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    handler: Arc<RequestHandler>,
    max_frame: usize,
    read_timeout: Duration,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);

    let request = loop {
        match Request::parse(&mut buffer) {
            Ok(Some(request)) => break request,
            Ok(None) => {}
            Err(e) => {
                warn!("Parse error: {}", e);
                let bad = Response::text(Status::BadRequest, &e.to_string());
                return send(stream, &bad, max_frame).await;
            }
        }

        let n = match tokio::time::timeout(read_timeout, stream.read_buf(&mut buffer)).await {
            Ok(read) => read?,
            Err(_) => {
                debug!("Client idle for {:?}; closing", read_timeout);
                return Ok(());
            }
        };
        if n == 0 {
            // Peer closed before sending a full request
            return Ok(());
        }
    };

    let method = request.method.clone();
    let target = request.target.clone();

    // Disk reads and listing generation block
    let response = tokio::task::spawn_blocking(move || handler.handle(&request)).await?;
    info!(
        "{} {} -> {} ({} bytes)",
        method,
        target,
        response.status.code(),
        response.body.len()
    );

    send(stream, &response, max_frame).await
}

/// Write one framed response and close the connection
///
/// Oversized frames are not written at all.
async fn send(mut stream: TcpStream, response: &Response, max_frame: usize) -> Result<()> {
    let frame = response.serialize(max_frame)?;
    stream.write_all(&frame).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::SocketAddr;
    use tempfile::TempDir;

    async fn start(configure: impl FnOnce(&mut ServerConfig)) -> (TempDir, SocketAddr) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let files = dir.path().join("files");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&files).unwrap();
        fs::write(root.join("index.html"), b"<h1>home</h1>").unwrap();
        fs::write(root.join("big.bin"), vec![b'x'; 4096]).unwrap();
        fs::write(files.join("404.html"), b"missing").unwrap();

        let mut config = ServerConfig::new(&root, &files);
        configure(&mut config);
        let cache = Arc::new(ResponseCache::new(config.capacity).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run(listener, Arc::new(config), cache));

        (dir, addr)
    }

    async fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn test_get_index() {
        let (_dir, addr) = start(|_| {}).await;
        let resp = roundtrip(addr, b"GET / HTTP/1.1\r\nHost: test\r\n\r\n").await;

        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Connection: close\r\n"));
        assert!(resp.contains("Content-Length: 13\r\n"));
        assert!(resp.contains("Content-Type: text/html\r\n"));
        assert!(resp.ends_with("\r\n\r\n<h1>home</h1>"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let (_dir, addr) = start(|_| {}).await;
        let resp = roundtrip(addr, b"GET /missing.txt HTTP/1.1\r\n\r\n").await;

        assert!(resp.starts_with("HTTP/1.1 404 NOT FOUND\r\n"));
        assert!(resp.ends_with("missing"));
    }

    #[tokio::test]
    async fn test_request_in_pieces() {
        let (_dir, addr) = start(|_| {}).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"GET /index.ht").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.write_all(b"ml HTTP/1.1\r\n\r\n").await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8_lossy(&out).ends_with("<h1>home</h1>"));
    }

    #[tokio::test]
    async fn test_post_roundtrip() {
        let (dir, addr) = start(|_| {}).await;
        let resp = roundtrip(
            addr,
            b"POST /saved/x.txt HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc",
        )
        .await;

        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Content-Type: application/json\r\n"));
        assert!(resp.ends_with("{\"status\":\"ok\"}\n"));
        assert_eq!(fs::read(dir.path().join("root/saved/x.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let (_dir, addr) = start(|_| {}).await;
        let resp = roundtrip(addr, b"NONSENSE\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 400 BAD REQUEST\r\n"));
    }

    #[tokio::test]
    async fn test_oversized_response_not_sent() {
        let (_dir, addr) = start(|c| c.max_response_bytes = 1024).await;
        let resp = roundtrip(addr, b"GET /big.bin HTTP/1.1\r\n\r\n").await;
        assert!(resp.is_empty());

        // Smaller responses still go out
        let resp = roundtrip(addr, b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_idle_client_releases_permit() {
        let (_dir, addr) = start(|c| {
            c.max_connections = 1;
            c.read_timeout = std::time::Duration::from_millis(100);
        })
        .await;

        // Never sends anything
        let mut idle = TcpStream::connect(addr).await.unwrap();
        let mut out = Vec::new();
        idle.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());

        let resp = roundtrip(addr, b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_admission_limit() {
        let (_dir, addr) = start(|c| c.max_connections = 1).await;

        // Holds the only permit until it sends a request
        let mut first = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut rejected = Vec::new();
        second.read_to_end(&mut rejected).await.unwrap();
        let rejected = String::from_utf8_lossy(&rejected);
        assert!(rejected.starts_with("HTTP/1.1 503 SERVICE UNAVAILABLE\r\n"));

        first.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut out = Vec::new();
        first.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8_lossy(&out).starts_with("HTTP/1.1 200 OK\r\n"));
    }
}
