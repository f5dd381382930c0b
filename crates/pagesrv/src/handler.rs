//! Request handler: routes requests and fronts the disk with the response cache

use crate::config::ServerConfig;
use crate::http::{Method, Request, Response, Status};
use docroot::{DirIndex, DocRoot, Resolved};
use pagecache::{CacheEntry, Lookup, ResponseCache};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn, Level};

const ROOT_INDEX: &str = "/index.html";
const DICE_PATH: &str = "/d20";

#[derive(Serialize)]
struct SaveStatus {
    status: &'static str,
}

pub struct RequestHandler {
    config: Arc<ServerConfig>,
    docroot: DocRoot,
    cache: Arc<ResponseCache>,
}

impl RequestHandler {
    pub fn new(config: Arc<ServerConfig>, cache: Arc<ResponseCache>) -> Self {
        let docroot = DocRoot::new(&config.root);
        Self {
            config,
            docroot,
            cache,
        }
    }

    pub fn handle(&self, req: &Request) -> Response {
        match &req.method {
            Method::Get => self.handle_get(&req.target),
            Method::Post => self.handle_post(req),
            Method::Other(method) => {
                debug!("Unsupported method {}", method);
                Response::text(Status::MethodNotAllowed, "method not allowed")
            }
        }
    }

    fn handle_get(&self, target: &str) -> Response {
        let resolved = match self.docroot.resolve(target) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("Rejected target {}: {}", target, e);
                return self.not_found();
            }
        };

        match resolved.key.as_str() {
            DICE_PATH => self.handle_d20(),
            "/" => match self.docroot.resolve(ROOT_INDEX) {
                Ok(index) => self.serve_file(&index),
                Err(_) => self.not_found(),
            },
            _ if resolved.is_dir() => self.serve_directory(&resolved),
            _ => self.serve_file(&resolved),
        }
    }

    fn handle_d20(&self) -> Response {
        let roll: u8 = rand::rng().random_range(1..=20);
        Response::text(Status::Ok, &roll.to_string())
    }

    fn handle_post(&self, req: &Request) -> Response {
        let (target, body) = (&req.target, &req.body);
        let resolved = match self.docroot.resolve(target) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("Rejected POST target {}: {}", target, e);
                return self.not_found();
            }
        };

        match docroot::save(&resolved.path, body) {
            Ok(()) => {
                debug!(
                    "Saved {} bytes ({}) to {:?}",
                    body.len(),
                    req.header("content-type").unwrap_or("untyped"),
                    resolved.path
                );
                save_status(Status::Ok, "ok")
            }
            Err(e) => {
                error!("Failed to save {:?}: {}", resolved.path, e);
                save_status(Status::InternalServerError, "error")
            }
        }
    }

    /// Fresh cached entry for `key`, dropping it first if stale
    fn cached(&self, key: &str) -> Option<Response> {
        match self.cache.lookup(key, self.config.staleness) {
            Lookup::Fresh(entry) => {
                debug!("Cache hit {}", key);
                Some(from_entry(&entry))
            }
            Lookup::Expired => {
                debug!("Cache entry for {} is stale; regenerating", key);
                None
            }
            Lookup::Missing => {
                debug!("Cache miss {}", key);
                None
            }
        }
    }

    /// Cache `content` under `key` unless its response could never be sent
    fn store(&self, key: &str, content_type: &str, content: Vec<u8>) -> Response {
        let response = Response::new(Status::Ok, content_type, content);
        let frame_len = response.frame_len();
        if frame_len > self.config.max_response_bytes {
            warn!(
                "{} frames to {} bytes (max {}); not caching",
                key, frame_len, self.config.max_response_bytes
            );
            return response;
        }

        let entry = self.cache.put(key, content_type, response.body);
        if tracing::enabled!(Level::DEBUG) {
            self.cache.log_snapshot();
        }
        from_entry(&entry)
    }

    fn serve_file(&self, resolved: &Resolved) -> Response {
        if let Some(response) = self.cached(&resolved.key) {
            return response;
        }

        match docroot::load(&resolved.path) {
            Ok(data) => {
                let content_type = docroot::mime_type_for(&resolved.path);
                self.store(&resolved.key, content_type, data)
            }
            Err(e) if e.is_not_found() => {
                debug!("{}: {}", resolved.key, e);
                self.not_found()
            }
            Err(e) => {
                warn!("Cannot read {:?}: {}", resolved.path, e);
                self.not_found()
            }
        }
    }

    fn serve_directory(&self, resolved: &Resolved) -> Response {
        if let Some(response) = self.cached(&resolved.key) {
            return response;
        }

        let page = DirIndex::new(&resolved.path, &resolved.key).render();
        self.store(&resolved.key, "text/html", page.into_bytes())
    }

    /// 404 with the system page; never cached
    fn not_found(&self) -> Response {
        let page = self.config.not_found_page();
        match docroot::load(&page) {
            Ok(data) => Response::new(Status::NotFound, docroot::mime_type_for(&page), data),
            Err(e) => {
                error!("Cannot find system 404 file {:?}: {}", page, e);
                Response::text(
                    Status::InternalServerError,
                    "server misconfigured: missing 404 page",
                )
            }
        }
    }
}

fn from_entry(entry: &CacheEntry) -> Response {
    Response::new(Status::Ok, entry.content_type(), entry.content().clone())
}

fn save_status(status: Status, label: &'static str) -> Response {
    let mut body = serde_json::to_vec(&SaveStatus { status: label }).unwrap_or_default();
    body.push(b'\n');
    Response::new(status, "application/json", body)
}
