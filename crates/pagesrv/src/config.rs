//! Runtime configuration shared by all connections

use anyhow::{ensure, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default freshness window for cached responses
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(60);

/// Default time a client may take to send its request
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on an assembled response (headers + body)
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// Server settings, validated once at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Document root served by GET and written by POST
    pub root: PathBuf,
    /// System files directory (holds `404.html`)
    pub files: PathBuf,
    /// Maximum number of cached responses
    pub capacity: usize,
    /// Cached responses at least this old are regenerated
    pub staleness: Duration,
    /// Connections served concurrently before new ones get 503
    pub max_connections: usize,
    /// Largest response frame that will be sent
    pub max_response_bytes: usize,
    /// Idle limit while reading a request; the connection is dropped after it
    pub read_timeout: Duration,
}

impl ServerConfig {
    /// Config with default limits for the given directories
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(root: P1, files: P2) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            files: files.as_ref().to_path_buf(),
            capacity: 10,
            staleness: DEFAULT_STALENESS,
            max_connections: 256,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Location of the page sent with 404 responses
    pub fn not_found_page(&self) -> PathBuf {
        self.files.join("404.html")
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.capacity > 0, "cache capacity must be greater than 0");
        ensure!(
            self.max_connections > 0,
            "max connections must be greater than 0"
        );
        ensure!(
            self.max_response_bytes > 0,
            "max response size must be greater than 0"
        );
        ensure!(
            !self.read_timeout.is_zero(),
            "read timeout must be greater than 0"
        );
        ensure!(
            self.root.is_dir(),
            "document root {:?} is not a directory",
            self.root
        );
        Ok(())
    }
}
