//! Error types for docroot

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for docroot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for document root access
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Nothing exists at the path
    NotFound(PathBuf),

    /// Path exists but is not a regular file
    NotAFile(PathBuf),

    /// Request target cannot be mapped inside the root
    InvalidPath(String),
}

impl Error {
    /// True when the request should be answered with "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::NotAFile(_) | Error::InvalidPath(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::NotFound(path) => write!(f, "Not found: {}", path.display()),
            Error::NotAFile(path) => write!(f, "Not a regular file: {}", path.display()),
            Error::InvalidPath(target) => write!(f, "Invalid request path: {}", target),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
