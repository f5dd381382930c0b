//! Request target resolution
//!
//! A request target such as `/docs/../img/a%20b.png?x=1` becomes the cache key
//! `/img/a b.png` and the on-disk path `<root>/img/a b.png`.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Handle to the directory served over HTTP
#[derive(Debug, Clone)]
pub struct DocRoot {
    root: PathBuf,
}

/// A request target mapped inside the document root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Canonical root-relative path, always starting with `/`
    pub key: String,
    /// Location on disk
    pub path: PathBuf,
}

impl Resolved {
    /// Whether the resolved path currently names a directory
    ///
    /// Missing paths report `false` and are handled as files.
    pub fn is_dir(&self) -> bool {
        self.path.is_dir()
    }
}

impl DocRoot {
    /// Create a handle for the directory at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Map a request target onto the document root
    ///
    /// Query strings are ignored and `%xx` escapes decoded. Empty and `.`
    /// segments are dropped, `..` removes the previous segment.
    ///
    /// # Returns
    /// * `Err(Error::InvalidPath)` - bad escapes, NUL bytes, or `..` above the root
    pub fn resolve(&self, target: &str) -> Result<Resolved> {
        let raw = target.split(&['?', '#'][..]).next().unwrap_or("");
        let decoded =
            urlencoding::decode(raw).map_err(|_| Error::InvalidPath(target.to_string()))?;

        if decoded.contains('\0') {
            return Err(Error::InvalidPath(target.to_string()));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(Error::InvalidPath(target.to_string()));
                    }
                }
                name => segments.push(name),
            }
        }

        let mut path = self.root.clone();
        path.extend(&segments);

        Ok(Resolved {
            key: format!("/{}", segments.join("/")),
            path,
        })
    }
}
