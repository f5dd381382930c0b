//! # docroot
//!
//! Everything pagesrv knows about the document root on disk.
//!
//! ## Contents
//! - **Paths**: request targets resolved to canonical, root-relative cache keys
//! - **Files**: whole-file loads for GET, body writes for POST
//! - **MIME**: content type from file extension
//! - **Listings**: HTML index pages for directories

#![warn(missing_docs)]

mod error;
mod file;
mod listing;
mod mime;
mod path;

pub use error::{Error, Result};
pub use file::{load, save};
pub use listing::{size_label, DirIndex, EntryKind, ListingRow, Rows};
pub use mime::{mime_type_for, DEFAULT_MIME_TYPE};
pub use path::{DocRoot, Resolved};
