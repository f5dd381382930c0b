//! Directory index pages
//!
//! Rows come from a fresh `read_dir` on every call to [`DirIndex::rows`], so a
//! listing can be enumerated any number of times. The `..` row is always
//! first; the remaining order is whatever the filesystem yields.

use std::fmt::Write as _;
use std::fs::{self, DirEntry, ReadDir};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::debug;

const STYLE: &str = "<style>table{\nborder: solid 1px;\n}\nth{\ncolor: blue;\ntext-decoration: underline;\n}\n</style>\n";

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file, or anything whose metadata could not be read
    File,
    /// Directory
    Directory,
}

impl EntryKind {
    fn label(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }
}

/// One row of a directory index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// Entry name (`..` for the parent row)
    pub name: String,
    /// File or directory
    pub kind: EntryKind,
    /// Last modification time, if it could be read
    pub modified: Option<DateTime<Local>>,
    /// Size in bytes; `None` for directories and unreadable entries
    pub size: Option<u64>,
}

impl ListingRow {
    fn parent(dir: &Path) -> Self {
        let modified = fs::metadata(dir.join(".."))
            .and_then(|meta| meta.modified())
            .ok()
            .map(local_time);

        Self {
            name: "..".to_string(),
            kind: EntryKind::Directory,
            modified,
            size: None,
        }
    }

    fn from_entry(entry: &DirEntry) -> Self {
        let name = entry.file_name().to_string_lossy().into_owned();

        // Follows symlinks so links to directories list as directories
        match fs::metadata(entry.path()) {
            Ok(meta) if meta.is_dir() => Self {
                name,
                kind: EntryKind::Directory,
                modified: meta.modified().ok().map(local_time),
                size: None,
            },
            Ok(meta) => Self {
                name,
                kind: EntryKind::File,
                modified: meta.modified().ok().map(local_time),
                size: Some(meta.len()),
            },
            Err(e) => {
                debug!("Unreadable entry {:?}: {}", entry.path(), e);
                Self {
                    name,
                    kind: EntryKind::File,
                    modified: None,
                    size: None,
                }
            }
        }
    }

    /// `YYYY-MM-DD HH:MM` in local time, or `-`
    pub fn modified_label(&self) -> String {
        match &self.modified {
            Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
            None => "-".to_string(),
        }
    }

    /// Human readable size, or `-` for directories
    pub fn size_label(&self) -> String {
        match (self.kind, self.size) {
            (EntryKind::File, Some(bytes)) => size_label(bytes),
            _ => "-".to_string(),
        }
    }
}

fn local_time(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}

/// Format a byte count using decimal units, truncating the quotient
///
/// `999` → `999b`, `1500` → `1kb`, `2_500_000` → `2mb`.
pub fn size_label(bytes: u64) -> String {
    const KB: u64 = 1_000;
    const MB: u64 = 1_000_000;
    const GB: u64 = 1_000_000_000;

    if bytes < KB {
        format!("{}b", bytes)
    } else if bytes < MB {
        format!("{}kb", bytes / KB)
    } else if bytes < GB {
        format!("{}mb", bytes / MB)
    } else {
        format!("{}gb", bytes / GB)
    }
}

/// Iterator over the rows of one directory snapshot
pub struct Rows {
    parent: Option<ListingRow>,
    entries: ReadDir,
}

impl Iterator for Rows {
    type Item = ListingRow;

    fn next(&mut self) -> Option<ListingRow> {
        if let Some(parent) = self.parent.take() {
            return Some(parent);
        }

        loop {
            match self.entries.next()? {
                Ok(entry) => {
                    let name = entry.file_name();
                    if name == "." || name == ".." {
                        continue;
                    }
                    return Some(ListingRow::from_entry(&entry));
                }
                Err(e) => {
                    debug!("Skipping directory entry: {}", e);
                }
            }
        }
    }
}

/// Index page generator for one directory
#[derive(Debug, Clone)]
pub struct DirIndex {
    dir: PathBuf,
    url_path: String,
}

impl DirIndex {
    /// Create a generator
    ///
    /// # Arguments
    /// * `dir` - Directory on disk
    /// * `url_path` - Path the directory is served under, used for links and titles
    pub fn new<P: AsRef<Path>>(dir: P, url_path: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            url_path: url_path.to_string(),
        }
    }

    /// Enumerate the directory, parent row first
    pub fn rows(&self) -> io::Result<Rows> {
        let entries = fs::read_dir(&self.dir)?;
        Ok(Rows {
            parent: Some(ListingRow::parent(&self.dir)),
            entries,
        })
    }

    /// Render the full HTML page
    ///
    /// Never fails: an unreadable directory produces a page with an error
    /// heading instead of a table.
    pub fn render(&self) -> String {
        let title = escape_html(&self.url_path);
        let mut page = String::with_capacity(4096);

        page.push_str("<!doctype html>\n<html><head>\n");
        let _ = writeln!(page, "<title>{} index</title>", title);
        page.push_str(STYLE);
        page.push_str("</head>\n<body>\n");
        let _ = writeln!(page, "<h1>index of {}</h1>", title);

        match self.rows() {
            Ok(rows) => {
                page.push_str("<table>\n<tr>\n<th>type</th>\n<th>name</th>\n<th>last modified</th>\n<th>size</th>\n</tr>\n");
                for row in rows {
                    self.push_row(&mut page, &row);
                }
                page.push_str("</table>\n");
            }
            Err(e) => {
                debug!("Cannot open directory {:?}: {}", self.dir, e);
                page.push_str("<h2>error opening directory!</h2>\n");
            }
        }

        page.push_str("</body>\n</html>");
        page
    }

    fn push_row(&self, page: &mut String, row: &ListingRow) {
        let href = format!(
            "{}/{}",
            self.url_path.trim_end_matches('/'),
            urlencoding::encode(&row.name)
        );
        let _ = write!(
            page,
            "<tr>\n<td>{}</td>\n<td><a href=\"{}\">{}</a></td>\n<td>{}</td><td>{}</td>\n</tr>\n",
            row.kind.label(),
            escape_html(&href),
            escape_html(&row.name),
            row.modified_label(),
            row.size_label(),
        );
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
