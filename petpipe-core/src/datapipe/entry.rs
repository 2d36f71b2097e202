//! Raw archive entries
//!
//! A `(path, bytes)` pair produced by the resource loader, plus the path
//! accessors the pipeline stages key on.

use bytes::Bytes;
use std::path::Path;

/// One file from a resource archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Path of the file, as listed by the loader
    pub path: String,
    /// File content (zero-copy)
    pub data: Bytes,
}

impl RawEntry {
    /// Create a new entry
    pub fn new(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// Final path component, e.g. `Abyssinian_1.jpg`
    pub fn name(&self) -> &str {
        path_name(&self.path)
    }

    /// File name without its last extension, e.g. `Abyssinian_1`
    pub fn stem(&self) -> &str {
        path_stem(&self.path)
    }

    /// Last extension including the dot, e.g. `.jpg`; empty if none
    pub fn suffix(&self) -> &str {
        path_suffix(&self.path)
    }

    /// Name of the containing directory, e.g. `trimaps`
    pub fn parent_name(&self) -> &str {
        path_parent_name(&self.path)
    }

    /// Size of the content in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

pub fn path_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
}

pub fn path_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("")
}

pub fn path_suffix(path: &str) -> &str {
    let name = path_name(path);
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        // extension() excludes the dot; it always sits right before it
        Some(ext) => &name[name.len() - ext.len() - 1..],
        None => "",
    }
}

pub fn path_parent_name(path: &str) -> &str {
    Path::new(path)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("")
}
