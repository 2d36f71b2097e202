//! Error types for the pet pipeline
//!
//! Covers parsing, dataset configuration, resource loading and decode errors.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for all pipeline operations
#[derive(Debug, Error)]
pub enum PetError {
    // ========== Parse Errors ==========

    /// Classification line had the wrong number of fields
    #[error("Malformed line {line} in {path}: expected {expected} fields, found {found}")]
    MalformedLine {
        path: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Text entry is not valid UTF-8
    #[error("Invalid UTF-8 in {path} at byte {offset}")]
    InvalidEncoding { path: String, offset: usize },

    /// Label field is not an integer
    #[error("Invalid label {value:?} for image {image_id}")]
    InvalidLabel { image_id: String, value: String },

    // ========== Dataset Errors ==========

    /// Label does not index into the category table
    #[error("Label {label} out of range for {categories} categories (category table mismatch?)")]
    LabelOutOfRange { label: i64, categories: usize },

    /// Split name not recognized
    #[error("Unknown split: {name} (expected trainval, test or train)")]
    UnknownSplit { name: String },

    /// Invalid shard specification
    #[error("Invalid shard spec: {reason}")]
    InvalidShardSpec { reason: String },

    // ========== Resource Errors ==========

    /// HTTP download failed
    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// Server refused the request (4xx); retrying will not help
    #[error("Download of {url} rejected with status {status}")]
    Rejected { url: String, status: u16 },

    /// Archive digest does not match the resource descriptor
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Archive could not be extracted
    #[error("Archive {path:?} could not be extracted: {message}")]
    Archive { path: PathBuf, message: String },

    /// Filesystem operation failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ========== Decode Errors ==========

    /// Image bytes could not be decoded
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PetError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PetError::Download { .. })
    }

    /// Returns true if this error indicates on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            PetError::ChecksumMismatch { .. } | PetError::Archive { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PetError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PetError>;
