//! Remote dataset resources
//!
//! Archive descriptors and the loader that downloads, verifies, extracts and
//! lists them as raw entries.

pub mod loader;

pub use loader::{extract_tar_gz, sha256_file, DirEntries, LoaderConfig, ResourceLoader};

use serde::{Deserialize, Serialize};

/// A remote archive with its expected digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResource {
    /// Download URL
    pub url: String,
    /// Expected SHA-256 of the archive, lowercase hex
    pub sha256: String,
    /// Extract the archive after download
    pub decompress: bool,
}

impl HttpResource {
    pub fn new(url: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: sha256.into(),
            decompress: false,
        }
    }

    pub fn with_decompress(mut self, decompress: bool) -> Self {
        self.decompress = decompress;
        self
    }

    /// Last URL segment, e.g. `images.tar.gz`
    pub fn file_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or("");
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Directory name the archive extracts into, e.g. `images`
    pub fn extract_name(&self) -> &str {
        let name = self.file_name();
        [".tar.gz", ".tgz", ".tar"]
            .iter()
            .find_map(|ext| name.strip_suffix(ext))
            .unwrap_or(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let resource = HttpResource::new("https://example.org/data/images.tar.gz", "ab");
        assert_eq!(resource.file_name(), "images.tar.gz");
        assert_eq!(resource.extract_name(), "images");
        assert!(!resource.decompress);

        let resource = HttpResource::new("https://example.org/a/list.tgz?raw=1", "ab");
        assert_eq!(resource.file_name(), "list.tgz");
        assert_eq!(resource.extract_name(), "list");
    }
}
