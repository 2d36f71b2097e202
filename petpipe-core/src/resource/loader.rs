//! Resource loader
//!
//! Downloads archives into a cache root with retry, checks their SHA-256,
//! unpacks `.tar.gz` files and walks the result as [`RawEntry`] items.

use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::HttpResource;
use crate::datapipe::RawEntry;
use crate::error::{PetError, Result};
use crate::metrics::standard::BYTES_READ;

/// Written into an extraction directory once unpacking finished
const EXTRACTED_MARKER: &str = ".extracted";

/// Configuration for the resource loader
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory holding downloaded archives and their extractions
    pub cache_root: PathBuf,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Download attempts before giving up
    pub retry_count: u32,
    /// Delay before the first retry; doubles per attempt
    pub retry_backoff_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("data/oxford-iiit-pet"),
            connect_timeout_secs: 10,
            request_timeout_secs: 1800,
            retry_count: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl LoaderConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Default::default()
        }
    }
}

/// Fetches and unpacks [`HttpResource`]s
pub struct ResourceLoader {
    client: Client,
    config: LoaderConfig,
}

impl ResourceLoader {
    /// Create a new loader
    pub fn new(config: LoaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| PetError::Download {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Where the archive is cached
    pub fn archive_path(&self, resource: &HttpResource) -> PathBuf {
        self.config.cache_root.join(resource.file_name())
    }

    /// Where the archive is unpacked
    pub fn extract_dir(&self, resource: &HttpResource) -> PathBuf {
        self.config.cache_root.join(resource.extract_name())
    }

    /// Make a resource available locally.
    ///
    /// Downloads the archive unless it is cached, verifies its digest and,
    /// for decompressing resources, unpacks it. Returns the extraction
    /// directory, or the archive path when `decompress` is off.
    pub async fn prepare(&self, resource: &HttpResource) -> Result<PathBuf> {
        let archive = self.archive_path(resource);

        if archive.exists() {
            info!("Using cached {:?}", archive);
        } else {
            tokio::fs::create_dir_all(&self.config.cache_root)
                .await
                .map_err(|e| PetError::io(&self.config.cache_root, e))?;
            let data = self.download_with_retry(&resource.url).await?;

            // Write under a temporary name so a crash never leaves a truncated archive
            let partial = archive.with_extension("part");
            tokio::fs::write(&partial, &data)
                .await
                .map_err(|e| PetError::io(&partial, e))?;
            tokio::fs::rename(&partial, &archive)
                .await
                .map_err(|e| PetError::io(&archive, e))?;
            info!("Downloaded {} ({} bytes)", resource.url, data.len());
        }

        let verify_path = archive.clone();
        let actual = blocking(move || sha256_file(&verify_path)).await?;
        if !actual.eq_ignore_ascii_case(&resource.sha256) {
            return Err(PetError::ChecksumMismatch {
                path: archive,
                expected: resource.sha256.clone(),
                actual,
            });
        }
        debug!("Verified sha256 of {:?}", archive);

        if !resource.decompress {
            return Ok(archive);
        }

        let dest = self.extract_dir(resource);
        if dest.join(EXTRACTED_MARKER).exists() {
            debug!("{:?} already extracted", dest);
            return Ok(dest);
        }

        info!("Extracting {:?} into {:?}", archive, dest);
        let unpack_dest = dest.clone();
        blocking(move || extract_tar_gz(&archive, &unpack_dest)).await?;
        std::fs::write(dest.join(EXTRACTED_MARKER), b"")
            .map_err(|e| PetError::io(dest.join(EXTRACTED_MARKER), e))?;

        Ok(dest)
    }

    /// Download a URL into memory
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        let download_err = |message: String| PetError::Download {
            url: url.into(),
            message,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        let status = resp.status();
        let transient =
            status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT;
        if status.is_client_error() && !transient {
            return Err(PetError::Rejected {
                url: url.into(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(download_err(format!("status {}", status)));
        }

        resp.bytes()
            .await
            .map_err(|e| download_err(format!("failed to read body: {}", e)))
    }

    /// Download with exponential backoff between attempts.
    ///
    /// Stops early on errors that are not retryable, such as a 404.
    pub async fn download_with_retry(&self, url: &str) -> Result<Bytes> {
        let attempts = self.config.retry_count.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.download(url).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!("Download attempt {}/{} for {} failed: {}", attempt + 1, attempts, url, e);
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                    if attempt + 1 < attempts {
                        let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PetError::Download {
            url: url.into(),
            message: "no download attempts made".into(),
        }))
    }

    /// Lazily list every file under `dir` in sorted path order
    pub fn entries(dir: &Path) -> DirEntries {
        DirEntries::new(dir)
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PetError::Internal {
            message: format!("Blocking task failed: {}", e),
        })?
}

/// Lowercase hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| PetError::io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut BufReader::new(file), &mut hasher).map_err(|e| PetError::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Unpack a gzip-compressed tarball into `dest`
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| PetError::io(archive, e))?;
    std::fs::create_dir_all(dest).map_err(|e| PetError::io(dest, e))?;

    let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tarball.unpack(dest).map_err(|e| PetError::Archive {
        path: archive.to_path_buf(),
        message: e.to_string(),
    })
}

/// Files under a directory as raw entries, read on demand
pub struct DirEntries {
    walker: walkdir::IntoIter,
}

impl DirEntries {
    pub fn new(dir: &Path) -> Self {
        Self {
            walker: WalkDir::new(dir).sort_by_file_name().into_iter(),
        }
    }
}

impl Iterator for DirEntries {
    type Item = Result<RawEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    return Some(Err(PetError::io(path, source)));
                }
            };

            if !entry.file_type().is_file() || entry.file_name() == EXTRACTED_MARKER {
                continue;
            }

            let path = entry.path();
            return Some(match std::fs::read(path) {
                Ok(data) => {
                    BYTES_READ.inc_by(data.len() as u64);
                    Ok(RawEntry::new(path.to_string_lossy().into_owned(), data))
                }
                Err(e) => Err(PetError::io(path, e)),
            });
        }
    }
}
