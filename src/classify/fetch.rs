//! Classifier bytes fetching
//!
//! A classifier is either a local file or an http(s) URL. Downloads are
//! streamed to a temp file next to the cache entry and renamed into place
//! once complete, so a partially downloaded classifier is never served.

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Environment variable that forces offline mode
pub const OFFLINE_ENV: &str = "DIGIT_SKETCH_OFFLINE";

/// Why classifier bytes could not be obtained
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("offline mode: refusing to download {0}")]
    Offline(String),
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Io(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Transport(e.to_string()),
        }
    }
}

/// Where classifier bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierSource {
    Path(PathBuf),
    Url(String),
}

impl ClassifierSource {
    /// Interpret `location` as a URL when it has an http(s) scheme, else a path
    pub fn new(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ClassifierSource::Url(location.to_string())
        } else {
            ClassifierSource::Path(PathBuf::from(location))
        }
    }
}

impl FromStr for ClassifierSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for ClassifierSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierSource::Path(path) => write!(f, "{}", path.display()),
            ClassifierSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Fetches classifier bytes, caching downloads on disk
#[derive(Debug, Clone)]
pub struct ClassifierStore {
    cache_dir: PathBuf,
    timeout: Duration,
    offline: bool,
    cache_downloads: bool,
}

impl ClassifierStore {
    /// Store caching into the application data directory
    pub fn new() -> anyhow::Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("classifiers"))
    }

    /// Store with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            timeout: Duration::from_secs(300),
            offline: false,
            cache_downloads: true,
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn cache_downloads(mut self, cache: bool) -> Self {
        self.cache_downloads = cache;
        self
    }

    /// Cache location for a downloaded URL
    pub fn cached_path(&self, url: &str) -> PathBuf {
        let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
        self.cache_dir.join(format!("{}.bin", &digest[..16]))
    }

    fn is_offline(&self) -> bool {
        self.offline || std::env::var_os(OFFLINE_ENV).is_some()
    }

    /// Read the classifier bytes for `source`
    pub fn fetch(&self, source: &ClassifierSource) -> Result<Vec<u8>, FetchError> {
        match source {
            ClassifierSource::Path(path) => {
                debug!("Reading classifier from {:?}", path);
                Ok(std::fs::read(path)?)
            }
            ClassifierSource::Url(url) => {
                let cached = self.cached_path(url);
                if self.cache_downloads && cached.exists() {
                    info!("Classifier {} already cached at {:?}", url, cached);
                    return Ok(std::fs::read(&cached)?);
                }

                if self.is_offline() {
                    return Err(FetchError::Offline(url.clone()));
                }

                info!("Downloading classifier from {}", url);
                let rt = Runtime::new()?;
                let dest = self.cache_downloads.then_some(cached.as_path());
                rt.block_on(self.download_async(url, dest))
            }
        }
    }

    /// Stream `url` into memory, and into `dest` when given
    async fn download_async(&self, url: &str, dest: Option<&Path>) -> Result<Vec<u8>, FetchError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let total_size = response.content_length();
        debug!("Download size: {:?} bytes", total_size);

        let temp_path = dest.map(|path| path.with_extension("tmp"));
        let mut file = match &temp_path {
            Some(path) => Some(std::fs::File::create(path)?),
            None => None,
        };

        let mut hasher = Sha256::new();
        let mut bytes = Vec::with_capacity(total_size.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(file) = file.as_mut() {
                file.write_all(&chunk)?;
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }

        if let (Some(mut file), Some(temp_path), Some(dest)) = (file, temp_path, dest) {
            file.flush()?;
            drop(file);
            std::fs::rename(&temp_path, dest)?;
            debug!("Cached classifier at {:?}", dest);
        }

        info!(
            "Downloaded {} bytes from {} (sha256 {:x})",
            bytes.len(),
            url,
            hasher.finalize()
        );
        Ok(bytes)
    }
}
