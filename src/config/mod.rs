//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::classify::ClassifierSource;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Classifier selection
    pub classifier: ClassifierConfig,
    /// Drawing canvas settings
    pub drawing: DrawingConfig,
    /// Download settings
    pub fetch: FetchConfig,
}

/// Which classifier to load
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Local path or http(s) URL of the classifier file
    pub source: String,
    /// Keep downloaded classifiers in the data directory
    pub cache_downloads: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            source: "classifiers/linear.json".to_string(),
            cache_downloads: true,
        }
    }
}

impl ClassifierConfig {
    pub fn source(&self) -> ClassifierSource {
        ClassifierSource::new(&self.source)
    }
}

/// Drawing canvas settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingConfig {
    /// Canvas side length in pixels
    pub canvas_size: u32,
    /// Line width as a fraction of the canvas size
    pub thickness: f64,
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            canvas_size: 280,
            thickness: 0.07,
        }
    }
}

/// Download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
    /// Never download; only local or cached classifiers are used
    pub offline: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300, // 5 minutes
            offline: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
