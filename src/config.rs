// src/config.rs
//
// Runtime configuration. Defaults are production-usable; `from_env()` lets an
// operator override directories and tuning knobs without recompiling.

use crate::engine::{ChartSettings, TransformSettings, UploadLimits};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

pub const ENV_UPLOAD_DIR: &str = "IMAGELAB_UPLOAD_DIR";
pub const ENV_OUTPUT_DIR: &str = "IMAGELAB_OUTPUT_DIR";
pub const ENV_UPLOAD_URL_PREFIX: &str = "IMAGELAB_UPLOAD_URL_PREFIX";
pub const ENV_WEBP_QUALITY: &str = "IMAGELAB_WEBP_QUALITY";
pub const ENV_OPTIMIZE_PNG: &str = "IMAGELAB_OPTIMIZE_PNG";
pub const ENV_MAX_UPLOAD_BYTES: &str = "IMAGELAB_MAX_UPLOAD_BYTES";
pub const ENV_CACHE_CAPACITY: &str = "IMAGELAB_CACHE_CAPACITY";

/// Cached results kept before the oldest are evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Everything a `Dispatcher` needs to know about its environment.
#[derive(Debug, Clone)]
pub struct LabConfig {
    /// Where uploaded originals are stored.
    pub upload_dir: PathBuf,
    /// Where derived images, charts and reports are written.
    pub output_dir: PathBuf,
    /// URL prefix the web layer serves `upload_dir` under.
    pub upload_url_prefix: String,
    /// Encoding and resampling knobs for the transform engine.
    pub transform: TransformSettings,
    /// Histogram chart geometry.
    pub chart: ChartSettings,
    /// Upload size and dimension limits.
    pub limits: UploadLimits,
    /// Upper bound on remembered operation results.
    pub cache_capacity: usize,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            upload_url_prefix: "/uploads".to_string(),
            transform: TransformSettings::default(),
            chart: ChartSettings::default(),
            limits: UploadLimits::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl LabConfig {
    /// Defaults with explicit directories. Mostly for tests and embedding.
    pub fn with_dirs(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `IMAGELAB_*` environment variables.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_value(ENV_UPLOAD_DIR) {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = env_value(ENV_UPLOAD_URL_PREFIX) {
            config.upload_url_prefix = prefix;
        }
        if let Some(quality) = env_parse::<u8>(ENV_WEBP_QUALITY) {
            config.transform.webp_quality = quality.min(100);
        }
        if let Some(optimize) = env_parse::<bool>(ENV_OPTIMIZE_PNG) {
            config.transform.optimize_png = optimize;
        }
        if let Some(max_bytes) = env_parse::<u64>(ENV_MAX_UPLOAD_BYTES) {
            config.limits.max_bytes = max_bytes;
        }
        if let Some(capacity) = env_parse::<usize>(ENV_CACHE_CAPACITY) {
            config.cache_capacity = capacity;
        }
        config
    }

    /// Public URL of an uploaded file.
    pub fn upload_url(&self, filename: &str) -> String {
        format!("{}/{}", self.upload_url_prefix.trim_end_matches('/'), filename)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_value(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}
