//! Runtime configuration for the analyzer and the streaming server.
//!
//! Both structs have sensible defaults and a `from_env` constructor for
//! embedders. The CLI binds the same `TRAP_*` variables to its flags.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::common::{Result, TrapError};
use crate::detector::DetectorKind;
use crate::streamer::DEFAULT_CHUNK_SIZE;
use crate::thumbnail::ThumbnailSpec;

/// Analysis settings shared by every video of a run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    pub detector: DetectorKind,
    /// Upper bound on frames decoded per video
    pub max_frames: usize,
    /// Detections must score strictly above this
    pub confidence_threshold: f64,
    /// Videos analyzed concurrently in directory mode; 1 means sequential
    pub workers: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Fast,
            max_frames: 10,
            confidence_threshold: 0.5,
            workers: 1,
        }
    }
}

impl AnalyzerConfig {
    /// Read `TRAP_DETECTOR`, `TRAP_MAX_FRAMES`, `TRAP_CONFIDENCE`, `TRAP_WORKERS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            detector: env_or("TRAP_DETECTOR", defaults.detector),
            max_frames: env_or("TRAP_MAX_FRAMES", defaults.max_frames),
            confidence_threshold: env_or("TRAP_CONFIDENCE", defaults.confidence_threshold),
            workers: env_or("TRAP_WORKERS", defaults.workers),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            return Err(TrapError::config_error("max_frames must be positive"));
        }
        if !(0.0..1.0).contains(&self.confidence_threshold) {
            return Err(TrapError::config_error(format!(
                "confidence threshold must be in [0, 1), got {}",
                self.confidence_threshold
            )));
        }
        if self.workers == 0 {
            return Err(TrapError::config_error("workers must be positive"));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Searched before `videos/`, `data/` and the working directory
    pub video_dir: Option<PathBuf>,
    /// Batch artifact served by the results API
    pub results_file: PathBuf,
    pub chunk_size: usize,
    pub thumbnail: ThumbnailSpec,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            video_dir: None,
            results_file: PathBuf::from("analysis_results.json"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            thumbnail: ThumbnailSpec::default(),
        }
    }
}

impl ServerConfig {
    /// Read `TRAP_HOST`, `TRAP_PORT`, `TRAP_VIDEO_DIR`, `TRAP_RESULTS_FILE`, `TRAP_CHUNK_SIZE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("TRAP_HOST").unwrap_or(defaults.host),
            port: env_or("TRAP_PORT", defaults.port),
            video_dir: std::env::var("TRAP_VIDEO_DIR").ok().map(PathBuf::from),
            results_file: std::env::var("TRAP_RESULTS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.results_file),
            chunk_size: env_or("TRAP_CHUNK_SIZE", defaults.chunk_size),
            thumbnail: defaults.thumbnail,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TrapError::config_error("chunk size must be positive"));
        }
        if self.thumbnail.max_dim <= 0 || !(0..=100).contains(&self.thumbnail.quality) {
            return Err(TrapError::config_error("invalid thumbnail settings"));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
