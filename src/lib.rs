//! Wildlife detection for trail-camera footage
//!
//! Samples a handful of frames from each video, runs a classical
//! computer-vision detector over them and collects labelled boxes into a
//! JSON batch artifact. A small HTTP server streams the videos with range
//! support, renders thumbnails and serves the batch to a dashboard.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use trapcam_scan::{AnalyzerConfig, DetectorKind, VideoAnalyzer};
//!
//! let config = AnalyzerConfig {
//!     detector: DetectorKind::Accurate,
//!     ..AnalyzerConfig::default()
//! };
//! let analyzer = VideoAnalyzer::new(&config)?;
//!
//! let batch = analyzer.analyze_directory_to(Path::new("videos"), Path::new("analysis_results.json"))?;
//! for result in batch.results() {
//!     println!("{}: {} detections", result.filename, result.detection_count);
//! }
//! # Ok::<(), trapcam_scan::TrapError>(())
//! ```

mod common;
mod video_stream;
mod sampler;
mod detector;
mod analyzer;
mod resolver;
mod range;
mod streamer;
mod thumbnail;
mod transcode;
pub mod config;
pub mod server;

pub use analyzer::{discover_videos, frame_time, is_video_file, VideoAnalyzer, VIDEO_EXTENSIONS};
pub use common::{
    AnalysisBatch, BatchSummary, BoundingBox, ClassCount, Detection, Result, TrapError, VideoActivity, VideoResult,
};
pub use config::{AnalyzerConfig, ServerConfig};
pub use detector::{
    Detector, DetectorKind, EdgeDetector, GradientDetector, VariantParams, LABEL_ANIMAL, LABEL_BIRD, LABEL_PERSON,
};
pub use range::ByteRange;
pub use resolver::FileResolver;
pub use sampler::{sample_indices, FrameSample, FrameSampler};
pub use streamer::{content_type_for, stream_file, StreamPlan, StreamSession, DEFAULT_CHUNK_SIZE};
pub use thumbnail::{encode_thumbnail, generate_thumbnail, thumbnail_size, ThumbnailSpec};
pub use transcode::{optimize_for_web, web_output_path};
pub use video_stream::{video_info, VideoInfo, VideoStream};

use tracing::info;

/// Initialize tracing for the library
///
/// `RUST_LOG` wins over `level` when set. With `LOG_FORMAT=json` events are
/// emitted as one JSON object per line.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let result = if json_logging() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    match result {
        Ok(()) => info!("Tracing initialized at level: {}", level),
        Err(e) => eprintln!("Tracing already initialized: {}", e),
    }
}

fn json_logging() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
