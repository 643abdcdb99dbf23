//! Per-video analysis and directory batches
//!
//! A video is opened once for its metadata, a bounded set of frames is
//! sampled, and every sampled frame goes through the configured detector.
//! Detections are stamped with `i * duration / N` where `i` is the position
//! of the frame among the `N` frames actually decoded. That mapping assumes
//! sampled frames are spread evenly over the whole video; consumers of the
//! batch artifact rely on it, so it is kept even though the true timestamp
//! of frame `index` would be `index / fps`.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use crate::common::{AnalysisBatch, Detection, Result, TrapError, VideoResult};
use crate::config::AnalyzerConfig;
use crate::detector::Detector;
use crate::sampler::FrameSampler;
use crate::video_stream::VideoStream;

/// Extensions recognized in directory mode, compared case-insensitively
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "wmv"];

/// Video-relative time of sampled frame `i` out of `n`
pub fn frame_time(i: usize, n: usize, duration: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (i as f64 * duration) / n as f64
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Video files directly inside `dir`, sorted by path
#[instrument]
pub fn discover_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_video_file(&path) {
            files.push(path);
        }
    }
    files.sort();

    info!("Found {} video files in {}", files.len(), dir.display());
    Ok(files)
}

/// Runs sampling and detection over videos
#[derive(Debug)]
pub struct VideoAnalyzer {
    detector: Box<dyn Detector>,
    sampler: FrameSampler,
    confidence_threshold: f64,
    workers: usize,
}

impl VideoAnalyzer {
    /// Build an analyzer with the detector selected in `config`
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        Self::with_detector(config.detector.build(), config)
    }

    /// Build an analyzer around any detector implementation
    pub fn with_detector(detector: Box<dyn Detector>, config: &AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Analyzer initialized with {} detector (max_frames={}, threshold={}, workers={})",
            detector.name(),
            config.max_frames,
            config.confidence_threshold,
            config.workers
        );

        Ok(Self {
            detector,
            sampler: FrameSampler::new(config.max_frames)?,
            confidence_threshold: config.confidence_threshold,
            workers: config.workers,
        })
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Analyze one video file
    ///
    /// # Errors
    /// Fails only when the video can't be opened. Frames that don't decode
    /// are skipped and frames the detector chokes on contribute nothing.
    #[instrument(skip(self))]
    pub fn analyze_video(&self, path: &Path) -> Result<VideoResult> {
        let path_str = path
            .to_str()
            .ok_or_else(|| TrapError::VideoOpenFailed {
                path: path.display().to_string(),
            })?;
        info!("Analyzing {}", path_str);

        let mut stream = VideoStream::open(path_str)?;
        let fps = stream.fps();
        if fps <= 0.0 {
            warn!("{} reports no frame rate, duration set to 0", path_str);
        }
        let duration = stream.duration_seconds();

        let samples = self.sampler.sample(&mut stream);
        let n = samples.len();

        let mut detections: Vec<Detection> = Vec::new();
        for (i, sample) in samples.iter().enumerate() {
            let t = frame_time(i, n, duration);
            let found = self.detector.detect(&sample.frame, self.confidence_threshold);
            debug!("Frame {} (t={:.2}s): {} detections", sample.index, t, found.len());
            detections.extend(found.into_iter().map(|d| d.at_time(t)));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(VideoResult::new(path_str, filename, duration, fps, detections))
    }

    /// Analyze every listed file, dropping the ones that fail
    ///
    /// Results keep the order of `files`. With more than one worker the
    /// files are spread over a dedicated thread pool of that size.
    pub fn analyze_files(&self, files: &[PathBuf]) -> Result<AnalysisBatch> {
        let analyze_one = |path: &PathBuf| match self.analyze_video(path) {
            Ok(result) => {
                info!("✓ {}: {} detections", result.filename, result.detection_count);
                Some(result)
            }
            Err(e) => {
                error!("Error analyzing {}: {}", path.display(), e);
                None
            }
        };

        let results: Vec<VideoResult> = if self.workers > 1 && files.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .map_err(|e| TrapError::internal_error(format!("Failed to build worker pool: {}", e)))?;
            pool.install(|| files.par_iter().filter_map(analyze_one).collect())
        } else {
            files.iter().filter_map(analyze_one).collect()
        };

        if results.len() < files.len() {
            warn!("{} of {} videos failed", files.len() - results.len(), files.len());
        }
        Ok(AnalysisBatch::new(results))
    }

    /// Analyze every recognized video in `dir`
    #[instrument(skip(self))]
    pub fn analyze_directory(&self, dir: &Path) -> Result<AnalysisBatch> {
        let files = discover_videos(dir)?;
        self.analyze_files(&files)
    }

    /// Analyze `dir` and write the batch to `output` once all videos are done
    #[instrument(skip(self))]
    pub fn analyze_directory_to(&self, dir: &Path, output: &Path) -> Result<AnalysisBatch> {
        let batch = self.analyze_directory(dir)?;
        batch.write_atomic(output)?;
        Ok(batch)
    }

    /// Analyze a single file or a directory, whichever `path` is
    pub fn analyze_path(&self, path: &Path) -> Result<AnalysisBatch> {
        if path.is_file() {
            Ok(AnalysisBatch::new(vec![self.analyze_video(path)?]))
        } else {
            self.analyze_directory(path)
        }
    }
}
