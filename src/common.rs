//! Common types, utilities, and error handling for the analysis pipeline.
//!
//! This module provides the foundational types used throughout the codebase:
//! detections and their bounding boxes, the per-video result record, the
//! batch collection written to disk, and the crate-wide error type.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Axis-aligned bounding box in pixel coordinates of the source frame
///
/// Serialized as `[x0, y0, x1, y1]`. A box built through [`BoundingBox::new`]
/// always satisfies `x0 < x1` and `y0 < y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BoundingBox {
    /// Create a bounding box, returning `None` for degenerate boxes
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Option<Self> {
        if x0 < x1 && y0 < y1 {
            Some(Self { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }
}

impl TryFrom<[i32; 4]> for BoundingBox {
    type Error = String;

    fn try_from([x0, y0, x1, y1]: [i32; 4]) -> std::result::Result<Self, Self::Error> {
        Self::new(x0, y0, x1, y1).ok_or_else(|| format!("degenerate bounding box [{}, {}, {}, {}]", x0, y0, x1, y1))
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// One classified, confidence-scored candidate region within a frame
///
/// `frame_time` is zero when the detection comes straight out of a detector
/// and is filled in by the analyzer once the frame's position in the video
/// is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub frame_time: f64,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bbox,
            frame_time: 0.0,
        }
    }

    /// Return this detection stamped with a video-relative time in seconds
    pub fn at_time(mut self, frame_time: f64) -> Self {
        self.frame_time = frame_time;
        self
    }
}

/// Aggregated, time-coded detection record for one analyzed video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub file_path: String,
    pub filename: String,
    pub duration_seconds: f64,
    pub fps: f64,
    pub detections: Vec<Detection>,
    pub detection_count: usize,
    pub analyzed_at: DateTime<Utc>,
}

impl VideoResult {
    /// Build a result record; `detection_count` is derived from `detections`
    pub fn new(
        file_path: impl Into<String>,
        filename: impl Into<String>,
        duration_seconds: f64,
        fps: f64,
        detections: Vec<Detection>,
    ) -> Self {
        let detection_count = detections.len();
        Self {
            file_path: file_path.into(),
            filename: filename.into(),
            duration_seconds,
            fps,
            detections,
            detection_count,
            analyzed_at: Utc::now(),
        }
    }

    /// Compare everything except `analyzed_at`
    pub fn same_content(&self, other: &VideoResult) -> bool {
        self.file_path == other.file_path
            && self.filename == other.filename
            && self.duration_seconds == other.duration_seconds
            && self.fps == other.fps
            && self.detections == other.detections
            && self.detection_count == other.detection_count
    }
}

/// Ordered collection of per-video results from one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisBatch {
    results: Vec<VideoResult>,
}

impl AnalysisBatch {
    pub fn new(results: Vec<VideoResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[VideoResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<VideoResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn total_detections(&self) -> usize {
        self.results.iter().map(|r| r.detection_count).sum()
    }

    pub fn find_by_filename(&self, filename: &str) -> Option<&VideoResult> {
        self.results.iter().find(|r| r.filename == filename)
    }

    /// Write the batch as pretty JSON, replacing `path` atomically
    ///
    /// The document goes to a temporary file in the destination directory
    /// which is then renamed over `path`, so readers never observe a
    /// half-written artifact.
    #[instrument(skip(self))]
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| TrapError::Io(e.error))?;

        info!("Saved {} results to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a batch artifact previously written by [`AnalysisBatch::write_atomic`]
    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrapError::FileNotFound {
                name: path.display().to_string(),
            });
        }
        let file = std::fs::File::open(path)?;
        let batch: AnalysisBatch = serde_json::from_reader(std::io::BufReader::new(file))?;
        debug!("Loaded {} results from {}", batch.len(), path.display());
        Ok(batch)
    }
}

/// Per-class detection tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCount {
    pub class_label: String,
    pub count: usize,
}

/// Short reference to one of the most active videos
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoActivity {
    pub filename: String,
    pub detection_count: usize,
}

/// Dashboard statistics derived from a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_videos: usize,
    pub videos_with_detections: usize,
    pub total_detections: usize,
    /// Percentage of videos with at least one detection
    pub detection_rate: f64,
    pub class_counts: Vec<ClassCount>,
    pub top_videos: Vec<VideoActivity>,
}

impl BatchSummary {
    const TOP_VIDEOS: usize = 10;

    pub fn from_results(results: &[VideoResult]) -> Self {
        let total_videos = results.len();
        let total_detections = results.iter().map(|r| r.detection_count).sum();
        let videos_with_detections = results.iter().filter(|r| r.detection_count > 0).count();

        let detection_rate = if total_videos == 0 {
            0.0
        } else {
            videos_with_detections as f64 / total_videos as f64 * 100.0
        };

        let mut tally: HashMap<&str, usize> = HashMap::new();
        for detection in results.iter().flat_map(|r| r.detections.iter()) {
            *tally.entry(detection.class_label.as_str()).or_default() += 1;
        }
        let mut class_counts: Vec<ClassCount> = tally
            .into_iter()
            .map(|(label, count)| ClassCount { class_label: label.to_string(), count })
            .collect();
        class_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.class_label.cmp(&b.class_label)));

        let mut active: Vec<&VideoResult> = results.iter().filter(|r| r.detection_count > 0).collect();
        // Stable sort keeps batch order among ties
        active.sort_by(|a, b| b.detection_count.cmp(&a.detection_count));
        let top_videos = active
            .into_iter()
            .take(Self::TOP_VIDEOS)
            .map(|r| VideoActivity {
                filename: r.filename.clone(),
                detection_count: r.detection_count,
            })
            .collect();

        Self {
            total_videos,
            videos_with_detections,
            total_detections,
            detection_rate,
            class_counts,
            top_videos,
        }
    }
}

/// All possible errors from the analysis and streaming system
///
/// Per-unit failures (a frame, a single video in a batch) are recovered by
/// the caller; boundary failures (lookup, range) are classified with
/// [`TrapError::is_not_found`] and [`TrapError::is_range_error`] so the HTTP
/// layer can map them to status codes.
#[derive(Debug, thiserror::Error)]
pub enum TrapError {
    #[error("Failed to open video file: {path}")]
    VideoOpenFailed { path: String },

    #[error("Video file not found: {path}")]
    VideoNotFound { path: String },

    #[error("Invalid video format or corrupted file: {path}")]
    InvalidVideoFormat { path: String },

    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to decode frame {frame}: {reason}")]
    FrameDecodeFailed { frame: i64, reason: String },

    #[error("No frames found in video")]
    EmptyVideo,

    #[error("File not found: {name}")]
    FileNotFound { name: String },

    #[error("Range not satisfiable: {header} (file size {size})")]
    RangeNotSatisfiable { header: String, size: u64 },

    #[error("Thumbnail encoding failed: {reason}")]
    ThumbnailEncodeFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl TrapError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a frame decode error
    pub fn decode_error(frame: i64, reason: impl Into<String>) -> Self {
        Self::FrameDecodeFailed {
            frame,
            reason: reason.into(),
        }
    }

    /// Create an internal error (for unexpected conditions)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::FileNotFound { name: name.into() }
    }

    /// True for conditions surfaced as 404 at the HTTP boundary
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. } | Self::VideoNotFound { .. } | Self::EmptyVideo
        )
    }

    /// True for conditions surfaced as 416 at the HTTP boundary
    pub fn is_range_error(&self) -> bool {
        matches!(self, Self::RangeNotSatisfiable { .. })
    }
}

/// Convenient Result type for analysis and streaming operations
pub type Result<T> = std::result::Result<T, TrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(filename: &str, labels: &[&str]) -> VideoResult {
        let detections = labels
            .iter()
            .map(|l| Detection::new(*l, 0.8, BoundingBox::new(0, 0, 10, 10).unwrap()))
            .collect();
        VideoResult::new(format!("videos/{}", filename), filename, 10.0, 25.0, detections)
    }

    #[test]
    fn test_bounding_box_rejects_degenerate() {
        assert!(BoundingBox::new(0, 0, 10, 10).is_some());
        assert!(BoundingBox::new(10, 0, 10, 10).is_none());
        assert!(BoundingBox::new(0, 5, 10, 4).is_none());

        let bbox = BoundingBox::new(2, 3, 12, 23).unwrap();
        assert_eq!(bbox.width(), 10);
        assert_eq!(bbox.height(), 20);
    }

    #[test]
    fn test_detection_serializes_bbox_as_array() {
        let det = Detection::new("bird", 0.75, BoundingBox::new(1, 2, 30, 40).unwrap()).at_time(2.5);
        let json = serde_json::to_value(&det).unwrap();

        assert_eq!(json["class_label"], "bird");
        assert_eq!(json["bbox"], serde_json::json!([1, 2, 30, 40]));
        assert_eq!(json["frame_time"], 2.5);

        let back: Detection = serde_json::from_value(json).unwrap();
        assert_eq!(back, det);
    }

    #[test]
    fn test_degenerate_bbox_rejected_on_load() {
        let raw = serde_json::json!({
            "class_label": "animal",
            "confidence": 0.7,
            "bbox": [50, 10, 20, 40],
            "frame_time": 1.0
        });
        let err = serde_json::from_value::<Detection>(raw).unwrap_err();
        assert!(err.to_string().contains("degenerate bounding box"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edited.json");
        let artifact = serde_json::json!([{
            "file_path": "videos/a.mp4",
            "filename": "a.mp4",
            "duration_seconds": 4.0,
            "fps": 25.0,
            "detections": [{ "class_label": "bird", "confidence": 0.6, "bbox": [5, 5, 5, 9], "frame_time": 0.0 }],
            "detection_count": 1,
            "analyzed_at": "2024-05-01T12:00:00Z"
        }]);
        std::fs::write(&path, artifact.to_string()).unwrap();
        assert!(matches!(AnalysisBatch::load(&path).unwrap_err(), TrapError::Json(_)));
    }

    #[test]
    fn test_video_result_counts_detections() {
        let result = result_with("a.mp4", &["bird", "animal"]);
        assert_eq!(result.detection_count, 2);

        let json = serde_json::to_value(&result).unwrap();
        for field in ["file_path", "filename", "duration_seconds", "fps", "detections", "detection_count", "analyzed_at"] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = result_with("a.mp4", &["bird"]);
        let mut b = a.clone();
        b.analyzed_at = a.analyzed_at + chrono::Duration::seconds(30);
        assert!(a.same_content(&b));

        b.fps = 30.0;
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_batch_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_results.json");

        let batch = AnalysisBatch::new(vec![result_with("a.mp4", &["bird"]), result_with("b.mp4", &[])]);
        batch.write_atomic(&path).unwrap();

        let loaded = AnalysisBatch::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.total_detections(), 1);
        assert!(loaded.find_by_filename("b.mp4").is_some());
        assert!(loaded.find_by_filename("c.mp4").is_none());

        // Written as a bare JSON array
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.is_array());
    }

    #[test]
    fn test_batch_load_missing_is_not_found() {
        let err = AnalysisBatch::load(Path::new("definitely_missing_results.json")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_summary_statistics() {
        let results = vec![
            result_with("a.mp4", &["bird", "bird", "animal"]),
            result_with("b.mp4", &[]),
            result_with("c.mp4", &["person"]),
            result_with("d.mp4", &[]),
        ];
        let summary = BatchSummary::from_results(&results);

        assert_eq!(summary.total_videos, 4);
        assert_eq!(summary.videos_with_detections, 2);
        assert_eq!(summary.total_detections, 4);
        assert_eq!(summary.detection_rate, 50.0);

        assert_eq!(summary.class_counts[0], ClassCount { class_label: "bird".into(), count: 2 });
        assert_eq!(summary.class_counts[1].class_label, "animal");
        assert_eq!(summary.class_counts[2].class_label, "person");

        assert_eq!(summary.top_videos.len(), 2);
        assert_eq!(summary.top_videos[0].filename, "a.mp4");
        assert_eq!(summary.top_videos[1].filename, "c.mp4");
    }

    #[test]
    fn test_summary_empty() {
        let summary = BatchSummary::from_results(&[]);
        assert_eq!(summary.total_videos, 0);
        assert_eq!(summary.detection_rate, 0.0);
        assert!(summary.class_counts.is_empty());
        assert!(summary.top_videos.is_empty());
    }

    #[test]
    fn test_error_classification() {
        assert!(TrapError::not_found("x.mp4").is_not_found());
        assert!(TrapError::EmptyVideo.is_not_found());
        assert!(!TrapError::EmptyVideo.is_range_error());

        let range = TrapError::RangeNotSatisfiable { header: "bytes=9-".into(), size: 5 };
        assert!(range.is_range_error());
        assert!(!range.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let error = TrapError::VideoNotFound {
            path: "test.mp4".to_string(),
        };
        assert_eq!(error.to_string(), "Video file not found: test.mp4");

        let error = TrapError::config_error("max_frames must be positive");
        assert_eq!(error.to_string(), "Invalid configuration: max_frames must be positive");

        let error = TrapError::decode_error(42, "decoder returned no image");
        assert_eq!(error.to_string(), "Failed to decode frame 42: decoder returned no image");
    }
}
