//! Random-access video decoding on top of OpenCV
//!
//! Container metadata is read once when the file is opened; frames are then
//! decoded by index. Odd metadata (zero fps, zero frames) does not prevent
//! opening, callers decide what such a video is worth.

use std::fmt;
use std::path::Path;

use opencv::{core::Mat, prelude::*, videoio};
use tracing::{debug, info, instrument, warn};

use crate::common::{Result, TrapError};

/// Container metadata of a video file
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    /// 0.0 when the container reports no usable rate
    pub fps: f64,
    pub frame_count: i64,
    pub width: i32,
    pub height: i32,
    pub duration_seconds: f64,
}

impl VideoInfo {
    /// Positive rate, frame count and dimensions
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0 && self.frame_count > 0 && self.width > 0 && self.height > 0
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}, {:.2} fps, {} frames, {:.1}s)",
            self.path, self.width, self.height, self.fps, self.frame_count, self.duration_seconds
        )
    }
}

/// frame_count / fps, or 0.0 when either is not positive
pub fn duration_from(frame_count: i64, fps: f64) -> f64 {
    if fps > 0.0 && frame_count > 0 {
        frame_count as f64 / fps
    } else {
        0.0
    }
}

/// An opened video that can decode any frame by index
pub struct VideoStream {
    cap: videoio::VideoCapture,
    info: VideoInfo,
}

impl fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VideoStream").field(&self.info).finish()
    }
}

fn open_capture(path: &str) -> Result<videoio::VideoCapture> {
    let open_failed = || TrapError::VideoOpenFailed {
        path: path.to_string(),
    };

    let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY).map_err(|e| {
        warn!("OpenCV rejected {}: {}", path, e);
        open_failed()
    })?;

    match cap.is_opened() {
        Ok(true) => Ok(cap),
        Ok(false) => Err(open_failed()),
        Err(e) => {
            warn!("Could not query capture state for {}: {}", path, e);
            Err(open_failed())
        }
    }
}

/// Read a capture property, mapping NaN and non-positive values to 0
fn positive_prop(cap: &videoio::VideoCapture, id: i32, path: &str) -> Result<f64> {
    let value = cap.get(id).map_err(|e| {
        warn!("Property {} unreadable for {}: {}", id, path, e);
        TrapError::InvalidVideoFormat {
            path: path.to_string(),
        }
    })?;
    Ok(if value.is_finite() && value > 0.0 { value } else { 0.0 })
}

impl VideoStream {
    /// Open `path` and read its metadata
    ///
    /// # Errors
    /// * `VideoNotFound` - `path` is not a regular file
    /// * `VideoOpenFailed` - no OpenCV backend accepts the file
    /// * `InvalidVideoFormat` - container properties can't be queried
    #[instrument]
    pub fn open(path: &str) -> Result<Self> {
        if !Path::new(path).is_file() {
            return Err(TrapError::VideoNotFound {
                path: path.to_string(),
            });
        }

        let cap = open_capture(path)?;

        let fps = positive_prop(&cap, videoio::CAP_PROP_FPS, path)?;
        let frame_count = positive_prop(&cap, videoio::CAP_PROP_FRAME_COUNT, path)? as i64;
        let width = positive_prop(&cap, videoio::CAP_PROP_FRAME_WIDTH, path)? as i32;
        let height = positive_prop(&cap, videoio::CAP_PROP_FRAME_HEIGHT, path)? as i32;

        let info = VideoInfo {
            path: path.to_string(),
            fps,
            frame_count,
            width,
            height,
            duration_seconds: duration_from(frame_count, fps),
        };
        info!("Opened {}", info);

        Ok(Self { cap, info })
    }

    /// Seek to `index` and decode that frame
    ///
    /// # Errors
    /// * `FrameDecodeFailed` - the index is out of range, the seek fails,
    ///   or the decoder returns no image
    #[instrument(skip(self))]
    pub fn read_frame_at(&mut self, index: i64) -> Result<Mat> {
        let total = self.info.frame_count;
        if !(0..total).contains(&index) {
            return Err(TrapError::decode_error(
                index,
                format!("index out of range (frame count {})", total),
            ));
        }

        self.cap
            .set(videoio::CAP_PROP_POS_FRAMES, index as f64)
            .map_err(|e| TrapError::decode_error(index, format!("seek failed: {}", e)))?;

        let mut image = Mat::default();
        let decoded = self
            .cap
            .read(&mut image)
            .map_err(|e| TrapError::decode_error(index, format!("read failed: {}", e)))?;

        if !decoded || image.empty() {
            return Err(TrapError::decode_error(index, "decoder returned no image"));
        }

        debug!("Decoded frame {} of {}", index, total);
        Ok(image)
    }

    pub fn fps(&self) -> f64 {
        self.info.fps
    }

    pub fn frame_count(&self) -> i64 {
        self.info.frame_count
    }

    pub fn width(&self) -> i32 {
        self.info.width
    }

    pub fn height(&self) -> i32 {
        self.info.height
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    /// Zero when the container reports no frame rate
    pub fn duration_seconds(&self) -> f64 {
        self.info.duration_seconds
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }
}

/// Read container metadata without decoding any frames
#[instrument]
pub fn video_info(path: &str) -> Result<VideoInfo> {
    Ok(VideoStream::open(path)?.info)
}
