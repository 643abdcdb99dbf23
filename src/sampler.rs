//! Deterministic frame sampling
//!
//! Picks a bounded, evenly strided set of frame indices from a video and
//! decodes them. Indices that fail to decode are skipped, so the returned
//! sequence can be shorter than requested.

use opencv::core::Mat;
use tracing::{debug, instrument, warn};

use crate::common::{Result, TrapError};
use crate::video_stream::VideoStream;

/// One decoded image taken from a video at a specific frame index
pub struct FrameSample {
    pub index: i64,
    pub frame: Mat,
}

impl std::fmt::Debug for FrameSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSample").field("index", &self.index).finish()
    }
}

/// Select the frame indices to decode
///
/// Every frame when `total_frames <= max_frames`; otherwise `max_frames`
/// indices at stride `total_frames / max_frames`, starting at 0.
pub fn sample_indices(total_frames: i64, max_frames: usize) -> Vec<i64> {
    if total_frames <= 0 || max_frames == 0 {
        return Vec::new();
    }

    let max = max_frames as i64;
    if total_frames <= max {
        (0..total_frames).collect()
    } else {
        let step = total_frames / max;
        (0..max).map(|i| i * step).collect()
    }
}

/// Frame sampler with a fixed upper bound on decoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampler {
    max_frames: usize,
}

impl FrameSampler {
    /// Samples used per video unless configured otherwise
    pub const DEFAULT_MAX_FRAMES: usize = 10;

    pub fn new(max_frames: usize) -> Result<Self> {
        if max_frames == 0 {
            return Err(TrapError::config_error("max_frames must be positive"));
        }
        Ok(Self { max_frames })
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Decode the sampled frames of `stream` in index order
    #[instrument(skip(self, stream), fields(path = stream.path()))]
    pub fn sample(&self, stream: &mut VideoStream) -> Vec<FrameSample> {
        let indices = sample_indices(stream.frame_count(), self.max_frames);
        let mut samples = Vec::with_capacity(indices.len());

        for index in indices {
            match stream.read_frame_at(index) {
                Ok(frame) => samples.push(FrameSample { index, frame }),
                Err(e) => warn!("Skipping frame {} of {}: {}", index, stream.path(), e),
            }
        }

        debug!("Sampled {} frames from {}", samples.len(), stream.path());
        samples
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self {
            max_frames: Self::DEFAULT_MAX_FRAMES,
        }
    }
}
