//! Heuristic candidate-region detectors
//!
//! Both detectors find salient regions from an intensity gradient map,
//! extract their external contours, and score each region by how much of its
//! bounding box it fills and how close it is to square. The score is a
//! bounded heuristic, not a calibrated probability. Classification is purely
//! by aspect ratio.
//!
//! The two variants keep their own thresholds:
//!
//! | Variant    | Gradient          | Mask              | Area floor | Min side | Cap | Weights (extent/aspect) | Cutoffs (bird/person) |
//! |------------|-------------------|-------------------|-----------:|---------:|----:|-------------------------|-----------------------|
//! | `Accurate` | Canny 50/150      | edges as-is       | 1000 px²   | 50 px    | 0.9 | 0.5 / 0.3               | > 1.5 / < 0.7         |
//! | `Fast`     | Sobel magnitude   | mean + stddev, 5×5 close | 500 px² | 30 px | 0.8 | 0.6 / 0.2              | > 1.3 / < 0.8         |
//!
//! `Fast` works on a 416×416 copy of the frame and maps boxes back to the
//! original resolution with independent x/y scale factors.

use std::fmt;
use std::str::FromStr;

use opencv::{
    core::{self, Mat, Point, Size, Vector, CV_64F, CV_8U},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::common::{BoundingBox, Detection, Result, TrapError};

pub const LABEL_BIRD: &str = "bird";
pub const LABEL_PERSON: &str = "person";
pub const LABEL_ANIMAL: &str = "animal";

/// Region filtering and scoring parameters for one detector variant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantParams {
    /// Minimum contour area in analysis pixels
    pub area_floor: f64,
    /// Minimum bounding box width and height in analysis pixels
    pub min_side: i32,
    /// Reject boxes wider or taller than this fraction of the frame
    pub max_frame_fraction: Option<f64>,
    pub confidence_cap: f64,
    pub extent_weight: f64,
    pub aspect_weight: f64,
    /// Aspect ratios above this are labelled as elongated ("bird")
    pub wide_cutoff: f64,
    /// Aspect ratios below this are labelled as tall ("person")
    pub tall_cutoff: f64,
}

impl VariantParams {
    pub fn accurate() -> Self {
        Self {
            area_floor: 1000.0,
            min_side: 50,
            max_frame_fraction: Some(0.8),
            confidence_cap: 0.9,
            extent_weight: 0.5,
            aspect_weight: 0.3,
            wide_cutoff: 1.5,
            tall_cutoff: 0.7,
        }
    }

    pub fn fast() -> Self {
        Self {
            area_floor: 500.0,
            min_side: 30,
            max_frame_fraction: None,
            confidence_cap: 0.8,
            extent_weight: 0.6,
            aspect_weight: 0.2,
            wide_cutoff: 1.3,
            tall_cutoff: 0.8,
        }
    }

    /// `min(cap, extent*w1 + (1 - |aspect-1|*w2))`
    pub fn score(&self, extent: f64, aspect_ratio: f64) -> f64 {
        let raw = extent * self.extent_weight + (1.0 - (aspect_ratio - 1.0).abs() * self.aspect_weight);
        raw.min(self.confidence_cap)
    }

    pub fn classify(&self, aspect_ratio: f64) -> &'static str {
        if aspect_ratio > self.wide_cutoff {
            LABEL_BIRD
        } else if aspect_ratio < self.tall_cutoff {
            LABEL_PERSON
        } else {
            LABEL_ANIMAL
        }
    }

    fn accepts_box(&self, w: i32, h: i32, frame_w: i32, frame_h: i32) -> bool {
        if w < self.min_side || h < self.min_side {
            return false;
        }
        match self.max_frame_fraction {
            Some(f) => (w as f64) <= frame_w as f64 * f && (h as f64) <= frame_h as f64 * f,
            None => true,
        }
    }
}

/// Frame-to-detections capability
///
/// Implementations hold only immutable configuration, so a single instance
/// can be shared across worker threads.
pub trait Detector: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Run the detector, propagating OpenCV failures
    fn try_detect(&self, frame: &Mat, confidence_threshold: f64) -> Result<Vec<Detection>>;

    /// Run the detector; any failure is logged and yields no detections
    fn detect(&self, frame: &Mat, confidence_threshold: f64) -> Vec<Detection> {
        match self.try_detect(frame, confidence_threshold) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("{} detector failed on frame: {}", self.name(), e);
                Vec::new()
            }
        }
    }
}

/// Canny edge based detector working at full resolution
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    params: VariantParams,
    low_threshold: f64,
    high_threshold: f64,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::with_params(VariantParams::accurate())
    }

    pub fn with_params(params: VariantParams) -> Self {
        Self {
            params,
            low_threshold: 50.0,
            high_threshold: 150.0,
        }
    }

    pub fn params(&self) -> &VariantParams {
        &self.params
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for EdgeDetector {
    fn name(&self) -> &'static str {
        "accurate"
    }

    #[instrument(skip(self, frame))]
    fn try_detect(&self, frame: &Mat, confidence_threshold: f64) -> Result<Vec<Detection>> {
        let gray = to_gray(frame)?;

        let mut edges = Mat::default();
        imgproc::canny_def(&gray, &mut edges, self.low_threshold, self.high_threshold)?;

        score_regions(&edges, &self.params, (1.0, 1.0), confidence_threshold)
    }
}

/// Sobel gradient based detector working on a downscaled copy
#[derive(Debug, Clone)]
pub struct GradientDetector {
    params: VariantParams,
    input_size: Size,
    close_kernel: i32,
}

impl GradientDetector {
    pub fn new() -> Self {
        Self::with_params(VariantParams::fast())
    }

    pub fn with_params(params: VariantParams) -> Self {
        Self {
            params,
            input_size: Size::new(416, 416),
            close_kernel: 5,
        }
    }

    pub fn params(&self) -> &VariantParams {
        &self.params
    }

    /// Binary mask of pixels whose gradient magnitude exceeds mean + stddev
    fn gradient_mask(&self, gray: &Mat) -> Result<Mat> {
        let mut grad_x = Mat::default();
        let mut grad_y = Mat::default();
        imgproc::sobel_def(gray, &mut grad_x, CV_64F, 1, 0)?;
        imgproc::sobel_def(gray, &mut grad_y, CV_64F, 0, 1)?;

        let mut magnitude = Mat::default();
        core::magnitude(&grad_x, &grad_y, &mut magnitude)?;

        let mut mean = Mat::default();
        let mut stddev = Mat::default();
        core::mean_std_dev_def(&magnitude, &mut mean, &mut stddev)?;
        let cutoff = *mean.at::<f64>(0)? + *stddev.at::<f64>(0)?;
        trace!("Gradient cutoff {:.3}", cutoff);

        let mut above = Mat::default();
        imgproc::threshold(&magnitude, &mut above, cutoff, 255.0, imgproc::THRESH_BINARY)?;
        let mut binary = Mat::default();
        above.convert_to_def(&mut binary, CV_8U)?;

        let kernel = imgproc::get_structuring_element_def(
            imgproc::MORPH_ELLIPSE,
            Size::new(self.close_kernel, self.close_kernel),
        )?;
        let mut closed = Mat::default();
        imgproc::morphology_ex_def(&binary, &mut closed, imgproc::MORPH_CLOSE, &kernel)?;

        Ok(closed)
    }
}

impl Default for GradientDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for GradientDetector {
    fn name(&self) -> &'static str {
        "fast"
    }

    #[instrument(skip(self, frame))]
    fn try_detect(&self, frame: &Mat, confidence_threshold: f64) -> Result<Vec<Detection>> {
        if frame.empty() {
            return Err(TrapError::internal_error("empty frame"));
        }

        let mut resized = Mat::default();
        imgproc::resize(frame, &mut resized, self.input_size, 0.0, 0.0, imgproc::INTER_LINEAR)?;
        let gray = to_gray(&resized)?;

        let mask = self.gradient_mask(&gray)?;

        let scale_x = frame.cols() as f64 / gray.cols() as f64;
        let scale_y = frame.rows() as f64 / gray.rows() as f64;

        score_regions(&mask, &self.params, (scale_x, scale_y), confidence_threshold)
    }
}

/// Which detector variant to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Fast,
    Accurate,
}

impl DetectorKind {
    pub fn build(self) -> Box<dyn Detector> {
        match self {
            DetectorKind::Fast => Box::new(GradientDetector::new()),
            DetectorKind::Accurate => Box::new(EdgeDetector::new()),
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::Fast => write!(f, "fast"),
            DetectorKind::Accurate => write!(f, "accurate"),
        }
    }
}

impl FromStr for DetectorKind {
    type Err = TrapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(DetectorKind::Fast),
            "accurate" => Ok(DetectorKind::Accurate),
            other => Err(TrapError::config_error(format!(
                "unknown detector '{}', expected 'fast' or 'accurate'",
                other
            ))),
        }
    }
}

fn to_gray(frame: &Mat) -> Result<Mat> {
    if frame.empty() {
        return Err(TrapError::internal_error("empty frame"));
    }
    if frame.channels() == 1 {
        return Ok(frame.try_clone()?);
    }
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// Extract external contours from `mask` and turn qualifying ones into detections
///
/// `scale` maps analysis-resolution coordinates back to the source frame.
fn score_regions(
    mask: &Mat,
    params: &VariantParams,
    scale: (f64, f64),
    confidence_threshold: f64,
) -> Result<Vec<Detection>> {
    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours_def(mask, &mut contours, imgproc::RETR_EXTERNAL, imgproc::CHAIN_APPROX_SIMPLE)?;

    let (frame_w, frame_h) = (mask.cols(), mask.rows());
    let mut detections = Vec::new();

    for contour in contours.iter() {
        let area = imgproc::contour_area_def(&contour)?;
        if area < params.area_floor {
            continue;
        }

        let rect = imgproc::bounding_rect(&contour)?;
        if !params.accepts_box(rect.width, rect.height, frame_w, frame_h) {
            continue;
        }

        let aspect_ratio = rect.width as f64 / rect.height as f64;
        let extent = area / (rect.width as f64 * rect.height as f64);
        let confidence = params.score(extent, aspect_ratio);

        if confidence <= confidence_threshold {
            continue;
        }

        let (sx, sy) = scale;
        let bbox = BoundingBox::new(
            (rect.x as f64 * sx) as i32,
            (rect.y as f64 * sy) as i32,
            ((rect.x + rect.width) as f64 * sx) as i32,
            ((rect.y + rect.height) as f64 * sy) as i32,
        );
        let Some(bbox) = bbox else {
            continue;
        };

        let label = params.classify(aspect_ratio);
        trace!("Region {:?} area={:.0} extent={:.2} aspect={:.2} -> {} {:.2}",
               bbox, area, extent, aspect_ratio, label, confidence);
        detections.push(Detection::new(label, confidence, bbox));
    }

    debug!("{} of {} contours kept", detections.len(), contours.len());
    Ok(detections)
}
