//! Middle-frame JPEG thumbnails

use opencv::{
    core::{Mat, Size, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use tracing::{debug, instrument, warn};

use crate::common::{Result, TrapError};
use crate::video_stream::VideoStream;

/// Output size and quality for thumbnails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSpec {
    /// Length of the longer side in pixels
    pub max_dim: i32,
    /// JPEG quality, 0-100
    pub quality: i32,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            max_dim: 300,
            quality: 85,
        }
    }
}

/// Scale `(width, height)` so the longer side equals `max_dim`
pub fn thumbnail_size(width: i32, height: i32, max_dim: i32) -> Size {
    if width > height {
        let h = (height as i64 * max_dim as i64 / width as i64) as i32;
        Size::new(max_dim, h.max(1))
    } else {
        let w = (width as i64 * max_dim as i64 / height.max(1) as i64) as i32;
        Size::new(w.max(1), max_dim)
    }
}

/// Resize `frame` per `spec` and encode it as JPEG
pub fn encode_thumbnail(frame: &Mat, spec: ThumbnailSpec) -> Result<Vec<u8>> {
    if frame.empty() {
        return Err(TrapError::ThumbnailEncodeFailed {
            reason: "empty frame".to_string(),
        });
    }

    let size = thumbnail_size(frame.cols(), frame.rows(), spec.max_dim);
    let mut resized = Mat::default();
    imgproc::resize(frame, &mut resized, size, 0.0, 0.0, imgproc::INTER_AREA)?;

    let params = Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, spec.quality]);
    let mut buf = Vector::<u8>::new();
    let ok = imgcodecs::imencode(".jpg", &resized, &mut buf, &params)?;
    if !ok {
        return Err(TrapError::ThumbnailEncodeFailed {
            reason: "imencode returned false".to_string(),
        });
    }

    Ok(buf.to_vec())
}

/// Decode the middle frame of the video at `path` and return JPEG bytes
///
/// # Errors
/// * not-found (`VideoNotFound`, `EmptyVideo`, `FileNotFound`) - the file is
///   missing, can't be opened, has no frames, or its middle frame won't decode
/// * `ThumbnailEncodeFailed` / `OpenCvError` - resizing or encoding failed
#[instrument]
pub fn generate_thumbnail(path: &str, spec: ThumbnailSpec) -> Result<Vec<u8>> {
    let mut stream = match VideoStream::open(path) {
        Ok(s) => s,
        Err(e) if e.is_not_found() => return Err(e),
        Err(e) => {
            warn!("Cannot open {} for thumbnail: {}", path, e);
            return Err(TrapError::not_found(path));
        }
    };

    if stream.frame_count() <= 0 {
        return Err(TrapError::EmptyVideo);
    }

    let middle = stream.frame_count() / 2;
    let frame = stream.read_frame_at(middle).map_err(|e| {
        warn!("Thumbnail decode failed for {}: {}", path, e);
        TrapError::not_found(path)
    })?;

    let jpeg = encode_thumbnail(&frame, spec)?;
    debug!("Thumbnail for {} is {} bytes", path, jpeg.len());
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_landscape_size() {
        assert_eq!(thumbnail_size(1920, 1080, 300), Size::new(300, 168));
        assert_eq!(thumbnail_size(640, 480, 300), Size::new(300, 225));
    }

    #[test]
    fn test_portrait_and_square_size() {
        assert_eq!(thumbnail_size(1080, 1920, 300), Size::new(168, 300));
        assert_eq!(thumbnail_size(500, 500, 300), Size::new(300, 300));
    }

    #[test]
    fn test_extreme_aspect_never_zero() {
        assert_eq!(thumbnail_size(10_000, 2, 300), Size::new(300, 1));
        assert_eq!(thumbnail_size(2, 10_000, 300), Size::new(1, 300));
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let frame = Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::new(40.0, 120.0, 200.0, 0.0)).unwrap();
        let jpeg = encode_thumbnail(&frame, ThumbnailSpec::default()).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = imgcodecs::imdecode(&Vector::<u8>::from_slice(&jpeg), imgcodecs::IMREAD_COLOR).unwrap();
        assert_eq!(decoded.cols(), 300);
        assert_eq!(decoded.rows(), 225);
    }

    #[test]
    fn test_encode_rejects_empty_frame() {
        let err = encode_thumbnail(&Mat::default(), ThumbnailSpec::default()).unwrap_err();
        assert!(matches!(err, TrapError::ThumbnailEncodeFailed { .. }));
    }

    #[test]
    fn test_missing_video_is_not_found() {
        let err = generate_thumbnail("no_such_video.mp4", ThumbnailSpec::default()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_undecodable_video_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp4");
        std::fs::write(&path, b"not really a video").unwrap();

        let err = generate_thumbnail(path.to_str().unwrap(), ThumbnailSpec::default()).unwrap_err();
        assert!(err.is_not_found());
    }
}
