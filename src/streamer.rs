//! Range-request file streaming
//!
//! Serves a whole file (200) or one byte window of it (206). Bodies are
//! produced lazily in fixed-size chunks from a file handle owned by the
//! response, so memory use does not depend on the requested range and the
//! handle is closed as soon as the body is finished or dropped.

use std::path::{Path, PathBuf};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Response, StatusCode};
use futures_util::Stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, instrument};

use crate::common::{Result, TrapError};
use crate::range::ByteRange;

/// Chunk size used when none is configured
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// What to send for a request, decided before any file I/O on the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlan {
    pub status: StatusCode,
    pub range: Option<ByteRange>,
    pub total_size: u64,
}

impl StreamPlan {
    /// 200 for no `Range` header, 206 for a satisfiable one, error otherwise
    pub fn new(total_size: u64, range_header: Option<&str>) -> Result<Self> {
        match range_header {
            None => Ok(Self {
                status: StatusCode::OK,
                range: None,
                total_size,
            }),
            Some(h) => {
                let range = ByteRange::parse(h, total_size)?;
                Ok(Self {
                    status: StatusCode::PARTIAL_CONTENT,
                    range: Some(range),
                    total_size,
                })
            }
        }
    }

    pub fn offset(&self) -> u64 {
        self.range.map_or(0, |r| r.start())
    }

    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.total_size, |r| r.len())
    }
}

/// Open file handle positioned at the window start, read until the window end
///
/// Owned by exactly one response body. Dropping the session closes the file,
/// which is how a client disconnect releases it.
pub struct StreamSession {
    file: File,
    path: PathBuf,
    remaining: u64,
    chunk_size: usize,
}

impl StreamSession {
    pub async fn open(path: &Path, offset: u64, length: u64, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(TrapError::config_error("chunk size must be positive"));
        }

        let mut file = File::open(path).await?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            remaining: length,
            chunk_size,
        })
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the next chunk; `None` once the window is exhausted
    ///
    /// A file that shrank underneath us ends the stream early. After an error
    /// the session is finished.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let want = self.remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let read = match self.file.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                self.remaining = 0;
                return Err(e);
            }
        };

        if read == 0 {
            debug!("{} ended {} bytes early", self.path.display(), self.remaining);
            self.remaining = 0;
            return Ok(None);
        }

        buf.truncate(read);
        self.remaining -= read as u64;
        Ok(Some(Bytes::from(buf)))
    }

    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        futures_util::stream::unfold(self, |mut session| async move {
            match session.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), session)),
                Ok(None) => None,
                Err(e) => Some((Err(e), session)),
            }
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.remaining > 0 {
            debug!(
                "Stream of {} dropped with {} bytes unsent",
                self.path.display(),
                self.remaining
            );
        }
    }
}

/// Guess a video MIME type from the file extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("wmv") => "video/x-ms-wmv",
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}

/// Build the full or partial response for `path`
///
/// # Errors
/// * `RangeNotSatisfiable` - for malformed or out-of-file ranges
/// * `Io` - if the file can't be opened or sized
#[instrument(skip(chunk_size))]
pub async fn stream_file(path: &Path, range_header: Option<&str>, chunk_size: usize) -> Result<Response<Body>> {
    let total_size = tokio::fs::metadata(path).await?.len();
    let plan = StreamPlan::new(total_size, range_header)?;

    let session = StreamSession::open(path, plan.offset(), plan.content_length(), chunk_size).await?;

    debug!(
        "Streaming {} ({} of {} bytes from offset {})",
        path.display(),
        plan.content_length(),
        total_size,
        plan.offset()
    );

    let mut builder = Response::builder()
        .status(plan.status)
        .header(header::CONTENT_TYPE, content_type_for(path))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, plan.content_length());

    if let Some(range) = plan.range {
        builder = builder.header(header::CONTENT_RANGE, range.content_range());
    }

    builder
        .body(Body::from_stream(session.into_stream()))
        .map_err(|e| TrapError::internal_error(format!("Failed to build response: {}", e)))
}

/// `Content-Range` value for a 416 response
pub fn unsatisfied_range(total_size: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("bytes */{}", total_size)).unwrap_or(HeaderValue::from_static("bytes */0"))
}
