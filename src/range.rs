//! HTTP byte range parsing
//!
//! Only single `bytes=S-E` ranges are understood. A missing start defaults
//! to 0 and a missing end to the last byte of the file; an end past the file
//! is clamped. Anything that can't be served from the file is reported as
//! [`TrapError::RangeNotSatisfiable`].

use crate::common::{Result, TrapError};

/// Inclusive window `[start, end]` of a file of `total_size` bytes
///
/// Always satisfies `start <= end < total_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
    total_size: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64, total_size: u64) -> Option<Self> {
        if start <= end && end < total_size {
            Some(Self { start, end, total_size })
        } else {
            None
        }
    }

    /// Parse a `Range` header value against a file of `total_size` bytes
    pub fn parse(header: &str, total_size: u64) -> Result<Self> {
        let unsatisfiable = || TrapError::RangeNotSatisfiable {
            header: header.to_string(),
            size: total_size,
        };

        let spec = header.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
        if spec.contains(',') {
            return Err(unsatisfiable());
        }
        let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;

        let parse_bound = |s: &str| -> Result<Option<u64>> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<u64>().map(Some).map_err(|_| unsatisfiable())
            }
        };

        let start = parse_bound(start)?.unwrap_or(0);
        let last = total_size.checked_sub(1).ok_or_else(unsatisfiable)?;
        let end = parse_bound(end)?.map_or(last, |e| e.min(last));

        if start > last || start > end {
            return Err(unsatisfiable());
        }

        Ok(Self { start, end, total_size })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of bytes in the window
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Never true; a satisfiable range holds at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the `Content-Range` response header
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}
