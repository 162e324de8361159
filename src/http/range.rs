//! Byte-range request parsing.
//!
//! Only single `bytes=` ranges are honoured. Multi-range requests and other
//! units are ignored, so the full representation is served.

use thiserror::Error;

/// An inclusive byte range within a representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a representation of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("requested range not satisfiable")]
pub struct Unsatisfiable;

/// `Content-Range` value sent with a 416 response.
pub fn unsatisfied_range(size: u64) -> String {
    format!("bytes */{size}")
}

/// Parse a `Range` header against a representation of `size` bytes.
///
/// Returns `Ok(None)` when the header should be ignored.
pub fn parse(header: &str, size: u64) -> Result<Option<ByteRange>, Unsatisfiable> {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }

    let (first, last) = spec.split_once('-').ok_or(Unsatisfiable)?;
    let (first, last) = (first.trim(), last.trim());

    let range = match (first.is_empty(), last.is_empty()) {
        (true, true) => return Err(Unsatisfiable),
        // Suffix form: the final `last` bytes.
        (true, false) => {
            let suffix: u64 = last.parse().map_err(|_| Unsatisfiable)?;
            if suffix == 0 || size == 0 {
                return Err(Unsatisfiable);
            }
            ByteRange {
                start: size.saturating_sub(suffix),
                end: size - 1,
            }
        }
        (false, true) => {
            let start: u64 = first.parse().map_err(|_| Unsatisfiable)?;
            if start >= size {
                return Err(Unsatisfiable);
            }
            ByteRange { start, end: size - 1 }
        }
        (false, false) => {
            let start: u64 = first.parse().map_err(|_| Unsatisfiable)?;
            let end: u64 = last.parse().map_err(|_| Unsatisfiable)?;
            if start > end || start >= size {
                return Err(Unsatisfiable);
            }
            ByteRange {
                start,
                end: end.min(size - 1),
            }
        }
    };

    Ok(Some(range))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_bytes() {
        let range = parse("bytes=0-4", 13).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 4 });
        assert_eq!(range.length(), 5);
        assert_eq!(range.content_range(13), "bytes 0-4/13");
    }

    #[test]
    fn test_open_and_suffix_forms() {
        assert_eq!(parse("bytes=7-", 13).unwrap(), Some(ByteRange { start: 7, end: 12 }));
        assert_eq!(parse("bytes=-6", 13).unwrap(), Some(ByteRange { start: 7, end: 12 }));
        assert_eq!(parse("bytes=-100", 13).unwrap(), Some(ByteRange { start: 0, end: 12 }));
        assert_eq!(parse("bytes=10-99", 13).unwrap(), Some(ByteRange { start: 10, end: 12 }));
    }

    #[test]
    fn test_unsatisfiable() {
        assert_eq!(parse("bytes=500000-", 13), Err(Unsatisfiable));
        assert_eq!(parse("bytes=5-2", 13), Err(Unsatisfiable));
        assert_eq!(parse("bytes=-0", 13), Err(Unsatisfiable));
        assert_eq!(parse("bytes=a-b", 13), Err(Unsatisfiable));
        assert_eq!(parse("bytes=0-0", 0), Err(Unsatisfiable));
        assert_eq!(unsatisfied_range(13), "bytes */13");
    }

    #[test]
    fn test_ignored_forms() {
        assert_eq!(parse("items=0-4", 13), Ok(None));
        assert_eq!(parse("bytes=0-1,4-5", 13), Ok(None));
    }
}
