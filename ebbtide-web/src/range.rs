//! HTTP `Range` header computation against a known total length.
//!
//! Only the first range-spec of a header is honored; multi-range
//! requests are unsupported and the remaining specs are ignored.
//! Malformed or unsatisfiable ranges are rejected so the caller can
//! answer `416 Range Not Satisfiable` instead of inheriting undefined
//! behavior.

/// Inclusive byte range within a file of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// The request's range cannot be satisfied against the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("range not satisfiable")]
pub struct RangeUnsatisfiable;

/// Resolves an optional `Range` header value against `length`.
///
/// Returns `Ok(None)` when no header is present (serve the whole file)
/// and `Ok(Some(range))` for a satisfiable partial request. An open end
/// (`bytes=N-`) and an over-long end are clamped to the last byte; a
/// suffix request (`bytes=-N`) addresses the final `N` bytes.
///
/// # Errors
/// - `RangeUnsatisfiable` - Malformed spec, reversed bounds, start beyond
///   the end of the file, or any range against an empty file
pub fn resolve_range(
    header: Option<&str>,
    length: u64,
) -> Result<Option<ByteRange>, RangeUnsatisfiable> {
    let Some(header) = header else {
        return Ok(None);
    };

    let spec = header.strip_prefix("bytes=").ok_or(RangeUnsatisfiable)?;
    // First range-spec only.
    let spec = spec.split(',').next().unwrap_or(spec).trim();

    if length == 0 {
        return Err(RangeUnsatisfiable);
    }

    let (start_text, end_text) = spec.split_once('-').ok_or(RangeUnsatisfiable)?;

    if start_text.is_empty() {
        // Suffix form: the last N bytes.
        let suffix = end_text.parse::<u64>().map_err(|_| RangeUnsatisfiable)?;
        if suffix == 0 {
            return Err(RangeUnsatisfiable);
        }
        let start = length.saturating_sub(suffix);
        return Ok(Some(ByteRange {
            start,
            end: length - 1,
        }));
    }

    let start = start_text.parse::<u64>().map_err(|_| RangeUnsatisfiable)?;
    if start >= length {
        return Err(RangeUnsatisfiable);
    }

    let end = if end_text.is_empty() {
        length - 1
    } else {
        let end = end_text.parse::<u64>().map_err(|_| RangeUnsatisfiable)?;
        if end < start {
            return Err(RangeUnsatisfiable);
        }
        end.min(length - 1)
    };

    Ok(Some(ByteRange { start, end }))
}
