use http::StatusCode;
use http::header::CONTENT_RANGE;

use crate::data::{ResponseMeta, ResumeData};

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end:   u64,

    /// `None` for `*`.
    pub total: Option<u64>,
}

/// Parse a byte `Content-Range` value. Unsatisfied ranges (`bytes */N`) and
/// other units yield `None`.
///
/// ```
/// use turbo_http::core::{ContentRange, parse_content_range};
///
/// assert_eq!(
///     parse_content_range("bytes 500-999/1000"),
///     Some(ContentRange { start: 500, end: 999, total: Some(1000) })
/// );
/// assert_eq!(parse_content_range("bytes */1000"), None);
/// ```
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    if end < start || total.is_some_and(|total| end >= total) {
        return None;
    }
    Some(ContentRange { start, end, total })
}

/// Weak entity-tag comparison: `W/"x"` matches `"x"`.
pub fn etags_match(a: &str, b: &str) -> bool {
    let opaque = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    opaque(a) == opaque(b)
}

/// Full resource size announced by a fresh (non-resumed) response.
pub fn expected_total(response: &ResponseMeta) -> Option<u64> {
    if response.status == StatusCode::PARTIAL_CONTENT {
        response
            .header(CONTENT_RANGE)
            .and_then(parse_content_range)
            .and_then(|range| range.total)
    } else {
        response.content_length
    }
}

/// Check that a `206` answer to a resume request continues exactly where the
/// partial file stops and describes the same resource.
///
/// The error message explains why the resume data is no longer usable.
pub(crate) fn validate_resumed_response(response: &ResponseMeta, resume: &ResumeData) -> Result<Option<u64>, String> {
    let raw = response
        .header(CONTENT_RANGE)
        .ok_or_else(|| "partial response has no Content-Range".to_string())?;
    let range = parse_content_range(raw).ok_or_else(|| format!("malformed Content-Range {raw:?}"))?;

    if range.start != resume.bytes_received {
        return Err(format!(
            "server resumed at byte {} but {} bytes are on disk",
            range.start, resume.bytes_received
        ));
    }

    if let (Some(expected), Some(total)) = (resume.total_bytes, range.total) {
        if expected != total {
            return Err(format!("resource size changed from {expected} to {total} bytes"));
        }
    }

    if let (Some(saved), Some(current)) = (resume.etag.as_deref(), response.etag()) {
        if !etags_match(saved, current) {
            return Err(format!("entity tag changed from {saved} to {current}"));
        }
    }

    Ok(range.total.or(resume.total_bytes))
}
