//! Request and response dumps, emitted at debug level when
//! `SessionConfig::log_traffic` is on.

use http::HeaderMap;
use tracing::debug;

use crate::data::{HttpRequest, ResponseMeta};

const BODY_PREVIEW_BYTES: usize = 1024;

/// Header map rendered one `name: value` per line, credentials masked.
fn render_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if value.is_sensitive() || is_credential(name.as_str()) {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {value}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_credential(name: &str) -> bool {
    matches!(name, "authorization" | "proxy-authorization" | "cookie" | "set-cookie")
}

/// At most [`BODY_PREVIEW_BYTES`] of `body`, lossily decoded.
pub(crate) fn body_preview(body: &[u8]) -> String {
    let end = body.len().min(BODY_PREVIEW_BYTES);
    let mut preview = String::from_utf8_lossy(&body[..end]).into_owned();
    if body.len() > end {
        preview.push_str(&format!("... ({} more bytes)", body.len() - end));
    }
    preview
}

pub(crate) fn log_request(enabled: bool, request: &HttpRequest) {
    if !enabled {
        return;
    }
    let body = request.body.as_deref().map(body_preview).unwrap_or_default();
    debug!(
        method = %request.method,
        url = %request.url,
        headers = %render_headers(&request.headers),
        body = %body,
        "request"
    );
}

pub(crate) fn log_response(enabled: bool, response: &ResponseMeta) {
    if !enabled {
        return;
    }
    debug!(
        status = %response.status,
        url = %response.url,
        headers = %render_headers(&response.headers),
        "response"
    );
}

pub(crate) fn log_response_body(enabled: bool, body: &[u8]) {
    if enabled {
        debug!(body = %body_preview(body), "response body");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};

    #[test]
    fn test_credentials_are_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let rendered = render_headers(&headers);
        assert!(rendered.contains("content-type: application/json"));
        assert!(rendered.contains("authorization: <redacted>"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_body_preview_truncates() {
        assert_eq!(body_preview(b"{\"ok\":true}"), "{\"ok\":true}");

        let long = vec![b'a'; BODY_PREVIEW_BYTES + 10];
        let preview = body_preview(&long);
        assert!(preview.ends_with("... (10 more bytes)"));
        assert!(preview.starts_with("aaaa"));
    }
}
