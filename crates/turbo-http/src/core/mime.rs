/// Lowercased `type/subtype` of a `Content-Type` value, parameters dropped.
///
/// Returns `None` when the value does not have the `type/subtype` shape.
///
/// ```
/// use turbo_http::core::mime_essence;
///
/// assert_eq!(mime_essence("Application/JSON; charset=utf-8").as_deref(), Some("application/json"));
/// assert_eq!(mime_essence("json"), None);
/// ```
pub fn mime_essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    let (kind, subtype) = essence.split_once('/')?;
    let valid = |part: &str| !part.is_empty() && !part.contains(char::is_whitespace);
    if !valid(kind) || !valid(subtype) {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}
