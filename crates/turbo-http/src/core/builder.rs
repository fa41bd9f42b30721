//! Request builders: turn a request template plus parameters into the request
//! that goes on the wire.

use bytes::Bytes;
use http::header::{self, HeaderValue};
use serde_json::Value;

use super::encoding::{StringEncoding, check_representable, query_string};
use crate::data::{HttpRequest, Parameters};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{value:?} cannot be represented in {encoding}")]
    Encoding { value: String, encoding: StringEncoding },

    #[error("failed to serialize JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] header::InvalidHeaderValue),
}

/// Settings shared by the built-in builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Percent-encode keys and values placed in a query string or form body.
    ///
    /// Default: true
    pub percent_encode_parameters: bool,

    /// Encoding parameters must be representable in.
    ///
    /// Default: UTF-8
    pub string_encoding: StringEncoding,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            percent_encode_parameters: true,
            string_encoding: StringEncoding::Utf8,
        }
    }
}

/// Merges parameters into a request.
///
/// Implementations take the template by reference and return a new request,
/// so the caller's template is never modified. They are stateless and can be
/// shared across threads.
pub trait RequestBuilder: Send + Sync {
    fn build(&self, request: &HttpRequest, parameters: &Parameters) -> Result<HttpRequest, BuildError>;
}

/// Query-string builder for `GET`/`HEAD`/`DELETE`, form-urlencoded body for
/// everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodedBuilder {
    config: BuilderConfig,
}

impl UrlEncodedBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(config: BuilderConfig) -> Self { Self { config } }

    #[must_use]
    pub fn percent_encode_parameters(mut self, enabled: bool) -> Self {
        self.config.percent_encode_parameters = enabled;
        self
    }

    #[must_use]
    pub fn string_encoding(mut self, encoding: StringEncoding) -> Self {
        self.config.string_encoding = encoding;
        self
    }

    pub fn config(&self) -> &BuilderConfig { &self.config }
}

impl RequestBuilder for UrlEncodedBuilder {
    fn build(&self, request: &HttpRequest, parameters: &Parameters) -> Result<HttpRequest, BuildError> {
        let mut built = request.clone();
        if parameters.is_empty() {
            return Ok(built);
        }

        let encoded = query_string(parameters, &self.config)?;
        if request.encodes_parameters_in_query() {
            append_query(&mut built, &encoded);
        } else {
            let content_type = format!("application/x-www-form-urlencoded; charset={}", self.config.string_encoding.charset());
            set_default_content_type(&mut built, &content_type)?;
            built.body = Some(Bytes::from(encoded));
        }
        Ok(built)
    }
}

/// JSON body for body-bearing methods; query string otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBuilder {
    config: BuilderConfig,
}

impl JsonBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(config: BuilderConfig) -> Self { Self { config } }

    #[must_use]
    pub fn string_encoding(mut self, encoding: StringEncoding) -> Self {
        self.config.string_encoding = encoding;
        self
    }

    pub fn config(&self) -> &BuilderConfig { &self.config }
}

impl RequestBuilder for JsonBuilder {
    fn build(&self, request: &HttpRequest, parameters: &Parameters) -> Result<HttpRequest, BuildError> {
        let mut built = request.clone();
        if parameters.is_empty() {
            return Ok(built);
        }

        if request.encodes_parameters_in_query() {
            let encoded = query_string(parameters, &self.config)?;
            append_query(&mut built, &encoded);
            return Ok(built);
        }

        let object = Value::Object(parameters.clone());
        check_representable(&object, self.config.string_encoding)?;
        let body = serde_json::to_vec(&object)?;
        set_default_content_type(&mut built, "application/json")?;
        built.body = Some(Bytes::from(body));
        Ok(built)
    }
}

fn append_query(request: &mut HttpRequest, encoded: &str) {
    if encoded.is_empty() {
        return;
    }
    let query = match request.url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded.to_string(),
    };
    request.url.set_query(Some(&query));
}

/// A content type already present on the template wins.
fn set_default_content_type(request: &mut HttpRequest, value: &str) -> Result<(), BuildError> {
    if !request.headers.contains_key(header::CONTENT_TYPE) {
        request.headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(value)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use proptest::prelude::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters { value.as_object().cloned().unwrap() }

    #[test]
    fn test_get_parameters_go_to_query() {
        let request = HttpRequest::get("https://api.example.com/movies?api_key=k").unwrap();
        let built = UrlEncodedBuilder::new()
            .build(&request, &params(json!({ "query": "matrix" })))
            .unwrap();

        assert_eq!(built.url.as_str(), "https://api.example.com/movies?api_key=k&query=matrix");
        assert!(built.body.is_none());
        assert!(!built.headers.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_post_parameters_go_to_form_body() {
        let request = HttpRequest::post("https://api.example.com/login").unwrap();
        let built = UrlEncodedBuilder::new()
            .build(&request, &params(json!({ "user": "neo", "pass": "red pill" })))
            .unwrap();

        assert_eq!(built.url.query(), None);
        assert_eq!(built.body.as_deref(), Some(&b"pass=red%20pill&user=neo"[..]));
        assert_eq!(
            built.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded; charset=utf-8"
        );
    }

    #[test]
    fn test_json_builder_body() {
        let request = HttpRequest::post("https://api.example.com/lists").unwrap();
        let built = JsonBuilder::new()
            .build(&request, &params(json!({ "name": "Favourites", "items": [603] })))
            .unwrap();

        assert_eq!(built.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        let body: Value = serde_json::from_slice(built.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({ "name": "Favourites", "items": [603] }));
    }

    #[test]
    fn test_json_builder_uses_query_for_get() {
        let request = HttpRequest::get("https://api.example.com/search").unwrap();
        let built = JsonBuilder::new().build(&request, &params(json!({ "q": "x y" }))).unwrap();

        assert_eq!(built.url.query(), Some("q=x%20y"));
        assert!(built.body.is_none());
    }

    #[test]
    fn test_existing_content_type_is_kept() {
        let request = HttpRequest::post("https://api.example.com/lists")
            .unwrap()
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/vnd.api+json"));
        let built = JsonBuilder::new().build(&request, &params(json!({ "a": 1 }))).unwrap();

        assert_eq!(built.headers.get(header::CONTENT_TYPE).unwrap(), "application/vnd.api+json");
    }

    #[test]
    fn test_empty_parameters_leave_request_untouched() {
        let request = HttpRequest::post("https://api.example.com/ping").unwrap().with_body("raw");
        let built = UrlEncodedBuilder::new().build(&request, &Parameters::new()).unwrap();
        assert_eq!(built, request);
    }

    #[test]
    fn test_json_builder_rejects_unrepresentable_strings() {
        let request = HttpRequest::parse(Method::PUT, "https://api.example.com/x").unwrap();
        let builder = JsonBuilder::new().string_encoding(StringEncoding::Ascii);
        let err = builder.build(&request, &params(json!({ "title": "Léon" }))).unwrap_err();
        assert!(matches!(err, BuildError::Encoding { .. }));
    }

    fn arb_parameters() -> impl Strategy<Value = Parameters> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "\\PC{0,12}".prop_map(Value::from),
            Just(Value::Null),
        ];
        let value = leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        });
        prop::collection::btree_map("\\PC{1,8}", value, 0..6).prop_map(|map| map.into_iter().collect())
    }

    fn arb_method() -> impl Strategy<Value = Method> {
        prop_oneof![Just(Method::GET), Just(Method::POST), Just(Method::PUT), Just(Method::DELETE)]
    }

    proptest! {
        #[test]
        fn test_build_never_mutates_template(method in arb_method(), parameters in arb_parameters(), ascii in any::<bool>()) {
            let request = HttpRequest::parse(method, "https://api.example.com/items?fixed=1").unwrap();
            let snapshot = request.clone();
            let encoding = if ascii { StringEncoding::Ascii } else { StringEncoding::Utf8 };

            let _ = UrlEncodedBuilder::new().string_encoding(encoding).build(&request, &parameters);
            let _ = JsonBuilder::new().string_encoding(encoding).build(&request, &parameters);

            prop_assert_eq!(request, snapshot);
        }

        #[test]
        fn test_utf8_query_keeps_existing_query_prefix(parameters in arb_parameters()) {
            let request = HttpRequest::get("https://api.example.com/items?fixed=1").unwrap();
            let built = UrlEncodedBuilder::new().build(&request, &parameters).unwrap();
            let query = built.url.query().unwrap_or_default().to_string();
            prop_assert!(query.starts_with("fixed=1"));
            prop_assert!(!query.contains(' '));
        }
    }
}
