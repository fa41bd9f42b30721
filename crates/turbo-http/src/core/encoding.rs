use std::borrow::Cow;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::builder::{BuildError, BuilderConfig};
use crate::data::Parameters;

/// RFC 3986 query component: everything but unreserved characters is escaped.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Character encoding applied to parameter keys and values before they are
/// percent-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl StringEncoding {
    /// IANA charset label.
    pub fn charset(&self) -> &'static str {
        match self {
            StringEncoding::Utf8 => "utf-8",
            StringEncoding::Ascii => "us-ascii",
            StringEncoding::Latin1 => "iso-8859-1",
        }
    }

    /// Bytes of `s` in this encoding, or `None` if a character has no
    /// representation.
    pub fn encode<'a>(&self, s: &'a str) -> Option<Cow<'a, [u8]>> {
        match self {
            StringEncoding::Utf8 => Some(Cow::Borrowed(s.as_bytes())),
            _ if s.is_ascii() => Some(Cow::Borrowed(s.as_bytes())),
            StringEncoding::Ascii => None,
            StringEncoding::Latin1 => s
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect::<Option<Vec<u8>>>()
                .map(Cow::Owned),
        }
    }
}

impl fmt::Display for StringEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.charset()) }
}

/// Flatten parameters into `(key, value)` pairs.
///
/// Keys are visited in sorted order. Nested objects become `key[sub]`, array
/// items become `key[]`, and `null` yields a bare key with no value.
pub fn flatten_parameters(parameters: &Parameters) -> Vec<(String, Option<String>)> {
    let mut pairs = Vec::new();
    let mut keys: Vec<_> = parameters.iter().collect();
    keys.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in keys {
        flatten_value(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten_value(key: String, value: &Value, pairs: &mut Vec<(String, Option<String>)>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (sub, nested) in entries {
                flatten_value(format!("{key}[{sub}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_value(format!("{key}[]"), item, pairs);
            }
        }
        Value::String(s) => pairs.push((key, Some(s.clone()))),
        Value::Number(n) => pairs.push((key, Some(n.to_string()))),
        Value::Bool(b) => pairs.push((key, Some(b.to_string()))),
        Value::Null => pairs.push((key, None)),
    }
}

/// Serialize parameters as `k=v&k2=v2` per the builder configuration.
pub fn query_string(parameters: &Parameters, config: &BuilderConfig) -> Result<String, BuildError> {
    let mut encoded = Vec::new();
    for (key, value) in flatten_parameters(parameters) {
        let key = encode_component(&key, config)?;
        match value {
            Some(value) => encoded.push(format!("{key}={}", encode_component(&value, config)?)),
            None => encoded.push(key),
        }
    }
    Ok(encoded.join("&"))
}

/// Fail with [`BuildError::Encoding`] if any key or string in `value` cannot be
/// represented in `encoding`.
pub fn check_representable(value: &Value, encoding: StringEncoding) -> Result<(), BuildError> {
    let check = |s: &str| {
        encoding
            .encode(s)
            .map(|_| ())
            .ok_or_else(|| BuildError::Encoding { value: s.to_string(), encoding })
    };
    match value {
        Value::String(s) => check(s),
        Value::Array(items) => items.iter().try_for_each(|item| check_representable(item, encoding)),
        Value::Object(map) => map.iter().try_for_each(|(key, nested)| {
            check(key)?;
            check_representable(nested, encoding)
        }),
        _ => Ok(()),
    }
}

fn encode_component(s: &str, config: &BuilderConfig) -> Result<String, BuildError> {
    let bytes = config
        .string_encoding
        .encode(s)
        .ok_or_else(|| BuildError::Encoding { value: s.to_string(), encoding: config.string_encoding })?;
    if config.percent_encode_parameters {
        Ok(percent_encode(&bytes, QUERY_COMPONENT).to_string())
    } else {
        Ok(s.to_string())
    }
}
