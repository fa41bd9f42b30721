//! Resume tokens for interrupted downloads.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const RESUME_FORMAT_VERSION: u32 = 1;

/// Opaque state that lets an interrupted download continue where it stopped.
///
/// Hand the bytes back to `HttpSession::resume_download_with_data`; their
/// layout is private and may change between versions.
#[derive(Clone, PartialEq, Eq)]
pub struct ResumeToken(Vec<u8>);

impl ResumeToken {
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn into_bytes(self) -> Vec<u8> { self.0 }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn len(&self) -> usize { self.0.len() }
}

impl From<Vec<u8>> for ResumeToken {
    fn from(bytes: Vec<u8>) -> Self { Self(bytes) }
}

impl fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResumeToken({} bytes)", self.0.len())
    }
}

/// Decoded contents of a [`ResumeToken`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ResumeData {
    pub version: u32,

    /// URL the partial content came from.
    pub url: String,

    /// Request headers to replay, minus range and credential headers.
    pub headers: Vec<(String, String)>,

    /// File holding the bytes received so far.
    pub partial_path: PathBuf,

    pub bytes_received: u64,

    /// Full resource size, if it was known.
    pub total_bytes: Option<u64>,

    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ResumeData {
    pub fn new(url: String, partial_path: PathBuf) -> Self {
        Self {
            version: RESUME_FORMAT_VERSION,
            url,
            headers: Vec::new(),
            partial_path,
            bytes_received: 0,
            total_bytes: None,
            etag: None,
            last_modified: None,
        }
    }

    /// Value for the `Range` header that requests the missing suffix.
    pub fn range_header(&self) -> String { format!("bytes={}-", self.bytes_received) }

    /// Validator for `If-Range`; a strong ETag is preferred over a date.
    pub fn validator(&self) -> Option<&str> {
        self.etag
            .as_deref()
            .filter(|etag| !etag.starts_with("W/"))
            .or(self.last_modified.as_deref())
    }

    pub fn encode(&self) -> ResumeToken {
        // Serializing plain strings and integers into JSON cannot fail.
        ResumeToken(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(token: &ResumeToken) -> Result<Self, String> {
        let data: ResumeData =
            serde_json::from_slice(token.as_bytes()).map_err(|e| format!("malformed resume data: {e}"))?;
        if data.version != RESUME_FORMAT_VERSION {
            return Err(format!("unsupported resume data version {}", data.version));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResumeData {
        let mut data = ResumeData::new("https://example.com/file.bin".to_string(), PathBuf::from("/tmp/file.part"));
        data.bytes_received = 512;
        data.total_bytes = Some(1024);
        data
    }

    #[test]
    fn test_range_header() {
        assert_eq!(sample().range_header(), "bytes=512-");
    }

    #[test]
    fn test_validator_prefers_strong_etag() {
        let mut data = sample();
        assert_eq!(data.validator(), None);

        data.last_modified = Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string());
        assert_eq!(data.validator(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));

        data.etag = Some("W/\"weak\"".to_string());
        assert_eq!(data.validator(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));

        data.etag = Some("\"strong\"".to_string());
        assert_eq!(data.validator(), Some("\"strong\""));
    }

    #[test]
    fn test_token_decodes_to_same_data() {
        let data = sample();
        let token = data.encode();
        assert!(!token.is_empty());
        assert_eq!(ResumeData::decode(&token).unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_garbage_and_other_versions() {
        assert!(ResumeData::decode(&ResumeToken::from(b"garbage".to_vec())).is_err());

        let mut data = sample();
        data.version = 99;
        let token = ResumeToken::from(serde_json::to_vec(&data).unwrap());
        assert!(ResumeData::decode(&token).unwrap_err().contains("version"));
    }
}
