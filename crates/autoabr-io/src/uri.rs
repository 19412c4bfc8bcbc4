//! Artifact location parsing: local paths versus `s3://bucket/key` URIs.

use std::path::PathBuf;

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("unsupported or malformed URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URI '{uri}' missing bucket component")]
    MissingBucket { uri: String },

    #[error("unsupported scheme '{scheme}' in '{uri}'")]
    UnsupportedScheme { scheme: String, uri: String },
}

impl From<UriError> for crate::error::Error {
    fn from(err: UriError) -> Self {
        crate::error::Error::Config(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl ArtifactLocation {
    /// `s3://` URIs become `S3`, `file://` URIs and bare paths become `Local`.
    pub fn parse(location: &str) -> Result<Self, UriError> {
        if !location.contains("://") {
            return Ok(ArtifactLocation::Local(PathBuf::from(location)));
        }
        let parsed = Url::parse(location).map_err(|source| UriError::InvalidUri {
            uri: location.to_string(),
            source,
        })?;
        match parsed.scheme() {
            "s3" => {
                let bucket = parsed
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| UriError::MissingBucket {
                        uri: location.to_string(),
                    })?
                    .to_string();
                // Keep the key verbatim rather than the percent-encoded URL path.
                let key = location
                    .strip_prefix("s3://")
                    .and_then(|rest| rest.split_once('/'))
                    .map(|(_, key)| key.to_string())
                    .unwrap_or_default();
                Ok(ArtifactLocation::S3 { bucket, key })
            }
            "file" => Ok(ArtifactLocation::Local(PathBuf::from(
                location.trim_start_matches("file://"),
            ))),
            other => Err(UriError::UnsupportedScheme {
                scheme: other.to_string(),
                uri: location.to_string(),
            }),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ArtifactLocation::S3 { .. })
    }
}

pub fn is_s3_uri(location: &str) -> bool {
    location.starts_with("s3://")
}

pub fn s3_uri(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key.trim_start_matches('/'))
}
