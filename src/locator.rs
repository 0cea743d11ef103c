use std::{borrow::Cow, fmt, str::FromStr};

use percent_encoding::percent_decode_str;
use thiserror::Error;

pub const S3_SCHEME: &str = "s3";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("locator '{0}' is not an s3:// URI")]
    UnsupportedScheme(String),
    #[error("locator '{0}' has no bucket")]
    MissingBucket(String),
    #[error("locator '{0}' has no object key")]
    MissingKey(String),
}

/// An `s3://bucket/key` locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Uri {
    bucket: String,
    key: String,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let rest = raw
            .strip_prefix("s3://")
            .ok_or_else(|| LocatorError::UnsupportedScheme(raw.to_string()))?;

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| LocatorError::MissingKey(raw.to_string()))?;

        if bucket.is_empty() {
            return Err(LocatorError::MissingBucket(raw.to_string()));
        }
        if key.is_empty() || key.ends_with('/') {
            return Err(LocatorError::MissingKey(raw.to_string()));
        }

        Ok(Self::new(bucket, key))
    }

    pub fn scheme(&self) -> &'static str {
        S3_SCHEME
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", S3_SCHEME, self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Percent-decodes a locator string. Invalid UTF-8 sequences are replaced
/// rather than rejected.
pub fn decode_locator(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// Last `/`-separated segment of any locator-like string.
pub fn display_name(locator: &str) -> &str {
    locator.rsplit('/').next().unwrap_or(locator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_nested_key() {
        let uri = S3Uri::parse("s3://docs-bucket/reports/2024/q1.pdf").unwrap();
        assert_eq!(uri.scheme(), "s3");
        assert_eq!(uri.bucket(), "docs-bucket");
        assert_eq!(uri.key(), "reports/2024/q1.pdf");
        assert_eq!(uri.file_name(), "q1.pdf");
        assert_eq!(uri.to_string(), "s3://docs-bucket/reports/2024/q1.pdf");
    }

    #[test]
    fn rejects_malformed_locators() {
        assert!(matches!(
            S3Uri::parse("https://example.com/a.pdf"),
            Err(LocatorError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            S3Uri::parse("s3:///a.pdf"),
            Err(LocatorError::MissingBucket(_))
        ));
        assert!(matches!(
            S3Uri::parse("s3://bucket"),
            Err(LocatorError::MissingKey(_))
        ));
        assert!(matches!(
            S3Uri::parse("s3://bucket/folder/"),
            Err(LocatorError::MissingKey(_))
        ));
    }

    #[test]
    fn decoding_is_a_no_op_on_decoded_input() {
        let once = decode_locator("s3://bucket/annual%20report.pdf").into_owned();
        assert_eq!(once, "s3://bucket/annual report.pdf");
        assert_eq!(decode_locator(&once), once);
    }

    #[test]
    fn display_name_takes_last_segment() {
        assert_eq!(display_name("s3://bucket/a/b/c.pdf"), "c.pdf");
        assert_eq!(display_name("plain.pdf"), "plain.pdf");
    }
}
