//! Conditional request evaluation.
//!
//! An [`ETag`] is the quoted lowercase hex SHA-256 of a representation's
//! canonical JSON bytes. `serde_json::Value` keeps object keys sorted, so
//! two equal values always serialize, and therefore hash, identically.
//!
//! [`evaluate`] compares `If-Match` / `If-None-Match` against the current
//! validator and decides whether the request may proceed.

use http::{header, HeaderMap, Method};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A strong entity validator, stored with its surrounding quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    /// Derives the validator of a JSON representation.
    #[must_use]
    pub fn for_value(value: &Value) -> Self {
        Self::for_bytes(&serde_json::to_vec(value).unwrap_or_default())
    }

    /// Derives the validator of serialized bytes.
    #[must_use]
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!("\"{}\"", hex::encode(Sha256::digest(bytes))))
    }

    /// Returns the quoted header form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the validator without quotes.
    #[must_use]
    pub fn opaque(&self) -> &str {
        self.0.trim_matches('"')
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed `If-Match` / `If-None-Match` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorList {
    /// `*`: matches any current representation.
    Any,
    /// Opaque validators, quotes and `W/` prefixes stripped.
    Tags(Vec<String>),
}

impl ValidatorList {
    /// Parses all values of `name` in `headers`, or `None` if absent.
    ///
    /// Repeated headers are merged into one list.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, name: &header::HeaderName) -> Option<Self> {
        let mut values = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .peekable();
        values.peek()?;

        let mut tags = Vec::new();
        for value in values {
            match Self::parse(value) {
                Self::Any => return Some(Self::Any),
                Self::Tags(parsed) => tags.extend(parsed),
            }
        }
        Some(Self::Tags(tags))
    }

    /// Parses a comma-separated validator list.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut tags = Vec::new();
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item == "*" {
                return Self::Any;
            }
            let item = item.strip_prefix("W/").unwrap_or(item);
            tags.push(item.trim_matches('"').to_string());
        }
        Self::Tags(tags)
    }

    /// Returns `true` if the list is `*` or contains `etag`.
    #[must_use]
    pub fn matches(&self, etag: &ETag) -> bool {
        match self {
            Self::Any => true,
            Self::Tags(tags) => tags.iter().any(|tag| tag == etag.opaque()),
        }
    }
}

/// Outcome of conditional evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Run the handler.
    Proceed,
    /// Answer 304 without a body.
    NotModified,
    /// Answer 412; the request must not take effect.
    Failed,
}

/// Evaluates the request's conditional headers against `etag`.
///
/// `If-Match` is checked first for every method: present and not matching
/// means [`Precondition::Failed`]. For safe methods a matching
/// `If-None-Match` then yields [`Precondition::NotModified`].
#[must_use]
pub fn evaluate(method: &Method, headers: &HeaderMap, etag: &ETag) -> Precondition {
    if let Some(if_match) = ValidatorList::from_headers(headers, &header::IF_MATCH) {
        if !if_match.matches(etag) {
            return Precondition::Failed;
        }
    }

    if is_safe(method) {
        if let Some(if_none_match) = ValidatorList::from_headers(headers, &header::IF_NONE_MATCH) {
            if if_none_match.matches(etag) {
                return Precondition::NotModified;
            }
        }
    }

    Precondition::Proceed
}

fn is_safe(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}
