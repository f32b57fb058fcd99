//! Request identity and cached response metadata.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::http::{Request, Response};

/// Identity of a cached request: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.to_string(),
    }
  }

  /// Key of a request, ignoring the fragment the way cache matching does.
  pub fn of(request: &Request) -> Self {
    let mut url = request.url.clone();
    url.set_fragment(None);
    Self::new(&request.method, url.as_str())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A response read back from a cache generation.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Listing row for one cached entry (body not loaded).
#[derive(Debug, Clone)]
pub struct EntrySummary {
  pub key: RequestKey,
  pub status: u16,
  pub size: usize,
  pub digest: String,
  pub cached_at: DateTime<Utc>,
}

/// A committed cache generation.
#[derive(Debug, Clone)]
pub struct Generation {
  pub name: String,
  pub created_at: DateTime<Utc>,
  pub activated_at: Option<DateTime<Utc>>,
  pub entry_count: usize,
}

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live network response
  Network,
  /// Network failed, served from the active generation
  Cache,
}

impl fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Network => f.write_str("network"),
      Self::Cache => f.write_str("cache"),
    }
  }
}

/// Hex SHA-256 of a response body.
pub fn body_digest(body: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body);
  hex::encode(hasher.finalize())
}
