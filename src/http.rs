//! Request and response values exchanged with the page client and the network.

use bytes::Bytes;
use url::Url;

/// Ordered header list, names kept as received.
pub type Headers = Vec<(String, String)>;

/// An intercepted request.
///
/// Only the URL influences routing; method and headers are carried through
/// to the network untouched.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub headers: Headers,
  pub body: Bytes,
}

impl Request {
  pub fn new(method: impl Into<String>, url: Url) -> Self {
    Self {
      method: method.into(),
      url,
      headers: Vec::new(),
      body: Bytes::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = body.into();
    self
  }
}

/// A resolved response, either live from the network or replayed from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Headers,
  pub body: Bytes,
}

#[allow(dead_code)]
impl Response {
  pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Whether the status is in the 2xx range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value matching `name`, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
