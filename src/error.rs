//! Error types for the interception cache.

use thiserror::Error;

/// Errors surfaced by the worker, its store and its network seam.
#[derive(Error, Debug)]
pub enum Error {
  /// A manifest asset could not be fetched during install.
  #[error("Install failed for {url}: {reason}")]
  Install { url: String, reason: String },

  /// Transport-level failure talking to the network.
  #[error("Network error: {0}")]
  Network(String),

  /// Cache store failure.
  #[error("Storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  /// Header encoding in the store.
  #[error("Serialization error: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("Invalid URL '{input}': {source}")]
  InvalidUrl {
    input: String,
    #[source]
    source: url::ParseError,
  },

  /// A lifecycle event arrived in a state that does not accept it.
  #[error("Worker cannot {event} while {state}")]
  InvalidState {
    event: &'static str,
    state: &'static str,
  },

  #[error("No committed cache generation named {0}")]
  UnknownGeneration(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// Stored timestamp did not parse.
  #[error("Invalid timestamp: {0}")]
  Timestamp(#[from] chrono::ParseError),

  #[error("Lock poisoned: {0}")]
  Lock(String),
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    Self::Network(e.to_string())
  }
}

/// A specialized `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
