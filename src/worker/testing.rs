//! Scripted network and instrumented storage for worker tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cache::{CacheStorage, CachedEntry, EntrySummary, Generation, RequestKey, SqliteStorage};
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::network::Network;

/// Network that answers from a fixed table and can be taken offline.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Response>>,
  failing: Mutex<HashSet<String>>,
  offline: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn serve(&self, url: &str, response: Response) -> &Self {
    self.routes.lock().unwrap().insert(url.to_string(), response);
    self
  }

  /// Make one URL fail at the transport level.
  pub fn fail(&self, url: &str) -> &Self {
    self.failing.lock().unwrap().insert(url.to_string());
    self
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.as_str().to_string();
    self.calls.lock().unwrap().push(url.clone());

    if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&url) {
      return Err(Error::Network(format!("connection refused: {url}")));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(&url)
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}

/// In-memory SQLite store that counts reads and writes.
pub struct CountingStorage {
  inner: SqliteStorage,
  lookups: AtomicUsize,
  writes: AtomicUsize,
}

impl CountingStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      lookups: AtomicUsize::new(0),
      writes: AtomicUsize::new(0),
    }
  }

  pub fn lookup_count(&self) -> usize {
    self.lookups.load(Ordering::SeqCst)
  }

  pub fn write_count(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }
}

impl CacheStorage for CountingStorage {
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.inner.put_all(generation, entries)
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.inner.put(generation, key, response)
  }

  fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    self.lookups.fetch_add(1, Ordering::SeqCst);
    self.inner.lookup(generation, key)
  }

  fn entries(&self, generation: &str) -> Result<Vec<EntrySummary>> {
    self.inner.entries(generation)
  }

  fn generations(&self) -> Result<Vec<Generation>> {
    self.inner.generations()
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    self.inner.delete_generation(name)
  }

  fn mark_active(&self, name: &str) -> Result<()> {
    self.inner.mark_active(name)
  }

  fn active_generation(&self) -> Result<Option<String>> {
    self.inner.active_generation()
  }
}
