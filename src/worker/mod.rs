//! The interception cache worker.
//!
//! The worker sits between the page and the network. It owns one cache
//! generation, pre-populates it at install, purges older generations at
//! activation and resolves each intercepted request by route:
//! - `Bypass` requests always go to the network, the cache is untouched
//! - Everything else is network-first with a single cache lookup on failure

mod lifecycle;
mod routing;
#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::Lifecycle;
pub use routing::{Matcher, Route, RoutingTable, Rule};

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStorage, RequestKey, ResponseSource};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::network::Network;

/// A resolved response and where it came from.
#[derive(Debug, Clone)]
pub struct Resolved {
  pub response: Response,
  pub source: ResponseSource,
}

impl Resolved {
  fn network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }
}

/// Lifecycle hooks and request resolution, independent of how the host
/// dispatches events.
#[async_trait]
pub trait RequestResolver: Send + Sync {
  /// Pre-populate the cache generation. Must finish before the worker serves.
  async fn on_install(&self) -> Result<()>;

  /// Take over as the active generation, returning the generations purged.
  async fn on_activate(&self) -> Result<Vec<String>>;

  /// Resolve one intercepted request.
  async fn resolve(&self, request: Request) -> Result<Resolved>;
}

pub struct CacheWorker<N: Network, S: CacheStorage> {
  config: WorkerConfig,
  origin: Url,
  routes: RoutingTable,
  network: Arc<N>,
  storage: Arc<S>,
  state: Mutex<Lifecycle>,
}

impl<N: Network, S: CacheStorage> CacheWorker<N, S> {
  pub fn new(config: WorkerConfig, origin: Url, network: Arc<N>, storage: Arc<S>) -> Self {
    let routes = RoutingTable::from_config(&config);
    Self {
      config,
      origin,
      routes,
      network,
      storage,
      state: Mutex::new(Lifecycle::Parsed),
    }
  }

  /// Start active on a generation that is already committed, skipping
  /// install. Used to keep serving the previous generation.
  pub fn resume(self) -> Result<Self> {
    self.ensure_committed()?;
    self.set_state(Lifecycle::Active)?;
    info!(cache = %self.config.cache_name, "resumed existing cache generation");
    Ok(self)
  }

  /// Pick up a generation committed by an earlier install that was never
  /// activated, leaving the worker waiting in `Installed`.
  pub fn adopt_installed(self) -> Result<Self> {
    self.ensure_committed()?;
    self.transition("adopt", Lifecycle::Parsed, Lifecycle::Installed)?;
    Ok(self)
  }

  fn ensure_committed(&self) -> Result<()> {
    let known = self
      .storage
      .generations()?
      .iter()
      .any(|g| g.name == self.config.cache_name);
    if known {
      Ok(())
    } else {
      Err(Error::UnknownGeneration(self.config.cache_name.clone()))
    }
  }

  pub fn cache_name(&self) -> &str {
    &self.config.cache_name
  }

  pub fn state(&self) -> Result<Lifecycle> {
    self
      .state
      .lock()
      .map(|s| *s)
      .map_err(|e| Error::Lock(e.to_string()))
  }

  fn set_state(&self, next: Lifecycle) -> Result<()> {
    let mut state = self.state.lock().map_err(|e| Error::Lock(e.to_string()))?;
    debug!(from = %*state, to = %next, "worker state change");
    *state = next;
    Ok(())
  }

  /// Move from `expected` to `next` atomically, or report the current state.
  fn transition(&self, event: &'static str, expected: Lifecycle, next: Lifecycle) -> Result<()> {
    let mut state = self.state.lock().map_err(|e| Error::Lock(e.to_string()))?;
    if *state != expected {
      return Err(Error::InvalidState {
        event,
        state: state.name(),
      });
    }
    debug!(from = %*state, to = %next, "worker state change");
    *state = next;
    Ok(())
  }

  /// Resolve a path or absolute URL against the origin.
  pub fn request_for(&self, path: &str) -> Result<Request> {
    let url = self.origin.join(path).map_err(|source| Error::InvalidUrl {
      input: path.to_string(),
      source,
    })?;
    Ok(Request::get(url))
  }

  /// Fetch every manifest asset and commit them in one write.
  async fn populate(&self) -> Result<usize> {
    let requests = self
      .config
      .offline_assets
      .iter()
      .map(|path| self.request_for(path))
      .collect::<Result<Vec<_>>>()?;

    let entries = try_join_all(requests.iter().map(|request| async move {
      let url = request.url.to_string();
      let response = self
        .network
        .fetch_asset(request)
        .await
        .map_err(|e| Error::Install {
          url: url.clone(),
          reason: e.to_string(),
        })?;
      if !response.is_ok() {
        return Err(Error::Install {
          url,
          reason: format!("status {}", response.status),
        });
      }
      Ok((RequestKey::of(request), response))
    }))
    .await?;

    self.storage.put_all(&self.config.cache_name, &entries)?;
    Ok(entries.len())
  }

  fn purge_stale_generations(&self) -> Result<Vec<String>> {
    let mut purged = Vec::new();
    for generation in self.storage.generations()? {
      if generation.name != self.config.cache_name && self.storage.delete_generation(&generation.name)? {
        info!(cache = %generation.name, entries = generation.entry_count, "purged stale cache generation");
        purged.push(generation.name);
      }
    }
    Ok(purged)
  }

  async fn network_first(&self, request: Request) -> Result<Resolved> {
    match self.network.fetch(&request).await {
      Ok(response) => {
        if self.config.write_through && request.method.eq_ignore_ascii_case("GET") && response.is_ok() {
          let key = RequestKey::of(&request);
          if let Err(e) = self.storage.put(&self.config.cache_name, &key, &response) {
            warn!(%key, error = %e, "write-through failed");
          }
        }
        Ok(Resolved::network(response))
      }
      Err(network_err) => {
        let key = RequestKey::of(&request);
        match self.storage.lookup(&self.config.cache_name, &key) {
          Ok(Some(entry)) => {
            info!(%key, cached_at = %entry.cached_at, "network failed, serving cached copy");
            Ok(Resolved {
              response: entry.response,
              source: ResponseSource::Cache,
            })
          }
          Ok(None) => {
            debug!(%key, "network failed and nothing cached");
            Err(network_err)
          }
          Err(e) => {
            warn!(%key, error = %e, "cache lookup failed");
            Err(network_err)
          }
        }
      }
    }
  }
}

#[async_trait]
impl<N: Network, S: CacheStorage> RequestResolver for CacheWorker<N, S> {
  async fn on_install(&self) -> Result<()> {
    self.transition("install", Lifecycle::Parsed, Lifecycle::Installing)?;
    info!(cache = %self.config.cache_name, assets = self.config.offline_assets.len(), "installing");

    match self.populate().await {
      Ok(count) => {
        self.set_state(Lifecycle::Installed)?;
        info!(cache = %self.config.cache_name, entries = count, "installed");
        Ok(())
      }
      Err(e) => {
        self.set_state(Lifecycle::Redundant)?;
        warn!(cache = %self.config.cache_name, error = %e, "install failed, discarding worker");
        Err(e)
      }
    }
  }

  async fn on_activate(&self) -> Result<Vec<String>> {
    self.transition("activate", Lifecycle::Installed, Lifecycle::Activating)?;

    let activated = self
      .purge_stale_generations()
      .and_then(|purged| self.storage.mark_active(&self.config.cache_name).map(|()| purged));

    match activated {
      Ok(purged) => {
        self.set_state(Lifecycle::Active)?;
        info!(cache = %self.config.cache_name, purged = purged.len(), "activated");
        Ok(purged)
      }
      Err(e) => {
        self.set_state(Lifecycle::Installed)?;
        Err(e)
      }
    }
  }

  async fn resolve(&self, request: Request) -> Result<Resolved> {
    if !self.state()?.controls_page() {
      return self.network.fetch(&request).await.map(Resolved::network);
    }

    match self.routes.classify(&request.url) {
      Route::Bypass => {
        debug!(url = %request.url, "bypassing cache");
        self.network.fetch(&request).await.map(Resolved::network)
      }
      Route::NetworkFirstWithFallback => self.network_first(request).await,
    }
  }
}
