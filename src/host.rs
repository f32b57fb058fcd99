//! Bringing a worker up for the command line and the proxy.

use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::network::Network;
use crate::worker::{CacheWorker, RequestResolver};

/// Worker for the configured generation.
///
/// An already-active generation with the configured name is resumed as is.
/// Otherwise it is installed and activated; if install fails the previously
/// active generation keeps serving when there is one.
pub async fn installed_or_resumed<N: Network, S: CacheStorage>(
  config: &WorkerConfig,
  origin: &Url,
  network: &Arc<N>,
  storage: &Arc<S>,
) -> Result<CacheWorker<N, S>> {
  let previous = storage.active_generation()?;
  if previous.as_deref() == Some(config.cache_name.as_str()) {
    return worker_for(config.clone(), origin, network, storage).resume();
  }

  let worker = worker_for(config.clone(), origin, network, storage);
  let install_err = match worker.on_install().await {
    Ok(()) => {
      worker.on_activate().await?;
      return Ok(worker);
    }
    Err(e) => e,
  };

  match previous {
    Some(name) => {
      warn!(error = %install_err, cache = %name, "install failed, keeping previous generation");
      let fallback = WorkerConfig {
        cache_name: name,
        ..config.clone()
      };
      worker_for(fallback, origin, network, storage).resume()
    }
    None => Err(install_err),
  }
}

/// Activate a generation installed earlier without activation. Returns the
/// worker and the names of the generations it purged.
pub async fn activate_installed<N: Network, S: CacheStorage>(
  config: &WorkerConfig,
  origin: &Url,
  network: &Arc<N>,
  storage: &Arc<S>,
) -> Result<(CacheWorker<N, S>, Vec<String>)> {
  let worker = worker_for(config.clone(), origin, network, storage).adopt_installed()?;
  let purged = worker.on_activate().await?;
  Ok((worker, purged))
}

pub fn worker_for<N: Network, S: CacheStorage>(
  config: WorkerConfig,
  origin: &Url,
  network: &Arc<N>,
  storage: &Arc<S>,
) -> CacheWorker<N, S> {
  CacheWorker::new(config, origin.clone(), Arc::clone(network), Arc::clone(storage))
}
