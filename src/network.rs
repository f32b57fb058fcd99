//! The network the worker forwards requests to.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{redirect, Method};

use crate::error::{Error, Result};
use crate::http::{Request, Response};

/// Redirect hops followed when fetching install assets.
const MAX_ASSET_REDIRECTS: usize = 10;

/// Network capability. A returned `Err` means the request never produced a
/// response; any HTTP status, including 4xx and 5xx, is an `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
  /// Forward a page request as is; redirects are handed back to the page.
  async fn fetch(&self, request: &Request) -> Result<Response>;

  /// Fetch an install asset, following redirects to the final response.
  async fn fetch_asset(&self, request: &Request) -> Result<Response> {
    self.fetch(request).await
  }
}

/// reqwest-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  asset_client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    Ok(Self {
      client: Self::client(redirect::Policy::none())?,
      asset_client: Self::client(redirect::Policy::limited(MAX_ASSET_REDIRECTS))?,
    })
  }

  fn client(policy: redirect::Policy) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("vyncr-cache/", env!("CARGO_PKG_VERSION")))
      .redirect(policy)
      .build()?;
    Ok(client)
  }

  async fn send(client: &reqwest::Client, request: &Request) -> Result<Response> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| Error::Network(format!("invalid method {}: {}", request.method, e)))?;

    let mut builder = client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      // Headers that don't survive conversion are dropped rather than failing the request
      match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
      ) {
        (Ok(name), Ok(value)) => builder = builder.header(name, value),
        _ => tracing::debug!(header = %name, "dropping unrepresentable request header"),
      }
    }
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let resp = builder.send().await?;
    let status = resp.status().as_u16();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = resp.bytes().await?;

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    Self::send(&self.client, request).await
  }

  async fn fetch_asset(&self, request: &Request) -> Result<Response> {
    Self::send(&self.asset_client, request).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::response::Redirect;
  use axum::routing::get;
  use axum::Router;
  use std::sync::Arc;
  use url::Url;

  use crate::cache::{CacheStorage, RequestKey, SqliteStorage};
  use crate::config::WorkerConfig;
  use crate::worker::{CacheWorker, RequestResolver};

  /// Local origin where `/` redirects to `/home`.
  async fn redirecting_origin() -> Url {
    let app = Router::new()
      .route("/", get(|| async { Redirect::temporary("/home") }))
      .route("/home", get(|| async { "<html>home</html>" }))
      .route("/manifest.json", get(|| async { "{}" }))
      .route("/styles/globals.css", get(|| async { "body{}" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    Url::parse(&format!("http://{addr}")).unwrap()
  }

  #[tokio::test]
  async fn test_page_fetch_returns_redirect_asset_fetch_follows_it() {
    let origin = redirecting_origin().await;
    let network = HttpNetwork::new().unwrap();
    let request = Request::get(origin.join("/").unwrap());

    let page = network.fetch(&request).await.unwrap();
    assert_eq!(page.status, 307);
    assert_eq!(page.header("location"), Some("/home"));

    let asset = network.fetch_asset(&request).await.unwrap();
    assert_eq!(asset.status, 200);
    assert_eq!(asset.body.as_ref(), b"<html>home</html>");
  }

  #[tokio::test]
  async fn test_install_caches_redirect_target_under_manifest_path() {
    let origin = redirecting_origin().await;
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let worker = CacheWorker::new(
      WorkerConfig::default(),
      origin.clone(),
      Arc::new(HttpNetwork::new().unwrap()),
      Arc::clone(&storage),
    );

    worker.on_install().await.unwrap();

    let root = RequestKey::new("GET", origin.join("/").unwrap().as_str());
    let entry = storage.lookup("vyncr-v1", &root).unwrap().unwrap();
    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.body.as_ref(), b"<html>home</html>");
    assert_eq!(storage.entries("vyncr-v1").unwrap().len(), 3);
  }
}
