//! Reverse-proxy host: every incoming request is handed to the worker.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Router;
use tracing::{info, warn};

use crate::http::{Request, Response};
use crate::worker::RequestResolver;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
  "connection",
  "keep-alive",
  "proxy-authenticate",
  "proxy-authorization",
  "te",
  "trailer",
  "transfer-encoding",
  "upgrade",
  "host",
  "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
  HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

#[derive(Clone)]
struct AppState {
  worker: Arc<dyn RequestResolver>,
  origin: url::Url,
}

pub fn router(worker: Arc<dyn RequestResolver>, origin: url::Url) -> Router {
  Router::new()
    .fallback(intercept)
    .with_state(AppState { worker, origin })
}

pub async fn serve(
  worker: Arc<dyn RequestResolver>,
  origin: url::Url,
  addr: SocketAddr,
) -> std::io::Result<()> {
  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!(%addr, %origin, "proxy listening");
  axum::serve(listener, router(worker, origin)).await
}

async fn intercept(State(state): State<AppState>, req: axum::extract::Request) -> AxumResponse {
  let request = match into_worker_request(&state.origin, req).await {
    Ok(request) => request,
    Err(status) => return status.into_response(),
  };

  let method = request.method.clone();
  let url = request.url.to_string();
  match state.worker.resolve(request).await {
    Ok(resolved) => {
      info!(%method, %url, status = resolved.response.status, source = %resolved.source, "resolved");
      into_axum_response(resolved.response)
    }
    Err(e) => {
      warn!(%method, %url, error = %e, "request failed");
      StatusCode::BAD_GATEWAY.into_response()
    }
  }
}

async fn into_worker_request(
  origin: &url::Url,
  req: axum::extract::Request,
) -> Result<Request, StatusCode> {
  let (parts, body) = req.into_parts();
  // Only the path and query are taken from the request target, so the
  // request always stays on the page's origin.
  let mut url = origin.clone();
  url.set_path(parts.uri.path());
  url.set_query(parts.uri.query());
  if url.origin() != origin.origin() {
    return Err(StatusCode::BAD_REQUEST);
  }

  let headers = parts
    .headers
    .iter()
    .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_string(), v.to_string()))
    })
    .collect();

  let body = to_bytes(body, MAX_BODY_BYTES)
    .await
    .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

  let mut request = Request::new(parts.method.as_str(), url).with_body(body);
  request.headers = headers;
  Ok(request)
}

fn into_axum_response(response: Response) -> AxumResponse {
  let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
  let mut out = AxumResponse::new(Body::from(response.body));
  *out.status_mut() = status;

  let headers = out.headers_mut();
  for (name, value) in &response.headers {
    if is_hop_by_hop(name) {
      continue;
    }
    if let (Ok(name), Ok(value)) = (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(value),
    ) {
      headers.append(name, value);
    }
  }
  out
}
