//! Per-request routing policy.

use serde::Deserialize;
use url::Url;

use crate::config::WorkerConfig;

/// What the worker does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
  /// Straight to the network; the cache is never read or written
  Bypass,
  /// Network first, one exact-key cache lookup if the network fails
  NetworkFirstWithFallback,
}

/// Predicate over a request URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
  /// Substring anywhere in the serialized URL, query included
  UrlContains(String),
  /// Prefix of the URL path
  PathPrefix(String),
}

impl Matcher {
  pub fn matches(&self, url: &Url) -> bool {
    match self {
      Self::UrlContains(needle) => url.as_str().contains(needle.as_str()),
      Self::PathPrefix(prefix) => url.path().starts_with(prefix.as_str()),
    }
  }
}

/// One configured rule, e.g. `{ match: { path_prefix: /docs/ }, route: bypass }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
  #[serde(rename = "match")]
  pub matcher: Matcher,
  pub route: Route,
}

/// Ordered rules; first match wins, unmatched requests get `fallback`.
#[derive(Debug, Clone)]
pub struct RoutingTable {
  rules: Vec<Rule>,
  fallback: Route,
}

impl RoutingTable {
  pub fn new(fallback: Route) -> Self {
    Self {
      rules: Vec::new(),
      fallback,
    }
  }

  /// Configured `routes` first, in order, then one bypass rule per dynamic
  /// marker.
  pub fn from_config(config: &WorkerConfig) -> Self {
    let table = config
      .routes
      .iter()
      .cloned()
      .fold(Self::new(Route::NetworkFirstWithFallback), |table, rule| {
        table.with_rule(rule.matcher, rule.route)
      });
    config.dynamic_markers.iter().fold(table, |table, marker| {
      table.with_rule(Matcher::UrlContains(marker.clone()), Route::Bypass)
    })
  }

  pub fn with_rule(mut self, matcher: Matcher, route: Route) -> Self {
    self.rules.push(Rule { matcher, route });
    self
  }

  pub fn classify(&self, url: &Url) -> Route {
    self
      .rules
      .iter()
      .find(|rule| rule.matcher.matches(url))
      .map_or(self.fallback, |rule| rule.route)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  fn default_table() -> RoutingTable {
    RoutingTable::from_config(&WorkerConfig::default())
  }

  #[test]
  fn test_api_and_health_bypass() {
    let table = default_table();
    assert_eq!(
      table.classify(&url("http://localhost:8000/api/v1/scan/project")),
      Route::Bypass
    );
    assert_eq!(table.classify(&url("http://localhost:8000/health")), Route::Bypass);
    // Substring match also catches longer paths and query strings
    assert_eq!(table.classify(&url("http://localhost:8000/healthz")), Route::Bypass);
    assert_eq!(
      table.classify(&url("http://localhost:3000/page?next=/api/x")),
      Route::Bypass
    );
  }

  #[test]
  fn test_static_assets_are_network_first() {
    let table = default_table();
    for u in [
      "http://localhost:3000/",
      "http://localhost:3000/manifest.json",
      "http://localhost:3000/styles/globals.css",
      "http://localhost:3000/api",
    ] {
      assert_eq!(table.classify(&url(u)), Route::NetworkFirstWithFallback, "{u}");
    }
  }

  #[test]
  fn test_first_matching_rule_wins() {
    let table = RoutingTable::new(Route::Bypass)
      .with_rule(Matcher::PathPrefix("/api/docs".into()), Route::NetworkFirstWithFallback)
      .with_rule(Matcher::PathPrefix("/api/".into()), Route::Bypass);

    assert_eq!(
      table.classify(&url("http://x/api/docs/index.html")),
      Route::NetworkFirstWithFallback
    );
    assert_eq!(table.classify(&url("http://x/api/v1/scan")), Route::Bypass);
    assert_eq!(table.classify(&url("http://x/other")), Route::Bypass);
  }

  #[test]
  fn test_configured_routes_run_before_markers() {
    let config = WorkerConfig {
      routes: vec![Rule {
        matcher: Matcher::PathPrefix("/api/docs/".into()),
        route: Route::NetworkFirstWithFallback,
      }],
      ..WorkerConfig::default()
    };
    let table = RoutingTable::from_config(&config);

    assert_eq!(
      table.classify(&url("http://x/api/docs/index.html")),
      Route::NetworkFirstWithFallback
    );
    assert_eq!(table.classify(&url("http://x/api/v1/scan")), Route::Bypass);
    assert_eq!(table.classify(&url("http://x/health")), Route::Bypass);
  }

  #[test]
  fn test_path_prefix_ignores_query() {
    let matcher = Matcher::PathPrefix("/api/".into());
    assert!(!matcher.matches(&url("http://x/home?ref=/api/")));
    assert!(matcher.matches(&url("http://x/api/v1")));
  }
}
