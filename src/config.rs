use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::worker::Rule;

const APP_NAME: &str = "vyncr-cache";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the page is served from; manifest paths resolve against it
  pub origin: String,
  /// Address the proxy host listens on
  pub listen: String,
  /// Cache database location (defaults to the data directory)
  pub database: Option<PathBuf>,
  pub worker: WorkerConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      listen: "127.0.0.1:8787".to_string(),
      database: None,
      worker: WorkerConfig::default(),
    }
  }
}

/// Policy the interception worker runs with.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
  /// Identifies the active cache generation. Changing it invalidates
  /// everything cached under the previous name.
  pub cache_name: String,
  /// Paths pre-populated at install, in order
  pub offline_assets: Vec<String>,
  /// URL substrings that are always served live
  pub dynamic_markers: Vec<String>,
  /// Store successful static responses so fallbacks track the latest copy.
  /// Off by default: the cache then only ever holds the install snapshot.
  pub write_through: bool,
  /// Extra routing rules, checked in order before the dynamic markers
  pub routes: Vec<Rule>,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      cache_name: "vyncr-v1".to_string(),
      offline_assets: vec![
        "/".to_string(),
        "/manifest.json".to_string(),
        "/styles/globals.css".to_string(),
      ],
      dynamic_markers: vec!["/api/".to_string(), "/health".to_string()],
      write_through: false,
      routes: Vec::new(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vyncr-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vyncr-cache/config.yaml
  ///
  /// Without any file the built-in defaults are used. `VYNCR_ORIGIN`
  /// overrides the origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("no config file found, using defaults");
        Self::default()
      }
    };

    if let Ok(origin) = std::env::var("VYNCR_ORIGIN") {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from(format!("{APP_NAME}.yaml"));
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;
    if self.worker.cache_name.trim().is_empty() {
      return Err(eyre!("worker.cache_name must not be empty"));
    }
    Ok(())
  }

  /// The origin as a parsed URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Cache database path, explicit or under the data directory.
  pub fn database_path(&self) -> PathBuf {
    self
      .database
      .clone()
      .unwrap_or_else(crate::cache::SqliteStorage::default_path)
  }
}

/// Per-user data directory for the cache database and logs.
pub fn data_dir() -> PathBuf {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .unwrap_or_else(|| PathBuf::from("."))
    .join(APP_NAME)
}
