mod cache;
mod config;
mod error;
mod host;
mod http;
mod logging;
mod network;
mod server;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use cache::{CacheStorage, SqliteStorage};
use config::Config;
use http::Request;
use network::HttpNetwork;
use worker::RequestResolver;

#[derive(Parser, Debug)]
#[command(name = "vyncr-cache")]
#[command(about = "Offline-first interception cache for the vyncr dashboard")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vyncr-cache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Override the cache generation name
  #[arg(long, global = true)]
  cache_name: Option<String>,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install and activate the configured cache generation
  Install {
    /// Leave the new generation installed but waiting; `activate` takes over later
    #[arg(long)]
    no_activate: bool,
  },
  /// Activate a generation installed with `--no-activate`
  Activate,
  /// Resolve a single request through the worker
  Fetch {
    /// Path (resolved against the origin) or absolute URL
    target: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Show cache generations and their entries
  List,
  /// Delete a cache generation
  Purge { name: String },
  /// Run the worker as a reverse proxy in front of the origin
  Serve {
    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let log_dir = config::data_dir().join("logs");
  std::fs::create_dir_all(&log_dir)?;
  let _log_guard = logging::init(&log_dir, args.verbose);

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override cache name if specified on command line
  if let Some(name) = args.cache_name {
    config.worker.cache_name = name;
  }

  let storage = Arc::new(SqliteStorage::open_at(&config.database_path())?);
  let network = Arc::new(HttpNetwork::new()?);
  let origin = config.origin_url()?;

  match args.command {
    Command::Install { no_activate } => {
      let worker = host::worker_for(config.worker.clone(), &origin, &network, &storage);
      worker.on_install().await?;
      if no_activate {
        println!("installed {} (waiting)", worker.cache_name());
      } else {
        let purged = worker.on_activate().await?;
        println!("installed {}", worker.cache_name());
        print_purged(&purged);
      }
    }
    Command::Activate => {
      let (worker, purged) =
        host::activate_installed(&config.worker, &origin, &network, &storage).await?;
      println!("activated {}", worker.cache_name());
      print_purged(&purged);
    }
    Command::Fetch { target, method } => {
      let worker = host::installed_or_resumed(&config.worker, &origin, &network, &storage).await?;
      let url = worker.request_for(&target)?.url;
      let resolved = worker.resolve(Request::new(method, url)).await?;
      println!(
        "{} {} ({} bytes, from {})",
        resolved.response.status,
        target,
        resolved.response.body.len(),
        resolved.source
      );
    }
    Command::List => list(&*storage)?,
    Command::Purge { name } => {
      if storage.delete_generation(&name)? {
        println!("purged {name}");
      } else {
        return Err(eyre!("No cache generation named {}", name));
      }
    }
    Command::Serve { listen } => {
      let addr = match listen {
        Some(addr) => addr,
        None => config
          .listen
          .parse()
          .map_err(|e| eyre!("Invalid listen address '{}': {}", config.listen, e))?,
      };
      let worker = host::installed_or_resumed(&config.worker, &origin, &network, &storage).await?;
      server::serve(Arc::new(worker), origin, addr).await?;
    }
  }

  Ok(())
}

fn print_purged(purged: &[String]) {
  for name in purged {
    println!("purged {name}");
  }
}

fn list(storage: &dyn CacheStorage) -> Result<()> {
  let generations = storage.generations()?;
  if generations.is_empty() {
    println!("no cache generations");
    return Ok(());
  }

  for generation in generations {
    let state = match generation.activated_at {
      Some(at) => format!("activated {}", at.format("%Y-%m-%d %H:%M:%S")),
      None => "never activated".to_string(),
    };
    println!(
      "{} ({} entries, created {}, {})",
      generation.name,
      generation.entry_count,
      generation.created_at.format("%Y-%m-%d %H:%M:%S"),
      state
    );
    for entry in storage.entries(&generation.name)? {
      println!(
        "  {} {} {:>8}B {} {}",
        entry.status,
        entry.key,
        entry.size,
        &entry.digest[..12.min(entry.digest.len())],
        entry.cached_at.format("%Y-%m-%d %H:%M:%S")
      );
    }
  }
  Ok(())
}
