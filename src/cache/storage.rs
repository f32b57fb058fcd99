//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::entry::{body_digest, CachedEntry, EntrySummary, Generation, RequestKey};
use crate::error::{Error, Result};
use crate::http::{Headers, Response};

/// Trait for cache storage backends.
///
/// A backend holds any number of named generations; callers decide which
/// one is active.
pub trait CacheStorage: Send + Sync {
  /// Open (or create) `generation` and write every entry in one transaction.
  ///
  /// Either all entries are committed or none are, and a generation that did
  /// not exist before is not left behind on failure.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Upsert a single entry into `generation`, creating it if needed.
  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Exact-key lookup within one generation.
  fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Summaries of every entry in `generation`, ordered by URL.
  fn entries(&self, generation: &str) -> Result<Vec<EntrySummary>>;

  /// Committed generations, most recently activated first.
  fn generations(&self) -> Result<Vec<Generation>>;

  /// Delete a generation and its entries. Returns whether it existed.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Record `name` as the most recently activated generation.
  fn mark_active(&self, name: &str) -> Result<()>;

  /// Name of the most recently activated generation, if any.
  fn active_generation(&self) -> Result<Option<String>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store at `path`, creating parent directories as needed.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    tracing::debug!(path = %path.display(), "opened cache database");
    Self::with_connection(conn)
  }

  /// Transient store used by tests and dry runs.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> PathBuf {
    crate::config::data_dir().join("cache.db")
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| Error::Lock(e.to_string()))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    activated_at TEXT,
    activation_seq INTEGER
);

CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    digest TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, method, url),
    FOREIGN KEY (generation) REFERENCES generations(name) ON DELETE CASCADE
);
"#;

fn upsert_entry(
  conn: &Connection,
  generation: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_vec(&response.headers)?;
  conn.execute(
    "INSERT OR REPLACE INTO entries (generation, method, url, status, headers, body, digest, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      generation,
      key.method,
      key.url,
      response.status,
      headers,
      response.body.as_ref(),
      body_digest(&response.body),
    ],
  )?;
  Ok(())
}

fn ensure_generation(conn: &Connection, generation: &str) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO generations (name) VALUES (?)",
    params![generation],
  )?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.conn()?;
    // Dropping the transaction without commit rolls back, including the
    // generation row.
    let tx = conn.transaction()?;
    ensure_generation(&tx, generation)?;
    for (key, response) in entries {
      upsert_entry(&tx, generation, key, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    ensure_generation(&tx, generation)?;
    upsert_entry(&tx, generation, key, response)?;
    tx.commit()?;
    Ok(())
  }

  fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.conn()?;

    let row: Option<(u16, Vec<u8>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE generation = ? AND method = ? AND url = ?",
        params![generation, key.method, key.url],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers: Headers = serde_json::from_slice(&headers)?;
        Ok(Some(CachedEntry {
          response: Response {
            status,
            headers,
            body: body.into(),
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn entries(&self, generation: &str) -> Result<Vec<EntrySummary>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(
      "SELECT method, url, status, length(body), digest, cached_at FROM entries
       WHERE generation = ?
       ORDER BY url, method",
    )?;

    let rows = stmt.query_map(params![generation], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, u16>(2)?,
        row.get::<_, i64>(3)?,
        row.get::<_, String>(4)?,
        row.get::<_, String>(5)?,
      ))
    })?;

    let mut summaries = Vec::new();
    for row in rows {
      let (method, url, status, size, digest, cached_at) = row?;
      summaries.push(EntrySummary {
        key: RequestKey { method, url },
        status,
        size: usize::try_from(size).unwrap_or_default(),
        digest,
        cached_at: parse_datetime(&cached_at)?,
      });
    }
    Ok(summaries)
  }

  fn generations(&self) -> Result<Vec<Generation>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(
      "SELECT g.name, g.created_at, g.activated_at,
              (SELECT COUNT(*) FROM entries e WHERE e.generation = g.name)
       FROM generations g
       ORDER BY g.activation_seq IS NULL, g.activation_seq DESC, g.rowid DESC",
    )?;

    let rows = stmt.query_map([], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<String>>(2)?,
        row.get::<_, i64>(3)?,
      ))
    })?;

    let mut generations = Vec::new();
    for row in rows {
      let (name, created_at, activated_at, count) = row?;
      generations.push(Generation {
        name,
        created_at: parse_datetime(&created_at)?,
        activated_at: activated_at.as_deref().map(parse_datetime).transpose()?,
        entry_count: usize::try_from(count).unwrap_or_default(),
      });
    }
    Ok(generations)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let conn = self.conn()?;
    let deleted = conn.execute("DELETE FROM generations WHERE name = ?", params![name])?;
    Ok(deleted > 0)
  }

  fn mark_active(&self, name: &str) -> Result<()> {
    let conn = self.conn()?;
    conn.execute(
      "UPDATE generations
       SET activated_at = datetime('now'),
           activation_seq = (SELECT COALESCE(MAX(activation_seq), 0) + 1 FROM generations)
       WHERE name = ?",
      params![name],
    )?;
    Ok(())
  }

  fn active_generation(&self) -> Result<Option<String>> {
    let conn = self.conn()?;
    let name = conn
      .query_row(
        "SELECT name FROM generations
         WHERE activation_seq IS NOT NULL
         ORDER BY activation_seq DESC
         LIMIT 1",
        [],
        |row| row.get(0),
      )
      .optional()?;
    Ok(name)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(Error::from)
}
