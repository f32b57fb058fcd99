//! Versioned cache store for intercepted responses.
//!
//! This module provides the persistence half of the worker:
//! - Named generations, exactly one of which is active at a time
//! - Atomic bulk population of a generation at install time
//! - Exact-key lookups by method + URL during fetch fallback
//! - Enumeration and purge of generations for activation cleanup

mod entry;
mod storage;

pub use entry::{CachedEntry, EntrySummary, Generation, RequestKey, ResponseSource};
pub use storage::{CacheStorage, SqliteStorage};
