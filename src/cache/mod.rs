//! Cache-first data layer.
//!
//! This module provides:
//! - A durable key-value store contract with SQLite and in-memory backends
//! - `CacheEntry`, the cached state of one resource and where it came from
//! - `SyncCoordinator`, which serves cached snapshots immediately and then
//!   reconciles every resource with the network independently

mod coordinator;
mod storage;
mod traits;

pub use coordinator::{FetchOutcome, RefreshHandle, RefreshReport, SyncCoordinator, SyncSnapshot};
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{CacheEntry, CacheSource, KeyValueStore};
