//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::remote::ResourceKey;

/// Durable key -> serialized blob store.
///
/// Values are whole-value overwrites; the store never merges. Callers treat
/// an undecodable value the same as an absent one.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>>;

  async fn set(&self, key: &str, value: &str) -> Result<()>;

  async fn remove(&self, key: &str) -> Result<()>;
}

/// Where the value currently held by an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Loaded from the durable store at mount time
  Cache,
  /// Result of a successful remote fetch
  Network,
}

/// Cached state of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
  pub resource_key: ResourceKey,
  /// `None` until the first cache hit or successful fetch
  pub value: Option<T>,
  pub source: CacheSource,
  /// Issue time of the fetch that produced `value`; `None` for cached values
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> CacheEntry<T> {
  pub fn empty(resource_key: ResourceKey) -> Self {
    Self {
      resource_key,
      value: None,
      source: CacheSource::Cache,
      fetched_at: None,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.value.is_none()
  }

  /// Replace the value with one read from the store.
  ///
  /// Returns false (and changes nothing) if the entry already holds a fetched
  /// value: a cache read never overwrites network data.
  pub fn fill_from_cache(&mut self, value: T) -> bool {
    if self.source == CacheSource::Network {
      return false;
    }
    self.value = Some(value);
    self.source = CacheSource::Cache;
    self.fetched_at = None;
    true
  }

  /// Apply a fetch result stamped `fetched_at`.
  ///
  /// Only results newer than the currently held fetch are applied.
  pub fn apply_fetch(&mut self, value: T, fetched_at: DateTime<Utc>) -> bool {
    if let Some(current) = self.fetched_at {
      if fetched_at <= current {
        return false;
      }
    }
    self.value = Some(value);
    self.source = CacheSource::Network;
    self.fetched_at = Some(fetched_at);
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_cache_fill_never_overwrites_network() {
    let now = Utc::now();
    let mut entry = CacheEntry::empty(ResourceKey::Customers);
    assert!(entry.fill_from_cache(1));
    assert_eq!(entry.source, CacheSource::Cache);

    assert!(entry.apply_fetch(2, now));
    assert!(!entry.fill_from_cache(3));
    assert_eq!(entry.value, Some(2));
    assert_eq!(entry.source, CacheSource::Network);
    assert_eq!(entry.fetched_at, Some(now));
  }

  #[test]
  fn test_older_fetch_is_ignored() {
    let now = Utc::now();
    let mut entry = CacheEntry::empty(ResourceKey::Dashboard);
    assert!(entry.apply_fetch("new", now));
    assert!(!entry.apply_fetch("old", now - Duration::seconds(1)));
    assert!(!entry.apply_fetch("same", now));
    assert_eq!(entry.value, Some("new"));
  }
}
