//! Per-screen synchronization of cached and remote state.
//!
//! `load` works in two phases:
//! 1. Read every requested resource from the store (concurrently, awaited
//!    together) and publish the resulting snapshot.
//! 2. Spawn one task that issues every remote fetch at once and applies each
//!    result as soon as it settles, independently of its siblings.
//!
//! Each fetch is stamped with its issue time before it starts. An entry only
//! accepts a result stamped later than the one it holds, so a slow response
//! to an older request never clobbers a newer one.
//!
//! Applied results are written back to the store one key at a time; a write
//! whose entry has since moved on to a newer result is skipped.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::traits::{CacheEntry, KeyValueStore};
use crate::error::SyncIssue;
use crate::remote::types::{Customer, DashboardSummary, Profile, Transaction};
use crate::remote::{RemoteResourceClient, ResourceKey, ResourcePayload};

/// Current entries of every resource a screen declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
  entries: BTreeMap<ResourceKey, CacheEntry<ResourcePayload>>,
}

impl SyncSnapshot {
  fn with_keys(keys: &[ResourceKey]) -> Self {
    let mut snapshot = Self::default();
    snapshot.ensure(keys);
    snapshot
  }

  fn ensure(&mut self, keys: &[ResourceKey]) -> bool {
    let mut added = false;
    for &key in keys {
      if !self.entries.contains_key(&key) {
        self.entries.insert(key, CacheEntry::empty(key));
        added = true;
      }
    }
    added
  }

  pub fn entry(&self, key: ResourceKey) -> Option<&CacheEntry<ResourcePayload>> {
    self.entries.get(&key)
  }

  pub fn keys(&self) -> impl Iterator<Item = ResourceKey> + '_ {
    self.entries.keys().copied()
  }

  pub fn entries(&self) -> impl Iterator<Item = &CacheEntry<ResourcePayload>> {
    self.entries.values()
  }

  fn value(&self, key: ResourceKey) -> Option<&ResourcePayload> {
    self.entries.get(&key).and_then(|e| e.value.as_ref())
  }

  pub fn dashboard(&self) -> Option<&DashboardSummary> {
    match self.value(ResourceKey::Dashboard) {
      Some(ResourcePayload::Dashboard(d)) => Some(d),
      _ => None,
    }
  }

  pub fn transactions(&self) -> Option<&[Transaction]> {
    match self.value(ResourceKey::Transactions) {
      Some(ResourcePayload::Transactions(t)) => Some(t),
      _ => None,
    }
  }

  pub fn customers(&self) -> Option<&[Customer]> {
    match self.value(ResourceKey::Customers) {
      Some(ResourcePayload::Customers(c)) => Some(c),
      _ => None,
    }
  }

  pub fn profile(&self) -> Option<&Profile> {
    match self.value(ResourceKey::Profile) {
      Some(ResourcePayload::Profile(p)) => Some(p),
      _ => None,
    }
  }
}

/// How one resource's fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Result applied to the snapshot
  Applied,
  /// A newer fetch already populated the entry; result discarded
  Superseded,
  /// Remote call failed; the previous value was kept
  Failed,
  /// Coordinator was closed before the result arrived
  Abandoned,
}

/// Per-resource outcome of one `load` call, available once every fetch settled.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
  pub outcomes: BTreeMap<ResourceKey, FetchOutcome>,
  pub issues: Vec<SyncIssue>,
}

impl RefreshReport {
  pub fn outcome(&self, key: ResourceKey) -> Option<FetchOutcome> {
    self.outcomes.get(&key).copied()
  }

  pub fn failed(&self) -> impl Iterator<Item = ResourceKey> + '_ {
    self
      .outcomes
      .iter()
      .filter(|(_, outcome)| **outcome == FetchOutcome::Failed)
      .map(|(key, _)| *key)
  }

  /// True when every fetch was applied and nothing went wrong on the way.
  pub fn is_clean(&self) -> bool {
    self.issues.is_empty()
      && self
        .outcomes
        .values()
        .all(|outcome| *outcome == FetchOutcome::Applied)
  }
}

/// Handle to the network phase of a `load` call.
pub struct RefreshHandle {
  task: JoinHandle<RefreshReport>,
}

impl RefreshHandle {
  /// Wait until every fetch of the load has settled.
  pub async fn settled(self) -> Result<RefreshReport> {
    self
      .task
      .await
      .map_err(|e| eyre!("Refresh task failed: {}", e))
  }
}

/// State shared between the coordinator and its in-flight refresh tasks.
struct Shared {
  updates: watch::Sender<SyncSnapshot>,
  last_stamp: Mutex<Option<DateTime<Utc>>>,
  closed: AtomicBool,
  /// One write-back lane per store key
  writes: BTreeMap<ResourceKey, AsyncMutex<()>>,
}

impl Shared {
  /// Strictly increasing issue timestamp.
  fn next_stamp(&self) -> DateTime<Utc> {
    let mut last = self
      .last_stamp
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut stamp = Utc::now();
    if let Some(prev) = *last {
      if stamp <= prev {
        stamp = prev + Duration::nanoseconds(1);
      }
    }
    *last = Some(stamp);
    stamp
  }

  fn new(keys: &[ResourceKey]) -> Self {
    let (updates, _) = watch::channel(SyncSnapshot::with_keys(keys));
    Self {
      updates,
      last_stamp: Mutex::new(None),
      closed: AtomicBool::new(false),
      writes: ResourceKey::ALL
        .iter()
        .map(|&key| (key, AsyncMutex::new(())))
        .collect(),
    }
  }

  fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  /// Flip the closed flag under the snapshot lock, so no apply straddles it.
  fn close(&self) {
    self.updates.send_if_modified(|_| {
      self.closed.store(true, Ordering::SeqCst);
      false
    });
  }

  fn apply_fetch(
    &self,
    key: ResourceKey,
    payload: ResourcePayload,
    stamp: DateTime<Utc>,
  ) -> FetchOutcome {
    let mut outcome = FetchOutcome::Abandoned;
    self.updates.send_if_modified(|snapshot| {
      if self.is_closed() {
        return false;
      }
      snapshot.ensure(&[key]);
      let applied = snapshot
        .entries
        .get_mut(&key)
        .map(|entry| entry.apply_fetch(payload, stamp))
        .unwrap_or(false);
      outcome = if applied {
        FetchOutcome::Applied
      } else {
        FetchOutcome::Superseded
      };
      applied
    });
    outcome
  }

  /// Whether the entry still holds the result of the fetch stamped `stamp`.
  fn holds(&self, key: ResourceKey, stamp: DateTime<Utc>) -> bool {
    self
      .updates
      .borrow()
      .entry(key)
      .map(|e| e.fetched_at == Some(stamp))
      .unwrap_or(false)
  }
}

/// Cache-first, per-resource reconciliation for one screen.
///
/// Owned by the screen's controller. Dropping it (or calling `close`) makes
/// in-flight fetches of earlier loads stop touching the snapshot.
pub struct SyncCoordinator<S: ?Sized, R: ?Sized> {
  store: Arc<S>,
  remote: Arc<R>,
  declared: Vec<ResourceKey>,
  shared: Arc<Shared>,
}

impl<S, R> SyncCoordinator<S, R>
where
  S: KeyValueStore + ?Sized + 'static,
  R: RemoteResourceClient + ?Sized + 'static,
{
  /// Create a coordinator with an (empty) entry for every declared key.
  pub fn new(store: Arc<S>, remote: Arc<R>, declared: &[ResourceKey]) -> Self {
    let mut keys = declared.to_vec();
    keys.sort();
    keys.dedup();

    let shared = Arc::new(Shared::new(&keys));

    Self {
      store,
      remote,
      declared: keys,
      shared,
    }
  }

  pub fn declared(&self) -> &[ResourceKey] {
    &self.declared
  }

  /// Latest published snapshot.
  pub fn snapshot(&self) -> SyncSnapshot {
    self.shared.updates.borrow().clone()
  }

  /// Receiver notified on every snapshot change.
  pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
    self.shared.updates.subscribe()
  }

  /// Stop applying results of in-flight fetches. Remote calls are not cancelled.
  pub fn close(&self) {
    self.shared.close();
  }

  pub fn is_closed(&self) -> bool {
    self.shared.is_closed()
  }

  /// Manual refresh of every declared resource.
  pub async fn refresh(&self) -> (SyncSnapshot, RefreshHandle) {
    let keys = self.declared.clone();
    self.load(&keys).await
  }

  /// Populate `keys` from the store, publish, then refresh them from the
  /// network in the background.
  ///
  /// Returns once the cache phase is done; the network phase is tracked by
  /// the returned handle. Per-resource failures never surface as errors.
  pub async fn load(&self, keys: &[ResourceKey]) -> (SyncSnapshot, RefreshHandle) {
    let mut keys = keys.to_vec();
    keys.sort();
    keys.dedup();

    self
      .shared
      .updates
      .send_if_modified(|snapshot| snapshot.ensure(&keys));

    // Phase 1: cache
    let reads = keys.iter().map(|&key| {
      let store = Arc::clone(&self.store);
      async move { (key, read_cached(&*store, key).await) }
    });
    let cached = join_all(reads).await;

    let mut issues = Vec::new();
    let mut hits = Vec::new();
    for (key, result) in cached {
      match result {
        Ok(Some(payload)) => hits.push((key, payload)),
        Ok(None) => {}
        Err(issue) => issues.push(issue),
      }
    }

    if !self.is_closed() {
      self.shared.updates.send_if_modified(|snapshot| {
        let mut changed = false;
        for (key, payload) in hits {
          if let Some(entry) = snapshot.entries.get_mut(&key) {
            changed |= entry.fill_from_cache(payload);
          }
        }
        changed
      });
    }
    let snapshot = self.snapshot();

    // Phase 2: network
    let stamped: Vec<(ResourceKey, DateTime<Utc>)> = keys
      .iter()
      .map(|&key| (key, self.shared.next_stamp()))
      .collect();

    let task = tokio::spawn(refresh_all(
      Arc::clone(&self.store),
      Arc::clone(&self.remote),
      Arc::clone(&self.shared),
      stamped,
      issues,
    ));

    (snapshot, RefreshHandle { task })
  }
}

impl<S: ?Sized, R: ?Sized> Drop for SyncCoordinator<S, R> {
  fn drop(&mut self) {
    self.shared.close();
  }
}

/// Read and decode one resource. Missing, unreadable and corrupt blobs are
/// all cache misses; only corruption is reported.
async fn read_cached<S>(store: &S, key: ResourceKey) -> Result<Option<ResourcePayload>, SyncIssue>
where
  S: KeyValueStore + ?Sized,
{
  let blob = match store.get(key.cache_key()).await {
    Ok(Some(blob)) => blob,
    Ok(None) => {
      tracing::debug!(%key, "cache miss");
      return Ok(None);
    }
    Err(e) => {
      tracing::warn!(%key, "cache read failed, treating as miss: {}", e);
      return Ok(None);
    }
  };

  match key.decode(&blob) {
    Ok(payload) => {
      tracing::debug!(%key, "cache hit");
      Ok(Some(payload))
    }
    Err(e) => {
      tracing::warn!(%key, "discarding corrupt cache entry: {}", e);
      Err(SyncIssue::SerializationFailure {
        key,
        message: e.to_string(),
      })
    }
  }
}

async fn refresh_all<S, R>(
  store: Arc<S>,
  remote: Arc<R>,
  shared: Arc<Shared>,
  stamped: Vec<(ResourceKey, DateTime<Utc>)>,
  mut issues: Vec<SyncIssue>,
) -> RefreshReport
where
  S: KeyValueStore + ?Sized,
  R: RemoteResourceClient + ?Sized,
{
  let mut pending: FuturesUnordered<_> = stamped
    .into_iter()
    .map(|(key, stamp)| {
      let remote = Arc::clone(&remote);
      async move { (key, stamp, key.fetch(&*remote).await) }
    })
    .collect();

  let mut writes = FuturesUnordered::new();
  let mut outcomes = BTreeMap::new();

  // Write-back drains alongside the fetches so a slow store never holds
  // back a sibling's result.
  loop {
    tokio::select! {
      Some((key, stamp, result)) = pending.next(), if !pending.is_empty() => {
        if shared.is_closed() {
          tracing::debug!(%key, "coordinator closed, dropping fetch result");
          outcomes.insert(key, FetchOutcome::Abandoned);
          continue;
        }

        let payload = match result {
          Ok(payload) => payload,
          Err(e) => {
            tracing::warn!(%key, "fetch failed, keeping last known value: {}", e);
            issues.push(SyncIssue::TransientFetchFailure {
              key,
              message: e.to_string(),
            });
            outcomes.insert(key, FetchOutcome::Failed);
            continue;
          }
        };

        let blob = payload.encode();
        let outcome = shared.apply_fetch(key, payload, stamp);
        outcomes.insert(key, outcome);
        match outcome {
          FetchOutcome::Applied => {
            tracing::info!(%key, %stamp, "refreshed from network");
            writes.push(persist(&*store, &*shared, key, stamp, blob));
          }
          FetchOutcome::Superseded => {
            tracing::debug!(%key, %stamp, "newer fetch already applied, discarding");
          }
          _ => tracing::debug!(%key, "coordinator closed, dropping fetch result"),
        }
      }
      Some(issue) = writes.next(), if !writes.is_empty() => {
        issues.extend(issue);
      }
      else => break,
    }
  }

  RefreshReport { outcomes, issues }
}

/// Write an applied payload back to the store. Failures are logged and
/// returned for the report; the in-memory entry is never rolled back.
async fn persist<S>(
  store: &S,
  shared: &Shared,
  key: ResourceKey,
  stamp: DateTime<Utc>,
  blob: serde_json::Result<String>,
) -> Option<SyncIssue>
where
  S: KeyValueStore + ?Sized,
{
  // Only one write per key at a time; whoever holds the lane writes only
  // if its result is still the entry's value.
  let _lane = match shared.writes.get(&key) {
    Some(lane) => Some(lane.lock().await),
    None => None,
  };
  if !shared.holds(key, stamp) {
    tracing::debug!(%key, %stamp, "newer result landed before write-back, skipping");
    return None;
  }

  let result = match blob {
    Ok(blob) => store.set(key.cache_key(), &blob).await,
    Err(e) => Err(e.into()),
  };

  match result {
    Ok(()) => None,
    Err(e) => {
      tracing::warn!(%key, "failed to persist fetched value: {}", e);
      Some(SyncIssue::PersistenceWriteFailure {
        key,
        message: e.to_string(),
      })
    }
  }
}
