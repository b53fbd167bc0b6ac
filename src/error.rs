//! Typed errors for the sync layer and the permission model.
//!
//! Fallible I/O (store, HTTP, config) uses `color_eyre::Result`; these enums
//! cover the failures callers are expected to match on.

use crate::permissions::Role;
use crate::remote::ResourceKey;

/// Per-resource problems observed during a refresh.
///
/// None of these escape `SyncCoordinator::load`; they are logged and listed
/// in the `RefreshReport`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncIssue {
  /// The remote call for one resource failed. The last known value is kept.
  #[error("fetch of {key} failed: {message}")]
  TransientFetchFailure { key: ResourceKey, message: String },

  /// A cached blob could not be parsed and was treated as a cache miss.
  #[error("cached {key} is unreadable: {message}")]
  SerializationFailure { key: ResourceKey, message: String },

  /// A fetched value could not be written back to the store.
  #[error("persisting {key} failed: {message}")]
  PersistenceWriteFailure { key: ResourceKey, message: String },
}

impl SyncIssue {
  pub fn key(&self) -> ResourceKey {
    match self {
      Self::TransientFetchFailure { key, .. }
      | Self::SerializationFailure { key, .. }
      | Self::PersistenceWriteFailure { key, .. } => *key,
    }
  }
}

/// Rejections from the permission model. Raised before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
  #[error("invariant violation: {0}")]
  InvariantViolation(Invariant),

  #[error("member {0} not found")]
  MemberNotFound(String),

  #[error("member {actor} ({role}) may not manage members")]
  NotAuthorized { actor: String, role: Role },
}

/// Which business invariant a rejected operation would have broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Invariant {
  #[error("the owner's role cannot be changed")]
  OwnerRoleChange,

  #[error("the owner cannot be removed")]
  OwnerRemoval,

  #[error("a business cannot have a second owner")]
  SecondOwner,

  #[error("business must have exactly one owner, found {0}")]
  OwnerCount(usize),
}

impl From<Invariant> for PermissionError {
  fn from(invariant: Invariant) -> Self {
    Self::InvariantViolation(invariant)
  }
}
