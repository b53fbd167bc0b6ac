//! Team roster of one business.
//!
//! Every mutation is checked against the permission model first, applied in
//! memory only if allowed, then written to the store under `team_members`.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use crate::cache::KeyValueStore;
use crate::error::{Invariant, PermissionError};
use crate::permissions::{self, BusinessMember, Role};

/// Store key of the persisted roster.
pub const TEAM_CACHE_KEY: &str = "team_members";

pub struct TeamRoster<S: ?Sized> {
  store: Arc<S>,
  business_id: String,
  members: Vec<BusinessMember>,
}

impl<S: KeyValueStore + ?Sized> TeamRoster<S> {
  /// Load the roster of `business_id`. A missing or unreadable roster is empty.
  pub async fn load(store: Arc<S>, business_id: impl Into<String>) -> Result<Self> {
    let business_id = business_id.into();

    let members = match store.get(TEAM_CACHE_KEY).await {
      Ok(Some(blob)) => match serde_json::from_str::<Vec<BusinessMember>>(&blob) {
        Ok(all) => all
          .into_iter()
          .filter(|m| m.business_id == business_id)
          .collect(),
        Err(e) => {
          tracing::warn!("discarding unreadable team roster: {}", e);
          Vec::new()
        }
      },
      Ok(None) => Vec::new(),
      Err(e) => {
        tracing::warn!("team roster read failed, starting empty: {}", e);
        Vec::new()
      }
    };

    if !members.is_empty() {
      permissions::check_single_owner(&members)?;
    }

    Ok(Self {
      store,
      business_id,
      members,
    })
  }

  pub fn business_id(&self) -> &str {
    &self.business_id
  }

  /// Every member ever added, including removed ones.
  pub fn members(&self) -> &[BusinessMember] {
    &self.members
  }

  pub fn active_members(&self) -> impl Iterator<Item = &BusinessMember> {
    self.members.iter().filter(|m| m.is_active)
  }

  pub fn owner(&self) -> Option<&BusinessMember> {
    self.active_members().find(|m| m.is_owner())
  }

  pub fn get(&self, member_id: &str) -> Option<&BusinessMember> {
    self.members.iter().find(|m| m.id == member_id)
  }

  /// Create the owner of an empty roster. Returns the existing owner otherwise.
  pub async fn bootstrap_owner(
    &mut self,
    user_id: &str,
    name: &str,
    phone_number: &str,
  ) -> Result<BusinessMember> {
    if let Some(owner) = self.owner() {
      return Ok(owner.clone());
    }

    let owner = BusinessMember::new(
      format!("{}-{}", self.business_id, user_id),
      user_id,
      self.business_id.clone(),
      Role::Owner,
      name,
      phone_number,
      user_id,
      Utc::now(),
    );
    self.members.push(owner.clone());
    self.save().await?;
    tracing::info!(business = %self.business_id, member = %owner.id, "created business owner");
    Ok(owner)
  }

  /// Add a new active member with `role`. Owners cannot be invited.
  pub async fn invite(
    &mut self,
    actor_id: &str,
    name: &str,
    phone_number: &str,
    role: Role,
  ) -> Result<BusinessMember> {
    let actor = self.authorize(actor_id)?;
    if role == Role::Owner {
      return Err(PermissionError::from(Invariant::SecondOwner).into());
    }

    let added_at = Utc::now();
    let user_id = format!("user-{}", phone_number.trim());
    let member = BusinessMember::new(
      // Members are never deleted, so the position is a stable unique suffix
      format!("{}-m{}", self.business_id, self.members.len() + 1),
      user_id,
      self.business_id.clone(),
      role,
      name.trim(),
      phone_number.trim(),
      actor.id,
      added_at,
    );

    self.members.push(member.clone());
    self.save().await?;
    tracing::info!(member = %member.id, %role, "invited member");
    Ok(member)
  }

  /// Move a member to `role`, recomputing their permissions.
  pub async fn change_role(
    &mut self,
    actor_id: &str,
    member_id: &str,
    role: Role,
  ) -> Result<BusinessMember> {
    self.authorize(actor_id)?;
    let index = self.index_of(member_id)?;
    let updated = permissions::apply_role_change(&self.members[index], role)?;

    self.members[index] = updated.clone();
    self.save().await?;
    tracing::info!(member = %member_id, %role, "changed member role");
    Ok(updated)
  }

  /// Deactivate a member. The record is kept for history.
  pub async fn remove(&mut self, actor_id: &str, member_id: &str) -> Result<BusinessMember> {
    self.authorize(actor_id)?;
    let index = self.index_of(member_id)?;
    permissions::check_removal(&self.members[index])?;

    self.members[index].is_active = false;
    let removed = self.members[index].clone();
    self.save().await?;
    tracing::info!(member = %member_id, "removed member");
    Ok(removed)
  }

  fn index_of(&self, member_id: &str) -> Result<usize, PermissionError> {
    self
      .members
      .iter()
      .position(|m| m.id == member_id && m.is_active)
      .ok_or_else(|| PermissionError::MemberNotFound(member_id.to_string()))
  }

  fn authorize(&self, actor_id: &str) -> Result<BusinessMember, PermissionError> {
    let actor = self
      .active_members()
      .find(|m| m.id == actor_id)
      .ok_or_else(|| PermissionError::MemberNotFound(actor_id.to_string()))?;
    if !actor.permissions().can_manage_members {
      return Err(PermissionError::NotAuthorized {
        actor: actor.id.clone(),
        role: actor.role(),
      });
    }
    Ok(actor.clone())
  }

  /// Write this business's members back, keeping other businesses' entries.
  ///
  /// Refuses to write when the stored roster cannot be read, since the
  /// rewrite would drop every other business's members.
  async fn save(&self) -> Result<()> {
    let mut all: Vec<BusinessMember> = match self
      .store
      .get(TEAM_CACHE_KEY)
      .await
      .map_err(|e| eyre!("Failed to read team roster before saving: {}", e))?
    {
      Some(blob) => serde_json::from_str(&blob)
        .map_err(|e| eyre!("Stored team roster is unreadable, not overwriting it: {}", e))?,
      None => Vec::new(),
    };
    all.retain(|m| m.business_id != self.business_id);
    all.extend(self.members.iter().cloned());

    let blob =
      serde_json::to_string(&all).map_err(|e| eyre!("Failed to serialize team roster: {}", e))?;
    self
      .store
      .set(TEAM_CACHE_KEY, &blob)
      .await
      .map_err(|e| eyre!("Failed to persist team roster: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::permissions::permissions_for;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicBool, Ordering};

  /// Store whose reads can be switched to fail.
  #[derive(Default)]
  struct FlakyStore {
    inner: MemoryStorage,
    failing_reads: AtomicBool,
  }

  #[async_trait]
  impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
      if self.failing_reads.load(Ordering::SeqCst) {
        return Err(eyre!("database is locked"));
      }
      self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
      self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
      self.inner.remove(key).await
    }
  }

  async fn roster_with_owner() -> (Arc<MemoryStorage>, TeamRoster<MemoryStorage>, BusinessMember) {
    let store = Arc::new(MemoryStorage::new());
    let mut roster = TeamRoster::load(Arc::clone(&store), "biz-1").await.unwrap();
    let owner = roster
      .bootstrap_owner("u-owner", "Owner", "9000000000")
      .await
      .unwrap();
    (store, roster, owner)
  }

  fn permission_error(err: &color_eyre::Report) -> &PermissionError {
    err.downcast_ref::<PermissionError>()
      .expect("expected a permission error")
  }

  #[tokio::test]
  async fn test_bootstrap_creates_single_owner() {
    let (_, mut roster, owner) = roster_with_owner().await;
    assert_eq!(owner.role(), Role::Owner);

    let again = roster.bootstrap_owner("u-other", "Other", "1").await.unwrap();
    assert_eq!(again.id, owner.id);
    assert_eq!(roster.members().len(), 1);
  }

  #[tokio::test]
  async fn test_invite_change_and_remove() {
    let (store, mut roster, owner) = roster_with_owner().await;

    let worker = roster
      .invite(&owner.id, "Sunil", " 9111111111 ", Role::Worker)
      .await
      .unwrap();
    assert_eq!(worker.phone_number, "9111111111");
    assert_eq!(*worker.permissions(), permissions_for(Role::Worker));
    assert_eq!(worker.added_by, owner.id);

    let admin = roster
      .change_role(&owner.id, &worker.id, Role::Admin)
      .await
      .unwrap();
    assert_eq!(*admin.permissions(), permissions_for(Role::Admin));

    let removed = roster.remove(&owner.id, &worker.id).await.unwrap();
    assert!(!removed.is_active);
    assert_eq!(roster.active_members().count(), 1);
    assert_eq!(roster.members().len(), 2);

    let reloaded = TeamRoster::load(store, "biz-1").await.unwrap();
    assert_eq!(reloaded.members().len(), 2);
    assert_eq!(reloaded.active_members().count(), 1);
    assert_eq!(reloaded.owner().unwrap().id, owner.id);
  }

  #[tokio::test]
  async fn test_owner_cannot_be_demoted_or_removed() {
    let (_, mut roster, owner) = roster_with_owner().await;

    let err = roster
      .change_role(&owner.id, &owner.id, Role::Worker)
      .await
      .unwrap_err();
    assert_eq!(
      permission_error(&err),
      &PermissionError::InvariantViolation(Invariant::OwnerRoleChange)
    );

    let err = roster.remove(&owner.id, &owner.id).await.unwrap_err();
    assert_eq!(
      permission_error(&err),
      &PermissionError::InvariantViolation(Invariant::OwnerRemoval)
    );

    assert_eq!(roster.owner().unwrap().role(), Role::Owner);
    assert!(roster.owner().unwrap().is_active);
  }

  #[tokio::test]
  async fn test_cannot_invite_second_owner() {
    let (_, mut roster, owner) = roster_with_owner().await;
    let err = roster
      .invite(&owner.id, "Twin", "2", Role::Owner)
      .await
      .unwrap_err();
    assert_eq!(
      permission_error(&err),
      &PermissionError::InvariantViolation(Invariant::SecondOwner)
    );
    assert_eq!(roster.members().len(), 1);
  }

  #[tokio::test]
  async fn test_admin_cannot_manage_members() {
    let (_, mut roster, owner) = roster_with_owner().await;
    let admin = roster
      .invite(&owner.id, "Admin", "3", Role::Admin)
      .await
      .unwrap();

    let err = roster
      .invite(&admin.id, "Someone", "4", Role::Worker)
      .await
      .unwrap_err();
    assert!(matches!(
      permission_error(&err),
      PermissionError::NotAuthorized { role: Role::Admin, .. }
    ));
    assert_eq!(roster.members().len(), 2);
  }

  #[tokio::test]
  async fn test_unknown_member_is_rejected() {
    let (_, mut roster, owner) = roster_with_owner().await;
    let err = roster
      .change_role(&owner.id, "nobody", Role::Admin)
      .await
      .unwrap_err();
    assert_eq!(
      permission_error(&err),
      &PermissionError::MemberNotFound("nobody".to_string())
    );
  }

  #[tokio::test]
  async fn test_corrupt_roster_loads_empty() {
    let store = Arc::new(MemoryStorage::new());
    store.set(TEAM_CACHE_KEY, "not json").await.unwrap();
    let roster = TeamRoster::load(store, "biz-1").await.unwrap();
    assert!(roster.members().is_empty());
  }

  #[tokio::test]
  async fn test_roster_without_owner_is_rejected() {
    let store = Arc::new(MemoryStorage::new());
    let worker = BusinessMember::new("w", "u", "biz-1", Role::Worker, "W", "1", "x", Utc::now());
    store
      .set(TEAM_CACHE_KEY, &serde_json::to_string(&vec![worker]).unwrap())
      .await
      .unwrap();

    let err = TeamRoster::load(store, "biz-1").await.err().unwrap();
    assert_eq!(
      permission_error(&err),
      &PermissionError::InvariantViolation(Invariant::OwnerCount(0))
    );
  }

  #[tokio::test]
  async fn test_failed_read_does_not_drop_other_rosters() {
    let store = Arc::new(FlakyStore::default());
    let mut other = TeamRoster::load(Arc::clone(&store), "biz-2").await.unwrap();
    other.bootstrap_owner("u-2", "Second", "5").await.unwrap();

    let mut roster = TeamRoster::load(Arc::clone(&store), "biz-1").await.unwrap();
    store.failing_reads.store(true, Ordering::SeqCst);
    assert!(roster
      .bootstrap_owner("u-owner", "Owner", "9000000000")
      .await
      .is_err());
    store.failing_reads.store(false, Ordering::SeqCst);

    let other = TeamRoster::load(Arc::clone(&store), "biz-2").await.unwrap();
    assert_eq!(other.members().len(), 1);
    let stored = TeamRoster::load(store, "biz-1").await.unwrap();
    assert!(stored.members().is_empty());
  }

  #[tokio::test]
  async fn test_unreadable_roster_is_not_overwritten() {
    let store = Arc::new(MemoryStorage::new());
    store.set(TEAM_CACHE_KEY, "not json").await.unwrap();

    let mut roster = TeamRoster::load(Arc::clone(&store), "biz-1").await.unwrap();
    assert!(roster.bootstrap_owner("u-owner", "Owner", "1").await.is_err());
    assert_eq!(
      store.get(TEAM_CACHE_KEY).await.unwrap().as_deref(),
      Some("not json")
    );
  }

  #[tokio::test]
  async fn test_rosters_of_other_businesses_are_kept() {
    let (store, mut roster, owner) = roster_with_owner().await;

    let mut other = TeamRoster::load(Arc::clone(&store), "biz-2").await.unwrap();
    other.bootstrap_owner("u-2", "Second", "5").await.unwrap();

    roster
      .invite(&owner.id, "Late", "6", Role::Worker)
      .await
      .unwrap();

    let other = TeamRoster::load(store, "biz-2").await.unwrap();
    assert_eq!(other.members().len(), 1);
  }
}
