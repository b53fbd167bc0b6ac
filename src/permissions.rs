//! Role based permissions for business members.
//!
//! `permissions_for` is the single mapping from role to capabilities. A
//! member's permission set is never edited directly: it is derived from the
//! role on construction, on role change and on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Invariant, PermissionError};

/// Member role, ordered by capability: worker < admin < owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Worker,
  Admin,
  Owner,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Role::Worker => "worker",
      Role::Admin => "admin",
      Role::Owner => "owner",
    })
  }
}

impl std::str::FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "worker" => Ok(Role::Worker),
      "admin" => Ok(Role::Admin),
      "owner" => Ok(Role::Owner),
      other => Err(format!("unknown role '{}'", other)),
    }
  }
}

/// Capability flags of a member
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
  pub can_add_transaction: bool,
  pub can_edit_transaction: bool,
  pub can_delete_transaction: bool,
  pub can_add_customer: bool,
  pub can_edit_customer: bool,
  pub can_delete_customer: bool,
  pub can_manage_products: bool,
  pub can_manage_inventory: bool,
  pub can_view_reports: bool,
  pub can_edit_business: bool,
  pub can_manage_members: bool,
}

impl PermissionSet {
  /// True when every flag set in `other` is also set here.
  pub fn contains(&self, other: &PermissionSet) -> bool {
    let pairs = [
      (self.can_add_transaction, other.can_add_transaction),
      (self.can_edit_transaction, other.can_edit_transaction),
      (self.can_delete_transaction, other.can_delete_transaction),
      (self.can_add_customer, other.can_add_customer),
      (self.can_edit_customer, other.can_edit_customer),
      (self.can_delete_customer, other.can_delete_customer),
      (self.can_manage_products, other.can_manage_products),
      (self.can_manage_inventory, other.can_manage_inventory),
      (self.can_view_reports, other.can_view_reports),
      (self.can_edit_business, other.can_edit_business),
      (self.can_manage_members, other.can_manage_members),
    ];
    pairs.iter().all(|&(mine, theirs)| mine || !theirs)
  }
}

/// Canonical permission set for a role.
pub fn permissions_for(role: Role) -> PermissionSet {
  match role {
    Role::Owner => PermissionSet {
      can_add_transaction: true,
      can_edit_transaction: true,
      can_delete_transaction: true,
      can_add_customer: true,
      can_edit_customer: true,
      can_delete_customer: true,
      can_manage_products: true,
      can_manage_inventory: true,
      can_view_reports: true,
      can_edit_business: true,
      can_manage_members: true,
    },
    Role::Admin => PermissionSet {
      can_edit_business: false,
      can_manage_members: false,
      ..permissions_for(Role::Owner)
    },
    Role::Worker => PermissionSet {
      can_add_transaction: true,
      can_add_customer: true,
      can_view_reports: true,
      ..PermissionSet::default()
    },
  }
}

/// A person attached to a business with a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MemberRecord")]
pub struct BusinessMember {
  pub id: String,
  pub user_id: String,
  pub business_id: String,
  role: Role,
  pub name: String,
  pub phone_number: String,
  permissions: PermissionSet,
  pub added_by: String,
  pub added_at: DateTime<Utc>,
  pub is_active: bool,
}

/// Stored shape of a member. Any persisted permission set is ignored.
#[derive(Deserialize)]
struct MemberRecord {
  id: String,
  user_id: String,
  business_id: String,
  role: Role,
  name: String,
  #[serde(default)]
  phone_number: String,
  added_by: String,
  added_at: DateTime<Utc>,
  #[serde(default = "active_by_default")]
  is_active: bool,
}

fn active_by_default() -> bool {
  true
}

impl From<MemberRecord> for BusinessMember {
  fn from(record: MemberRecord) -> Self {
    Self {
      id: record.id,
      user_id: record.user_id,
      business_id: record.business_id,
      role: record.role,
      name: record.name,
      phone_number: record.phone_number,
      permissions: permissions_for(record.role),
      added_by: record.added_by,
      added_at: record.added_at,
      is_active: record.is_active,
    }
  }
}

impl BusinessMember {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    id: impl Into<String>,
    user_id: impl Into<String>,
    business_id: impl Into<String>,
    role: Role,
    name: impl Into<String>,
    phone_number: impl Into<String>,
    added_by: impl Into<String>,
    added_at: DateTime<Utc>,
  ) -> Self {
    Self {
      id: id.into(),
      user_id: user_id.into(),
      business_id: business_id.into(),
      role,
      name: name.into(),
      phone_number: phone_number.into(),
      permissions: permissions_for(role),
      added_by: added_by.into(),
      added_at,
      is_active: true,
    }
  }

  pub fn role(&self) -> Role {
    self.role
  }

  pub fn permissions(&self) -> &PermissionSet {
    &self.permissions
  }

  pub fn is_owner(&self) -> bool {
    self.role == Role::Owner
  }
}

/// Whether `member` may be moved to `proposed`.
///
/// The owner is fixed, and nobody can be promoted to owner.
pub fn can_change_role(member: &BusinessMember, proposed: Role) -> bool {
  check_role_change(member, proposed).is_ok()
}

pub fn can_remove(member: &BusinessMember) -> bool {
  !member.is_owner()
}

fn check_role_change(member: &BusinessMember, proposed: Role) -> Result<(), Invariant> {
  if member.is_owner() {
    return Err(Invariant::OwnerRoleChange);
  }
  if proposed == Role::Owner {
    return Err(Invariant::SecondOwner);
  }
  Ok(())
}

/// Return a copy of `member` holding `new_role` and its canonical permissions.
pub fn apply_role_change(
  member: &BusinessMember,
  new_role: Role,
) -> Result<BusinessMember, PermissionError> {
  check_role_change(member, new_role).map_err(|invariant| {
    tracing::error!(member = %member.id, from = %member.role, to = %new_role, "rejected role change: {}", invariant);
    PermissionError::from(invariant)
  })?;

  Ok(BusinessMember {
    role: new_role,
    permissions: permissions_for(new_role),
    ..member.clone()
  })
}

/// Reject removal of the owner.
pub fn check_removal(member: &BusinessMember) -> Result<(), PermissionError> {
  if can_remove(member) {
    Ok(())
  } else {
    tracing::error!(member = %member.id, "rejected removal of owner");
    Err(Invariant::OwnerRemoval.into())
  }
}

/// Exactly one active owner must exist among a business's members.
pub fn check_single_owner(members: &[BusinessMember]) -> Result<(), PermissionError> {
  let owners = members
    .iter()
    .filter(|m| m.is_active && m.is_owner())
    .count();
  if owners == 1 {
    Ok(())
  } else {
    tracing::error!(owners, "owner invariant broken");
    Err(Invariant::OwnerCount(owners).into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn member(id: &str, role: Role) -> BusinessMember {
    BusinessMember::new(
      id,
      format!("user-{}", id),
      "biz-1",
      role,
      id.to_uppercase(),
      "9000000000",
      "owner",
      Utc::now(),
    )
  }

  #[test]
  fn test_role_ordering_matches_capability() {
    assert!(Role::Worker < Role::Admin);
    assert!(Role::Admin < Role::Owner);

    let owner = permissions_for(Role::Owner);
    let admin = permissions_for(Role::Admin);
    let worker = permissions_for(Role::Worker);
    assert!(owner.contains(&admin));
    assert!(admin.contains(&worker));
    assert!(!admin.contains(&owner));
  }

  #[test]
  fn test_only_owner_manages_business_and_members() {
    assert!(permissions_for(Role::Owner).can_edit_business);
    assert!(permissions_for(Role::Owner).can_manage_members);
    for role in [Role::Admin, Role::Worker] {
      assert!(!permissions_for(role).can_edit_business);
      assert!(!permissions_for(role).can_manage_members);
    }
  }

  #[test]
  fn test_owner_is_immutable() {
    let members = [
      member("o", Role::Owner),
      member("a", Role::Admin),
      member("w", Role::Worker),
    ];

    assert!(!can_change_role(&members[0], Role::Worker));
    assert!(!can_remove(&members[0]));

    assert!(can_change_role(&members[1], Role::Worker));
    assert!(can_remove(&members[1]));
    assert!(can_change_role(&members[2], Role::Admin));
    assert!(can_remove(&members[2]));
  }

  #[test]
  fn test_owner_role_change_rejected() {
    let owner = member("o", Role::Owner);
    let err = apply_role_change(&owner, Role::Admin).unwrap_err();
    assert_eq!(
      err,
      PermissionError::InvariantViolation(Invariant::OwnerRoleChange)
    );
    assert_eq!(
      check_removal(&owner).unwrap_err(),
      PermissionError::InvariantViolation(Invariant::OwnerRemoval)
    );
  }

  #[test]
  fn test_promotion_to_owner_rejected() {
    let admin = member("a", Role::Admin);
    assert!(!can_change_role(&admin, Role::Owner));
    assert_eq!(
      apply_role_change(&admin, Role::Owner).unwrap_err(),
      PermissionError::InvariantViolation(Invariant::SecondOwner)
    );
  }

  #[test]
  fn test_role_change_carries_canonical_permissions() {
    let worker = member("w", Role::Worker);
    let promoted = apply_role_change(&worker, Role::Admin).unwrap();
    assert_eq!(promoted.role(), Role::Admin);
    assert_eq!(*promoted.permissions(), permissions_for(Role::Admin));
    assert_eq!(promoted.id, worker.id);
    // Original record untouched
    assert_eq!(worker.role(), Role::Worker);
  }

  #[test]
  fn test_deserialize_recomputes_permissions() {
    let json = r#"{
      "id": "w", "user_id": "u", "business_id": "b", "role": "worker",
      "name": "W", "phone_number": "1", "added_by": "o",
      "added_at": "2024-01-01T00:00:00Z",
      "permissions": { "can_manage_members": true, "can_edit_business": true }
    }"#;
    let m: BusinessMember = serde_json::from_str(json).unwrap();
    assert_eq!(*m.permissions(), permissions_for(Role::Worker));
    assert!(m.is_active);
  }

  #[test]
  fn test_single_owner_check() {
    let ok = vec![member("o", Role::Owner), member("w", Role::Worker)];
    assert!(check_single_owner(&ok).is_ok());

    let none = vec![member("w", Role::Worker)];
    assert_eq!(
      check_single_owner(&none).unwrap_err(),
      PermissionError::InvariantViolation(Invariant::OwnerCount(0))
    );

    let two = vec![member("o1", Role::Owner), member("o2", Role::Owner)];
    assert_eq!(
      check_single_owner(&two).unwrap_err(),
      PermissionError::InvariantViolation(Invariant::OwnerCount(2))
    );
  }

  #[test]
  fn test_role_from_str() {
    assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
    assert!("manager".parse::<Role>().is_err());
  }
}
