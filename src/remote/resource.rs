//! Resource keys and their typed payloads.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{Customer, DashboardSummary, Profile, Transaction};
use super::RemoteResourceClient;

/// One independently cacheable and fetchable slice of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKey {
  Dashboard,
  Transactions,
  Customers,
  Profile,
}

impl ResourceKey {
  pub const ALL: [ResourceKey; 4] = [
    ResourceKey::Dashboard,
    ResourceKey::Transactions,
    ResourceKey::Customers,
    ResourceKey::Profile,
  ];

  /// Name of the resource inside a snapshot
  pub fn name(self) -> &'static str {
    match self {
      Self::Dashboard => "dashboard",
      Self::Transactions => "transactions",
      Self::Customers => "customers",
      Self::Profile => "profile",
    }
  }

  /// Durable store key. One key per resource, never shared.
  pub fn cache_key(self) -> &'static str {
    match self {
      Self::Dashboard => "dashboard_cache",
      Self::Transactions => "transactions_cache",
      Self::Customers => "customers_cache",
      Self::Profile => "userData",
    }
  }

  /// Decode a persisted blob into this resource's payload type.
  pub fn decode(self, blob: &str) -> serde_json::Result<ResourcePayload> {
    Ok(match self {
      Self::Dashboard => ResourcePayload::Dashboard(serde_json::from_str(blob)?),
      Self::Transactions => ResourcePayload::Transactions(serde_json::from_str(blob)?),
      Self::Customers => ResourcePayload::Customers(serde_json::from_str(blob)?),
      Self::Profile => ResourcePayload::Profile(serde_json::from_str(blob)?),
    })
  }

  /// Issue the remote call that backs this resource.
  pub async fn fetch<R>(self, remote: &R) -> Result<ResourcePayload>
  where
    R: RemoteResourceClient + ?Sized,
  {
    Ok(match self {
      Self::Dashboard => ResourcePayload::Dashboard(remote.get_dashboard().await?),
      Self::Transactions => ResourcePayload::Transactions(remote.get_transactions().await?),
      Self::Customers => ResourcePayload::Customers(remote.get_customers().await?),
      Self::Profile => ResourcePayload::Profile(remote.get_profile().await?),
    })
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Typed value held for a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourcePayload {
  Dashboard(DashboardSummary),
  Transactions(Vec<Transaction>),
  Customers(Vec<Customer>),
  Profile(Profile),
}

impl ResourcePayload {
  pub fn key(&self) -> ResourceKey {
    match self {
      Self::Dashboard(_) => ResourceKey::Dashboard,
      Self::Transactions(_) => ResourceKey::Transactions,
      Self::Customers(_) => ResourceKey::Customers,
      Self::Profile(_) => ResourceKey::Profile,
    }
  }

  /// Serialize the inner value, the same shape the remote returned.
  pub fn encode(&self) -> serde_json::Result<String> {
    match self {
      Self::Dashboard(v) => serde_json::to_string(v),
      Self::Transactions(v) => serde_json::to_string(v),
      Self::Customers(v) => serde_json::to_string(v),
      Self::Profile(v) => serde_json::to_string(v),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_keys_are_distinct() {
    let mut keys: Vec<&str> = ResourceKey::ALL.iter().map(|k| k.cache_key()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), ResourceKey::ALL.len());
    assert_eq!(ResourceKey::Profile.cache_key(), "userData");
  }

  #[test]
  fn test_decode_uses_key_type() {
    let payload = ResourceKey::Customers
      .decode(r#"[{"id":"c1","name":"Asha","phone_number":"98","balance":12.5}]"#)
      .unwrap();
    match payload {
      ResourcePayload::Customers(list) => {
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].balance, 12.5);
      }
      other => panic!("unexpected payload {:?}", other),
    }
  }

  #[test]
  fn test_decode_rejects_wrong_shape() {
    assert!(ResourceKey::Profile.decode("[1, 2, 3]").is_err());
    assert!(ResourceKey::Transactions.decode("{not json").is_err());
  }
}
