//! Remote API access, one independent call per resource.

mod client;
mod resource;
pub mod types;

pub use client::HttpRemoteClient;
pub use resource::{ResourceKey, ResourcePayload};

use async_trait::async_trait;
use color_eyre::Result;

use types::{Customer, DashboardSummary, Profile, Transaction};

/// Per-resource fetch capability.
///
/// Every call is a separate round trip; callers must not assume batching.
#[async_trait]
pub trait RemoteResourceClient: Send + Sync {
  async fn get_dashboard(&self) -> Result<DashboardSummary>;

  async fn get_transactions(&self) -> Result<Vec<Transaction>>;

  async fn get_customers(&self) -> Result<Vec<Customer>>;

  async fn get_profile(&self) -> Result<Profile>;
}
