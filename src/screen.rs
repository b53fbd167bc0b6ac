use std::sync::Arc;

use crate::cache::{KeyValueStore, SyncCoordinator};
use crate::remote::{RemoteResourceClient, ResourceKey};

/// Data-bearing screens and the resources each one keeps in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  Dashboard,
  Customers,
  Transactions,
  Profile,
  Team,
}

impl Screen {
  pub fn resources(self) -> &'static [ResourceKey] {
    match self {
      Screen::Dashboard => &ResourceKey::ALL,
      Screen::Customers => &[ResourceKey::Customers],
      Screen::Transactions => &[ResourceKey::Transactions, ResourceKey::Customers],
      // The roster is keyed by the profile's business
      Screen::Profile | Screen::Team => &[ResourceKey::Profile],
    }
  }

  /// Coordinator owned by one mounted instance of this screen.
  pub fn mount<S, R>(self, store: Arc<S>, remote: Arc<R>) -> SyncCoordinator<S, R>
  where
    S: KeyValueStore + ?Sized + 'static,
    R: RemoteResourceClient + ?Sized + 'static,
  {
    SyncCoordinator::new(store, remote, self.resources())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_dashboard_tracks_every_resource() {
    assert_eq!(Screen::Dashboard.resources(), &ResourceKey::ALL[..]);
  }

  #[test]
  fn test_screens_declare_resources() {
    for screen in [
      Screen::Dashboard,
      Screen::Customers,
      Screen::Transactions,
      Screen::Profile,
      Screen::Team,
    ] {
      assert!(!screen.resources().is_empty(), "{:?}", screen);
    }
  }
}
