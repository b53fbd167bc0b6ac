//! Cache-first client core for a small-business ledger.
//!
//! Screens mount a [`cache::SyncCoordinator`] that serves the last persisted
//! snapshot immediately and refreshes each resource from the network
//! independently. [`permissions`] and [`team`] govern who may change the
//! business's team, and [`views`] derives dashboard figures from a snapshot.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod permissions;
pub mod remote;
pub mod screen;
pub mod team;
pub mod views;
