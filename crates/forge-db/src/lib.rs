//! PostgreSQL store for the campaign reconciliation engine.
//!
//! Provides [`CampaignStore`], the `sqlx`-backed implementation of the
//! engine's [`EntityStore`] trait. Schema migrations live under
//! `migrations/`.
//!
//! [`EntityStore`]: forge_core::traits::EntityStore

pub mod store;

pub use store::CampaignStore;
