//! Core reconciliation and mapping engine for campaign resources.
//!
//! Public-health campaigns upload staff and facility sheets repeatedly
//! while a campaign is being assembled. This crate reconciles each upload
//! against the campaign store, derives mapping work between entities and
//! per-boundary projects, drives that work through a downstream mapping
//! executor, and confirms completion by polling the store.
//!
//! # Architecture
//!
//! - [`diff`] computes pure change sets from upload rows and stored records.
//! - [`dispatch`] publishes change sets to the message bus in fixed chunks.
//! - [`mapping`] drives mapping rows through their state machine.
//! - [`resolution`] resolves downstream ids for created entities.
//! - [`poll`] re-checks store predicates on a bounded schedule.
//! - [`process`] tracks per-phase progress and escalates failures.
//! - [`reconcile`] is the facade consumers call.
//!
//! Store, bus, and downstream collaborators are injected via the traits in
//! [`traits`]; PostgreSQL, NATS, and HTTP implementations live in sibling
//! crates.

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod mapping;
pub mod models;
pub mod poll;
pub mod process;
pub mod reconcile;
pub mod resolution;
pub mod traits;

pub use config::{BusTopics, EngineConfig};
pub use diff::{diff_entities, diff_mappings, seed_resource_pairs, EntityDiff, MappingDiff};
pub use dispatch::BatchDispatcher;
pub use error::AppError;
pub use mapping::{decide_action, MappingAction, MappingPassStats, MappingService};
pub use models::{
    facility_mapping_identifier, facility_name_from_identifier, normalize_boundaries,
    AuditDetails, CampaignEmployee, CampaignFacility, CampaignMapping, CampaignProject,
    EmployeeRow, EntityKind, FacilityRow, MappingStatus, MappingType, PhaseStatus, ProcessName,
    ProcessStatus, UsageStatus,
};
pub use poll::Poller;
pub use process::ProcessTracker;
pub use reconcile::{ChangeSetSummary, EntityUpload, ReconcileService};
pub use resolution::ResolutionService;
pub use traits::{CreateOutcome, EntityDirectory, EntityStore, MappingExecutor, MessageBus};
