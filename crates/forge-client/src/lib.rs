//! Downstream service clients for the campaign reconciliation engine.
//!
//! - [`ProjectServiceClient`] implements the engine's `MappingExecutor`
//!   against the project service's association endpoints.
//! - [`EntityDirectoryClient`] implements `EntityDirectory` against the
//!   user and facility directories.

pub mod directory;
pub mod project;

pub use directory::EntityDirectoryClient;
pub use project::ProjectServiceClient;
