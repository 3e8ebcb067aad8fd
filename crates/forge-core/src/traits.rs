//! Trait seams for store, bus, and downstream collaborators.
//!
//! These abstractions enable different backends (PostgreSQL, in-memory for
//! tests) and facilitate dependency injection in the reconcile service.

use std::collections::HashMap;
use std::future::Future;

use crate::error::AppError;
use crate::models::{
    CampaignEmployee, CampaignFacility, CampaignMapping, CampaignProject, MappingType,
    PhaseStatus, ProcessName, ProcessStatus,
};

/// Read access to the campaign entity store.
///
/// All reads are scoped by campaign number. Writes never go through this
/// trait: the engine publishes save/update/delete batches to the message bus
/// and a persister consumer applies them, so implementations only need the
/// query side.
///
/// # Implementation Notes
///
/// Implementations should chunk key-list filters at the engine chunk size
/// and keep the predicate methods as single fast-path queries.
pub trait EntityStore: Send + Sync + Clone {
    /// All employees of a campaign.
    fn employees(
        &self,
        campaign_number: &str,
    ) -> impl Future<Output = Result<Vec<CampaignEmployee>, AppError>> + Send;

    /// Employees of a campaign matching the given mobile numbers.
    fn employees_by_keys(
        &self,
        campaign_number: &str,
        mobile_numbers: &[String],
    ) -> impl Future<Output = Result<Vec<CampaignEmployee>, AppError>> + Send;

    /// All facilities of a campaign.
    fn facilities(
        &self,
        campaign_number: &str,
    ) -> impl Future<Output = Result<Vec<CampaignFacility>, AppError>> + Send;

    /// Facilities of a campaign matching the given names.
    fn facilities_by_keys(
        &self,
        campaign_number: &str,
        names: &[String],
    ) -> impl Future<Output = Result<Vec<CampaignFacility>, AppError>> + Send;

    /// Mapping rows of a campaign, optionally restricted to one type.
    fn mappings(
        &self,
        campaign_number: &str,
        mapping_type: Option<MappingType>,
    ) -> impl Future<Output = Result<Vec<CampaignMapping>, AppError>> + Send;

    /// Boundary projects of a campaign.
    fn projects(
        &self,
        campaign_number: &str,
    ) -> impl Future<Output = Result<Vec<CampaignProject>, AppError>> + Send;

    /// Count of active employees still missing their downstream user id.
    fn count_unresolved_employees(
        &self,
        campaign_number: &str,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Count of active facilities still missing their downstream facility id.
    fn count_unresolved_facilities(
        &self,
        campaign_number: &str,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// True when no mapping row of the campaign is still in flight:
    /// nothing `toBeMapped`, nothing `toBeDetached`, and every `mapped`
    /// row carries a mapping code.
    fn all_mappings_terminal(
        &self,
        campaign_number: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Process status rows of a campaign.
    fn process_statuses(
        &self,
        campaign_number: &str,
    ) -> impl Future<Output = Result<Vec<ProcessStatus>, AppError>> + Send;

    /// True when a (campaign, process) row exists with the given status.
    fn has_process_status(
        &self,
        campaign_number: &str,
        process: ProcessName,
        status: PhaseStatus,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Outcome of a downstream association create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The association was created; carries the downstream mapping code.
    Created(String),
    /// The association already existed downstream. Treated as success;
    /// the caller recovers the mapping code via a search.
    Duplicate,
}

/// Downstream project association operations (staff, facility, resource).
pub trait MappingExecutor: Send + Sync + Clone {
    /// Create an association between a project and a target entity.
    ///
    /// A downstream `DUPLICATE_ENTITY` rejection is reported as
    /// [`CreateOutcome::Duplicate`], not as an error.
    fn create_association(
        &self,
        mapping_type: MappingType,
        project_id: &str,
        target_id: &str,
    ) -> impl Future<Output = Result<CreateOutcome, AppError>> + Send;

    /// Find an existing association, returning its mapping code.
    fn search_association(
        &self,
        mapping_type: MappingType,
        project_id: &str,
        target_id: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Delete an association by its mapping code.
    fn delete_association(
        &self,
        mapping_type: MappingType,
        mapping_code: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Downstream entity creation used by the resolution sweep.
///
/// Returns natural-key → downstream-id maps so the sweep can write the ids
/// back onto the store rows.
pub trait EntityDirectory: Send + Sync + Clone {
    /// Create downstream users for the given employees.
    ///
    /// Returns mobile number → user service uuid for every employee the
    /// directory resolved (created or already present).
    fn create_employees(
        &self,
        employees: &[CampaignEmployee],
    ) -> impl Future<Output = Result<HashMap<String, String>, AppError>> + Send;

    /// Create downstream facilities.
    ///
    /// Returns facility name → facility id.
    fn create_facilities(
        &self,
        facilities: &[CampaignFacility],
    ) -> impl Future<Output = Result<HashMap<String, String>, AppError>> + Send;
}

/// Fire-and-forget topic publishing.
///
/// The engine never awaits persistence acknowledgements; a publish returning
/// `Ok` only means the bus accepted the message.
pub trait MessageBus: Send + Sync + Clone {
    fn publish(
        &self,
        topic: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
