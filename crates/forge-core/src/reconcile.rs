//! Reconcile service facade.
//!
//! Entry points for the message-bus consumers driving a campaign build:
//! upload reconciliation, resource seeding, the creation and mapping
//! phases, and phase confirmation. Collaborators are injected through the
//! store/bus/executor/directory traits; the service owns no IO of its own.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::diff::{diff_entities, diff_mappings, seed_resource_pairs};
use crate::dispatch::BatchDispatcher;
use crate::error::AppError;
use crate::mapping::{MappingPassStats, MappingService, MappingUpdate};
use crate::models::{
    epoch_millis, facility_mapping_identifier, AuditDetails, CampaignEmployee, CampaignFacility,
    CampaignMapping, EmployeeRow, EntityKind, FacilityRow, MappingStatus, MappingType,
    PhaseStatus, ProcessName,
};
use crate::poll::Poller;
use crate::process::ProcessTracker;
use crate::resolution::ResolutionService;
use crate::traits::{EntityDirectory, EntityStore, MappingExecutor, MessageBus};

// =============================================================================
// Upload and summary types
// =============================================================================

/// One parsed upload, tagged with the record kind it carries.
#[derive(Debug, Clone)]
pub enum EntityUpload {
    Employees(Vec<EmployeeRow>),
    Facilities(Vec<FacilityRow>),
}

impl EntityUpload {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityUpload::Employees(_) => EntityKind::Employee,
            EntityUpload::Facilities(_) => EntityKind::Facility,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EntityUpload::Employees(rows) => rows.len(),
            EntityUpload::Facilities(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts of what one reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetSummary {
    pub new_active: usize,
    pub new_inactive: usize,
    pub reactivated: usize,
    pub deactivated: usize,
    pub mappings_created: usize,
    pub mappings_reopened: usize,
    pub mappings_detach_requested: usize,
    /// Bus submissions made while dispatching the change set.
    pub bus_submissions: usize,
}

impl ChangeSetSummary {
    pub fn is_empty(&self) -> bool {
        self.new_active == 0
            && self.new_inactive == 0
            && self.reactivated == 0
            && self.deactivated == 0
            && self.mappings_created == 0
            && self.mappings_reopened == 0
            && self.mappings_detach_requested == 0
    }
}

/// Active-flag update for a stored entity record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveFlagUpdate {
    id: Uuid,
    campaign_number: String,
    is_active: bool,
    last_modified_by: String,
    last_modified_time: i64,
}

impl ActiveFlagUpdate {
    fn new(id: Uuid, campaign_number: &str, is_active: bool, user: &str) -> Self {
        Self {
            id,
            campaign_number: campaign_number.to_string(),
            is_active,
            last_modified_by: user.to_string(),
            last_modified_time: epoch_millis(),
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Campaign reconciliation engine facade.
#[derive(Debug, Clone)]
pub struct ReconcileService<S, B, X, D>
where
    S: EntityStore,
    B: MessageBus,
    X: MappingExecutor,
    D: EntityDirectory,
{
    store: S,
    dispatcher: BatchDispatcher<B>,
    tracker: ProcessTracker<S, B>,
    mapping: MappingService<S, B, X>,
    resolution: ResolutionService<S, B, D>,
    config: EngineConfig,
}

impl<S, B, X, D> ReconcileService<S, B, X, D>
where
    S: EntityStore,
    B: MessageBus,
    X: MappingExecutor,
    D: EntityDirectory,
{
    pub fn new(
        store: S,
        bus: B,
        executor: X,
        directory: D,
        config: EngineConfig,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            dispatcher: BatchDispatcher::new(bus.clone(), config.chunk_size),
            tracker: ProcessTracker::new(store.clone(), bus.clone(), config.topics.clone()),
            mapping: MappingService::new(store.clone(), bus.clone(), executor, config.clone()),
            resolution: ResolutionService::new(store.clone(), bus, directory, config.clone()),
            store,
            config,
        })
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Reconcile an upload against the store and dispatch the change set.
    ///
    /// Computes record and mapping diffs, publishes save/update batches,
    /// and returns a summary of what changed. Re-running with the same
    /// upload once the store has caught up yields an empty summary.
    pub async fn reconcile_and_persist(
        &self,
        campaign_number: &str,
        upload: &EntityUpload,
        user: &str,
    ) -> Result<ChangeSetSummary, AppError> {
        let summary = match upload {
            EntityUpload::Employees(rows) => {
                self.reconcile_employees(campaign_number, rows, user).await?
            }
            EntityUpload::Facilities(rows) => {
                self.reconcile_facilities(campaign_number, rows, user).await?
            }
        };
        info!(
            campaign_number,
            kind = %upload.kind(),
            rows = upload.len(),
            new_active = summary.new_active,
            detach_requested = summary.mappings_detach_requested,
            "reconciled upload"
        );
        Ok(summary)
    }

    async fn reconcile_employees(
        &self,
        campaign_number: &str,
        rows: &[EmployeeRow],
        user: &str,
    ) -> Result<ChangeSetSummary, AppError> {
        let keys: Vec<String> = rows.iter().map(|r| r.mobile_number.clone()).collect();
        let stored = self.store.employees_by_keys(campaign_number, &keys).await?;
        let diff = diff_entities(rows, &stored);
        let mut summary = ChangeSetSummary {
            new_active: diff.new_active.len(),
            new_inactive: diff.new_inactive.len(),
            reactivated: diff.reactivate.len(),
            deactivated: diff.deactivate.len(),
            ..Default::default()
        };

        let mut creates: Vec<CampaignEmployee> = Vec::new();
        for (row, active) in diff
            .new_active
            .iter()
            .map(|r| (*r, true))
            .chain(diff.new_inactive.iter().map(|r| (*r, false)))
        {
            creates.push(CampaignEmployee {
                id: Uuid::new_v4(),
                campaign_number: campaign_number.to_string(),
                mobile_number: row.mobile_number.clone(),
                name: row.name.clone(),
                role: row.role.clone(),
                employee_type: row.employee_type.clone(),
                user_service_uuid: None,
                is_active: active,
                audit: AuditDetails::new(user),
            });
        }
        let flag_updates: Vec<ActiveFlagUpdate> = diff
            .reactivate
            .iter()
            .map(|e| ActiveFlagUpdate::new(e.id, campaign_number, true, user))
            .chain(
                diff.deactivate
                    .iter()
                    .map(|e| ActiveFlagUpdate::new(e.id, campaign_number, false, user)),
            )
            .collect();

        summary.bus_submissions += self
            .dispatcher
            .dispatch(
                &self.config.topics.save_employees,
                "campaignEmployees",
                &creates,
            )
            .await?;
        summary.bus_submissions += self
            .dispatcher
            .dispatch(
                &self.config.topics.update_employees,
                "campaignEmployees",
                &flag_updates,
            )
            .await?;

        self.reconcile_mappings(
            campaign_number,
            rows,
            MappingType::Staff,
            |r: &EmployeeRow| r.mobile_number.clone(),
            user,
            &mut summary,
        )
        .await?;
        Ok(summary)
    }

    async fn reconcile_facilities(
        &self,
        campaign_number: &str,
        rows: &[FacilityRow],
        user: &str,
    ) -> Result<ChangeSetSummary, AppError> {
        let keys: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
        let stored = self.store.facilities_by_keys(campaign_number, &keys).await?;
        let diff = diff_entities(rows, &stored);
        let mut summary = ChangeSetSummary {
            new_active: diff.new_active.len(),
            new_inactive: diff.new_inactive.len(),
            reactivated: diff.reactivate.len(),
            deactivated: diff.deactivate.len(),
            ..Default::default()
        };

        let mut creates: Vec<CampaignFacility> = Vec::new();
        for (row, active) in diff
            .new_active
            .iter()
            .map(|r| (*r, true))
            .chain(diff.new_inactive.iter().map(|r| (*r, false)))
        {
            creates.push(CampaignFacility {
                id: Uuid::new_v4(),
                campaign_number: campaign_number.to_string(),
                name: row.name.clone(),
                facility_usage: row.facility_usage.clone(),
                storage_capacity: row.storage_capacity,
                is_permanent: row.is_permanent,
                facility_id: None,
                is_active: active,
                audit: AuditDetails::new(user),
            });
        }
        let flag_updates: Vec<ActiveFlagUpdate> = diff
            .reactivate
            .iter()
            .map(|f| ActiveFlagUpdate::new(f.id, campaign_number, true, user))
            .chain(
                diff.deactivate
                    .iter()
                    .map(|f| ActiveFlagUpdate::new(f.id, campaign_number, false, user)),
            )
            .collect();

        summary.bus_submissions += self
            .dispatcher
            .dispatch(
                &self.config.topics.save_facilities,
                "campaignFacilities",
                &creates,
            )
            .await?;
        summary.bus_submissions += self
            .dispatcher
            .dispatch(
                &self.config.topics.update_facilities,
                "campaignFacilities",
                &flag_updates,
            )
            .await?;

        let campaign = campaign_number.to_string();
        self.reconcile_mappings(
            campaign_number,
            rows,
            MappingType::Facility,
            move |r: &FacilityRow| facility_mapping_identifier(&campaign, &r.name),
            user,
            &mut summary,
        )
        .await?;
        Ok(summary)
    }

    async fn reconcile_mappings<U, F>(
        &self,
        campaign_number: &str,
        rows: &[U],
        mapping_type: MappingType,
        identifier_of: F,
        user: &str,
        summary: &mut ChangeSetSummary,
    ) -> Result<(), AppError>
    where
        U: crate::models::UploadRecord,
        F: Fn(&U) -> String,
    {
        let stored = self
            .store
            .mappings(campaign_number, Some(mapping_type))
            .await?;
        let diff = diff_mappings(rows, &stored, identifier_of);
        summary.mappings_created = diff.to_create.len();
        summary.mappings_reopened = diff.to_reopen.len();
        summary.mappings_detach_requested = diff.to_detach.len();

        let creates: Vec<CampaignMapping> = diff
            .to_create
            .iter()
            .map(|(identifier, boundary)| {
                CampaignMapping::to_be_mapped(
                    campaign_number,
                    identifier,
                    mapping_type,
                    boundary,
                    user,
                )
            })
            .collect();

        // Re-opened rows restart the cycle without a code; detach requests
        // keep theirs for the downstream delete.
        let updates: Vec<MappingUpdate> = diff
            .to_reopen
            .iter()
            .map(|m| MappingUpdate::new(m, MappingStatus::ToBeMapped, None, user))
            .chain(
                diff.to_detach
                    .iter()
                    .map(|m| MappingUpdate::new(m, MappingStatus::ToBeDetached, m.mapping_code.clone(), user)),
            )
            .collect();

        summary.bus_submissions += self
            .dispatcher
            .dispatch(
                &self.config.topics.save_mappings,
                "campaignMappings",
                &creates,
            )
            .await?;
        summary.bus_submissions += self
            .dispatcher
            .dispatch(
                &self.config.topics.update_mappings,
                "campaignMappings",
                &updates,
            )
            .await?;
        Ok(())
    }

    /// Seed `toBeMapped` resource rows for every product variant across
    /// every campaign boundary, skipping pairs already present. Returns
    /// the number of rows created.
    pub async fn seed_resource_mappings(
        &self,
        campaign_number: &str,
        product_variant_ids: &[String],
        user: &str,
    ) -> Result<usize, AppError> {
        let projects = self.store.projects(campaign_number).await?;
        let boundaries: Vec<String> = projects.into_iter().map(|p| p.boundary_code).collect();
        let existing = self
            .store
            .mappings(campaign_number, Some(MappingType::Resource))
            .await?;

        let creates: Vec<CampaignMapping> =
            seed_resource_pairs(product_variant_ids, &boundaries, &existing)
                .into_iter()
                .map(|(identifier, boundary)| {
                    CampaignMapping::to_be_mapped(
                        campaign_number,
                        identifier,
                        MappingType::Resource,
                        boundary,
                        user,
                    )
                })
                .collect();

        let created = creates.len();
        self.dispatcher
            .dispatch(
                &self.config.topics.save_mappings,
                "campaignMappings",
                &creates,
            )
            .await?;
        info!(campaign_number, created, "seeded resource mappings");
        Ok(created)
    }

    // -------------------------------------------------------------------------
    // Phases
    // -------------------------------------------------------------------------

    /// Run the downstream creation phase for one entity kind.
    ///
    /// Skips entirely when the phase has already completed for this
    /// campaign. On failure the phase is marked failed and the campaign
    /// failure is published before the error is returned.
    pub async fn run_creation_phase(
        &self,
        campaign_number: &str,
        kind: EntityKind,
        user: &str,
    ) -> Result<usize, AppError> {
        let process = match kind {
            EntityKind::Employee => ProcessName::EmployeeCreation,
            EntityKind::Facility => ProcessName::FacilityCreation,
        };
        if self
            .tracker
            .check_if_process_is_completed(campaign_number, process)
            .await?
        {
            info!(campaign_number, process = %process, "phase already completed, skipping");
            return Ok(0);
        }

        let swept = match kind {
            EntityKind::Employee => {
                self.resolution
                    .resolve_employees(campaign_number, user)
                    .await
            }
            EntityKind::Facility => {
                self.resolution
                    .resolve_facilities(campaign_number, user)
                    .await
            }
        };

        match swept {
            Ok(resolved) => {
                self.tracker
                    .mark_process_status(campaign_number, process, PhaseStatus::Completed, None)
                    .await?;
                Ok(resolved)
            }
            Err(e) => {
                let message = e.to_string();
                self.tracker
                    .fail_campaign(campaign_number, process, &message)
                    .await?;
                Err(AppError::PhaseFailed {
                    campaign_number: campaign_number.to_string(),
                    process: process.to_string(),
                    message,
                })
            }
        }
    }

    /// Run one mapping pass over the campaign's pending mapping rows.
    ///
    /// A completed mapping phase is not re-executed. Individual record
    /// failures are isolated during the pass; if any record failed, the
    /// phase is marked failed and the campaign failure escalated after the
    /// pass has finished.
    pub async fn run_mapping_pass(
        &self,
        campaign_number: &str,
        user: &str,
    ) -> Result<MappingPassStats, AppError> {
        if self
            .tracker
            .check_if_process_is_completed(campaign_number, ProcessName::Mapping)
            .await?
        {
            info!(campaign_number, "mapping phase already completed, skipping");
            return Ok(MappingPassStats::default());
        }

        let stats = self.mapping.run_pass(campaign_number, user).await?;
        if !stats.is_clean() {
            let message = format!("{} mapping records failed", stats.failed);
            self.tracker
                .fail_campaign(campaign_number, ProcessName::Mapping, &message)
                .await?;
            return Err(AppError::PhaseFailed {
                campaign_number: campaign_number.to_string(),
                process: ProcessName::Mapping.to_string(),
                message,
            });
        }
        Ok(stats)
    }

    /// Wait for a phase to complete.
    ///
    /// Each attempt checks the process status record first and falls back
    /// to the direct store predicate, so confirmation works whether or not
    /// the status write has been applied yet. On success the phase is
    /// marked completed; on a recorded failure or attempt exhaustion the
    /// campaign is failed and the error returned.
    pub async fn await_phase(
        &self,
        campaign_number: &str,
        process: ProcessName,
    ) -> Result<(), AppError> {
        if self
            .tracker
            .check_if_process_is_completed(campaign_number, process)
            .await?
        {
            return Ok(());
        }

        let poller = Poller::new(self.config.confirm_interval, self.config.confirm_max_attempts);
        let operation = format!("{process} confirmation");
        let waited = poller
            .await_completion(&operation, move || async move {
                if self
                    .tracker
                    .check_if_process_is_completed(campaign_number, process)
                    .await?
                {
                    return Ok(true);
                }
                if self
                    .tracker
                    .check_if_process_is_failed(campaign_number, process)
                    .await?
                {
                    return Ok(true);
                }
                self.phase_ready(campaign_number, process).await
            })
            .await;

        match waited {
            Ok(attempt) => {
                if self
                    .tracker
                    .check_if_process_is_failed(campaign_number, process)
                    .await?
                {
                    return Err(AppError::PhaseFailed {
                        campaign_number: campaign_number.to_string(),
                        process: process.to_string(),
                        message: "phase recorded as failed".to_string(),
                    });
                }
                info!(campaign_number, process = %process, attempt, "phase confirmed");
                self.tracker
                    .mark_process_status(campaign_number, process, PhaseStatus::Completed, None)
                    .await
            }
            Err(e) => {
                let message = e.to_string();
                self.tracker
                    .fail_campaign(campaign_number, process, &message)
                    .await?;
                Err(AppError::PhaseFailed {
                    campaign_number: campaign_number.to_string(),
                    process: process.to_string(),
                    message,
                })
            }
        }
    }

    /// Direct store predicate for phase readiness.
    async fn phase_ready(
        &self,
        campaign_number: &str,
        process: ProcessName,
    ) -> Result<bool, AppError> {
        match process {
            ProcessName::EmployeeCreation => Ok(self
                .store
                .count_unresolved_employees(campaign_number)
                .await?
                == 0),
            ProcessName::FacilityCreation => Ok(self
                .store
                .count_unresolved_facilities(campaign_number)
                .await?
                == 0),
            ProcessName::Mapping => self.store.all_mappings_terminal(campaign_number).await,
            ProcessName::ProjectCreation => {
                let projects = self.store.projects(campaign_number).await?;
                Ok(!projects.is_empty() && projects.iter().all(|p| p.project_id.is_some()))
            }
        }
    }

    /// The process tracker, exposed for consumers that record phase
    /// progress outside the built-in flows.
    pub fn tracker(&self) -> &ProcessTracker<S, B> {
        &self.tracker
    }
}
