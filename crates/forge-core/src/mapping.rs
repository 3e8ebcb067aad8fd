//! Mapping state machine.
//!
//! Drives pending mapping rows to their terminal states by calling the
//! downstream mapping executor. Work is grouped into fixed-size batches;
//! records within a batch run concurrently, batches run sequentially. A
//! failing record marks only itself `failed` and never aborts its
//! siblings.
//!
//! Action selection is a pure function over the row status and the
//! resolution of its project and target ids, so every branch is unit
//! testable without IO.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatch::BatchDispatcher;
use crate::error::AppError;
use crate::models::{
    epoch_millis, facility_mapping_identifier, CampaignMapping, MappingStatus, MappingType,
};
use crate::traits::{CreateOutcome, EntityStore, MappingExecutor, MessageBus};

// =============================================================================
// Action selection
// =============================================================================

/// What to do with one mapping row during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingAction {
    /// Call the downstream create and mark the row `mapped`.
    Create {
        project_id: String,
        target_id: String,
    },
    /// Search for the downstream association and delete it, then mark the
    /// row `detached`.
    Detach {
        project_id: String,
        target_id: String,
    },
    /// Delete the local row without any downstream call.
    RemoveLocal,
    /// Leave the row for a later pass; its ids are not resolvable yet.
    Defer,
    /// Terminal row; never touched.
    Skip,
}

/// Select the action for a mapping row given the resolved project and
/// target ids.
///
/// Resources pending detachment are removed locally without a downstream
/// call; resource associations are never demapped. A detach whose ids can
/// no longer be resolved also falls back to local removal, since there is
/// nothing addressable downstream.
pub fn decide_action(
    mapping: &CampaignMapping,
    project_id: Option<&str>,
    target_id: Option<&str>,
) -> MappingAction {
    if mapping.status.is_terminal() {
        return MappingAction::Skip;
    }

    match mapping.status {
        MappingStatus::ToBeMapped => match (project_id, target_id) {
            (Some(project), Some(target)) => MappingAction::Create {
                project_id: project.to_string(),
                target_id: target.to_string(),
            },
            _ => MappingAction::Defer,
        },
        MappingStatus::ToBeDetached => {
            if mapping.mapping_type == MappingType::Resource {
                return MappingAction::RemoveLocal;
            }
            match (project_id, target_id) {
                (Some(project), Some(target)) => MappingAction::Detach {
                    project_id: project.to_string(),
                    target_id: target.to_string(),
                },
                _ => MappingAction::RemoveLocal,
            }
        }
        // is_terminal() above covers the rest
        _ => MappingAction::Skip,
    }
}

// =============================================================================
// Resolution context
// =============================================================================

/// Lookup tables resolving mapping identifiers and boundaries to
/// downstream ids, built once per pass from freshly loaded store rows.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    /// Boundary code → downstream project id.
    pub project_by_boundary: HashMap<String, String>,
    /// Staff identifier (mobile number) → user service uuid.
    pub staff_targets: HashMap<String, String>,
    /// Facility identifier (composite key) → downstream facility id.
    pub facility_targets: HashMap<String, String>,
}

impl ResolutionContext {
    pub fn project_id(&self, boundary_code: &str) -> Option<&str> {
        self.project_by_boundary.get(boundary_code).map(String::as_str)
    }

    /// Resolve the downstream target for a mapping row. Resource rows are
    /// their own target: the identifier is the product variant id.
    pub fn target_id<'a>(&'a self, mapping: &'a CampaignMapping) -> Option<&'a str> {
        match mapping.mapping_type {
            MappingType::Staff => self
                .staff_targets
                .get(&mapping.mapping_identifier)
                .map(String::as_str),
            MappingType::Facility => self
                .facility_targets
                .get(&mapping.mapping_identifier)
                .map(String::as_str),
            MappingType::Resource => Some(&mapping.mapping_identifier),
        }
    }
}

// =============================================================================
// Pass statistics
// =============================================================================

/// Outcome counts for one mapping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingPassStats {
    pub mapped: usize,
    pub detached: usize,
    pub removed: usize,
    pub deferred: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl MappingPassStats {
    /// True when no record failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Records the pass touched in any way.
    pub fn total(&self) -> usize {
        self.mapped + self.detached + self.removed + self.deferred + self.failed + self.skipped
    }
}

// =============================================================================
// Pass execution
// =============================================================================

/// Status update for one mapping row, published to the bus.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MappingUpdate {
    id: Uuid,
    campaign_number: String,
    status: MappingStatus,
    mapping_code: Option<String>,
    last_modified_by: String,
    last_modified_time: i64,
}

impl MappingUpdate {
    pub(crate) fn new(
        mapping: &CampaignMapping,
        status: MappingStatus,
        mapping_code: Option<String>,
        user: &str,
    ) -> Self {
        Self {
            id: mapping.id,
            campaign_number: mapping.campaign_number.clone(),
            status,
            mapping_code,
            last_modified_by: user.to_string(),
            last_modified_time: epoch_millis(),
        }
    }
}

enum RecordOutcome {
    Mapped(MappingUpdate),
    Detached(MappingUpdate),
    RemoveLocal(Uuid),
    Deferred,
    Failed(MappingUpdate),
    Skipped,
}

/// Executes mapping passes against the downstream mapping executor.
#[derive(Debug, Clone)]
pub struct MappingService<S, B, X>
where
    S: EntityStore,
    B: MessageBus,
    X: MappingExecutor,
{
    store: S,
    executor: X,
    dispatcher: BatchDispatcher<B>,
    config: EngineConfig,
}

impl<S, B, X> MappingService<S, B, X>
where
    S: EntityStore,
    B: MessageBus,
    X: MappingExecutor,
{
    pub fn new(store: S, bus: B, executor: X, config: EngineConfig) -> Self {
        let dispatcher = BatchDispatcher::new(bus, config.chunk_size);
        Self {
            store,
            executor,
            dispatcher,
            config,
        }
    }

    /// Build the resolution context for a campaign from the store.
    async fn load_context(&self, campaign_number: &str) -> Result<ResolutionContext, AppError> {
        let mut ctx = ResolutionContext::default();

        for project in self.store.projects(campaign_number).await? {
            if let Some(project_id) = project.project_id {
                ctx.project_by_boundary
                    .insert(project.boundary_code, project_id);
            }
        }
        for employee in self.store.employees(campaign_number).await? {
            if let Some(uuid) = employee.user_service_uuid {
                ctx.staff_targets.insert(employee.mobile_number, uuid);
            }
        }
        for facility in self.store.facilities(campaign_number).await? {
            if let Some(facility_id) = facility.facility_id {
                let key = facility_mapping_identifier(campaign_number, &facility.name);
                ctx.facility_targets.insert(key, facility_id);
            }
        }

        Ok(ctx)
    }

    /// Run one mapping pass over every non-terminal mapping row of the
    /// campaign, for all mapping types.
    pub async fn run_pass(
        &self,
        campaign_number: &str,
        user: &str,
    ) -> Result<MappingPassStats, AppError> {
        let mappings = self.store.mappings(campaign_number, None).await?;
        let ctx = self.load_context(campaign_number).await?;

        let mut stats = MappingPassStats::default();
        let mut updates: Vec<MappingUpdate> = Vec::new();
        let mut removals: Vec<Uuid> = Vec::new();

        let pending: Vec<&CampaignMapping> =
            mappings.iter().filter(|m| !m.status.is_terminal()).collect();
        stats.skipped = mappings.len() - pending.len();

        for batch in pending.chunks(self.config.chunk_size) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|mapping| self.execute_record(mapping, &ctx, user)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    RecordOutcome::Mapped(update) => {
                        stats.mapped += 1;
                        updates.push(update);
                    }
                    RecordOutcome::Detached(update) => {
                        stats.detached += 1;
                        updates.push(update);
                    }
                    RecordOutcome::RemoveLocal(id) => {
                        stats.removed += 1;
                        removals.push(id);
                    }
                    RecordOutcome::Deferred => stats.deferred += 1,
                    RecordOutcome::Failed(update) => {
                        stats.failed += 1;
                        updates.push(update);
                    }
                    RecordOutcome::Skipped => stats.skipped += 1,
                }
            }
        }

        self.dispatcher
            .dispatch(
                &self.config.topics.update_mappings,
                "campaignMappings",
                &updates,
            )
            .await?;
        self.dispatcher
            .dispatch(
                &self.config.topics.delete_mappings,
                "campaignMappingIds",
                &removals,
            )
            .await?;

        info!(
            campaign_number,
            mapped = stats.mapped,
            detached = stats.detached,
            removed = stats.removed,
            deferred = stats.deferred,
            failed = stats.failed,
            "mapping pass finished"
        );
        Ok(stats)
    }

    async fn execute_record(
        &self,
        mapping: &CampaignMapping,
        ctx: &ResolutionContext,
        user: &str,
    ) -> RecordOutcome {
        let action = decide_action(
            mapping,
            ctx.project_id(&mapping.boundary_code),
            ctx.target_id(mapping),
        );

        match action {
            MappingAction::Create {
                project_id,
                target_id,
            } => self.create_record(mapping, &project_id, &target_id, user).await,
            MappingAction::Detach {
                project_id,
                target_id,
            } => self.detach_record(mapping, &project_id, &target_id, user).await,
            MappingAction::RemoveLocal => RecordOutcome::RemoveLocal(mapping.id),
            MappingAction::Defer => RecordOutcome::Deferred,
            MappingAction::Skip => RecordOutcome::Skipped,
        }
    }

    async fn create_record(
        &self,
        mapping: &CampaignMapping,
        project_id: &str,
        target_id: &str,
        user: &str,
    ) -> RecordOutcome {
        let created = self
            .executor
            .create_association(mapping.mapping_type, project_id, target_id)
            .await;

        match created {
            Ok(CreateOutcome::Created(code)) => RecordOutcome::Mapped(MappingUpdate::new(
                mapping,
                MappingStatus::Mapped,
                Some(code),
                user,
            )),
            // Already present downstream: recover the code so the row can
            // still satisfy the mapped-implies-code invariant.
            Ok(CreateOutcome::Duplicate) => {
                match self
                    .executor
                    .search_association(mapping.mapping_type, project_id, target_id)
                    .await
                {
                    Ok(Some(code)) => RecordOutcome::Mapped(MappingUpdate::new(
                        mapping,
                        MappingStatus::Mapped,
                        Some(code),
                        user,
                    )),
                    Ok(None) => RecordOutcome::Deferred,
                    Err(e) => self.fail_record(mapping, user, "association search", e),
                }
            }
            Err(e) => self.fail_record(mapping, user, "association create", e),
        }
    }

    async fn detach_record(
        &self,
        mapping: &CampaignMapping,
        project_id: &str,
        target_id: &str,
        user: &str,
    ) -> RecordOutcome {
        match self
            .executor
            .search_association(mapping.mapping_type, project_id, target_id)
            .await
        {
            // Nothing downstream to detach; drop the local row.
            Ok(None) => RecordOutcome::RemoveLocal(mapping.id),
            Ok(Some(code)) => {
                match self
                    .executor
                    .delete_association(mapping.mapping_type, &code)
                    .await
                {
                    Ok(()) => RecordOutcome::Detached(MappingUpdate::new(
                        mapping,
                        MappingStatus::Detached,
                        Some(code),
                        user,
                    )),
                    Err(e) => self.fail_record(mapping, user, "association delete", e),
                }
            }
            Err(e) => self.fail_record(mapping, user, "association search", e),
        }
    }

    fn fail_record(
        &self,
        mapping: &CampaignMapping,
        user: &str,
        operation: &str,
        error: AppError,
    ) -> RecordOutcome {
        warn!(
            mapping_id = %mapping.id,
            identifier = %mapping.mapping_identifier,
            boundary = %mapping.boundary_code,
            operation,
            error = %error,
            "mapping record failed"
        );
        RecordOutcome::Failed(MappingUpdate::new(
            mapping,
            MappingStatus::Failed,
            mapping.mapping_code.clone(),
            user,
        ))
    }
}
