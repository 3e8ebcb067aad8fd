//! Entity resolution sweep.
//!
//! Active campaign rows start without their downstream ids. The sweep
//! sends the unresolved rows to the downstream directory in chunks, writes
//! the returned ids back through the bus, and then polls the store until
//! every active row carries its id.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatch::BatchDispatcher;
use crate::error::AppError;
use crate::models::epoch_millis;
use crate::poll::Poller;
use crate::traits::{EntityDirectory, EntityStore, MessageBus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeIdUpdate {
    id: Uuid,
    campaign_number: String,
    user_service_uuid: String,
    last_modified_by: String,
    last_modified_time: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilityIdUpdate {
    id: Uuid,
    campaign_number: String,
    facility_id: String,
    last_modified_by: String,
    last_modified_time: i64,
}

/// Resolves downstream ids for campaign employees and facilities.
#[derive(Debug, Clone)]
pub struct ResolutionService<S, B, D>
where
    S: EntityStore,
    B: MessageBus,
    D: EntityDirectory,
{
    store: S,
    directory: D,
    dispatcher: BatchDispatcher<B>,
    config: EngineConfig,
}

impl<S, B, D> ResolutionService<S, B, D>
where
    S: EntityStore,
    B: MessageBus,
    D: EntityDirectory,
{
    pub fn new(store: S, bus: B, directory: D, config: EngineConfig) -> Self {
        let dispatcher = BatchDispatcher::new(bus, config.chunk_size);
        Self {
            store,
            directory,
            dispatcher,
            config,
        }
    }

    /// Resolve user service uuids for all active employees missing one.
    ///
    /// Returns the number of rows resolved in this sweep. Errors once the
    /// confirmation budget is spent with unresolved rows remaining.
    pub async fn resolve_employees(
        &self,
        campaign_number: &str,
        user: &str,
    ) -> Result<usize, AppError> {
        let employees = self.store.employees(campaign_number).await?;
        let unresolved: Vec<_> = employees
            .into_iter()
            .filter(|e| e.is_active && e.user_service_uuid.is_none())
            .collect();

        if unresolved.is_empty() {
            return Ok(0);
        }
        info!(
            campaign_number,
            unresolved = unresolved.len(),
            "resolving employee user ids"
        );

        let mut updates: Vec<EmployeeIdUpdate> = Vec::new();
        for chunk in unresolved.chunks(self.config.chunk_size) {
            let resolved = self.directory.create_employees(chunk).await?;
            for employee in chunk {
                match resolved.get(&employee.mobile_number) {
                    Some(uuid) => updates.push(EmployeeIdUpdate {
                        id: employee.id,
                        campaign_number: employee.campaign_number.clone(),
                        user_service_uuid: uuid.clone(),
                        last_modified_by: user.to_string(),
                        last_modified_time: epoch_millis(),
                    }),
                    None => warn!(
                        campaign_number,
                        mobile_number = %employee.mobile_number,
                        "directory did not resolve employee"
                    ),
                }
            }
        }

        let resolved = updates.len();
        self.dispatcher
            .dispatch(
                &self.config.topics.update_employees,
                "campaignEmployees",
                &updates,
            )
            .await?;

        self.confirm(campaign_number, "employee resolution", || {
            let store = self.store.clone();
            let campaign = campaign_number.to_string();
            async move { Ok(store.count_unresolved_employees(&campaign).await? == 0) }
        })
        .await?;

        Ok(resolved)
    }

    /// Resolve downstream facility ids for all active facilities missing
    /// one.
    pub async fn resolve_facilities(
        &self,
        campaign_number: &str,
        user: &str,
    ) -> Result<usize, AppError> {
        let facilities = self.store.facilities(campaign_number).await?;
        let unresolved: Vec<_> = facilities
            .into_iter()
            .filter(|f| f.is_active && f.facility_id.is_none())
            .collect();

        if unresolved.is_empty() {
            return Ok(0);
        }
        info!(
            campaign_number,
            unresolved = unresolved.len(),
            "resolving facility ids"
        );

        let mut updates: Vec<FacilityIdUpdate> = Vec::new();
        for chunk in unresolved.chunks(self.config.chunk_size) {
            let resolved = self.directory.create_facilities(chunk).await?;
            for facility in chunk {
                match resolved.get(&facility.name) {
                    Some(facility_id) => updates.push(FacilityIdUpdate {
                        id: facility.id,
                        campaign_number: facility.campaign_number.clone(),
                        facility_id: facility_id.clone(),
                        last_modified_by: user.to_string(),
                        last_modified_time: epoch_millis(),
                    }),
                    None => warn!(
                        campaign_number,
                        name = %facility.name,
                        "directory did not resolve facility"
                    ),
                }
            }
        }

        let resolved = updates.len();
        self.dispatcher
            .dispatch(
                &self.config.topics.update_facilities,
                "campaignFacilities",
                &updates,
            )
            .await?;

        self.confirm(campaign_number, "facility resolution", || {
            let store = self.store.clone();
            let campaign = campaign_number.to_string();
            async move { Ok(store.count_unresolved_facilities(&campaign).await? == 0) }
        })
        .await?;

        Ok(resolved)
    }

    async fn confirm<F, Fut>(
        &self,
        campaign_number: &str,
        operation: &str,
        predicate: F,
    ) -> Result<(), AppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool, AppError>>,
    {
        let poller = Poller::new(
            self.config.resolution_interval,
            self.config.resolution_max_attempts,
        );
        let attempt = poller.await_completion(operation, predicate).await?;
        info!(campaign_number, operation, attempt, "resolution confirmed");
        Ok(())
    }
}
