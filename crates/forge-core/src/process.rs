//! Process and failure tracking.
//!
//! Each campaign phase (employee creation, facility creation, project
//! creation, mapping) has a per-campaign status row. Writes are
//! last-write-wins and flow through the bus like every other mutation;
//! reads are existence predicates used as idempotency guards.

use serde_json::json;
use tracing::{error, info};

use crate::config::BusTopics;
use crate::error::AppError;
use crate::models::{epoch_millis, PhaseStatus, ProcessName, ProcessStatus};
use crate::traits::{EntityStore, MessageBus};

/// Tracks phase progress and escalates campaign-level failures.
#[derive(Debug, Clone)]
pub struct ProcessTracker<S: EntityStore, B: MessageBus> {
    store: S,
    bus: B,
    topics: BusTopics,
}

impl<S: EntityStore, B: MessageBus> ProcessTracker<S, B> {
    pub fn new(store: S, bus: B, topics: BusTopics) -> Self {
        Self { store, bus, topics }
    }

    /// Record the status of a phase, creating the row if the campaign has
    /// never reported this phase before. Repeated calls with the same
    /// status are harmless.
    pub async fn mark_process_status(
        &self,
        campaign_number: &str,
        process: ProcessName,
        status: PhaseStatus,
        error_message: Option<&str>,
    ) -> Result<(), AppError> {
        let existing = self.store.process_statuses(campaign_number).await?;
        let mut row = existing
            .into_iter()
            .find(|p| p.process_name == process)
            .unwrap_or_else(|| ProcessStatus::new(campaign_number, process));

        row.status = status;
        row.error_message = error_message.map(str::to_string);
        row.last_modified_time = epoch_millis();

        info!(
            campaign_number,
            process = %process,
            status = %status,
            "marking process status"
        );
        self.bus
            .publish(
                &self.topics.update_process_status,
                &json!({ "campaignProcesses": [row] }),
            )
            .await
    }

    /// True when the phase has already completed for this campaign.
    pub async fn check_if_process_is_completed(
        &self,
        campaign_number: &str,
        process: ProcessName,
    ) -> Result<bool, AppError> {
        self.store
            .has_process_status(campaign_number, process, PhaseStatus::Completed)
            .await
    }

    /// True when the phase has been recorded as failed for this campaign.
    pub async fn check_if_process_is_failed(
        &self,
        campaign_number: &str,
        process: ProcessName,
    ) -> Result<bool, AppError> {
        self.store
            .has_process_status(campaign_number, process, PhaseStatus::Failed)
            .await
    }

    /// Mark the phase failed and publish a campaign-level failure
    /// notification. Called before the error is propagated to the caller.
    pub async fn fail_campaign(
        &self,
        campaign_number: &str,
        process: ProcessName,
        message: &str,
    ) -> Result<(), AppError> {
        error!(
            campaign_number,
            process = %process,
            message,
            "campaign phase failed"
        );
        self.mark_process_status(campaign_number, process, PhaseStatus::Failed, Some(message))
            .await?;
        self.bus
            .publish(
                &self.topics.campaign_failure,
                &json!({
                    "campaignNumber": campaign_number,
                    "process": process,
                    "error": message,
                }),
            )
            .await
    }
}
