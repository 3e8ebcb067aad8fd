//! Engine configuration.

use std::time::Duration;

use crate::error::AppError;

/// Bus topic names used by the batch dispatcher.
///
/// Defaults follow the persister topic naming convention; deployments
/// override them when the consumer side is wired differently.
#[derive(Debug, Clone)]
pub struct BusTopics {
    pub save_employees: String,
    pub update_employees: String,
    pub save_facilities: String,
    pub update_facilities: String,
    pub save_mappings: String,
    pub update_mappings: String,
    pub delete_mappings: String,
    pub update_process_status: String,
    pub campaign_failure: String,
}

impl Default for BusTopics {
    fn default() -> Self {
        Self {
            save_employees: "save-campaign-employees".to_string(),
            update_employees: "update-campaign-employees".to_string(),
            save_facilities: "save-campaign-facilities".to_string(),
            update_facilities: "update-campaign-facilities".to_string(),
            save_mappings: "save-campaign-mappings".to_string(),
            update_mappings: "update-campaign-mappings".to_string(),
            delete_mappings: "delete-campaign-mappings".to_string(),
            update_process_status: "update-campaign-process".to_string(),
            campaign_failure: "campaign-failure".to_string(),
        }
    }
}

/// Tuning knobs for reconciliation, dispatch, and confirmation polling.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records per bus submission and per `ANY($n)` key list.
    pub chunk_size: usize,
    /// Interval between mapping confirmation checks.
    pub confirm_interval: Duration,
    /// Attempt budget for mapping confirmation.
    pub confirm_max_attempts: u32,
    /// Interval between entity resolution checks.
    pub resolution_interval: Duration,
    /// Attempt budget for entity resolution checks.
    pub resolution_max_attempts: u32,
    /// Bus topics.
    pub topics: BusTopics,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            confirm_interval: Duration::from_secs(20),
            confirm_max_attempts: 75,
            resolution_interval: Duration::from_secs(2),
            resolution_max_attempts: 15,
            topics: BusTopics::default(),
        }
    }
}

impl EngineConfig {
    /// Set the dispatch chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the mapping confirmation interval and attempt budget.
    pub fn with_confirmation(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.confirm_interval = interval;
        self.confirm_max_attempts = max_attempts;
        self
    }

    /// Set the entity resolution interval and attempt budget.
    pub fn with_resolution(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.resolution_interval = interval;
        self.resolution_max_attempts = max_attempts;
        self
    }

    /// Set the bus topics.
    pub fn with_topics(mut self, topics: BusTopics) -> Self {
        self.topics = topics;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 {
            return Err(AppError::ConfigError(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.confirm_max_attempts == 0 || self.resolution_max_attempts == 0 {
            return Err(AppError::ConfigError(
                "attempt budgets must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
