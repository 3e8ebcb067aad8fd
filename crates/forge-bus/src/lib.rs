//! NATS message bus for the campaign reconciliation engine.
//!
//! Implements the engine's [`MessageBus`] trait over a NATS connection.
//! Publishing is fire-and-forget: `Ok` means the client accepted the
//! message, not that a persister consumer has applied it. Topic names map
//! directly to NATS subjects, optionally under a configured prefix.
//!
//! [`MessageBus`]: forge_core::traits::MessageBus

use tracing::debug;

use forge_core::error::AppError;
use forge_core::traits::MessageBus;

/// NATS-backed message bus.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    subject_prefix: Option<String>,
}

impl NatsBus {
    /// Connect to a NATS server.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| AppError::BusError(format!("failed to connect to NATS: {e}")))?;
        Ok(Self {
            client,
            subject_prefix: None,
        })
    }

    /// Prefix all subjects, e.g. `campaign-forge` turns topic
    /// `save-campaign-employees` into subject
    /// `campaign-forge.save-campaign-employees`.
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = Some(prefix.into());
        self
    }

    /// Wrap an existing client, for callers that manage the connection.
    pub fn from_client(client: async_nats::Client) -> Self {
        Self {
            client,
            subject_prefix: None,
        }
    }

    fn subject(&self, topic: &str) -> String {
        subject_for(self.subject_prefix.as_deref(), topic)
    }
}

fn subject_for(prefix: Option<&str>, topic: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{topic}"),
        None => topic.to_string(),
    }
}

impl MessageBus for NatsBus {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), AppError> {
        let subject = self.subject(topic);
        let bytes = serde_json::to_vec(payload)?;
        let len = bytes.len();

        self.client
            .publish(subject.clone(), bytes.into())
            .await
            .map_err(|e| AppError::BusError(format!("publish to {subject} failed: {e}")))?;
        debug!(subject, bytes = len, "published message");
        Ok(())
    }
}
