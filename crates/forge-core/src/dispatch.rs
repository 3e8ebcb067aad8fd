//! Batch dispatcher.
//!
//! Splits record collections into fixed-size chunks and publishes one bus
//! message per chunk, sequentially and in input order. Persistence is
//! asynchronous: a publish returning `Ok` only means the bus accepted the
//! submission, never that a consumer has applied it.
//!
//! A failed publish aborts the remaining chunks; chunks already published
//! stay published, so consumers must tolerate replays.

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::error::AppError;
use crate::traits::MessageBus;

/// Publishes record batches to the message bus in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct BatchDispatcher<B: MessageBus> {
    bus: B,
    chunk_size: usize,
}

impl<B: MessageBus> BatchDispatcher<B> {
    /// Create a dispatcher with the given chunk size. A zero chunk size
    /// is clamped to 1.
    pub fn new(bus: B, chunk_size: usize) -> Self {
        Self {
            bus,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Publish `records` to `topic`, one message per chunk.
    ///
    /// Each message wraps its chunk in an object under `envelope_key`,
    /// e.g. `{"campaignEmployees": [...]}`. Returns the number of
    /// submissions made. Empty input publishes nothing.
    pub async fn dispatch<T: Serialize>(
        &self,
        topic: &str,
        envelope_key: &str,
        records: &[T],
    ) -> Result<usize, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut submissions = 0;
        for chunk in records.chunks(self.chunk_size) {
            let payload = json!({ envelope_key: chunk });
            self.bus.publish(topic, &payload).await?;
            submissions += 1;
            debug!(
                topic,
                chunk_len = chunk.len(),
                submission = submissions,
                "dispatched chunk"
            );
        }
        Ok(submissions)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
