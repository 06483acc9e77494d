//! Default adapter: the Redis reliable-queue client.
//!
//! Reserving an item atomically moves it from the tail of the source list to
//! the head of the working list (`RPOPLPUSH`), so a crash between fetch and
//! acknowledgement leaves the item parked in the working list instead of
//! losing it. Acknowledging removes the item's value from the working list
//! (`LREM`). There is no automatic reclaim of abandoned working-list entries;
//! operators monitor them via [`RedisQueueClient::working_len`] and recover
//! manually.
//!
//! Both operations are pipelined: a fetch issues all of its reserve moves in
//! one round trip, and acknowledgements are chunked so no single round trip
//! carries more than [`RELEASE_CHUNK_SIZE`] removals regardless of how large
//! the downstream batch was.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::QueueClient;
use crate::ack::AckRef;
use crate::config::{ClientConfig, ProducerOptions};
use crate::error::ConfigError;
use crate::message::Message;

/// Maximum number of removals per pipelined release round trip.
pub const RELEASE_CHUNK_SIZE: usize = 20;

/// Default bound on a single pipelined round trip.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Redis adapter implementing the reliable-queue pattern.
pub struct RedisQueueClient {
    /// Connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Bound on each pipelined round trip.
    op_timeout: Duration,
}

impl RedisQueueClient {
    /// Creates a client from an existing connection manager.
    ///
    /// The connection is established and owned by the caller; the client
    /// only clones it per call, the way a shared handle is meant to be used.
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Sets the bound on each pipelined round trip.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Returns the number of items waiting in the source list.
    pub async fn source_len(&self, config: &ClientConfig) -> redis::RedisResult<usize> {
        let mut conn = self.redis.clone();
        conn.llen(&config.source_list).await
    }

    /// Returns the number of reserved-but-unacknowledged items.
    ///
    /// A steadily growing working list means consumers are crashing between
    /// fetch and acknowledgement; those entries require manual recovery.
    pub async fn working_len(&self, config: &ClientConfig) -> redis::RedisResult<usize> {
        let mut conn = self.redis.clone();
        conn.llen(&config.working_list).await
    }
}

#[async_trait]
impl QueueClient for RedisQueueClient {
    fn init(&self, options: &ProducerOptions) -> Result<ClientConfig, ConfigError> {
        // The connection handle is validated at construction; only the
        // store-agnostic options remain to be checked here.
        options.validate()
    }

    async fn receive_messages(
        &self,
        max_items: usize,
        ack_ref: AckRef,
        config: &ClientConfig,
    ) -> Vec<Message> {
        let mut conn = self.redis.clone();

        let mut pipe = redis::pipe();
        for _ in 0..max_items {
            pipe.cmd("RPOPLPUSH")
                .arg(&config.source_list)
                .arg(&config.working_list);
        }

        let reserved: Vec<Option<Vec<u8>>> = match timeout(
            self.op_timeout,
            pipe.query_async::<_, Vec<Option<Vec<u8>>>>(&mut conn),
        )
        .await
        {
            Ok(Ok(values)) => values,
            Ok(Err(e)) => {
                warn!(
                    source = %config.source_list,
                    error = %e,
                    "reserve pipeline failed; returning no messages"
                );
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    source = %config.source_list,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "reserve pipeline timed out; returning no messages"
                );
                return Vec::new();
            }
        };

        // A nil slot means the source ran dry partway through the batch.
        let messages: Vec<Message> = reserved
            .into_iter()
            .flatten()
            .map(|data| Message::new(data, ack_ref))
            .collect();

        trace!(
            source = %config.source_list,
            requested = max_items,
            reserved = messages.len(),
            "reserve pipeline complete"
        );

        messages
    }

    async fn ack(&self, config: &ClientConfig, successful: Vec<Message>, failed: Vec<Message>) {
        if !failed.is_empty() {
            debug!(
                working = %config.working_list,
                count = failed.len(),
                "leaving failed items in the working list for manual recovery"
            );
        }

        if successful.is_empty() {
            return;
        }

        let mut conn = self.redis.clone();

        for chunk in release_chunks(&successful) {
            let mut pipe = redis::pipe();
            for message in chunk {
                // Removes one occurrence of the value. If two in-flight
                // items carry identical payloads this may remove the other
                // instance's reservation; see the crate docs.
                pipe.cmd("LREM")
                    .arg(&config.working_list)
                    .arg(1)
                    .arg(&message.ack.ack_data);
            }

            match timeout(
                self.op_timeout,
                pipe.query_async::<_, Vec<i64>>(&mut conn),
            )
            .await
            {
                Ok(Ok(removed)) => {
                    trace!(
                        working = %config.working_list,
                        requested = chunk.len(),
                        removed = removed.iter().sum::<i64>(),
                        "release chunk complete"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        working = %config.working_list,
                        count = chunk.len(),
                        error = %e,
                        "release chunk failed; affected items may remain in the working list"
                    );
                }
                Err(_) => {
                    warn!(
                        working = %config.working_list,
                        count = chunk.len(),
                        timeout_ms = self.op_timeout.as_millis() as u64,
                        "release chunk timed out; affected items may remain in the working list"
                    );
                }
            }
        }
    }
}

/// Splits acknowledged messages into consecutive release round trips.
fn release_chunks(successful: &[Message]) -> impl Iterator<Item = &[Message]> {
    successful.chunks(RELEASE_CHUNK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| Message::new(format!("item-{i}").into_bytes(), AckRef::new()))
            .collect()
    }

    #[test]
    fn test_release_chunking_at_bound() {
        let batch = messages(20);
        let chunks: Vec<_> = release_chunks(&batch).collect();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 20);
    }

    #[test]
    fn test_release_chunking_above_bound() {
        let batch = messages(25);
        let chunks: Vec<_> = release_chunks(&batch).collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks[1].len(), 5);
    }

    #[test]
    fn test_release_chunks_preserve_order() {
        let batch = messages(45);
        let flattened: Vec<&Message> = release_chunks(&batch).flatten().collect();

        assert_eq!(flattened.len(), 45);
        for (i, message) in flattened.iter().enumerate() {
            assert_eq!(message.data, format!("item-{i}").into_bytes());
        }
    }
}
