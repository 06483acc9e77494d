//! Pluggable queue client abstraction.
//!
//! A producer drives exactly two store-facing operations: fetch up to N items
//! and acknowledge a processed batch. Any concrete store integration
//! implements [`QueueClient`]; the default implementation is the Redis
//! reliable-queue adapter in [`redis`].

pub mod redis;

pub use self::redis::RedisQueueClient;

use async_trait::async_trait;

use crate::ack::AckRef;
use crate::config::{ClientConfig, ProducerOptions};
use crate::error::ConfigError;
use crate::message::Message;

/// Store integration contract for the producer.
///
/// Implementations are held as `Arc<dyn QueueClient>` and shared between the
/// producer task and the acknowledgement registry, so every method takes
/// `&self` and must be safe to call concurrently.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Validates and normalizes raw options into an immutable config.
    ///
    /// Errors must name the offending option, its expected shape, and the
    /// value received; a failed `init` prevents the producer from starting.
    fn init(&self, options: &ProducerOptions) -> Result<ClientConfig, ConfigError>;

    /// Fetches up to `max_items` messages from the store.
    ///
    /// May block on network I/O up to a bounded timeout. Returns fewer or
    /// zero messages when the store holds fewer items or is unreachable:
    /// transport failures are logged inside the adapter and degrade to an
    /// empty result, never a panic or an error. Each returned message must
    /// carry `ack_ref` in its handle.
    async fn receive_messages(
        &self,
        max_items: usize,
        ack_ref: AckRef,
        config: &ClientConfig,
    ) -> Vec<Message>;

    /// Reports a batch outcome.
    ///
    /// Every item in `successful` is removed from the working list; items in
    /// `failed` are left untouched for manual recovery. Must not block
    /// indefinitely; transport failures are logged, not returned.
    async fn ack(&self, config: &ClientConfig, successful: Vec<Message>, failed: Vec<Message>);
}
