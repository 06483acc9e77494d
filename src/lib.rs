//! relq: demand-driven producer for Redis-backed reliable queues.
//!
//! Work items live in a Redis list. Fetching an item atomically moves it to
//! a working list (`RPOPLPUSH`), and an explicit acknowledgement removes it
//! once the downstream pipeline has processed it (`LREM`) — the reliable
//! queue pattern, approximating at-least-once delivery on a store with no
//! native broker acknowledgements.
//!
//! # Architecture
//!
//! ```text
//!   downstream demand          ┌───────────────┐
//!  ───────────────────────────▶│   Producer    │
//!                              │ (demand loop) │
//!                              └───────┬───────┘
//!                                      │ receive_messages(min(demand, max_batch))
//!                              ┌───────▼───────┐
//!                              │  QueueClient  │  RPOPLPUSH source → working
//!                              └───────┬───────┘
//!                                      │ messages + ack handles
//!   batch outcome   ┌────────┐ ◀───────┘
//!  ────────────────▶│  ack() │  LREM working (chunks of ≤ 20)
//!                   └────────┘
//! ```
//!
//! The producer is a single-task state machine driven by two events: demand
//! signals and a retry timer. An empty fetch backs off for the configured
//! receive interval; a partial fetch with demand remaining retries on the
//! next loop turn; satisfied demand idles until downstream asks again.
//!
//! # Example
//!
//! ```rust,ignore
//! use redis::aio::ConnectionManager;
//! use relq::{ack, Producer, ProducerOptions};
//! use tokio::sync::mpsc;
//!
//! let client = redis::Client::open("redis://localhost:6379")?;
//! let connection = ConnectionManager::new(client).await?;
//!
//! let (output_tx, mut output_rx) = mpsc::channel(64);
//! let producer = Producer::spawn(
//!     ProducerOptions::new("orders", "orders:working").with_connection(connection),
//!     output_tx,
//! )?;
//!
//! producer.demand(10);
//! while let Some(message) = output_rx.recv().await {
//!     // ... process, collect into a batch ...
//!     ack(message.ack_ref(), vec![message], Vec::new()).await?;
//! }
//! ```
//!
//! # Reliability notes
//!
//! - A crash between fetch and acknowledgement leaves items parked in the
//!   working list; there is no automatic reclaim, so operators monitor
//!   [`RedisQueueClient::working_len`](client::RedisQueueClient::working_len)
//!   and recover manually.
//! - Acknowledgement removes one occurrence of the item's value. Two
//!   in-flight items with identical payloads can therefore release each
//!   other's reservation; give items distinguishing content if that matters.
//! - Transport failures never crash a producer: fetches degrade to an empty
//!   result and back off, acknowledgement chunks log a warning and move on.

pub mod ack;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod producer;

pub use ack::{ack, AckRef};
pub use client::{QueueClient, RedisQueueClient};
pub use config::{ClientConfig, ProducerOptions};
pub use error::{AckError, ConfigError};
pub use message::{AckHandle, Message};
pub use producer::{Producer, ProducerHandle, ProducerStats};
