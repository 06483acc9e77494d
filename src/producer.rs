//! Demand-driven producer: the scheduler that matches downstream demand
//! against the queue.
//!
//! Each producer is a single-task state machine driven by exactly two event
//! kinds:
//!
//! - a demand-increase signal from downstream, and
//! - a retry-timer firing.
//!
//! All state mutation happens sequentially inside the actor task. A fetch is
//! attempted only while no retry timer is pending, and timers are scheduled
//! only from within the fetch attempt itself, so at most one timer is ever
//! outstanding per producer. No fetch is issued while outstanding demand is
//! zero, so the producer never buffers more items than downstream asked for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::ack::{self, AckRef};
use crate::client::{QueueClient, RedisQueueClient};
use crate::config::{ClientConfig, ProducerOptions};
use crate::error::ConfigError;
use crate::message::Message;

/// A running producer's state machine.
///
/// Built and launched by [`Producer::spawn`]; owned by its actor task for
/// the rest of its life.
pub struct Producer {
    /// Outstanding downstream demand, in messages.
    demand: usize,
    /// Deadline of the pending retry timer, if one is scheduled.
    deadline: Option<Instant>,
    /// Adapter used for fetches.
    client: Arc<dyn QueueClient>,
    /// Validated configuration threaded through every adapter call.
    config: ClientConfig,
    /// Token under which this producer's messages acknowledge.
    ack_ref: AckRef,
    /// Channel to the downstream processing pipeline.
    output: mpsc::Sender<Message>,
    /// Shared counters, snapshotted through the handle.
    stats: Arc<SharedProducerStats>,
}

impl Producer {
    /// Validates `options`, registers the producer for acknowledgement, and
    /// spawns its actor task.
    ///
    /// Must be called from within a tokio runtime. Fetched messages are sent
    /// to `output` in the order they were reserved; the producer stops when
    /// the receiving side is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the adapter rejects the options; the
    /// producer never starts in that case.
    pub fn spawn(
        options: ProducerOptions,
        output: mpsc::Sender<Message>,
    ) -> Result<ProducerHandle, ConfigError> {
        let client: Arc<dyn QueueClient> = match options.client.clone() {
            Some(client) => client,
            None => {
                let connection = options
                    .connection
                    .clone()
                    .ok_or(ConfigError::MissingConnection)?;
                Arc::new(RedisQueueClient::new(connection))
            }
        };

        let config = client.init(&options)?;
        let ack_ref = ack::register(Arc::clone(&client), config.clone());
        let stats = Arc::new(SharedProducerStats::default());

        let producer = Producer {
            demand: 0,
            deadline: None,
            client,
            config: config.clone(),
            ack_ref,
            output,
            stats: Arc::clone(&stats),
        };

        let (demand_tx, demand_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(producer.run(demand_rx));

        info!(
            %ack_ref,
            source = %config.source_list,
            working = %config.working_list,
            max_batch = config.max_batch,
            "producer started"
        );

        Ok(ProducerHandle {
            demand_tx,
            ack_ref,
            stats,
            task,
        })
    }

    /// Main event loop: demand signals and timer firings, nothing else.
    async fn run(mut self, mut demand_rx: mpsc::UnboundedReceiver<usize>) {
        loop {
            tokio::select! {
                signal = demand_rx.recv() => match signal {
                    Some(n) => {
                        if !self.on_demand(n).await {
                            break;
                        }
                    }
                    None => {
                        debug!(ack_ref = %self.ack_ref, "demand channel closed; producer stopping");
                        break;
                    }
                },
                _ = Self::retry_timer(self.deadline), if self.deadline.is_some() => {
                    if !self.on_timer_fire().await {
                        break;
                    }
                }
            }
        }

        debug!(ack_ref = %self.ack_ref, demand = self.demand, "producer stopped");
    }

    async fn retry_timer(deadline: Option<Instant>) {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            // Disabled by the select precondition; never polled.
            None => std::future::pending::<()>().await,
        }
    }

    /// Handles a demand-increase signal.
    ///
    /// Returns `false` once downstream has gone away and the actor should
    /// stop.
    async fn on_demand(&mut self, n: usize) -> bool {
        self.demand += n;
        self.stats.demand_received.fetch_add(n as u64, Ordering::SeqCst);
        trace!(ack_ref = %self.ack_ref, added = n, demand = self.demand, "demand increased");

        if self.deadline.is_some() {
            // A retry is already pending; it will see the new demand.
            return true;
        }

        self.attempt_fetch().await
    }

    /// Handles the retry timer firing.
    async fn on_timer_fire(&mut self) -> bool {
        self.deadline = None;

        if self.demand == 0 {
            return true;
        }

        self.attempt_fetch().await
    }

    /// Fetches `min(demand, max_batch)` messages and decides what happens
    /// next: back off (store empty), go idle (demand satisfied), or retry
    /// immediately (demand remains).
    async fn attempt_fetch(&mut self) -> bool {
        let batch = self.demand.min(self.config.max_batch);
        if batch == 0 {
            return true;
        }

        let messages = self
            .client
            .receive_messages(batch, self.ack_ref, &self.config)
            .await;
        let received = messages.len();

        self.stats.fetches.fetch_add(1, Ordering::SeqCst);
        if received == 0 {
            self.stats.empty_fetches.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats
                .messages_emitted
                .fetch_add(received as u64, Ordering::SeqCst);
        }

        for message in messages {
            if self.output.send(message).await.is_err() {
                debug!(ack_ref = %self.ack_ref, "output channel closed; producer stopping");
                return false;
            }
        }

        self.demand = self.demand.saturating_sub(received);

        if received == 0 {
            // Store is likely empty or unreachable; back off before retrying.
            self.schedule_retry(self.config.receive_interval);
        } else if self.demand > 0 {
            // Drain the remaining demand on the next loop turn rather than
            // recursing here.
            self.schedule_retry(Duration::ZERO);
        }

        true
    }

    fn schedule_retry(&mut self, delay: Duration) {
        debug_assert!(self.deadline.is_none(), "retry timer already pending");
        self.deadline = Some(Instant::now() + delay);
        self.stats.retries_scheduled.fetch_add(1, Ordering::SeqCst);
        trace!(
            ack_ref = %self.ack_ref,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
    }
}

/// Handle to a running producer.
#[derive(Debug)]
pub struct ProducerHandle {
    demand_tx: mpsc::UnboundedSender<usize>,
    ack_ref: AckRef,
    stats: Arc<SharedProducerStats>,
    task: JoinHandle<()>,
}

impl ProducerHandle {
    /// Signals downstream capacity for `n` more messages.
    ///
    /// Demand accumulates until satisfied by one or more fetches. Signalling
    /// zero is a no-op.
    pub fn demand(&self, n: usize) {
        if self.demand_tx.send(n).is_err() {
            warn!(ack_ref = %self.ack_ref, "producer task stopped; demand signal dropped");
        }
    }

    /// The token this producer's messages acknowledge under.
    pub fn ack_ref(&self) -> AckRef {
        self.ack_ref
    }

    /// Returns a snapshot of the producer's counters.
    pub fn stats(&self) -> ProducerStats {
        self.stats.snapshot()
    }

    /// Stops the producer and waits for its task to finish.
    ///
    /// Outstanding demand is discarded; reserved-but-unacknowledged items
    /// stay in the working list.
    pub async fn shutdown(self) {
        drop(self.demand_tx);
        if let Err(e) = self.task.await {
            error!(ack_ref = %self.ack_ref, error = %e, "producer task panicked during shutdown");
        }
    }
}

/// Shared counters updated by the actor task.
#[derive(Debug, Default)]
struct SharedProducerStats {
    demand_received: AtomicU64,
    fetches: AtomicU64,
    empty_fetches: AtomicU64,
    messages_emitted: AtomicU64,
    retries_scheduled: AtomicU64,
}

impl SharedProducerStats {
    fn snapshot(&self) -> ProducerStats {
        ProducerStats {
            demand_received: self.demand_received.load(Ordering::SeqCst),
            fetches: self.fetches.load(Ordering::SeqCst),
            empty_fetches: self.empty_fetches.load(Ordering::SeqCst),
            messages_emitted: self.messages_emitted.load(Ordering::SeqCst),
            retries_scheduled: self.retries_scheduled.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time view of a producer's activity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProducerStats {
    /// Total demand signalled by downstream.
    pub demand_received: u64,
    /// Fetch round trips issued.
    pub fetches: u64,
    /// Fetches that returned nothing.
    pub empty_fetches: u64,
    /// Messages forwarded downstream.
    pub messages_emitted: u64,
    /// Retry timers scheduled.
    pub retries_scheduled: u64,
}

impl ProducerStats {
    /// Fraction of fetches that came back empty.
    pub fn empty_fetch_rate(&self) -> f64 {
        if self.fetches == 0 {
            return 0.0;
        }
        self.empty_fetches as f64 / self.fetches as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::RecordingClient;

    fn items(count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| format!("item-{i}").into_bytes())
            .collect()
    }

    /// Builds an unlaunched actor around a scripted client, plus the
    /// downstream receiver.
    fn test_producer(
        client: Arc<RecordingClient>,
        max_batch: usize,
    ) -> (Producer, mpsc::Receiver<Message>) {
        let config = ProducerOptions::new("jobs", "jobs:working")
            .with_max_batch(max_batch)
            .validate()
            .expect("test config should validate");
        let (output, output_rx) = mpsc::channel(64);

        let producer = Producer {
            demand: 0,
            deadline: None,
            client,
            config,
            ack_ref: AckRef::new(),
            output,
            stats: Arc::new(SharedProducerStats::default()),
        };

        (producer, output_rx)
    }

    fn fetch_sizes(client: &RecordingClient) -> Vec<usize> {
        client.fetch_sizes.lock().expect("lock poisoned").clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_idle_with_no_timer() {
        let client = Arc::new(RecordingClient::default());
        let (producer, _output_rx) = test_producer(Arc::clone(&client), 10);

        assert_eq!(producer.demand, 0);
        assert!(producer.deadline.is_none());
        assert!(fetch_sizes(&client).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_never_exceeds_demand_or_max_batch() {
        let client = Arc::new(RecordingClient::with_items(items(30)));
        let (mut producer, mut output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(25).await);
        assert!(producer.on_timer_fire().await);
        assert!(producer.on_timer_fire().await);

        assert_eq!(fetch_sizes(&client), vec![10, 10, 5]);
        assert_eq!(producer.demand, 0);
        assert!(producer.deadline.is_none());

        for i in 0..25 {
            let message = output_rx.recv().await.expect("message expected");
            assert_eq!(message.data, format!("item-{i}").into_bytes());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_retry_while_demand_remains() {
        let client = Arc::new(RecordingClient::with_items(items(30)));
        let (mut producer, _output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(15).await);

        // Items came back and demand remains: a zero-delay retry is pending.
        assert_eq!(producer.demand, 5);
        assert_eq!(producer.deadline, Some(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fetch_schedules_backoff() {
        let client = Arc::new(RecordingClient::default());
        let (mut producer, _output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(3).await);

        assert_eq!(fetch_sizes(&client), vec![3]);
        assert_eq!(producer.demand, 3);
        assert_eq!(
            producer.deadline,
            Some(Instant::now() + producer.config.receive_interval)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fetch_while_timer_pending() {
        let client = Arc::new(RecordingClient::default());
        let (mut producer, _output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(1).await);
        assert_eq!(fetch_sizes(&client).len(), 1);

        // Demand arriving while the backoff timer is pending accumulates
        // without a fetch; the timer drains it later.
        assert!(producer.on_demand(4).await);
        assert_eq!(fetch_sizes(&client).len(), 1);
        assert_eq!(producer.demand, 5);

        client
            .items
            .lock()
            .expect("items lock poisoned")
            .extend(items(5));
        assert!(producer.on_timer_fire().await);
        assert_eq!(fetch_sizes(&client), vec![1, 5]);
        assert_eq!(producer.demand, 0);
        assert!(producer.deadline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_pattern_then_backoff() {
        let client = Arc::new(RecordingClient::with_items(items(20)));
        let (mut producer, mut output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(10).await);
        assert!(producer.on_demand(5).await);
        assert!(producer.on_demand(5).await);
        assert_eq!(fetch_sizes(&client), vec![10, 5, 5]);
        assert!(producer.deadline.is_none());

        // Store is empty now: the next demand signal finds nothing and backs
        // off instead of retrying immediately.
        assert!(producer.on_demand(5).await);
        assert_eq!(fetch_sizes(&client), vec![10, 5, 5, 5]);
        assert_eq!(
            producer.deadline,
            Some(Instant::now() + producer.config.receive_interval)
        );

        let mut emitted = 0;
        while let Ok(message) = output_rx.try_recv() {
            assert_eq!(message.data, format!("item-{emitted}").into_bytes());
            emitted += 1;
        }
        assert_eq!(emitted, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_store_degrades_to_backoff() {
        let client = Arc::new(RecordingClient::with_items(items(5)));
        client.unreachable.store(true, std::sync::atomic::Ordering::SeqCst);
        let (mut producer, _output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(5).await);
        assert_eq!(producer.demand, 5);
        assert!(producer.deadline.is_some());

        // Store comes back; the timer firing drains the accumulated demand.
        client
            .unreachable
            .store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(producer.on_timer_fire().await);
        assert_eq!(producer.demand, 0);
        assert_eq!(fetch_sizes(&client), vec![5, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_demand_is_a_no_op() {
        let client = Arc::new(RecordingClient::with_items(items(3)));
        let (mut producer, _output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(0).await);
        assert!(fetch_sizes(&client).is_empty());
        assert!(producer.deadline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_downstream_drops() {
        let client = Arc::new(RecordingClient::with_items(items(3)));
        let (mut producer, output_rx) = test_producer(Arc::clone(&client), 10);

        drop(output_rx);
        assert!(!producer.on_demand(3).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_track_activity() {
        let client = Arc::new(RecordingClient::with_items(items(10)));
        let (mut producer, _output_rx) = test_producer(Arc::clone(&client), 10);

        assert!(producer.on_demand(10).await);
        assert!(producer.on_demand(5).await);

        let stats = producer.stats.snapshot();
        assert_eq!(stats.demand_received, 15);
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.empty_fetches, 1);
        assert_eq!(stats.messages_emitted, 10);
        assert_eq!(stats.retries_scheduled, 1);
        assert!((stats.empty_fetch_rate() - 0.5).abs() < f64::EPSILON);
    }
}
