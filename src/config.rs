//! Producer configuration: raw options and their validated form.
//!
//! Options are validated once, at producer construction, and frozen into a
//! [`ClientConfig`] that is threaded through every adapter call. Validation
//! is fail-fast: a bad option prevents the producer from ever starting.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use serde_json::Value;

use crate::client::QueueClient;
use crate::error::ConfigError;

/// Default maximum number of items requested per fetch.
pub const DEFAULT_MAX_BATCH: usize = 10;

/// Hard upper bound on items per fetch, matching the practical size limit of
/// a single pipelined round trip against the backing store.
pub const MAX_BATCH_LIMIT: usize = 20;

/// Default backoff interval applied after an empty fetch.
pub const DEFAULT_RECEIVE_INTERVAL: Duration = Duration::from_millis(5000);

/// Raw options for building a producer.
///
/// Required values are taken by [`ProducerOptions::new`]; everything else has
/// a default and a `with_*` setter.
#[derive(Clone, Default)]
pub struct ProducerOptions {
    /// Name of the list items are reserved from.
    pub source_list: String,
    /// Name of the list holding reserved-but-unacknowledged items.
    pub working_list: String,
    /// Pre-established Redis connection, managed by the caller. Required
    /// unless a custom client is injected.
    pub connection: Option<ConnectionManager>,
    /// Maximum items per fetch, 1 to [`MAX_BATCH_LIMIT`].
    pub max_batch: Option<usize>,
    /// Backoff interval applied after an empty fetch.
    pub receive_interval: Option<Duration>,
    /// Adapter implementation. Defaults to the Redis reliable-queue client.
    pub client: Option<Arc<dyn QueueClient>>,
    /// Adapter-specific extension options, passed through verbatim.
    pub extra: HashMap<String, Value>,
}

impl ProducerOptions {
    /// Creates options for the given source and working lists.
    pub fn new(source_list: impl Into<String>, working_list: impl Into<String>) -> Self {
        Self {
            source_list: source_list.into(),
            working_list: working_list.into(),
            ..Default::default()
        }
    }

    /// Sets the Redis connection handle used by the default client.
    pub fn with_connection(mut self, connection: ConnectionManager) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Sets the maximum number of items per fetch.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = Some(max_batch);
        self
    }

    /// Sets the backoff interval applied after an empty fetch.
    pub fn with_receive_interval(mut self, interval: Duration) -> Self {
        self.receive_interval = Some(interval);
        self
    }

    /// Injects a custom adapter in place of the default Redis client.
    pub fn with_client(mut self, client: Arc<dyn QueueClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Adds an adapter-specific extension option.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Validates the store-agnostic options and freezes them into a
    /// [`ClientConfig`].
    ///
    /// Adapters call this from their `init`; the default client checks its
    /// connection handle before this runs. Checks, in order: source list
    /// non-empty, working list non-empty, `max_batch` within bounds when
    /// supplied.
    pub fn validate(&self) -> Result<ClientConfig, ConfigError> {
        if self.source_list.is_empty() {
            return Err(ConfigError::invalid(
                "source_list",
                "a non-empty list name",
                "\"\"",
            ));
        }

        if self.working_list.is_empty() {
            return Err(ConfigError::invalid(
                "working_list",
                "a non-empty list name",
                "\"\"",
            ));
        }

        let max_batch = match self.max_batch {
            Some(n) if n < 1 || n > MAX_BATCH_LIMIT => {
                return Err(ConfigError::invalid(
                    "max_batch",
                    "an integer between 1 and 20",
                    n.to_string(),
                ));
            }
            Some(n) => n,
            None => DEFAULT_MAX_BATCH,
        };

        Ok(ClientConfig {
            source_list: self.source_list.clone(),
            working_list: self.working_list.clone(),
            max_batch,
            receive_interval: self.receive_interval.unwrap_or(DEFAULT_RECEIVE_INTERVAL),
            extra: self.extra.clone(),
        })
    }
}

impl fmt::Debug for ProducerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerOptions")
            .field("source_list", &self.source_list)
            .field("working_list", &self.working_list)
            .field("connection", &self.connection.is_some())
            .field("max_batch", &self.max_batch)
            .field("receive_interval", &self.receive_interval)
            .field("client", &self.client.is_some())
            .field("extra", &self.extra)
            .finish()
    }
}

/// Validated producer configuration, immutable after initialization.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name of the list items are reserved from.
    pub source_list: String,
    /// Name of the list holding reserved-but-unacknowledged items.
    pub working_list: String,
    /// Maximum items per fetch.
    pub max_batch: usize,
    /// Backoff interval applied after an empty fetch.
    pub receive_interval: Duration,
    /// Adapter-specific extension options.
    pub extra: HashMap<String, Value>,
}
