//! Acknowledgement tokens and the registrations they resolve through.
//!
//! Every producer registers its adapter and validated configuration once at
//! startup and receives an [`AckRef`] token. Messages carry the token, so the
//! downstream framework can report batch outcomes without holding a reference
//! to the producer itself. Registrations are append-only and never evicted:
//! a token stays resolvable for as long as any in-flight message may
//! reference it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::client::QueueClient;
use crate::config::ClientConfig;
use crate::error::AckError;
use crate::message::Message;

/// Opaque token resolving to the adapter and configuration that produced a
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckRef(Uuid);

impl AckRef {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AckRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered producer: the adapter plus the configuration it was
/// initialized with.
#[derive(Clone)]
struct Registration {
    client: Arc<dyn QueueClient>,
    config: ClientConfig,
}

static REGISTRY: OnceLock<RwLock<HashMap<AckRef, Registration>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<AckRef, Registration>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers an adapter/config pair and returns the token messages will
/// carry.
pub(crate) fn register(client: Arc<dyn QueueClient>, config: ClientConfig) -> AckRef {
    let ack_ref = AckRef::new();
    registry()
        .write()
        .expect("ack registry lock poisoned")
        .insert(ack_ref, Registration { client, config });
    debug!(%ack_ref, "registered producer for acknowledgement");
    ack_ref
}

fn resolve(ack_ref: AckRef) -> Option<Registration> {
    registry()
        .read()
        .expect("ack registry lock poisoned")
        .get(&ack_ref)
        .cloned()
}

/// Reports a batch outcome for messages produced under `ack_ref`.
///
/// Every item in `successful` is removed from the working list; items in
/// `failed` are left untouched for manual recovery (there is no requeue).
/// Transport problems are absorbed and logged by the adapter; the only error
/// surfaced here is a token that was never registered.
pub async fn ack(
    ack_ref: AckRef,
    successful: Vec<Message>,
    failed: Vec<Message>,
) -> Result<(), AckError> {
    let registration = resolve(ack_ref).ok_or(AckError::UnresolvedAckRef(ack_ref))?;
    registration
        .client
        .ack(&registration.config, successful, failed)
        .await;
    Ok(())
}
