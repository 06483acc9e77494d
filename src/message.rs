//! Messages reserved from the queue and their acknowledgement handles.

use crate::ack::AckRef;

/// Receipt needed to later remove a reserved item from the working list.
///
/// For the default Redis adapter the receipt is the item's own value: the
/// reserve move generates no separate identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    /// Token resolving to the producer registration that reserved the item.
    pub ack_ref: AckRef,
    /// Adapter-specific receipt data.
    pub ack_data: Vec<u8>,
}

/// A work item reserved from the source list.
///
/// Produced by a [`QueueClient`](crate::client::QueueClient) at fetch time
/// and considered handled once its handle passes through
/// [`ack`](crate::ack::ack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Opaque payload, exactly as stored in the source list.
    pub data: Vec<u8>,
    /// Handle used to acknowledge the item once processed.
    pub ack: AckHandle,
}

impl Message {
    /// Wraps a raw queue item, using the item's own value as the receipt.
    pub fn new(data: Vec<u8>, ack_ref: AckRef) -> Self {
        let ack = AckHandle {
            ack_ref,
            ack_data: data.clone(),
        };
        Self { data, ack }
    }

    /// Wraps a queue item whose adapter issues a receipt distinct from the
    /// payload (e.g. a broker-generated delivery tag).
    pub fn with_ack_data(data: Vec<u8>, ack_ref: AckRef, ack_data: Vec<u8>) -> Self {
        Self {
            data,
            ack: AckHandle { ack_ref, ack_data },
        }
    }

    /// Returns the acknowledgement token this message resolves through.
    pub fn ack_ref(&self) -> AckRef {
        self.ack.ack_ref
    }
}
