//! Error types for producer construction and acknowledgement dispatch.
//!
//! Runtime transport failures never appear here: the adapter absorbs them,
//! logs a warning, and degrades (an empty fetch result, a skipped release
//! chunk). Configuration errors are the only ones allowed to prevent
//! startup.

use thiserror::Error;

use crate::ack::AckRef;

/// Errors raised while validating producer options.
///
/// Construction is fail-fast: any of these prevents the producer from ever
/// starting. Messages name the offending option, its expected shape, and the
/// value received.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No Redis connection handle was supplied for the default client.
    #[error("missing option 'connection': expected an established Redis connection handle, got none")]
    MissingConnection,

    /// An option value failed validation.
    #[error("invalid option '{option}': expected {expected}, got {got}")]
    InvalidOption {
        /// Name of the offending option.
        option: &'static str,
        /// Shape the option must have.
        expected: &'static str,
        /// The value that was received.
        got: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        option: &'static str,
        expected: &'static str,
        got: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            option,
            expected,
            got: got.into(),
        }
    }
}

/// Errors raised when dispatching a batch acknowledgement.
#[derive(Debug, Error)]
pub enum AckError {
    /// The token does not resolve to a registered producer.
    #[error("ack ref {0} is not registered")]
    UnresolvedAckRef(AckRef),
}
