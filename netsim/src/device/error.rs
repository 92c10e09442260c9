//! Errors local to a device actor.

use thiserror::Error;

use super::state::OperationalState;

/// Error raised while a device handles a control request or a message.
///
/// Message-handling errors stay inside the actor: they are logged and the
/// loop continues. Control errors are returned to the caller of the
/// [`DeviceHandle`](super::DeviceHandle) method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Requested operation.
        operation: &'static str,
        /// State at the time of the request.
        state: OperationalState,
    },

    /// The device has no interface with this name.
    #[error("unknown interface '{0}'")]
    UnknownInterface(String),

    /// A message addressed to another device reached this one.
    #[error("message for '{target}' delivered to '{device}'")]
    Misrouted {
        /// Device that received it.
        device: String,
        /// Intended target.
        target: String,
    },

    /// A configured or announced network string could not be parsed.
    #[error("invalid network '{network}': {reason}")]
    InvalidNetwork {
        /// Offending text.
        network: String,
        /// Parser message.
        reason: String,
    },

    /// The device's inbound queue is already owned by another actor.
    #[error("inbound queue of '{0}' already taken")]
    InboxTaken(String),

    /// The actor task is no longer running.
    #[error("device actor stopped")]
    Stopped,
}

/// A type alias for `Result<T, DeviceError>`.
pub type DeviceResult<T> = Result<T, DeviceError>;
