//! Error types for the dispatch engine.
//!
//! Two layers are kept apart:
//!
//! - [`DispatchError`] - a single handler could not be (or was not
//!   successfully) invoked. These are recorded through the diagnostics sink
//!   and never reach the caller of a dispatch.
//! - [`JoinFailure`] - the join over asynchronous units itself failed. This is
//!   the only error `dispatch_and_wait` returns.

use thiserror::Error;

use crate::capability::HandlerKind;
use crate::handler::HandlerType;
use crate::notification::NotificationType;

/// A registered factory produced no handler.
#[derive(Debug, Clone, Error)]
#[error("unable to instantiate handler {handler}")]
pub struct InstantiationFailure {
    /// The handler type the factory was registered for.
    pub handler: HandlerType,
}

/// Per-handler failure recorded during a dispatch.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error(transparent)]
    InstantiationFailure(#[from] InstantiationFailure),

    #[error("{handler} was resolved for {notification}, but declares no capability for it")]
    CapabilityMismatch {
        handler: HandlerType,
        notification: NotificationType,
    },

    #[error("{handler} declares {notification}, but has no suitable {kind} entry point for it")]
    MethodShapeMismatch {
        handler: HandlerType,
        notification: NotificationType,
        kind: HandlerKind,
    },

    #[error("{handler} handles {notification} only synchronously; no awaitable entry point")]
    AsyncShapeMismatch {
        handler: HandlerType,
        notification: NotificationType,
    },

    #[error("{handler} panicked while handling {notification}: {message}")]
    HandlerPanicked {
        handler: HandlerType,
        notification: NotificationType,
        message: String,
    },

    #[error("state-change hook of {handler} panicked after handling {notification}: {message}")]
    HookPanicked {
        handler: HandlerType,
        notification: NotificationType,
        message: String,
    },
}

impl DispatchError {
    /// Returns the handler type this failure concerns.
    pub fn handler(&self) -> HandlerType {
        match self {
            Self::InstantiationFailure(failure) => failure.handler,
            Self::CapabilityMismatch { handler, .. }
            | Self::MethodShapeMismatch { handler, .. }
            | Self::AsyncShapeMismatch { handler, .. }
            | Self::HandlerPanicked { handler, .. }
            | Self::HookPanicked { handler, .. } => *handler,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// A fault reported by the join primitive for one asynchronous unit.
#[derive(Debug, Clone, Error)]
#[error("asynchronous unit for {notification} failed to join: {reason}")]
pub struct JoinFault {
    pub notification: NotificationType,
    pub reason: String,
}

/// Failure of `dispatch_and_wait` as a whole.
#[derive(Debug, Clone, Error)]
pub enum JoinFailure {
    #[error("{} asynchronous unit(s) failed to join", .0.len())]
    Aggregate(Vec<JoinFault>),

    #[error("dispatch was cancelled before all asynchronous units completed")]
    Cancelled,
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
