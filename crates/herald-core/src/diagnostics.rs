//! Structured diagnostic records emitted by the registry and dispatcher.
//!
//! Every record goes through a [`DiagnosticSink`]. The default sink,
//! [`TracingSink`], forwards records to `tracing` under the
//! `herald::dispatch` target: flow at DEBUG, failures at ERROR.
//!
//! Emission is best-effort. A sink that panics is caught and ignored so that
//! diagnostics can never interfere with delivery.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::capability::HandlerKind;
use crate::error::DispatchError;
use crate::handler::HandlerType;
use crate::notification::NotificationType;

/// How a registration was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Instance,
    Factory,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance => f.write_str("instance"),
            Self::Factory => f.write_str("factory"),
        }
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// A dispatch operation started.
    Dispatching { notification: NotificationType },
    /// All synchronous handlers ran and all asynchronous units were launched.
    Dispatched {
        notification: NotificationType,
        launched: usize,
    },
    /// Every asynchronous unit of a dispatch finished.
    AsyncHandlersCompleted { notification: NotificationType },
    InvokingHandler {
        notification: NotificationType,
        handler: HandlerType,
        kind: HandlerKind,
    },
    HandlerInvoked {
        notification: NotificationType,
        handler: HandlerType,
        kind: HandlerKind,
    },
    AsyncHandlerFinished {
        notification: NotificationType,
        handler: HandlerType,
    },
    Registered {
        handler: HandlerType,
        notification: NotificationType,
        kind: HandlerKind,
        provenance: Provenance,
    },
    Unregistered {
        handler: HandlerType,
        notification: NotificationType,
        kind: HandlerKind,
    },
    /// An instance was dropped without being unregistered and was skipped.
    StaleInstance {
        handler: HandlerType,
        notification: NotificationType,
    },
    Failed(DispatchError),
    /// Asynchronous units could not be launched because no runtime is available.
    NoRuntime {
        notification: NotificationType,
        skipped: usize,
    },
}

/// Receiver of diagnostic records.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::Dispatching { notification } => {
                debug!(target: "herald::dispatch", notification = %notification, "Dispatching");
            }
            Diagnostic::Dispatched {
                notification,
                launched,
            } => {
                debug!(
                    target: "herald::dispatch",
                    notification = %notification,
                    launched,
                    "Dispatched"
                );
            }
            Diagnostic::AsyncHandlersCompleted { notification } => {
                debug!(
                    target: "herald::dispatch",
                    notification = %notification,
                    "Async handlers completed"
                );
            }
            Diagnostic::InvokingHandler {
                notification,
                handler,
                kind,
            } => {
                trace!(
                    target: "herald::dispatch",
                    notification = %notification,
                    handler = %handler,
                    kind = %kind,
                    "Invoking handler"
                );
            }
            Diagnostic::HandlerInvoked {
                notification,
                handler,
                kind,
            } => {
                debug!(
                    target: "herald::dispatch",
                    notification = %notification,
                    handler = %handler,
                    kind = %kind,
                    "Handler invoked"
                );
            }
            Diagnostic::AsyncHandlerFinished {
                notification,
                handler,
            } => {
                debug!(
                    target: "herald::dispatch",
                    notification = %notification,
                    handler = %handler,
                    "Async handler finished"
                );
            }
            Diagnostic::Registered {
                handler,
                notification,
                kind,
                provenance,
            } => {
                debug!(
                    target: "herald::dispatch",
                    handler = %handler,
                    notification = %notification,
                    kind = %kind,
                    provenance = %provenance,
                    "Registered handler"
                );
            }
            Diagnostic::Unregistered {
                handler,
                notification,
                kind,
            } => {
                debug!(
                    target: "herald::dispatch",
                    handler = %handler,
                    notification = %notification,
                    kind = %kind,
                    "Unregistered handler"
                );
            }
            Diagnostic::StaleInstance {
                handler,
                notification,
            } => {
                trace!(
                    target: "herald::dispatch",
                    handler = %handler,
                    notification = %notification,
                    "Skipping dropped handler instance"
                );
            }
            Diagnostic::Failed(err) => {
                error!(
                    target: "herald::dispatch",
                    handler = %err.handler(),
                    error = %err,
                    "Handler failed"
                );
            }
            Diagnostic::NoRuntime {
                notification,
                skipped,
            } => {
                warn!(
                    target: "herald::dispatch",
                    notification = %notification,
                    skipped,
                    "No async runtime available, asynchronous handlers skipped"
                );
            }
        }
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl DiagnosticSink for SilentSink {
    fn record(&self, _: &Diagnostic) {}
}

/// Cheaply clonable handle to the configured sink.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticSink>,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    /// Records `diagnostic`, swallowing any panic raised by the sink.
    pub fn emit(&self, diagnostic: Diagnostic) {
        let sink = &self.sink;
        let _ = panic::catch_unwind(AssertUnwindSafe(|| sink.record(&diagnostic)));
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}
