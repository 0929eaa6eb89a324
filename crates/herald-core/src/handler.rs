//! Handler traits for the Herald dispatcher.
//!
//! A handler type opts into notification types through two capability traits:
//!
//! - [`NotificationHandler<N>`] - synchronous, runs inline on the dispatching thread
//! - [`AsyncNotificationHandler<N>`] - asynchronous, runs as its own task
//!
//! and lists those capabilities once in [`Handler::declare`]. The declaration is
//! what the registry routes on; implementing a capability trait without
//! declaring it has no effect.
//!
//! # Example
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! struct Audit;
//!
//! impl NotificationHandler<Ping> for Audit {
//!     fn handle(&self, ping: &Ping) {
//!         println!("ping: {ping:?}");
//!     }
//! }
//!
//! #[async_trait]
//! impl AsyncNotificationHandler<dyn TimerEvent> for Audit {
//!     async fn handle_async(&self, event: Arc<dyn TimerEvent>) {
//!         tokio::time::sleep(Duration::from_millis(event.elapsed_ms())).await;
//!     }
//! }
//!
//! impl Handler for Audit {
//!     fn declare(capabilities: &mut Capabilities<Self>) {
//!         capabilities
//!             .handles::<Ping>()
//!             .handles_async::<dyn TimerEvent>();
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::capability::{Capabilities, CapabilityTable, HandlerKind};
use crate::error::DispatchResult;
use crate::notification::{NotificationType, NotificationView};

// ============================================================================
// Capability Traits
// ============================================================================

/// Synchronous capability: consumes one notification type and returns nothing.
///
/// Implementations must not block on asynchronous work; they run inline and
/// hold up the dispatch call until they return.
pub trait NotificationHandler<N: ?Sized>: Send + Sync {
    /// Handles one notification.
    fn handle(&self, notification: &N);
}

/// Asynchronous capability: consumes one notification type and returns an
/// awaitable unit of work.
#[async_trait]
pub trait AsyncNotificationHandler<N: ?Sized + Send + Sync + 'static>: Send + Sync {
    /// Handles one notification.
    async fn handle_async(&self, notification: Arc<N>);
}

// ============================================================================
// Handler Trait
// ============================================================================

/// A type that can be registered with the dispatcher.
///
/// `declare` is called once per handler type; its result is cached for the
/// lifetime of the process.
pub trait Handler: Send + Sync + 'static {
    /// Lists the capabilities this handler type exposes.
    fn declare(capabilities: &mut Capabilities<Self>)
    where
        Self: Sized;
}

/// Runtime identity of a handler type.
#[derive(Clone, Copy)]
pub struct HandlerType {
    id: TypeId,
    name: &'static str,
}

impl HandlerType {
    /// Returns the identity of `H`.
    pub fn of<H: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<H>(),
            name: std::any::type_name::<H>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for HandlerType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HandlerType {}

impl Hash for HandlerType {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.id.hash(state);
    }
}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Type-erased Handler
// ============================================================================

/// Object-safe view of a registered handler.
///
/// Implemented for every [`Handler`]; the registry stores handlers as
/// `dyn AnyHandler` and the dispatcher validates each one against the exact
/// dispatch type before invoking it.
pub trait AnyHandler: Send + Sync + 'static {
    /// Returns the concrete handler type.
    fn handler_type(&self) -> HandlerType;

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Checks that this handler can consume `view` as `notification` with
    /// the given kind, without invoking it.
    fn validate(
        &self,
        notification: NotificationType,
        kind: HandlerKind,
        view: &NotificationView,
    ) -> DispatchResult<()>;

    /// Invokes the synchronous capability for `notification`.
    fn invoke(&self, notification: NotificationType, view: &NotificationView)
    -> DispatchResult<()>;

    /// Produces the unit of work for the asynchronous capability for
    /// `notification`. Nothing runs until the future is polled.
    fn invoke_async(
        self: Arc<Self>,
        notification: NotificationType,
        view: &NotificationView,
    ) -> DispatchResult<BoxFuture<'static, ()>>;
}

impl<H: Handler> AnyHandler for H {
    fn handler_type(&self) -> HandlerType {
        HandlerType::of::<H>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn validate(
        &self,
        notification: NotificationType,
        kind: HandlerKind,
        view: &NotificationView,
    ) -> DispatchResult<()> {
        CapabilityTable::<H>::of().validate(notification, kind, view)
    }

    fn invoke(
        &self,
        notification: NotificationType,
        view: &NotificationView,
    ) -> DispatchResult<()> {
        CapabilityTable::<H>::of().invoke(self, notification, view)
    }

    fn invoke_async(
        self: Arc<Self>,
        notification: NotificationType,
        view: &NotificationView,
    ) -> DispatchResult<BoxFuture<'static, ()>> {
        CapabilityTable::<H>::of().invoke_async(self, notification, view)
    }
}

impl fmt::Debug for dyn AnyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyHandler")
            .field("type", &self.handler_type())
            .finish()
    }
}
