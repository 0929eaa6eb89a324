//! # Herald Core
//!
//! The dispatch engine of the Herald notification dispatcher.
//!
//! A notification is routed to every handler registered for its concrete
//! type, its ancestor types and the interfaces implemented along the way.
//! Synchronous handlers run inline; asynchronous handlers run as concurrent
//! tasks that the caller may wait for.
//!
//! ## Components
//!
//! - **Notification Model**: type identity and hierarchy ([`Notification`], [`NotificationType`])
//! - **Type Resolver**: dispatch-type-sets and handler capabilities ([`DispatchPlan`], [`CapabilityTable`])
//! - **Handler Registry**: instance and factory registrations ([`Registry`], [`Subscription`])
//! - **Dispatch Engine**: the sync/async invocation protocol ([`Dispatcher`])
//! - **Diagnostics**: structured records of everything above ([`DiagnosticSink`])
//!
//! ```text
//! ┌──────────┐     ┌────────────┐     ┌──────────┐     ┌──────────────────┐
//! │  Caller  │────▶│ Dispatcher │────▶│ Resolver │────▶│     Registry     │
//! └──────────┘     └────────────┘     └──────────┘     └──────────────────┘
//!                        │ sync: inline                  snapshot per type
//!                        │ async: JoinSet ──▶ completion
//! ```

pub mod capability;
pub mod component;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod notification;
pub mod registry;
pub mod resolver;

pub use capability::{
    Capabilities, CapabilityTable, HandlerDeclaration, HandlerKind, declared_notification_types,
};
pub use component::{Component, Mounted};
pub use diagnostics::{
    Diagnostic, DiagnosticSink, Diagnostics, Provenance, SilentSink, TracingSink,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, DispatchResult, InstantiationFailure, JoinFailure, JoinFault};
pub use handler::{AnyHandler, AsyncNotificationHandler, Handler, HandlerType, NotificationHandler};
pub use notification::{Notification, NotificationType, NotificationView};
pub use registry::{
    DynFactory, Registry, Resolved, ResolvedHandler, ResolvedHandlers, StateChangeHook,
    Subscription,
};
pub use resolver::{DispatchPlan, DispatchTarget, dispatch_type_set};

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        AsyncNotificationHandler, Capabilities, Component, Dispatcher, Handler, HandlerKind,
        Mounted, Notification, NotificationHandler, NotificationType, NotificationView,
        Subscription,
    };
    pub use async_trait::async_trait;
}
