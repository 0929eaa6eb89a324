//! # Herald
//!
//! A typed, in-process notification dispatcher for Rust.
//!
//! ## Overview
//!
//! A notification is any value that implements [`Notification`]. Dispatching
//! it routes the value to every handler registered for its concrete type, for
//! each parent type embedded in it and for every interface (`dyn Trait`) those
//! types implement. Synchronous handlers run inline; asynchronous handlers run
//! as concurrent tasks that [`Dispatcher::dispatch_and_wait`] joins.
//!
//! ```text
//! ┌────────────┐  dispatch   ┌────────────┐  Tick, Clock, dyn TimerEvent  ┌──────────┐
//! │   Caller   │────────────▶│ Dispatcher │──────────────────────────────▶│ Registry │
//! └────────────┘             └────────────┘                               └──────────┘
//!                                  │ sync handlers: inline
//!                                  │ async handlers: JoinSet ──▶ dispatch_and_wait resolves
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! #[derive(Debug, Clone, Notification)]
//! struct Ping;
//!
//! struct Greeter;
//!
//! impl NotificationHandler<Ping> for Greeter {
//!     fn handle(&self, _: &Ping) {
//!         println!("pong");
//!     }
//! }
//!
//! impl Handler for Greeter {
//!     fn declare(capabilities: &mut Capabilities<Self>) {
//!         capabilities.handles::<Ping>();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new();
//!     dispatcher.register_factory(|| Some(Arc::new(Greeter)));
//!     dispatcher.dispatch_and_wait(Ping).await.ok();
//! }
//! ```
//!
//! ## Features
//!
//! - `macros`: Enable the `Notification` derive macro (default)
//! - `toml-config`: Load `herald.toml` (default)
//! - `yaml-config`: Load `herald.yaml`
//! - `json-log`: JSON log output

pub use herald_core as core;
pub use herald_runtime as runtime;

pub use herald_core::{
    AsyncNotificationHandler, CancellationToken, Capabilities, Component, DiagnosticSink,
    Dispatcher, DispatchError, Handler, HandlerKind, JoinFailure, Mounted, Notification,
    NotificationHandler, NotificationType, NotificationView, Subscription,
};
pub use herald_runtime::{HandlerLifetime, ServiceCollection, ServiceProvider, ServiceScope};

/// Derives [`Notification`].
///
/// The generated code refers to `::herald::core`; use
/// `#[notification(crate = "...")]` when the facade is renamed.
#[cfg(feature = "macros")]
pub use herald_macros::Notification;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Dispatch
    pub use herald_core::prelude::*;
    pub use herald_core::{CancellationToken, JoinFailure};

    // Wiring
    pub use herald_runtime::prelude::*;

    #[cfg(feature = "macros")]
    pub use herald_macros::Notification;
}
