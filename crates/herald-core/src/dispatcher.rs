//! Notification dispatcher for Herald.
//!
//! This module provides the [`Dispatcher`], which routes a notification to
//! every handler registered for its dispatch-type-set.
//!
//! # Dispatch Protocol
//!
//! For each type in the dispatch-type-set (concrete type, ancestors,
//! interfaces):
//!
//! 1. A snapshot of the synchronous and asynchronous handlers is taken
//! 2. Synchronous handlers run inline, in registration order
//! 3. Asynchronous handlers are launched as independent tasks
//!
//! Each handler is validated before it is invoked. A failing or panicking
//! handler is recorded through the diagnostics sink and never affects its
//! siblings or the caller.
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! let dispatcher = Dispatcher::new();
//! let audit = Arc::new(Audit::default());
//! let _subscription = dispatcher.register(&audit);
//!
//! // Fire and forget
//! dispatcher.dispatch(Ping);
//!
//! // Wait for every asynchronous handler
//! dispatcher.dispatch_and_wait(Tick::new(50)).await?;
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error};

use crate::capability::{HandlerDeclaration, HandlerKind};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Diagnostics};
use crate::error::{DispatchError, JoinFailure, JoinFault, panic_message};
use crate::handler::{Handler, HandlerType};
use crate::notification::{Notification, NotificationType, NotificationView};
use crate::registry::{
    DynFactory, Registry, Resolved, ResolvedHandler, ResolvedHandlers, StateChangeHook,
    Subscription,
};
use crate::resolver::DispatchPlan;

struct Inner {
    registry: Arc<Registry>,
    diagnostics: Diagnostics,
    runtime: Option<Handle>,
}

/// The central notification dispatcher.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Builder for a [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    sink: Option<Arc<dyn DiagnosticSink>>,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    /// Sends diagnostics to `sink` instead of `tracing`.
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Launches asynchronous handlers on `handle` instead of the ambient runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Dispatcher {
        let diagnostics = self.sink.map(Diagnostics::new).unwrap_or_default();
        Dispatcher {
            inner: Arc::new(Inner {
                registry: Arc::new(Registry::new(diagnostics.clone())),
                diagnostics,
                runtime: self.runtime,
            }),
        }
    }
}

impl Dispatcher {
    /// Creates a dispatcher with an empty registry and the tracing sink.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Registers an instance handler. See [`Registry::register_instance`].
    pub fn register<H: Handler>(&self, handler: &Arc<H>) -> Subscription {
        self.inner.registry.register_instance(handler)
    }

    /// Registers an instance handler with a post-invocation hook.
    pub fn register_with_hook<H: Handler>(
        &self,
        handler: &Arc<H>,
        hook: StateChangeHook,
    ) -> Subscription {
        self.inner.registry.register_instance_with_hook(handler, hook)
    }

    /// Registers a factory handler. See [`Registry::register_factory`].
    pub fn register_factory<H, F>(&self, factory: F)
    where
        H: Handler,
        F: Fn() -> Option<Arc<H>> + Send + Sync + 'static,
    {
        self.inner.registry.register_factory(factory);
    }

    pub fn register_dyn_factory(&self, declaration: HandlerDeclaration, factory: DynFactory) {
        self.inner.registry.register_dyn_factory(declaration, factory);
    }

    pub fn unregister<H: ?Sized>(&self, handler: &Arc<H>) {
        self.inner.registry.unregister(handler);
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Dispatches `notification` without waiting for asynchronous handlers.
    ///
    /// Synchronous handlers have run by the time this returns.
    pub fn dispatch<N: Notification>(&self, notification: N) {
        self.dispatch_arc(Arc::new(notification));
    }

    /// Like [`dispatch`](Self::dispatch), for an already shared notification.
    pub fn dispatch_arc(&self, notification: Arc<dyn Notification>) {
        let ty = notification.notification_type();
        let runtime = self.runtime();
        let mut units = self.launch(notification, runtime.as_ref());

        let runtime = match runtime {
            Some(runtime) if !units.is_empty() => runtime,
            _ => {
                self.emit(Diagnostic::AsyncHandlersCompleted { notification: ty });
                return;
            }
        };

        let dispatcher = self.clone();
        runtime.spawn(async move {
            if let Err(err) = dispatcher.join(ty, &mut units).await {
                error!(
                    target: "herald::dispatch",
                    notification = %ty,
                    error = %err,
                    "Detached dispatch failed to join"
                );
            }
        });
    }

    /// Dispatches `notification` and waits until every handler in every
    /// branch has finished or failed.
    ///
    /// Handler failures are recorded, not returned. Dropping the returned
    /// future aborts all asynchronous units still in flight.
    pub async fn dispatch_and_wait<N: Notification>(
        &self,
        notification: N,
    ) -> Result<(), JoinFailure> {
        self.dispatch_arc_and_wait(Arc::new(notification)).await
    }

    pub async fn dispatch_arc_and_wait(
        &self,
        notification: Arc<dyn Notification>,
    ) -> Result<(), JoinFailure> {
        let ty = notification.notification_type();
        let runtime = self.runtime();
        let mut units = self.launch(notification, runtime.as_ref());
        self.join(ty, &mut units).await
    }

    /// Like [`dispatch_and_wait`](Self::dispatch_and_wait), but gives up as
    /// soon as `cancel` fires, aborting every unit still in flight.
    pub async fn dispatch_and_wait_until<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), JoinFailure> {
        self.dispatch_arc_and_wait_until(Arc::new(notification), cancel)
            .await
    }

    pub async fn dispatch_arc_and_wait_until(
        &self,
        notification: Arc<dyn Notification>,
        cancel: &CancellationToken,
    ) -> Result<(), JoinFailure> {
        let ty = notification.notification_type();
        let runtime = self.runtime();
        let mut units = self.launch(notification, runtime.as_ref());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            result = self.join(ty, &mut units) => return result,
        }

        let aborted = units.len();
        units.shutdown().await;
        debug!(
            target: "herald::dispatch",
            notification = %ty,
            aborted,
            "Dispatch cancelled"
        );
        Err(JoinFailure::Cancelled)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn runtime(&self) -> Option<Handle> {
        self.inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn emit(&self, diagnostic: Diagnostic) {
        self.inner.diagnostics.emit(diagnostic);
    }

    fn fail(&self, err: DispatchError) {
        self.emit(Diagnostic::Failed(err));
    }

    /// Runs every synchronous handler and launches every asynchronous one.
    fn launch(
        &self,
        notification: Arc<dyn Notification>,
        runtime: Option<&Handle>,
    ) -> JoinSet<()> {
        let ty = notification.notification_type();
        let span = debug_span!(target: "herald::dispatch", "dispatch", notification = %ty);
        let _enter = span.enter();

        self.emit(Diagnostic::Dispatching { notification: ty });

        let mut units = JoinSet::new();
        let mut skipped = 0;

        for target in DispatchPlan::for_notification(notification) {
            let branch = target.notification_type();
            let resolved = self.inner.registry.resolve(branch);
            if resolved.is_empty() {
                continue;
            }

            let Some(view) = target.view() else {
                self.reject(branch, resolved);
                continue;
            };

            for handler in resolved.sync {
                self.invoke_sync(branch, &view, handler);
            }

            for handler in resolved.asynchronous {
                let Some(unit) = self.prepare_async(branch, &view, handler) else {
                    continue;
                };
                match runtime {
                    Some(runtime) => {
                        units.spawn_on(unit, runtime);
                    }
                    None => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            self.emit(Diagnostic::NoRuntime {
                notification: ty,
                skipped,
            });
        }
        self.emit(Diagnostic::Dispatched {
            notification: ty,
            launched: units.len(),
        });

        units
    }

    async fn join(
        &self,
        notification: NotificationType,
        units: &mut JoinSet<()>,
    ) -> Result<(), JoinFailure> {
        let mut faults = Vec::new();
        while let Some(result) = units.join_next().await {
            if let Err(err) = result {
                faults.push(JoinFault {
                    notification,
                    reason: err.to_string(),
                });
            }
        }

        self.emit(Diagnostic::AsyncHandlersCompleted { notification });

        if faults.is_empty() {
            Ok(())
        } else {
            Err(JoinFailure::Aggregate(faults))
        }
    }

    /// Unwraps a resolved entry, recording instantiation failures.
    fn accept(&self, resolved: Resolved) -> Option<ResolvedHandler> {
        match resolved {
            Resolved::Handler(handler) => Some(handler),
            Resolved::Failed(failure) => {
                self.fail(failure.into());
                None
            }
        }
    }

    /// Records a failure for every handler of a branch whose view could not
    /// be produced.
    fn reject(&self, notification: NotificationType, resolved: ResolvedHandlers) {
        let lists = [
            (HandlerKind::Sync, resolved.sync),
            (HandlerKind::Async, resolved.asynchronous),
        ];
        for (kind, list) in lists {
            for entry in list {
                if let Some(ResolvedHandler { handler, .. }) = self.accept(entry) {
                    self.fail(DispatchError::MethodShapeMismatch {
                        handler: handler.handler_type(),
                        notification,
                        kind,
                    });
                }
            }
        }
    }

    fn invoke_sync(
        &self,
        notification: NotificationType,
        view: &NotificationView,
        resolved: Resolved,
    ) {
        let Some(ResolvedHandler {
            handler,
            on_handled,
        }) = self.accept(resolved)
        else {
            return;
        };
        let handler_type = handler.handler_type();

        if let Err(err) = handler.validate(notification, HandlerKind::Sync, view) {
            self.fail(err);
            return;
        }

        self.emit(Diagnostic::InvokingHandler {
            notification,
            handler: handler_type,
            kind: HandlerKind::Sync,
        });

        match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(notification, view))) {
            Ok(Ok(())) => {
                self.emit(Diagnostic::HandlerInvoked {
                    notification,
                    handler: handler_type,
                    kind: HandlerKind::Sync,
                });
                if let Some(hook) = on_handled {
                    run_hook(&self.inner.diagnostics, &hook, handler_type, notification);
                }
            }
            Ok(Err(err)) => self.fail(err),
            Err(payload) => self.fail(DispatchError::HandlerPanicked {
                handler: handler_type,
                notification,
                message: panic_message(&*payload),
            }),
        }
    }

    fn prepare_async(
        &self,
        notification: NotificationType,
        view: &NotificationView,
        resolved: Resolved,
    ) -> Option<BoxFuture<'static, ()>> {
        let ResolvedHandler {
            handler,
            on_handled,
        } = self.accept(resolved)?;
        let handler_type = handler.handler_type();

        if let Err(err) = handler.validate(notification, HandlerKind::Async, view) {
            self.fail(err);
            return None;
        }

        self.emit(Diagnostic::InvokingHandler {
            notification,
            handler: handler_type,
            kind: HandlerKind::Async,
        });

        let work = match handler.invoke_async(notification, view) {
            Ok(work) => work,
            Err(err) => {
                self.fail(err);
                return None;
            }
        };

        self.emit(Diagnostic::HandlerInvoked {
            notification,
            handler: handler_type,
            kind: HandlerKind::Async,
        });

        let diagnostics = self.inner.diagnostics.clone();
        let span = debug_span!(
            target: "herald::dispatch",
            "async_handler",
            handler = %handler_type,
            notification = %notification
        );

        let unit = async move {
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(()) => {
                    diagnostics.emit(Diagnostic::AsyncHandlerFinished {
                        notification,
                        handler: handler_type,
                    });
                    if let Some(hook) = on_handled {
                        run_hook(&diagnostics, &hook, handler_type, notification);
                    }
                }
                Err(payload) => {
                    diagnostics.emit(Diagnostic::Failed(DispatchError::HandlerPanicked {
                        handler: handler_type,
                        notification,
                        message: panic_message(&*payload),
                    }))
                }
            }
        };

        Some(unit.instrument(span).boxed())
    }
}

/// Fires a state-change hook, recording a panic instead of unwinding.
fn run_hook(
    diagnostics: &Diagnostics,
    hook: &StateChangeHook,
    handler: HandlerType,
    notification: NotificationType,
) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook())) {
        diagnostics.emit(Diagnostic::Failed(DispatchError::HookPanicked {
            handler,
            notification,
            message: panic_message(&*payload),
        }));
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("runtime", &self.inner.runtime.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::{Notify, oneshot};
    use tokio_test::{assert_pending, assert_ready};

    use super::*;
    use crate::capability::Capabilities;
    use crate::diagnostics::testing::RecordingSink;
    use crate::handler::{AnyHandler, AsyncNotificationHandler, NotificationHandler};
    use crate::notification::fixtures::*;

    fn recorded() -> (Dispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::builder().diagnostics(sink.clone()).build();
        (dispatcher, sink)
    }

    /// Logs which branch it was reached through.
    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<String>>,
    }

    impl Journal {
        fn entries(&self) -> Vec<String> {
            self.entries.lock().clone()
        }

        fn push(&self, entry: impl Into<String>) {
            self.entries.lock().push(entry.into());
        }
    }

    impl NotificationHandler<Ping> for Journal {
        fn handle(&self, _: &Ping) {
            self.push("ping");
        }
    }

    impl NotificationHandler<Tick> for Journal {
        fn handle(&self, tick: &Tick) {
            self.push(format!("tick:{}", tick.elapsed));
        }
    }

    impl NotificationHandler<Clock> for Journal {
        fn handle(&self, clock: &Clock) {
            self.push(format!("clock:{}", clock.started_at));
        }
    }

    impl NotificationHandler<dyn TimerEvent> for Journal {
        fn handle(&self, event: &dyn TimerEvent) {
            self.push(format!("timer:{}", event.elapsed_ms()));
        }
    }

    impl Handler for Journal {
        fn declare(capabilities: &mut Capabilities<Self>) {
            capabilities
                .handles::<Ping>()
                .handles::<Tick>()
                .handles::<Clock>()
                .handles::<dyn TimerEvent>();
        }
    }

    /// Waits for a gate before completing.
    #[derive(Default)]
    struct Gated {
        gate: Notify,
        done: AtomicUsize,
    }

    #[async_trait]
    impl AsyncNotificationHandler<dyn TimerEvent> for Gated {
        async fn handle_async(&self, _: Arc<dyn TimerEvent>) {
            self.gate.notified().await;
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Handler for Gated {
        fn declare(capabilities: &mut Capabilities<Self>) {
            capabilities.handles_async::<dyn TimerEvent>();
        }
    }

    struct Panicky;

    impl NotificationHandler<Ping> for Panicky {
        fn handle(&self, _: &Ping) {
            panic!("ping rejected");
        }
    }

    #[async_trait]
    impl AsyncNotificationHandler<Tick> for Panicky {
        async fn handle_async(&self, _: Arc<Tick>) {
            panic!("tick rejected");
        }
    }

    impl Handler for Panicky {
        fn declare(capabilities: &mut Capabilities<Self>) {
            capabilities.handles::<Ping>().handles_async::<Tick>();
        }
    }

    struct Forever;

    #[async_trait]
    impl AsyncNotificationHandler<Ping> for Forever {
        async fn handle_async(&self, _: Arc<Ping>) {
            std::future::pending::<()>().await;
        }
    }

    impl Handler for Forever {
        fn declare(capabilities: &mut Capabilities<Self>) {
            capabilities.handles_async::<Ping>();
        }
    }

    struct Signal(Mutex<Option<oneshot::Sender<u64>>>);

    #[async_trait]
    impl AsyncNotificationHandler<Tick> for Signal {
        async fn handle_async(&self, tick: Arc<Tick>) {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(sender) = self.0.lock().take() {
                let _ = sender.send(tick.elapsed);
            }
        }
    }

    impl Handler for Signal {
        fn declare(capabilities: &mut Capabilities<Self>) {
            capabilities.handles_async::<Tick>();
        }
    }

    #[tokio::test]
    async fn test_sync_handler_runs_before_dispatch_returns() {
        let dispatcher = Dispatcher::new();
        let journal = Arc::new(Journal::default());
        let _subscription = dispatcher.register(&journal);

        dispatcher.dispatch(Ping);
        assert_eq!(journal.entries(), vec!["ping"]);
    }

    #[tokio::test]
    async fn test_each_branch_invoked_once() {
        let dispatcher = Dispatcher::new();
        let journal = Arc::new(Journal::default());
        let _subscription = dispatcher.register(&journal);

        dispatcher.dispatch_and_wait(tick(4)).await.unwrap();

        // TimerEvent is reachable from Tick and Clock, but runs once with
        // the concrete value's view.
        assert_eq!(journal.entries(), vec!["tick:4", "clock:7", "timer:4"]);
    }

    #[tokio::test]
    async fn test_unrelated_notification_reaches_nothing() {
        let dispatcher = Dispatcher::new();
        let gated = Arc::new(Gated::default());
        let _subscription = dispatcher.register(&gated);

        dispatcher.dispatch_and_wait(Ping).await.unwrap();
        assert_eq!(gated.done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_is_pending_until_async_handlers_finish() {
        let dispatcher = Dispatcher::new();
        let gated = Arc::new(Gated::default());
        let _subscription = dispatcher.register(&gated);

        let mut wait = tokio_test::task::spawn(dispatcher.dispatch_and_wait(tick(1)));
        assert_pending!(wait.poll());

        tokio::task::yield_now().await;
        assert_pending!(wait.poll());

        gated.gate.notify_one();
        while !wait.is_woken() {
            tokio::task::yield_now().await;
        }
        assert_ready!(wait.poll()).unwrap();
        assert_eq!(gated.done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_with_only_sync_handlers_is_ready() {
        let dispatcher = Dispatcher::new();
        let journal = Arc::new(Journal::default());
        let _subscription = dispatcher.register(&journal);

        let mut wait = tokio_test::task::spawn(dispatcher.dispatch_and_wait(Ping));
        assert_ready!(wait.poll()).unwrap();
    }

    #[tokio::test]
    async fn test_detached_dispatch_runs_async_handlers() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = oneshot::channel();
        let signal = Arc::new(Signal(Mutex::new(Some(tx))));
        let _subscription = dispatcher.register(&signal);

        dispatcher.dispatch(tick(11));
        assert_eq!(rx.await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_panics_are_isolated() {
        let (dispatcher, sink) = recorded();
        let panicky = Arc::new(Panicky);
        let journal = Arc::new(Journal::default());
        let _a = dispatcher.register(&panicky);
        let _b = dispatcher.register(&journal);

        dispatcher.dispatch_and_wait(Ping).await.unwrap();
        dispatcher.dispatch_and_wait(tick(2)).await.unwrap();

        assert_eq!(journal.entries()[0], "ping");
        let panics = sink
            .failures()
            .into_iter()
            .filter(|e| matches!(e, DispatchError::HandlerPanicked { .. }))
            .count();
        assert_eq!(panics, 2);
    }

    #[tokio::test]
    async fn test_failed_factory_does_not_stop_others() {
        let (dispatcher, sink) = recorded();
        dispatcher.register_factory::<Journal, _>(|| None);
        let journal = Arc::new(Journal::default());
        let _subscription = dispatcher.register(&journal);

        dispatcher.dispatch_and_wait(Ping).await.unwrap();

        assert_eq!(journal.entries(), vec!["ping"]);
        assert!(matches!(
            sink.failures().as_slice(),
            [DispatchError::InstantiationFailure(_)]
        ));
    }

    #[tokio::test]
    async fn test_factory_of_wrong_type_is_capability_mismatch() {
        let (dispatcher, sink) = recorded();
        // Routed as a Gated (async dyn TimerEvent) but produces a Journal.
        dispatcher.register_dyn_factory(
            HandlerDeclaration::of::<Gated>(),
            Arc::new(|| Some(Arc::new(Journal::default()) as Arc<dyn AnyHandler>)),
        );

        dispatcher.dispatch_and_wait(tick(1)).await.unwrap();
        assert!(matches!(
            sink.failures().as_slice(),
            [DispatchError::AsyncShapeMismatch { .. }]
        ));

        dispatcher.register_dyn_factory(
            HandlerDeclaration::of::<Journal>(),
            Arc::new(|| Some(Arc::new(Forever) as Arc<dyn AnyHandler>)),
        );
        dispatcher.dispatch_and_wait(Clock { started_at: 1 }).await.unwrap();
        assert!(
            sink.failures()
                .iter()
                .any(|e| matches!(e, DispatchError::CapabilityMismatch { .. }))
        );
    }

    #[tokio::test]
    async fn test_hook_fires_after_success() {
        let dispatcher = Dispatcher::new();
        let journal = Arc::new(Journal::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _subscription = dispatcher.register_with_hook(
            &journal,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        dispatcher.dispatch_and_wait(tick(3)).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_isolated_in_sync_branch() {
        let (dispatcher, sink) = recorded();
        let first = Arc::new(Journal::default());
        let second = Arc::new(Journal::default());
        let _a = dispatcher.register_with_hook(&first, Arc::new(|| panic!("hook rejected")));
        let _b = dispatcher.register(&second);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(Ping)));

        assert!(outcome.is_ok());
        assert_eq!(first.entries(), vec!["ping"]);
        assert_eq!(second.entries(), vec!["ping"]);
        assert!(matches!(
            sink.failures().as_slice(),
            [DispatchError::HookPanicked { message, .. }] if message == "hook rejected"
        ));
    }

    #[tokio::test]
    async fn test_panicking_hook_is_isolated_in_async_branch() {
        let (dispatcher, sink) = recorded();
        let (tx, rx) = oneshot::channel();
        let signal = Arc::new(Signal(Mutex::new(Some(tx))));
        let _subscription =
            dispatcher.register_with_hook(&signal, Arc::new(|| panic!("hook rejected")));

        dispatcher.dispatch_and_wait(tick(1)).await.unwrap();

        assert_eq!(rx.await.unwrap(), 1);
        assert!(matches!(
            sink.failures().as_slice(),
            [DispatchError::HookPanicked { .. }]
        ));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_units() {
        let dispatcher = Dispatcher::new();
        let forever = Arc::new(Forever);
        let _subscription = dispatcher.register(&forever);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = dispatcher.dispatch_and_wait_until(Ping, &cancel).await;
        assert!(matches!(result, Err(JoinFailure::Cancelled)));
    }

    #[test]
    fn test_no_runtime_skips_async_units() {
        let (dispatcher, sink) = recorded();
        let journal = Arc::new(Journal::default());
        let gated = Arc::new(Gated::default());
        let _a = dispatcher.register(&journal);
        let _b = dispatcher.register(&gated);

        dispatcher.dispatch(tick(8));

        assert_eq!(journal.entries(), vec!["tick:8", "clock:7", "timer:8"]);
        assert!(
            sink.records()
                .iter()
                .any(|d| matches!(d, Diagnostic::NoRuntime { skipped: 1, .. }))
        );
    }

    #[tokio::test]
    async fn test_unregistered_handler_is_not_invoked() {
        let dispatcher = Dispatcher::new();
        let journal = Arc::new(Journal::default());
        let subscription = dispatcher.register(&journal);

        dispatcher.dispatch(Ping);
        drop(subscription);
        dispatcher.dispatch(Ping);

        assert_eq!(journal.entries(), vec!["ping"]);
    }
}
