use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use herald::core::{Diagnostic, DiagnosticSink, DispatchError};
use herald::prelude::*;
use parking_lot::Mutex;
use tokio_test::{assert_pending, assert_ready};

// ============================================================================
// Notifications
// ============================================================================

pub trait ITimerEvent: Send + Sync {
    fn elapsed(&self) -> Duration;
}

#[derive(Debug, Clone, Notification)]
struct Ping;

#[derive(Debug, Clone, Notification)]
struct Clock {
    label: &'static str,
}

#[derive(Debug, Clone, Notification)]
#[notification(implements(dyn ITimerEvent))]
struct Tick {
    #[notification(parent)]
    clock: Clock,
    elapsed: Duration,
}

impl ITimerEvent for Tick {
    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

fn tick(ms: u64) -> Tick {
    Tick {
        clock: Clock { label: "main" },
        elapsed: Duration::from_millis(ms),
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Default)]
struct H1 {
    calls: AtomicUsize,
}

impl NotificationHandler<Ping> for H1 {
    fn handle(&self, _: &Ping) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Handler for H1 {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<Ping>();
    }
}

/// Sleeps for 50 ms per tick.
#[derive(Default)]
struct H2 {
    finished: AtomicUsize,
}

#[async_trait]
impl AsyncNotificationHandler<Tick> for H2 {
    async fn handle_async(&self, _: Arc<Tick>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

impl Handler for H2 {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles_async::<Tick>();
    }
}

#[derive(Default)]
struct H3 {
    seen: Mutex<Vec<Duration>>,
}

impl NotificationHandler<dyn ITimerEvent> for H3 {
    fn handle(&self, event: &dyn ITimerEvent) {
        self.seen.lock().push(event.elapsed());
    }
}

impl Handler for H3 {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<dyn ITimerEvent>();
    }
}

#[derive(Default)]
struct ClockWatcher {
    labels: Mutex<Vec<&'static str>>,
}

impl NotificationHandler<Clock> for ClockWatcher {
    fn handle(&self, clock: &Clock) {
        self.labels.lock().push(clock.label);
    }
}

impl Handler for ClockWatcher {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<Clock>();
    }
}

struct Stuck;

#[async_trait]
impl AsyncNotificationHandler<Ping> for Stuck {
    async fn handle_async(&self, _: Arc<Ping>) {
        std::future::pending::<()>().await;
    }
}

impl Handler for Stuck {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles_async::<Ping>();
    }
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_ping_reaches_its_handler_once() {
    let dispatcher = Dispatcher::new();
    let h1 = Arc::new(H1::default());
    let _subscription = dispatcher.register(&h1);

    dispatcher.dispatch_and_wait(Ping).await.unwrap();
    assert_eq!(h1.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tick_completes_after_async_handler() {
    let dispatcher = Dispatcher::new();
    let h2 = Arc::new(H2::default());
    let h3 = Arc::new(H3::default());
    let _a = dispatcher.register(&h2);
    let _b = dispatcher.register(&h3);

    let started = Instant::now();
    let mut wait = tokio_test::task::spawn(dispatcher.dispatch_and_wait(tick(5)));
    assert_pending!(wait.poll());

    // The interface handler ran inline; the async one is still sleeping.
    assert_eq!(*h3.seen.lock(), vec![Duration::from_millis(5)]);
    assert_eq!(h2.finished.load(Ordering::SeqCst), 0);

    while !wait.is_woken() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_ready!(wait.poll()).unwrap();

    assert_eq!(h2.finished.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_parent_handlers_see_the_embedded_parent() {
    let dispatcher = Dispatcher::new();
    let watcher = Arc::new(ClockWatcher::default());
    let _subscription = dispatcher.register(&watcher);

    dispatcher.dispatch_and_wait(tick(1)).await.unwrap();
    dispatcher
        .dispatch_and_wait(Clock { label: "bare" })
        .await
        .unwrap();

    assert_eq!(*watcher.labels.lock(), vec!["main", "bare"]);
}

#[tokio::test]
async fn test_unrelated_notification_reaches_nothing() {
    let dispatcher = Dispatcher::new();
    let h3 = Arc::new(H3::default());
    let _subscription = dispatcher.register(&h3);

    dispatcher.dispatch_and_wait(Ping).await.unwrap();
    dispatcher
        .dispatch_and_wait(Clock { label: "main" })
        .await
        .unwrap();
    assert!(h3.seen.lock().is_empty());
}

// ============================================================================
// Registration lifecycle
// ============================================================================

#[tokio::test]
async fn test_factory_builds_a_fresh_handler_per_dispatch() {
    let dispatcher = Dispatcher::new();
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    dispatcher.register_factory(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(H1::default()))
    });

    for _ in 0..3 {
        dispatcher.dispatch_and_wait(Ping).await.unwrap();
    }
    assert_eq!(built.load(Ordering::SeqCst), 3);
}

#[derive(Default)]
struct CountingSink {
    instantiation_failures: AtomicUsize,
    hook_panics: AtomicUsize,
}

impl DiagnosticSink for CountingSink {
    fn record(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::Failed(DispatchError::InstantiationFailure(_)) => {
                self.instantiation_failures.fetch_add(1, Ordering::SeqCst);
            }
            Diagnostic::Failed(DispatchError::HookPanicked { .. }) => {
                self.hook_panics.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_failed_factory_is_recorded_and_skipped() {
    let sink = Arc::new(CountingSink::default());
    let dispatcher = Dispatcher::builder().diagnostics(sink.clone()).build();
    dispatcher.register_factory::<H1, _>(|| None);
    let h1 = Arc::new(H1::default());
    let _subscription = dispatcher.register(&h1);

    dispatcher.dispatch_and_wait(Ping).await.unwrap();

    assert_eq!(h1.calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.instantiation_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unregistered_instance_is_not_invoked() {
    let dispatcher = Dispatcher::new();
    let h1 = Arc::new(H1::default());
    let subscription = dispatcher.register(&h1);
    subscription.detach();

    dispatcher.dispatch(Ping);
    dispatcher.unregister(&h1);
    dispatcher.dispatch(Ping);

    assert_eq!(h1.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropping_the_subscription_unregisters() {
    let dispatcher = Dispatcher::new();
    let h1 = Arc::new(H1::default());
    let subscription = dispatcher.register(&h1);

    dispatcher.dispatch(Ping);
    drop(subscription);
    dispatcher.dispatch(Ping);

    assert_eq!(h1.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_wait_returns_cancelled() {
    let dispatcher = Dispatcher::new();
    let stuck = Arc::new(Stuck);
    let _subscription = dispatcher.register(&stuck);

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });

    let result = dispatcher.dispatch_and_wait_until(Ping, &token).await;
    assert!(matches!(result, Err(JoinFailure::Cancelled)));
}

// ============================================================================
// Components
// ============================================================================

#[derive(Default)]
struct Badge {
    pings: AtomicUsize,
    renders: AtomicUsize,
    quiet: bool,
}

impl NotificationHandler<Ping> for Badge {
    fn handle(&self, _: &Ping) {
        self.pings.fetch_add(1, Ordering::SeqCst);
    }
}

impl Handler for Badge {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<Ping>();
    }
}

impl Component for Badge {
    fn state_changed(&self) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }

    fn state_change_on_handle(&self) -> bool {
        !self.quiet
    }
}

#[tokio::test]
async fn test_mounted_component_rerenders_after_handling() {
    let dispatcher = Dispatcher::new();
    let loud = Mounted::mount(&dispatcher, Arc::new(Badge::default()));
    let quiet = Mounted::mount(
        &dispatcher,
        Arc::new(Badge {
            quiet: true,
            ..Default::default()
        }),
    );

    dispatcher.dispatch_and_wait(Ping).await.unwrap();
    dispatcher.dispatch_and_wait(Ping).await.unwrap();

    assert_eq!(loud.renders.load(Ordering::SeqCst), 2);
    assert_eq!(quiet.pings.load(Ordering::SeqCst), 2);
    assert_eq!(quiet.renders.load(Ordering::SeqCst), 0);

    let badge = Arc::clone(loud.component());
    drop(loud);
    dispatcher.dispatch_and_wait(Ping).await.unwrap();
    assert_eq!(badge.pings.load(Ordering::SeqCst), 2);
}

struct Brittle;

impl NotificationHandler<Ping> for Brittle {
    fn handle(&self, _: &Ping) {}
}

impl Handler for Brittle {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<Ping>();
    }
}

impl Component for Brittle {
    fn state_changed(&self) {
        panic!("render failed");
    }
}

#[tokio::test]
async fn test_panicking_rerender_stays_inside_dispatch() {
    let sink = Arc::new(CountingSink::default());
    let dispatcher = Dispatcher::builder().diagnostics(sink.clone()).build();
    let _brittle = Mounted::mount(&dispatcher, Arc::new(Brittle));
    let badge = Mounted::mount(&dispatcher, Arc::new(Badge::default()));

    let outcome =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| dispatcher.dispatch(Ping)));
    assert!(outcome.is_ok());
    dispatcher.dispatch_and_wait(Ping).await.unwrap();

    assert_eq!(badge.renders.load(Ordering::SeqCst), 2);
    assert_eq!(sink.hook_panics.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Service container
// ============================================================================

#[tokio::test]
async fn test_scoped_dispatcher_routes_to_scoped_handlers() {
    let provider = ServiceCollection::new()
        .register_scoped::<H1>()
        .register_singleton::<H2>()
        .build();

    let scope = provider.create_scope();
    scope.dispatcher().dispatch_and_wait(Ping).await.unwrap();
    scope.dispatcher().dispatch_and_wait(tick(0)).await.unwrap();

    assert_eq!(scope.resolve::<H1>().unwrap().calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        provider
            .create_scope()
            .resolve::<H2>()
            .unwrap()
            .finished
            .load(Ordering::SeqCst),
        1
    );
}
