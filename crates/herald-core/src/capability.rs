//! Capability declarations and the per-handler-type capability table.
//!
//! [`Handler::declare`] fills a [`Capabilities`] builder once per handler
//! type. The result is frozen into a [`CapabilityTable`], cached process-wide
//! and consulted on every invocation to validate and route a notification
//! view to the right entry point.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::error::{DispatchError, DispatchResult};
use crate::handler::{AsyncNotificationHandler, Handler, HandlerType, NotificationHandler};
use crate::notification::{NotificationType, NotificationView};

/// Whether a capability runs inline or as an asynchronous unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Sync,
    Async,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => f.write_str("sync"),
            Self::Async => f.write_str("async"),
        }
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Returns `false` when the view does not hold the declared notification type.
type SyncEntry<H> = fn(&H, &NotificationView) -> bool;

/// Returns `None` when the view does not hold the declared notification type.
type AsyncEntry<H> = fn(Arc<H>, &NotificationView) -> Option<BoxFuture<'static, ()>>;

enum EntryPoint<H> {
    Sync(SyncEntry<H>),
    Async(AsyncEntry<H>),
}

impl<H> EntryPoint<H> {
    fn kind(&self) -> HandlerKind {
        match self {
            Self::Sync(_) => HandlerKind::Sync,
            Self::Async(_) => HandlerKind::Async,
        }
    }
}

impl<H> Clone for EntryPoint<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for EntryPoint<H> {}

fn call_sync<H, N>(handler: &H, view: &NotificationView) -> bool
where
    H: NotificationHandler<N>,
    N: ?Sized + Send + Sync + 'static,
{
    match view.get::<N>() {
        Some(notification) => {
            handler.handle(&**notification);
            true
        }
        None => false,
    }
}

fn call_async<H, N>(handler: Arc<H>, view: &NotificationView) -> Option<BoxFuture<'static, ()>>
where
    H: AsyncNotificationHandler<N> + 'static,
    N: ?Sized + Send + Sync + 'static,
{
    let notification = Arc::clone(view.get::<N>()?);
    Some(async move { handler.handle_async(notification).await }.boxed())
}

struct Capability<H> {
    notification: NotificationType,
    entry: EntryPoint<H>,
}

// ============================================================================
// Capabilities Builder
// ============================================================================

/// Builder passed to [`Handler::declare`].
///
/// Declaring the same (type, kind) pair twice is a no-op.
pub struct Capabilities<H> {
    entries: Vec<Capability<H>>,
}

impl<H: Handler> Capabilities<H> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Declares a synchronous capability for `N`.
    pub fn handles<N>(&mut self) -> &mut Self
    where
        N: ?Sized + Send + Sync + 'static,
        H: NotificationHandler<N>,
    {
        self.push(NotificationType::of::<N>(), EntryPoint::Sync(call_sync::<H, N>))
    }

    /// Declares an asynchronous capability for `N`.
    pub fn handles_async<N>(&mut self) -> &mut Self
    where
        N: ?Sized + Send + Sync + 'static,
        H: AsyncNotificationHandler<N>,
    {
        self.push(
            NotificationType::of::<N>(),
            EntryPoint::Async(call_async::<H, N>),
        )
    }

    fn push(&mut self, notification: NotificationType, entry: EntryPoint<H>) -> &mut Self {
        let duplicate = self
            .entries
            .iter()
            .any(|c| c.notification == notification && c.entry.kind() == entry.kind());
        if !duplicate {
            self.entries.push(Capability {
                notification,
                entry,
            });
        }
        self
    }
}

// ============================================================================
// Capability Table
// ============================================================================

static TABLES: LazyLock<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    LazyLock::new(Default::default);

/// Frozen capabilities of one handler type.
pub struct CapabilityTable<H> {
    entries: Vec<Capability<H>>,
}

impl<H: Handler> CapabilityTable<H> {
    /// Returns the cached table for `H`, building it on first use.
    pub fn of() -> Arc<Self> {
        let id = TypeId::of::<H>();
        let cached = TABLES.read().get(&id).cloned();
        if let Some(table) = cached.and_then(|t| t.downcast::<Self>().ok()) {
            return table;
        }

        let mut capabilities = Capabilities::new();
        H::declare(&mut capabilities);
        let built = Arc::new(Self {
            entries: capabilities.entries,
        });

        // Another thread may have won the race; keep whichever table landed first.
        let stored = Arc::clone(
            TABLES
                .write()
                .entry(id)
                .or_insert_with(|| Arc::clone(&built) as Arc<dyn Any + Send + Sync>),
        );
        stored.downcast::<Self>().unwrap_or(built)
    }

    /// Returns the declared notification types of the given kind, in
    /// declaration order.
    pub fn declared(&self, kind: HandlerKind) -> Vec<NotificationType> {
        self.entries
            .iter()
            .filter(|c| c.entry.kind() == kind)
            .map(|c| c.notification)
            .collect()
    }

    /// Returns `true` if `H` declares nothing at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(
        &self,
        notification: NotificationType,
        kind: HandlerKind,
    ) -> DispatchResult<EntryPoint<H>> {
        let mut declared_other_kind = false;
        let matching = self.entries.iter().filter(|c| c.notification == notification);
        for capability in matching {
            if capability.entry.kind() == kind {
                return Ok(capability.entry);
            }
            declared_other_kind = true;
        }

        let handler = HandlerType::of::<H>();
        Err(match (declared_other_kind, kind) {
            (false, _) => DispatchError::CapabilityMismatch {
                handler,
                notification,
            },
            (true, HandlerKind::Async) => DispatchError::AsyncShapeMismatch {
                handler,
                notification,
            },
            (true, HandlerKind::Sync) => DispatchError::MethodShapeMismatch {
                handler,
                notification,
                kind,
            },
        })
    }

    fn shape_mismatch(notification: NotificationType, kind: HandlerKind) -> DispatchError {
        DispatchError::MethodShapeMismatch {
            handler: HandlerType::of::<H>(),
            notification,
            kind,
        }
    }

    pub(crate) fn validate(
        &self,
        notification: NotificationType,
        kind: HandlerKind,
        view: &NotificationView,
    ) -> DispatchResult<()> {
        self.entry(notification, kind)?;
        if view.notification_type() != notification {
            return Err(Self::shape_mismatch(notification, kind));
        }
        Ok(())
    }

    pub(crate) fn invoke(
        &self,
        handler: &H,
        notification: NotificationType,
        view: &NotificationView,
    ) -> DispatchResult<()> {
        match self.entry(notification, HandlerKind::Sync)? {
            EntryPoint::Sync(call) if call(handler, view) => Ok(()),
            _ => Err(Self::shape_mismatch(notification, HandlerKind::Sync)),
        }
    }

    pub(crate) fn invoke_async(
        &self,
        handler: Arc<H>,
        notification: NotificationType,
        view: &NotificationView,
    ) -> DispatchResult<BoxFuture<'static, ()>> {
        match self.entry(notification, HandlerKind::Async)? {
            EntryPoint::Async(call) => call(handler, view)
                .ok_or_else(|| Self::shape_mismatch(notification, HandlerKind::Async)),
            EntryPoint::Sync(_) => Err(Self::shape_mismatch(notification, HandlerKind::Async)),
        }
    }
}

/// Returns the notification types `H` declares for the given kind.
///
/// Computed once per handler type and cached for the lifetime of the process.
pub fn declared_notification_types<H: Handler>(kind: HandlerKind) -> Vec<NotificationType> {
    CapabilityTable::<H>::of().declared(kind)
}

/// Type-erased summary of what a handler type declares.
///
/// Used for registrations whose handler type is only known at runtime, such
/// as factories supplied by the service container.
#[derive(Debug, Clone)]
pub struct HandlerDeclaration {
    handler: HandlerType,
    sync: Vec<NotificationType>,
    asynchronous: Vec<NotificationType>,
}

impl HandlerDeclaration {
    /// Returns the declaration of `H`.
    pub fn of<H: Handler>() -> Self {
        let table = CapabilityTable::<H>::of();
        Self {
            handler: HandlerType::of::<H>(),
            sync: table.declared(HandlerKind::Sync),
            asynchronous: table.declared(HandlerKind::Async),
        }
    }

    pub fn handler_type(&self) -> HandlerType {
        self.handler
    }

    pub fn declared(&self, kind: HandlerKind) -> &[NotificationType] {
        match kind {
            HandlerKind::Sync => &self.sync,
            HandlerKind::Async => &self.asynchronous,
        }
    }

    /// Iterates over every declared (type, kind) pair.
    pub fn iter(&self) -> impl Iterator<Item = (NotificationType, HandlerKind)> + '_ {
        self.sync
            .iter()
            .map(|ty| (*ty, HandlerKind::Sync))
            .chain(self.asynchronous.iter().map(|ty| (*ty, HandlerKind::Async)))
    }

    pub fn is_empty(&self) -> bool {
        self.sync.is_empty() && self.asynchronous.is_empty()
    }
}
