//! Handler registry.
//!
//! Registrations are keyed by exact (notification type, kind) and kept in
//! registration order. The map is copy-on-write: readers take a snapshot
//! under a short read lock, writers clone, modify and swap under the write
//! lock. A dispatch therefore never observes a half-applied change, and
//! removing an instance never disturbs a snapshot already taken.
//!
//! # Provenance
//!
//! - **Instance** registrations hold a [`Weak`] reference. The registrant
//!   owns the handler; dropping the returned [`Subscription`] (or calling
//!   [`Registry::unregister`]) removes every entry for that instance.
//! - **Factory** registrations hold a constructor that is invoked once per
//!   dispatch that targets it. They live as long as the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::capability::{HandlerDeclaration, HandlerKind};
use crate::diagnostics::{Diagnostic, Diagnostics, Provenance};
use crate::error::InstantiationFailure;
use crate::handler::{AnyHandler, Handler, HandlerType};
use crate::notification::NotificationType;

/// Type-erased handler factory.
pub type DynFactory = Arc<dyn Fn() -> Option<Arc<dyn AnyHandler>> + Send + Sync>;

/// Callback fired after a handler registered with it was invoked successfully.
pub type StateChangeHook = Arc<dyn Fn() + Send + Sync>;

/// Address of a handler allocation, without pointer metadata.
///
/// Every `Weak` held by an entry or a [`Subscription`] keeps its allocation
/// reserved, so two live holders with the same address refer to the same
/// instance.
fn address<T: ?Sized>(ptr: *const T) -> *const () {
    ptr.cast()
}

#[derive(Clone)]
enum Source {
    Instance {
        handler_type: HandlerType,
        handler: Weak<dyn AnyHandler>,
    },
    Factory {
        handler_type: HandlerType,
        factory: DynFactory,
    },
}

#[derive(Clone)]
struct Entry {
    source: Source,
    hook: Option<StateChangeHook>,
}

impl Entry {
    fn handler_type(&self) -> HandlerType {
        match &self.source {
            Source::Instance { handler_type, .. } | Source::Factory { handler_type, .. } => {
                *handler_type
            }
        }
    }

    fn is_instance(&self, instance: *const ()) -> bool {
        match &self.source {
            Source::Instance { handler, .. } => address(handler.as_ptr()) == instance,
            Source::Factory { .. } => false,
        }
    }

    fn is_stale(&self) -> bool {
        match &self.source {
            Source::Instance { handler, .. } => handler.strong_count() == 0,
            Source::Factory { .. } => false,
        }
    }
}

type Table = HashMap<(NotificationType, HandlerKind), Arc<Vec<Entry>>>;

// ============================================================================
// Resolution Results
// ============================================================================

/// A handler ready to be invoked.
#[derive(Clone)]
pub struct ResolvedHandler {
    pub handler: Arc<dyn AnyHandler>,
    pub on_handled: Option<StateChangeHook>,
}

impl fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("handler", &self.handler.handler_type())
            .field("on_handled", &self.on_handled.is_some())
            .finish()
    }
}

/// One element of a resolved handler list.
#[derive(Debug, Clone)]
pub enum Resolved {
    Handler(ResolvedHandler),
    /// A factory produced nothing; it stands in for the missing handler.
    Failed(InstantiationFailure),
}

/// Snapshot of the handlers registered for one notification type.
#[derive(Debug, Clone, Default)]
pub struct ResolvedHandlers {
    pub sync: Vec<Resolved>,
    pub asynchronous: Vec<Resolved>,
}

impl ResolvedHandlers {
    pub fn is_empty(&self) -> bool {
        self.sync.is_empty() && self.asynchronous.is_empty()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The handler registry.
///
/// Usually owned by a [`Dispatcher`](crate::Dispatcher) and shared through an
/// `Arc`; instance registration needs the `Arc` so that the returned
/// [`Subscription`] can find its way back.
pub struct Registry {
    entries: RwLock<Arc<Table>>,
    diagnostics: Diagnostics,
}

impl Registry {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            entries: RwLock::new(Arc::new(HashMap::new())),
            diagnostics,
        }
    }

    /// Registers `handler` for every capability it declares.
    ///
    /// The registry keeps only a weak reference. Registering the same
    /// instance again adds nothing.
    pub fn register_instance<H: Handler>(self: &Arc<Self>, handler: &Arc<H>) -> Subscription {
        self.add_instance(handler, None)
    }

    /// Like [`register_instance`](Self::register_instance), with a hook fired
    /// after every successful invocation of this instance.
    pub fn register_instance_with_hook<H: Handler>(
        self: &Arc<Self>,
        handler: &Arc<H>,
        hook: StateChangeHook,
    ) -> Subscription {
        self.add_instance(handler, Some(hook))
    }

    fn add_instance<H: Handler>(
        self: &Arc<Self>,
        handler: &Arc<H>,
        hook: Option<StateChangeHook>,
    ) -> Subscription {
        let handler_type = HandlerType::of::<H>();
        let weak = Arc::downgrade(handler);
        let weak: Weak<dyn AnyHandler> = weak;

        let declaration = HandlerDeclaration::of::<H>();
        let entry = Entry {
            source: Source::Instance {
                handler_type,
                handler: weak.clone(),
            },
            hook,
        };
        self.add(&declaration, entry, Provenance::Instance);

        Subscription {
            registry: Arc::downgrade(self),
            instance: weak,
            handler: handler_type,
            active: true,
        }
    }

    /// Registers a factory for `H`; it is called once per dispatch that
    /// targets one of `H`'s declared types.
    pub fn register_factory<H, F>(&self, factory: F)
    where
        H: Handler,
        F: Fn() -> Option<Arc<H>> + Send + Sync + 'static,
    {
        let factory: DynFactory =
            Arc::new(move || factory().map(|handler| handler as Arc<dyn AnyHandler>));
        self.register_dyn_factory(HandlerDeclaration::of::<H>(), factory);
    }

    /// Registers a type-erased factory.
    ///
    /// Routing uses `declaration`; the handlers the factory produces are
    /// validated against it on every dispatch.
    pub fn register_dyn_factory(&self, declaration: HandlerDeclaration, factory: DynFactory) {
        let entry = Entry {
            source: Source::Factory {
                handler_type: declaration.handler_type(),
                factory,
            },
            hook: None,
        };
        self.add(&declaration, entry, Provenance::Factory);
    }

    fn add(&self, declaration: &HandlerDeclaration, entry: Entry, provenance: Provenance) {
        let mut added = Vec::new();
        {
            let mut guard = self.entries.write();
            let table = Arc::make_mut(&mut *guard);
            for key in declaration.iter() {
                let list = table.entry(key).or_default();
                let already_registered = match &entry.source {
                    Source::Instance { handler, .. } => {
                        let instance = address(handler.as_ptr());
                        list.iter().any(|e| e.is_instance(instance))
                    }
                    Source::Factory { .. } => false,
                };
                if already_registered {
                    continue;
                }
                Arc::make_mut(list).push(entry.clone());
                added.push(key);
            }
        }

        for (notification, kind) in added {
            self.diagnostics.emit(Diagnostic::Registered {
                handler: declaration.handler_type(),
                notification,
                kind,
                provenance,
            });
        }
    }

    /// Removes every registration of this exact instance. No-op if absent.
    pub fn unregister<H: ?Sized>(&self, handler: &Arc<H>) {
        let instance = address(Arc::as_ptr(handler));
        self.remove_where(|entry| entry.is_instance(instance));
    }

    /// Drops entries whose instance is gone.
    fn prune_stale(&self) {
        self.remove_where(Entry::is_stale);
    }

    fn remove_where(&self, matches: impl Fn(&Entry) -> bool) {
        let mut removed = Vec::new();
        {
            let mut guard = self.entries.write();
            let present = guard.values().any(|list| list.iter().any(&matches));
            if !present {
                return;
            }

            let table = Arc::make_mut(&mut *guard);
            table.retain(|(notification, kind), list| {
                if list.iter().any(&matches) {
                    for entry in list.iter() {
                        if matches(entry) {
                            removed.push((entry.handler_type(), *notification, *kind));
                        }
                    }
                    Arc::make_mut(list).retain(|e| !matches(e));
                }
                !list.is_empty()
            });
        }

        for (handler, notification, kind) in removed {
            self.diagnostics.emit(Diagnostic::Unregistered {
                handler,
                notification,
                kind,
            });
        }
    }

    /// Returns the handlers currently registered for `notification`.
    ///
    /// Factories are invoked here. Instances dropped without unregistering
    /// are skipped, then pruned.
    pub fn resolve(&self, notification: NotificationType) -> ResolvedHandlers {
        let snapshot = Arc::clone(&self.entries.read());
        let mut stale = false;
        let resolved = ResolvedHandlers {
            sync: self.resolve_list(&snapshot, notification, HandlerKind::Sync, &mut stale),
            asynchronous: self.resolve_list(
                &snapshot,
                notification,
                HandlerKind::Async,
                &mut stale,
            ),
        };
        if stale {
            self.prune_stale();
        }
        resolved
    }

    fn resolve_list(
        &self,
        snapshot: &Table,
        notification: NotificationType,
        kind: HandlerKind,
        stale: &mut bool,
    ) -> Vec<Resolved> {
        let Some(list) = snapshot.get(&(notification, kind)) else {
            return Vec::new();
        };

        list.iter()
            .filter_map(|entry| {
                let handler = match &entry.source {
                    Source::Instance {
                        handler,
                        handler_type,
                        ..
                    } => match handler.upgrade() {
                        Some(handler) => handler,
                        None => {
                            *stale = true;
                            self.diagnostics.emit(Diagnostic::StaleInstance {
                                handler: *handler_type,
                                notification,
                            });
                            return None;
                        }
                    },
                    Source::Factory {
                        handler_type,
                        factory,
                    } => match factory() {
                        Some(handler) => handler,
                        None => {
                            return Some(Resolved::Failed(InstantiationFailure {
                                handler: *handler_type,
                            }));
                        }
                    },
                };
                Some(Resolved::Handler(ResolvedHandler {
                    handler,
                    on_handled: entry.hook.clone(),
                }))
            })
            .collect()
    }

    /// Number of registrations for (`notification`, `kind`), including
    /// dropped instances no resolve has pruned yet.
    pub fn handler_count(&self, notification: NotificationType, kind: HandlerKind) -> usize {
        self.entries
            .read()
            .get(&(notification, kind))
            .map_or(0, |list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Diagnostics::default())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.entries.read().len())
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// RAII handle for an instance registration.
///
/// Dropping it unregisters the instance. Use [`detach`](Self::detach) to keep
/// the registration alive until an explicit [`Registry::unregister`] (or
/// until the instance itself is dropped, after which it is pruned).
#[must_use = "dropping a Subscription unregisters the handler"]
pub struct Subscription {
    registry: Weak<Registry>,
    instance: Weak<dyn AnyHandler>,
    handler: HandlerType,
    active: bool,
}

impl Subscription {
    /// The handler type this subscription was created for.
    pub fn handler_type(&self) -> HandlerType {
        self.handler
    }

    /// Unregisters now.
    pub fn unsubscribe(self) {}

    /// Releases the handle without unregistering.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_where(|entry| match &entry.source {
                Source::Instance { handler, .. } => Weak::ptr_eq(handler, &self.instance),
                Source::Factory { .. } => false,
            });
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handler", &self.handler)
            .field("active", &self.active)
            .finish()
    }
}
