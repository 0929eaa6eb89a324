//! A small scoped service container.
//!
//! Handlers are registered once on a [`ServiceCollection`] with one of three
//! lifetimes, then resolved per [`ServiceScope`]:
//!
//! | Lifetime | Constructed |
//! |---|---|
//! | [`Transient`](HandlerLifetime::Transient) | on every resolution, so on every dispatch that targets it |
//! | [`Scoped`](HandlerLifetime::Scoped) | once per scope |
//! | [`Singleton`](HandlerLifetime::Singleton) | once per provider |
//!
//! Each scope owns a [`Dispatcher`] into which every collected registration
//! is installed as a factory before the dispatcher is first handed out.
//!
//! ```rust,ignore
//! use herald_runtime::services::ServiceCollection;
//!
//! let provider = ServiceCollection::new()
//!     .register_transient::<CountHandler>()
//!     .register_scoped_with(|scope| WeatherHandler::new(scope.dispatcher().clone()))
//!     .build();
//!
//! let scope = provider.create_scope();
//! scope.dispatcher().dispatch(Count);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use herald_core::{
    AnyHandler, Dispatcher, DynFactory, Handler, HandlerDeclaration, HandlerType, SilentSink,
};
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::DispatchSettings;
use crate::error::{ServiceError, ServiceResult};

type AnyArc = Arc<dyn Any + Send + Sync>;
type Constructor = Arc<dyn Fn(&ServiceScope) -> AnyArc + Send + Sync>;

/// How long a resolved handler lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerLifetime {
    Transient,
    Scoped,
    Singleton,
}

impl fmt::Display for HandlerLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transient => "transient",
            Self::Scoped => "scoped",
            Self::Singleton => "singleton",
        })
    }
}

enum Source {
    Constructor(Constructor),
    Instance(AnyArc),
}

struct Descriptor {
    declaration: HandlerDeclaration,
    lifetime: HandlerLifetime,
    source: Source,
    erase: fn(AnyArc) -> Option<Arc<dyn AnyHandler>>,
}

impl Descriptor {
    fn new<H: Handler>(lifetime: HandlerLifetime, source: Source) -> Self {
        Self {
            declaration: HandlerDeclaration::of::<H>(),
            lifetime,
            source,
            erase: erase::<H>,
        }
    }

    fn handler_type(&self) -> HandlerType {
        self.declaration.handler_type()
    }

    fn create(&self, scope: &ServiceScope) -> AnyArc {
        match &self.source {
            Source::Constructor(construct) => construct(scope),
            Source::Instance(instance) => Arc::clone(instance),
        }
    }
}

fn erase<H: Handler>(instance: AnyArc) -> Option<Arc<dyn AnyHandler>> {
    instance
        .downcast::<H>()
        .ok()
        .map(|handler| handler as Arc<dyn AnyHandler>)
}

// ============================================================================
// ServiceCollection
// ============================================================================

/// Collects handler registrations before any scope exists.
///
/// Registering the same handler type twice replaces the earlier registration.
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: Vec<Descriptor>,
    index: HashMap<TypeId, usize>,
    settings: DispatchSettings,
    runtime: Option<Handle>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies dispatcher settings, usually taken from [`HeraldConfig`](crate::config::HeraldConfig).
    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Launches asynchronous handlers of every scope's dispatcher on `handle`.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn register_transient<H: Handler + Default>(self) -> Self {
        self.register_transient_with(|_| H::default())
    }

    pub fn register_scoped<H: Handler + Default>(self) -> Self {
        self.register_scoped_with(|_| H::default())
    }

    pub fn register_singleton<H: Handler + Default>(self) -> Self {
        self.register_singleton_with(|_| H::default())
    }

    pub fn register_transient_with<H, F>(self, construct: F) -> Self
    where
        H: Handler,
        F: Fn(&ServiceScope) -> H + Send + Sync + 'static,
    {
        self.add_constructed(HandlerLifetime::Transient, construct)
    }

    pub fn register_scoped_with<H, F>(self, construct: F) -> Self
    where
        H: Handler,
        F: Fn(&ServiceScope) -> H + Send + Sync + 'static,
    {
        self.add_constructed(HandlerLifetime::Scoped, construct)
    }

    pub fn register_singleton_with<H, F>(self, construct: F) -> Self
    where
        H: Handler,
        F: Fn(&ServiceScope) -> H + Send + Sync + 'static,
    {
        self.add_constructed(HandlerLifetime::Singleton, construct)
    }

    /// Registers an already constructed singleton.
    pub fn register_singleton_instance<H: Handler>(self, instance: Arc<H>) -> Self {
        let instance: AnyArc = instance;
        self.add(Descriptor::new::<H>(
            HandlerLifetime::Singleton,
            Source::Instance(instance),
        ))
    }

    /// Returns the lifetime registered for `H`, if any.
    pub fn lifetime_of<H: Handler>(&self) -> Option<HandlerLifetime> {
        self.index
            .get(&TypeId::of::<H>())
            .map(|&i| self.descriptors[i].lifetime)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Freezes the collection into a provider.
    pub fn build(self) -> ServiceProvider {
        let singletons = self.descriptors.iter().map(|_| OnceLock::new()).collect();
        ServiceProvider {
            inner: Arc::new(ProviderInner {
                descriptors: self.descriptors,
                index: self.index,
                singletons,
                settings: self.settings,
                runtime: self.runtime,
            }),
        }
    }

    fn add_constructed<H, F>(self, lifetime: HandlerLifetime, construct: F) -> Self
    where
        H: Handler,
        F: Fn(&ServiceScope) -> H + Send + Sync + 'static,
    {
        let construct: Constructor =
            Arc::new(move |scope: &ServiceScope| Arc::new(construct(scope)) as AnyArc);
        self.add(Descriptor::new::<H>(lifetime, Source::Constructor(construct)))
    }

    fn add(mut self, descriptor: Descriptor) -> Self {
        let id = descriptor.handler_type().id();
        debug!(
            handler = %descriptor.handler_type(),
            lifetime = %descriptor.lifetime,
            "Service registered"
        );
        match self.index.get(&id) {
            Some(&i) => self.descriptors[i] = descriptor,
            None => {
                self.index.insert(id, self.descriptors.len());
                self.descriptors.push(descriptor);
            }
        }
        self
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.descriptors
                    .iter()
                    .map(|d| (d.handler_type(), d.lifetime)),
            )
            .finish()
    }
}

// ============================================================================
// ServiceProvider
// ============================================================================

struct ProviderInner {
    descriptors: Vec<Descriptor>,
    index: HashMap<TypeId, usize>,
    singletons: Vec<OnceLock<AnyArc>>,
    settings: DispatchSettings,
    runtime: Option<Handle>,
}

/// The root container. Owns singletons; cheap to clone.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    /// Opens a new scope with its own scoped instances and dispatcher.
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            inner: Arc::new(ScopeInner {
                provider: self.clone(),
                scoped: self
                    .inner
                    .descriptors
                    .iter()
                    .map(|_| OnceLock::new())
                    .collect(),
                dispatcher: OnceLock::new(),
            }),
        }
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("services", &self.inner.descriptors.len())
            .finish()
    }
}

// ============================================================================
// ServiceScope
// ============================================================================

struct ScopeInner {
    provider: ServiceProvider,
    scoped: Vec<OnceLock<AnyArc>>,
    dispatcher: OnceLock<Dispatcher>,
}

/// One logical scope, such as a window or a request.
///
/// Scoped handlers are shared by everything resolved through this scope,
/// including its dispatcher. Constructors must not resolve their own type.
#[derive(Clone)]
pub struct ServiceScope {
    inner: Arc<ScopeInner>,
}

impl ServiceScope {
    /// Resolves `H` according to its registered lifetime.
    pub fn resolve<H: Handler>(&self) -> ServiceResult<Arc<H>> {
        let handler = HandlerType::of::<H>();
        let index = *self
            .provider_inner()
            .index
            .get(&handler.id())
            .ok_or(ServiceError::NotRegistered { handler })?;
        self.instance(index)
            .downcast::<H>()
            .map_err(|_| ServiceError::TypeMismatch { handler })
    }

    /// Returns this scope's dispatcher, building it on first use.
    pub fn dispatcher(&self) -> &Dispatcher {
        self.inner.dispatcher.get_or_init(|| self.build_dispatcher())
    }

    pub fn provider(&self) -> &ServiceProvider {
        &self.inner.provider
    }

    fn provider_inner(&self) -> &ProviderInner {
        &self.inner.provider.inner
    }

    fn instance(&self, index: usize) -> AnyArc {
        let provider = self.provider_inner();
        let descriptor = &provider.descriptors[index];
        match descriptor.lifetime {
            HandlerLifetime::Transient => descriptor.create(self),
            HandlerLifetime::Scoped => Arc::clone(
                self.inner.scoped[index].get_or_init(|| descriptor.create(self)),
            ),
            HandlerLifetime::Singleton => Arc::clone(
                provider.singletons[index].get_or_init(|| descriptor.create(self)),
            ),
        }
    }

    fn build_dispatcher(&self) -> Dispatcher {
        let provider = self.provider_inner();
        let mut builder = Dispatcher::builder();
        if !provider.settings.diagnostics {
            builder = builder.diagnostics(Arc::new(SilentSink));
        }
        if let Some(handle) = &provider.runtime {
            builder = builder.runtime(handle.clone());
        }
        let dispatcher = builder.build();

        for (index, descriptor) in provider.descriptors.iter().enumerate() {
            if descriptor.declaration.is_empty() {
                continue;
            }
            let scope: Weak<ScopeInner> = Arc::downgrade(&self.inner);
            let erase = descriptor.erase;
            let factory: DynFactory = Arc::new(move || {
                let scope = ServiceScope {
                    inner: scope.upgrade()?,
                };
                erase(scope.instance(index))
            });
            dispatcher.register_dyn_factory(descriptor.declaration.clone(), factory);
        }

        dispatcher
    }
}

impl fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceScope")
            .field("dispatcher_built", &self.inner.dispatcher.get().is_some())
            .finish()
    }
}
