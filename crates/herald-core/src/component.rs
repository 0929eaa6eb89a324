//! Lifecycle helper for short-lived handler objects such as UI components.
//!
//! A [`Component`] is mounted for as long as it is alive: [`Mounted::mount`]
//! registers it as an instance handler (only if it declares anything) and
//! dropping the guard unregisters it. After every successful invocation the
//! component is told that its state changed, unless it opts out.

use std::ops::Deref;
use std::sync::Arc;

use crate::capability::CapabilityTable;
use crate::dispatcher::Dispatcher;
use crate::handler::Handler;
use crate::registry::{StateChangeHook, Subscription};

pub trait Component: Handler {
    /// Called after this component handled a notification successfully.
    fn state_changed(&self);

    /// Whether handling a notification should trigger [`state_changed`](Self::state_changed).
    fn state_change_on_handle(&self) -> bool {
        true
    }
}

/// A mounted component. Dropping it unregisters the component.
#[must_use = "dropping a Mounted guard unregisters the component"]
pub struct Mounted<C: Component> {
    component: Arc<C>,
    subscription: Option<Subscription>,
}

impl<C: Component> Mounted<C> {
    pub fn mount(dispatcher: &Dispatcher, component: Arc<C>) -> Self {
        let subscription = (!CapabilityTable::<C>::of().is_empty()).then(|| {
            let weak = Arc::downgrade(&component);
            let hook: StateChangeHook = Arc::new(move || {
                if let Some(component) = weak.upgrade()
                    && component.state_change_on_handle()
                {
                    component.state_changed();
                }
            });
            dispatcher.register_with_hook(&component, hook)
        });

        Self {
            component,
            subscription,
        }
    }

    pub fn component(&self) -> &Arc<C> {
        &self.component
    }

    /// Returns `true` if the component was registered with the dispatcher.
    pub fn is_registered(&self) -> bool {
        self.subscription.is_some()
    }
}

impl<C: Component> Deref for Mounted<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.component
    }
}
