//! Notification model for the Herald dispatcher.
//!
//! This module provides the type identity and hierarchy primitives that the
//! dispatcher routes on:
//!
//! - [`NotificationType`] - Runtime identity of a notification (or interface) type
//! - [`Notification`] - Object-safe trait implemented by every dispatchable value
//! - [`NotificationView`] - A notification seen *as* one member of its type set
//!
//! # Hierarchy Model
//!
//! Rust has no class inheritance, so the hierarchy is expressed explicitly:
//!
//! - A **base type** is a parent value embedded in the child. [`Notification::parent`]
//!   returns a clone of that part, and the chain ends where it returns `None`.
//! - An **interface** is a trait object type such as `dyn TimerEvent`. The trait
//!   must have `Send + Sync` as supertraits so that `Arc<dyn TimerEvent>` can
//!   cross task boundaries.
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! pub trait TimerEvent: Send + Sync {
//!     fn elapsed_ms(&self) -> u64;
//! }
//!
//! #[derive(Clone, Notification)]
//! pub struct Clock {
//!     pub started_at: u64,
//! }
//!
//! #[derive(Clone, Notification)]
//! #[notification(implements(dyn TimerEvent))]
//! pub struct Tick {
//!     #[notification(parent)]
//!     pub clock: Clock,
//!     pub elapsed: u64,
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// Notification Type
// ============================================================================

/// Runtime identity of a notification type.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// diagnostics. Interface types are identified by their trait object type,
/// e.g. `NotificationType::of::<dyn TimerEvent>()`.
#[derive(Clone, Copy)]
pub struct NotificationType {
    id: TypeId,
    name: &'static str,
}

impl NotificationType {
    /// Returns the identity of `N`.
    pub fn of<N: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<N>(),
            name: std::any::type_name::<N>(),
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

    /// Returns `true` if this is the identity of `N`.
    pub fn is<N: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<N>()
    }
}

impl PartialEq for NotificationType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NotificationType {}

impl Hash for NotificationType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Notification Trait
// ============================================================================

/// The base trait for all values that can be dispatched.
///
/// The trait is object-safe: the dispatcher only ever sees
/// `Arc<dyn Notification>`. Use `#[derive(Notification)]` rather than
/// implementing it by hand; a manual implementation looks like this:
///
/// ```rust,ignore
/// impl Notification for Tick {
///     fn notification_type(&self) -> NotificationType {
///         NotificationType::of::<Self>()
///     }
///
///     fn parent(&self) -> Option<Arc<dyn Notification>> {
///         Some(Arc::new(self.clock.clone()))
///     }
///
///     fn interfaces(&self) -> Vec<NotificationType> {
///         vec![NotificationType::of::<dyn TimerEvent>()]
///     }
///
///     fn view(self: Arc<Self>, ty: NotificationType) -> Option<NotificationView> {
///         if ty.is::<Self>() {
///             return Some(NotificationView::new(self));
///         }
///         if ty.is::<dyn TimerEvent>() {
///             return Some(NotificationView::new(self as Arc<dyn TimerEvent>));
///         }
///         None
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait Notification: Any + Send + Sync {
    /// Returns the concrete type of this notification.
    fn notification_type(&self) -> NotificationType;

    /// Returns the base-type part of this notification, if any.
    ///
    /// The returned value is an independent copy; walking `parent()`
    /// repeatedly yields the full ancestor chain, nearest first.
    fn parent(&self) -> Option<Arc<dyn Notification>> {
        None
    }

    /// Returns the interface types implemented directly by this type, in
    /// declaration order.
    ///
    /// Interfaces of ancestors are reported by the ancestors themselves.
    fn interfaces(&self) -> Vec<NotificationType> {
        Vec::new()
    }

    /// Produces a view of this notification as `ty`.
    ///
    /// `ty` must be either the concrete type or one of the types returned by
    /// [`interfaces`](Self::interfaces); anything else yields `None`.
    fn view(self: Arc<Self>, ty: NotificationType) -> Option<NotificationView>;

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("type", &self.notification_type())
            .finish()
    }
}

// ============================================================================
// Notification View
// ============================================================================

/// A notification seen as one specific member of its dispatch-type-set.
///
/// Internally this is a type-erased `Arc<N>`, where `N` may be a concrete
/// notification type or an interface trait object. Handlers recover the
/// typed value with [`get`](Self::get).
pub struct NotificationView {
    ty: NotificationType,
    value: Box<dyn Any + Send + Sync>,
}

impl NotificationView {
    /// Wraps `value` as a view of `N`.
    pub fn new<N: ?Sized + Send + Sync + 'static>(value: Arc<N>) -> Self {
        Self {
            ty: NotificationType::of::<N>(),
            value: Box::new(value),
        }
    }

    /// Returns the type this view presents.
    pub fn notification_type(&self) -> NotificationType {
        self.ty
    }

    /// Returns the viewed value as `Arc<N>`, or `None` if this view is not a
    /// view of `N`.
    pub fn get<N: ?Sized + Send + Sync + 'static>(&self) -> Option<&Arc<N>> {
        self.value.downcast_ref::<Arc<N>>()
    }
}

impl fmt::Debug for NotificationView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationView")
            .field("type", &self.ty)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_notification_type_identity() {
        let a = NotificationType::of::<Tick>();
        let b = NotificationType::of::<Tick>();
        assert_eq!(a, b);
        assert_ne!(a, NotificationType::of::<Clock>());
        assert!(a.name().ends_with("Tick"));
    }

    #[test]
    fn test_view_as_interface() {
        let notification = Arc::new(tick(42));
        let view = notification
            .view(NotificationType::of::<dyn TimerEvent>())
            .expect("Tick implements TimerEvent");

        assert!(view.notification_type().is::<dyn TimerEvent>());
        let timer = view.get::<dyn TimerEvent>().expect("view holds dyn TimerEvent");
        assert_eq!(timer.elapsed_ms(), 42);
        assert!(view.get::<Tick>().is_none());
    }

    #[test]
    fn test_view_of_unrelated_type() {
        let notification = Arc::new(tick(1));
        assert!(notification.view(NotificationType::of::<dyn Audited>()).is_none());
    }

    #[test]
    fn test_parent_is_independent_copy() {
        let notification = tick(3);
        let parent = notification.parent().expect("Tick has a parent");
        assert!(parent.notification_type().is::<Clock>());
        let clock = parent.as_any().downcast_ref::<Clock>().unwrap();
        assert_eq!(clock.started_at, 7);
        assert!(parent.parent().is_none());
    }
}
