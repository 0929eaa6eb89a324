//! Dispatch-type-set computation.
//!
//! A notification is delivered to handlers of its concrete type, every
//! ancestor reachable through [`Notification::parent`], and every interface
//! implemented along that chain, each exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use crate::notification::{Notification, NotificationType, NotificationView};

/// One member of a dispatch-type-set, paired with the value it is viewed from.
///
/// For ancestor types the source is the ancestor copy returned by `parent()`;
/// for interfaces it is the level of the chain that declared the interface.
#[derive(Clone)]
pub struct DispatchTarget {
    ty: NotificationType,
    source: Arc<dyn Notification>,
}

impl DispatchTarget {
    pub fn notification_type(&self) -> NotificationType {
        self.ty
    }

    /// Produces the view handlers of this target receive.
    pub fn view(&self) -> Option<NotificationView> {
        Arc::clone(&self.source).view(self.ty)
    }
}

impl std::fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTarget")
            .field("type", &self.ty)
            .field("source", &self.source.notification_type())
            .finish()
    }
}

/// The ordered, de-duplicated dispatch-type-set of one notification.
///
/// Order: the concrete type, ancestors nearest first, then interfaces in
/// declaration order (the concrete type's first, then each ancestor's).
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    targets: Vec<DispatchTarget>,
}

impl DispatchPlan {
    pub fn for_notification(notification: Arc<dyn Notification>) -> Self {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();

        let mut level = Some(notification);
        while let Some(current) = level {
            // A parent reporting an already visited type would loop forever.
            if !seen.insert(current.notification_type()) {
                break;
            }
            level = current.parent();
            chain.push(current);
        }

        let mut targets: Vec<DispatchTarget> = chain
            .iter()
            .map(|source| DispatchTarget {
                ty: source.notification_type(),
                source: Arc::clone(source),
            })
            .collect();

        for source in &chain {
            for ty in source.interfaces() {
                if seen.insert(ty) {
                    targets.push(DispatchTarget {
                        ty,
                        source: Arc::clone(source),
                    });
                }
            }
        }

        Self { targets }
    }

    pub fn targets(&self) -> &[DispatchTarget] {
        &self.targets
    }

    pub fn types(&self) -> Vec<NotificationType> {
        self.targets.iter().map(|t| t.ty).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl IntoIterator for DispatchPlan {
    type Item = DispatchTarget;
    type IntoIter = std::vec::IntoIter<DispatchTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.into_iter()
    }
}

/// Returns the dispatch-type-set of `notification`.
pub fn dispatch_type_set(notification: Arc<dyn Notification>) -> Vec<NotificationType> {
    DispatchPlan::for_notification(notification).types()
}
