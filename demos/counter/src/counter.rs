//! A scoped counter: each `Request` bumps the count and announces it.

use std::sync::atomic::{AtomicU32, Ordering};

use herald::prelude::*;

#[derive(Debug, Clone, Notification)]
pub struct Request;

#[derive(Debug, Clone, Notification)]
pub struct Changed {
    pub current_count: u32,
}

pub struct Counter {
    dispatcher: Dispatcher,
    count: AtomicU32,
}

impl Counter {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            count: AtomicU32::new(0),
        }
    }
}

impl NotificationHandler<Request> for Counter {
    fn handle(&self, _: &Request) {
        let current_count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.dispatcher.dispatch(Changed { current_count });
    }
}

impl Handler for Counter {
    fn declare(capabilities: &mut Capabilities<Self>) {
        capabilities.handles::<Request>();
    }
}
