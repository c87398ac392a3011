//! Failure-event bus (C8, §4.7).
//!
//! Delivery is single-threaded, driven entirely from the Gossiper's tick,
//! in subscriber-registration order (§5 ordering guarantees). Subscribers
//! must not call back into the Gossiper during a notification — this is
//! enforced by convention (the bus holds no reference to the Gossiper,
//! only to `Endpoint`/`EndpointState` values passed by value or by
//! `Arc`), not by a runtime guard.

use std::sync::Arc;

use crate::endpoint::{Endpoint, StateEntry};

/// Capability set a component can subscribe to (§4.7). Every method has a
/// default no-op body so a subscriber only overrides what it cares about,
/// matching the teacher's handler-registry idiom of "implement only what
/// you use".
pub trait Subscriber: Send + Sync {
    fn on_join(&self, _endpoint: Endpoint) {}
    fn on_alive(&self, _endpoint: Endpoint) {}
    fn on_dead(&self, _endpoint: Endpoint) {}
    fn on_remove(&self, _endpoint: Endpoint) {}
    fn before_change(&self, _endpoint: Endpoint, _entry: &StateEntry) {}
    fn on_change(&self, _endpoint: Endpoint, _entry: &StateEntry) {}
    fn on_restart(&self, _endpoint: Endpoint) {}
}

/// Registration-ordered list of subscribers, fanned out to synchronously
/// from the gossip tick.
#[derive(Default, Clone)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn register(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn fire_on_join(&self, endpoint: Endpoint) {
        for s in &self.subscribers {
            s.on_join(endpoint);
        }
    }

    pub fn fire_on_alive(&self, endpoint: Endpoint) {
        for s in &self.subscribers {
            s.on_alive(endpoint);
        }
    }

    pub fn fire_on_dead(&self, endpoint: Endpoint) {
        for s in &self.subscribers {
            s.on_dead(endpoint);
        }
    }

    pub fn fire_on_remove(&self, endpoint: Endpoint) {
        for s in &self.subscribers {
            s.on_remove(endpoint);
        }
    }

    pub fn fire_before_change(&self, endpoint: Endpoint, entry: &StateEntry) {
        for s in &self.subscribers {
            s.before_change(endpoint, entry);
        }
    }

    pub fn fire_on_change(&self, endpoint: Endpoint, entry: &StateEntry) {
        for s in &self.subscribers {
            s.on_change(endpoint, entry);
        }
    }

    pub fn fire_on_restart(&self, endpoint: Endpoint) {
        for s in &self.subscribers {
            s.on_restart(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::SocketAddr;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl Subscriber for Recorder {
        fn on_join(&self, _endpoint: Endpoint) {
            self.events.lock().push("join");
        }
        fn on_dead(&self, _endpoint: Endpoint) {
            self.events.lock().push("dead");
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let mut bus = EventBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.register(first.clone());
        bus.register(second.clone());

        let ep = Endpoint::new("127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        bus.fire_on_join(ep);
        bus.fire_on_dead(ep);

        assert_eq!(*first.events.lock(), vec!["join", "dead"]);
        assert_eq!(*second.events.lock(), vec!["join", "dead"]);
    }
}
