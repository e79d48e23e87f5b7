//! Synchronous, type-dispatched publish/subscribe bus.
//!
//! Producers publish concrete event structs; consumers register one handler
//! per event type. Dispatch is keyed by [`TypeId`], so subscribing and
//! publishing stay strongly typed without a central event enum.
//!
//! A single internal mutex serializes publishes and is held across handler
//! invocation: handlers observe events fully serialized and need no locking
//! of their own, but they must be non-blocking and must not publish back
//! into the same bus on the same call stack (that would deadlock).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Mutex;

type HandlerList = Vec<Box<dyn Any + Send>>;

/// Type-dispatched synchronous event bus.
///
/// # Examples
///
/// ```rust
/// use optipack_cli::core::bus::EventBus;
/// use std::sync::{Arc, Mutex};
///
/// #[derive(Debug)]
/// struct Ping(u32);
///
/// let bus = EventBus::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// bus.subscribe(move |e: &Ping| sink.lock().unwrap().push(e.0));
/// bus.publish(&Ping(7));
/// assert_eq!(*seen.lock().unwrap(), vec![7]);
/// ```
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<TypeId, HandlerList>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for events of type `E`.
    ///
    /// Multiple handlers per type are allowed; they run in subscription
    /// order on the publisher's thread.
    pub fn subscribe<E, F>(&self, handler: F)
    where
        E: Any + Send,
        F: Fn(&E) + Send + 'static,
    {
        let boxed: Box<dyn Fn(&E) + Send> = Box::new(handler);
        let mut map = self.subscribers.lock().unwrap();
        map.entry(TypeId::of::<E>()).or_default().push(Box::new(boxed));
    }

    /// Publish an event to every handler registered for its type.
    ///
    /// Runs synchronously on the caller's thread while holding the bus
    /// lock. A handler panic propagates to the publisher.
    pub fn publish<E: Any + Send>(&self, event: &E) {
        let map = self.subscribers.lock().unwrap();
        if let Some(handlers) = map.get(&TypeId::of::<E>()) {
            for handler in handlers {
                if let Some(f) = handler.downcast_ref::<Box<dyn Fn(&E) + Send>>() {
                    f(event);
                }
            }
        }
    }

    /// Number of handlers registered for event type `E`.
    pub fn handler_count<E: Any>(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&TypeId::of::<E>())
            .map_or(0, |v| v.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Started(&'static str);
    #[derive(Debug)]
    struct Finished(u64);

    #[test]
    fn test_dispatch_by_type() {
        let bus = EventBus::new();
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&started);
        bus.subscribe(move |_: &Started| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let f = Arc::clone(&finished);
        bus.subscribe(move |_: &Finished| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Started("a"));
        bus.publish(&Started("b"));
        bus.publish(&Finished(1));

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let sink = Arc::clone(&order);
            bus.subscribe(move |_: &Started| sink.lock().unwrap().push(tag));
        }

        bus.publish(&Started("x"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(&Finished(42));
        assert_eq!(bus.handler_count::<Finished>(), 0);
    }

    #[test]
    fn test_concurrent_publishes_are_serialized() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        bus.subscribe(move |_: &Finished| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let mut handles = Vec::new();
        for i in 0..8 {
            let bus = Arc::clone(&bus);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    bus.publish(&Finished(i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 800);
    }
}
