//! [`Dispatcher`]: routes events to application callbacks by message id.
//!
//! Callbacks never run on a session task. [`Dispatcher::call`] posts one job
//! per event to the peer's [`EventQueue`]; inside that job the callbacks
//! registered for the event's id run in registration order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

// ---

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

// ---

use super::{EventHandler, EventKind, EventQueue, SessionEvent};

// ---

type Callback = Arc<dyn Fn(SessionEvent) -> BoxFuture<'static, ()> + Send + Sync>;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    // ---
    queue: EventQueue,
    routes: RwLock<HashMap<u32, Vec<Callback>>>,
}

// ---

impl Dispatcher {
    // ---
    pub fn new(queue: EventQueue) -> Self {
        // ---
        Self {
            queue,
            routes: RwLock::new(HashMap::new()),
        }
    }

    // ---

    /// Register `callback` for message id `msg_id`.
    ///
    /// Lifecycle payloads register by their reserved ids, e.g.
    /// `SessionClosed::ID`.
    pub fn register<F, Fut>(&self, msg_id: u32, callback: F)
    where
        F: Fn(SessionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // ---
        let cb: Callback = Arc::new(move |ev| callback(ev).boxed());
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(msg_id)
            .or_default()
            .push(cb);
    }

    // ---

    /// Drop every callback for `msg_id`.
    pub fn unregister(&self, msg_id: u32) {
        // ---
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&msg_id);
    }

    // ---

    /// Number of callbacks registered for `msg_id`.
    pub fn count(&self, msg_id: u32) -> usize {
        // ---
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&msg_id)
            .map_or(0, Vec::len)
    }

    // ---

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    // ---

    /// Hand `ev` to the event queue. Events with no registered callback are
    /// dropped here, before they cost a queue hop.
    pub fn call(&self, ev: SessionEvent) {
        // ---
        let callbacks = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ev.msg_id)
            .cloned();

        let Some(callbacks) = callbacks else {
            tracing::trace!(msg_id = ev.msg_id, kind = ?ev.kind, "no callback registered");
            return;
        };

        let posted = self.queue.post(async move {
            for cb in callbacks {
                cb(ev.clone()).await;
            }
        });

        if !posted {
            tracing::debug!("event queue stopped; dropping dispatched event");
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchHandler
// ---------------------------------------------------------------------------

/// Last link of the stock receive chain: forwards every non-`Send` event
/// to the [`Dispatcher`].
pub struct DispatchHandler {
    // ---
    dispatcher: Arc<Dispatcher>,
}

// ---

impl DispatchHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

// ---

#[async_trait]
impl EventHandler for DispatchHandler {
    // ---
    async fn call(&self, ev: &mut SessionEvent) {
        // ---
        if ev.kind == EventKind::Send {
            return;
        }
        self.dispatcher.call(ev.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    // ---

    #[tokio::test]
    async fn callbacks_run_on_queue_in_registration_order() {
        // ---
        let queue = EventQueue::spawn();
        let dispatcher = Dispatcher::new(queue.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            dispatcher.register(5, move |ev| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push((tag, ev.msg_id));
                }
            });
        }
        assert_eq!(dispatcher.count(5), 2);

        let mut ev = SessionEvent::new(EventKind::Post, None);
        ev.msg_id = 5;
        dispatcher.call(ev);

        // Unrouted ids are ignored.
        let mut other = SessionEvent::new(EventKind::Post, None);
        other.msg_id = 6;
        dispatcher.call(other);

        queue.stop(0);
        tokio::time::timeout(Duration::from_secs(5), queue.wait())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec![("first", 5), ("second", 5)]);
    }

    // ---

    #[test]
    fn unregister_removes_all_callbacks() {
        // ---
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = rt.enter();

        let dispatcher = Dispatcher::new(EventQueue::spawn());
        dispatcher.register(1, |_ev| async {});
        dispatcher.register(1, |_ev| async {});
        assert_eq!(dispatcher.count(1), 2);

        dispatcher.unregister(1);
        assert_eq!(dispatcher.count(1), 0);
    }
}
