//! The handler chain: an ordered list of [`EventHandler`]s run until one of
//! them marks the event failed.
//!
//! The same chain convention carries ordinary traffic and lifecycle
//! notifications, so the session loops never special-case errors: they hand
//! an event to the chain and look at its result.

use std::fmt;
use std::sync::Arc;

// ---

use async_trait::async_trait;

// ---

use super::{
    // ---
    DispatchHandler,
    Dispatcher,
    EncodeHandler,
    EnqueueHandler,
    MsgLogHandler,
    ReadPacketHandler,
    SessionEvent,
};

// ---------------------------------------------------------------------------
// EventHandler
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventHandler: Send + Sync {
    // ---
    /// Process `ev`. Set a non-`Ok` result to stop the rest of the chain.
    async fn call(&self, ev: &mut SessionEvent);
}

// ---

/// Adapter turning a closure into an [`EventHandler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&mut SessionEvent) + Send + Sync,
{
    async fn call(&self, ev: &mut SessionEvent) {
        (self.0)(ev)
    }
}

/// Wrap a synchronous closure as a chain handler.
///
/// Handy for injecting small steps into a chain passed to
/// [`Session::raw_send`](super::Session::raw_send) or
/// [`Session::raw_post`](super::Session::raw_post).
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&mut SessionEvent) + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

// ---------------------------------------------------------------------------
// HandlerChain
// ---------------------------------------------------------------------------

/// Immutable, cheap-clone ordered list of handlers.
#[derive(Clone)]
pub struct HandlerChain {
    // ---
    handlers: Arc<[Arc<dyn EventHandler>]>,
}

// ---

impl HandlerChain {
    // ---
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    // ---

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    // ---

    /// A new chain with `handler` appended.
    pub fn with(&self, handler: Arc<dyn EventHandler>) -> Self {
        // ---
        let mut handlers: Vec<_> = self.handlers.iter().cloned().collect();
        handlers.push(handler);
        Self::new(handlers)
    }

    // ---

    /// Run every handler in order, stopping after the first one that leaves
    /// a non-`Ok` result on `ev`.
    pub async fn call(&self, ev: &mut SessionEvent) {
        // ---
        for handler in self.handlers.iter() {
            handler.call(ev).await;
            if !ev.result().is_ok() {
                break;
            }
        }
    }
}

// ---

impl Default for HandlerChain {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerChain({} handlers)", self.handlers.len())
    }
}

// ---------------------------------------------------------------------------
// Stock chains
// ---------------------------------------------------------------------------

/// Read → (message log) → dispatch.
pub fn build_recv_chain(message_log: bool, dispatcher: Arc<Dispatcher>) -> HandlerChain {
    // ---
    let mut handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(ReadPacketHandler)];
    if message_log {
        handlers.push(Arc::new(MsgLogHandler));
    }
    handlers.push(Arc::new(DispatchHandler::new(dispatcher)));
    HandlerChain::new(handlers)
}

// ---

/// Encode → (message log) → enqueue.
pub fn build_send_chain(message_log: bool) -> HandlerChain {
    // ---
    let mut handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(EncodeHandler)];
    if message_log {
        handlers.push(Arc::new(MsgLogHandler));
    }
    handlers.push(Arc::new(EnqueueHandler));
    HandlerChain::new(handlers)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::atomic::{AtomicUsize, Ordering};

    use strand_domain::ResultCode;

    use super::*;
    use crate::EventKind;

    fn counter(hits: &Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        let hits = Arc::clone(hits);
        handler_fn(move |_ev| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    // ---

    #[tokio::test]
    async fn chain_runs_handlers_in_order() {
        // ---
        let chain = HandlerChain::new(vec![
            handler_fn(|ev| ev.data.push(1)),
            handler_fn(|ev| ev.data.push(2)),
            handler_fn(|ev| ev.data.push(3)),
        ]);

        let mut ev = SessionEvent::new(EventKind::Post, None);
        chain.call(&mut ev).await;
        assert_eq!(ev.data, vec![1, 2, 3]);
    }

    // ---

    #[tokio::test]
    async fn failed_result_short_circuits() {
        // ---
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));

        let chain = HandlerChain::new(vec![
            counter(&before),
            handler_fn(|ev| ev.set_result(ResultCode::CodecError)),
            counter(&after),
        ]);

        let mut ev = SessionEvent::new(EventKind::Send, None);
        chain.call(&mut ev).await;

        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 0, "handler after failure must not run");
        assert_eq!(ev.result(), ResultCode::CodecError);
    }

    // ---

    #[tokio::test]
    async fn with_appends_without_touching_original() {
        // ---
        let hits = Arc::new(AtomicUsize::new(0));
        let base = HandlerChain::new(vec![counter(&hits)]);
        let extended = base.with(counter(&hits));

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);

        let mut ev = SessionEvent::new(EventKind::Post, None);
        extended.call(&mut ev).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stock_send_chain_shape() {
        assert_eq!(build_send_chain(false).len(), 2);
        assert_eq!(build_send_chain(true).len(), 3);
    }
}
