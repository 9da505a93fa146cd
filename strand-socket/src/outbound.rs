//! [`OutboundQueue`]: concurrent producers, single batching consumer.
//!
//! Any number of tasks call [`OutboundQueue::add`]; exactly one consumer
//! (the session's send loop) calls [`begin_pick`](OutboundQueue::begin_pick)
//! / [`end_pick`](OutboundQueue::end_pick) to take everything queued so far
//! as one batch. The swap happens under a short mutex section, so producers
//! are never blocked behind socket I/O.
//!
//! A `None` slot is the close sentinel. It is enqueued at most once, by
//! [`close`](OutboundQueue::close). After it, `add` is rejected with
//! [`StrandError::SessionClosed`], so every accepted request is ahead of the
//! sentinel in drain order.

use std::sync::{Mutex, PoisonError};

// ---

use tokio::sync::Notify;

// ---

use strand_domain::{Result, StrandError};

// ---------------------------------------------------------------------------
// OutboundRequest
// ---------------------------------------------------------------------------

/// One encoded message waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    // ---
    pub msg_id: u32,
    pub data: Vec<u8>,
}

/// Queue slot. `None` is the close sentinel.
pub type OutboundSlot = Option<OutboundRequest>;

// ---------------------------------------------------------------------------
// OutboundQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    // ---
    /// Pending slots in arrival order.
    list: Vec<OutboundSlot>,

    /// Set once the sentinel has been enqueued.
    closed: bool,

    /// Set between `begin_pick` and `end_pick`; there is only one consumer.
    picking: bool,
}

// ---

#[derive(Debug, Default)]
pub struct OutboundQueue {
    // ---
    inner: Mutex<Inner>,
    ready: Notify,
}

// ---

impl OutboundQueue {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    // ---

    /// Append `req` to the tail.
    ///
    /// Returns [`StrandError::SessionClosed`] once the sentinel is queued.
    /// Never blocks beyond the internal mutex.
    pub fn add(&self, req: OutboundRequest) -> Result<()> {
        // ---
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(StrandError::SessionClosed);
            }
            inner.list.push(Some(req));
        }
        self.ready.notify_one();
        Ok(())
    }

    // ---

    /// Enqueue the close sentinel.
    ///
    /// Returns `true` for the call that actually enqueued it; later calls are
    /// no-ops and return `false`.
    pub fn close(&self) -> bool {
        // ---
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            inner.closed = true;
            inner.list.push(None);
        }
        self.ready.notify_one();
        true
    }

    // ---

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Slots waiting for the next pick, sentinel included.
    pub fn len(&self) -> usize {
        self.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---

    /// Wait until at least one slot is queued, then move every queued slot
    /// into `batch` in arrival order.
    ///
    /// `batch` is cleared first; its allocation is swapped into the queue so
    /// the two buffers ping-pong between picks. Slots added while the caller
    /// processes the batch show up on the next pick.
    pub async fn begin_pick(&self, batch: &mut Vec<OutboundSlot>) {
        // ---
        batch.clear();
        loop {
            let notified = self.ready.notified();
            {
                let mut inner = self.lock();
                if !inner.list.is_empty() {
                    debug_assert!(!inner.picking, "OutboundQueue has a single consumer");
                    inner.picking = true;
                    std::mem::swap(&mut inner.list, batch);
                    return;
                }
            }
            notified.await;
        }
    }

    // ---

    /// Finish a pick started with [`begin_pick`](Self::begin_pick).
    ///
    /// Drops whatever the consumer left in `batch` (the remainder after a
    /// sentinel) and keeps its capacity for the next pick.
    pub fn end_pick(&self, batch: &mut Vec<OutboundSlot>) {
        // ---
        batch.clear();
        self.lock().picking = false;
    }

    // ---

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
