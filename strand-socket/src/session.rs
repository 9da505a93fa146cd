//! [`Session`]: one live connection.
//!
//! # Tasks
//!
//! [`Session::run`] spawns three tokio tasks:
//!
//! - **receive**: pushes `Recv` events down the peer's receive chain until a
//!   handler leaves a non-`Ok` result (normally the read handler on a stream
//!   error). On exit it closes the outbound queue, unless the send task has
//!   already started its own shutdown.
//! - **send**: drains the [`OutboundQueue`] batch by batch: write every
//!   request, then flush. The close sentinel, a write error, or a flush
//!   error ends it. On exit it clears the write-notify flag and closes the
//!   stream, which fails the receive task's pending read.
//! - **coordinator**: joins both, marks the session `Closed`, runs the
//!   close hook once, then resolves [`Session::closed`].
//!
//! Either direction failing therefore drives the other one down: a read
//! failure closes the queue, a write failure closes the stream.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---

use tokio::sync::watch;

// ---

use strand_domain::{FramedStream, FramedStreamPtr, MessagePtr, Result, StrandError};

// ---

use super::{EventKind, HandlerChain, OutboundQueue, OutboundSlot, Peer, SessionEvent};

// ---

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    // ---
    /// Both loops running (or not yet started); sends are accepted.
    Active = 0,

    /// Shutdown has begun; sends are rejected.
    Closing = 1,

    /// Both loops have exited and the close hook has run.
    Closed = 2,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Active,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    // ---
    id: u64,
    peer: Arc<Peer>,
    stream: FramedStreamPtr,
    outbound: OutboundQueue,

    /// Cleared by the send task before it closes the stream. While set, the
    /// receive task is responsible for closing the queue on exit.
    notify_write: AtomicBool,

    state: AtomicU8,
    started: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

// ---

impl Session {
    // ---
    /// Wrap `stream` in a new session. The peer's max packet size is pushed
    /// down to the stream. Nothing runs until [`run`](Self::run).
    pub fn new(stream: FramedStreamPtr, peer: Arc<Peer>) -> Arc<Self> {
        // ---
        stream.set_max_packet_size(peer.config().max_packet_size);

        let (closed_tx, _) = watch::channel(false);

        Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            stream,
            outbound: OutboundQueue::new(),
            notify_write: AtomicBool::new(true),
            state: AtomicU8::new(SessionState::Active as u8),
            started: AtomicBool::new(false),
            closed_tx,
        })
    }

    // ---

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    pub fn stream(&self) -> &dyn FramedStream {
        self.stream.as_ref()
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Encode and queue `msg` through the peer's send chain.
    ///
    /// Returns once the request is queued, not once it is written. After
    /// [`close`](Self::close) this fails with
    /// `SendRejected(ResultCode::SessionClosed)`.
    pub async fn send(self: &Arc<Self>, msg: MessagePtr) -> Result<()> {
        self.raw_send(None, msg).await
    }

    // ---

    /// [`send`](Self::send) through `chain` instead of the peer's send chain.
    pub async fn raw_send(self: &Arc<Self>, chain: Option<&HandlerChain>, msg: MessagePtr) -> Result<()> {
        // ---
        let cfg;
        let chain = match chain {
            Some(chain) => chain,
            None => {
                cfg = self.peer.config();
                &cfg.send_chain
            }
        };

        let mut ev = SessionEvent::new(EventKind::Send, Some(Arc::clone(self))).with_message(msg);
        chain.call(&mut ev).await;

        match ev.result() {
            code if code.is_ok() => Ok(()),
            code => Err(StrandError::SendRejected(code)),
        }
    }

    // ---

    /// Deliver `msg` to the application as a local event, without touching
    /// the network. Runs the peer's receive chain with a `Post` event, which
    /// the read handler ignores and the dispatch handler forwards to the
    /// event queue.
    pub async fn post(self: &Arc<Self>, msg: MessagePtr) {
        self.raw_post(None, msg).await
    }

    // ---

    /// [`post`](Self::post) through `chain` instead of the peer's receive chain.
    pub async fn raw_post(self: &Arc<Self>, chain: Option<&HandlerChain>, msg: MessagePtr) {
        // ---
        let cfg;
        let chain = match chain {
            Some(chain) => chain,
            None => {
                cfg = self.peer.config();
                &cfg.recv_chain
            }
        };

        let mut ev = SessionEvent::new(EventKind::Post, Some(Arc::clone(self))).with_message(msg);
        chain.call(&mut ev).await;
    }

    // ---

    /// Begin shutdown: everything already queued is written, then the send
    /// task closes the stream. Idempotent.
    pub fn close(&self) {
        // ---
        self.begin_closing();
        if self.outbound.close() {
            tracing::debug!(session = self.id, "close requested");
        }
    }

    // ---

    /// Resolves once both tasks have exited and the close hook has run.
    pub async fn closed(&self) {
        // ---
        let mut rx = self.closed_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    /// Start the receive, send and coordinator tasks. `on_close` runs exactly
    /// once, after both I/O tasks have finished. A second call is ignored.
    pub fn run<F>(self: &Arc<Self>, on_close: F)
    where
        F: FnOnce(&Arc<Session>) + Send + 'static,
    {
        // ---
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!(session = self.id, "session already running");
            return;
        }

        tracing::debug!(session = self.id, peer = %self.peer.name_or_address(), "session start");

        let recv = tokio::spawn(Arc::clone(self).recv_loop());
        let send = tokio::spawn(Arc::clone(self).send_loop());

        let ses = Arc::clone(self);
        tokio::spawn(async move {
            // ---
            let (recv_res, send_res) = tokio::join!(recv, send);
            if let Err(e) = recv_res {
                tracing::error!(session = ses.id, "receive task failed: {e}");
            }
            if let Err(e) = send_res {
                tracing::error!(session = ses.id, "send task failed: {e}");
            }

            ses.state.store(SessionState::Closed as u8, Ordering::Release);
            tracing::debug!(session = ses.id, "session closed");

            on_close(&ses);
            ses.closed_tx.send_replace(true);
        });
    }

    // ---

    fn begin_closing(&self) {
        // ---
        let _ = self.state.compare_exchange(
            SessionState::Active as u8,
            SessionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    // ---

    async fn recv_loop(self: Arc<Self>) {
        // ---
        loop {
            let chain = self.peer.config().recv_chain.clone();
            let mut ev = SessionEvent::new(EventKind::Recv, Some(Arc::clone(&self)));

            chain.call(&mut ev).await;

            if !ev.result().is_ok() {
                break;
            }
        }

        self.begin_closing();

        if self.notify_write.load(Ordering::Acquire) {
            self.outbound.close();
        }

        tracing::trace!(session = self.id, "receive task exit");
    }

    // ---

    async fn send_loop(self: Arc<Self>) {
        // ---
        let mut batch: Vec<OutboundSlot> = Vec::new();

        loop {
            self.outbound.begin_pick(&mut batch).await;

            let write_timeout = self.peer.config().write_timeout;
            let outcome = with_deadline(write_timeout, write_batch(self.stream(), &batch)).await;

            self.outbound.end_pick(&mut batch);

            match outcome {
                Ok(false) => {}
                Ok(true) => break,
                Err(e) => {
                    tracing::debug!(session = self.id, "write failed: {e}");
                    break;
                }
            }
        }

        self.notify_write.store(false, Ordering::Release);
        self.begin_closing();
        self.outbound.close();
        self.stream.close().await;

        tracing::trace!(session = self.id, "send task exit");
    }
}

// ---

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pending", &self.outbound.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write every request in `batch` up to the sentinel, then flush.
///
/// A write error stops the batch, but whatever was written before it is
/// still flushed. Returns `true` if the sentinel was seen.
async fn write_batch(stream: &dyn FramedStream, batch: &[OutboundSlot]) -> Result<bool> {
    // ---
    let mut exiting = false;
    let mut write_err = None;

    for slot in batch {
        match slot {
            Some(req) => {
                if let Err(e) = stream.write(req.msg_id, &req.data).await {
                    write_err = Some(e);
                    break;
                }
            }
            None => {
                exiting = true;
                break;
            }
        }
    }

    let flushed = stream.flush().await;

    if let Some(e) = write_err {
        return Err(e);
    }
    flushed?;
    Ok(exiting)
}

// ---

/// Run `fut` under `deadline`; a zero deadline waits forever.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    // ---
    if deadline.is_zero() {
        return fut.await;
    }

    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(StrandError::Timeout),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn zero_deadline_waits() {
        // ---
        let res = with_deadline(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(5)
        })
        .await;
        assert_eq!(res.unwrap(), 5);
    }

    #[tokio::test]
    async fn expired_deadline_is_timeout() {
        // ---
        let res: Result<()> = with_deadline(Duration::from_millis(10), std::future::pending()).await;
        assert!(matches!(res, Err(StrandError::Timeout)));
    }

    #[test]
    fn state_round_trips_through_u8() {
        for s in [SessionState::Active, SessionState::Closing, SessionState::Closed] {
            assert_eq!(SessionState::from_u8(s as u8), s);
        }
    }
}
