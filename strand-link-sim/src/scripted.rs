//! [`ScriptedStream`]: a one-sided stream driven by a script.
//!
//! Reads replay a fixed list of frames and then either fail with a chosen
//! I/O error or block until the stream is closed. Every write, flush and
//! close is appended to an operation log so tests can assert exactly what
//! a session pushed at the transport and in what order.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ---

use async_trait::async_trait;
use tokio::sync::watch;

// ---

use strand_domain::{Frame, FramedStream, Result, StrandError};

// ---

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Script types
// ---------------------------------------------------------------------------

/// What `read` does once the scripted frames run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
    // ---
    /// Fail every further read with an I/O error of this kind.
    Fail(io::ErrorKind),

    /// Block until the stream is closed, then fail with `StreamClosed`.
    Hang,
}

/// One recorded transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOp {
    // ---
    Write { msg_id: u32, data: Vec<u8> },
    Flush,
    Close,
}

// ---------------------------------------------------------------------------
// ScriptedStream
// ---------------------------------------------------------------------------

pub struct ScriptedStream {
    // ---
    inbound: Mutex<VecDeque<Frame>>,
    end: ScriptEnd,

    ops: Mutex<Vec<StreamOp>>,

    fail_write: AtomicBool,
    fail_flush: AtomicBool,

    /// Writes left before every write fails. `usize::MAX` = no limit.
    write_budget: AtomicUsize,

    closed_tx: watch::Sender<bool>,
    close_count: AtomicUsize,
    max_packet_size: AtomicUsize,
}

// ---

impl ScriptedStream {
    // ---
    pub fn new(frames: Vec<Frame>, end: ScriptEnd) -> Self {
        // ---
        let (closed_tx, _) = watch::channel(false);
        Self {
            inbound: Mutex::new(frames.into()),
            end,
            ops: Mutex::new(Vec::new()),
            fail_write: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
            write_budget: AtomicUsize::new(usize::MAX),
            closed_tx,
            close_count: AtomicUsize::new(0),
            max_packet_size: AtomicUsize::new(0),
        }
    }

    /// Replay `frames`, then fail reads with `kind`.
    pub fn failing(frames: Vec<Frame>, kind: io::ErrorKind) -> Self {
        Self::new(frames, ScriptEnd::Fail(kind))
    }

    /// Replay `frames`, then block reads until closed.
    pub fn hanging(frames: Vec<Frame>) -> Self {
        Self::new(frames, ScriptEnd::Hang)
    }

    // --- fault injection ---------------------------------------------------

    /// Make every subsequent `write` fail with `BrokenPipe`.
    pub fn set_fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more writes succeed, then fail every write after them.
    pub fn fail_writes_after(&self, n: usize) {
        self.write_budget.store(n, Ordering::SeqCst);
    }

    /// Make every subsequent `flush` fail with `BrokenPipe`.
    pub fn set_fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    // --- inspection --------------------------------------------------------

    /// Copy of the operation log.
    pub fn ops(&self) -> Vec<StreamOp> {
        lock(&self.ops).clone()
    }

    /// Successful writes, in order.
    pub fn writes(&self) -> Vec<(u32, Vec<u8>)> {
        // ---
        lock(&self.ops)
            .iter()
            .filter_map(|op| match op {
                StreamOp::Write { msg_id, data } => Some((*msg_id, data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.ops).iter().filter(|op| **op == StreamOp::Flush).count()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Scripted frames not yet read.
    pub fn remaining(&self) -> usize {
        lock(&self.inbound).len()
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size.load(Ordering::SeqCst)
    }

    // ---

    fn broken_pipe(what: &str) -> StrandError {
        io::Error::new(io::ErrorKind::BrokenPipe, format!("scripted {what} failure")).into()
    }
}

// ---

#[async_trait]
impl FramedStream for ScriptedStream {
    // ---
    async fn read(&self) -> Result<Frame> {
        // ---
        let mut closed = self.closed_tx.subscribe();
        if *closed.borrow() {
            return Err(StrandError::StreamClosed);
        }

        let next = lock(&self.inbound).pop_front();
        if let Some(frame) = next {
            return Ok(frame);
        }

        match self.end {
            ScriptEnd::Fail(kind) => Err(io::Error::new(kind, "scripted read failure").into()),
            ScriptEnd::Hang => {
                let _ = closed.wait_for(|c| *c).await;
                Err(StrandError::StreamClosed)
            }
        }
    }

    // ---

    async fn write(&self, msg_id: u32, data: &[u8]) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(StrandError::StreamClosed);
        }
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(Self::broken_pipe("write"));
        }
        let spent = self
            .write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            });
        if spent.is_err() {
            return Err(Self::broken_pipe("write"));
        }
        lock(&self.ops).push(StreamOp::Write {
            msg_id,
            data: data.to_vec(),
        });
        Ok(())
    }

    // ---

    async fn flush(&self) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(StrandError::StreamClosed);
        }
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Self::broken_pipe("flush"));
        }
        lock(&self.ops).push(StreamOp::Flush);
        Ok(())
    }

    // ---

    async fn close(&self) {
        // ---
        self.close_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.ops).push(StreamOp::Close);
        self.closed_tx.send_replace(true);
    }

    // ---

    fn set_max_packet_size(&self, size: usize) {
        self.max_packet_size.store(size, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn replays_frames_then_fails() {
        // ---
        let stream = ScriptedStream::failing(
            vec![Frame::new(1, b"a".to_vec()), Frame::new(2, b"b".to_vec())],
            io::ErrorKind::ConnectionReset,
        );

        assert_eq!(stream.read().await.unwrap().msg_id, 1);
        assert_eq!(stream.read().await.unwrap().msg_id, 2);
        assert!(matches!(stream.read().await, Err(StrandError::Io(e)) if e.kind() == io::ErrorKind::ConnectionReset));
        assert_eq!(stream.remaining(), 0);
    }

    // ---

    #[tokio::test]
    async fn hang_ends_on_close() {
        // ---
        let stream = Arc::new(ScriptedStream::hanging(vec![]));
        let reader = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.read().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!reader.is_finished());

        stream.close().await;
        let res = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(res, Err(StrandError::StreamClosed)));
        assert_eq!(stream.close_count(), 1);
    }

    // ---

    #[tokio::test]
    async fn records_ops_and_injects_failures() {
        // ---
        let stream = ScriptedStream::hanging(vec![]);

        stream.write(7, b"x").await.unwrap();
        stream.flush().await.unwrap();

        stream.set_fail_write(true);
        assert!(stream.write(8, b"y").await.is_err());
        stream.set_fail_write(false);

        stream.set_fail_flush(true);
        assert!(stream.flush().await.is_err());

        stream.close().await;
        assert!(stream.write(9, b"z").await.is_err());

        assert_eq!(
            stream.ops(),
            vec![
                StreamOp::Write { msg_id: 7, data: b"x".to_vec() },
                StreamOp::Flush,
                StreamOp::Close,
            ]
        );
        assert_eq!(stream.writes(), vec![(7, b"x".to_vec())]);
        assert_eq!(stream.flush_count(), 1);
    }

    // ---

    #[tokio::test]
    async fn write_budget_runs_out() {
        // ---
        let stream = ScriptedStream::hanging(vec![]);
        stream.fail_writes_after(2);

        assert!(stream.write(1, b"a").await.is_ok());
        assert!(stream.write(2, b"b").await.is_ok());
        assert!(stream.write(3, b"c").await.is_err());
        assert!(stream.write(4, b"d").await.is_err());
        assert!(stream.flush().await.is_ok(), "flush is unaffected");

        assert_eq!(stream.writes().len(), 2);
    }
}
