//! [`LinkSimStream`]: one end of an in-process framed link.
//!
//! Frames written on one end are buffered until `flush`, then pushed as a
//! batch onto an unbounded channel read by the other end. Loss and
//! duplication are decided per frame at flush time from a seeded
//! [`SmallRng`], so a given seed reproduces the same impairment pattern.
//!
//! Closing an end fails its own pending read, makes the other end's writes
//! fail with `BrokenPipe`, and lets the other end's reads drain what was
//! already delivered before they fail with `UnexpectedEof`.

use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ---

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};

// ---

use strand_domain::{Frame, FramedStream, Result, StrandError};

// ---

use super::LinkSimConfig;

// ---

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// LinkSimStream
// ---------------------------------------------------------------------------

pub struct LinkSimStream {
    // ---
    /// Outbound channel to the other end. Taken on close.
    tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,

    /// Written but not yet flushed.
    pending: Mutex<Vec<Frame>>,

    config: LinkSimConfig,
    rng: Mutex<SmallRng>,

    closed_tx: watch::Sender<bool>,
    peer_closed: watch::Receiver<bool>,

    max_packet_size: AtomicUsize,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

// ---

impl LinkSimStream {
    // ---
    /// Two connected ends sharing `config`. Each end gets its own RNG,
    /// derived from the seed when one is set.
    pub fn pair(config: LinkSimConfig) -> (Self, Self) {
        // ---
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let (a_closed, a_closed_rx) = watch::channel(false);
        let (b_closed, b_closed_rx) = watch::channel(false);

        let (a_rng, b_rng) = match config.seed {
            Some(seed) => (
                SmallRng::seed_from_u64(seed),
                SmallRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (SmallRng::from_entropy(), SmallRng::from_entropy()),
        };

        let a = Self::new(a_tx, a_rx, a_closed, b_closed_rx, config.clone(), a_rng);
        let b = Self::new(b_tx, b_rx, b_closed, a_closed_rx, config, b_rng);
        (a, b)
    }

    fn new(
        tx: mpsc::UnboundedSender<Frame>,
        rx: mpsc::UnboundedReceiver<Frame>,
        closed_tx: watch::Sender<bool>,
        peer_closed: watch::Receiver<bool>,
        config: LinkSimConfig,
        rng: SmallRng,
    ) -> Self {
        // ---
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            pending: Mutex::new(Vec::new()),
            config,
            rng: Mutex::new(rng),
            closed_tx,
            peer_closed,
            max_packet_size: AtomicUsize::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    // ---

    /// Frames handed to the other end, duplicates included.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames lost to the configured drop rate.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    // ---

    fn check_writable(&self) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(StrandError::StreamClosed);
        }
        if *self.peer_closed.borrow() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link-sim peer closed").into());
        }
        Ok(())
    }

    fn check_size(&self, size: usize) -> Result<()> {
        // ---
        let max = self.max_packet_size.load(Ordering::Relaxed);
        if max != 0 && size > max {
            return Err(StrandError::PacketTooLarge { size, max });
        }
        Ok(())
    }

    /// How many copies of one frame reach the other end: 0, 1 or 2.
    fn copies(&self) -> usize {
        // ---
        if self.config.is_perfect() {
            return 1;
        }
        let mut rng = lock(&self.rng);
        if rng.gen::<f64>() < self.config.drop_percent {
            0
        } else if rng.gen::<f64>() < self.config.dup_percent {
            2
        } else {
            1
        }
    }
}

// ---

#[async_trait]
impl FramedStream for LinkSimStream {
    // ---
    async fn read(&self) -> Result<Frame> {
        // ---
        let mut closed = self.closed_tx.subscribe();
        if *closed.borrow() {
            return Err(StrandError::StreamClosed);
        }

        let mut rx = self.rx.lock().await;

        let frame = tokio::select! {
            frame = rx.recv() => frame,
            _ = closed.wait_for(|c| *c) => return Err(StrandError::StreamClosed),
        };

        let frame = frame.ok_or_else(|| {
            StrandError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "link-sim peer closed"))
        })?;

        self.check_size(frame.data.len())?;
        Ok(frame)
    }

    // ---

    async fn write(&self, msg_id: u32, data: &[u8]) -> Result<()> {
        // ---
        self.check_writable()?;
        self.check_size(data.len())?;
        lock(&self.pending).push(Frame::new(msg_id, data));
        Ok(())
    }

    // ---

    async fn flush(&self) -> Result<()> {
        // ---
        self.check_writable()?;

        let batch = std::mem::take(&mut *lock(&self.pending));
        let tx = lock(&self.tx).clone().ok_or(StrandError::StreamClosed)?;

        for frame in batch {
            let copies = self.copies();
            if copies == 0 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(msg_id = frame.msg_id, "link-sim: dropped frame");
                continue;
            }
            for _ in 1..copies {
                // Duplicate goes first; the original follows.
                let _ = tx.send(frame.clone());
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            if tx.send(frame).is_err() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link-sim peer gone").into());
            }
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    // ---

    async fn close(&self) {
        // ---
        self.closed_tx.send_replace(true);
        lock(&self.tx).take();
        lock(&self.pending).clear();
    }

    // ---

    fn set_max_packet_size(&self, size: usize) {
        self.max_packet_size.store(size, Ordering::Relaxed);
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

    use strand_domain::ResultCode;

    use super::*;

    #[tokio::test]
    async fn nothing_arrives_before_flush() {
        // ---
        let (a, b) = LinkSimStream::pair(LinkSimConfig::perfect());

        a.write(1, b"one").await.unwrap();
        a.write(2, b"two").await.unwrap();

        let early = tokio::time::timeout(Duration::from_millis(20), b.read()).await;
        assert!(early.is_err(), "unflushed frames must not be readable");

        a.flush().await.unwrap();
        assert_eq!(b.read().await.unwrap(), Frame::new(1, b"one".to_vec()));
        assert_eq!(b.read().await.unwrap(), Frame::new(2, b"two".to_vec()));
        assert_eq!(a.delivered(), 2);
    }

    // ---

    #[tokio::test]
    async fn close_fails_own_read_and_peer_writes() {
        // ---
        let (a, b) = LinkSimStream::pair(LinkSimConfig::perfect());
        let a = Arc::new(a);

        let reader = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.read().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        a.close().await;

        let res = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(res, Err(StrandError::StreamClosed)));

        let err = b.write(1, b"x").await.unwrap_err();
        assert_eq!(ResultCode::from(&err), ResultCode::SocketError);

        let err = b.read().await.unwrap_err();
        assert_eq!(ResultCode::from(&err), ResultCode::SocketError);
    }

    // ---

    #[tokio::test]
    async fn same_seed_same_losses() {
        // ---
        async fn run(seed: u64) -> Vec<u32> {
            let (a, b) = LinkSimStream::pair(LinkSimConfig::lossy(0.3, seed));
            for id in 0..200 {
                a.write(id, &[]).await.unwrap();
            }
            a.flush().await.unwrap();
            a.close().await;

            let mut got = Vec::new();
            while let Ok(frame) = b.read().await {
                got.push(frame.msg_id);
            }
            got
        }

        let first = run(42).await;
        let second = run(42).await;
        assert_eq!(first, second);
        assert!(first.len() < 200, "30% loss should drop something");
        assert!(first.len() > 100, "30% loss should keep most frames");
    }

    // ---

    #[tokio::test]
    async fn full_duplication_delivers_every_frame_twice() {
        // ---
        let config = LinkSimConfig {
            dup_percent: 1.0,
            seed: Some(3),
            ..Default::default()
        };
        let (a, b) = LinkSimStream::pair(config);

        for id in 0..10 {
            a.write(id, b"d").await.unwrap();
        }
        a.flush().await.unwrap();
        a.close().await;

        let mut got = Vec::new();
        while let Ok(frame) = b.read().await {
            got.push(frame.msg_id);
        }

        let expected: Vec<u32> = (0..10).flat_map(|id| [id, id]).collect();
        assert_eq!(got, expected);
        assert_eq!(a.delivered(), 20);
        assert_eq!(a.dropped(), 0);
    }

    // ---

    #[tokio::test]
    async fn partial_duplication_is_seeded() {
        // ---
        async fn run(seed: u64) -> Vec<u32> {
            let config = LinkSimConfig {
                dup_percent: 0.5,
                seed: Some(seed),
                ..Default::default()
            };
            let (a, b) = LinkSimStream::pair(config);
            for id in 0..100 {
                a.write(id, &[]).await.unwrap();
            }
            a.flush().await.unwrap();
            a.close().await;

            let mut got = Vec::new();
            while let Ok(frame) = b.read().await {
                got.push(frame.msg_id);
            }
            got
        }

        let first = run(11).await;
        assert_eq!(first, run(11).await);
        assert!(first.len() > 100 && first.len() < 200, "got {}", first.len());
    }
    // ---

    #[tokio::test]
    async fn max_packet_size_rejects_large_writes() {
        // ---
        let (a, _b) = LinkSimStream::pair(LinkSimConfig::perfect());
        a.set_max_packet_size(4);

        let err = a.write(1, b"too long").await.unwrap_err();
        assert_eq!(ResultCode::from(&err), ResultCode::PackageCrack);
        assert!(a.write(1, b"ok").await.is_ok());
    }
}
