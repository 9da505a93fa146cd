//! [`Connector`]: dials a remote address and runs one session at a time.
//!
//! Without reconnect a single dial is made: failure dispatches
//! `ConnectFailed`, success dispatches `Connected`. With
//! [`set_reconnect`](Connector::set_reconnect) the connector keeps
//! re-dialing after failures and after the session closes, doubling the
//! delay each time up to [`MAX_BACKOFF`] and resetting it after a
//! successful dial.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ---

use tokio::net::TcpStream;
use tokio::sync::watch;

// ---

use strand_domain::{LifecycleFault, LifecycleNotice, ResultCode, StrandError};

// ---

use super::{system_error, system_event, Peer, Session};

// ---

pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

pub struct Connector {
    // ---
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
}

struct Shared {
    // ---
    peer: Arc<Peer>,

    /// Base reconnect delay. `None` disables reconnect.
    reconnect: Mutex<Option<Duration>>,

    /// Live session, if any.
    current: Mutex<Option<Arc<Session>>>,
}

impl Shared {
    fn reconnect(&self) -> Option<Duration> {
        *lock(&self.reconnect)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---

impl Connector {
    // ---
    pub fn new(peer: Arc<Peer>) -> Self {
        // ---
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                peer,
                reconnect: Mutex::new(None),
                current: Mutex::new(None),
            }),
            shutdown_tx,
        }
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.shared.peer
    }

    // ---

    /// Enable reconnect with `base` as the first delay, or disable it.
    pub fn set_reconnect(&self, base: Option<Duration>) {
        *lock(&self.shared.reconnect) = base;
    }

    /// The live session, if connected.
    pub fn session(&self) -> Option<Arc<Session>> {
        lock(&self.shared.current).clone()
    }

    // ---

    /// Start dialing `addr` in a background task.
    pub fn start(&self, addr: impl Into<String>) {
        // ---
        let addr = addr.into();
        self.shared.peer.set_address(addr.clone());
        self.shutdown_tx.send_replace(false);

        tokio::spawn(connect_loop(
            Arc::clone(&self.shared),
            addr,
            self.shutdown_tx.subscribe(),
        ));
    }

    // ---

    /// Stop reconnecting and close the live session.
    pub fn stop(&self) {
        // ---
        self.shutdown_tx.send_replace(true);
        if let Some(ses) = self.session() {
            ses.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Connect loop
// ---------------------------------------------------------------------------

async fn connect_loop(shared: Arc<Shared>, addr: String, mut shutdown: watch::Receiver<bool>) {
    // ---
    let peer = &shared.peer;
    let mut backoff = shared.reconnect();

    loop {
        // ---
        let dialed = tokio::select! {
            res = TcpStream::connect(addr.as_str()) => res,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        match dialed {
            Ok(socket) => {
                // ---
                let cfg = peer.config();
                if let Err(e) = socket.set_nodelay(cfg.no_delay) {
                    tracing::debug!(%addr, "set_nodelay: {e}");
                }

                let ses = peer.spawn_session(cfg.new_stream(socket));
                tracing::info!(session = ses.id(), %addr, "connected");

                *lock(&shared.current) = Some(Arc::clone(&ses));
                system_event(Some(Arc::clone(&ses)), LifecycleNotice::Connected, &cfg.recv_chain).await;

                backoff = shared.reconnect();

                let stopping = tokio::select! {
                    _ = ses.closed() => false,
                    _ = shutdown.wait_for(|stop| *stop) => true,
                };
                if stopping {
                    ses.close();
                    ses.closed().await;
                }
                *lock(&shared.current) = None;
            }
            Err(e) => {
                // ---
                let result = ResultCode::from(&StrandError::Io(e));
                tracing::warn!(%addr, ?result, "connect failed");

                let chain = peer.config().recv_chain.clone();
                system_error(None, LifecycleFault::ConnectFailed, result, &chain).await;
            }
        }

        if *shutdown.borrow() {
            break;
        }

        let Some(base) = shared.reconnect() else {
            break;
        };
        let delay = backoff.unwrap_or(base);

        tracing::info!(%addr, "reconnecting in {}ms", delay.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
        backoff = Some(next_backoff(delay));
    }

    tracing::debug!(%addr, "connect loop exit");
}

/// Delay to use after `delay`: doubled, capped at [`MAX_BACKOFF`].
fn next_backoff(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(MAX_BACKOFF)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        // ---
        let mut delay = Duration::from_millis(500);
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(delay.as_millis());
            delay = next_backoff(delay);
        }
        assert_eq!(seen, vec![500, 1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn backoff_never_exceeds_cap() {
        assert_eq!(next_backoff(MAX_BACKOFF), MAX_BACKOFF);
        assert_eq!(next_backoff(Duration::MAX), MAX_BACKOFF);
    }
}
