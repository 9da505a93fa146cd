//! [`Acceptor`]: TCP listen loop feeding sessions into a [`Peer`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

// ---

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

// ---

use strand_domain::{LifecycleFault, LifecycleNotice, Result, ResultCode, StrandError};

// ---

use super::{system_error, system_event, Peer};

// ---------------------------------------------------------------------------
// Acceptor
// ---------------------------------------------------------------------------

pub struct Acceptor {
    // ---
    peer: Arc<Peer>,
    shutdown_tx: watch::Sender<bool>,
}

// ---

impl Acceptor {
    // ---
    pub fn new(peer: Arc<Peer>) -> Self {
        // ---
        let (shutdown_tx, _) = watch::channel(false);
        Self { peer, shutdown_tx }
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    // ---

    /// Bind `addr` and start accepting in a background task.
    ///
    /// Returns the bound address, which differs from `addr` when it asked
    /// for port 0.
    pub async fn start(&self, addr: &str) -> Result<SocketAddr> {
        // ---
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;

        self.peer.set_address(local.to_string());
        self.shutdown_tx.send_replace(false);

        tracing::info!(peer = %self.peer.name_or_address(), "listening on {local}");

        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.peer),
            self.shutdown_tx.subscribe(),
        ));

        Ok(local)
    }

    // ---

    /// Stop accepting. Live sessions are left running; use
    /// `peer().sessions().close_all()` to drop them too.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------

/// Source of inbound connections for the accept loop.
#[async_trait]
trait Listen: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Listen for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

// ---

async fn accept_loop<L: Listen>(listener: L, peer: Arc<Peer>, mut shutdown: watch::Receiver<bool>) {
    // ---
    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        match accepted {
            Ok((socket, remote)) => {
                // ---
                let cfg = peer.config();
                if let Err(e) = socket.set_nodelay(cfg.no_delay) {
                    tracing::debug!(%remote, "set_nodelay: {e}");
                }

                let ses = peer.spawn_session(cfg.new_stream(socket));
                tracing::info!(session = ses.id(), %remote, "accepted");

                system_event(Some(ses), LifecycleNotice::Accepted, &cfg.recv_chain).await;
            }
            Err(e) => {
                // ---
                let result = ResultCode::from(&StrandError::Io(e));
                tracing::warn!(peer = %peer.name_or_address(), ?result, "accept failed");

                let chain = peer.config().recv_chain.clone();
                system_error(None, LifecycleFault::AcceptFailed, result, &chain).await;
                break;
            }
        }
    }

    tracing::info!(peer = %peer.name_or_address(), "accept loop exit");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::Mutex;
    use std::time::Duration;

    use strand_domain::SessionAcceptFailed;
    use tokio::sync::oneshot;

    use super::*;
    use crate::{EventKind, EventQueue, SessionEvent};

    /// A listener whose every accept fails.
    struct Exhausted;

    #[async_trait]
    impl Listen for Exhausted {
        async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
            Err(io::Error::new(io::ErrorKind::Other, "too many open files"))
        }
    }

    // ---

    #[tokio::test]
    async fn accept_error_dispatches_accept_failed_and_stops() {
        // ---
        let peer = Peer::new(EventQueue::spawn());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            peer.register(SessionAcceptFailed::ID, move |ev: SessionEvent| {
                let seen = Arc::clone(&seen);
                async move {
                    let result = ev.message::<SessionAcceptFailed>().map(|m| m.result);
                    seen.lock().unwrap().push((ev.kind, ev.session_id(), result));
                }
            });
        }

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::time::timeout(
            Duration::from_secs(5),
            accept_loop(Exhausted, Arc::clone(&peer), shutdown_rx),
        )
        .await
        .expect("accept loop must exit after an accept error");

        let (tx, rx) = oneshot::channel();
        peer.queue().post(async move {
            let _ = tx.send(());
        });
        tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(EventKind::AcceptFailed, 0, Some(ResultCode::SocketError))]
        );
        assert_eq!(peer.sessions().count(), 0);
    }

    // ---

    #[tokio::test]
    async fn stop_ends_the_accept_loop() {
        // ---
        let peer = Peer::new(EventQueue::spawn());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, peer, shutdown_rx));

        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("accept loop must exit on stop")
            .unwrap();
    }
}
