//! Echo server and ping-pong clients over TCP.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use strand_domain::{
    // ---
    decode_json,
    RawMessage,
    SessionAccepted,
    SessionClosed,
    SessionConnectFailed,
    SessionConnected,
};
use strand_socket::{Acceptor, Connector, Peer, SessionEvent};

// ---

pub const ECHO_ID: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub seq: u64,
    pub body: String,
}

// ---

async fn send_echo(ev: &SessionEvent, seq: u64) {
    // ---
    let echo = Echo {
        seq,
        body: "hello strand".into(),
    };
    let msg = match RawMessage::json(ECHO_ID, &echo) {
        Ok(msg) => Arc::new(msg),
        Err(e) => {
            warn!("encode echo: {e}");
            return;
        }
    };
    if let Err(e) = ev.reply(msg).await {
        warn!(session = ev.session_id(), "send echo: {e}");
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub async fn serve(peer: Arc<Peer>, bind: SocketAddr) -> anyhow::Result<()> {
    // ---
    peer.register(ECHO_ID, |ev: SessionEvent| async move {
        let msg = Arc::new(RawMessage::new(ev.msg_id, ev.data.clone()));
        if let Err(e) = ev.reply(msg).await {
            warn!(session = ev.session_id(), "echo reply: {e}");
        }
    });
    peer.register(SessionAccepted::ID, |ev: SessionEvent| async move {
        info!(session = ev.session_id(), "client accepted");
    });
    peer.register(SessionClosed::ID, |ev: SessionEvent| async move {
        let result = ev.message::<SessionClosed>().map(|m| m.result);
        info!(session = ev.session_id(), ?result, "client closed");
    });

    let acceptor = Acceptor::new(Arc::clone(&peer));
    let local = acceptor.start(&bind.to_string()).await?;
    info!("echo server listening on {local}, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;

    info!("shutting down, {} live sessions", peer.sessions().count());
    acceptor.stop();
    peer.sessions().close_all();

    for ses in peer.sessions().sessions() {
        let _ = tokio::time::timeout(Duration::from_secs(2), ses.closed()).await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

pub async fn run_clients(
    peer: Arc<Peer>,
    addr: SocketAddr,
    clients: usize,
    seconds: u64,
    reconnect: bool,
) -> anyhow::Result<()> {
    // ---
    let round_trips = Arc::new(AtomicU64::new(0));

    peer.register(SessionConnected::ID, |ev: SessionEvent| async move {
        info!(session = ev.session_id(), "connected");
        send_echo(&ev, 0).await;
    });
    peer.register(SessionConnectFailed::ID, |ev: SessionEvent| async move {
        let result = ev.message::<SessionConnectFailed>().map(|m| m.result);
        warn!(?result, "connect failed");
    });
    {
        let round_trips = Arc::clone(&round_trips);
        peer.register(ECHO_ID, move |ev: SessionEvent| {
            let round_trips = Arc::clone(&round_trips);
            async move {
                match decode_json::<Echo>(&ev.data) {
                    Ok(echo) => {
                        round_trips.fetch_add(1, Ordering::Relaxed);
                        send_echo(&ev, echo.seq + 1).await;
                    }
                    Err(e) => warn!(session = ev.session_id(), "bad echo: {e}"),
                }
            }
        });
    }

    let connectors: Vec<Connector> = (0..clients)
        .map(|_| {
            let connector = Connector::new(Arc::clone(&peer));
            if reconnect {
                connector.set_reconnect(Some(Duration::from_millis(500)));
            }
            connector.start(addr.to_string());
            connector
        })
        .collect();

    // --- QPS meter
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    let mut last = 0;
    for _ in 0..seconds {
        ticker.tick().await;
        let now = round_trips.load(Ordering::Relaxed);
        info!(qps = now - last, sessions = peer.sessions().count(), "round trips");
        last = now;
    }

    for connector in &connectors {
        connector.stop();
    }
    for ses in peer.sessions().sessions() {
        let _ = tokio::time::timeout(Duration::from_secs(2), ses.closed()).await;
    }

    info!(total = round_trips.load(Ordering::Relaxed), "clients done");
    Ok(())
}
