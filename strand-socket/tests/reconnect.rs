//! Connector reconnect pacing over loopback TCP.
//!
//! These run against the wall clock, so the bounds are loose: each one only
//! has to tell doubling apart from a constant delay.

use std::sync::Arc;
use std::time::Duration;

// ---

use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ---

use strand_domain::{SessionConnectFailed, SessionConnected};
use strand_socket::{Connector, EventQueue, Peer, SessionEvent};

// ---

/// Count events for `id` until the window closes.
async fn count_for(id: u32, peer: &Peer, connector: &Connector, addr: String, window: Duration) -> usize {
    // ---
    let (tx, mut rx) = mpsc::unbounded_channel();
    peer.register(id, move |_ev: SessionEvent| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(());
        }
    });

    connector.start(addr);
    tokio::time::sleep(window).await;
    connector.stop();

    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}

// ---

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_dials_back_off() {
    // ---
    // Grab a free port, then release it so nothing is listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let peer = Peer::new(EventQueue::spawn());
    let connector = Connector::new(Arc::clone(&peer));
    connector.set_reconnect(Some(Duration::from_millis(100)));

    // Dials land near 0, 100, 300 and 700ms. A constant delay would give
    // about seven inside the window.
    let failures = count_for(
        SessionConnectFailed::ID,
        &peer,
        &connector,
        addr.to_string(),
        Duration::from_millis(650),
    )
    .await;

    assert!((2..=4).contains(&failures), "got {failures} connect failures");
}

// ---

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_dial_resets_backoff() {
    // ---
    // Accept and hang up at once, so every session closes right away.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    let peer = Peer::new(EventQueue::spawn());
    let connector = Connector::new(Arc::clone(&peer));
    connector.set_reconnect(Some(Duration::from_millis(40)));

    // With the delay reset after each connect, dials repeat every ~40ms.
    // Without the reset they would land near 0, 40, 120, 280 and 600ms.
    let connects = count_for(
        SessionConnected::ID,
        &peer,
        &connector,
        addr.to_string(),
        Duration::from_millis(800),
    )
    .await;

    assert!(connects >= 8, "got {connects} connects");
}
