//! LinkSim demo: two sessions joined by an in-process lossy link.
//!
//! Peer A sends `count` numbered messages and closes; peer B counts what
//! arrives. Losses come from the seeded link, so a given seed always loses
//! the same frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use strand_domain::{RawMessage, SessionClosed};
use strand_link_sim::{LinkSimConfig, LinkSimStream};
use strand_socket::{Peer, SessionEvent};

// ---

const DATA_ID: u32 = 2;

pub async fn run(
    sender: Arc<Peer>,
    receiver: Arc<Peer>,
    count: u32,
    drop_percent: f64,
    seed: u64,
) -> anyhow::Result<()> {
    // ---
    let received = Arc::new(AtomicU64::new(0));
    {
        let received = Arc::clone(&received);
        receiver.register(DATA_ID, move |_ev: SessionEvent| {
            let received = Arc::clone(&received);
            async move {
                received.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
    receiver.register(SessionClosed::ID, |ev: SessionEvent| async move {
        let result = ev.message::<SessionClosed>().map(|m| m.result);
        info!(session = ev.session_id(), ?result, "receiver closed");
    });

    let (a, b) = LinkSimStream::pair(LinkSimConfig::lossy(drop_percent, seed));
    let a = Arc::new(a);
    let a_ses = sender.spawn_session(a.clone());
    let b_ses = receiver.spawn_session(Arc::new(b));

    for seq in 0..count {
        a_ses
            .send(Arc::new(RawMessage::new(DATA_ID, seq.to_be_bytes().to_vec())))
            .await?;
    }
    a_ses.close();

    let wait = Duration::from_secs(10);
    tokio::time::timeout(wait, a_ses.closed()).await?;
    tokio::time::timeout(wait, b_ses.closed()).await?;

    // Callbacks posted before the close have run once this job runs.
    let (tx, rx) = tokio::sync::oneshot::channel();
    receiver.queue().post(async move {
        let _ = tx.send(());
    });
    tokio::time::timeout(wait, rx).await??;

    info!(
        sent = count,
        delivered = a.delivered(),
        dropped = a.dropped(),
        received = received.load(Ordering::Relaxed),
        "link-sim run complete"
    );
    Ok(())
}
