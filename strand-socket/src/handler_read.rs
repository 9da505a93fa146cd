use std::sync::Arc;

// ---

use async_trait::async_trait;

// ---

use strand_domain::{LifecycleFault, ResultCode, SYSTEM_ID_BASE};

// ---

use super::{system_error, with_deadline, EventHandler, EventKind, SessionEvent};

// ---------------------------------------------------------------------------
// ReadPacketHandler
// ---------------------------------------------------------------------------

/// Pulls one frame off the session's stream for each `Recv` event.
///
/// Applies the peer's read deadline when non-zero. On a stream error the
/// event is marked failed with the mapped [`ResultCode`] and a `Closed`
/// lifecycle event carrying that code goes down the peer's receive chain.
/// A frame carrying a lifecycle id (at or above [`SYSTEM_ID_BASE`]) is
/// treated as corrupt: [`ResultCode::PackageCrack`] and the same `Closed`
/// path. All other event kinds pass through untouched.
pub struct ReadPacketHandler;

// ---

#[async_trait]
impl EventHandler for ReadPacketHandler {
    // ---
    async fn call(&self, ev: &mut SessionEvent) {
        // ---
        if ev.kind != EventKind::Recv {
            return;
        }

        let Some(ses) = ev.session().map(Arc::clone) else {
            return;
        };

        let cfg = ses.peer().config();

        let outcome = with_deadline(cfg.read_timeout, ses.stream().read()).await;

        match outcome {
            Ok(frame) if frame.msg_id >= SYSTEM_ID_BASE => {
                let result = ResultCode::PackageCrack;
                tracing::warn!(session = ses.id(), msg_id = frame.msg_id, "reserved id on the wire");

                ev.set_result(result);
                system_error(Some(ses), LifecycleFault::Closed, result, &cfg.recv_chain).await;
            }
            Ok(frame) => {
                ev.msg_id = frame.msg_id;
                ev.data = frame.data;
            }
            Err(e) => {
                let result = ResultCode::from(&e);
                tracing::debug!(session = ses.id(), ?result, "read failed: {e}");

                ev.set_result(result);
                system_error(Some(ses), LifecycleFault::Closed, result, &cfg.recv_chain).await;
            }
        }
    }
}
