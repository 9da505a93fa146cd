use std::sync::Arc;

// ---

use async_trait::async_trait;

// ---

use strand_domain::{ResultCode, SYSTEM_ID_BASE};

// ---

use super::{EventHandler, EventKind, OutboundRequest, SessionEvent};

// ---------------------------------------------------------------------------
// EncodeHandler
// ---------------------------------------------------------------------------

/// Encodes `ev.msg` into `ev.msg_id` / `ev.data` on `Send` events.
///
/// Events without a message are treated as pre-encoded and left alone.
/// An encode failure sets [`ResultCode::CodecError`], as does a message
/// whose id falls in the lifecycle range at or above [`SYSTEM_ID_BASE`].
pub struct EncodeHandler;

// ---

#[async_trait]
impl EventHandler for EncodeHandler {
    // ---
    async fn call(&self, ev: &mut SessionEvent) {
        // ---
        if ev.kind != EventKind::Send {
            return;
        }

        let Some(msg) = ev.msg.clone() else {
            return;
        };

        if msg.msg_id() >= SYSTEM_ID_BASE {
            tracing::warn!(session = ev.session_id(), msg_id = msg.msg_id(), "reserved id not sendable");
            ev.set_result(ResultCode::CodecError);
            return;
        }

        match msg.encode() {
            Ok(data) => {
                ev.msg_id = msg.msg_id();
                ev.data = data;
            }
            Err(e) => {
                tracing::warn!(session = ev.session_id(), msg_id = msg.msg_id(), "encode failed: {e}");
                ev.set_result(ResultCode::from(&e));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EnqueueHandler
// ---------------------------------------------------------------------------

/// Moves the encoded payload into the session's outbound queue.
///
/// Returns as soon as the request is queued; the send loop does the actual
/// write. A session that is already closing rejects the request with
/// [`ResultCode::SessionClosed`].
pub struct EnqueueHandler;

// ---

#[async_trait]
impl EventHandler for EnqueueHandler {
    // ---
    async fn call(&self, ev: &mut SessionEvent) {
        // ---
        if ev.kind != EventKind::Send {
            return;
        }

        let Some(ses) = ev.session().map(Arc::clone) else {
            ev.set_result(ResultCode::SessionClosed);
            return;
        };

        let req = OutboundRequest {
            msg_id: ev.msg_id,
            data: std::mem::take(&mut ev.data),
        };

        if let Err(e) = ses.outbound().add(req) {
            ev.set_result(ResultCode::from(&e));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use strand_domain::{RawMessage, SessionClosed};

    use super::*;

    fn send_event(msg: strand_domain::MessagePtr) -> SessionEvent {
        SessionEvent::new(EventKind::Send, None).with_message(msg)
    }

    #[tokio::test]
    async fn encodes_application_message() {
        // ---
        let mut ev = send_event(Arc::new(RawMessage::new(7, b"abc".to_vec())));
        EncodeHandler.call(&mut ev).await;

        assert!(ev.result().is_ok());
        assert_eq!(ev.msg_id, 7);
        assert_eq!(ev.data, b"abc".to_vec());
    }

    #[tokio::test]
    async fn reserved_ids_are_rejected() {
        // ---
        for id in [SYSTEM_ID_BASE, SYSTEM_ID_BASE + 9, u32::MAX] {
            let mut ev = send_event(Arc::new(RawMessage::new(id, b"x".to_vec())));
            EncodeHandler.call(&mut ev).await;

            assert_eq!(ev.result(), ResultCode::CodecError, "id {id:#x}");
            assert!(ev.data.is_empty());
        }

        let closed: strand_domain::MessagePtr = Arc::new(SessionClosed {
            result: ResultCode::Ok,
        });
        let mut ev = send_event(closed);
        EncodeHandler.call(&mut ev).await;
        assert_eq!(ev.result(), ResultCode::CodecError);
    }
}
