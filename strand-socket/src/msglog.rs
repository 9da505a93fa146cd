use async_trait::async_trait;

// ---

use super::{EventHandler, EventKind, SessionEvent};

// ---

/// Log one event at `debug` under the `strand::msglog` target.
pub(crate) fn msg_log(ev: &SessionEvent) {
    // ---
    let direction = match ev.kind {
        EventKind::Send => "send",
        EventKind::Post => "post",
        _ => "recv",
    };

    tracing::debug!(
        target: "strand::msglog",
        session = ev.session_id(),
        kind = ?ev.kind,
        msg_id = ev.msg_id,
        len = ev.data.len(),
        "#{direction}"
    );
}

// ---------------------------------------------------------------------------
// MsgLogHandler
// ---------------------------------------------------------------------------

/// Chain handler wrapper around the message log. Inserted into the stock
/// chains when the peer's `message_log` flag is on.
pub struct MsgLogHandler;

#[async_trait]
impl EventHandler for MsgLogHandler {
    async fn call(&self, ev: &mut SessionEvent) {
        msg_log(ev);
    }
}
