use std::fmt;
use std::sync::Arc;

// ---

use strand_domain::{Message, MessagePtr, Result, ResultCode, StrandError};

// ---

use super::Session;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // ---
    /// A frame read from the network (or a pending read, before the read
    /// handler fills it in).
    Recv,

    /// A local, non-network event injected with [`Session::post`].
    Post,

    /// An outbound message travelling down the send chain.
    Send,

    // --- lifecycle ----------------------------------------------------------
    Connected,
    Accepted,
    Closed,
    AcceptFailed,
    ConnectFailed,
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// The unit of work passed down a [`HandlerChain`](super::HandlerChain).
///
/// Handlers mutate it in place. A handler that sets a non-`Ok` result stops
/// the chain. Cloning is cheap apart from the payload bytes; the dispatcher
/// clones once per event when handing it to the event queue.
#[derive(Clone)]
pub struct SessionEvent {
    // ---
    pub kind: EventKind,

    /// Wire id of the payload.
    pub msg_id: u32,

    /// Encoded payload. Filled by the read handler on receive, by the encode
    /// handler on send.
    pub data: Vec<u8>,

    /// Unencoded message: outbound messages before encoding, posted
    /// messages, and lifecycle payloads.
    pub msg: Option<MessagePtr>,

    session: Option<Arc<Session>>,
    result: ResultCode,
}

// ---

impl SessionEvent {
    // ---
    pub fn new(kind: EventKind, session: Option<Arc<Session>>) -> Self {
        // ---
        Self {
            kind,
            msg_id: 0,
            data: Vec::new(),
            msg: None,
            session,
            result: ResultCode::Ok,
        }
    }

    // ---

    /// Attach `msg` and take its id.
    pub fn with_message(mut self, msg: MessagePtr) -> Self {
        // ---
        self.msg_id = msg.msg_id();
        self.msg = Some(msg);
        self
    }

    // ---

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<Arc<Session>>) {
        self.session = session;
    }

    /// Id of the owning session, `0` for session-less lifecycle events.
    pub fn session_id(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.id())
    }

    // ---

    pub fn result(&self) -> ResultCode {
        self.result
    }

    pub fn set_result(&mut self, result: ResultCode) {
        self.result = result;
    }

    // ---

    /// Borrow the attached message as a `T`.
    pub fn message<T: Message>(&self) -> Option<&T> {
        self.msg.as_deref().and_then(|m| m.downcast_ref::<T>())
    }

    // ---

    /// Send `msg` back on the session this event came from.
    pub async fn reply(&self, msg: MessagePtr) -> Result<()> {
        // ---
        match &self.session {
            Some(ses) => ses.send(msg).await,
            None => Err(StrandError::SessionClosed),
        }
    }
}

// ---

impl fmt::Debug for SessionEvent {
    // ---
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("SessionEvent")
            .field("kind", &self.kind)
            .field("session", &self.session_id())
            .field("msg_id", &self.msg_id)
            .field("len", &self.data.len())
            .field("msg", &self.msg)
            .field("result", &self.result)
            .finish()
    }
}
