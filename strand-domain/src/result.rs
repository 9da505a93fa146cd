use std::io;

use serde::{Deserialize, Serialize};

use super::error::StrandError;

// ---------------------------------------------------------------------------
// ResultCode
// ---------------------------------------------------------------------------

/// Connection-scoped outcome of a dispatched event.
///
/// Every [`StrandError`] that can end a session maps to exactly one code via
/// `ResultCode::from(&err)`. Application handlers only ever see the code,
/// carried either on the event itself or inside a lifecycle payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResultCode {
    // ---
    #[default]
    Ok,

    /// Read, write or flush failed on the underlying connection.
    SocketError,

    /// A read or write deadline expired.
    SocketTimeout,

    /// A frame violated the stream's framing rules (e.g. over max size).
    PackageCrack,

    /// A message could not be encoded or decoded.
    CodecError,

    /// The session is closing and no longer accepts outbound messages.
    SessionClosed,
}

// ---

impl ResultCode {
    // ---
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

// ---

impl From<&StrandError> for ResultCode {
    // ---
    fn from(err: &StrandError) -> Self {
        // ---
        match err {
            StrandError::Io(e) => match e.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ResultCode::SocketTimeout,
                _ => ResultCode::SocketError,
            },
            StrandError::Timeout => ResultCode::SocketTimeout,
            StrandError::PacketTooLarge { .. } => ResultCode::PackageCrack,
            StrandError::Codec(_) => ResultCode::CodecError,
            StrandError::StreamClosed | StrandError::Transport(_) => ResultCode::SocketError,
            StrandError::SessionClosed => ResultCode::SessionClosed,
            StrandError::SendRejected(code) => *code,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
