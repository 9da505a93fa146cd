use thiserror::Error;

use super::result::ResultCode;

// ---

#[derive(Debug, Error)]
pub enum StrandError {
    // ---
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("deadline expired")]
    Timeout,

    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("stream closed")]
    StreamClosed,

    #[error("session closed")]
    SessionClosed,

    #[error("send rejected ({0:?})")]
    SendRejected(ResultCode),

    #[error("transport error: {0}")]
    Transport(String),
}

// ---

pub type Result<T> = std::result::Result<T, StrandError>;
