//! Core vocabulary for the strand session layer.
//!
//! This crate defines the types every other strand crate speaks. It holds
//! no I/O and no session machinery; `strand-socket` builds the session
//! engine on top of it, `strand-link-sim` implements in-memory streams.
//!
//! # Structure
//!
//! - `error`: [`StrandError`] and [`Result<T>`] alias
//! - `result`: [`ResultCode`], the connection-scoped outcome carried by events
//! - `message`: [`Message`] trait, [`RawMessage`], JSON helpers
//! - `lifecycle`: connection lifecycle payloads (accepted, connected, closed, ...)
//! - `stream`: [`FramedStream`] trait and [`Frame`]

mod error;
mod lifecycle;
mod message;
mod result;
mod stream;

// --- error
pub use error::{Result, StrandError};

// --- result
pub use result::ResultCode;

// --- message
pub use message::{
    // ---
    decode_json,
    Message,
    MessagePtr,
    RawMessage,
    SYSTEM_ID_BASE,
};

// --- lifecycle
pub use lifecycle::{
    // ---
    LifecycleFault,
    LifecycleNotice,
    SessionAcceptFailed,
    SessionAccepted,
    SessionClosed,
    SessionConnectFailed,
    SessionConnected,
};

// --- stream
pub use stream::{Frame, FramedStream, FramedStreamPtr};
