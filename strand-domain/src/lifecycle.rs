//! Connection lifecycle payloads.
//!
//! These are synthesized, never read from the network. The lifecycle
//! notifier in `strand-socket` wraps one of them in an event and pushes it
//! through the same handler chain as ordinary traffic, so application code
//! observes connects, accepts, closes and failures as regular messages
//! registered by id.

use std::any::Any;
use std::sync::Arc;

// ---

use serde::{Deserialize, Serialize};

// ---

use super::error::{Result, StrandError};
use super::message::{Message, MessagePtr, SYSTEM_ID_BASE};
use super::result::ResultCode;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Lifecycle events that carry no result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleNotice {
    // ---
    Accepted,
    Connected,
}

// ---

impl LifecycleNotice {
    // ---
    /// Build the payload dispatched for this notice.
    pub fn message(self) -> MessagePtr {
        // ---
        match self {
            LifecycleNotice::Accepted => Arc::new(SessionAccepted {}),
            LifecycleNotice::Connected => Arc::new(SessionConnected {}),
        }
    }
}

// ---

/// Lifecycle events that report a failure or a close, with a result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleFault {
    // ---
    Closed,
    AcceptFailed,
    ConnectFailed,
}

// ---

impl LifecycleFault {
    // ---
    /// Build the payload dispatched for this fault.
    pub fn message(self, result: ResultCode) -> MessagePtr {
        // ---
        match self {
            LifecycleFault::Closed => Arc::new(SessionClosed { result }),
            LifecycleFault::AcceptFailed => Arc::new(SessionAcceptFailed { result }),
            LifecycleFault::ConnectFailed => Arc::new(SessionConnectFailed { result }),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionAccepted {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConnected {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClosed {
    pub result: ResultCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAcceptFailed {
    pub result: ResultCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConnectFailed {
    pub result: ResultCode,
}

// ---

macro_rules! system_message {
    ($ty:ident, $offset:expr) => {
        impl $ty {
            pub const ID: u32 = SYSTEM_ID_BASE + $offset;
        }

        impl Message for $ty {
            fn msg_id(&self) -> u32 {
                Self::ID
            }

            fn encode(&self) -> Result<Vec<u8>> {
                serde_json::to_vec(self).map_err(|e| {
                    StrandError::Codec(format!("{} encode: {e}", stringify!($ty)))
                })
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

system_message!(SessionAccepted, 1);
system_message!(SessionConnected, 2);
system_message!(SessionClosed, 3);
system_message!(SessionAcceptFailed, 4);
system_message!(SessionConnectFailed, 5);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
