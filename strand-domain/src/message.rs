use std::any::Any;
use std::fmt;
use std::sync::Arc;

// ---

use serde::de::DeserializeOwned;
use serde::Serialize;

// ---

use super::error::{Result, StrandError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Message ids at or above this value are reserved for lifecycle payloads.
/// The send chain refuses them and the receive side treats them as corrupt.
pub const SYSTEM_ID_BASE: u32 = 0xFFFF_FF00;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An application message that can travel through a session.
///
/// The session engine never inspects message contents. The send chain asks
/// a message for its id and encoded bytes; receive-side handlers get raw
/// bytes and decode them however they like (see [`decode_json`]).
pub trait Message: Any + Send + Sync + fmt::Debug {
    // ---
    /// Wire identifier written in front of the payload.
    fn msg_id(&self) -> u32;

    /// Encode the payload bytes.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Upcast for [`downcast_ref`](dyn Message::downcast_ref).
    fn as_any(&self) -> &dyn Any;
}

// ---

impl dyn Message {
    // ---
    /// Borrow the concrete message if it is a `T`.
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

// ---

/// Shared, immutable message handle. Events clone this freely.
pub type MessagePtr = Arc<dyn Message>;

// ---------------------------------------------------------------------------
// RawMessage
// ---------------------------------------------------------------------------

/// A pre-encoded message: id plus payload bytes, written verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    // ---
    pub id: u32,
    pub data: Vec<u8>,
}

// ---

impl RawMessage {
    // ---
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    // ---

    /// Serialize `value` as JSON under message id `id`.
    pub fn json<T: Serialize>(id: u32, value: &T) -> Result<Self> {
        // ---
        let data = serde_json::to_vec(value)
            .map_err(|e| StrandError::Codec(format!("json encode (id {id}): {e}")))?;
        Ok(Self { id, data })
    }
}

// ---

impl Message for RawMessage {
    // ---
    fn msg_id(&self) -> u32 {
        self.id
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// decode_json
// ---------------------------------------------------------------------------

/// Decode a JSON payload received in a `Recv` event.
pub fn decode_json<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| StrandError::Codec(format!("json decode: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u64,
        note: String,
    }

    // ---

    #[test]
    fn json_message_decodes_back_to_the_value() {
        // ---
        let msg = RawMessage::json(7, &Ping { seq: 42, note: "hi".into() }).unwrap();
        assert_eq!(msg.msg_id(), 7);

        let bytes = msg.encode().unwrap();
        let back: Ping = decode_json(&bytes).unwrap();
        assert_eq!(back, Ping { seq: 42, note: "hi".into() });
    }

    #[test]
    fn garbage_payload_is_a_codec_error() {
        // ---
        let err = decode_json::<Ping>(b"not json").unwrap_err();
        assert!(matches!(err, StrandError::Codec(_)), "got {err:?}");
    }

    #[test]
    fn downcast_through_message_ptr() {
        // ---
        let ptr: MessagePtr = Arc::new(RawMessage::new(3, b"abc".to_vec()));
        let raw = ptr.downcast_ref::<RawMessage>().expect("should be a RawMessage");
        assert_eq!(raw.data, b"abc");
    }
}
