use std::net::SocketAddr;
use std::sync::Arc;

// ---

use async_trait::async_trait;

// ---

use super::error::Result;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One framed message as read from a [`FramedStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    // ---
    pub msg_id: u32,
    pub data: Vec<u8>,
}

// ---

impl Frame {
    // ---
    pub fn new(msg_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_id,
            data: data.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// FramedStream
// ---------------------------------------------------------------------------

/// A reliable, ordered, message-framed byte stream owned by one session.
///
/// All methods take `&self`: a session reads from its receive task while
/// its send task writes, flushes and eventually closes. Implementations keep
/// the read side and the write side independently locked.
///
/// Deadlines are not part of this trait. The session applies the peer's read
/// and write deadlines as timeouts around `read` and around each batch of
/// `write` + `flush`.
#[async_trait]
pub trait FramedStream: Send + Sync {
    // ---
    /// Read exactly one frame.
    ///
    /// Once [`close`](FramedStream::close) has been called, a pending or
    /// later `read` must return an error promptly.
    async fn read(&self) -> Result<Frame>;

    /// Buffer one frame for sending. Bytes may not reach the wire until
    /// [`flush`](FramedStream::flush).
    async fn write(&self, msg_id: u32, data: &[u8]) -> Result<()>;

    /// Push all buffered frames to the underlying connection.
    async fn flush(&self) -> Result<()>;

    /// Close the connection. Idempotent.
    async fn close(&self);

    /// Apply the peer's maximum frame size. `0` means unlimited.
    /// Streams without a size limit ignore it.
    fn set_max_packet_size(&self, size: usize) {
        let _ = size;
    }

    /// Remote address, when the stream has one.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

// ---

/// Convenience type alias for a shared [`FramedStream`].
pub type FramedStreamPtr = Arc<dyn FramedStream>;
