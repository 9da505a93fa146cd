//! [`TlvStream`]: length/id-prefixed frames over TCP.
//!
//! Wire layout, big-endian:
//!
//! ```text
//! +-----------+-----------+-------------------+
//! | len: u32  | id: u32   | payload (len)     |
//! +-----------+-----------+-------------------+
//! ```
//!
//! `len` counts payload bytes only. Writes land in a `BufWriter`; nothing
//! reaches the socket until [`flush`](FramedStream::flush), which is what
//! lets the send task batch.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

// ---

use strand_domain::{Frame, FramedStream, Result, StrandError};

// ---

pub const TLV_HEADER_LEN: usize = 8;

/// Payload buffer grows from at most this much; a header alone never
/// commits the full declared length.
const READ_RESERVE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Frame codec
// ---------------------------------------------------------------------------

/// Read one frame. `max` of zero disables the size check.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    // ---
    let mut header = [0u8; TLV_HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let msg_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    if max != 0 && len > max {
        return Err(StrandError::PacketTooLarge { size: len, max });
    }

    let mut data = Vec::with_capacity(len.min(READ_RESERVE));
    let got = (&mut *reader).take(len as u64).read_to_end(&mut data).await?;
    if got < len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "frame payload truncated").into());
    }

    Ok(Frame { msg_id, data })
}

// ---

/// Write one frame without flushing.
pub async fn write_frame<W>(writer: &mut W, msg_id: u32, data: &[u8], max: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // ---
    if max != 0 && data.len() > max {
        return Err(StrandError::PacketTooLarge {
            size: data.len(),
            max,
        });
    }

    let len = u32::try_from(data.len()).map_err(|_| StrandError::PacketTooLarge {
        size: data.len(),
        max: u32::MAX as usize,
    })?;

    let mut header = [0u8; TLV_HEADER_LEN];
    header[..4].copy_from_slice(&len.to_be_bytes());
    header[4..].copy_from_slice(&msg_id.to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(data).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// TlvStream
// ---------------------------------------------------------------------------

pub struct TlvStream {
    // ---
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    max_packet_size: AtomicUsize,
    closed_tx: watch::Sender<bool>,
    peer_addr: Option<SocketAddr>,
}

// ---

impl TlvStream {
    // ---
    pub fn new(socket: TcpStream) -> Self {
        // ---
        let peer_addr = socket.peer_addr().ok();
        let (rd, wr) = socket.into_split();
        let (closed_tx, _) = watch::channel(false);

        Self {
            reader: Mutex::new(BufReader::new(rd)),
            writer: Mutex::new(BufWriter::new(wr)),
            max_packet_size: AtomicUsize::new(0),
            closed_tx,
            peer_addr,
        }
    }

    fn max(&self) -> usize {
        self.max_packet_size.load(Ordering::Relaxed)
    }

    fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }
}

// ---

#[async_trait]
impl FramedStream for TlvStream {
    // ---
    async fn read(&self) -> Result<Frame> {
        // ---
        let mut closed = self.closed_tx.subscribe();
        if *closed.borrow() {
            return Err(StrandError::StreamClosed);
        }

        let mut reader = self.reader.lock().await;

        tokio::select! {
            frame = read_frame(&mut *reader, self.max()) => frame,
            _ = closed.wait_for(|c| *c) => Err(StrandError::StreamClosed),
        }
    }

    // ---

    async fn write(&self, msg_id: u32, data: &[u8]) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(StrandError::StreamClosed);
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, msg_id, data, self.max()).await
    }

    // ---

    async fn flush(&self) -> Result<()> {
        // ---
        if self.is_closed() {
            return Err(StrandError::StreamClosed);
        }
        self.writer.lock().await.flush().await?;
        Ok(())
    }

    // ---

    async fn close(&self) {
        // ---
        if self.closed_tx.send_replace(true) {
            return;
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            if e.kind() != io::ErrorKind::NotConnected {
                tracing::debug!(peer = ?self.peer_addr, "tcp shutdown: {e}");
            }
        }
    }

    // ---

    fn set_max_packet_size(&self, size: usize) {
        self.max_packet_size.store(size, Ordering::Relaxed);
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::Arc;
    use std::time::Duration;

    use strand_domain::ResultCode;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn frames_cross_an_in_memory_pipe() {
        // ---
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_frame(&mut a, 9, b"hello", 0).await.unwrap();
        write_frame(&mut a, 10, b"", 0).await.unwrap();

        let first = read_frame(&mut b, 0).await.unwrap();
        assert_eq!(first, Frame::new(9, b"hello".to_vec()));

        let second = read_frame(&mut b, 0).await.unwrap();
        assert_eq!(second.msg_id, 10);
        assert!(second.data.is_empty());
    }

    // ---

    #[tokio::test]
    async fn header_is_big_endian_len_then_id() {
        // ---
        let mut buf = Vec::new();
        write_frame(&mut buf, 0x0102_0304, b"xyz", 0).await.unwrap();
        assert_eq!(&buf[..TLV_HEADER_LEN], &[0, 0, 0, 3, 1, 2, 3, 4]);
        assert_eq!(&buf[TLV_HEADER_LEN..], b"xyz");
    }

    // ---

    #[tokio::test]
    async fn oversized_frames_are_rejected_both_ways() {
        // ---
        let mut sink = Vec::new();
        let err = write_frame(&mut sink, 1, &[0u8; 16], 8).await.unwrap_err();
        assert!(matches!(err, StrandError::PacketTooLarge { size: 16, max: 8 }));
        assert!(sink.is_empty(), "nothing written for a rejected frame");

        let mut wire = Vec::new();
        write_frame(&mut wire, 1, &[0u8; 16], 0).await.unwrap();
        let err = read_frame(&mut wire.as_slice(), 8).await.unwrap_err();
        assert_eq!(ResultCode::from(&err), ResultCode::PackageCrack);
    }

    // ---

    #[tokio::test]
    async fn truncated_frame_is_socket_error() {
        // ---
        let mut wire = Vec::new();
        write_frame(&mut wire, 1, b"abcdef", 0).await.unwrap();
        wire.truncate(wire.len() - 2);

        let err = read_frame(&mut wire.as_slice(), 0).await.unwrap_err();
        assert_eq!(ResultCode::from(&err), ResultCode::SocketError);
    }

    // ---

    #[tokio::test]
    async fn huge_declared_length_with_short_body_fails_cheaply() {
        // ---
        // Header claims 4 GiB - 1 with no size limit; only three bytes follow.
        let mut wire = vec![0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 7];
        wire.extend_from_slice(b"abc");

        let err = read_frame(&mut wire.as_slice(), 0).await.unwrap_err();
        assert_eq!(ResultCode::from(&err), ResultCode::SocketError);
    }

    // ---

    #[tokio::test]
    async fn payload_larger_than_initial_reserve_arrives_whole() {
        // ---
        let body: Vec<u8> = (0..READ_RESERVE * 3 + 5).map(|i| i as u8).collect();
        let mut wire = Vec::new();
        write_frame(&mut wire, 2, &body, 0).await.unwrap();

        let frame = read_frame(&mut wire.as_slice(), 0).await.unwrap();
        assert_eq!(frame.msg_id, 2);
        assert_eq!(frame.data, body);
    }

    // ---

    #[tokio::test]
    async fn close_unblocks_pending_read() {
        // ---
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server_sock, _) = listener.accept().await.unwrap();
        let _client_sock = client.await.unwrap();

        let stream = Arc::new(TlvStream::new(server_sock));
        let reader = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.read().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.close().await;

        let res = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("read must return after close")
            .unwrap();
        assert!(matches!(res, Err(StrandError::StreamClosed)));
        assert!(matches!(stream.flush().await, Err(StrandError::StreamClosed)));
    }

    // ---

    #[tokio::test]
    async fn flush_pushes_buffered_frames_to_the_socket() {
        // ---
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server_sock, _) = listener.accept().await.unwrap();
        let client_sock = client.await.unwrap();

        let server = TlvStream::new(server_sock);
        let client = TlvStream::new(client_sock);

        client.write(3, b"one").await.unwrap();
        client.write(4, b"two").await.unwrap();
        client.flush().await.unwrap();

        let a = tokio::time::timeout(Duration::from_secs(5), server.read()).await.unwrap().unwrap();
        let b = tokio::time::timeout(Duration::from_secs(5), server.read()).await.unwrap().unwrap();
        assert_eq!((a.msg_id, a.data.as_slice()), (3, &b"one"[..]));
        assert_eq!((b.msg_id, b.data.as_slice()), (4, &b"two"[..]));
    }
}
