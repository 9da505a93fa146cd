//! Per-connection session engine for the strand message layer.
//!
//! Given an established [`FramedStream`](strand_domain::FramedStream), a
//! [`Session`] runs the connection's whole life: a receive task that feeds
//! frames through the peer's receive [`HandlerChain`], a send task that
//! drains the [`OutboundQueue`] in batches, and a coordinator that joins
//! both before firing the close hook exactly once.
//!
//! # Structure
//!
//! - `outbound`: [`OutboundQueue`], many producers, one batching consumer
//! - `session`: [`Session`], receive/send loops, coordinated shutdown
//! - `sysevent`: lifecycle notifier ([`system_event`], [`system_error`])
//! - `event`: [`SessionEvent`], [`EventKind`]
//! - `handler`: [`EventHandler`] trait and [`HandlerChain`]
//! - `handler_read` / `handler_send` / `msglog`: stock chain handlers
//! - `dispatch`: [`Dispatcher`], message id → application callbacks
//! - `event_queue`: [`EventQueue`], the serialized execution context
//! - `peer`: [`Peer`] and its copy-on-write [`PeerConfig`]
//! - `session_manager`: [`SessionManager`], live sessions by id
//! - `tlv`: [`TlvStream`], length/id-prefixed frames over TCP
//! - `acceptor` / `connector`: TCP listen / dial glue

mod acceptor;
mod connector;
mod dispatch;
mod event;
mod event_queue;
mod handler;
mod handler_read;
mod handler_send;
mod msglog;
mod outbound;
mod peer;
mod session;
mod session_manager;
mod sysevent;
mod tlv;

// --- engine
pub use outbound::{OutboundQueue, OutboundRequest, OutboundSlot};
pub use session::{Session, SessionState};
pub use sysevent::{system_error, system_event};

// --- events and handlers
pub use event::{EventKind, SessionEvent};
pub use handler::{build_recv_chain, build_send_chain, handler_fn, EventHandler, HandlerChain};
pub use handler_read::ReadPacketHandler;
pub use handler_send::{EncodeHandler, EnqueueHandler};
pub use msglog::MsgLogHandler;

// --- application boundary
pub use dispatch::{DispatchHandler, Dispatcher};
pub use event_queue::EventQueue;
pub use peer::{Peer, PeerConfig, StreamFactory, DEFAULT_MAX_PACKET_SIZE};
pub use session_manager::SessionManager;

// --- transport glue
pub use acceptor::Acceptor;
pub use connector::{Connector, MAX_BACKOFF};
pub use tlv::{read_frame, write_frame, TlvStream, TLV_HEADER_LEN};

// Internal helper shared by the read handler and the send loop.
pub(crate) use session::with_deadline;
