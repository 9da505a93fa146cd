//! [`Peer`]: one listener or dialer and the settings its sessions share.
//!
//! Configuration lives in an immutable [`PeerConfig`] snapshot behind an
//! `RwLock<Arc<_>>`. Session tasks clone the `Arc` and release the lock
//! immediately; setters build a new snapshot and swap it in, so a change
//! is seen by the next read or batch, never half-applied.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

// ---

use tokio::net::TcpStream;

// ---

use strand_domain::FramedStreamPtr;

// ---

use super::{
    // ---
    build_recv_chain,
    build_send_chain,
    Dispatcher,
    EventQueue,
    HandlerChain,
    Session,
    SessionEvent,
    SessionManager,
    TlvStream,
};

// ---

/// Default cap on a single payload, in bytes.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Wraps an accepted or dialed socket in a framing codec.
pub type StreamFactory = Arc<dyn Fn(TcpStream) -> FramedStreamPtr + Send + Sync>;

// ---------------------------------------------------------------------------
// PeerConfig
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PeerConfig {
    // ---
    pub name: String,

    /// Listen or dial address, as given by the user.
    pub address: String,

    /// Per-read deadline. Zero disables it.
    pub read_timeout: Duration,

    /// Deadline for writing and flushing one batch. Zero disables it.
    pub write_timeout: Duration,

    /// Largest accepted payload, both directions. Zero means unlimited,
    /// which lets a remote header announce any length up to 4 GiB.
    /// Defaults to [`DEFAULT_MAX_PACKET_SIZE`].
    pub max_packet_size: usize,

    /// `TCP_NODELAY` on accepted and dialed sockets.
    pub no_delay: bool,

    /// Whether the stock chains include the message log.
    pub message_log: bool,

    pub recv_chain: HandlerChain,
    pub send_chain: HandlerChain,

    /// Codec for TCP sockets from the acceptor and connector. `None` uses
    /// [`TlvStream`].
    pub stream_factory: Option<StreamFactory>,
}

// ---

impl PeerConfig {
    // ---
    /// Wrap `socket` with the configured factory, or in a [`TlvStream`].
    pub fn new_stream(&self, socket: TcpStream) -> FramedStreamPtr {
        // ---
        match &self.stream_factory {
            Some(factory) => factory(socket),
            None => Arc::new(TlvStream::new(socket)),
        }
    }
}

// ---

impl fmt::Debug for PeerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConfig")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("max_packet_size", &self.max_packet_size)
            .field("no_delay", &self.no_delay)
            .field("message_log", &self.message_log)
            .field("recv_chain", &self.recv_chain)
            .field("send_chain", &self.send_chain)
            .field("stream_factory", &self.stream_factory.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

pub struct Peer {
    // ---
    config: RwLock<Arc<PeerConfig>>,
    dispatcher: Arc<Dispatcher>,
    sessions: SessionManager,
}

// ---

impl Peer {
    // ---
    /// A peer whose application callbacks run on `queue`, with the stock
    /// receive and send chains and no deadlines.
    pub fn new(queue: EventQueue) -> Arc<Self> {
        // ---
        let dispatcher = Arc::new(Dispatcher::new(queue));

        let config = PeerConfig {
            name: String::new(),
            address: String::new(),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            no_delay: true,
            message_log: false,
            recv_chain: build_recv_chain(false, Arc::clone(&dispatcher)),
            send_chain: build_send_chain(false),
            stream_factory: None,
        };

        Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            dispatcher,
            sessions: SessionManager::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<PeerConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    // ---

    /// Replace the snapshot with a modified copy.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut PeerConfig),
    {
        // ---
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PeerConfig::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    // ---

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.update(|cfg| cfg.name = name);
    }

    pub fn set_address(&self, address: impl Into<String>) {
        let address = address.into();
        self.update(|cfg| cfg.address = address);
    }

    /// Name if set, otherwise the address. Used in log lines.
    pub fn name_or_address(&self) -> String {
        // ---
        let cfg = self.config();
        if cfg.name.is_empty() {
            cfg.address.clone()
        } else {
            cfg.name.clone()
        }
    }

    // ---

    pub fn set_socket_deadline(&self, read: Duration, write: Duration) {
        self.update(|cfg| {
            cfg.read_timeout = read;
            cfg.write_timeout = write;
        });
    }

    pub fn socket_deadline(&self) -> (Duration, Duration) {
        let cfg = self.config();
        (cfg.read_timeout, cfg.write_timeout)
    }

    pub fn set_max_packet_size(&self, size: usize) {
        self.update(|cfg| cfg.max_packet_size = size);
    }

    /// Plug in a framing codec for TCP sockets; `None` restores
    /// [`TlvStream`].
    pub fn set_stream_factory(&self, factory: Option<StreamFactory>) {
        self.update(|cfg| cfg.stream_factory = factory);
    }

    pub fn set_no_delay(&self, no_delay: bool) {
        self.update(|cfg| cfg.no_delay = no_delay);
    }

    // ---

    /// Toggle the message log. Rebuilds both chains from the stock layout,
    /// replacing any custom chains.
    pub fn set_message_log(&self, enabled: bool) {
        // ---
        let recv_chain = build_recv_chain(enabled, Arc::clone(&self.dispatcher));
        let send_chain = build_send_chain(enabled);
        self.update(|cfg| {
            cfg.message_log = enabled;
            cfg.recv_chain = recv_chain;
            cfg.send_chain = send_chain;
        });
    }

    // ---

    pub fn set_handler_chains(&self, recv: HandlerChain, send: HandlerChain) {
        self.update(|cfg| {
            cfg.recv_chain = recv;
            cfg.send_chain = send;
        });
    }

    pub fn handler_chains(&self) -> (HandlerChain, HandlerChain) {
        let cfg = self.config();
        (cfg.recv_chain.clone(), cfg.send_chain.clone())
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn queue(&self) -> &EventQueue {
        self.dispatcher.queue()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // ---

    /// Shorthand for `dispatcher().register(..)`.
    pub fn register<F, Fut>(&self, msg_id: u32, callback: F)
    where
        F: Fn(SessionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher.register(msg_id, callback);
    }

    // ---

    /// Build a session over `stream`, register it, and run it with a close
    /// hook that unregisters it.
    pub fn spawn_session(self: &Arc<Self>, stream: FramedStreamPtr) -> Arc<Session> {
        // ---
        let ses = Session::new(stream, Arc::clone(self));
        self.sessions.add(Arc::clone(&ses));

        let peer = Arc::clone(self);
        ses.run(move |ses| {
            peer.sessions.remove(ses);
        });

        ses
    }
}

// ---

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("config", &self.config())
            .field("sessions", &self.sessions.count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
