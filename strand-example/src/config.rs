//! CLI configuration for `strand-example`.
//!
//! Run modes:
//!   strand-example server [--bind 127.0.0.1:7201]
//!   strand-example client --peer 127.0.0.1:7201 [--clients 4] [--seconds 10]
//!   strand-example link-sim [--count 1000] [--drop-percent 0.05]

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "strand-example", about = "strand session engine demos")]
pub struct Config {
    // ---
    #[command(subcommand)]
    pub mode: Mode,

    /// Log every sent and received message under the `strand::msglog`
    /// target (needs `RUST_LOG=strand::msglog=debug` or broader).
    #[arg(long, default_value_t = false)]
    pub message_log: bool,

    /// Per-read deadline in milliseconds. 0 = none.
    #[arg(long, default_value_t = 0)]
    pub read_timeout_ms: u64,

    /// Per-batch write deadline in milliseconds. 0 = none.
    #[arg(long, default_value_t = 0)]
    pub write_timeout_ms: u64,

    /// Largest accepted payload in bytes. 0 = unlimited.
    #[arg(long, default_value_t = strand_socket::DEFAULT_MAX_PACKET_SIZE)]
    pub max_packet_size: usize,
}

impl Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

// ---

#[derive(Debug, Subcommand)]
pub enum Mode {
    // ---
    /// Accept connections and echo every message back.
    Server {
        /// TCP address to listen on.
        #[arg(long, default_value = "127.0.0.1:7201")]
        bind: SocketAddr,
    },

    /// Dial an echo server with several clients and report round trips per
    /// second.
    Client {
        // ---
        /// Address of the echo server.
        #[arg(long, default_value = "127.0.0.1:7201")]
        peer: SocketAddr,

        /// Number of concurrent connections.
        #[arg(long, default_value_t = 4)]
        clients: usize,

        /// How long to run before closing.
        #[arg(long, default_value_t = 10)]
        seconds: u64,

        /// Re-dial with back-off when a connection drops.
        #[arg(long, default_value_t = false)]
        reconnect: bool,
    },

    /// Push messages across an in-process lossy link and count what arrives.
    LinkSim {
        // ---
        /// Messages to send.
        #[arg(long, default_value_t = 1000)]
        count: u32,

        /// Probability `[0.0, 1.0]` that a frame is dropped.
        #[arg(long, default_value_t = 0.05)]
        drop_percent: f64,

        /// RNG seed for a reproducible run.
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}
