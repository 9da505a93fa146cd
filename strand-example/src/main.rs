//! strand example: echo server, echo clients and a link-sim demo.
//!
//! Run with:
//!   cargo run -p strand-example -- server
//!   cargo run -p strand-example -- client --clients 8 --seconds 5
//!   cargo run -p strand-example -- --message-log link-sim --count 200
//!
//! `RUST_LOG` controls verbosity; `RUST_LOG=strand::msglog=debug` together
//! with `--message-log` prints every message.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strand_socket::{EventQueue, Peer};

mod config;
mod echo;
mod link_sim_demo;

use config::{Config, Mode};

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    let cfg = Config::parse();

    let no_color = std::env::var("EMACS").is_ok()
        || std::env::var("NO_COLOR").is_ok()
        || std::env::var("CARGO_TERM_COLOR").as_deref() == Ok("never")
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!no_color)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "strand-example starting");

    let queue = EventQueue::spawn();

    match &cfg.mode {
        Mode::Server { bind } => {
            let peer = new_peer(&cfg, &queue, "echo-server");
            echo::serve(peer, *bind).await?;
        }
        Mode::Client {
            peer: addr,
            clients,
            seconds,
            reconnect,
        } => {
            let peer = new_peer(&cfg, &queue, "echo-client");
            echo::run_clients(peer, *addr, *clients, *seconds, *reconnect).await?;
        }
        Mode::LinkSim {
            count,
            drop_percent,
            seed,
        } => {
            let sender = new_peer(&cfg, &queue, "link-sim-a");
            let receiver = new_peer(&cfg, &queue, "link-sim-b");
            link_sim_demo::run(sender, receiver, *count, *drop_percent, *seed).await?;
        }
    }

    queue.stop(0);
    let code = queue.wait().await;
    info!(code, "event queue stopped");

    Ok(())
}

// ---

/// A peer on the shared queue with the CLI's deadlines and limits applied.
fn new_peer(cfg: &Config, queue: &EventQueue, name: &str) -> Arc<Peer> {
    // ---
    let peer = Peer::new(queue.clone());
    peer.set_name(name);
    peer.set_socket_deadline(cfg.read_timeout(), cfg.write_timeout());
    peer.set_max_packet_size(cfg.max_packet_size);
    if cfg.message_log {
        peer.set_message_log(true);
    }
    peer
}
