//! In-process [`FramedStream`](strand_domain::FramedStream) implementations
//! for strand tests and demos.
//!
//! - [`LinkSimStream`]: connected endpoint pairs over tokio channels, with
//!   optional seeded frame loss and duplication ([`LinkSimConfig`]).
//! - [`ScriptedStream`]: a single endpoint that replays a fixed list of
//!   inbound frames, then fails or hangs, and records every write, flush
//!   and close for later inspection.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use strand_link_sim::{LinkSimConfig, LinkSimStream};
//!
//! let (client, server) = LinkSimStream::pair(LinkSimConfig::lossy(0.05, 7));
//! ```

mod config;
mod scripted;
mod stream;

// --- public API
pub use config::LinkSimConfig;
pub use scripted::{ScriptEnd, ScriptedStream, StreamOp};
pub use stream::LinkSimStream;
