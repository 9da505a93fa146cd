//! [`EventQueue`]: the serialized execution context for application logic.
//!
//! # Design
//!
//! One tokio task owns the receiving end of an unbounded channel and runs
//! posted jobs strictly one after another, in post order. Session tasks never
//! run application callbacks themselves: the dispatcher posts them here, so
//! application state touched only from callbacks needs no locking, however
//! many sessions feed the queue.
//!
//! - Callers clone [`EventQueue`] and [`post`](EventQueue::post) futures.
//! - A job that panics is caught and logged; the queue keeps running.
//! - [`stop`](EventQueue::stop) ends the loop after the jobs already queued
//!   ahead of it; [`wait`](EventQueue::wait) resolves with the exit code.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

// ---

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// QueueCmd
// ---------------------------------------------------------------------------

enum QueueCmd {
    // ---
    Job(BoxFuture<'static, ()>),
    Stop(i32),
}

// ---------------------------------------------------------------------------
// EventQueue
// ---------------------------------------------------------------------------

/// Cheap-clone handle to a running queue task.
#[derive(Clone)]
pub struct EventQueue {
    // ---
    tx: mpsc::UnboundedSender<QueueCmd>,
    exit_rx: watch::Receiver<Option<i32>>,
}

// ---

impl EventQueue {
    // ---
    /// Spawn the queue task on the current tokio runtime.
    pub fn spawn() -> Self {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(run(rx, exit_tx));

        Self { tx, exit_rx }
    }

    // ---

    /// Queue `job` to run after everything posted before it.
    ///
    /// Returns `false` if the queue has stopped; the job is dropped.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx.send(QueueCmd::Job(job.boxed())).is_ok()
    }

    // ---

    /// Queue a synchronous closure.
    pub fn post_fn<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(async move { f() })
    }

    // ---

    /// Stop the loop once the jobs queued ahead of this call have run.
    pub fn stop(&self, exit_code: i32) {
        // ---
        if self.tx.send(QueueCmd::Stop(exit_code)).is_err() {
            tracing::debug!("event queue already stopped");
        }
    }

    // ---

    pub fn is_stopped(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    // ---

    /// Wait for the loop to exit and return its exit code.
    pub async fn wait(&self) -> i32 {
        // ---
        let mut rx = self.exit_rx.clone();
        // Bound to a local so the watch borrow ends before `rx` is dropped.
        let code = match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or_default(),
            Err(_) => {
                tracing::warn!("event queue task vanished without an exit code");
                -1
            }
        };
        code
    }
}

// ---------------------------------------------------------------------------
// Queue loop
// ---------------------------------------------------------------------------

async fn run(mut rx: mpsc::UnboundedReceiver<QueueCmd>, exit_tx: watch::Sender<Option<i32>>) {
    // ---
    let mut exit_code = 0;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            QueueCmd::Job(job) => {
                if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
                    tracing::error!("event queue job panicked: {}", panic_message(&*panic));
                }
            }
            QueueCmd::Stop(code) => {
                exit_code = code;
                break;
            }
        }
    }

    tracing::debug!(exit_code, "event queue loop exiting");
    exit_tx.send_replace(Some(exit_code));
}

// ---

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    // ---
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
