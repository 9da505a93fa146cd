//! Lifecycle notifier.
//!
//! Connection lifecycle changes and failures become ordinary events pushed
//! through a handler chain, so applications see them the same way they see
//! traffic: as dispatched messages with reserved ids.

use std::sync::Arc;

// ---

use strand_domain::{LifecycleFault, LifecycleNotice, ResultCode};

// ---

use super::{EventKind, HandlerChain, Session, SessionEvent};

// ---

/// Dispatch an `Accepted` or `Connected` notice through `chain`.
pub async fn system_event(session: Option<Arc<Session>>, notice: LifecycleNotice, chain: &HandlerChain) {
    // ---
    let kind = match notice {
        LifecycleNotice::Accepted => EventKind::Accepted,
        LifecycleNotice::Connected => EventKind::Connected,
    };

    let mut ev = SessionEvent::new(kind, session).with_message(notice.message());
    chain.call(&mut ev).await;
}

// ---

/// Dispatch a `Closed`, `AcceptFailed` or `ConnectFailed` fault carrying
/// `result` through `chain`.
///
/// The code rides in the payload; the event itself stays `Ok` so every
/// handler in the chain sees it.
pub async fn system_error(
    session: Option<Arc<Session>>,
    fault: LifecycleFault,
    result: ResultCode,
    chain: &HandlerChain,
) {
    // ---
    let kind = match fault {
        LifecycleFault::Closed => EventKind::Closed,
        LifecycleFault::AcceptFailed => EventKind::AcceptFailed,
        LifecycleFault::ConnectFailed => EventKind::ConnectFailed,
    };

    let mut ev = SessionEvent::new(kind, session).with_message(fault.message(result));
    chain.call(&mut ev).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
