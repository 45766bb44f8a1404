//! # Readiness Polling
//!
//! Callers learn when rings become readable, writable or closed.
//!
//! ## Flow
//!
//! 1. Snapshot `events & interest` for every requested ring; any match
//!    returns at once.
//! 2. With a zero timeout and no match, fail with `WouldBlock`.
//! 3. Otherwise attach a listener per ring (each under that ring's BUSY),
//!    all sharing one waiter, and sleep until a notifier wakes the waiter or
//!    the timeout passes.
//! 4. Detach every listener and report the final matches.
//!
//! Event production lives on the transfer side: a ring whose mask changes
//! while listeners are attached is queued on its notifier (see
//! [`notifier`]).

pub(crate) mod listener;
pub(crate) mod notifier;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::cap::{PortHandle, Rights};
use crate::engine::Shared;
use crate::error::{CoportError, Result};
use crate::port::{Port, PortKind};
use listener::{Listener, Waiter};

bitflags! {
    /// Port readiness bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Events: u32 {
        /// Data is queued
        const READABLE = 1 << 0;
        /// Space is available
        const WRITABLE = 1 << 1;
        /// Port has been closed
        const CLOSED = 1 << 2;
        /// Last receive found nothing queued
        const READ_ERROR = 1 << 3;
        /// Last send was refused for lack of space
        const WRITE_ERROR = 1 << 4;
    }
}

/// One entry of a poll call
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub handle: PortHandle,
    pub interest: Events,
    /// Matched events, filled in by `poll`
    pub revents: Events,
}

impl PollRequest {
    pub fn new(handle: PortHandle, interest: Events) -> Self {
        Self {
            handle,
            interest,
            revents: Events::empty(),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.revents.is_empty()
    }
}

/// Fill `revents` from current port state and count ready entries
fn snapshot(requests: &mut [PollRequest], ports: &[&Port]) -> usize {
    requests
        .iter_mut()
        .zip(ports)
        .map(|(request, port)| {
            request.revents = port.info().events() & request.interest;
            request.is_ready()
        })
        .filter(|ready| *ready)
        .count()
}

pub(crate) fn poll(
    shared: &Shared,
    requests: &mut [PollRequest],
    timeout: Option<Duration>,
) -> Result<usize> {
    if requests.is_empty() {
        return Err(CoportError::invalid("poll needs at least one port"));
    }

    let ports = requests
        .iter()
        .map(|request| {
            if request.handle.kind() != PortKind::RingOfHandles {
                return Err(CoportError::invalid(format!(
                    "poll is only supported on ring ports, not {}",
                    request.handle.kind()
                )));
            }
            shared.resolve(&request.handle, Rights::POLL)
        })
        .collect::<Result<Vec<_>>>()?;

    let ready = snapshot(requests, &ports);
    if ready > 0 {
        return Ok(ready);
    }
    if timeout == Some(Duration::ZERO) {
        return Err(CoportError::WouldBlock);
    }

    // A deadline past what Instant can represent means wait forever
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let waiter = Arc::new(Waiter::new());
    let mut listeners = Vec::with_capacity(ports.len());
    let mut attached = 0;

    for (request, port) in requests.iter().zip(&ports) {
        let listener = Arc::new(Listener::new(request.interest, Arc::clone(&waiter)));
        match port.acquire() {
            Ok(busy) => {
                shared.listeners.attach(port, Arc::clone(&listener));
                // Catch anything that changed since the snapshot
                listener.offer(port.info().events());
                drop(busy);
                attached += 1;
                listeners.push(Some(listener));
            }
            Err(_) => {
                // A closing ring never changes again; one look is enough
                listener.offer(port.info().events());
                listeners.push(None);
            }
        }
    }

    if attached > 0 {
        let woken = waiter.wait(deadline);
        trace!(engine = shared.id, rings = attached, woken, "Poll wait finished");
    }

    for (port, listener) in ports.iter().zip(&listeners) {
        let Some(listener) = listener else {
            continue;
        };
        match port.acquire() {
            Ok(busy) => {
                shared.listeners.detach(port, listener);
                drop(busy);
            }
            Err(_) => shared.listeners.detach(port, listener),
        }
    }

    // Matches a notifier recorded still count if the state has since moved on
    let mut ready = 0;
    for ((request, port), listener) in requests.iter_mut().zip(&ports).zip(&listeners) {
        let recorded = listener
            .as_ref()
            .map(|l| l.matched())
            .unwrap_or_else(Events::empty);
        request.revents = (port.info().events() | recorded) & request.interest;
        if !request.revents.is_empty() {
            ready += 1;
        }
    }
    Ok(ready)
}
