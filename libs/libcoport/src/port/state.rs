//! Port status word and transition combinator
//!
//! Every port carries one atomic status byte. Mutators win a CAS into
//! [`PortStatus::Busy`] before touching buffer or cursor state, and publish
//! the outcome by storing the next status when they finish. All transition
//! sites go through [`AtomicStatus::transition`], which re-reads and retries
//! on a lost race without backoff.

use core::sync::atomic::{AtomicU8, Ordering};
use serde::{Deserialize, Serialize};

use crate::error::{CoportError, Result};

/// Port state machine values
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortStatus {
    /// Idle, ready for an operation
    Open = 0,
    /// An operation is mutating buffer, cursor or event fields
    Busy = 1,
    /// Close requested, event delivery still pending
    Closing = 2,
    /// Terminal
    Closed = 3,
    /// Ring mutation complete, event delivery pending
    Done = 4,
    /// A notifier is delivering events for this ring
    Polling = 5,
}

impl PortStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Busy,
            2 => Self::Closing,
            3 => Self::Closed,
            4 => Self::Done,
            5 => Self::Polling,
            _ => panic!("corrupt port status word: {}", raw),
        }
    }

    /// Closed or on the way there
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Decision taken by a transition site for one observed status
pub(crate) enum Step {
    /// Attempt to CAS the observed status to this one
    Swap(PortStatus),
    /// Another party owns the port; re-read and try again
    Retry,
    /// Give up with this error
    Fail(CoportError),
}

/// Atomic holder for a [`PortStatus`]
pub(crate) struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub(crate) const fn new(status: PortStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub(crate) fn load(&self) -> PortStatus {
        PortStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Publish a new status. Only the current owner (BUSY, DONE or POLLING
    /// holder) may do this.
    pub(crate) fn store(&self, status: PortStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Run `decide` against the current status until a CAS succeeds or the
    /// site gives up. Returns the status that was replaced.
    pub(crate) fn transition<F>(&self, mut decide: F) -> Result<PortStatus>
    where
        F: FnMut(PortStatus) -> Step,
    {
        loop {
            let current = self.0.load(Ordering::Acquire);
            match decide(PortStatus::from_raw(current)) {
                Step::Swap(next) => {
                    if self
                        .0
                        .compare_exchange_weak(
                            current,
                            next as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return Ok(PortStatus::from_raw(current));
                    }
                }
                Step::Retry => {}
                Step::Fail(err) => return Err(err),
            }
            core::hint::spin_loop();
        }
    }

    /// OPEN -> BUSY, waiting out other owners, failing on a closed port
    pub(crate) fn acquire_busy(&self) -> Result<()> {
        self.transition(|status| match status {
            PortStatus::Open => Step::Swap(PortStatus::Busy),
            PortStatus::Closing | PortStatus::Closed => Step::Fail(CoportError::PipeClosed),
            PortStatus::Busy | PortStatus::Done | PortStatus::Polling => Step::Retry,
        })
        .map(|_| ())
    }
}
