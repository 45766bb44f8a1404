//! # Ports
//!
//! A port is one record in the [`table::PortTable`]: a kind, an info block
//! of atomics, and a kind-shaped buffer. The buffer and the ring cursors are
//! only touched through a [`Busy`] guard, which exists exactly while the
//! current thread holds the port's BUSY status.

pub mod state;
pub mod table;

pub use state::PortStatus;

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};

use crate::config::TransferConfig;
use crate::error::Result;
use crate::poll::Events;
use crate::transfer::rendezvous::Slot;
use crate::transfer::ring::RingBuffer;
use crate::transfer::stream::StreamBuffer;
use state::AtomicStatus;

/// Transfer discipline of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Queue of immutable message references, strict FIFO
    RingOfHandles,
    /// Single-slot copy handoff
    Rendezvous,
    /// Bounded byte pipe with partial transfers
    ByteStream,
}

impl PortKind {
    pub const ALL: [PortKind; 3] = [
        PortKind::RingOfHandles,
        PortKind::Rendezvous,
        PortKind::ByteStream,
    ];
}

impl std::fmt::Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PortKind::RingOfHandles => "ring",
            PortKind::Rendezvous => "rendezvous",
            PortKind::ByteStream => "stream",
        };
        f.write_str(name)
    }
}

/// Atomically updated per-port fields
pub(crate) struct InfoBlock {
    /// Items (ring, rendezvous) or bytes (stream) currently queued
    pub(crate) length: AtomicUsize,
    /// Ring read cursor
    pub(crate) start: AtomicUsize,
    /// Ring write cursor
    pub(crate) end: AtomicUsize,
    pub(crate) status: AtomicStatus,
    event: AtomicU32,
    /// Event bits changed since the last notifier delivery
    pending: AtomicU32,
    /// Listeners currently attached (ring only)
    listeners: AtomicUsize,
}

impl InfoBlock {
    fn new(events: Events) -> Self {
        Self {
            length: AtomicUsize::new(0),
            start: AtomicUsize::new(0),
            end: AtomicUsize::new(0),
            status: AtomicStatus::new(PortStatus::Open),
            event: AtomicU32::new(events.bits()),
            pending: AtomicU32::new(0),
            listeners: AtomicUsize::new(0),
        }
    }

    pub(crate) fn events(&self) -> Events {
        Events::from_bits_truncate(self.event.load(Ordering::Acquire))
    }

    pub(crate) fn set_events(&self, events: Events) {
        self.event.store(events.bits(), Ordering::Release);
    }

    pub(crate) fn pending(&self) -> Events {
        Events::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }

    pub(crate) fn raise_pending(&self, events: Events) {
        self.pending.fetch_or(events.bits(), Ordering::AcqRel);
    }

    pub(crate) fn clear_pending(&self, events: Events) {
        self.pending.fetch_and(!events.bits(), Ordering::AcqRel);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::Acquire)
    }

    pub(crate) fn add_listener(&self) {
        self.listeners.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn remove_listener(&self) {
        let prev = self.listeners.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "listener count underflow");
    }
}

/// Kind-shaped storage behind a port
pub(crate) enum PortBuffer {
    Ring(RingBuffer),
    Rendezvous(Slot),
    Stream(StreamBuffer),
}

/// One port record
pub(crate) struct Port {
    kind: PortKind,
    index: u32,
    capacity: usize,
    info: InfoBlock,
    buffer: UnsafeCell<PortBuffer>,
}

// SAFETY: `buffer` is only reached through `Busy`, and a `Busy` exists only
// while its thread owns the BUSY status, so access is exclusive.
unsafe impl Sync for Port {}

impl Port {
    pub(crate) fn new(kind: PortKind, index: u32, transfer: &TransferConfig) -> Self {
        let (capacity, buffer) = match kind {
            PortKind::RingOfHandles => {
                let slots = transfer.ring_capacity();
                (slots, PortBuffer::Ring(RingBuffer::new(slots)))
            }
            PortKind::Rendezvous => (
                transfer.max_message_size,
                PortBuffer::Rendezvous(Slot::default()),
            ),
            PortKind::ByteStream => {
                let bytes = transfer.stream_buffer_bytes;
                (bytes, PortBuffer::Stream(StreamBuffer::new(bytes)))
            }
        };

        Self {
            kind,
            index,
            capacity,
            info: InfoBlock::new(Events::WRITABLE),
            buffer: UnsafeCell::new(buffer),
        }
    }

    pub(crate) fn kind(&self) -> PortKind {
        self.kind
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    /// Ring slots, rendezvous payload limit, or stream bytes
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn info(&self) -> &InfoBlock {
        &self.info
    }

    pub(crate) fn status(&self) -> PortStatus {
        self.info.status.load()
    }

    /// Acquire BUSY, spinning while another owner holds the port
    pub(crate) fn acquire(&self) -> Result<Busy<'_>> {
        self.info.status.acquire_busy()?;
        Ok(Busy {
            port: self,
            released: false,
        })
    }

    /// Point-in-time copy of the info block
    pub(crate) fn snapshot(&self) -> PortInfo {
        PortInfo {
            kind: self.kind,
            index: self.index,
            status: self.status(),
            length: self.info.length.load(Ordering::Acquire),
            capacity: self.capacity,
            events: self.info.events(),
            pending: self.info.pending(),
            listeners: self.info.listener_count(),
        }
    }
}

/// Exclusive access to a port while BUSY is held
///
/// Dropping the guard without [`Busy::release`] returns the port to OPEN.
pub(crate) struct Busy<'a> {
    port: &'a Port,
    released: bool,
}

impl<'a> Busy<'a> {
    pub(crate) fn port(&self) -> &'a Port {
        self.port
    }

    pub(crate) fn buffer(&mut self) -> &mut PortBuffer {
        // SAFETY: BUSY is held for the guard's lifetime and the borrow is
        // tied to `&mut self`.
        unsafe { &mut *self.port.buffer.get() }
    }

    /// Hand the port on with the given status
    pub(crate) fn release(mut self, status: PortStatus) {
        self.released = true;
        self.port.info.status.store(status);
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.port.info.status.store(PortStatus::Open);
        }
    }
}

/// Port metadata snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub kind: PortKind,
    pub index: u32,
    pub status: PortStatus,
    /// Queued messages (ring, rendezvous) or bytes (stream)
    pub length: usize,
    pub capacity: usize,
    pub events: Events,
    /// Event bits raised but not yet delivered by a notifier
    pub pending: Events,
    pub listeners: usize,
}
