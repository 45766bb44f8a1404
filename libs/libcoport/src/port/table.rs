//! Port table
//!
//! One fixed-capacity arena per port kind. Slots are handed out by an atomic
//! cursor and are never reclaimed: a closed port keeps its slot until the
//! engine is dropped, and once a kind's arena is exhausted every further
//! `allocate` for that kind fails.

use core::sync::atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};
use spin::Once;

use super::{Port, PortKind};
use crate::config::{CoportConfig, TransferConfig};
use crate::error::{CoportError, Result};

/// Allocate-once storage for ports of one kind
struct Arena {
    kind: PortKind,
    slots: Box<[Once<Port>]>,
    next: AtomicUsize,
}

impl Arena {
    fn new(kind: PortKind, capacity: usize) -> Self {
        Self {
            kind,
            slots: (0..capacity).map(|_| Once::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    fn allocate(&self, transfer: &TransferConfig) -> Option<&Port> {
        let capacity = self.slots.len();
        let index = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .ok()?;

        // The cursor hands each index out once, so this never contends.
        Some(self.slots[index].call_once(|| Port::new(self.kind, index as u32, transfer)))
    }

    fn get(&self, index: u32) -> Option<&Port> {
        self.slots.get(index as usize)?.get()
    }

    fn allocated(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Type-segregated port storage
pub(crate) struct PortTable {
    ring: Arena,
    rendezvous: Arena,
    stream: Arena,
    transfer: TransferConfig,
    notifiers: usize,
    active: AtomicUsize,
}

impl PortTable {
    pub(crate) fn new(config: &CoportConfig) -> Self {
        Self {
            ring: Arena::new(PortKind::RingOfHandles, config.table.ring_ports),
            rendezvous: Arena::new(PortKind::Rendezvous, config.table.rendezvous_ports),
            stream: Arena::new(PortKind::ByteStream, config.table.stream_ports),
            transfer: config.transfer.clone(),
            notifiers: config.notifier.workers,
            active: AtomicUsize::new(0),
        }
    }

    fn arena(&self, kind: PortKind) -> &Arena {
        match kind {
            PortKind::RingOfHandles => &self.ring,
            PortKind::Rendezvous => &self.rendezvous,
            PortKind::ByteStream => &self.stream,
        }
    }

    /// Reserve and initialise the next free slot for `kind`
    pub(crate) fn allocate(&self, kind: PortKind) -> Result<&Port> {
        let port = self
            .arena(kind)
            .allocate(&self.transfer)
            .ok_or(CoportError::CapacityExceeded(kind))?;
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(port)
    }

    /// Check that `index` names an initialised slot in `kind`'s arena
    pub(crate) fn contains(&self, index: u32, kind: PortKind) -> bool {
        self.arena(kind).get(index).is_some()
    }

    pub(crate) fn get(&self, kind: PortKind, index: u32) -> Option<&Port> {
        self.arena(kind).get(index)
    }

    /// Notifier worker responsible for the port at `index`
    pub(crate) fn notifier_index(&self, index: u32) -> usize {
        // Fibonacci hashing spreads sequential slots across workers
        let hash = (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        (hash as usize) % self.notifiers
    }

    /// Total ports allocated across all kinds
    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn usage(&self, kind: PortKind) -> TableUsage {
        let arena = self.arena(kind);
        TableUsage {
            allocated: arena.allocated(),
            capacity: arena.capacity(),
        }
    }
}

/// Allocation counters for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableUsage {
    pub allocated: usize,
    pub capacity: usize,
}

impl TableUsage {
    pub fn remaining(&self) -> usize {
        self.capacity - self.allocated
    }
}
