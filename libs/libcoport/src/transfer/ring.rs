//! Ring-of-handles transfer
//!
//! The buffer is a circular array of message references. Sending copies the
//! payload once into engine-owned storage; receiving hands that storage out
//! as a read-only [`MessageRef`]. The sender keeps full use of its own
//! buffer. Cursors live in the port's info block and move only under BUSY.

use core::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::{CoportError, Result};
use crate::poll::Events;
use crate::port::{Busy, PortBuffer};

/// Read-only reference to a message stored by the engine
#[derive(Clone, PartialEq, Eq)]
pub struct MessageRef(Arc<[u8]>);

impl MessageRef {
    pub(crate) fn copy_from(payload: &[u8]) -> Self {
        Self(Arc::from(payload))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check whether two references name the same stored message
    pub fn same_message(&self, other: &MessageRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl core::ops::Deref for MessageRef {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for MessageRef {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageRef({} bytes)", self.0.len())
    }
}

/// Fixed circular array of stored references
pub(crate) struct RingBuffer {
    slots: Box<[Option<MessageRef>]>,
}

impl RingBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }
}

fn ring<'b>(busy: &'b mut Busy<'_>) -> &'b mut RingBuffer {
    match busy.buffer() {
        PortBuffer::Ring(ring) => ring,
        _ => unreachable!("ring transfer on a non-ring port"),
    }
}

/// Enqueue `message` at the write cursor
pub(crate) fn send(busy: &mut Busy<'_>, message: MessageRef) -> Result<usize> {
    let port = busy.port();
    let info = port.info();
    let capacity = port.capacity();
    let length = info.length.load(Ordering::Acquire);
    let events = info.events();

    if length == capacity || !events.contains(Events::WRITABLE) {
        info.set_events(events | Events::WRITE_ERROR);
        return Err(CoportError::WouldBlock);
    }

    let size = message.len();
    let end = info.end.load(Ordering::Acquire);
    ring(busy).slots[end] = Some(message);

    info.end.store((end + 1) % capacity, Ordering::Release);
    info.length.store(length + 1, Ordering::Release);

    let mut next = (events | Events::READABLE) - Events::WRITE_ERROR;
    if length + 1 == capacity {
        next -= Events::WRITABLE;
    }
    info.set_events(next);

    tracing::trace!(port = port.index(), length = length + 1, size, "ring send");
    Ok(size)
}

/// Dequeue the message at the read cursor if it is at most `limit` bytes
///
/// An empty ring yields `Ok(None)` and raises READ_ERROR. A head message
/// larger than `limit` is left in place.
pub(crate) fn receive(busy: &mut Busy<'_>, limit: usize) -> Result<Option<MessageRef>> {
    let port = busy.port();
    let info = port.info();
    let capacity = port.capacity();
    let length = info.length.load(Ordering::Acquire);
    let events = info.events();

    if length == 0 {
        info.set_events(events | Events::READ_ERROR);
        return Ok(None);
    }

    let start = info.start.load(Ordering::Acquire);
    let slot = &mut ring(busy).slots[start];
    let head_len = slot
        .as_ref()
        .map(|message| message.len())
        .unwrap_or_else(|| panic!("ring slot {} empty with length {}", start, length));
    if head_len > limit {
        return Err(CoportError::invalid(format!(
            "receive buffer of {} bytes cannot hold {}-byte message",
            limit, head_len
        )));
    }
    let message = slot.take();

    info.start.store((start + 1) % capacity, Ordering::Release);
    info.length.store(length - 1, Ordering::Release);

    let mut next = (events | Events::WRITABLE) - Events::READ_ERROR;
    if length == 1 {
        next -= Events::READABLE;
    }
    info.set_events(next);

    tracing::trace!(port = port.index(), length = length - 1, size = head_len, "ring receive");
    Ok(message)
}

/// Drop every queued reference and mark the port closed
pub(crate) fn drain(busy: &mut Busy<'_>) {
    let info = busy.port().info();
    for slot in ring(busy).slots.iter_mut() {
        *slot = None;
    }
    info.start.store(0, Ordering::Release);
    info.end.store(0, Ordering::Release);
    info.length.store(0, Ordering::Release);
}
