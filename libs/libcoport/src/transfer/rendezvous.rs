//! Rendezvous transfer
//!
//! A single slot. The sender's bytes are copied into the slot and the
//! receiver's destination buffer is filled from it, so exactly one transfer
//! is ever in flight per port. The engine performs both copies; neither side
//! sees the other's memory.

use core::sync::atomic::Ordering;

use crate::error::{CoportError, Result};
use crate::poll::Events;
use crate::port::{Busy, PortBuffer};

/// Single pending payload
#[derive(Default)]
pub(crate) struct Slot {
    data: Option<Box<[u8]>>,
}

fn slot<'b>(busy: &'b mut Busy<'_>) -> &'b mut Slot {
    match busy.buffer() {
        PortBuffer::Rendezvous(slot) => slot,
        _ => unreachable!("rendezvous transfer on a non-rendezvous port"),
    }
}

/// Place `payload` in the slot if it is free
pub(crate) fn send(busy: &mut Busy<'_>, payload: &[u8]) -> Result<usize> {
    let info = busy.port().info();
    let slot = slot(busy);

    if slot.data.is_some() {
        info.set_events(info.events() | Events::WRITE_ERROR);
        return Err(CoportError::WouldBlock);
    }

    slot.data = Some(Box::from(payload));
    info.length.store(1, Ordering::Release);
    info.set_events((info.events() | Events::READABLE) - Events::WRITABLE - Events::WRITE_ERROR);

    tracing::trace!(
        port = busy.port().index(),
        length = 1,
        size = payload.len(),
        "rendezvous send"
    );
    Ok(payload.len())
}

/// Copy the pending payload into `dest` and free the slot
///
/// Returns 0 when nothing is pending. A destination shorter than the
/// payload is rejected and the payload stays in the slot.
pub(crate) fn receive(busy: &mut Busy<'_>, dest: &mut [u8]) -> Result<usize> {
    let info = busy.port().info();
    let slot = slot(busy);

    let Some(data) = slot.data.as_ref() else {
        info.set_events(info.events() | Events::READ_ERROR);
        return Ok(0);
    };
    if data.len() > dest.len() {
        return Err(CoportError::invalid(format!(
            "destination of {} bytes cannot hold {}-byte payload",
            dest.len(),
            data.len()
        )));
    }

    let size = data.len();
    dest[..size].copy_from_slice(data);
    slot.data = None;
    info.length.store(0, Ordering::Release);
    info.set_events((info.events() | Events::WRITABLE) - Events::READABLE - Events::READ_ERROR);

    tracing::trace!(port = busy.port().index(), length = 0, size, "rendezvous receive");
    Ok(size)
}

pub(crate) fn drain(busy: &mut Busy<'_>) {
    let info = busy.port().info();
    slot(busy).data = None;
    info.length.store(0, Ordering::Release);
}
