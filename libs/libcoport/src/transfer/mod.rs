//! Transfer disciplines
//!
//! Each discipline operates on a port whose BUSY the caller already holds
//! and leaves the event mask consistent with the new length before
//! returning. The engine decides what status to release to.

pub mod ring;
pub(crate) mod rendezvous;
pub(crate) mod stream;

pub use ring::MessageRef;

use crate::port::{Busy, PortKind};

/// Discard whatever the port holds
pub(crate) fn drain(busy: &mut Busy<'_>) {
    match busy.port().kind() {
        PortKind::RingOfHandles => ring::drain(busy),
        PortKind::Rendezvous => rendezvous::drain(busy),
        PortKind::ByteStream => stream::drain(busy),
    }
}
