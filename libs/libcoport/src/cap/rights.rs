//! Port handle rights

use bitflags::bitflags;

bitflags! {
    /// Operations a port handle may perform
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        /// Send data into the port
        const SEND = 1 << 0;
        /// Receive data from the port
        const RECEIVE = 1 << 1;
        /// Register poll interest
        const POLL = 1 << 2;
        /// Close the port
        const CLOSE = 1 << 3;
        /// Derive new handles (delegation)
        const GRANT = 1 << 4;
        /// Read port metadata
        const INSPECT = 1 << 5;

        /// Producer side of a port
        const PRODUCER = Self::SEND.bits() | Self::POLL.bits();
        /// Consumer side of a port
        const CONSUMER = Self::RECEIVE.bits() | Self::POLL.bits();
    }
}

impl Rights {
    /// Rights carried by the handle returned from `open`
    pub const OWNER: Rights = Rights::all();
}
