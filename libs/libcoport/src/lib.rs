//! # libcoport - Coport Transfer Engine
//!
//! Capability-gated communication ports with readiness polling.
//!
//! ## Features
//!
//! - **Ring of handles** - FIFO of immutable message references, one copy per send
//! - **Rendezvous** - Single-slot copy handoff
//! - **Byte stream** - Bounded pipe with partial reads and writes
//! - **Polling** - Wait on READABLE, WRITABLE or CLOSED across many rings
//! - **Capabilities** - Handles carry rights and can be narrowed with `derive`
//!
//! ## Quick Start
//!
//! ```no_run
//! use libcoport::{CoportConfig, CoportEngine, Events, PollRequest, PortKind};
//! use std::time::Duration;
//!
//! let engine = CoportEngine::new(CoportConfig::default())?;
//! let ring = engine.open(PortKind::RingOfHandles)?;
//!
//! engine.send(&ring, b"Hello!")?;
//!
//! let mut requests = [PollRequest::new(ring.clone(), Events::READABLE)];
//! engine.poll(&mut requests, Some(Duration::from_secs(1)))?;
//!
//! let message = engine.receive_message(&ring)?;
//! assert_eq!(message.as_deref(), Some(&b"Hello!"[..]));
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Port Lifecycle
//!
//! ```text
//!           acquire            release
//!   OPEN ───────────► BUSY ───────────► OPEN
//!                      │
//!                      ├──► DONE ──► POLLING ──► OPEN      (ring, listeners attached)
//!                      │
//!                      └──► CLOSING ──► [POLLING] ──► CLOSED
//! ```

pub mod cap;
pub mod config;
pub mod error;
pub mod poll;
pub mod port;

mod engine;
mod transfer;

pub use cap::{PortHandle, Rights};
pub use config::{CoportConfig, REFERENCE_SIZE};
pub use engine::{CoportEngine, EngineStats};
pub use error::{CoportError, ErrorCode, Result};
pub use poll::{Events, PollRequest};
pub use port::table::TableUsage;
pub use port::{PortInfo, PortKind, PortStatus};
pub use transfer::MessageRef;
