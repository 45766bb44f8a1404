//! # Coport Engine
//!
//! Owns the port table, the listener registry and the notifier pool, and
//! exposes the handle-based operations. Every operation first passes the
//! capability gate (`Shared::resolve`), then takes the port's BUSY status
//! for the duration of the transfer.
//!
//! ## Ring event flow
//!
//! After a ring transfer the engine compares the event mask with the one
//! it found. If nothing changed, or nobody is listening, the port goes
//! straight back to OPEN. Otherwise the changed bits are raised as pending,
//! the port is parked in DONE and queued on its notifier, which delivers
//! the events and reopens the port.

use core::sync::atomic::{AtomicU64, Ordering};
use crossbeam::channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::cap::{PortHandle, Rights};
use crate::config::CoportConfig;
use crate::error::{CoportError, Result};
use crate::poll::listener::ListenerRegistry;
use crate::poll::notifier::{self, Notice, NotifierPool};
use crate::poll::{self, Events, PollRequest};
use crate::port::table::{PortTable, TableUsage};
use crate::port::{Busy, Port, PortInfo, PortKind, PortStatus};
use crate::transfer::{self, rendezvous, ring, stream, MessageRef};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between the engine handle and its notifier threads
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) config: CoportConfig,
    pub(crate) table: PortTable,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) notifiers: NotifierPool,
}

impl Shared {
    pub(crate) fn new(id: u64, config: CoportConfig) -> (Self, Vec<Receiver<Notice>>) {
        let (notifiers, receivers) = NotifierPool::new(&config.notifier);
        let shared = Self {
            id,
            table: PortTable::new(&config),
            listeners: ListenerRegistry::new(config.table.ring_ports),
            notifiers,
            config,
        };
        (shared, receivers)
    }

    /// Capability gate: map a handle to its port if it was issued by this
    /// engine, names an allocated slot and carries `required`
    pub(crate) fn resolve(&self, handle: &PortHandle, required: Rights) -> Result<&Port> {
        if handle.engine() != self.id {
            return Err(CoportError::invalid("handle was issued by another engine"));
        }
        let port = self
            .table
            .get(handle.kind(), handle.index())
            .ok_or_else(|| {
                CoportError::invalid(format!(
                    "no {} port in slot {}",
                    handle.kind(),
                    handle.index()
                ))
            })?;
        handle.require(required)?;
        Ok(port)
    }

    /// Release a ring after a transfer, routing event changes to listeners
    ///
    /// A ring nobody is polling skips DONE and never accumulates pending
    /// bits; pollers read the live mask when they attach.
    fn finish_ring(&self, busy: Busy<'_>, before: Events) {
        let port = busy.port();
        let changed = before ^ port.info().events();
        if changed.is_empty() || port.info().listener_count() == 0 {
            busy.release(PortStatus::Open);
            return;
        }

        port.info().raise_pending(changed);
        busy.release(PortStatus::Done);
        self.dispatch(port);
    }

    /// Hand a parked ring to its notifier, or deliver here if the queue is full
    fn dispatch(&self, port: &Port) {
        let worker = self.table.notifier_index(port.index());
        if !self.notifiers.notify(worker, port.index()) {
            warn!(
                engine = self.id,
                port = port.index(),
                worker,
                "Notifier queue saturated, delivering inline"
            );
            notifier::deliver(self, port.index());
        }
    }
}

/// Per-kind allocation counters plus totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub active: usize,
    pub ring: TableUsage,
    pub rendezvous: TableUsage,
    pub stream: TableUsage,
    pub notifiers: usize,
}

/// Coport transfer engine
pub struct CoportEngine {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl CoportEngine {
    /// Build an engine and start its notifier threads
    pub fn new(config: CoportConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let (shared, receivers) = Shared::new(id, config);
        let shared = Arc::new(shared);

        // On failure the workers that did start are already stopped and joined
        let workers = notifier::spawn_workers(&shared, receivers)
            .map_err(|e| anyhow::Error::new(e).context("Failed to start notifier threads"))?;

        debug!(engine = id, workers = workers.len(), "Coport engine started");
        Ok(Self { shared, workers })
    }

    pub fn config(&self) -> &CoportConfig {
        &self.shared.config
    }

    /// Allocate a port of `kind` and return a handle holding every right
    pub fn open(&self, kind: PortKind) -> Result<PortHandle> {
        let port = self.shared.table.allocate(kind).inspect_err(|_| {
            warn!(engine = self.shared.id, %kind, "Port table exhausted");
        })?;

        debug!(engine = self.shared.id, %kind, port = port.index(), "Opened port");
        Ok(PortHandle::new(
            self.shared.id,
            kind,
            port.index(),
            Rights::OWNER,
        ))
    }

    /// Check whether `handle` names a live slot of this engine
    pub fn owns(&self, handle: &PortHandle) -> bool {
        handle.engine() == self.shared.id
            && self.shared.table.contains(handle.index(), handle.kind())
    }

    /// Close a port, discarding anything queued
    ///
    /// Closing twice fails with `PipeClosed`. Listeners attached to a ring
    /// are woken with CLOSED.
    pub fn close(&self, handle: &PortHandle) -> Result<()> {
        let port = self.shared.resolve(handle, Rights::CLOSE)?;
        let mut busy = port.acquire()?;

        let before = port.info().events();
        transfer::drain(&mut busy);
        let after = (before | Events::CLOSED) - Events::READABLE - Events::WRITABLE;
        port.info().set_events(after);

        let listening =
            port.kind() == PortKind::RingOfHandles && port.info().listener_count() > 0;
        debug!(
            engine = self.shared.id,
            kind = %port.kind(),
            port = port.index(),
            listening,
            "Closing port"
        );

        if listening {
            port.info().raise_pending(before ^ after);
            busy.release(PortStatus::Closing);
            self.shared.dispatch(port);
        } else {
            busy.release(PortStatus::Closing);
            port.info().status.store(PortStatus::Closed);
        }
        Ok(())
    }

    /// Send `payload` on a port
    ///
    /// Rings and rendezvous ports take the whole payload or fail with
    /// `WouldBlock`; a byte stream takes as much as fits and returns the
    /// count.
    pub fn send(&self, handle: &PortHandle, payload: &[u8]) -> Result<usize> {
        let port = self.shared.resolve(handle, Rights::SEND)?;

        match port.kind() {
            PortKind::RingOfHandles => {
                self.check_message(payload)?;
                let message = MessageRef::copy_from(payload);
                let mut busy = port.acquire()?;
                let before = port.info().events();
                let result = ring::send(&mut busy, message);
                self.shared.finish_ring(busy, before);
                result
            }
            PortKind::Rendezvous => {
                self.check_message(payload)?;
                let mut busy = port.acquire()?;
                rendezvous::send(&mut busy, payload)
            }
            PortKind::ByteStream => {
                let mut busy = port.acquire()?;
                stream::send(&mut busy, payload)
            }
        }
    }

    /// Receive into `dest`, returning the number of bytes written
    ///
    /// Returns 0 when nothing is queued. A ring or rendezvous message longer
    /// than `dest` is rejected and stays queued.
    pub fn receive(&self, handle: &PortHandle, dest: &mut [u8]) -> Result<usize> {
        let port = self.shared.resolve(handle, Rights::RECEIVE)?;

        match port.kind() {
            PortKind::RingOfHandles => {
                let received = self.receive_ring(port, dest.len())?;
                Ok(received.map_or(0, |message| {
                    dest[..message.len()].copy_from_slice(&message);
                    message.len()
                }))
            }
            PortKind::Rendezvous => {
                let mut busy = port.acquire()?;
                rendezvous::receive(&mut busy, dest)
            }
            PortKind::ByteStream => {
                let mut busy = port.acquire()?;
                stream::receive(&mut busy, dest)
            }
        }
    }

    /// Take the next ring message as a shared reference without copying
    pub fn receive_message(&self, handle: &PortHandle) -> Result<Option<MessageRef>> {
        let port = self.shared.resolve(handle, Rights::RECEIVE)?;
        if port.kind() != PortKind::RingOfHandles {
            return Err(CoportError::invalid(format!(
                "message receive needs a ring port, not {}",
                port.kind()
            )));
        }
        self.receive_ring(port, usize::MAX)
    }

    fn receive_ring(&self, port: &Port, limit: usize) -> Result<Option<MessageRef>> {
        let mut busy = port.acquire()?;
        let before = port.info().events();
        let result = ring::receive(&mut busy, limit);
        self.shared.finish_ring(busy, before);
        result
    }

    fn check_message(&self, payload: &[u8]) -> Result<()> {
        let max = self.shared.config.transfer.max_message_size;
        if payload.is_empty() {
            return Err(CoportError::invalid("empty message"));
        }
        if payload.len() > max {
            return Err(CoportError::invalid(format!(
                "message of {} bytes exceeds limit of {}",
                payload.len(),
                max
            )));
        }
        Ok(())
    }

    /// Wait for readiness on one or more rings
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` never blocks and
    /// fails with `WouldBlock` if nothing is ready. Returns the number of
    /// requests whose `revents` is non-empty, which is 0 on timeout.
    pub fn poll(&self, requests: &mut [PollRequest], timeout: Option<Duration>) -> Result<usize> {
        let ready = poll::poll(&self.shared, requests, timeout)?;
        trace!(engine = self.shared.id, requests = requests.len(), ready, "Poll returned");
        Ok(ready)
    }

    /// Snapshot a port's metadata
    pub fn info(&self, handle: &PortHandle) -> Result<PortInfo> {
        let port = self.shared.resolve(handle, Rights::INSPECT)?;
        Ok(port.snapshot())
    }

    pub fn stats(&self) -> EngineStats {
        let table = &self.shared.table;
        EngineStats {
            active: table.active(),
            ring: table.usage(PortKind::RingOfHandles),
            rendezvous: table.usage(PortKind::Rendezvous),
            stream: table.usage(PortKind::ByteStream),
            notifiers: self.workers.len(),
        }
    }
}

impl Drop for CoportEngine {
    fn drop(&mut self) {
        self.shared.notifiers.shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!(engine = self.shared.id, "Notifier thread panicked");
            }
        }
        debug!(engine = self.shared.id, "Coport engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CoportEngine {
        let mut config = CoportConfig::default();
        config.table.ring_ports = 4;
        config.table.rendezvous_ports = 2;
        config.table.stream_ports = 2;
        config.notifier.workers = 2;
        CoportEngine::new(config).unwrap()
    }

    #[test]
    fn test_resolve_rejects_foreign_engine() {
        let a = engine();
        let b = engine();
        let handle = a.open(PortKind::RingOfHandles).unwrap();

        assert!(a.owns(&handle));
        assert!(!b.owns(&handle));
        assert!(matches!(
            b.send(&handle, b"x"),
            Err(CoportError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_checks_rights() {
        let engine = engine();
        let handle = engine.open(PortKind::Rendezvous).unwrap();
        let send_only = handle.derive(Rights::SEND).unwrap();

        assert_eq!(engine.send(&send_only, b"hi").unwrap(), 2);
        let mut buf = [0u8; 4];
        assert!(engine.receive(&send_only, &mut buf).is_err());
        assert!(engine.info(&send_only).is_err());
        assert_eq!(engine.receive(&handle, &mut buf).unwrap(), 2);
    }

    #[test]
    fn test_ring_without_listeners_stays_open() {
        let engine = engine();
        let handle = engine.open(PortKind::RingOfHandles).unwrap();
        engine.send(&handle, b"abc").unwrap();

        let info = engine.info(&handle).unwrap();
        assert_eq!(info.status, PortStatus::Open);
        assert!(info.pending.is_empty());
        assert_eq!(info.length, 1);
    }

    #[test]
    fn test_message_size_limits() {
        let engine = engine();
        let ring = engine.open(PortKind::RingOfHandles).unwrap();
        let max = engine.config().transfer.max_message_size;

        assert!(engine.send(&ring, b"").is_err());
        assert!(engine.send(&ring, &vec![0u8; max + 1]).is_err());
        assert_eq!(engine.send(&ring, &vec![0u8; max]).unwrap(), max);
    }

    #[test]
    fn test_close_marks_closed() {
        let engine = engine();
        let handle = engine.open(PortKind::ByteStream).unwrap();
        engine.send(&handle, b"left behind").unwrap();
        engine.close(&handle).unwrap();

        let info = engine.info(&handle).unwrap();
        assert_eq!(info.status, PortStatus::Closed);
        assert_eq!(info.length, 0);
        assert_eq!(info.events, Events::CLOSED);
        assert_eq!(engine.send(&handle, b"x"), Err(CoportError::PipeClosed));
    }

    #[test]
    fn test_stats_track_allocation() {
        let engine = engine();
        engine.open(PortKind::RingOfHandles).unwrap();
        engine.open(PortKind::ByteStream).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.ring.allocated, 1);
        assert_eq!(stats.ring.capacity, 4);
        assert_eq!(stats.rendezvous.remaining(), 2);
        assert_eq!(stats.notifiers, 2);
    }
}
