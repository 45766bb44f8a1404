//! Poll listeners
//!
//! A poll call creates one [`Waiter`] and attaches a [`Listener`] per ring it
//! watches. Listener lists for every ring sit behind a single engine-wide
//! lock, held only to insert, remove or walk; no transfer runs under it.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crate::poll::Events;
use crate::port::Port;

/// Wake primitive shared by every listener of one poll call
pub(crate) struct Waiter {
    woken: Mutex<bool>,
    cond: Condvar,
}

impl Waiter {
    pub(crate) fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn wake(&self) {
        let mut woken = self.woken.lock().unwrap_or_else(|e| e.into_inner());
        *woken = true;
        self.cond.notify_all();
    }

    /// Block until woken or `deadline` passes. Returns whether a wake arrived.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut woken = self.woken.lock().unwrap_or_else(|e| e.into_inner());
        while !*woken {
            match deadline {
                None => {
                    woken = self.cond.wait(woken).unwrap_or_else(|e| e.into_inner());
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    woken = self
                        .cond
                        .wait_timeout(woken, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
            }
        }
        *woken
    }
}

/// Interest registration for one ring during one poll call
pub(crate) struct Listener {
    interest: Events,
    matched: AtomicU32,
    waiter: Arc<Waiter>,
}

impl Listener {
    pub(crate) fn new(interest: Events, waiter: Arc<Waiter>) -> Self {
        Self {
            interest,
            matched: AtomicU32::new(0),
            waiter,
        }
    }

    /// Record the part of `events` this listener wants and wake it if any.
    /// Returns the matched subset.
    pub(crate) fn offer(&self, events: Events) -> Events {
        let matched = events & self.interest;
        if !matched.is_empty() {
            self.matched.fetch_or(matched.bits(), Ordering::AcqRel);
            self.waiter.wake();
        }
        matched
    }

    pub(crate) fn matched(&self) -> Events {
        Events::from_bits_truncate(self.matched.load(Ordering::Acquire))
    }
}

/// Listener lists for every ring slot, under one lock
pub(crate) struct ListenerRegistry {
    lists: spin::Mutex<Vec<Vec<Arc<Listener>>>>,
}

impl ListenerRegistry {
    pub(crate) fn new(ring_ports: usize) -> Self {
        Self {
            lists: spin::Mutex::new(vec![Vec::new(); ring_ports]),
        }
    }

    /// Attach `listener` to `port`. Caller holds the port's BUSY.
    pub(crate) fn attach(&self, port: &Port, listener: Arc<Listener>) {
        let mut lists = self.lists.lock();
        lists[port.index() as usize].push(listener);
        port.info().add_listener();
    }

    /// Detach `listener` from `port`. Caller holds BUSY, or the port is closed.
    pub(crate) fn detach(&self, port: &Port, listener: &Arc<Listener>) {
        let mut lists = self.lists.lock();
        let list = &mut lists[port.index() as usize];
        let position = list
            .iter()
            .position(|l| Arc::ptr_eq(l, listener))
            .unwrap_or_else(|| panic!("listener missing from ring {} list", port.index()));
        list.swap_remove(position);
        port.info().remove_listener();
        assert_eq!(
            list.len(),
            port.info().listener_count(),
            "listener list out of sync for ring {}",
            port.index()
        );
    }

    /// Offer the port's current events to every attached listener.
    /// Returns the union of what was delivered.
    pub(crate) fn deliver(&self, port: &Port) -> Events {
        let events = port.info().events();
        let lists = self.lists.lock();
        lists[port.index() as usize]
            .iter()
            .fold(Events::empty(), |delivered, listener| {
                delivered | listener.offer(events)
            })
    }
}
