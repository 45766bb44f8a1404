//! Notifier pool
//!
//! Rings whose event mask changed while listeners were attached are parked
//! in DONE (or CLOSING) and queued on one worker, picked by slot hash so a
//! given ring is always served by the same worker. The worker moves the
//! ring to POLLING, offers its events to each listener, then publishes OPEN
//! (or CLOSED for a closing ring).

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::NotifierConfig;
use crate::engine::Shared;
use crate::error::CoportError;
use crate::port::state::Step;
use crate::port::{PortKind, PortStatus};

/// Work item for a notifier
pub(crate) enum Notice {
    /// Ring slot whose events need delivering
    Port(u32),
    Shutdown,
}

/// Sending side of every notifier queue
pub(crate) struct NotifierPool {
    queues: Vec<Sender<Notice>>,
}

impl NotifierPool {
    pub(crate) fn new(config: &NotifierConfig) -> (Self, Vec<Receiver<Notice>>) {
        let (queues, receivers) = (0..config.workers)
            .map(|_| channel::bounded(config.queue_depth))
            .unzip();
        (Self { queues }, receivers)
    }

    /// Queue a ring on `worker`. Returns false if the queue is full or gone,
    /// in which case the caller must deliver inline.
    pub(crate) fn notify(&self, worker: usize, index: u32) -> bool {
        match self.queues[worker].try_send(Notice::Port(index)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Ask every worker to stop once its queue is drained
    pub(crate) fn shutdown(&self) {
        for queue in &self.queues {
            let _ = queue.send(Notice::Shutdown);
        }
    }
}

/// Start one thread per notifier queue
pub(crate) fn spawn_workers(
    shared: &Arc<Shared>,
    receivers: Vec<Receiver<Notice>>,
) -> io::Result<Vec<JoinHandle<()>>> {
    spawn_with(shared, receivers, |worker, queue, shared| {
        std::thread::Builder::new()
            .name(format!("coport-notifier-{}", worker))
            .spawn(move || run(worker, queue, shared))
    })
}

/// Start workers through `spawn`. If any start fails, the ones already
/// running are stopped and joined before the error is returned.
fn spawn_with<F>(
    shared: &Arc<Shared>,
    receivers: Vec<Receiver<Notice>>,
    mut spawn: F,
) -> io::Result<Vec<JoinHandle<()>>>
where
    F: FnMut(usize, Receiver<Notice>, Arc<Shared>) -> io::Result<JoinHandle<()>>,
{
    let mut workers = Vec::with_capacity(receivers.len());
    for (worker, queue) in receivers.into_iter().enumerate() {
        match spawn(worker, queue, Arc::clone(shared)) {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                warn!(engine = shared.id, worker, error = %e, "Notifier failed to start");
                shared.notifiers.shutdown();
                for handle in workers {
                    let _ = handle.join();
                }
                return Err(e);
            }
        }
    }
    Ok(workers)
}

fn run(worker: usize, queue: Receiver<Notice>, shared: Arc<Shared>) {
    debug!(engine = shared.id, worker, "Notifier started");
    for notice in queue.iter() {
        match notice {
            Notice::Port(index) => deliver(&shared, index),
            Notice::Shutdown => break,
        }
    }
    debug!(engine = shared.id, worker, "Notifier stopped");
}

/// Deliver a parked ring's events to its listeners and release it
pub(crate) fn deliver(shared: &Shared, index: u32) {
    let port = shared
        .table
        .get(PortKind::RingOfHandles, index)
        .unwrap_or_else(|| panic!("notice for unallocated ring {}", index));

    let entered = port.info().status.transition(|status| match status {
        PortStatus::Done | PortStatus::Closing => Step::Swap(PortStatus::Polling),
        PortStatus::Busy | PortStatus::Polling => Step::Retry,
        // Nothing parked: already handled
        PortStatus::Open | PortStatus::Closed => Step::Fail(CoportError::PipeClosed),
    });
    let Ok(from) = entered else {
        return;
    };

    let delivered = shared.listeners.deliver(port);
    port.info().clear_pending(delivered);

    let next = if from == PortStatus::Closing {
        PortStatus::Closed
    } else {
        PortStatus::Open
    };
    trace!(port = index, ?delivered, ?next, "Delivered ring events");
    port.info().status.store(next);
}
