//! Byte-stream transfer
//!
//! A bounded byte FIFO. Both directions move as much of the request as fits
//! and report the count, so short transfers are routine.

use core::sync::atomic::Ordering;

use crate::error::{CoportError, Result};
use crate::poll::Events;
use crate::port::{Busy, PortBuffer};

/// Circular byte buffer
pub(crate) struct StreamBuffer {
    bytes: Box<[u8]>,
    head: usize,
    len: usize,
}

impl StreamBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.capacity() - self.len);
        let tail = (self.head + self.len) % self.capacity();
        let first = n.min(self.capacity() - tail);
        self.bytes[tail..tail + first].copy_from_slice(&src[..first]);
        self.bytes[..n - first].copy_from_slice(&src[first..n]);
        self.len += n;
        n
    }

    fn read(&mut self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.len);
        let first = n.min(self.capacity() - self.head);
        dest[..first].copy_from_slice(&self.bytes[self.head..self.head + first]);
        dest[first..n].copy_from_slice(&self.bytes[..n - first]);
        self.head = (self.head + n) % self.capacity();
        self.len -= n;
        n
    }
}

fn stream<'b>(busy: &'b mut Busy<'_>) -> &'b mut StreamBuffer {
    match busy.buffer() {
        PortBuffer::Stream(stream) => stream,
        _ => unreachable!("stream transfer on a non-stream port"),
    }
}

fn publish(busy: &mut Busy<'_>) {
    let info = busy.port().info();
    let stream = stream(busy);
    let (len, capacity) = (stream.len, stream.capacity());

    let mut events = info.events() - Events::READABLE - Events::WRITABLE;
    if len > 0 {
        events |= Events::READABLE;
    }
    if len < capacity {
        events |= Events::WRITABLE;
    }
    info.length.store(len, Ordering::Release);
    info.set_events(events);
}

/// Append as much of `src` as fits
pub(crate) fn send(busy: &mut Busy<'_>, src: &[u8]) -> Result<usize> {
    if src.is_empty() {
        return Ok(0);
    }

    let info = busy.port().info();
    let stream = stream(busy);
    if stream.len == stream.capacity() {
        info.set_events(info.events() | Events::WRITE_ERROR);
        return Err(CoportError::WouldBlock);
    }

    let n = stream.write(src);
    info.set_events(info.events() - Events::WRITE_ERROR);
    publish(busy);

    tracing::trace!(
        port = busy.port().index(),
        length = info.length.load(Ordering::Acquire),
        size = n,
        "stream send"
    );
    Ok(n)
}

/// Move up to `dest.len()` queued bytes into `dest`
pub(crate) fn receive(busy: &mut Busy<'_>, dest: &mut [u8]) -> Result<usize> {
    let info = busy.port().info();
    let stream = stream(busy);
    if stream.len == 0 {
        info.set_events(info.events() | Events::READ_ERROR);
        return Ok(0);
    }

    let n = stream.read(dest);
    info.set_events(info.events() - Events::READ_ERROR);
    publish(busy);

    tracing::trace!(
        port = busy.port().index(),
        length = info.length.load(Ordering::Acquire),
        size = n,
        "stream receive"
    );
    Ok(n)
}

pub(crate) fn drain(busy: &mut Busy<'_>) {
    let info = busy.port().info();
    let stream = stream(busy);
    stream.head = 0;
    stream.len = 0;
    info.length.store(0, Ordering::Release);
}
