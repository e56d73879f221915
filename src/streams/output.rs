// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Asynchronous stdout stream: a background flusher writes completed
//! half-buffers while the producer fills the other half.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{load_error, spin_wait, store_error, HalfPair, HALF_SIZE};
use crate::platform;

struct Shared {
    buf: HalfPair,
    channel: platform::OutChannel,
    /// Index of the half currently owned by the producer.
    active_half: AtomicUsize,
    /// True while the flusher owns (is writing out) the inactive half.
    io_pending: AtomicBool,
    /// Bytes of the pending half the flusher must write this pass.
    /// `HALF_SIZE` in steady state, less only during an explicit flush.
    flush_size: AtomicUsize,
    /// Raw OS error from the flusher; sticky.
    error: AtomicI32,
    /// Orders the flusher to exit once it is idle.
    finalize: AtomicBool,
}

// Safety: HalfPair access follows the half-ownership protocol described
// in the module docs; every other field is atomic or immutable.
unsafe impl Sync for Shared {}

fn flusher_loop(shared: &Shared) {
    loop {
        spin_wait(|| {
            shared.io_pending.load(Ordering::Acquire) || shared.finalize.load(Ordering::Acquire)
        });
        if !shared.io_pending.load(Ordering::Acquire) {
            return;
        }
        let side = 1 - shared.active_half.load(Ordering::Acquire);
        let len = shared.flush_size.load(Ordering::Acquire);
        // Safety: `io_pending` transferred the inactive half to us.
        let src = unsafe { shared.buf.half(side) };
        if let Err(e) = platform::write_all(&shared.channel, &src[..len]) {
            store_error(&shared.error, &e);
            shared.io_pending.store(false, Ordering::Release);
            return;
        }
        shared.io_pending.store(false, Ordering::Release);
    }
}

/// Buffered byte drain towards stdout backed by the double buffer.
///
/// After the first write failure the stream is sticky-errored: every
/// later call fails immediately.
pub struct OutputStream {
    shared: Arc<Shared>,
    flusher: Option<JoinHandle<()>>,
    /// Producer's half, mirrored locally.
    active: usize,
    /// Fill position within the active half.
    write_head: usize,
}

impl OutputStream {
    /// Stream over standard output.
    pub fn stdout() -> io::Result<Self> {
        Ok(Self::with_channel(platform::stdout_channel()?))
    }

    /// Stream over an arbitrary writable descriptor.
    pub(crate) fn with_channel(channel: platform::OutChannel) -> Self {
        let shared = Arc::new(Shared {
            buf: HalfPair::new(),
            channel,
            active_half: AtomicUsize::new(0),
            io_pending: AtomicBool::new(false),
            flush_size: AtomicUsize::new(HALF_SIZE),
            error: AtomicI32::new(0),
            finalize: AtomicBool::new(false),
        });
        let thread_shared = Arc::clone(&shared);
        let flusher = thread::spawn(move || flusher_loop(&thread_shared));
        Self {
            shared,
            flusher: Some(flusher),
            active: 0,
            write_head: 0,
        }
    }

    /// Append `data`, handing full halves to the flusher as they close.
    pub fn write(&mut self, mut data: &[u8]) -> io::Result<()> {
        if let Some(e) = load_error(&self.shared.error, "stdout flusher") {
            return Err(e);
        }
        while !data.is_empty() {
            let room = HALF_SIZE - self.write_head;
            let n = room.min(data.len());
            // Safety: the producer owns the active half.
            let dst = unsafe { self.shared.buf.half_mut(self.active) };
            dst[self.write_head..self.write_head + n].copy_from_slice(&data[..n]);
            self.write_head += n;
            data = &data[n..];
            if self.write_head == HALF_SIZE {
                self.rotate(HALF_SIZE)?;
            }
        }
        Ok(())
    }

    /// Drain everything buffered so far and wait for it to reach the
    /// descriptor.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.write_head > 0 {
            let len = self.write_head;
            self.rotate(len)?;
        }
        self.wait_idle()
    }

    /// Final flush, then retire the flusher. The stream is consumed;
    /// errors that would otherwise be lost in `Drop` surface here.
    pub fn dispose(mut self) -> io::Result<()> {
        let result = self.flush();
        self.shutdown();
        result
    }

    /// Hand the active half (its first `flush_len` bytes) to the
    /// flusher and continue on the other half.
    fn rotate(&mut self, flush_len: usize) -> io::Result<()> {
        self.wait_idle()?;
        self.shared.flush_size.store(flush_len, Ordering::Relaxed);
        let next = 1 - self.active;
        self.shared.active_half.store(next, Ordering::Relaxed);
        self.shared.io_pending.store(true, Ordering::Release);
        self.active = next;
        self.write_head = 0;
        Ok(())
    }

    /// Wait until the previous handoff completes; surface its error.
    fn wait_idle(&self) -> io::Result<()> {
        spin_wait(|| !self.shared.io_pending.load(Ordering::Acquire));
        match load_error(&self.shared.error, "stdout flusher") {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.flusher.take() {
            self.shared.finalize.store(true, Ordering::Release);
            let _ = handle.join();
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if self.flusher.is_some() {
            let _ = self.flush();
            self.shutdown();
        }
    }
}
