// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Asynchronous stdin stream: a background reader keeps one half-buffer
//! filling while the consumer drains the other.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{load_error, spin_wait, store_error, HalfPair, HALF_SIZE};
use crate::platform;

/// `produced_end` value while EOF has not been seen.
const NO_END: usize = usize::MAX;

struct Shared {
    buf: HalfPair,
    channel: platform::InChannel,
    /// Index of the half currently owned by the consumer.
    active_half: AtomicUsize,
    /// True while the reader owns (is refilling) the inactive half.
    io_pending: AtomicBool,
    /// Absolute end of produced bytes once EOF is seen, `NO_END` before.
    produced_end: AtomicUsize,
    /// Raw OS error from the reader; sticky.
    error: AtomicI32,
    /// Orders the reader to exit at its next check.
    finalize: AtomicBool,
}

// Safety: HalfPair access follows the half-ownership protocol described
// in the module docs; every other field is atomic or immutable.
unsafe impl Sync for Shared {}

enum Fill {
    /// The half was filled completely.
    Full,
    /// EOF arrived after `usize` bytes of this half.
    Eof(usize),
    Err(io::Error),
    Cancelled,
}

/// Fill `half` from the channel. The caller must own `half`.
fn fill_half(shared: &Shared, half: usize) -> Fill {
    // Safety: ownership of `half` is the function's precondition.
    let dst = unsafe { shared.buf.half_mut(half) };
    let mut filled = 0;
    while filled < HALF_SIZE {
        if shared.finalize.load(Ordering::Acquire) {
            return Fill::Cancelled;
        }
        match platform::read(&shared.channel, &mut dst[filled..]) {
            Ok(0) => return Fill::Eof(filled),
            Ok(n) => filled += n,
            // Nonblocking descriptor: retry, leaving a window for
            // cancellation above.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Fill::Err(e),
        }
    }
    Fill::Full
}

fn reader_loop(shared: &Shared) {
    let mut side = 1;
    loop {
        match fill_half(shared, side) {
            Fill::Full => {
                shared.io_pending.store(false, Ordering::Release);
            }
            Fill::Eof(filled) => {
                shared
                    .produced_end
                    .store(side * HALF_SIZE + filled, Ordering::Relaxed);
                shared.io_pending.store(false, Ordering::Release);
                return;
            }
            Fill::Err(e) => {
                store_error(&shared.error, &e);
                shared.io_pending.store(false, Ordering::Release);
                return;
            }
            Fill::Cancelled => return,
        }
        // The just-filled half becomes consumable once the consumer
        // flips to it; that flip also hands the drained half back.
        let filled_side = side;
        spin_wait(|| {
            shared.finalize.load(Ordering::Acquire)
                || shared.active_half.load(Ordering::Acquire) == filled_side
        });
        if shared.finalize.load(Ordering::Acquire) {
            return;
        }
        side = 1 - filled_side;
    }
}

/// Blocking byte source over stdin backed by the double buffer.
///
/// `read` returns the requested size until the stream runs out; the
/// first short return marks EOF.
pub struct InputStream {
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    /// Consumer's half, mirrored locally.
    active: usize,
    /// Absolute position of the next unread byte.
    read_head: usize,
    /// Absolute end of readable bytes in the active half.
    limit: usize,
    /// The active half ends at `produced_end`: no swaps remain.
    at_end: bool,
}

impl InputStream {
    /// Stream over standard input.
    pub fn stdin() -> io::Result<Self> {
        Self::with_channel(platform::stdin_channel()?)
    }

    /// Stream over an arbitrary readable descriptor.
    pub(crate) fn with_channel(channel: platform::InChannel) -> io::Result<Self> {
        platform::set_nonblocking(&channel, true)?;
        let shared = Arc::new(Shared {
            buf: HalfPair::new(),
            channel,
            active_half: AtomicUsize::new(0),
            io_pending: AtomicBool::new(false),
            produced_end: AtomicUsize::new(NO_END),
            error: AtomicI32::new(0),
            finalize: AtomicBool::new(false),
        });

        // First half fills synchronously; the reader thread only starts
        // when there is more to fetch.
        let mut stream = Self {
            shared,
            reader: None,
            active: 0,
            read_head: 0,
            limit: 0,
            at_end: false,
        };
        match fill_half(&stream.shared, 0) {
            Fill::Full => {
                stream.limit = HALF_SIZE;
                stream.shared.io_pending.store(true, Ordering::Release);
                let shared = Arc::clone(&stream.shared);
                stream.reader = Some(thread::spawn(move || reader_loop(&shared)));
            }
            Fill::Eof(filled) => {
                stream.shared.produced_end.store(filled, Ordering::Relaxed);
                stream.limit = filled;
                stream.at_end = true;
            }
            Fill::Err(e) => return Err(e),
            Fill::Cancelled => unreachable!("stream finalized before construction"),
        }
        Ok(stream)
    }

    /// Read up to `out.len()` bytes. Returns less only at EOF, and `Ok(0)`
    /// once the stream is exhausted.
    pub fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;
        while copied < out.len() {
            let available = self.limit - self.read_head;
            if available > 0 {
                let n = available.min(out.len() - copied);
                let offset = self.read_head - self.active * HALF_SIZE;
                // Safety: the consumer owns the active half.
                let src = unsafe { self.shared.buf.half(self.active) };
                out[copied..copied + n].copy_from_slice(&src[offset..offset + n]);
                self.read_head += n;
                copied += n;
                continue;
            }
            if self.at_end {
                break;
            }
            self.swap_halves()?;
        }
        Ok(copied)
    }

    /// Hand the drained half to the reader and take the other.
    fn swap_halves(&mut self) -> io::Result<()> {
        spin_wait(|| !self.shared.io_pending.load(Ordering::Acquire));
        if let Some(e) = load_error(&self.shared.error, "stdin reader") {
            return Err(e);
        }
        let next = 1 - self.active;
        self.shared.io_pending.store(true, Ordering::Relaxed);
        self.shared.active_half.store(next, Ordering::Release);
        self.active = next;
        self.read_head = next * HALF_SIZE;

        let half_end = next * HALF_SIZE + HALF_SIZE;
        let produced = self.shared.produced_end.load(Ordering::Acquire);
        if produced != NO_END && produced >= next * HALF_SIZE && produced <= half_end {
            self.limit = produced;
            self.at_end = true;
        } else {
            self.limit = half_end;
        }
        Ok(())
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.take() {
            self.shared.finalize.store(true, Ordering::Release);
            // Flip the half state as well, so a reader parked between
            // halves observes the flag promptly.
            self.shared
                .active_half
                .store(1 - self.active, Ordering::Release);
            let _ = handle.join();
        }
        let _ = platform::set_nonblocking(&self.shared.channel, false);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::channel_from_fd;
    use nix::unistd::pipe;
    use std::fs::File;
    use std::io::Write;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn feed(data: Vec<u8>) -> (InputStream, thread::JoinHandle<()>) {
        let (rd, wr) = pipe().unwrap();
        let writer = thread::spawn(move || {
            let mut wr = File::from(wr);
            // Dropping the stream mid-feed closes the read end; EPIPE is
            // expected there, not a test failure.
            let _ = wr.write_all(&data);
        });
        let stream = InputStream::with_channel(channel_from_fd(rd)).unwrap();
        (stream, writer)
    }

    #[test]
    fn short_input_is_returned_in_full() {
        let data = pattern(100);
        let (mut stream, writer) = feed(data.clone());
        let mut out = vec![0u8; 300];
        assert_eq!(stream.read(&mut out).unwrap(), 100);
        assert_eq!(&out[..100], &data[..]);
        assert_eq!(stream.read(&mut out).unwrap(), 0);
        writer.join().unwrap();
    }

    #[test]
    fn exact_half_size_input() {
        let data = pattern(HALF_SIZE);
        let (mut stream, writer) = feed(data.clone());
        let mut collected = Vec::new();
        let mut out = vec![0u8; 1000];
        loop {
            let n = stream.read(&mut out).unwrap();
            collected.extend_from_slice(&out[..n]);
            if n < out.len() {
                break;
            }
        }
        assert_eq!(collected, data);
        assert_eq!(stream.read(&mut out).unwrap(), 0);
        writer.join().unwrap();
    }

    #[test]
    fn multi_half_input_with_odd_read_sizes() {
        let data = pattern(3 * HALF_SIZE + 4321);
        let (mut stream, writer) = feed(data.clone());
        let mut collected = Vec::new();
        let mut size = 1;
        loop {
            let mut out = vec![0u8; size];
            let n = stream.read(&mut out).unwrap();
            collected.extend_from_slice(&out[..n]);
            if n < out.len() {
                break;
            }
            size = size % 997 + 1;
        }
        assert_eq!(collected.len(), data.len());
        assert_eq!(collected, data);
        writer.join().unwrap();
    }

    #[test]
    fn empty_input_reports_eof_immediately() {
        let (rd, wr) = pipe().unwrap();
        drop(wr);
        let mut stream = InputStream::with_channel(channel_from_fd(rd)).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(stream.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn drop_mid_stream_joins_the_reader() {
        let data = pattern(4 * HALF_SIZE);
        let (mut stream, writer) = feed(data);
        let mut out = vec![0u8; 10];
        assert_eq!(stream.read(&mut out).unwrap(), 10);
        drop(stream);
        writer.join().unwrap();
    }
}
