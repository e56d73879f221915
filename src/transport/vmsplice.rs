// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore vmsplice splice HUGETLB

//! Zero-copy pipe output.
//!
//! Two page-aligned anonymous buffers (huge pages when the kernel offers
//! them) are filled alternately with formatted text and *gifted* to the
//! stdout pipe with `vmsplice(SPLICE_F_GIFT)`: the kernel takes the
//! pages instead of copying them. A gifted buffer must not be touched
//! until the pipe has drained it; splicing exactly one pipe-capacity's
//! worth per buffer and alternating between two separate mappings makes
//! the next splice block until the previous buffer is free, so the swap
//! itself is the synchronisation.

use std::io::{self, IoSlice};
use std::os::unix::io::AsRawFd;

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::{fcntl, vmsplice, FcntlArg, SpliceFFlags};

use crate::format::{MemSink, BYTES_PER_CHUNK, CHUNK, INITIAL, SINGLE};
#[cfg(target_os = "linux")]
use crate::hugepage;
use crate::platform;
use crate::streams::{InputStream, OutputStream};
use crate::{Bin2cError, Bin2cResult};

/// Longest text one emit call can produce.
const MAX_EMIT: usize = CHUNK.max_output_len();
/// Staging room for the emit that crosses the fill guard.
const STAGING_LEN: usize = 2 * MAX_EMIT;

/// Alternating pair of giftable pipe buffers.
pub(crate) struct PipeWriter {
    stdout: platform::OutChannel,
    buffers: [MmapMut; 2],
    active: usize,
    /// Fill position within the active buffer.
    pos: usize,
    /// Bytes spliced per buffer: the pipe's capacity.
    capacity: usize,
    /// Fill limit beyond which an emit might overrun the buffer.
    guard: usize,
}

impl PipeWriter {
    /// Build the writer for standard output. `None` when stdout's pipe
    /// capacity cannot be determined or the buffers cannot be mapped;
    /// the caller falls back to buffered output.
    pub(crate) fn open() -> Option<Self> {
        Self::with_channel(platform::stdout_channel().ok()?)
    }

    fn with_channel(stdout: platform::OutChannel) -> Option<Self> {
        let capacity = pipe_capacity(&stdout)?;
        if capacity <= MAX_EMIT {
            return None;
        }
        let buffers = [page_buffer(capacity)?, page_buffer(capacity)?];
        Some(Self {
            stdout,
            buffers,
            active: 0,
            pos: 0,
            capacity,
            guard: capacity - MAX_EMIT,
        })
    }

    /// Run `emit` into the active buffer. Below the guard the emit
    /// writes in place; above it the emit goes to a staging array whose
    /// contents complete the buffer exactly to `capacity`, which is then
    /// gifted away.
    fn fill<F: FnOnce(&mut MemSink<'_>)>(&mut self, emit: F) -> Bin2cResult<()> {
        if self.pos <= self.guard {
            let written = {
                let mut sink = MemSink::new(&mut self.buffers[self.active][self.pos..]);
                emit(&mut sink);
                sink.written()
            };
            self.pos += written;
            Ok(())
        } else {
            let mut staging = [0u8; STAGING_LEN];
            let written = {
                let mut sink = MemSink::new(&mut staging);
                emit(&mut sink);
                sink.written()
            };
            self.spill(&staging[..written])
        }
    }

    /// Append literal bytes of any length, gifting buffers as they top
    /// out. Used for the frame prefix and suffix.
    fn put(&mut self, mut bytes: &[u8]) -> Bin2cResult<()> {
        while !bytes.is_empty() {
            let room = self.capacity - self.pos;
            let n = room.min(bytes.len());
            self.buffers[self.active][self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
            self.pos += n;
            bytes = &bytes[n..];
            if self.pos == self.capacity {
                self.gift()?;
            }
        }
        Ok(())
    }

    /// Place staged bytes: top up the active buffer to `capacity`, gift
    /// it, and start the other buffer with the remainder.
    fn spill(&mut self, staged: &[u8]) -> Bin2cResult<()> {
        let room = self.capacity - self.pos;
        if staged.len() < room {
            self.buffers[self.active][self.pos..self.pos + staged.len()]
                .copy_from_slice(staged);
            self.pos += staged.len();
            return Ok(());
        }
        let (head, rest) = staged.split_at(room);
        self.buffers[self.active][self.pos..self.capacity].copy_from_slice(head);
        self.gift()?;
        self.buffers[self.active][..rest.len()].copy_from_slice(rest);
        self.pos = rest.len();
        Ok(())
    }

    /// Gift the full active buffer to the pipe and swap to the other.
    /// The gifted buffer is not touched again until the following gift
    /// has blocked on the pipe draining it.
    fn gift(&mut self) -> Bin2cResult<()> {
        splice_all(
            &self.stdout,
            &self.buffers[self.active][..self.capacity],
            SpliceFFlags::SPLICE_F_GIFT,
        )?;
        self.active = 1 - self.active;
        self.pos = 0;
        Ok(())
    }

    /// Drain the final partial buffer: splice the page-aligned prefix
    /// without gifting (sub-page gifts are not safe), then push the tail
    /// through the asynchronous stdout stream.
    fn finish(self) -> Bin2cResult<()> {
        let page = platform::base_page_size();
        let aligned = self.pos - self.pos % page;
        if aligned > 0 {
            splice_all(
                &self.stdout,
                &self.buffers[self.active][..aligned],
                SpliceFFlags::empty(),
            )?;
        }
        let tail = &self.buffers[self.active][aligned..self.pos];
        if !tail.is_empty() {
            let channel = self.stdout.try_clone().map_err(Bin2cError::Output)?;
            let mut out = OutputStream::with_channel(channel);
            out.write(tail).map_err(Bin2cError::Output)?;
            out.dispose().map_err(Bin2cError::Output)?;
        }
        Ok(())
    }
}

/// Memory-mapped input, zero-copy output.
pub(crate) fn run_from_slice(
    data: &[u8],
    mut writer: PipeWriter,
    prefix: &[u8],
    suffix: &[u8],
) -> Bin2cResult<()> {
    let Some((&first, rest)) = data.split_first() else {
        return Ok(());
    };
    writer.put(prefix)?;
    writer.fill(|sink| INITIAL.emit(&[first], sink))?;
    let mut chunks = rest.chunks_exact(BYTES_PER_CHUNK);
    for chunk in &mut chunks {
        let args: &[u8; BYTES_PER_CHUNK] = chunk.try_into().unwrap();
        writer.fill(|sink| CHUNK.emit(args, sink))?;
    }
    for &byte in chunks.remainder() {
        writer.fill(|sink| SINGLE.emit(&[byte], sink))?;
    }
    writer.put(suffix)?;
    writer.finish()
}

/// Buffered input, zero-copy output. `first` was already read by the
/// caller while probing for empty input.
pub(crate) fn run_from_stream(
    mut input: InputStream,
    first: u8,
    mut writer: PipeWriter,
    prefix: &[u8],
    suffix: &[u8],
) -> Bin2cResult<()> {
    writer.put(prefix)?;
    writer.fill(|sink| INITIAL.emit(&[first], sink))?;

    let mut chunk = [0u8; BYTES_PER_CHUNK];
    loop {
        let n = input.read(&mut chunk).map_err(Bin2cError::Input)?;
        if n == BYTES_PER_CHUNK {
            writer.fill(|sink| CHUNK.emit(&chunk, sink))?;
        } else {
            for &byte in &chunk[..n] {
                writer.fill(|sink| SINGLE.emit(&[byte], sink))?;
            }
            break;
        }
    }

    writer.put(suffix)?;
    writer.finish()
}

fn pipe_capacity(stdout: &platform::OutChannel) -> Option<usize> {
    let n = fcntl(stdout.as_raw_fd(), FcntlArg::F_GETPIPE_SZ).ok()?;
    usize::try_from(n).ok().filter(|&n| n > 0)
}

/// One page-aligned anonymous buffer of at least `capacity` bytes.
/// Huge-page backing is preferred (rounding the length up to the huge
/// page); plain pages are the fallback since `MAP_HUGETLB` fails on
/// hosts without a huge-page pool.
fn page_buffer(capacity: usize) -> Option<MmapMut> {
    #[cfg(target_os = "linux")]
    if let Some(huge) = hugepage::huge_page_size() {
        if huge.is_power_of_two() {
            let len = capacity.next_multiple_of(huge);
            let bits = huge.trailing_zeros() as u8;
            if let Ok(map) = MmapOptions::new().len(len).huge(Some(bits)).map_anon() {
                return Some(map);
            }
        }
    }
    MmapOptions::new().len(capacity).map_anon().ok()
}

fn splice_all(
    stdout: &platform::OutChannel,
    mut buf: &[u8],
    flags: SpliceFFlags,
) -> Bin2cResult<()> {
    while !buf.is_empty() {
        match vmsplice(stdout, &[IoSlice::new(buf)], flags) {
            Ok(0) => return Err(Bin2cError::Splice(io::ErrorKind::WriteZero.into())),
            Ok(n) => buf = &buf[n..],
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(Bin2cError::Splice(e.into())),
        }
    }
    Ok(())
}
