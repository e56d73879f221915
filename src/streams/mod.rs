// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Double-buffered asynchronous standard streams.
//!
//! Each stream owns one contiguous byte region split into two equal
//! halves and one dedicated background thread. The foreground side owns
//! the *active* half; the thread owns the other while `io_pending` is
//! set. Handoff is a release store of `io_pending`/`active_half` by the
//! side giving a half up and an acquire load by the side taking it, so
//! bytes written into a half are published together with the flag that
//! transfers it. No locks, and exactly one writer per half at any time.

mod input;
mod output;

pub use self::input::InputStream;
pub use self::output::OutputStream;

use std::cell::UnsafeCell;
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

/// Bytes in one half of a stream buffer.
pub const HALF_SIZE: usize = 64 * 1024;

/// Spins before each poll starts yielding to the scheduler. Handoffs are
/// short in steady state; the yield only matters when the peer stalls.
const SPIN_LIMIT: u32 = 1 << 14;

/// Spin until `done` returns true.
fn spin_wait(mut done: impl FnMut() -> bool) {
    let mut spins = 0u32;
    while !done() {
        if spins < SPIN_LIMIT {
            spins += 1;
            std::hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }
}

/// The two stream halves, individually lendable to one side at a time.
struct HalfPair {
    cells: Box<[UnsafeCell<u8>]>,
}

impl HalfPair {
    fn new() -> Self {
        let mut cells = Vec::with_capacity(2 * HALF_SIZE);
        cells.resize_with(2 * HALF_SIZE, || UnsafeCell::new(0));
        Self {
            cells: cells.into_boxed_slice(),
        }
    }

    /// # Safety
    ///
    /// The caller must own `half` under the stream's handoff protocol:
    /// no other slice into this half may exist for the borrow's
    /// lifetime.
    #[allow(clippy::mut_from_ref)]
    unsafe fn half_mut(&self, half: usize) -> &mut [u8] {
        let start = half * HALF_SIZE;
        std::slice::from_raw_parts_mut(self.cells[start].get(), HALF_SIZE)
    }

    /// # Safety
    ///
    /// The caller must own `half` under the stream's handoff protocol;
    /// the peer must not be writing it.
    unsafe fn half(&self, half: usize) -> &[u8] {
        let start = half * HALF_SIZE;
        std::slice::from_raw_parts(self.cells[start].get(), HALF_SIZE)
    }
}

/// Raw OS error slot shared with the background thread. Zero is "no
/// error"; `NO_CODE` marks an error without an OS code.
const NO_CODE: i32 = -1;

fn store_error(slot: &AtomicI32, e: &io::Error) {
    slot.store(e.raw_os_error().unwrap_or(NO_CODE), Ordering::Release);
}

fn load_error(slot: &AtomicI32, what: &str) -> Option<io::Error> {
    match slot.load(Ordering::Acquire) {
        0 => None,
        NO_CODE => Some(io::Error::other(format!("{what} thread failed"))),
        code => Some(io::Error::from_raw_os_error(code)),
    }
}
