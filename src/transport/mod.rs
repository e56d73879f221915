// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore vmsplice

//! Transport selection: how bytes move from stdin to stdout.
//!
//! At startup both ends are inspected once. A regular file on stdin can
//! be memory-mapped; a pipe on stdout can take whole buffers by
//! zero-copy `vmsplice`. Every setup failure degrades along the chain
//! mmap → buffered input and vmsplice → buffered output, so the tool
//! always runs, just less quickly.

mod buffered;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod vmsplice;

use crate::streams::InputStream;
use crate::{Bin2cError, Bin2cResult};

/// The four data-movement strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportMode {
    MmapVmsplice,
    MmapBuffered,
    ReadVmsplice,
    ReadBuffered,
}

/// Pick a transport from what the descriptors are. `file_len` only
/// matters when stdin is regular: a file too large for the address
/// space cannot be mapped.
pub(crate) fn choose(stdin_regular: bool, file_len: u64, stdout_pipe: bool) -> TransportMode {
    let mmap_ok = cfg!(unix) && stdin_regular && file_len <= usize::MAX as u64;
    let splice_ok =
        cfg!(any(target_os = "linux", target_os = "android")) && stdout_pipe;
    match (mmap_ok, splice_ok) {
        (true, true) => TransportMode::MmapVmsplice,
        (true, false) => TransportMode::MmapBuffered,
        (false, true) => TransportMode::ReadVmsplice,
        (false, false) => TransportMode::ReadBuffered,
    }
}

/// Stat both standard descriptors and pick the transport.
fn select() -> (TransportMode, u64) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        let stdin_meta = crate::platform::stdin_channel().and_then(|f| f.metadata());
        let (stdin_regular, file_len) = match &stdin_meta {
            Ok(meta) if meta.is_file() => (true, meta.len()),
            _ => (false, 0),
        };
        let stdout_pipe = crate::platform::stdout_channel()
            .and_then(|f| f.metadata())
            .map(|meta| meta.file_type().is_fifo())
            .unwrap_or(false);
        (choose(stdin_regular, file_len, stdout_pipe), file_len)
    }
    #[cfg(not(unix))]
    {
        (TransportMode::ReadBuffered, 0)
    }
}

/// Convert everything on stdin, framed by `prefix` and `suffix`.
pub(crate) fn run(prefix: &[u8], suffix: &[u8]) -> Bin2cResult<()> {
    let (mode, file_len) = select();

    #[cfg(unix)]
    if matches!(
        mode,
        TransportMode::MmapVmsplice | TransportMode::MmapBuffered
    ) {
        if file_len == 0 {
            return Err(Bin2cError::NoData);
        }
        if let Ok(map) = map_stdin() {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            if mode == TransportMode::MmapVmsplice {
                if let Some(writer) = vmsplice::PipeWriter::open() {
                    return vmsplice::run_from_slice(&map, writer, prefix, suffix);
                }
                // Pipe inspection or buffer setup failed: keep the map,
                // fall back to buffered output.
            }
            return buffered::run_from_slice(&map, prefix, suffix);
        }
        // mmap setup failed: degrade to the stream engines below.
    }
    #[cfg(not(unix))]
    let _ = file_len;

    let want_splice = matches!(
        mode,
        TransportMode::MmapVmsplice | TransportMode::ReadVmsplice
    );
    run_stream_input(want_splice, prefix, suffix)
}

/// Engines fed by the asynchronous stdin stream. The first byte is read
/// before any output so empty input fails before the frame prefix.
fn run_stream_input(want_splice: bool, prefix: &[u8], suffix: &[u8]) -> Bin2cResult<()> {
    let mut input = InputStream::stdin().map_err(Bin2cError::Input)?;
    let mut first = [0u8; 1];
    if input.read(&mut first).map_err(Bin2cError::Input)? == 0 {
        return Err(Bin2cError::NoData);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    if want_splice {
        if let Some(writer) = vmsplice::PipeWriter::open() {
            return vmsplice::run_from_stream(input, first[0], writer, prefix, suffix);
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let _ = want_splice;

    buffered::run_from_stream(input, first[0], prefix, suffix)
}

/// Map the whole input file read-only, hinted for one sequential pass.
#[cfg(unix)]
fn map_stdin() -> std::io::Result<memmap2::Mmap> {
    use memmap2::{Advice, Mmap};

    let stdin = std::io::stdin();
    // Safety: the map is read-only; bin2c never truncates its input.
    let map = unsafe { Mmap::map(&stdin) }?;
    map.advise(Advice::WillNeed)?;
    map.advise(Advice::Sequential)?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn file_to_pipe_prefers_zero_copy() {
        assert_eq!(choose(true, 1024, true), TransportMode::MmapVmsplice);
        assert_eq!(choose(false, 0, true), TransportMode::ReadVmsplice);
    }

    #[cfg(unix)]
    #[test]
    fn file_to_file_prefers_mmap() {
        assert_eq!(choose(true, 1024, false), TransportMode::MmapBuffered);
    }

    #[test]
    fn pipe_to_file_is_buffered() {
        let mode = choose(false, 0, false);
        assert_eq!(mode, TransportMode::ReadBuffered);
    }

    #[cfg(unix)]
    #[test]
    fn oversized_file_cannot_be_mapped() {
        if usize::MAX as u64 == u64::MAX {
            return; // every file fits on 64-bit targets
        }
        let mode = choose(true, u64::MAX, false);
        assert_eq!(mode, TransportMode::ReadBuffered);
    }
}
