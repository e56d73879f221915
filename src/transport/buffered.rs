// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Fallback engines: every emitted byte goes through the asynchronous
//! stdout stream, which batches it into half-buffer writes.

use crate::format::{Sink, StreamSink, BYTES_PER_CHUNK, CHUNK, INITIAL, SINGLE};
use crate::streams::{InputStream, OutputStream};
use crate::{Bin2cError, Bin2cResult};

/// Emit every byte of `data` as array elements.
pub(crate) fn encode_slice<S: Sink>(data: &[u8], sink: &mut S) {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    INITIAL.emit(&[first], sink);
    let mut chunks = rest.chunks_exact(BYTES_PER_CHUNK);
    for chunk in &mut chunks {
        let args: &[u8; BYTES_PER_CHUNK] = chunk.try_into().unwrap();
        CHUNK.emit(args, sink);
    }
    for &byte in chunks.remainder() {
        SINGLE.emit(&[byte], sink);
    }
}

/// Memory-mapped (or otherwise in-memory) input, buffered output.
pub(crate) fn run_from_slice(data: &[u8], prefix: &[u8], suffix: &[u8]) -> Bin2cResult<()> {
    let mut out = OutputStream::stdout().map_err(Bin2cError::Output)?;
    let mut sink = StreamSink::new(&mut out);
    sink.put(prefix);
    encode_slice(data, &mut sink);
    sink.put(suffix);
    sink.finish().map_err(Bin2cError::Output)?;
    out.dispose().map_err(Bin2cError::Output)
}

/// Buffered input, buffered output. `first` was already read by the
/// caller while probing for empty input.
pub(crate) fn run_from_stream(
    mut input: InputStream,
    first: u8,
    prefix: &[u8],
    suffix: &[u8],
) -> Bin2cResult<()> {
    let mut out = OutputStream::stdout().map_err(Bin2cError::Output)?;
    let mut sink = StreamSink::new(&mut out);
    sink.put(prefix);
    INITIAL.emit(&[first], &mut sink);

    let mut chunk = [0u8; BYTES_PER_CHUNK];
    loop {
        let n = input.read(&mut chunk).map_err(Bin2cError::Input)?;
        if n == BYTES_PER_CHUNK {
            CHUNK.emit(&chunk, &mut sink);
        } else {
            // Short read: the stream is drained.
            for &byte in &chunk[..n] {
                SINGLE.emit(&[byte], &mut sink);
            }
            break;
        }
    }

    sink.put(suffix);
    sink.finish().map_err(Bin2cError::Output)?;
    out.dispose().map_err(Bin2cError::Output)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink(Vec<u8>);

    impl Sink for VecSink {
        fn put(&mut self, bytes: &[u8]) {
            self.0.extend_from_slice(bytes);
        }
    }

    fn encode_to_string(data: &[u8]) -> String {
        let mut sink = VecSink(Vec::new());
        encode_slice(data, &mut sink);
        String::from_utf8(sink.0).unwrap()
    }

    fn expected(data: &[u8]) -> String {
        data.iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[test]
    fn empty_slice_emits_nothing() {
        assert_eq!(encode_to_string(&[]), "");
    }

    #[test]
    fn single_byte_has_no_separator() {
        assert_eq!(encode_to_string(&[0]), "0");
        assert_eq!(encode_to_string(&[255]), "255");
    }

    #[test]
    fn chunk_boundaries_are_invisible() {
        for len in [
            1,
            2,
            BYTES_PER_CHUNK - 1,
            BYTES_PER_CHUNK,
            BYTES_PER_CHUNK + 1,
            3 * BYTES_PER_CHUNK,
            3 * BYTES_PER_CHUNK + 5,
        ] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            assert_eq!(encode_to_string(&data), expected(&data), "len {len}");
        }
    }

    #[test]
    fn all_byte_values_round_trip() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(encode_to_string(&data), expected(&data));
    }
}
