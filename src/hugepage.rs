// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore Hugepagesize hugepages meminfo

//! Huge-page size discovery via `/proc/meminfo`.

use std::fs::File;
use std::io::Read;

use memchr::memchr;

const MEMINFO: &str = "/proc/meminfo";
const KEY: &[u8] = b"Hugepagesize:";
const READ_SIZE: usize = 4096;

/// Size in bytes of one huge page, or `None` when the kernel does not
/// report one (or the report cannot be read or parsed).
pub fn huge_page_size() -> Option<usize> {
    let file = File::open(MEMINFO).ok()?;
    parse_huge_page_size(file, READ_SIZE)
}

enum State {
    /// `matched` leading bytes of the key seen so far.
    Key { matched: usize },
    /// Key found, skipping the whitespace before the value.
    Space,
    /// Accumulating value digits.
    Digits { value: usize },
}

/// Scan `reader` for the `Hugepagesize:` line and return its value
/// scaled from kilobytes to bytes.
///
/// The scanner holds its progress in [`State`], not in the buffer, so a
/// key or value split across two reads is matched seamlessly. Resetting
/// to the first key byte on a mismatch is enough: no prefix of the key
/// reoccurs inside it, so a failed partial match cannot hide the start
/// of a real one anywhere but at the mismatching byte itself.
fn parse_huge_page_size<R: Read>(mut reader: R, read_size: usize) -> Option<usize> {
    let mut buf = vec![0u8; read_size];
    let mut state = State::Key { matched: 0 };
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                // EOF closes a value that was still being read.
                return match state {
                    State::Digits { value } if value > 0 => Some(value * 1024),
                    _ => None,
                };
            }
            Ok(n) => n,
            Err(_) => return None,
        };
        let mut i = 0;
        while i < n {
            let byte = buf[i];
            match state {
                State::Key { matched: 0 } => match memchr(KEY[0], &buf[i..n]) {
                    Some(offset) => {
                        i += offset + 1;
                        state = State::Key { matched: 1 };
                    }
                    None => i = n,
                },
                State::Key { matched } => {
                    if byte == KEY[matched] {
                        i += 1;
                        state = if matched + 1 == KEY.len() {
                            State::Space
                        } else {
                            State::Key {
                                matched: matched + 1,
                            }
                        };
                    } else {
                        // Re-examine this byte as a possible key start.
                        state = State::Key { matched: 0 };
                    }
                }
                State::Space => match byte {
                    b' ' | b'\t' => i += 1,
                    b'0'..=b'9' => state = State::Digits { value: 0 },
                    _ => return None,
                },
                State::Digits { value } => match byte {
                    b'0'..=b'9' => {
                        state = State::Digits {
                            value: value * 10 + usize::from(byte - b'0'),
                        };
                        i += 1;
                    }
                    _ => return if value > 0 { Some(value * 1024) } else { None },
                },
            }
        }
    }
}
