// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::io::AsRawFd;

use nix::fcntl::{fcntl, FcntlArg, OFlag};

/// Descriptor a stream reads from.
pub type InChannel = File;
/// Descriptor a stream writes to.
pub type OutChannel = File;

/// Duplicate of fd 0, so the stream owns a descriptor sharing standard
/// input's open file description.
pub fn stdin_channel() -> io::Result<InChannel> {
    Ok(File::from(io::stdin().as_fd().try_clone_to_owned()?))
}

/// Duplicate of fd 1.
pub fn stdout_channel() -> io::Result<OutChannel> {
    Ok(File::from(io::stdout().as_fd().try_clone_to_owned()?))
}

/// Wrap an already-owned descriptor, e.g. one end of a test pipe.
#[cfg(test)]
pub fn channel_from_fd(fd: std::os::fd::OwnedFd) -> File {
    File::from(fd)
}

pub fn read(channel: &InChannel, buf: &mut [u8]) -> io::Result<usize> {
    (&*channel).read(buf)
}

/// Write the whole buffer, retrying on short writes and EINTR.
pub fn write_all(channel: &OutChannel, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match (&*channel).write(buf) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Toggle `O_NONBLOCK` on the descriptor's open file description.
pub fn set_nonblocking(channel: &InChannel, enabled: bool) -> io::Result<()> {
    let bits = fcntl(channel.as_raw_fd(), FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let mut flags = OFlag::from_bits_truncate(bits);
    flags.set(OFlag::O_NONBLOCK, enabled);
    fcntl(channel.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

/// Size in bytes of one base page.
pub fn base_page_size() -> usize {
    // Safety: sysconf has no memory-safety preconditions.
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}
