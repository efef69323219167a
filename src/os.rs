//! Positional file I/O that never moves a shared cursor, so one handle can
//! serve concurrent readers. Short transfers are looped to completion here.

use std::fs::File;
use std::io::{Error, ErrorKind, Result};

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], pos: u64) -> Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, pos)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], pos: u64) -> Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, pos)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], pos: u64) -> Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, pos)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], pos: u64) -> Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, pos)
}

/// Fill `buf` from `pos`, retrying short reads. Returns the number of bytes
/// read, which is less than `buf.len()` only when end of file was reached.
pub fn read_full_at(file: &File, buf: &mut [u8], pos: u64) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match pread(file, &mut buf[filled..], pos + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write all of `buf` at `pos`, retrying short writes.
pub fn write_all_at(file: &File, buf: &[u8], pos: u64) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match pwrite(file, &buf[written..], pos + written as u64) {
            Ok(0) => {
                return Err(Error::new(
                    ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
