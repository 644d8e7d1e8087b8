//! Small file helpers shared by the page server and the device
//! front-end.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// Punches a hole of `len` bytes at `offset`, preserving the file size.
///
/// Uses `fallocate(2)` with `FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE`
/// where available; filesystems (or platforms) without hole support get
/// an explicit zero fill, which is observably equivalent for readers.
pub(crate) fn punch_hole(file: &File, offset: u64, len: u64) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the fd is owned by `file` and stays open for the
        // duration of the call; fallocate does not retain it.
        let ret = unsafe {
            libc::fallocate(
                file.as_raw_fd(),
                libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                offset as libc::off_t,
                len as libc::off_t,
            )
        };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            // filesystem without hole support: fall back to zeroing
            Some(code) if code == libc::EOPNOTSUPP || code == libc::ENOTSUP => {},
            _ => return Err(err),
        }
    }

    zero_fill(file, offset, len)
}

fn zero_fill(file: &File, offset: u64, len: u64) -> io::Result<()> {
    const CHUNK: usize = 64 * 1024;
    let zeros = [0u8; CHUNK];
    let mut position = offset;
    let mut remaining = len;
    while remaining > 0 {
        let step = remaining.min(CHUNK as u64) as usize;
        file.write_all_at(&zeros[..step], position)?;
        position += step as u64;
        remaining -= step as u64;
    }
    Ok(())
}

/// Reads up to `buf.len()` bytes at `offset`, looping on short reads.
/// Returns the number of bytes read, which falls short of the buffer
/// only at end of file.
pub(crate) fn read_at_full(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn punch_hole_zeroes_the_range() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0xAA; 8192]).unwrap();
        let file = tmp.reopen().unwrap();

        punch_hole(&file, 1024, 2048).unwrap();

        let mut buf = [0u8; 8192];
        assert_eq!(read_at_full(&file, &mut buf, 0).unwrap(), 8192);
        assert!(buf[..1024].iter().all(|&b| b == 0xAA));
        assert!(buf[1024..3072].iter().all(|&b| b == 0));
        assert!(buf[3072..].iter().all(|&b| b == 0xAA));
        assert_eq!(file.metadata().unwrap().len(), 8192, "size must be preserved");
    }

    #[test]
    fn read_at_full_reports_short_reads_at_eof() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[7u8; 100]).unwrap();
        let file = tmp.reopen().unwrap();

        let mut buf = [0u8; 200];
        assert_eq!(read_at_full(&file, &mut buf, 0).unwrap(), 100);
        assert_eq!(read_at_full(&file, &mut buf, 100).unwrap(), 0);
    }
}
