//! Window over a byte range of an underlying seekable reader

use std::io::{self, Read, Seek, SeekFrom};

use super::ByteStream;

/// Exposes `start..start + len` of `inner` as a stream of its own
#[derive(Debug)]
pub struct RangeStream<R> {
    inner: R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> RangeStream<R> {
    /// Create the window and position `inner` at its start
    pub fn new(mut inner: R, start: u64, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            start,
            len,
            pos: 0,
        })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for RangeStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.len.saturating_sub(self.pos);
        if left == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(left).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for RangeStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = resolve_seek(pos, self.pos, self.len)?;
        self.inner.seek(SeekFrom::Start(self.start + target.min(self.len)))?;
        self.pos = target;
        Ok(target)
    }
}

impl<R: Read + Seek + Send> ByteStream for RangeStream<R> {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }
}

/// Turn a `SeekFrom` into an absolute position for a stream of `len` bytes
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, len: u64) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
    };
    target.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_window_reads_only_range() {
        let data = b"0123456789".to_vec();
        let mut stream = RangeStream::new(Cursor::new(data), 3, 4).unwrap();

        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "3456");
        assert_eq!(stream.length().unwrap(), 4);
    }

    #[test]
    fn test_window_seek() {
        let data = b"0123456789".to_vec();
        let mut stream = RangeStream::new(Cursor::new(data), 2, 6).unwrap();

        stream.seek(SeekFrom::End(-2)).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "67");

        stream.seek(SeekFrom::Start(1)).unwrap();
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).unwrap();
        assert_eq!(&byte, b"3");
    }

    #[test]
    fn test_negative_seek_fails() {
        let mut stream = RangeStream::new(Cursor::new(vec![0u8; 4]), 0, 4).unwrap();
        assert!(stream.seek(SeekFrom::Current(-1)).is_err());
    }
}
