//! Byte streams handed between container, filters and callers
//!
//! A [`ByteStream`] is a seekable reader that also knows how many bytes it
//! will yield. Streams are owned by whoever holds them and are closed when
//! dropped.

pub(crate) mod range;

use std::fs::File;
use std::io::{self, Cursor, Read, Seek};

pub use range::RangeStream;

/// Seekable byte source with a known total length
pub trait ByteStream: Read + Seek + Send {
    /// Total number of bytes this stream yields from position 0.
    ///
    /// Takes `&mut self` so transforming streams can compute it lazily.
    fn length(&mut self) -> io::Result<u64>;
}

/// Owned, type-erased stream
pub type BoxedStream = Box<dyn ByteStream>;

impl<T: AsRef<[u8]> + Send> ByteStream for Cursor<T> {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().as_ref().len() as u64)
    }
}

impl ByteStream for File {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl ByteStream for BoxedStream {
    fn length(&mut self) -> io::Result<u64> {
        (**self).length()
    }
}

/// Read a whole stream from its current position
pub fn read_to_vec(stream: &mut dyn ByteStream) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    stream.read_to_end(&mut data)?;
    Ok(data)
}

/// Address of the stream object behind a box, for identity checks
pub fn stream_addr(stream: &BoxedStream) -> *const () {
    &**stream as *const dyn ByteStream as *const ()
}

/// Io error for a stream that refuses further reads after a failure
pub(crate) fn poisoned_error(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_length() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        assert_eq!(cursor.length().unwrap(), 3);
    }

    #[test]
    fn test_file_length() {
        use std::io::Write;

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"hello").unwrap();
        assert_eq!(file.length().unwrap(), 5);
    }

    #[test]
    fn test_boxed_stream_identity() {
        let boxed: BoxedStream = Box::new(Cursor::new(b"abc".to_vec()));
        let addr = stream_addr(&boxed);
        let moved = boxed;
        assert_eq!(stream_addr(&moved), addr);
    }
}
