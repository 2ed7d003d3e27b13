//! Raw DEFLATE decompression
//!
//! Used both for deflated ZIP entries and for resources that were compressed
//! before being encrypted (`Compression Method="8"` in
//! `META-INF/encryption.xml`).

use std::io::{self, Read, Seek, SeekFrom};

use flate2::read::DeflateDecoder;
use tracing::warn;

use super::{ContentFilter, FilterOperation, Result};
use crate::package::{Compression, ManifestItem};
use crate::stream::range::resolve_seek;
use crate::stream::{poisoned_error, BoxedStream, ByteStream};

/// Inflates resources declared as compressed-then-encrypted
///
/// Only resources encrypted with `algorithm` are inflated: the compressed
/// bytes sit under the encryption, so inflating is only possible once the
/// chain has decrypted them.
#[derive(Debug, Clone)]
pub struct InflateFilter {
    algorithm: String,
}

impl InflateFilter {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
        }
    }
}

impl ContentFilter for InflateFilter {
    fn name(&self) -> &'static str {
        "inflate"
    }

    fn operation(&self) -> FilterOperation {
        FilterOperation::Decompress
    }

    fn applies_to(&self, item: &ManifestItem) -> bool {
        item.encryption.as_ref().is_some_and(|e| {
            e.algorithm == self.algorithm
                && e.compression.is_some_and(|c| c.method == Compression::DEFLATE)
        })
    }

    fn wrap(&self, input: BoxedStream, item: &ManifestItem) -> Result<BoxedStream> {
        let length = item
            .encryption
            .as_ref()
            .and_then(|e| e.compression)
            .and_then(|c| c.original_length);
        Ok(Box::new(InflateStream::new(input, length)?))
    }
}

/// Seekable stream of inflated bytes
///
/// Forward seeks decompress and discard; backward seeks restart from the
/// beginning of the compressed input. The inflated length is taken from the
/// caller when known and computed on first request otherwise.
pub struct InflateStream {
    /// `None` once a rewind failed
    decoder: Option<DeflateDecoder<BoxedStream>>,
    pos: u64,
    length: Option<u64>,
    failure: Option<String>,
}

impl InflateStream {
    pub fn new(mut inner: BoxedStream, length: Option<u64>) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            decoder: Some(DeflateDecoder::new(inner)),
            pos: 0,
            length,
            failure: None,
        })
    }

    fn decoder(&mut self) -> io::Result<&mut DeflateDecoder<BoxedStream>> {
        if let Some(ref failure) = self.failure {
            return Err(poisoned_error(failure));
        }
        self.decoder
            .as_mut()
            .ok_or_else(|| poisoned_error("inflate stream lost its input"))
    }

    fn poison(&mut self, err: io::Error) -> io::Error {
        warn!(error = %err, "Inflate failed, poisoning stream");
        let message = err.to_string();
        self.failure = Some(message.clone());
        poisoned_error(&message)
    }

    fn rewind(&mut self) -> io::Result<()> {
        let Some(decoder) = self.decoder.take() else {
            return Err(poisoned_error("inflate stream lost its input"));
        };
        let mut inner = decoder.into_inner();
        inner.seek(SeekFrom::Start(0))?;
        self.decoder = Some(DeflateDecoder::new(inner));
        self.pos = 0;
        Ok(())
    }

    /// Decompress and drop up to `count` bytes; returns how many were skipped
    fn skip(&mut self, count: u64) -> io::Result<u64> {
        let decoder = self.decoder()?;
        let skipped = match io::copy(&mut decoder.take(count), &mut io::sink()) {
            Ok(n) => n,
            Err(e) => return Err(self.poison(e)),
        };
        self.pos += skipped;
        Ok(skipped)
    }
}

impl Read for InflateStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let decoder = self.decoder()?;
        match decoder.read(buf) {
            Ok(n) => {
                self.pos += n as u64;
                Ok(n)
            }
            Err(e) => Err(self.poison(e)),
        }
    }
}

impl Seek for InflateStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = match pos {
            SeekFrom::End(_) => self.length()?,
            _ => 0,
        };
        let target = resolve_seek(pos, self.pos, len)?;
        if target < self.pos {
            self.rewind()?;
        }
        self.skip(target - self.pos)?;
        // Past the end the decoder is exhausted and reads return 0
        self.pos = target;
        Ok(target)
    }
}

impl ByteStream for InflateStream {
    fn length(&mut self) -> io::Result<u64> {
        if let Some(length) = self.length {
            return Ok(length);
        }
        let pos = self.pos;
        self.rewind()?;
        let total = self.skip(u64::MAX)?;
        self.rewind()?;
        self.skip(pos)?;
        self.length = Some(total);
        Ok(total)
    }
}
