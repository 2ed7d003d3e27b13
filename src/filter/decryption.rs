//! Block-based content decryption
//!
//! Encrypted resources start with a fixed-size header (the IV) followed by
//! ciphertext. A [`Decryptor`] turns one ciphertext block back into plain
//! text; [`DecryptStream`] buffers exactly one block at a time so large
//! resources are never held in memory whole.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use aes::cipher::{generic_array::GenericArray, BlockDecryptMut, KeyIvInit};
use tracing::warn;

use super::{ContentFilter, FilterError, FilterOperation, Result};
use crate::package::ManifestItem;
use crate::stream::range::resolve_seek;
use crate::stream::{poisoned_error, BoxedStream, ByteStream};

/// XML Encryption URI for AES-256 in CBC mode
pub const AES256_CBC_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Block cipher seam for [`DecryptionFilter`]
pub trait Decryptor: Send + Sync + fmt::Debug {
    /// Algorithm URI as written in `META-INF/encryption.xml`
    fn algorithm(&self) -> &str;

    /// Bytes of header preceding the ciphertext
    fn header_len(&self) -> usize;

    /// Ciphertext bytes per block; the last block may be shorter
    fn block_len(&self) -> usize;

    /// Ciphertext bytes immediately before a block that its decryption
    /// depends on. For block 0 these are the tail of the header.
    fn chain_len(&self) -> usize {
        0
    }

    /// Decrypt block `index` in place; `preceding` holds the
    /// [`chain_len`](Decryptor::chain_len) ciphertext bytes before it
    fn decrypt_block(&self, header: &[u8], preceding: &[u8], index: u64, block: &mut [u8])
        -> Result<()>;

    /// Padding bytes at the end of the decrypted final block
    fn padding_len(&self, _last_block: &[u8]) -> Result<usize> {
        Ok(0)
    }
}

/// Decrypts items whose declared algorithm matches its decryptor
#[derive(Debug, Clone)]
pub struct DecryptionFilter {
    decryptor: Arc<dyn Decryptor>,
}

impl DecryptionFilter {
    pub fn new(decryptor: Arc<dyn Decryptor>) -> Self {
        Self { decryptor }
    }
}

impl ContentFilter for DecryptionFilter {
    fn name(&self) -> &'static str {
        "decryption"
    }

    fn operation(&self) -> FilterOperation {
        FilterOperation::Decrypt
    }

    fn applies_to(&self, item: &ManifestItem) -> bool {
        item.encryption_algorithm() == Some(self.decryptor.algorithm())
    }

    fn wrap(&self, input: BoxedStream, item: &ManifestItem) -> Result<BoxedStream> {
        Ok(Box::new(DecryptStream::new(
            input,
            self.decryptor.clone(),
            &item.path,
        )?))
    }
}

/// Stream of plain text over `header || ciphertext`
pub struct DecryptStream {
    inner: BoxedStream,
    decryptor: Arc<dyn Decryptor>,
    header: Vec<u8>,
    /// Plain text length, padding excluded
    length: u64,
    pos: u64,
    /// Decrypted bytes of `block_index`
    block: Vec<u8>,
    block_index: Option<u64>,
    failure: Option<String>,
}

impl DecryptStream {
    /// Reads the header and decrypts the final block to learn the padding
    pub fn new(mut inner: BoxedStream, decryptor: Arc<dyn Decryptor>, path: &str) -> Result<Self> {
        let header_len = decryptor.header_len();
        let block_len = decryptor.block_len();
        let chain_len = decryptor.chain_len();
        if block_len == 0 {
            return Err(FilterError::transform("decryption", "block length is zero"));
        }
        if chain_len > header_len || chain_len > block_len {
            return Err(FilterError::transform(
                "decryption",
                format!(
                    "chain of {} bytes exceeds header ({}) or block ({})",
                    chain_len, header_len, block_len
                ),
            ));
        }

        let total = inner.length()?;
        if total < header_len as u64 {
            return Err(FilterError::InvalidHeader {
                path: path.to_string(),
                message: format!("{} bytes is shorter than the {} byte header", total, header_len),
            });
        }

        let mut header = vec![0u8; header_len];
        inner.seek(SeekFrom::Start(0))?;
        inner.read_exact(&mut header)?;

        let ciphertext_len = total - header_len as u64;
        let mut stream = Self {
            inner,
            decryptor,
            header,
            length: ciphertext_len,
            pos: 0,
            block: Vec::new(),
            block_index: None,
            failure: None,
        };

        if ciphertext_len > 0 {
            let last = (ciphertext_len - 1) / block_len as u64;
            stream.load_block(last)?;
            let padding = stream.decryptor.padding_len(&stream.block)?;
            if padding > stream.block.len() {
                return Err(FilterError::InvalidHeader {
                    path: path.to_string(),
                    message: format!("{} bytes of padding in a {} byte block", padding, stream.block.len()),
                });
            }
            stream.length = ciphertext_len - padding as u64;
        }
        Ok(stream)
    }

    fn load_block(&mut self, index: u64) -> io::Result<()> {
        let block_len = self.decryptor.block_len() as u64;
        let chain_len = self.decryptor.chain_len();
        let start = self.header.len() as u64 + index * block_len;
        self.inner.seek(SeekFrom::Start(start - chain_len as u64))?;

        let mut preceding = vec![0u8; chain_len];
        self.inner.read_exact(&mut preceding)?;

        self.block.clear();
        self.block_index = None;
        (&mut self.inner)
            .take(block_len)
            .read_to_end(&mut self.block)?;

        if let Err(e) = self
            .decryptor
            .decrypt_block(&self.header, &preceding, index, &mut self.block)
        {
            warn!(block = index, error = %e, "Decryption failed, poisoning stream");
            let message = e.to_string();
            self.failure = Some(message.clone());
            return Err(poisoned_error(&message));
        }
        self.block_index = Some(index);
        Ok(())
    }
}

impl Read for DecryptStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(ref failure) = self.failure {
            return Err(poisoned_error(failure));
        }
        if buf.is_empty() || self.pos >= self.length {
            return Ok(0);
        }

        let block_len = self.decryptor.block_len() as u64;
        let index = self.pos / block_len;
        if self.block_index != Some(index) {
            self.load_block(index)?;
        }

        let offset = (self.pos % block_len) as usize;
        let available = self.block.len().saturating_sub(offset);
        if available == 0 {
            return Ok(0);
        }
        let n = (available.min(buf.len()) as u64).min(self.length - self.pos) as usize;
        buf[..n].copy_from_slice(&self.block[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for DecryptStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.length)?;
        Ok(self.pos)
    }
}

impl ByteStream for DecryptStream {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.length)
    }
}

/// AES-256-CBC as used by XML Encryption
///
/// Resources are `iv || ciphertext`. The last plain text byte holds the
/// number of padding bytes (1 to 16), which covers both PKCS#7 and the
/// ISO 10126 padding of XML Encryption.
#[derive(Clone)]
pub struct Aes256CbcDecryptor {
    algorithm: String,
    key: [u8; 32],
}

impl Aes256CbcDecryptor {
    pub const IV_LEN: usize = 16;
    pub const AES_BLOCK_LEN: usize = 16;
    /// Ciphertext decrypted per stream block
    pub const BLOCK_LEN: usize = 4096;

    pub fn new(key: [u8; 32]) -> Self {
        Self::with_algorithm(AES256_CBC_ALGORITHM, key)
    }

    /// Decryptor registered under a different algorithm URI
    pub fn with_algorithm(algorithm: impl Into<String>, key: [u8; 32]) -> Self {
        Self {
            algorithm: algorithm.into(),
            key,
        }
    }
}

impl fmt::Debug for Aes256CbcDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aes256CbcDecryptor")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Decryptor for Aes256CbcDecryptor {
    fn algorithm(&self) -> &str {
        &self.algorithm
    }

    fn header_len(&self) -> usize {
        Self::IV_LEN
    }

    fn block_len(&self) -> usize {
        Self::BLOCK_LEN
    }

    fn chain_len(&self) -> usize {
        Self::AES_BLOCK_LEN
    }

    fn decrypt_block(
        &self,
        _header: &[u8],
        preceding: &[u8],
        _index: u64,
        block: &mut [u8],
    ) -> Result<()> {
        if block.len() % Self::AES_BLOCK_LEN != 0 {
            return Err(FilterError::transform(
                "aes256-cbc",
                format!("{} bytes is not a whole number of AES blocks", block.len()),
            ));
        }
        let mut cipher = Aes256CbcDec::new_from_slices(&self.key, preceding)
            .map_err(|_| FilterError::transform("aes256-cbc", "invalid IV length"))?;
        for chunk in block.chunks_exact_mut(Self::AES_BLOCK_LEN) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        Ok(())
    }

    fn padding_len(&self, last_block: &[u8]) -> Result<usize> {
        let Some(&padding) = last_block.last() else {
            return Ok(0);
        };
        let padding = padding as usize;
        if padding == 0 || padding > Self::AES_BLOCK_LEN || padding > last_block.len() {
            return Err(FilterError::transform(
                "aes256-cbc",
                format!("invalid padding length {}", padding),
            ));
        }
        Ok(padding)
    }
}
