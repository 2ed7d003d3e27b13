//! Font de-obfuscation
//!
//! Two schemes are in use:
//!
//! - IDPF (`http://www.idpf.org/2008/embedding`): the first 1040 bytes are
//!   XORed with the SHA-1 of the package identifier, whitespace removed.
//! - Adobe (`http://ns.adobe.com/pdf/enc#RC`): the first 1024 bytes are
//!   XORed with the 16 bytes of the UUID in the package identifier.
//!
//! XOR is its own inverse, so the same stream obfuscates and de-obfuscates.

use std::io::{self, Read, Seek, SeekFrom};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::{ContentFilter, FilterError, FilterOperation, Result};
use crate::package::ManifestItem;
use crate::stream::{BoxedStream, ByteStream};

pub const IDPF_ALGORITHM: &str = "http://www.idpf.org/2008/embedding";
pub const ADOBE_ALGORITHM: &str = "http://ns.adobe.com/pdf/enc#RC";

const IDPF_LENGTH: u64 = 1040;
const ADOBE_LENGTH: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObfuscationMethod {
    Idpf,
    Adobe,
}

impl ObfuscationMethod {
    pub fn from_algorithm(uri: &str) -> Option<Self> {
        match uri {
            IDPF_ALGORITHM => Some(ObfuscationMethod::Idpf),
            ADOBE_ALGORITHM => Some(ObfuscationMethod::Adobe),
            _ => None,
        }
    }

    /// Number of leading bytes the scheme scrambles
    pub fn obfuscated_length(self) -> u64 {
        match self {
            ObfuscationMethod::Idpf => IDPF_LENGTH,
            ObfuscationMethod::Adobe => ADOBE_LENGTH,
        }
    }
}

/// De-obfuscates embedded fonts declared in `META-INF/encryption.xml`
#[derive(Debug, Clone)]
pub struct ObfuscationFilter {
    idpf_key: [u8; 20],
    adobe_key: Option<[u8; 16]>,
}

impl ObfuscationFilter {
    /// Derive both keys from the package identifier
    pub fn new(identifier: &str) -> Self {
        Self {
            idpf_key: idpf_key(identifier),
            adobe_key: adobe_key(identifier),
        }
    }

    fn key_for(&self, method: ObfuscationMethod) -> Option<&[u8]> {
        match method {
            ObfuscationMethod::Idpf => Some(&self.idpf_key),
            ObfuscationMethod::Adobe => self.adobe_key.as_ref().map(|k| k.as_slice()),
        }
    }
}

impl ContentFilter for ObfuscationFilter {
    fn name(&self) -> &'static str {
        "font-deobfuscation"
    }

    fn operation(&self) -> FilterOperation {
        FilterOperation::Deobfuscate
    }

    fn applies_to(&self, item: &ManifestItem) -> bool {
        item.encryption_algorithm()
            .and_then(ObfuscationMethod::from_algorithm)
            .is_some()
    }

    fn wrap(&self, input: BoxedStream, item: &ManifestItem) -> Result<BoxedStream> {
        let algorithm = item.encryption_algorithm().unwrap_or_default();
        let method = ObfuscationMethod::from_algorithm(algorithm)
            .ok_or_else(|| FilterError::transform(self.name(), format!("unknown algorithm {}", algorithm)))?;
        let key = self.key_for(method).ok_or_else(|| FilterError::MissingKey {
            algorithm: algorithm.to_string(),
        })?;
        Ok(Box::new(XorStream::new(input, key, method.obfuscated_length())?))
    }
}

/// IDPF key: SHA-1 of the identifier with XML whitespace removed
pub fn idpf_key(identifier: &str) -> [u8; 20] {
    let stripped: String = identifier
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
        .collect();
    Sha1::digest(stripped.as_bytes()).into()
}

/// Adobe key: the UUID of a `urn:uuid:` identifier as 16 raw bytes
pub fn adobe_key(identifier: &str) -> Option<[u8; 16]> {
    let trimmed = identifier.trim();
    let uuid = trimmed.strip_prefix("urn:uuid:").unwrap_or(trimmed);
    let digits: String = uuid.chars().filter(|c| *c != '-').collect();
    let mut key = [0u8; 16];
    hex::decode_to_slice(digits, &mut key).ok()?;
    Some(key)
}

/// XORs the first `limit` bytes of `inner` with a repeating key
pub struct XorStream {
    inner: BoxedStream,
    key: Vec<u8>,
    limit: u64,
    pos: u64,
}

impl XorStream {
    pub fn new(mut inner: BoxedStream, key: &[u8], limit: u64) -> io::Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self {
            inner,
            key: key.to_vec(),
            limit,
            pos,
        })
    }
}

impl Read for XorStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.pos < self.limit && !self.key.is_empty() {
            let key_len = self.key.len() as u64;
            for (i, byte) in buf[..n].iter_mut().enumerate() {
                let at = self.pos + i as u64;
                if at >= self.limit {
                    break;
                }
                *byte ^= self.key[(at % key_len) as usize];
            }
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for XorStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.inner.seek(pos)?;
        Ok(self.pos)
    }
}

impl ByteStream for XorStream {
    fn length(&mut self) -> io::Result<u64> {
        self.inner.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::EncryptionInfo;
    use crate::stream::read_to_vec;
    use std::io::Cursor;

    const IDENTIFIER: &str = "urn:uuid:0816f6ed-1b5f-4b8a-9a35-5d6e3b3d4e10";

    fn font(algorithm: Option<&str>) -> ManifestItem {
        ManifestItem {
            id: "font".to_string(),
            href: "fonts/serif.otf".to_string(),
            path: "OEBPS/fonts/serif.otf".to_string(),
            media_type: "font/otf".to_string(),
            properties: Vec::new(),
            encryption: algorithm.map(|a| EncryptionInfo {
                algorithm: a.to_string(),
                compression: None,
            }),
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    fn obfuscate(data: &[u8], key: &[u8], limit: usize) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, b)| if i < limit { b ^ key[i % key.len()] } else { *b })
            .collect()
    }

    #[test]
    fn test_idpf_key_ignores_whitespace() {
        assert_eq!(idpf_key(" urn:uuid:abc\n"), idpf_key("urn:uuid:abc"));
        assert_eq!(
            hex::encode(idpf_key("abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_adobe_key_from_uuid() {
        let key = adobe_key(IDENTIFIER).unwrap();
        assert_eq!(hex::encode(key), "0816f6ed1b5f4b8a9a355d6e3b3d4e10");
        assert!(adobe_key("isbn:978-0").is_none());
    }

    #[test]
    fn test_applies_only_to_obfuscated_items() {
        let filter = ObfuscationFilter::new(IDENTIFIER);
        assert!(filter.applies_to(&font(Some(IDPF_ALGORITHM))));
        assert!(filter.applies_to(&font(Some(ADOBE_ALGORITHM))));
        assert!(!filter.applies_to(&font(Some("urn:other"))));
        assert!(!filter.applies_to(&font(None)));
    }

    #[test]
    fn test_idpf_deobfuscation() {
        let plain = sample(3000);
        let key = idpf_key(IDENTIFIER);
        let scrambled = obfuscate(&plain, &key, 1040);
        assert_ne!(scrambled, plain);

        let filter = ObfuscationFilter::new(IDENTIFIER);
        let mut stream = filter
            .wrap(Box::new(Cursor::new(scrambled)), &font(Some(IDPF_ALGORITHM)))
            .unwrap();
        assert_eq!(stream.length().unwrap(), 3000);
        assert_eq!(read_to_vec(&mut stream).unwrap(), plain);
    }

    #[test]
    fn test_adobe_deobfuscation_after_seek() {
        let plain = sample(2048);
        let key = adobe_key(IDENTIFIER).unwrap();
        let scrambled = obfuscate(&plain, &key, 1024);

        let filter = ObfuscationFilter::new(IDENTIFIER);
        let mut stream = filter
            .wrap(Box::new(Cursor::new(scrambled)), &font(Some(ADOBE_ALGORITHM)))
            .unwrap();
        stream.seek(SeekFrom::Start(1000)).unwrap();
        let mut window = vec![0u8; 48];
        stream.read_exact(&mut window).unwrap();
        assert_eq!(window, &plain[1000..1048]);
    }

    #[test]
    fn test_adobe_without_uuid_is_missing_key() {
        let filter = ObfuscationFilter::new("isbn:978-0000000000");
        let err = filter
            .wrap(Box::new(Cursor::new(vec![0u8; 4])), &font(Some(ADOBE_ALGORITHM)))
            .err()
            .unwrap();
        assert!(matches!(err, FilterError::MissingKey { .. }));
    }
}
