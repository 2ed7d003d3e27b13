//! Publication containers
//!
//! A container is the physical archive a publication lives in. It hands out
//! raw entry streams and knows where its package documents and encryption
//! declarations are; everything above it works on [`BoxedStream`]s.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use zip::{CompressionMethod, ZipArchive};

use super::error::{PackageError, Result};
use super::opf::{resolve_href, Package};
use super::tree::XmlTree;
use super::types::{Compression, EncryptionInfo};
use crate::filter::InflateStream;
use crate::stream::{read_to_vec, BoxedStream, RangeStream};

/// Path of the OCF container document
pub const CONTAINER_XML: &str = "META-INF/container.xml";

/// Path of the OCF encryption declarations
pub const ENCRYPTION_XML: &str = "META-INF/encryption.xml";

/// Physical archive holding one or more publications
pub trait Container: Send + Sync + fmt::Debug {
    /// Location the container was opened from (a file path or a label)
    fn locator(&self) -> &str;

    fn contains(&self, path: &str) -> bool;

    /// Entry paths in archive order
    fn entry_names(&self) -> Vec<String>;

    /// Open a fresh raw stream over the entry at `path`
    fn open_entry(&self, path: &str) -> Result<BoxedStream>;

    fn read_entry(&self, path: &str) -> Result<Vec<u8>> {
        let mut stream = self.open_entry(path)?;
        Ok(read_to_vec(&mut stream)?)
    }

    fn read_entry_string(&self, path: &str) -> Result<String> {
        String::from_utf8(self.read_entry(path)?)
            .map_err(|_| PackageError::InvalidUtf8(path.to_string()))
    }

    /// Package document paths listed in `META-INF/container.xml`
    fn package_paths(&self) -> Result<Vec<String>> {
        let source = self.read_entry_string(CONTAINER_XML)?;
        parse_container_xml(&source)
    }

    /// Encryption declarations keyed by container path; empty if the
    /// container has no `META-INF/encryption.xml`
    fn encryption(&self) -> Result<HashMap<String, EncryptionInfo>> {
        if !self.contains(ENCRYPTION_XML) {
            return Ok(HashMap::new());
        }
        let source = self.read_entry_string(ENCRYPTION_XML)?;
        parse_encryption_xml(&source)
    }

    /// Parse every package the container declares
    fn load_packages(&self) -> Result<Vec<Package>> {
        let encryption = self.encryption()?;
        let paths = self.package_paths()?;
        if paths.is_empty() {
            return Err(PackageError::NoPackage(self.locator().to_string()));
        }
        paths
            .iter()
            .map(|path| {
                let source = self.read_entry_string(path)?;
                Package::parse(path, &source, &encryption)
            })
            .collect()
    }
}

/// Parse `META-INF/container.xml` into the list of rootfile paths
pub fn parse_container_xml(source: &str) -> Result<Vec<String>> {
    let tree = XmlTree::parse(source).map_err(|e| PackageError::Xml {
        path: CONTAINER_XML.to_string(),
        message: e.to_string(),
    })?;
    let root = tree.document_element();
    Ok(tree
        .descendants_named(root, "rootfile")
        .into_iter()
        .filter(|el| {
            tree.attribute(*el, "media-type")
                .map_or(true, |t| t == "application/oebps-package+xml")
        })
        .filter_map(|el| tree.attribute(el, "full-path"))
        .map(|path| resolve_href("", path))
        .collect())
}

/// Parse `META-INF/encryption.xml` into per-resource encryption info
pub fn parse_encryption_xml(source: &str) -> Result<HashMap<String, EncryptionInfo>> {
    let tree = XmlTree::parse(source).map_err(|e| PackageError::Xml {
        path: ENCRYPTION_XML.to_string(),
        message: e.to_string(),
    })?;
    let root = tree.document_element();

    let mut entries = HashMap::new();
    for data in tree.descendants_named(root, "EncryptedData") {
        let Some(algorithm) = tree
            .find_child(data, "EncryptionMethod")
            .and_then(|m| tree.attribute(m, "Algorithm"))
        else {
            warn!("EncryptedData without an EncryptionMethod, skipping");
            continue;
        };
        let Some(uri) = tree
            .descendants_named(data, "CipherReference")
            .first()
            .and_then(|r| tree.attribute(*r, "URI"))
        else {
            warn!(algorithm, "EncryptedData without a CipherReference, skipping");
            continue;
        };

        let compression = tree
            .descendants_named(data, "Compression")
            .first()
            .and_then(|c| {
                let method = tree.attribute(*c, "Method")?.trim().parse().ok()?;
                let original_length = tree
                    .attribute(*c, "OriginalLength")
                    .and_then(|l| l.trim().parse().ok());
                Some(Compression {
                    method,
                    original_length,
                })
            });

        entries.insert(
            resolve_href("", uri),
            EncryptionInfo {
                algorithm: algorithm.to_string(),
                compression,
            },
        );
    }
    Ok(entries)
}

// ============================================================================
// ZIP container
// ============================================================================

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

#[derive(Debug, Clone)]
struct Entry {
    data_start: u64,
    compressed_size: u64,
    size: u64,
    compression: CompressionMethod,
}

/// OCF ZIP container
///
/// The central directory is read once on open. Each entry stream gets its
/// own reader over the archive, so streams from one container can be used
/// concurrently.
pub struct ZipContainer {
    locator: String,
    source: Source,
    names: Vec<String>,
    entries: HashMap<String, Entry>,
}

impl ZipContainer {
    /// Open a container on disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::index(
            path.to_string_lossy().into_owned(),
            Source::File(path.to_path_buf()),
            file,
        )
    }

    /// Open a container held in memory; `locator` names it in catalogues
    pub fn from_bytes(locator: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data: Arc<[u8]> = data.into();
        Self::index(
            locator.into(),
            Source::Memory(data.clone()),
            Cursor::new(data),
        )
    }

    fn index<R: Read + Seek>(locator: String, source: Source, reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut names = Vec::with_capacity(archive.len());
        let mut entries = HashMap::with_capacity(archive.len());

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            entries.insert(
                name.clone(),
                Entry {
                    data_start: file.data_start(),
                    compressed_size: file.compressed_size(),
                    size: file.size(),
                    compression: file.compression(),
                },
            );
            names.push(name);
        }

        debug!(locator = %locator, entries = names.len(), "Indexed ZIP container");
        Ok(Self {
            locator,
            source,
            names,
            entries,
        })
    }

    fn open_raw(&self, entry: &Entry) -> Result<BoxedStream> {
        let stream: BoxedStream = match self.source {
            Source::File(ref path) => Box::new(RangeStream::new(
                File::open(path)?,
                entry.data_start,
                entry.compressed_size,
            )?),
            Source::Memory(ref data) => Box::new(RangeStream::new(
                Cursor::new(data.clone()),
                entry.data_start,
                entry.compressed_size,
            )?),
        };
        Ok(stream)
    }
}

impl fmt::Debug for ZipContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipContainer")
            .field("locator", &self.locator)
            .field("entries", &self.names.len())
            .finish()
    }
}

impl Container for ZipContainer {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    fn entry_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn open_entry(&self, path: &str) -> Result<BoxedStream> {
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| PackageError::EntryNotFound(path.to_string()))?;
        let raw = self.open_raw(entry)?;

        match entry.compression {
            CompressionMethod::Stored => Ok(raw),
            CompressionMethod::Deflated => {
                Ok(Box::new(InflateStream::new(raw, Some(entry.size))?))
            }
            other => Err(PackageError::UnsupportedCompression {
                path: path.to_string(),
                method: format!("{:?}", other),
            }),
        }
    }
}
