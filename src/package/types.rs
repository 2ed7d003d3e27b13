//! Package data types
//!
//! Core types for the parts of an EPUB package the engine works with.

use serde::{Deserialize, Serialize};

/// Manifest item (resource in the EPUB)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    /// Unique ID within the package
    pub id: String,
    /// Resource href as written in the OPF
    pub href: String,
    /// Path of the entry inside the container
    pub path: String,
    /// MIME type
    pub media_type: String,
    /// Space-separated properties (nav, cover-image, ...)
    pub properties: Vec<String>,
    /// Encryption declared for this resource in META-INF/encryption.xml
    pub encryption: Option<EncryptionInfo>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    /// Algorithm URI the resource is encrypted or obfuscated with
    pub fn encryption_algorithm(&self) -> Option<&str> {
        self.encryption.as_ref().map(|e| e.algorithm.as_str())
    }
}

/// Spine item (reading order)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineItem {
    /// Reference to manifest item
    pub idref: String,
    /// Whether this is linear content
    pub linear: bool,
}

/// One `EncryptedData` entry from META-INF/encryption.xml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    /// `EncryptionMethod/@Algorithm`
    pub algorithm: String,
    /// Compression applied before encryption, if declared
    pub compression: Option<Compression>,
}

/// `EncryptionProperty/Compression` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compression {
    /// 0 = stored, 8 = deflate
    pub method: u8,
    /// Size of the resource once decompressed
    pub original_length: Option<u64>,
}

impl Compression {
    pub const STORED: u8 = 0;
    pub const DEFLATE: u8 = 8;
}
