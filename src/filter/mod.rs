//! Content filters
//!
//! A [`ContentFilter`] decides whether it applies to a manifest item and, if
//! so, wraps the item's byte stream in a lazily transforming stream. Filters
//! hold no per-request state; anything a transform needs while reading lives
//! in the stream returned by [`ContentFilter::wrap`].
//!
//! A [`FilterChain`] is the ordered, immutable list of filters for one
//! publication.

mod chain;
mod decryption;
mod error;
mod inflate;
mod obfuscation;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::package::ManifestItem;
use crate::stream::BoxedStream;

pub use chain::FilterChain;
pub use decryption::{
    Aes256CbcDecryptor, DecryptStream, DecryptionFilter, Decryptor, AES256_CBC_ALGORITHM,
};
pub use error::{FilterError, Result};
pub use inflate::{InflateFilter, InflateStream};
pub use obfuscation::{
    adobe_key, idpf_key, ObfuscationFilter, ObfuscationMethod, XorStream, ADOBE_ALGORITHM,
    IDPF_ALGORITHM,
};

/// What a filter does to the bytes, used for ordering and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperation {
    Decrypt,
    Decompress,
    Deobfuscate,
    PassThrough,
}

impl fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOperation::Decrypt => "decrypt",
            FilterOperation::Decompress => "decompress",
            FilterOperation::Deobfuscate => "deobfuscate",
            FilterOperation::PassThrough => "pass-through",
        };
        f.write_str(name)
    }
}

/// Byte-stream transform applied to manifest item content
pub trait ContentFilter: Send + Sync + fmt::Debug {
    /// Short name for logs and errors
    fn name(&self) -> &'static str;

    fn operation(&self) -> FilterOperation;

    /// Whether this filter transforms `item`. Must be free of side effects.
    fn applies_to(&self, item: &ManifestItem) -> bool;

    /// Wrap `input` in a stream yielding the transformed bytes of `item`
    fn wrap(&self, input: BoxedStream, item: &ManifestItem) -> Result<BoxedStream>;
}
