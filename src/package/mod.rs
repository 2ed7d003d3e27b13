//! EPUB container and package model
//!
//! - [`Container`]: the physical archive (`ZipContainer` for `.epub` files)
//! - [`Package`]: a parsed OPF with manifest, spine and its element tree
//! - [`XmlTree`]: owned XML arena that CFIs are resolved against

mod container;
mod error;
mod opf;
mod tree;
mod types;

pub use container::{
    parse_container_xml, parse_encryption_xml, Container, ZipContainer, CONTAINER_XML,
    ENCRYPTION_XML,
};
pub use error::{PackageError, Result};
pub use opf::Package;
pub use tree::{NodeId, XmlTree};
pub use types::{Compression, EncryptionInfo, ManifestItem, SpineItem};
