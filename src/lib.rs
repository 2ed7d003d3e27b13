//! EPUB Engine Library
//!
//! Addressing and content access for EPUB publications.
//!
//! # Modules
//!
//! - `cfi`: EPUB CFI parsing, ordering and resolution against structural trees
//! - `stream`: Seekable byte streams with a known length
//! - `filter`: Content filters (decryption, inflate, font de-obfuscation) and filter chains
//! - `package`: OCF containers and OPF packages
//! - `publication`: Resolves a CFI to the filtered stream of a manifest item
//! - `library`: Catalogue of known publications and `epub3://` URLs
//! - `config`: Environment-driven configuration

pub mod cfi;
pub mod config;
pub mod filter;
pub mod library;
pub mod package;
pub mod publication;
pub mod stream;

pub use cfi::{parse, Cfi, CfiError, CfiParseError};
pub use config::Config;
pub use filter::{ContentFilter, FilterChain};
pub use library::Library;
pub use package::{Container, Package, ZipContainer};
pub use publication::{resolve_to_stream, AddressedStream, Publication, PublicationError};
