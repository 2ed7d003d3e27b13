//! CFI (Canonical Fragment Identifier) module for EPUB
//!
//! This module provides parsing, building, comparison and resolution of
//! EPUB CFI strings.
//!
//! # Example CFI
//!
//! ```text
//! epubcfi(/6/4[chapter1]!/4/2/1:42)
//!         │  │         │ │ │ │ └── character offset 42
//!         │  │         │ │ │ └──── text node (odd = text)
//!         │  │         │ │ └────── element index
//!         │  │         │ └──────── element index (body)
//!         │  │         └────────── indirection (into content doc)
//!         │  └──────────────────── spine item with ID
//!         └─────────────────────── spine element
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use epub_engine::cfi::{parse, resolve, CfiBuilder, Resolution};
//!
//! let cfi = parse("epubcfi(/6/4!/4/2/1:42)")?;
//!
//! // Resolve against the package document; the walk stops at the `!`
//! if let Resolution::Indirection { node, remainder } = resolve(&package.tree, &cfi)? {
//!     // `remainder` is `epubcfi(/4/2/1:42)`, for the content document
//! }
//! ```

mod builder;
mod comparator;
mod error;
mod parser;
mod resolver;
mod tree;
mod types;

// Re-export main types
pub use types::{
    CharacterOffset, Cfi, CfiPath, CfiRange, CfiStep, SideBias, SpatialOffset, TemporalOffset,
    TextAssertion,
};

pub use error::{CfiError, CfiParseError, ParseErrorKind, Result};

// Re-export parser functions
pub use parser::{parse, try_parse};

pub use builder::CfiBuilder;

// Re-export comparator functions
pub use comparator::{compare_cfi_strings, is_after, is_before, is_in_range, sort_cfis};

pub use resolver::{
    resolve, resolve_path, Resolution, ResolvedLocation, ResolvedRange, Target,
};
pub use tree::{NodeKind, StructuralTree};
