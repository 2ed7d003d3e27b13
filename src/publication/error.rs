//! Publication addressing errors

use thiserror::Error;

use crate::cfi::{CfiError, CfiParseError};
use crate::filter::FilterError;
use crate::package::PackageError;

#[derive(Debug, Error)]
pub enum PublicationError {
    #[error("Manifest item not found: {0}")]
    ItemNotFound(String),

    #[error("CFI ends at <{element}>, which does not reference a manifest item")]
    NotAnItemReference { element: String },

    #[error("CFI range does not cross into a single manifest item")]
    RangeSpansDocuments,

    #[error(transparent)]
    Cfi(#[from] CfiError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Package(#[from] PackageError),
}

impl From<CfiParseError> for PublicationError {
    fn from(err: CfiParseError) -> Self {
        PublicationError::Cfi(CfiError::Malformed(err))
    }
}

pub type Result<T> = std::result::Result<T, PublicationError>;
