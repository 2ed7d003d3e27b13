//! Library error types

use thiserror::Error;

use crate::cfi::CfiParseError;
use crate::package::PackageError;
use crate::publication::PublicationError;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalogue line {line}: {message}")]
    Catalogue { line: usize, message: String },

    #[error("Invalid epub3 URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown publication: {0}")]
    UnknownPublication(String),

    #[error("Publication {0} is not loaded")]
    NotLoaded(String),

    #[error(transparent)]
    Cfi(#[from] CfiParseError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Publication(#[from] PublicationError),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
