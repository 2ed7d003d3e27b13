//! Filter error types

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("No key provisioned for {algorithm}")]
    MissingKey { algorithm: String },

    #[error("Invalid encryption header on {path}: {message}")]
    InvalidHeader { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{filter} failed: {message}")]
    Transform {
        filter: &'static str,
        message: String,
    },
}

impl FilterError {
    pub(crate) fn transform(filter: &'static str, message: impl Into<String>) -> Self {
        FilterError::Transform {
            filter,
            message: message.into(),
        }
    }
}

impl From<FilterError> for io::Error {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
