//! Container and package error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error in {path}: {message}")]
    Xml { path: String, message: String },

    #[error("Entry not found in container: {0}")]
    EntryNotFound(String),

    #[error("Unsupported compression method {method} for entry {path}")]
    UnsupportedCompression { path: String, method: String },

    #[error("Missing <{element}> in {path}")]
    MissingElement { path: String, element: &'static str },

    #[error("Package {0} has no identifier")]
    MissingIdentifier(String),

    #[error("Container {0} declares no package")]
    NoPackage(String),

    #[error("Entry {0} is not valid UTF-8")]
    InvalidUtf8(String),
}

pub type Result<T> = std::result::Result<T, PackageError>;
