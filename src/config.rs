//! Configuration management for the EPUB engine

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::filter::{Aes256CbcDecryptor, Decryptor, AES256_CBC_ALGORITHM};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub catalogue: CatalogueConfig,
    pub filters: FilterConfig,
    pub content_key: Option<ContentKeyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogueConfig {
    /// Library catalogue file
    pub path: PathBuf,
}

/// Which default filters a publication's chain gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FilterConfig {
    pub deobfuscate_fonts: bool,
    pub inflate: bool,
}

/// Key for the bundled AES-256-CBC decryptor
#[derive(Clone, Deserialize)]
pub struct ContentKeyConfig {
    pub algorithm: String,
    pub key: [u8; 32],
}

impl std::fmt::Debug for ContentKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKeyConfig")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var} must be 64 hex digits: {message}")]
    InvalidKey { var: &'static str, message: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            catalogue: CatalogueConfig {
                path: PathBuf::from("epub-library.catalogue"),
            },
            filters: FilterConfig::default(),
            content_key: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            deobfuscate_fonts: true,
            inflate: true,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read configuration through `lookup`, which maps variable names to values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let flag = |var: &'static str, default: bool| -> Result<bool, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => Ok(true),
                    "0" | "false" | "no" | "off" => Ok(false),
                    _ => Err(ConfigError::InvalidBool { var, value }),
                },
            }
        };

        let content_key = match lookup("EPUB_ENGINE_CONTENT_KEY") {
            None => None,
            Some(hex_key) => {
                let mut key = [0u8; 32];
                hex::decode_to_slice(hex_key.trim(), &mut key).map_err(|e| {
                    ConfigError::InvalidKey {
                        var: "EPUB_ENGINE_CONTENT_KEY",
                        message: e.to_string(),
                    }
                })?;
                Some(ContentKeyConfig {
                    algorithm: lookup("EPUB_ENGINE_CONTENT_ALGORITHM")
                        .unwrap_or_else(|| AES256_CBC_ALGORITHM.to_string()),
                    key,
                })
            }
        };

        Ok(Config {
            catalogue: CatalogueConfig {
                path: lookup("EPUB_ENGINE_CATALOGUE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.catalogue.path),
            },
            filters: FilterConfig {
                deobfuscate_fonts: flag(
                    "EPUB_ENGINE_DEOBFUSCATE_FONTS",
                    defaults.filters.deobfuscate_fonts,
                )?,
                inflate: flag("EPUB_ENGINE_INFLATE", defaults.filters.inflate)?,
            },
            content_key,
        })
    }

    /// Decryptor for the configured content key, if any
    pub fn decryptor(&self) -> Option<Arc<dyn Decryptor>> {
        self.content_key.as_ref().map(|k| {
            Arc::new(Aes256CbcDecryptor::with_algorithm(k.algorithm.clone(), k.key))
                as Arc<dyn Decryptor>
        })
    }
}
