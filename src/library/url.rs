//! `epub3://` URLs
//!
//! `epub3://<unique-id>/<path>#<fragment>` names a publication by its
//! release identifier, optionally a container path inside it, and
//! optionally a CFI fragment. The identifier is percent-encoded.

use std::fmt;

use super::error::{LibraryError, Result};

pub const EPUB_URL_SCHEME: &str = "epub3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubUrl {
    pub unique_id: String,
    /// Container path, empty when the URL names the publication itself
    pub path: String,
    pub fragment: Option<String>,
}

impl EpubUrl {
    pub fn for_publication(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            path: String::new(),
            fragment: None,
        }
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || LibraryError::InvalidUrl(url.to_string());

        let rest = url
            .strip_prefix(EPUB_URL_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(invalid)?;
        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (rest, None),
        };
        let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
        if host.is_empty() {
            return Err(invalid());
        }

        let decode = |s: &str| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .map_err(|_| invalid())
        };
        Ok(Self {
            unique_id: decode(host)?,
            path: decode(path)?,
            fragment: fragment.map(str::to_string),
        })
    }
}

impl fmt::Display for EpubUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/",
            EPUB_URL_SCHEME,
            urlencoding::encode(&self.unique_id)
        )?;
        let path: Vec<_> = self
            .path
            .split('/')
            .map(|segment| urlencoding::encode(segment))
            .collect();
        f.write_str(&path.join("/"))?;
        if let Some(ref fragment) = self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}
