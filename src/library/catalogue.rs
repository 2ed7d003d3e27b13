//! Catalogue file format
//!
//! One line per container: the container locator followed by the unique
//! identifiers of the publications inside it, comma separated. Every field
//! is percent-encoded so locators and identifiers may contain commas or
//! line breaks.
//!
//! ```text
//! /books/moby-dick.epub,urn%3Auuid%3A1234%402024-01-01T00%3A00%3A00Z
//! /books/anthology.epub,vol-1,vol-2
//! ```

use super::error::{LibraryError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub locator: String,
    pub unique_ids: Vec<String>,
}

/// Parse catalogue text; blank lines are ignored
pub fn read_catalogue(source: &str) -> Result<Vec<CatalogueEntry>> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let line_no = index + 1;
            let mut fields = line.trim_end_matches('\r').split(',').map(|field| {
                urlencoding::decode(field)
                    .map(|f| f.into_owned())
                    .map_err(|e| LibraryError::Catalogue {
                        line: line_no,
                        message: e.to_string(),
                    })
            });

            let locator = fields.next().transpose()?.unwrap_or_default();
            if locator.is_empty() {
                return Err(LibraryError::Catalogue {
                    line: line_no,
                    message: "missing container locator".to_string(),
                });
            }
            let unique_ids = fields
                .filter(|f| !matches!(f, Ok(id) if id.is_empty()))
                .collect::<Result<Vec<_>>>()?;
            Ok(CatalogueEntry {
                locator,
                unique_ids,
            })
        })
        .collect()
}

/// Render catalogue text readable by [`read_catalogue`]
pub fn write_catalogue(entries: &[CatalogueEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&urlencoding::encode(&entry.locator));
        for id in &entry.unique_ids {
            out.push(',');
            out.push_str(&urlencoding::encode(id));
        }
        out.push('\n');
    }
    out
}
