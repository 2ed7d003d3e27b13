//! Publication library
//!
//! Maps publication release identifiers to the containers holding them.
//! Containers named by the catalogue are known up front but only opened and
//! parsed on first use; opening a container registers every package in it.
//!
//! Containers and packages live in separately locked tables, so loading one
//! publication never blocks lookups of another that is already loaded.

mod catalogue;
mod error;
mod url;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cfi::{parse, Cfi};
use crate::config::{Config, FilterConfig};
use crate::filter::{Decryptor, FilterChain};
use crate::package::{Container, ManifestItem, Package, PackageError, ZipContainer};
use crate::publication::{locate_item, AddressedStream, Publication, PublicationError};

pub use catalogue::{read_catalogue, write_catalogue, CatalogueEntry};
pub use error::{LibraryError, Result};
pub use url::{EpubUrl, EPUB_URL_SCHEME};

/// Opens the container at a locator
pub type ContainerOpener =
    dyn Fn(&str) -> std::result::Result<Arc<dyn Container>, PackageError> + Send + Sync;

#[derive(Debug, Clone)]
struct PackageEntry {
    locator: String,
    publication: Option<Publication>,
}

static MAIN_LIBRARY: OnceLock<Library> = OnceLock::new();

pub struct Library {
    /// Locator -> container, `None` until opened
    containers: RwLock<HashMap<String, Option<Arc<dyn Container>>>>,
    /// Unique identifier -> location and, once loaded, the publication
    packages: RwLock<HashMap<String, PackageEntry>>,
    opener: Box<ContainerOpener>,
    filters: FilterConfig,
    decryptor: Option<Arc<dyn Decryptor>>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("containers", &self.containers.read().len())
            .field("packages", &self.packages.read().len())
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Library {
    /// Empty library opening `.epub` files from disk
    pub fn new(config: &Config) -> Self {
        Self::with_opener(config, |locator| {
            Ok(Arc::new(ZipContainer::open(locator)?) as Arc<dyn Container>)
        })
    }

    /// Empty library opening containers through `opener`
    pub fn with_opener(
        config: &Config,
        opener: impl Fn(&str) -> std::result::Result<Arc<dyn Container>, PackageError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            packages: RwLock::new(HashMap::new()),
            opener: Box::new(opener),
            filters: config.filters,
            decryptor: config.decryptor(),
        }
    }

    /// Library populated from a catalogue file; nothing is opened yet
    pub fn load(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let library = Self::new(config);
        library.read_catalogue_file(path.as_ref())?;
        Ok(library)
    }

    /// Process-wide library, created from the configured catalogue on first
    /// call. A missing catalogue file yields an empty library.
    pub fn main(config: &Config) -> Result<&'static Library> {
        if let Some(library) = MAIN_LIBRARY.get() {
            return Ok(library);
        }
        let library = Self::new(config);
        if config.catalogue.path.exists() {
            library.read_catalogue_file(&config.catalogue.path)?;
        }
        Ok(MAIN_LIBRARY.get_or_init(|| library))
    }

    fn read_catalogue_file(&self, path: &Path) -> Result<()> {
        let source = fs::read_to_string(path)?;
        let entries = read_catalogue(&source)?;

        let mut containers = self.containers.write();
        let mut packages = self.packages.write();
        for entry in &entries {
            containers.entry(entry.locator.clone()).or_insert(None);
            for id in &entry.unique_ids {
                packages.entry(id.clone()).or_insert_with(|| PackageEntry {
                    locator: entry.locator.clone(),
                    publication: None,
                });
            }
        }
        info!(path = %path.display(), containers = entries.len(), "Loaded library catalogue");
        Ok(())
    }

    /// Write the catalogue, one line per known container
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let entries = self.catalogue_entries();
        fs::write(path, write_catalogue(&entries))?;
        info!(path = %path.display(), containers = entries.len(), "Wrote library catalogue");
        Ok(())
    }

    /// Current contents as catalogue entries, sorted by locator and id
    pub fn catalogue_entries(&self) -> Vec<CatalogueEntry> {
        let mut by_locator: BTreeMap<String, Vec<String>> = self
            .containers
            .read()
            .keys()
            .map(|locator| (locator.clone(), Vec::new()))
            .collect();
        for (id, entry) in self.packages.read().iter() {
            by_locator
                .entry(entry.locator.clone())
                .or_default()
                .push(id.clone());
        }
        by_locator
            .into_iter()
            .map(|(locator, mut unique_ids)| {
                unique_ids.sort();
                CatalogueEntry {
                    locator,
                    unique_ids,
                }
            })
            .collect()
    }

    /// Unique identifiers of every known publication, sorted
    pub fn unique_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.packages.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Container locator holding the publication with `unique_id`
    pub fn path_for_epub_with_unique_id(&self, unique_id: &str) -> Option<String> {
        self.packages
            .read()
            .get(unique_id)
            .map(|entry| entry.locator.clone())
    }

    /// Container locator holding a publication with package identifier
    /// `package_id` (the unique identifier without its modification date)
    pub fn path_for_epub_with_package_id(&self, package_id: &str) -> Option<String> {
        let packages = self.packages.read();
        let with_date = format!("{}@", package_id);
        let mut matches: Vec<(&String, &PackageEntry)> = packages
            .iter()
            .filter(|(id, entry)| match entry.publication {
                Some(ref publication) => publication.package().package_id == package_id,
                None => id.as_str() == package_id || id.starts_with(&with_date),
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(b.0));
        matches.last().map(|(_, entry)| entry.locator.clone())
    }

    /// Register every package in an opened container; returns their unique ids
    pub fn add_publications_in_container(&self, container: Arc<dyn Container>) -> Result<Vec<String>> {
        let locator = container.locator().to_string();
        let packages = container.load_packages()?;

        let publications: Vec<Publication> = packages
            .into_iter()
            .map(|package| {
                let chain = FilterChain::for_package(&package, &self.filters, self.decryptor.clone());
                Publication::new(container.clone(), Arc::new(package), chain)
            })
            .collect();

        self.containers
            .write()
            .insert(locator.clone(), Some(container.clone()));

        let mut ids = Vec::with_capacity(publications.len());
        let mut table = self.packages.write();
        for publication in publications {
            let id = publication.package().unique_id.clone();
            if let Some(previous) = table.get(&id) {
                if previous.locator != locator {
                    warn!(unique_id = %id, previous = %previous.locator, locator = %locator, "Publication moved to another container");
                }
            }
            table.insert(
                id.clone(),
                PackageEntry {
                    locator: locator.clone(),
                    publication: Some(publication),
                },
            );
            ids.push(id);
        }
        info!(locator = %locator, publications = ids.len(), "Added container to library");
        Ok(ids)
    }

    /// Open the container at `locator` and register its packages
    pub fn add_publications_in_container_at_path(&self, locator: &str) -> Result<Vec<String>> {
        let container = (self.opener)(locator)?;
        self.add_publications_in_container(container)
    }

    /// Replace the filter chain of a loaded publication
    pub fn set_filter_chain(&self, unique_id: &str, chain: FilterChain) -> Result<()> {
        let mut table = self.packages.write();
        let entry = table
            .get_mut(unique_id)
            .ok_or_else(|| LibraryError::UnknownPublication(unique_id.to_string()))?;
        let publication = entry
            .publication
            .as_ref()
            .ok_or_else(|| LibraryError::NotLoaded(unique_id.to_string()))?;
        entry.publication = Some(Publication::new(
            publication.container().clone(),
            publication.package().clone(),
            chain,
        ));
        Ok(())
    }

    /// The loaded publication with `unique_id`, opening its container first
    /// when `allow_load` is set
    pub fn publication(&self, unique_id: &str, allow_load: bool) -> Result<Option<Publication>> {
        let locator = {
            let table = self.packages.read();
            let entry = table
                .get(unique_id)
                .ok_or_else(|| LibraryError::UnknownPublication(unique_id.to_string()))?;
            if let Some(ref publication) = entry.publication {
                return Ok(Some(publication.clone()));
            }
            entry.locator.clone()
        };
        if !allow_load {
            return Ok(None);
        }

        debug!(unique_id, locator = %locator, "Loading container on demand");
        let loaded = self.add_publications_in_container_at_path(&locator)?;
        if !loaded.iter().any(|id| id == unique_id) {
            warn!(unique_id, locator = %locator, "Container no longer holds publication");
            return Err(LibraryError::UnknownPublication(unique_id.to_string()));
        }
        Ok(self
            .packages
            .read()
            .get(unique_id)
            .and_then(|entry| entry.publication.clone()))
    }

    /// `epub3://` URL naming `package`
    pub fn epub_url_for_publication(&self, package: &Package) -> String {
        self.epub_url_for_publication_id(&package.unique_id)
    }

    pub fn epub_url_for_publication_id(&self, unique_id: &str) -> String {
        EpubUrl::for_publication(unique_id).to_string()
    }

    /// Package named by an `epub3://` URL
    pub fn package_for_epub_url(&self, url: &str, allow_load: bool) -> Result<Option<Arc<Package>>> {
        let url = EpubUrl::parse(url)?;
        Ok(self
            .publication(&url.unique_id, allow_load)?
            .map(|publication| publication.package().clone()))
    }

    /// `epub3://<id>/#epubcfi(...)` URL addressing `item`'s spine entry
    pub fn epub_cfi_url_for_manifest_item(&self, package: &Package, item: &ManifestItem) -> Result<String> {
        let cfi = package
            .spine_cfi(&item.id)
            .ok_or_else(|| PublicationError::ItemNotFound(item.id.clone()))?;
        Ok(EpubUrl::for_publication(&package.unique_id)
            .with_fragment(cfi.to_string())
            .to_string())
    }

    /// Manifest item a CFI URL points into, with the CFI left to resolve in it
    pub fn manifest_item_for_cfi(&self, url: &str) -> Result<(ManifestItem, Option<Cfi>)> {
        let parsed = EpubUrl::parse(url)?;
        let fragment = parsed
            .fragment
            .as_deref()
            .ok_or_else(|| LibraryError::InvalidUrl(url.to_string()))?;
        let cfi = parse(fragment)?;
        let publication = self.loaded_publication(&parsed.unique_id)?;
        let (item, remainder) = locate_item(&cfi, publication.package())?;
        Ok((item.clone(), remainder))
    }

    /// Filtered stream for an `epub3://` URL, loading the publication if
    /// needed. A CFI fragment is resolved through the publication; otherwise
    /// the URL path names the manifest item's container path.
    pub fn read_stream_for_epub_url(&self, url: &str) -> Result<AddressedStream> {
        let parsed = EpubUrl::parse(url)?;
        let publication = self
            .publication(&parsed.unique_id, true)?
            .ok_or_else(|| LibraryError::NotLoaded(parsed.unique_id.clone()))?;

        if let Some(ref fragment) = parsed.fragment {
            let cfi = parse(fragment)?;
            return Ok(publication.resolve_to_stream(&cfi)?);
        }

        let item = publication
            .package()
            .item_by_path(&parsed.path)
            .ok_or_else(|| PublicationError::ItemNotFound(parsed.path.clone()))?
            .clone();
        let stream = publication.item_stream(&item.id)?;
        Ok(AddressedStream {
            item,
            stream,
            remainder: None,
        })
    }

    fn loaded_publication(&self, unique_id: &str) -> Result<Publication> {
        self.publication(unique_id, false)?
            .ok_or_else(|| LibraryError::NotLoaded(unique_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_entries_include_unloaded_containers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.catalogue");
        fs::write(&path, "/books/a.epub,id-a@2024\n/books/b.epub\n").unwrap();

        let library = Library::load(&path, &Config::default()).unwrap();
        assert_eq!(
            library.path_for_epub_with_unique_id("id-a@2024").as_deref(),
            Some("/books/a.epub")
        );
        assert_eq!(
            library.path_for_epub_with_package_id("id-a").as_deref(),
            Some("/books/a.epub")
        );
        assert!(library.path_for_epub_with_package_id("id").is_none());

        let entries = library.catalogue_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].locator, "/books/b.epub");
        assert!(entries[1].unique_ids.is_empty());

        let out = dir.path().join("out.catalogue");
        library.write_to_file(&out).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "%2Fbooks%2Fa.epub,id-a%402024\n%2Fbooks%2Fb.epub\n"
        );
    }

    #[test]
    fn test_unloaded_publication_without_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.catalogue");
        fs::write(&path, "/missing.epub,book\n").unwrap();

        let library = Library::load(&path, &Config::default()).unwrap();
        assert!(library.package_for_epub_url("epub3://book/", false).unwrap().is_none());
        assert!(matches!(
            library.package_for_epub_url("epub3://book/", true),
            Err(LibraryError::Package(PackageError::Io(_)))
        ));
        assert!(matches!(
            library.package_for_epub_url("epub3://other/", false),
            Err(LibraryError::UnknownPublication(_))
        ));
    }

    #[test]
    fn test_publication_urls() {
        let library = Library::default();
        assert_eq!(library.epub_url_for_publication_id("book"), "epub3://book/");
    }
}
