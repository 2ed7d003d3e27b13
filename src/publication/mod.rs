//! Publication addressing
//!
//! Ties a package's CFI resolution to its container and filter chain: a
//! package-level CFI such as `epubcfi(/6/4[chap01ref]!/4/2/1:3)` becomes the
//! filtered byte stream of the referenced manifest item plus the part of the
//! CFI (`/4/2/1:3`) that addresses a location inside that item.
//!
//! Resolving the remainder needs a parser for the item's own markup, which
//! is left to the caller (see [`crate::package::XmlTree`] for XHTML).

mod error;

use std::sync::Arc;

use tracing::debug;

use crate::cfi::{resolve, Cfi, Resolution, Target};
use crate::config::FilterConfig;
use crate::filter::{Decryptor, FilterChain};
use crate::package::{Container, ManifestItem, Package};
use crate::stream::BoxedStream;

pub use error::{PublicationError, Result};

/// Filtered content of a manifest item reached through a CFI
pub struct AddressedStream {
    pub item: ManifestItem,
    pub stream: BoxedStream,
    /// CFI left to resolve inside the item; `None` when the CFI addressed
    /// the item as a whole
    pub remainder: Option<Cfi>,
}

impl std::fmt::Debug for AddressedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressedStream")
            .field("item", &self.item.id)
            .field("remainder", &self.remainder.as_ref().map(|c| c.to_string()))
            .finish_non_exhaustive()
    }
}

/// A package together with the container it lives in and its filter chain
#[derive(Debug, Clone)]
pub struct Publication {
    container: Arc<dyn Container>,
    package: Arc<Package>,
    chain: FilterChain,
}

impl Publication {
    pub fn new(container: Arc<dyn Container>, package: Arc<Package>, chain: FilterChain) -> Self {
        Self {
            container,
            package,
            chain,
        }
    }

    /// Load the first package of `container` with the default filter chain
    pub fn open(
        container: Arc<dyn Container>,
        config: &FilterConfig,
        decryptor: Option<Arc<dyn Decryptor>>,
    ) -> Result<Self> {
        let package = container
            .load_packages()?
            .into_iter()
            .next()
            .ok_or_else(|| crate::package::PackageError::NoPackage(container.locator().to_string()))?;
        let chain = FilterChain::for_package(&package, config, decryptor);
        Ok(Self::new(container, Arc::new(package), chain))
    }

    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Resolve `cfi` to the filtered stream of the item it points into
    pub fn resolve_to_stream(&self, cfi: &Cfi) -> Result<AddressedStream> {
        resolve_to_stream(cfi, &self.package, self.container.as_ref(), &self.chain)
    }

    /// Filtered stream of the manifest item `id`
    pub fn item_stream(&self, id: &str) -> Result<BoxedStream> {
        let item = self
            .package
            .manifest_item(id)
            .ok_or_else(|| PublicationError::ItemNotFound(id.to_string()))?;
        open_item(item, self.container.as_ref(), &self.chain)
    }

    /// Package-level CFI addressing the spine entry of item `id`
    pub fn cfi_for_item(&self, id: &str) -> Result<Cfi> {
        self.package
            .spine_cfi(id)
            .ok_or_else(|| PublicationError::ItemNotFound(id.to_string()))
    }
}

/// Resolve `cfi` against `package` and open the item it points into.
///
/// The CFI must either cross an indirection at a spine `itemref` (the
/// remainder is returned for the item's own resolver) or end exactly at one
/// (the whole item is returned, with no remainder).
pub fn resolve_to_stream(
    cfi: &Cfi,
    package: &Package,
    container: &dyn Container,
    chain: &FilterChain,
) -> Result<AddressedStream> {
    let (item, remainder) = locate_item(cfi, package)?;
    debug!(
        cfi = %cfi,
        item = %item.id,
        remainder = ?remainder.as_ref().map(|r| r.to_string()),
        "Resolved CFI to manifest item"
    );
    let stream = open_item(item, container, chain)?;
    Ok(AddressedStream {
        item: item.clone(),
        stream,
        remainder,
    })
}

/// Manifest item a package-level CFI points into, and the remaining CFI
pub fn locate_item<'p>(cfi: &Cfi, package: &'p Package) -> Result<(&'p ManifestItem, Option<Cfi>)> {
    let (node, remainder) = match resolve(&package.tree, cfi)? {
        Resolution::Indirection { node, remainder } => (node, Some(remainder)),
        Resolution::Location(location) => match location.target {
            Target::Element(node) if location.offset.is_none() => (node, None),
            other => {
                return Err(PublicationError::NotAnItemReference {
                    element: package.tree.name(*other.node()).to_string(),
                })
            }
        },
        Resolution::Range(_) => return Err(PublicationError::RangeSpansDocuments),
    };

    let idref = package
        .idref_of(node)
        .ok_or_else(|| PublicationError::NotAnItemReference {
            element: package.tree.name(node).to_string(),
        })?;
    let item = package
        .manifest_item(idref)
        .ok_or_else(|| PublicationError::ItemNotFound(idref.to_string()))?;
    Ok((item, remainder))
}

fn open_item(
    item: &ManifestItem,
    container: &dyn Container,
    chain: &FilterChain,
) -> Result<BoxedStream> {
    let raw = container.open_entry(&item.path)?;
    Ok(chain.filtered_stream(raw, item)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::{parse, CfiError};
    use crate::package::{PackageError, Result as PackageResult};
    use crate::stream::read_to_vec;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// Container over a map of entries
    #[derive(Debug)]
    struct MapContainer(HashMap<String, Vec<u8>>);

    impl Container for MapContainer {
        fn locator(&self) -> &str {
            "map"
        }

        fn contains(&self, path: &str) -> bool {
            self.0.contains_key(path)
        }

        fn entry_names(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }

        fn open_entry(&self, path: &str) -> PackageResult<BoxedStream> {
            self.0
                .get(path)
                .map(|data| Box::new(Cursor::new(data.clone())) as BoxedStream)
                .ok_or_else(|| PackageError::EntryNotFound(path.to_string()))
        }
    }

    const OPF: &str = r#"<package unique-identifier="id">
  <metadata><identifier id="id">book</identifier></metadata>
  <manifest>
    <item id="chap01" href="chap01.xhtml" media-type="application/xhtml+xml"/>
    <item id="chap02" href="chap02.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref id="chap01ref" idref="chap01"/>
    <itemref id="chap02ref" idref="chap02"/>
    <itemref id="ghostref" idref="ghost"/>
  </spine>
</package>"#;

    fn publication() -> Publication {
        let mut entries = HashMap::new();
        entries.insert("OEBPS/chap01.xhtml".to_string(), b"<p>one</p>".to_vec());
        entries.insert("OEBPS/chap02.xhtml".to_string(), b"<p>two</p>".to_vec());
        let package = Package::parse("OEBPS/content.opf", OPF, &HashMap::new()).unwrap();
        Publication::new(
            Arc::new(MapContainer(entries)),
            Arc::new(package),
            FilterChain::empty(),
        )
    }

    #[test]
    fn test_indirection_opens_item_with_remainder() {
        let publication = publication();
        let cfi = parse("epubcfi(/6/4[chap02ref]!/4/2/1:1)").unwrap();

        let mut addressed = publication.resolve_to_stream(&cfi).unwrap();
        assert_eq!(addressed.item.id, "chap02");
        assert_eq!(addressed.remainder.unwrap().to_string(), "epubcfi(/4/2/1:1)");
        assert_eq!(read_to_vec(&mut addressed.stream).unwrap(), b"<p>two</p>");
    }

    #[test]
    fn test_itemref_without_indirection_is_whole_item() {
        let publication = publication();
        let cfi = publication.cfi_for_item("chap01").unwrap();
        assert_eq!(cfi.to_string(), "epubcfi(/6/2[chap01ref])");

        let addressed = publication.resolve_to_stream(&cfi).unwrap();
        assert_eq!(addressed.item.id, "chap01");
        assert!(addressed.remainder.is_none());
    }

    #[test]
    fn test_missing_manifest_entry() {
        let publication = publication();
        let cfi = parse("epubcfi(/6/6[ghostref]!/4)").unwrap();
        let err = publication.resolve_to_stream(&cfi).unwrap_err();
        assert!(matches!(err, PublicationError::ItemNotFound(ref id) if id == "ghost"));
    }

    #[test]
    fn test_non_itemref_target() {
        let publication = publication();
        let cfi = parse("epubcfi(/4/2)").unwrap();
        let err = publication.resolve_to_stream(&cfi).unwrap_err();
        assert!(matches!(err, PublicationError::NotAnItemReference { ref element } if element == "item"));
    }

    #[test]
    fn test_resolver_errors_propagate() {
        let publication = publication();
        let cfi = parse("epubcfi(/6/8!/4)").unwrap();
        let err = publication.resolve_to_stream(&cfi).unwrap_err();
        assert!(matches!(err, PublicationError::Cfi(CfiError::NodeNotFound { step: 2, .. })));

        let cfi = parse("epubcfi(/6/4[wrong]!/4)").unwrap();
        let err = publication.resolve_to_stream(&cfi).unwrap_err();
        assert!(matches!(err, PublicationError::Cfi(CfiError::AssertionMismatch { .. })));
    }

    #[test]
    fn test_item_stream() {
        let publication = publication();
        let mut stream = publication.item_stream("chap01").unwrap();
        assert_eq!(read_to_vec(&mut stream).unwrap(), b"<p>one</p>");
        assert!(matches!(
            publication.item_stream("nope").err().unwrap(),
            PublicationError::ItemNotFound(_)
        ));
    }
}
