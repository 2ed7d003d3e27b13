//! OPF (Open Packaging Format) package document
//!
//! Parses the package document into its manifest and spine, and keeps the
//! document's element tree so package-level CFIs can be resolved against it.

use std::collections::HashMap;

use super::error::{PackageError, Result};
use super::tree::{NodeId, XmlTree};
use super::types::{EncryptionInfo, ManifestItem, SpineItem};
use crate::cfi::{Cfi, CfiPath, CfiStep};

/// A parsed package document
#[derive(Debug, Clone)]
pub struct Package {
    /// Release identifier: `<identifier>@<modified>`, or the bare identifier
    pub unique_id: String,
    /// The `dc:identifier` named by `package/@unique-identifier`
    pub package_id: String,
    pub title: Option<String>,
    /// Path of the OPF inside the container
    pub opf_path: String,
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<SpineItem>,
    /// Element tree of the OPF, walked by package-level CFIs
    pub tree: XmlTree,
    by_id: HashMap<String, usize>,
}

impl Package {
    /// Parse the OPF at `opf_path` with encryption entries keyed by container path
    pub fn parse(
        opf_path: &str,
        source: &str,
        encryption: &HashMap<String, EncryptionInfo>,
    ) -> Result<Self> {
        let tree = XmlTree::parse(source).map_err(|e| PackageError::Xml {
            path: opf_path.to_string(),
            message: e.to_string(),
        })?;
        let root = tree.document_element();
        let base_dir = parent_dir(opf_path);

        let missing = |element| PackageError::MissingElement {
            path: opf_path.to_string(),
            element,
        };
        let metadata = tree.find_child(root, "metadata").ok_or_else(|| missing("metadata"))?;
        let manifest_el = tree.find_child(root, "manifest").ok_or_else(|| missing("manifest"))?;
        let spine_el = tree.find_child(root, "spine").ok_or_else(|| missing("spine"))?;

        let package_id = find_identifier(&tree, root, metadata)
            .ok_or_else(|| PackageError::MissingIdentifier(opf_path.to_string()))?;
        let modified = tree
            .elements(metadata)
            .find(|el| {
                tree.name(*el) == "meta" && tree.attribute(*el, "property") == Some("dcterms:modified")
            })
            .map(|el| tree.text_content(el).trim().to_string())
            .filter(|m| !m.is_empty());
        let unique_id = match modified {
            Some(modified) => format!("{}@{}", package_id, modified),
            None => package_id.clone(),
        };
        let title = tree
            .find_child(metadata, "title")
            .map(|el| tree.text_content(el).trim().to_string());

        let manifest: Vec<ManifestItem> = tree
            .elements(manifest_el)
            .filter(|el| tree.name(*el) == "item")
            .filter_map(|el| {
                let id = tree.attribute(el, "id")?;
                let href = tree.attribute(el, "href")?;
                let path = resolve_href(base_dir, href);
                let media_type = tree
                    .attribute(el, "media-type")
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&path)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let properties = tree
                    .attribute(el, "properties")
                    .map(|p| p.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                Some(ManifestItem {
                    id: id.to_string(),
                    href: href.to_string(),
                    encryption: encryption.get(&path).cloned(),
                    path,
                    media_type,
                    properties,
                })
            })
            .collect();

        let spine = tree
            .elements(spine_el)
            .filter(|el| tree.name(*el) == "itemref")
            .filter_map(|el| {
                Some(SpineItem {
                    idref: tree.attribute(el, "idref")?.to_string(),
                    linear: tree.attribute(el, "linear") != Some("no"),
                })
            })
            .collect();

        let by_id = manifest
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();

        Ok(Self {
            unique_id,
            package_id,
            title,
            opf_path: opf_path.to_string(),
            manifest,
            spine,
            tree,
            by_id,
        })
    }

    /// Look up a manifest item by id
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).map(|&i| &self.manifest[i])
    }

    /// Look up a manifest item by its container path
    pub fn item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.path == path)
    }

    /// Manifest id referenced by an `itemref` node of the package tree
    pub fn idref_of(&self, node: NodeId) -> Option<&str> {
        if self.tree.name(node) != "itemref" {
            return None;
        }
        self.tree.attribute(node, "idref")
    }

    /// Package-level CFI addressing the spine entry of `item_id`,
    /// e.g. `epubcfi(/6/4[chap01ref])`
    pub fn spine_cfi(&self, item_id: &str) -> Option<Cfi> {
        let root = self.tree.document_element();
        let spine_pos = self
            .tree
            .elements(root)
            .position(|el| self.tree.name(el) == "spine")?;
        let spine_el = self.tree.find_child(root, "spine")?;
        let (itemref_pos, itemref) = self
            .tree
            .elements(spine_el)
            .enumerate()
            .find(|(_, el)| self.tree.attribute(*el, "idref") == Some(item_id))?;

        let mut step = CfiStep::element(((itemref_pos + 1) * 2) as u32);
        step.id_assertion = self.tree.attribute(itemref, "id").map(str::to_string);
        Some(Cfi::new(CfiPath::with_steps(vec![
            CfiStep::element(((spine_pos + 1) * 2) as u32),
            step,
        ])))
    }
}

fn find_identifier(tree: &XmlTree, root: NodeId, metadata: NodeId) -> Option<String> {
    let identifiers: Vec<NodeId> = tree
        .elements(metadata)
        .filter(|el| tree.name(*el) == "identifier")
        .collect();
    let wanted = tree.attribute(root, "unique-identifier");
    identifiers
        .iter()
        .find(|el| wanted.is_some() && tree.attribute(**el, "id") == wanted)
        .or_else(|| identifiers.first())
        .map(|el| tree.text_content(*el).trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Directory part of a container path, without trailing slash
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve an OPF-relative href into a container path
pub(crate) fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let decoded = urlencoding::decode(href)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string());

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="pub-id">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:identifier id="isbn">978-0000000000</dc:identifier>
        <dc:identifier id="pub-id">urn:uuid:0816f6ed-1b5f-4b8a-9a35-5d6e3b3d4e10</dc:identifier>
        <dc:title>Test Book</dc:title>
        <meta property="dcterms:modified">2024-01-01T00:00:00Z</meta>
    </metadata>
    <manifest>
        <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
        <item id="chapter1" href="text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
        <item id="font" href="../fonts/serif.otf" media-type="font/otf"/>
        <item id="cover" href="images/cover.png"/>
    </manifest>
    <spine>
        <itemref idref="nav" linear="no"/>
        <itemref id="chap01ref" idref="chapter1"/>
    </spine>
</package>"#;

    #[test]
    fn test_parse_package() {
        let package = Package::parse("OEBPS/content.opf", OPF, &HashMap::new()).unwrap();

        assert_eq!(package.package_id, "urn:uuid:0816f6ed-1b5f-4b8a-9a35-5d6e3b3d4e10");
        assert_eq!(
            package.unique_id,
            "urn:uuid:0816f6ed-1b5f-4b8a-9a35-5d6e3b3d4e10@2024-01-01T00:00:00Z"
        );
        assert_eq!(package.title.as_deref(), Some("Test Book"));
        assert_eq!(package.manifest.len(), 4);
        assert_eq!(package.spine.len(), 2);
        assert!(!package.spine[0].linear);
        assert!(package.manifest_item("nav").unwrap().has_property("nav"));
    }

    #[test]
    fn test_paths_resolved_against_opf_dir() {
        let package = Package::parse("OEBPS/content.opf", OPF, &HashMap::new()).unwrap();

        assert_eq!(package.manifest_item("chapter1").unwrap().path, "OEBPS/text/chapter 1.xhtml");
        assert_eq!(package.manifest_item("font").unwrap().path, "fonts/serif.otf");
        assert_eq!(package.manifest_item("cover").unwrap().media_type, "image/png");
    }

    #[test]
    fn test_encryption_attached_by_path() {
        let mut encryption = HashMap::new();
        encryption.insert(
            "fonts/serif.otf".to_string(),
            EncryptionInfo {
                algorithm: "http://www.idpf.org/2008/embedding".to_string(),
                compression: None,
            },
        );
        let package = Package::parse("OEBPS/content.opf", OPF, &encryption).unwrap();
        assert_eq!(
            package.manifest_item("font").unwrap().encryption_algorithm(),
            Some("http://www.idpf.org/2008/embedding")
        );
        assert!(package.manifest_item("chapter1").unwrap().encryption.is_none());
    }

    #[test]
    fn test_spine_cfi() {
        let package = Package::parse("OEBPS/content.opf", OPF, &HashMap::new()).unwrap();
        let cfi = package.spine_cfi("chapter1").unwrap();
        assert_eq!(cfi.to_string(), "epubcfi(/6/4[chap01ref])");
        assert!(package.spine_cfi("font").is_none());
    }

    #[test]
    fn test_missing_spine() {
        let opf = r#"<package><metadata><identifier>x</identifier></metadata><manifest/></package>"#;
        let err = Package::parse("content.opf", opf, &HashMap::new()).unwrap_err();
        assert!(matches!(err, PackageError::MissingElement { element: "spine", .. }));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("", "a/b.xhtml#frag"), "a/b.xhtml");
        assert_eq!(resolve_href("OPS/xhtml", "../images/c%20d.png"), "OPS/images/c d.png");
    }
}
