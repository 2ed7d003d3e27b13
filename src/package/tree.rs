//! Owned XML tree
//!
//! `roxmltree` documents borrow their source text, so parsed documents are
//! copied into an index-addressed arena that can be stored alongside the
//! package and walked by the CFI resolver.

use crate::cfi::{NodeKind, StructuralTree};

/// Handle to a node in an [`XmlTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct XmlNode {
    kind: NodeKind,
    /// Local tag name, empty for text
    name: String,
    id: Option<String>,
    attributes: Vec<(String, String)>,
    /// Text content of a text node
    text: String,
    children: Vec<NodeId>,
}

/// Elements and text of a parsed XML document
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<XmlNode>,
}

impl XmlTree {
    /// Parse `source`; comments and processing instructions are dropped
    pub fn parse(source: &str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(source)?;
        let mut tree = XmlTree { nodes: Vec::new() };
        tree.copy_node(doc.root_element());
        Ok(tree)
    }

    fn copy_node(&mut self, node: roxmltree::Node<'_, '_>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(XmlNode {
            kind: NodeKind::Element,
            name: node.tag_name().name().to_string(),
            id: node
                .attribute("id")
                .or_else(|| node.attribute((roxmltree::NS_XML_URI, "id")))
                .map(str::to_string),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text: String::new(),
            children: Vec::new(),
        });

        for child in node.children() {
            let child_id = if child.is_element() {
                self.copy_node(child)
            } else if child.is_text() {
                let text_id = NodeId(self.nodes.len());
                self.nodes.push(XmlNode {
                    kind: NodeKind::Text,
                    name: String::new(),
                    id: None,
                    attributes: Vec::new(),
                    text: child.text().unwrap_or_default().to_string(),
                    children: Vec::new(),
                });
                text_id
            } else {
                continue;
            };
            self.nodes[id.0].children.push(child_id);
        }

        id
    }

    /// The document element
    pub fn document_element(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id.0]
    }

    /// Local name of an element (empty for text)
    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Element children in document order
    pub fn elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|child| self.node(*child).kind == NodeKind::Element)
    }

    /// First element child with local name `name`
    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.elements(id).find(|child| self.name(*child) == name)
    }

    /// Descendant elements with local name `name`, in document order
    pub fn descendants_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.elements(id).collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            if self.name(el) == name {
                found.push(el);
            }
            let mut children: Vec<NodeId> = self.elements(el).collect();
            children.reverse();
            stack.extend(children);
        }
        found
    }

    /// Concatenated text of `id` and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let node = self.node(id);
        match node.kind {
            NodeKind::Text => node.text.clone(),
            NodeKind::Element => node
                .children
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }
}

impl StructuralTree for XmlTree {
    type Node = NodeId;

    fn root(&self) -> NodeId {
        self.document_element()
    }

    fn child_count(&self, node: &NodeId) -> usize {
        self.node(*node).children.len()
    }

    fn child_at(&self, node: &NodeId, index: usize) -> Option<NodeId> {
        self.node(*node).children.get(index).copied()
    }

    fn node_kind(&self, node: &NodeId) -> NodeKind {
        self.node(*node).kind
    }

    fn id_of_node(&self, node: &NodeId) -> Option<&str> {
        self.node(*node).id.as_deref()
    }

    fn text_length(&self, node: &NodeId) -> usize {
        let n = self.node(*node);
        match n.kind {
            NodeKind::Text => n.text.chars().count(),
            NodeKind::Element => n.children.iter().map(|c| self.text_length(c)).sum(),
        }
    }
}
