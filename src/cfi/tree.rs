//! Structural tree abstraction walked by the resolver
//!
//! The resolver only needs ordered children, node kinds, ids and text
//! lengths. Any tree owner (an arena, an external DOM) can implement this.

/// Kind of a child node as far as CFI indexing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Addressed by even indices
    Element,
    /// Grouped into odd-index runs between elements
    Text,
}

/// Ordered tree consumed by [`crate::cfi::resolve`]
pub trait StructuralTree {
    /// Handle to a node; cheap to clone
    type Node: Clone + std::fmt::Debug;

    /// Node the first step is resolved against
    fn root(&self) -> Self::Node;

    /// Number of children (elements and text) under `node`
    fn child_count(&self, node: &Self::Node) -> usize;

    /// Child at 0-based position, in document order
    fn child_at(&self, node: &Self::Node, index: usize) -> Option<Self::Node>;

    fn node_kind(&self, node: &Self::Node) -> NodeKind;

    /// Value of the node's `id`, if any
    fn id_of_node(&self, node: &Self::Node) -> Option<&str>;

    /// Length in characters of the node's text content
    fn text_length(&self, node: &Self::Node) -> usize;
}
