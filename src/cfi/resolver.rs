//! CFI Resolver
//!
//! Walks a [`StructuralTree`] step by step. Even indices select the n-th
//! element child, odd indices select the run of text nodes between two
//! elements. The structural index is authoritative: an id assertion is only
//! checked against the node it selects.
//!
//! When a step carries an indirection the walk stops and hands the node and
//! the unconsumed part of the CFI back to the caller. That part always keeps
//! at least one step, so it renders to a CFI the parser accepts. The resolver never
//! follows an indirection itself, because the referenced document is a
//! different tree (package manifest vs. content markup).

use tracing::{debug, trace};

use super::error::{CfiError, Result};
use super::tree::{NodeKind, StructuralTree};
use super::types::*;

/// What a path resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum Target<N> {
    /// An element child (even index)
    Element(N),
    /// A non-empty run of text nodes under `parent` (odd index)
    Text { parent: N, nodes: Vec<N> },
}

impl<N> Target<N> {
    /// The node reached: the element, or the first text node of the run
    pub fn node(&self) -> &N {
        match self {
            Target::Element(node) => node,
            Target::Text { nodes, parent } => nodes.first().unwrap_or(parent),
        }
    }
}

/// A concrete location in the tree
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation<N> {
    pub target: Target<N>,
    /// Unconsumed path when the walk crossed an indirection
    pub remaining: Option<CfiPath>,
    /// Validated character offset within the target's text
    pub offset: Option<u32>,
    pub side_bias: Option<SideBias>,
}

/// Both ends of a range, resolved from the shared prefix
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRange<N> {
    pub shared: Target<N>,
    pub start: ResolvedLocation<N>,
    pub end: ResolvedLocation<N>,
}

/// Outcome of resolving a whole CFI
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<N> {
    Location(ResolvedLocation<N>),
    Range(ResolvedRange<N>),
    /// The main path (or a range prefix) crossed an indirection at `node`;
    /// `remainder` addresses a location inside the referenced document.
    Indirection { node: N, remainder: Cfi },
}

impl<N> Resolution<N> {
    /// The CFI left for a downstream resolver, if the walk handed off
    pub fn remainder(&self) -> Option<&Cfi> {
        match self {
            Resolution::Indirection { remainder, .. } => Some(remainder),
            _ => None,
        }
    }
}

enum Walk<N> {
    Arrived(Target<N>),
    /// Indirection crossed at `node`; the first `consumed` steps are used up
    Crossed { node: N, consumed: usize },
}

/// Resolve `cfi` against `tree`
pub fn resolve<T: StructuralTree>(tree: &T, cfi: &Cfi) -> Result<Resolution<T::Node>> {
    Resolver { tree }.resolve(cfi)
}

/// Resolve a bare path against `tree`, e.g. the remainder after an indirection
pub fn resolve_path<T: StructuralTree>(
    tree: &T,
    path: &CfiPath,
) -> Result<ResolvedLocation<T::Node>> {
    let resolver = Resolver { tree };
    resolver.resolve_from(Target::Element(tree.root()), path, 0)
}

struct Resolver<'t, T> {
    tree: &'t T,
}

impl<'t, T: StructuralTree> Resolver<'t, T> {
    fn resolve(&self, cfi: &Cfi) -> Result<Resolution<T::Node>> {
        let root = Target::Element(self.tree.root());

        let Some(ref range) = cfi.range else {
            return match self.walk(root, &cfi.path, 0)? {
                Walk::Arrived(target) => Ok(Resolution::Location(self.finish(
                    target,
                    &cfi.path,
                    cfi.path.steps.len(),
                )?)),
                Walk::Crossed { node, consumed } => {
                    debug!(consumed, "CFI crosses indirection, handing off remainder");
                    Ok(Resolution::Indirection {
                        node,
                        remainder: Cfi::new(cfi.path.suffix(consumed)),
                    })
                }
            };
        };

        let prefix_len = cfi.path.steps.len();
        match self.walk(root, &cfi.path, 0)? {
            Walk::Crossed { node, consumed } => {
                debug!(consumed, "CFI range prefix crosses indirection, handing off remainder");
                Ok(Resolution::Indirection {
                    node,
                    remainder: hoist_common_prefix(
                        cfi.path.suffix(consumed),
                        range.start.clone(),
                        range.end.clone(),
                    ),
                })
            }
            Walk::Arrived(shared) => {
                let start = self.resolve_from(shared.clone(), &range.start, prefix_len)?;
                let end = self.resolve_from(shared.clone(), &range.end, prefix_len)?;
                Ok(Resolution::Range(ResolvedRange { shared, start, end }))
            }
        }
    }

    /// Walk `path` from `from` and validate its terminus
    fn resolve_from(
        &self,
        from: Target<T::Node>,
        path: &CfiPath,
        base: usize,
    ) -> Result<ResolvedLocation<T::Node>> {
        match self.walk(from, path, base)? {
            Walk::Arrived(target) => self.finish(target, path, base + path.steps.len()),
            Walk::Crossed { node, consumed } => Ok(ResolvedLocation {
                target: Target::Element(node),
                remaining: Some(path.suffix(consumed)),
                offset: None,
                side_bias: None,
            }),
        }
    }

    fn walk(&self, from: Target<T::Node>, path: &CfiPath, base: usize) -> Result<Walk<T::Node>> {
        let mut current = from;

        for (i, step) in path.steps.iter().enumerate() {
            let ordinal = base + i + 1;
            let parent = match current {
                Target::Element(node) => node,
                Target::Text { .. } => {
                    return Err(CfiError::NodeNotFound {
                        step: ordinal,
                        rendered: step.to_string(),
                        available: 0,
                    })
                }
            };

            let next = self.child(&parent, step, ordinal)?;
            trace!(step = ordinal, index = step.index, "CFI step resolved");

            if step.indirection {
                if i + 1 == path.steps.len() {
                    return Err(CfiError::TerminalIndirection { step: ordinal });
                }
                return match next {
                    Target::Element(node) => Ok(Walk::Crossed {
                        node,
                        consumed: i + 1,
                    }),
                    Target::Text { .. } => Err(CfiError::NodeNotFound {
                        step: ordinal,
                        rendered: step.to_string(),
                        available: 0,
                    }),
                };
            }
            current = next;
        }

        Ok(Walk::Arrived(current))
    }

    /// Locate the child of `parent` addressed by `step`
    fn child(&self, parent: &T::Node, step: &CfiStep, ordinal: usize) -> Result<Target<T::Node>> {
        let wanted = step.index as usize;
        let mut elements = 0usize;
        let mut run = Vec::new();

        for i in 0..self.tree.child_count(parent) {
            let Some(child) = self.tree.child_at(parent, i) else {
                break;
            };
            match self.tree.node_kind(&child) {
                NodeKind::Element => {
                    // The run for the wanted odd index ends at this element
                    if wanted == 2 * elements + 1 {
                        break;
                    }
                    elements += 1;
                    if wanted == 2 * elements {
                        self.check_id(&child, step, ordinal)?;
                        return Ok(Target::Element(child));
                    }
                }
                NodeKind::Text => {
                    if wanted == 2 * elements + 1 {
                        run.push(child);
                    }
                }
            }
        }

        if !run.is_empty() {
            if let Some(ref expected) = step.id_assertion {
                return Err(CfiError::AssertionMismatch {
                    step: ordinal,
                    expected: expected.clone(),
                    found: None,
                });
            }
            return Ok(Target::Text {
                parent: parent.clone(),
                nodes: run,
            });
        }

        Err(CfiError::NodeNotFound {
            step: ordinal,
            rendered: step.to_string(),
            available: self.highest_index(parent),
        })
    }

    fn highest_index(&self, parent: &T::Node) -> usize {
        let elements = (0..self.tree.child_count(parent))
            .filter_map(|i| self.tree.child_at(parent, i))
            .filter(|child| self.tree.node_kind(child) == NodeKind::Element)
            .count();
        2 * elements + 1
    }

    fn check_id(&self, node: &T::Node, step: &CfiStep, ordinal: usize) -> Result<()> {
        let Some(ref expected) = step.id_assertion else {
            return Ok(());
        };
        match self.tree.id_of_node(node) {
            Some(found) if found == expected => Ok(()),
            found => Err(CfiError::AssertionMismatch {
                step: ordinal,
                expected: expected.clone(),
                found: found.map(str::to_string),
            }),
        }
    }

    /// Validate the terminal offset against the target's text length
    fn finish(
        &self,
        target: Target<T::Node>,
        path: &CfiPath,
        last_step: usize,
    ) -> Result<ResolvedLocation<T::Node>> {
        let offset = path.character_offset.as_ref().map(|o| o.offset);

        if let Some(offset) = offset {
            let length = match target {
                Target::Element(ref node) => self.tree.text_length(node),
                Target::Text { ref nodes, .. } => {
                    nodes.iter().map(|n| self.tree.text_length(n)).sum()
                }
            };
            if offset as usize > length {
                return Err(CfiError::OffsetOutOfRange {
                    step: last_step,
                    offset,
                    length,
                });
            }
        }

        Ok(ResolvedLocation {
            target,
            remaining: None,
            offset,
            side_bias: path.side_bias(),
        })
    }
}

/// Build the remainder of a range whose prefix ran out at an indirection.
///
/// Leading steps shared by both sub-paths move into the new prefix so the
/// remainder is itself a well-formed range wherever possible.
fn hoist_common_prefix(mut prefix: CfiPath, mut start: CfiPath, mut end: CfiPath) -> Cfi {
    let shared = start
        .steps
        .iter()
        .zip(end.steps.iter())
        .take_while(|(a, b)| a == b && !a.indirection)
        .count();
    // Keep at least one step in each sub-path
    let shared = shared
        .min(start.steps.len().saturating_sub(1))
        .min(end.steps.len().saturating_sub(1));

    prefix.steps.extend(start.steps.drain(..shared));
    end.steps.drain(..shared);

    Cfi {
        path: prefix,
        range: Some(CfiRange { start, end }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::parse;

    /// Minimal in-memory tree for resolver tests
    #[derive(Debug)]
    struct TestNode {
        kind: NodeKind,
        id: Option<&'static str>,
        text: &'static str,
        children: Vec<usize>,
    }

    struct TestTree {
        nodes: Vec<TestNode>,
    }

    impl TestTree {
        fn new() -> Self {
            Self {
                nodes: vec![TestNode {
                    kind: NodeKind::Element,
                    id: None,
                    text: "",
                    children: Vec::new(),
                }],
            }
        }

        fn add(&mut self, parent: usize, kind: NodeKind, id: Option<&'static str>, text: &'static str) -> usize {
            self.nodes.push(TestNode {
                kind,
                id,
                text,
                children: Vec::new(),
            });
            let idx = self.nodes.len() - 1;
            self.nodes[parent].children.push(idx);
            idx
        }

        fn element(&mut self, parent: usize, id: Option<&'static str>) -> usize {
            self.add(parent, NodeKind::Element, id, "")
        }

        fn text(&mut self, parent: usize, text: &'static str) -> usize {
            self.add(parent, NodeKind::Text, None, text)
        }
    }

    impl StructuralTree for TestTree {
        type Node = usize;

        fn root(&self) -> usize {
            0
        }

        fn child_count(&self, node: &usize) -> usize {
            self.nodes[*node].children.len()
        }

        fn child_at(&self, node: &usize, index: usize) -> Option<usize> {
            self.nodes[*node].children.get(index).copied()
        }

        fn node_kind(&self, node: &usize) -> NodeKind {
            self.nodes[*node].kind
        }

        fn id_of_node(&self, node: &usize) -> Option<&str> {
            self.nodes[*node].id
        }

        fn text_length(&self, node: &usize) -> usize {
            let n = &self.nodes[*node];
            match n.kind {
                NodeKind::Text => n.text.chars().count(),
                NodeKind::Element => n.children.iter().map(|c| self.text_length(c)).sum(),
            }
        }
    }

    /// Content document shaped like `<html><head/><body id="body01">…</body></html>`
    /// where the fifth element of body is `para05` holding
    /// "Intro" <em/> "xxxxxxxxxx more text".
    fn content_tree() -> (TestTree, usize) {
        let mut tree = TestTree::new();
        let root = 0;
        tree.element(root, None); // head, /2
        let body = tree.element(root, Some("body01")); // /4
        for _ in 0..4 {
            tree.text(body, "\n");
            tree.element(body, None);
        }
        let para = tree.element(body, Some("para05")); // /10
        tree.text(para, "Intro");
        tree.element(para, None);
        let text = tree.text(para, "xxxxxxxxxx more text");
        (tree, text)
    }

    #[test]
    fn test_resolve_text_offset() {
        let (tree, text) = content_tree();
        let cfi = parse("epubcfi(/4[body01]/10[para05]/3:10)").unwrap();

        let Resolution::Location(location) = resolve(&tree, &cfi).unwrap() else {
            panic!("expected location");
        };
        assert_eq!(location.offset, Some(10));
        assert_eq!(*location.target.node(), text);
        assert!(location.remaining.is_none());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let (tree, _) = content_tree();
        let cfi = parse("epubcfi(/4[body01]/10[para05]/1:2)").unwrap();
        assert_eq!(resolve(&tree, &cfi).unwrap(), resolve(&tree, &cfi).unwrap());
    }

    #[test]
    fn test_node_not_found_identifies_step() {
        let mut tree = TestTree::new();
        tree.element(0, None);
        let body = tree.element(0, None);
        tree.element(body, None);

        // No text before the first element of body
        let cfi = parse("epubcfi(/4/1)").unwrap();
        let err = resolve(&tree, &cfi).unwrap_err();
        assert_eq!(
            err,
            CfiError::NodeNotFound {
                step: 2,
                rendered: "/1".to_string(),
                available: 3,
            }
        );
    }

    #[test]
    fn test_even_index_out_of_range() {
        let (tree, _) = content_tree();
        let err = resolve(&tree, &parse("epubcfi(/8)").unwrap()).unwrap_err();
        assert!(matches!(err, CfiError::NodeNotFound { step: 1, available: 5, .. }));
    }

    #[test]
    fn test_assertion_mismatch() {
        let (tree, _) = content_tree();
        let err = resolve(&tree, &parse("epubcfi(/4[body02]/10)").unwrap()).unwrap_err();
        assert_eq!(
            err,
            CfiError::AssertionMismatch {
                step: 1,
                expected: "body02".to_string(),
                found: Some("body01".to_string()),
            }
        );
    }

    #[test]
    fn test_offset_out_of_range() {
        let (tree, _) = content_tree();
        let err = resolve(&tree, &parse("epubcfi(/4/10/1:6)").unwrap()).unwrap_err();
        assert_eq!(
            err,
            CfiError::OffsetOutOfRange {
                step: 3,
                offset: 6,
                length: 5,
            }
        );
    }

    #[test]
    fn test_indirection_hands_off_remainder() {
        let mut tree = TestTree::new();
        tree.element(0, None);
        tree.element(0, None);
        let spine = tree.element(0, None);
        tree.element(spine, None);
        let itemref = tree.element(spine, Some("chap01ref"));

        let cfi = parse("epubcfi(/6/4[chap01ref]!/4[body01]/10[para05]/3:10)").unwrap();
        let resolution = resolve(&tree, &cfi).unwrap();

        let Resolution::Indirection { node, remainder } = resolution else {
            panic!("expected indirection");
        };
        assert_eq!(node, itemref);
        assert_eq!(remainder.to_string(), "epubcfi(/4[body01]/10[para05]/3:10)");

        // The remainder resolves against the content document
        let (content, _) = content_tree();
        let location = resolve_path(&content, &remainder.path).unwrap();
        assert_eq!(location.offset, Some(10));
    }

    #[test]
    fn test_range_resolves_both_ends() {
        let mut tree = TestTree::new();
        tree.element(0, None);
        let body = tree.element(0, None);
        let div = tree.element(body, None);
        let first = tree.text(div, "alpha");
        tree.element(div, None);
        let second = tree.text(div, "beta");

        let cfi = parse("epubcfi(/4,/2/1:1,/2/3:4)").unwrap();
        let Resolution::Range(range) = resolve(&tree, &cfi).unwrap() else {
            panic!("expected range");
        };
        assert_eq!(range.shared, Target::Element(body));
        assert_eq!(*range.start.target.node(), first);
        assert_eq!(range.start.offset, Some(1));
        assert_eq!(*range.end.target.node(), second);
        assert_eq!(range.end.offset, Some(4));
    }

    #[test]
    fn test_range_prefix_indirection_hoists_shared_steps() {
        let mut tree = TestTree::new();
        tree.element(0, None);
        tree.element(0, None);

        let cfi = parse("epubcfi(/4!/2,/4/2/1,/4/6)").unwrap();
        let resolution = resolve(&tree, &cfi).unwrap();
        assert_eq!(
            resolution.remainder().unwrap().to_string(),
            "epubcfi(/2/4,/2/1,/6)"
        );
    }

    #[test]
    fn test_remainders_parse_back() {
        let mut tree = TestTree::new();
        tree.element(0, None);
        tree.element(0, None);
        tree.element(0, Some("chap03ref"));

        for input in [
            "epubcfi(/4!/4/2/1:3)",
            "epubcfi(/4!/4[body01]/10[para05]/3:10[yyy,012;s=a])",
            "epubcfi(/6[chap03ref]!/4~12.5)",
            "epubcfi(/6!/4@50.5:25)",
            "epubcfi(/2!/4/2!/6)",
            "epubcfi(/4!/4,/2/1,/2/3)",
            "epubcfi(/4!/2,/1:0,/3:1)",
            "epubcfi(/4!/2,,/4)",
            "epubcfi(/4!/4,/2/4/1:2,/2/4/3:0)",
        ] {
            let cfi = parse(input).unwrap();
            let resolution = resolve(&tree, &cfi).unwrap();
            let remainder = resolution.remainder().unwrap();
            assert!(!remainder.path.steps.is_empty(), "{input}");
            assert_eq!(parse(&remainder.to_string()).as_ref(), Ok(remainder), "{input}");
        }
    }

    #[test]
    fn test_built_terminal_indirection_is_rejected() {
        let mut tree = TestTree::new();
        tree.element(0, None);
        tree.element(0, None);

        let mut path = CfiPath::with_steps(vec![CfiStep::element(4).indirected()]);
        path.set_character_offset(10);
        assert_eq!(
            resolve(&tree, &Cfi::new(path.clone())).unwrap_err(),
            CfiError::TerminalIndirection { step: 1 }
        );

        path.character_offset = None;
        let range = Cfi {
            path,
            range: Some(CfiRange {
                start: parse("epubcfi(/2)").unwrap().path,
                end: parse("epubcfi(/4)").unwrap().path,
            }),
        };
        assert_eq!(
            resolve(&tree, &range).unwrap_err(),
            CfiError::TerminalIndirection { step: 1 }
        );
    }

    #[test]
    fn test_text_run_spans_adjacent_nodes() {
        let mut tree = TestTree::new();
        tree.text(0, "abc");
        tree.text(0, "def");
        tree.element(0, None);

        let location = resolve_path(&tree, &parse("epubcfi(/1:6)").unwrap().path).unwrap();
        let Target::Text { nodes, .. } = location.target else {
            panic!("expected text run");
        };
        assert_eq!(nodes.len(), 2);
    }
}
