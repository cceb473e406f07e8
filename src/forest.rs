//! The parse forest module: the self-contained result artifact of a parse.
//!
//! A [`ParseForest`] owns a copy of the input text, a compact node table and a
//! rule table, so it stays valid after the engine and the parse graph are
//! gone. Identical sub-derivations are shared; ambiguous derivations of one
//! span are packed as alternative child lists under a single node.
//!
//! The bracketed rendering used for debugging and tests writes a branch as
//! `tag { child child }`, a leaf as `'matched text'`, an empty derivation as
//! `tag { §empty }` and a packed ambiguous node as `tag {* { ... } { ... } *}`.
use std::fmt::Write;

/// A rule as recorded in a forest: its tag and whether it is skip content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ForestRule {
    tag: Box<str>,
    is_skip: bool,
}

impl ForestRule {
    pub(crate) fn new(tag: &str, is_skip: bool) -> Self {
        Self {
            tag: tag.into(),
            is_skip,
        }
    }
}

/// One node of a forest. Children reference other nodes by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ForestNode {
    rule: u32,
    start: u32,
    length: u32,
    is_leaf: bool,
    alternatives: Vec<Vec<u32>>,
}

impl ForestNode {
    pub(crate) fn new(
        rule: u32,
        start: u32,
        length: u32,
        is_leaf: bool,
        alternatives: Vec<Vec<u32>>,
    ) -> Self {
        Self {
            rule,
            start,
            length,
            is_leaf,
            alternatives,
        }
    }
}

/// A shared packed parse forest over one input text.
///
/// Structural equality compares the root span, the node and rule tables and
/// the packed alternative sets, so parsing the same input twice yields equal
/// forests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseForest {
    text: Box<str>,
    rules: Vec<ForestRule>,
    nodes: Vec<ForestNode>,
    root: u32,
}

impl ParseForest {
    pub(crate) fn from_parts(
        text: &str,
        rules: Vec<ForestRule>,
        nodes: Vec<ForestNode>,
        root: u32,
    ) -> Self {
        Self {
            text: text.into(),
            rules,
            nodes,
            root,
        }
    }

    /// The input text the forest was parsed from.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The root node of the forest.
    #[inline]
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            forest: self,
            index: self.root,
        }
    }

    /// The number of nodes in the forest.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Render the forest as a flat bracketed string for debugging and tests.
    pub fn to_bracketed_string(&self) -> String {
        let mut out = String::new();
        self.write_bracketed(self.root, &mut out);
        out
    }

    fn write_bracketed(&self, index: u32, out: &mut String) {
        let node = &self.nodes[index as usize];
        if node.is_leaf {
            if node.length == 0 {
                out.push_str("\u{a7}empty");
            } else {
                let start = node.start as usize;
                let end = start + node.length as usize;
                write!(out, "'{}'", &self.text[start..end]).unwrap();
            }
            return;
        }
        let tag = &self.rules[node.rule as usize].tag;
        if node.alternatives.len() == 1 {
            let children = &node.alternatives[0];
            if children.is_empty() {
                write!(out, "{} {{ \u{a7}empty }}", tag).unwrap();
                return;
            }
            write!(out, "{} {{", tag).unwrap();
            for &child in children.iter() {
                out.push(' ');
                self.write_bracketed(child, out);
            }
            out.push_str(" }");
        } else {
            write!(out, "{} {{*", tag).unwrap();
            for alternative in node.alternatives.iter() {
                out.push_str(" {");
                for &child in alternative.iter() {
                    out.push(' ');
                    self.write_bracketed(child, out);
                }
                out.push_str(" }");
            }
            out.push_str(" *}");
        }
    }
}

/// A reference to one node of a [`ParseForest`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    forest: &'a ParseForest,
    index: u32,
}

impl<'a> NodeRef<'a> {
    #[inline]
    fn node(&self) -> &'a ForestNode {
        &self.forest.nodes[self.index as usize]
    }

    /// The tag of the rule this node matched.
    #[inline]
    pub fn tag(&self) -> &'a str {
        &self.forest.rules[self.node().rule as usize].tag
    }

    /// The 0-based byte offset the match starts at.
    #[inline]
    pub fn start(&self) -> usize {
        self.node().start as usize
    }

    /// The number of bytes matched.
    #[inline]
    pub fn length(&self) -> usize {
        self.node().length as usize
    }

    /// The exclusive end offset of the match.
    #[inline]
    pub fn end(&self) -> usize {
        self.start() + self.length()
    }

    /// The matched text span.
    #[inline]
    pub fn matched_text(&self) -> &'a str {
        &self.forest.text[self.start()..self.end()]
    }

    /// Whether the node is a matched terminal occurrence.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.node().is_leaf
    }

    /// Whether the node belongs to a skip rule.
    #[inline]
    pub fn is_skip(&self) -> bool {
        self.forest.rules[self.node().rule as usize].is_skip
    }

    /// Whether more than one alternative derivation is packed under this node.
    #[inline]
    pub fn is_ambiguous(&self) -> bool {
        self.node().alternatives.len() > 1
    }

    /// The number of packed alternative child lists. Zero for leaves.
    #[inline]
    pub fn alternative_count(&self) -> usize {
        self.node().alternatives.len()
    }

    /// The children of the chosen (first) derivation, in left-to-right order.
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let forest = self.forest;
        self.node()
            .alternatives
            .first()
            .map(|alternative| alternative.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&index| NodeRef { forest, index })
    }

    /// The children of the `alternative`-th packed derivation.
    ///
    /// # Panics
    ///
    /// Panics if the alternative index is out of bounds.
    pub fn alternative(&self, alternative: usize) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let forest = self.forest;
        self.node().alternatives[alternative]
            .iter()
            .map(move |&index| NodeRef { forest, index })
    }
}
