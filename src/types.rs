//! Type-safe wrappers for heap graph elements.
//!
//! Nodes and hyperedges are addressed by opaque ids that are only meaningful
//! inside the [`HeapConfiguration`][crate::heap::HeapConfiguration] that issued them.
//! Node types and selector labels are plain names compared by value.

use std::borrow::Borrow;
use std::fmt;

/// A node identifier inside one heap configuration.
///
/// Ids are never reused within a configuration: removing a node leaves a gap,
/// and the builder keeps allocating from the highest id seen so far.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a node id from its raw index.
    pub fn new(index: u32) -> Self {
        NodeId(index)
    }

    /// Returns the raw index.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<NodeId> for u32 {
    fn from(node: NodeId) -> Self {
        node.0
    }
}

/// A nonterminal hyperedge identifier inside one heap configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EdgeId(u32);

impl EdgeId {
    /// Creates an edge id from its raw index.
    pub fn new(index: u32) -> Self {
        EdgeId(index)
    }

    /// Returns the raw index.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// The semantic type of a heap node.
///
/// # Invariants
///
/// - The null type is the only constant type; nodes of a constant type carry no selectors.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeType(String);

impl NodeType {
    /// Name of the type of the null node.
    pub const NULL: &'static str = "NULL";

    pub fn new(name: impl Into<String>) -> Self {
        NodeType(name.into())
    }

    /// The type of the null node.
    pub fn null() -> Self {
        NodeType(Self::NULL.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns `true` for types whose single instance models a program constant.
    pub fn is_constant(&self) -> bool {
        self.0 == Self::NULL
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Qualified names are shown by their last component only.
        let short = self.0.rsplit('.').next().unwrap_or(&self.0);
        write!(f, "{}", short)
    }
}

impl From<&str> for NodeType {
    fn from(name: &str) -> Self {
        NodeType::new(name)
    }
}

/// The label of a selector (pointer field) edge.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SelectorLabel(String);

impl SelectorLabel {
    pub fn new(label: impl Into<String>) -> Self {
        SelectorLabel(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.0 == label
    }
}

impl fmt::Display for SelectorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SelectorLabel {
    fn from(label: &str) -> Self {
        SelectorLabel::new(label)
    }
}

/// Lets selector maps be queried by `&str`.
impl Borrow<str> for SelectorLabel {
    fn borrow(&self) -> &str {
        self.label()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use test_log::test;

    use super::*;

    #[test]
    fn test_node_id_display() {
        let n = NodeId::new(3);
        assert_eq!(n.index(), 3);
        assert_eq!(format!("{}", n), "n3");
        assert_eq!(u32::from(n), 3);
    }

    #[test]
    fn test_edge_id_ordering() {
        assert!(EdgeId::new(1) < EdgeId::new(2));
        assert_eq!(format!("{}", EdgeId::new(7)), "e7");
    }

    #[test]
    fn test_null_type_is_constant() {
        assert!(NodeType::null().is_constant());
        assert!(!NodeType::new("List").is_constant());
    }

    #[test]
    fn test_node_type_display_strips_package() {
        let ty = NodeType::new("de.example.List");
        assert_eq!(format!("{}", ty), "List");
        assert_eq!(ty.name(), "de.example.List");
    }

    #[test]
    fn test_selector_label() {
        let sel = SelectorLabel::from("next");
        assert!(sel.has_label("next"));
        assert!(!sel.has_label("prev"));
        assert_eq!(sel.to_string(), "next");
    }

    #[test]
    fn test_selector_map_lookup_by_str() {
        let mut targets = BTreeMap::new();
        targets.insert(SelectorLabel::from("next"), NodeId::new(1));
        assert_eq!(targets.get("next"), Some(&NodeId::new(1)));
        assert_eq!(targets.get("prev"), None);
    }
}
