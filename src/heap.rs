//! Heap configurations: the hypergraphs that represent (abstract) heaps.
//!
//! A [`HeapConfiguration`] is logically immutable. Every change goes through a
//! [`HeapBuilder`], obtained with [`HeapConfiguration::builder`], which works on a
//! private copy and yields a new configuration on [`HeapBuilder::build`]. This is
//! what lets canonicalization branches keep working on the same input graph.
//!
//! # Structure
//!
//! - **Nodes** with a [`NodeType`].
//! - **External nodes**: an ordered subsequence of nodes (the interface of a rule right-hand side).
//! - **Selector edges**: at most one target per `(source, label)`.
//! - **Nonterminal hyperedges**: a [`Nonterminal`] label attached to an ordered tentacle list of length `rank`.
//! - **Variables**: name to node bindings.
//!
//! Broken invariants (unknown ids, duplicate selectors, rank mismatches) are
//! programming errors and panic with the offending configuration in the message.

use std::collections::BTreeMap;
use std::fmt;

use log::trace;

use crate::embedding::Matching;
use crate::nonterminal::Nonterminal;
use crate::stack::IndexSymbol;
use crate::types::{EdgeId, NodeId, NodeType, SelectorLabel};

#[derive(Debug, Clone, Eq, PartialEq)]
struct NodeData {
    ty: NodeType,
    selectors: BTreeMap<SelectorLabel, NodeId>,
}

/// A nonterminal hyperedge: label plus ordered tentacles.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Hyperedge {
    label: Nonterminal,
    tentacles: Vec<NodeId>,
}

impl Hyperedge {
    pub fn label(&self) -> &Nonterminal {
        &self.label
    }

    pub fn tentacles(&self) -> &[NodeId] {
        &self.tentacles
    }
}

impl fmt::Display for Hyperedge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.label)?;
        for (i, node) in self.tentacles.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", node)?;
        }
        write!(f, ")")
    }
}

/// A labeled hypergraph modelling a heap.
#[derive(Debug, Clone, Default)]
pub struct HeapConfiguration {
    nodes: BTreeMap<NodeId, NodeData>,
    externals: Vec<NodeId>,
    edges: BTreeMap<EdgeId, Hyperedge>,
    variables: BTreeMap<String, NodeId>,
    next_node: u32,
    next_edge: u32,
}

impl HeapConfiguration {
    /// Creates an empty heap configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a builder working on a copy of this configuration.
    pub fn builder(&self) -> HeapBuilder {
        HeapBuilder { heap: self.clone() }
    }

    /// Returns a builder that takes over this configuration.
    pub fn into_builder(self) -> HeapBuilder {
        HeapBuilder { heap: self }
    }

    fn node_data(&self, node: NodeId) -> &NodeData {
        self.nodes
            .get(&node)
            .unwrap_or_else(|| panic!("Node {} does not exist in {}", node, self))
    }

    fn hyperedge_data(&self, edge: EdgeId) -> &Hyperedge {
        self.edges
            .get(&edge)
            .unwrap_or_else(|| panic!("Hyperedge {} does not exist in {}", edge, self))
    }

    // Nodes

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_type(&self, node: NodeId) -> &NodeType {
        &self.node_data(node).ty
    }

    // Selectors

    /// Iterates over the outgoing selector edges of `node`, ordered by label.
    pub fn selectors_of(&self, node: NodeId) -> impl Iterator<Item = (&SelectorLabel, NodeId)> + '_ {
        self.node_data(node).selectors.iter().map(|(label, &target)| (label, target))
    }

    pub fn selector_target(&self, node: NodeId, label: &str) -> Option<NodeId> {
        self.node_data(node).selectors.get(label).copied()
    }

    pub fn has_selector(&self, node: NodeId, label: &str) -> bool {
        self.selector_target(node, label).is_some()
    }

    /// Number of outgoing selector edges of `node`.
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.node_data(node).selectors.len()
    }

    /// Total number of selector edges.
    pub fn selector_count(&self) -> usize {
        self.nodes.values().map(|data| data.selectors.len()).sum()
    }

    /// Returns all `(source, label)` pairs of selector edges pointing to `node`.
    pub fn predecessors_of(&self, node: NodeId) -> Vec<(NodeId, SelectorLabel)> {
        let mut result = Vec::new();
        for (&source, data) in &self.nodes {
            for (label, &target) in &data.selectors {
                if target == node {
                    result.push((source, label.clone()));
                }
            }
        }
        result
    }

    // External nodes

    pub fn externals(&self) -> &[NodeId] {
        &self.externals
    }

    pub fn external_count(&self) -> usize {
        self.externals.len()
    }

    /// # Panics
    ///
    /// Panics if `position` is out of range.
    pub fn external_at(&self, position: usize) -> NodeId {
        *self
            .externals
            .get(position)
            .unwrap_or_else(|| panic!("No external node at position {} in {}", position, self))
    }

    pub fn external_position(&self, node: NodeId) -> Option<usize> {
        self.externals.iter().position(|&n| n == node)
    }

    pub fn is_external(&self, node: NodeId) -> bool {
        self.externals.contains(&node)
    }

    // Hyperedges

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterates over all nonterminal hyperedges in id order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.keys().copied()
    }

    pub fn contains_edge(&self, edge: EdgeId) -> bool {
        self.edges.contains_key(&edge)
    }

    pub fn hyperedge(&self, edge: EdgeId) -> &Hyperedge {
        self.hyperedge_data(edge)
    }

    pub fn label_of(&self, edge: EdgeId) -> &Nonterminal {
        &self.hyperedge_data(edge).label
    }

    pub fn tentacles_of(&self, edge: EdgeId) -> &[NodeId] {
        &self.hyperedge_data(edge).tentacles
    }

    /// Hyperedges with at least one tentacle at `node`, in id order.
    pub fn attached_edges_of(&self, node: NodeId) -> Vec<EdgeId> {
        self.edges
            .iter()
            .filter(|(_, edge)| edge.tentacles.contains(&node))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Number of tentacles (over all hyperedges) attached to `node`.
    pub fn attachment_count(&self, node: NodeId) -> usize {
        self.edges
            .values()
            .map(|edge| edge.tentacles.iter().filter(|&&n| n == node).count())
            .sum()
    }

    // Variables

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.variables.iter().map(|(name, &node)| (name.as_str(), node))
    }

    pub fn variable_target(&self, name: &str) -> Option<NodeId> {
        self.variables.get(name).copied()
    }

    /// Names of the variables bound to `node`.
    pub fn variables_at(&self, node: NodeId) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|(_, &n)| n == node)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl fmt::Display for HeapConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{nodes: [")?;
        for (i, (node, data)) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", node, data.ty)?;
        }
        write!(f, "], externals: [")?;
        for (i, node) in self.externals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", node)?;
        }
        write!(f, "], selectors: [")?;
        let mut first = true;
        for (node, data) in &self.nodes {
            for (label, target) in &data.selectors {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(f, "{}-{}->{}", node, label, target)?;
            }
        }
        write!(f, "], hyperedges: [")?;
        for (i, (id, edge)) in self.edges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", id, edge)?;
        }
        write!(f, "], variables: [")?;
        for (i, (name, node)) in self.variables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}->{}", name, node)?;
        }
        write!(f, "]}}")
    }
}

/// Mutation interface of [`HeapConfiguration`].
///
/// Setters return `&mut Self` so that calls can be chained; operations that
/// create elements return their ids instead.
#[derive(Debug, Clone, Default)]
pub struct HeapBuilder {
    heap: HeapConfiguration,
}

impl HeapBuilder {
    /// Creates a builder for an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finishes building.
    pub fn build(self) -> HeapConfiguration {
        self.heap
    }

    /// Read access to the configuration under construction.
    pub fn current(&self) -> &HeapConfiguration {
        &self.heap
    }

    fn node_mut(&mut self, node: NodeId) -> &mut NodeData {
        self.heap
            .nodes
            .get_mut(&node)
            .unwrap_or_else(|| panic!("Node {} does not exist", node))
    }

    fn check_node(&self, node: NodeId) {
        assert!(
            self.heap.contains_node(node),
            "Node {} does not exist in {}",
            node,
            self.heap
        );
    }

    // Nodes

    pub fn add_node(&mut self, ty: impl Into<NodeType>) -> NodeId {
        let id = NodeId::new(self.heap.next_node);
        self.heap.next_node += 1;
        self.heap.nodes.insert(
            id,
            NodeData {
                ty: ty.into(),
                selectors: BTreeMap::new(),
            },
        );
        id
    }

    pub fn add_nodes(&mut self, ty: impl Into<NodeType>, count: usize) -> Vec<NodeId> {
        let ty = ty.into();
        (0..count).map(|_| self.add_node(ty.clone())).collect()
    }

    /// Removes an isolated node.
    ///
    /// # Panics
    ///
    /// Panics if the node is external, bound by a variable, attached to a
    /// hyperedge, or an endpoint of a selector edge.
    pub fn remove_node(&mut self, node: NodeId) -> &mut Self {
        self.check_node(node);
        let isolated = !self.heap.is_external(node)
            && self.heap.out_degree(node) == 0
            && self.heap.predecessors_of(node).is_empty()
            && self.heap.attachment_count(node) == 0
            && self.heap.variables_at(node).is_empty();
        assert!(
            isolated,
            "Cannot remove node {} which is still connected in {}",
            node,
            self.heap
        );
        self.heap.nodes.remove(&node);
        self
    }

    // External nodes

    /// Appends `node` to the external sequence.
    ///
    /// # Panics
    ///
    /// Panics if the node is already external.
    pub fn set_external(&mut self, node: NodeId) -> &mut Self {
        self.check_node(node);
        assert!(
            !self.heap.is_external(node),
            "Node {} is already external in {}",
            node,
            self.heap
        );
        self.heap.externals.push(node);
        self
    }

    /// Removes `node` from the external sequence; later positions move up by one.
    pub fn unset_external(&mut self, node: NodeId) -> &mut Self {
        let position = self
            .heap
            .external_position(node)
            .unwrap_or_else(|| panic!("Node {} is not external in {}", node, self.heap));
        self.heap.externals.remove(position);
        self
    }

    // Selectors

    /// # Panics
    ///
    /// Panics if `from` already has a selector with this label.
    pub fn add_selector(&mut self, from: NodeId, label: impl Into<SelectorLabel>, to: NodeId) -> &mut Self {
        let label = label.into();
        self.check_node(to);
        if self.heap.has_selector(from, label.label()) {
            panic!(
                "Node {} already has a selector '{}' in {}",
                from, label, self.heap
            );
        }
        self.node_mut(from).selectors.insert(label, to);
        self
    }

    /// # Panics
    ///
    /// Panics if `from` has no selector with this label.
    pub fn remove_selector(&mut self, from: NodeId, label: &str) -> &mut Self {
        if self.node_mut(from).selectors.remove(label).is_none() {
            panic!("Node {} has no selector '{}' in {}", from, label, self.heap);
        }
        self
    }

    /// Redirects an existing selector edge to `to`.
    pub fn replace_selector(&mut self, from: NodeId, label: &str, to: NodeId) -> &mut Self {
        self.check_node(to);
        let Some(target) = self.node_mut(from).selectors.get_mut(label) else {
            panic!("Node {} has no selector '{}' in {}", from, label, self.heap);
        };
        *target = to;
        self
    }

    // Hyperedges

    fn check_rank(&self, label: &Nonterminal, tentacles: &[NodeId]) {
        assert_eq!(
            tentacles.len(),
            label.rank(),
            "Nonterminal {} of rank {} attached to {} tentacles in {}",
            label,
            label.rank(),
            tentacles.len(),
            self.heap
        );
        for edge in self.heap.edges.values() {
            if edge.label.label() == label.label() {
                assert_eq!(
                    edge.label.rank(),
                    label.rank(),
                    "Nonterminal {} used with ranks {} and {} in {}",
                    label,
                    edge.label.rank(),
                    label.rank(),
                    self.heap
                );
            }
        }
    }

    /// Adds a hyperedge labeled `label` with the given tentacles.
    ///
    /// # Panics
    ///
    /// Panics if the tentacle count differs from the rank of `label`, or if
    /// another hyperedge uses the same label with a different rank.
    pub fn add_nonterminal_edge(&mut self, label: Nonterminal, tentacles: Vec<NodeId>) -> EdgeId {
        for &node in &tentacles {
            self.check_node(node);
        }
        self.check_rank(&label, &tentacles);
        let id = EdgeId::new(self.heap.next_edge);
        self.heap.next_edge += 1;
        self.heap.edges.insert(id, Hyperedge { label, tentacles });
        id
    }

    pub fn remove_nonterminal_edge(&mut self, edge: EdgeId) -> Hyperedge {
        self.heap
            .edges
            .remove(&edge)
            .unwrap_or_else(|| panic!("Hyperedge {} does not exist in {}", edge, self.heap))
    }

    /// Relabels a hyperedge, keeping its id and tentacles.
    ///
    /// # Panics
    ///
    /// Panics if the new label has a different rank.
    pub fn replace_nonterminal(&mut self, edge: EdgeId, label: Nonterminal) -> &mut Self {
        let Some(data) = self.heap.edges.get_mut(&edge) else {
            panic!("Hyperedge {} does not exist in {}", edge, self.heap);
        };
        assert_eq!(
            data.label.rank(),
            label.rank(),
            "Cannot replace {} by {} of different rank on hyperedge {}",
            data.label,
            label,
            edge
        );
        data.label = label;
        self
    }

    // Variables

    /// Binds `name` to `node`, replacing a previous binding.
    pub fn add_variable(&mut self, name: impl Into<String>, node: NodeId) -> &mut Self {
        self.check_node(node);
        self.heap.variables.insert(name.into(), node);
        self
    }

    pub fn remove_variable(&mut self, name: &str) -> &mut Self {
        if self.heap.variables.remove(name).is_none() {
            panic!("Variable '{}' does not exist in {}", name, self.heap);
        }
        self
    }

    // Rewriting

    /// Replaces hyperedge `edge` by a copy of `replacement`.
    ///
    /// The `i`-th external node of `replacement` is glued to the `i`-th tentacle;
    /// all other nodes are added fresh. Returns the images of the replacement's nodes.
    ///
    /// # Panics
    ///
    /// Panics if the external count of `replacement` differs from the tentacle count.
    pub fn replace_nonterminal_edge(
        &mut self,
        edge: EdgeId,
        replacement: &HeapConfiguration,
    ) -> BTreeMap<NodeId, NodeId> {
        let removed = self.remove_nonterminal_edge(edge);
        assert_eq!(
            removed.tentacles.len(),
            replacement.external_count(),
            "Cannot replace {} by a graph with {} external nodes: {}",
            removed,
            replacement.external_count(),
            replacement
        );
        trace!("replace {} by {}", removed, replacement);

        let mut images = BTreeMap::new();
        for node in replacement.nodes() {
            let image = match replacement.external_position(node) {
                Some(position) => removed.tentacles[position],
                None => self.add_node(replacement.node_type(node).clone()),
            };
            images.insert(node, image);
        }
        for node in replacement.nodes() {
            for (label, target) in replacement.selectors_of(node) {
                self.add_selector(images[&node], label.clone(), images[&target]);
            }
        }
        for e in replacement.edges() {
            let tentacles = replacement.tentacles_of(e).iter().map(|n| images[n]).collect();
            self.add_nonterminal_edge(replacement.label_of(e).clone(), tentacles);
        }
        for (name, node) in replacement.variables() {
            self.add_variable(name, images[&node]);
        }
        images
    }

    fn remove_matched_elements(&mut self, pattern: &HeapConfiguration, matching: &Matching) {
        for node in pattern.nodes() {
            for (label, _) in pattern.selectors_of(node) {
                self.remove_selector(matching.node(node), label.label());
            }
        }
        for edge in pattern.edges() {
            self.remove_nonterminal_edge(matching.edge(edge));
        }
        for node in pattern.nodes() {
            if !pattern.is_external(node) {
                self.remove_node(matching.node(node));
            }
        }
    }

    /// Replaces an embedding of `pattern` by a single hyperedge labeled `label`.
    ///
    /// Matched selectors and hyperedges are removed, images of non-external
    /// pattern nodes are deleted, and the new hyperedge is attached to the
    /// images of the pattern's external nodes in order.
    ///
    /// # Panics
    ///
    /// Panics if the pattern's external count differs from the rank of `label`.
    pub fn replace_matching(&mut self, pattern: &HeapConfiguration, matching: &Matching, label: Nonterminal) -> EdgeId {
        assert_eq!(
            pattern.external_count(),
            label.rank(),
            "Pattern with {} external nodes cannot be replaced by {} of rank {}: {}",
            pattern.external_count(),
            label,
            label.rank(),
            pattern
        );
        self.remove_matched_elements(pattern, matching);
        let tentacles = pattern.externals().iter().map(|&n| matching.node(n)).collect();
        self.add_nonterminal_edge(label, tentacles)
    }

    /// Like [`replace_matching`][Self::replace_matching] for a collapsed pattern:
    /// tentacle `i` of the new hyperedge is the image of the pattern's external
    /// node at position `external_indices[i]`.
    pub fn replace_matching_with_collapsed_externals(
        &mut self,
        pattern: &HeapConfiguration,
        matching: &Matching,
        label: Nonterminal,
        external_indices: &[usize],
    ) -> EdgeId {
        assert_eq!(
            external_indices.len(),
            label.rank(),
            "External index map {:?} does not match the rank of {}",
            external_indices,
            label
        );
        self.remove_matched_elements(pattern, matching);
        let tentacles = external_indices
            .iter()
            .map(|&i| matching.node(pattern.external_at(i)))
            .collect();
        self.add_nonterminal_edge(label, tentacles)
    }

    /// Merges external nodes: the external at old position `i` is merged into
    /// new external position `external_indices[i]`.
    ///
    /// # Panics
    ///
    /// Panics if the map does not cover every new position `0..=max`, or if a
    /// merge would give one node two selectors with the same label.
    pub fn merge_externals(&mut self, external_indices: &[usize]) -> &mut Self {
        let originals = self.heap.externals.clone();
        assert_eq!(
            originals.len(),
            external_indices.len(),
            "External index map {:?} does not cover the external nodes of {}",
            external_indices,
            self.heap
        );
        let count = external_indices.iter().max().map_or(0, |&m| m + 1);
        let mut merged_externals = Vec::with_capacity(count);
        for new_position in 0..count {
            let mut merged: Option<NodeId> = None;
            for (old_position, &target) in external_indices.iter().enumerate() {
                if target != new_position {
                    continue;
                }
                let old = originals[old_position];
                match merged {
                    None => merged = Some(old),
                    Some(node) if node != old => self.merge_node_into(old, node),
                    Some(_) => {}
                }
            }
            match merged {
                Some(node) => merged_externals.push(node),
                None => panic!(
                    "Unable to merge external nodes: no position maps to {} in {:?}",
                    new_position, external_indices
                ),
            }
        }
        self.heap.externals = merged_externals;
        self
    }

    fn merge_node_into(&mut self, old: NodeId, target: NodeId) {
        let outgoing: Vec<(SelectorLabel, NodeId)> = self
            .heap
            .selectors_of(old)
            .map(|(label, to)| (label.clone(), to))
            .collect();
        for (label, to) in outgoing {
            self.remove_selector(old, label.label());
            self.add_selector(target, label, to);
        }
        for (source, label) in self.heap.predecessors_of(old) {
            self.replace_selector(source, label.label(), target);
        }
        for edge in self.heap.edges.values_mut() {
            for tentacle in edge.tentacles.iter_mut() {
                if *tentacle == old {
                    *tentacle = target;
                }
            }
        }
        for node in self.heap.variables.values_mut() {
            if *node == old {
                *node = target;
            }
        }
        self.heap.externals.retain(|&n| n != old);
        self.remove_node(old);
    }

    // Stacks

    /// Replaces the trailing `symbol` of every indexed hyperedge by `postfix`.
    ///
    /// # Panics
    ///
    /// Panics if `symbol` is not abstract.
    pub fn materialize_stacks(&mut self, symbol: &IndexSymbol, postfix: &[IndexSymbol]) -> &mut Self {
        assert!(
            symbol.is_abstract(),
            "Only abstract symbols can be materialized, got {}",
            symbol
        );
        if postfix.is_empty() {
            return self;
        }
        for edge in self.heap.edges.values_mut() {
            let materialized = match edge.label.stack() {
                Some(stack) if stack.ends_with(symbol) => edge.label.with_prolonged_stack(postfix),
                _ => continue,
            };
            edge.label = materialized;
        }
        self
    }

    /// Replaces the trailing variable of every indexed hyperedge by `instantiation`.
    pub fn instantiate_stacks(&mut self, instantiation: &[IndexSymbol]) -> &mut Self {
        if instantiation.is_empty() {
            return self;
        }
        for edge in self.heap.edges.values_mut() {
            let instantiated = match edge.label.stack() {
                Some(stack) if stack.ends_with_variable() => edge.label.with_prolonged_stack(instantiation),
                _ => continue,
            };
            edge.label = instantiated;
        }
        self
    }
}
