//! Embedding search: occurrences of a pattern graph inside a target graph.
//!
//! The search is a backtracking, VF2-style enumeration over an explicit stack of
//! frames, so [`Embeddings`] is a lazy iterator: each call to `next` resumes the
//! search where the previous match was found. Dropping the iterator abandons the
//! search; calling [`embeddings_of`] again restarts it from scratch.
//!
//! # Matching rules
//!
//! An embedding maps pattern nodes injectively to target nodes and pattern
//! hyperedges injectively to target hyperedges, such that
//!
//! - node types agree (an external pattern node may also be mapped onto the null node),
//! - every pattern selector `u -l-> v` has a target selector `m(u) -l-> m(v)`,
//! - every pattern hyperedge has a target hyperedge with the same label, whose
//!   tentacles are the images of the pattern tentacles in the same order,
//! - non-external pattern nodes are matched exactly: their images are neither
//!   external nor bound by a variable, and have no edges besides the matched ones.
//!
//! External pattern nodes may carry additional structure in the target.
//!
//! # Admissibility
//!
//! With a positive [`EmbeddingOptions::min_dereference_depth`], a pattern node
//! with outgoing selectors (whose selectors would disappear into a hyperedge)
//! must not be mapped to a node that a variable reaches in fewer selector hops
//! than the depth, nor to an external node of the target. Variables naming
//! constants such as `null` are ignored unless constants are admissible.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::heap::HeapConfiguration;
use crate::nonterminal::Nonterminal;
use crate::types::{EdgeId, NodeId, SelectorLabel};

/// An occurrence of a pattern inside a target graph.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Matching {
    nodes: BTreeMap<NodeId, NodeId>,
    edges: BTreeMap<EdgeId, EdgeId>,
}

impl Matching {
    pub fn new(nodes: BTreeMap<NodeId, NodeId>, edges: BTreeMap<EdgeId, EdgeId>) -> Self {
        Self { nodes, edges }
    }

    /// The image of pattern node `node`.
    ///
    /// # Panics
    ///
    /// Panics if the node is not part of the matching.
    pub fn node(&self, node: NodeId) -> NodeId {
        *self
            .nodes
            .get(&node)
            .unwrap_or_else(|| panic!("Pattern node {} is not matched", node))
    }

    /// The image of pattern hyperedge `edge`.
    ///
    /// # Panics
    ///
    /// Panics if the hyperedge is not part of the matching.
    pub fn edge(&self, edge: EdgeId) -> EdgeId {
        *self
            .edges
            .get(&edge)
            .unwrap_or_else(|| panic!("Pattern hyperedge {} is not matched", edge))
    }

    pub fn try_node(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).copied()
    }

    pub fn node_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.nodes.iter().map(|(&p, &t)| (p, t))
    }

    pub fn edge_pairs(&self) -> impl Iterator<Item = (EdgeId, EdgeId)> + '_ {
        self.edges.iter().map(|(&p, &t)| (p, t))
    }

    /// Images of the pattern's external nodes, in external order.
    pub fn external_images(&self, pattern: &HeapConfiguration) -> Vec<NodeId> {
        pattern.externals().iter().map(|&n| self.node(n)).collect()
    }
}

/// Options guiding the embedding search.
#[derive(Debug, Clone)]
pub struct EmbeddingOptions {
    /// Minimal number of selector hops between a variable and any node whose
    /// outgoing selectors are abstracted. Zero disables the check (aggressive mode).
    pub min_dereference_depth: usize,
    /// If `false`, variables naming constants are ignored by the depth check.
    pub admissible_constants: bool,
    /// Variable names that denote constants.
    pub constants: BTreeSet<String>,
    /// Compare hyperedge labels without their stacks; stacks are unified separately.
    pub indexed: bool,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            min_dereference_depth: 0,
            admissible_constants: false,
            constants: ["null".to_string()].into_iter().collect(),
            indexed: false,
        }
    }
}

/// Returns a lazy iterator over all embeddings of `pattern` in `target`.
///
/// An empty pattern has no embeddings.
pub fn embeddings_of<'a>(
    pattern: &'a HeapConfiguration,
    target: &'a HeapConfiguration,
    options: &EmbeddingOptions,
) -> Embeddings<'a> {
    Embeddings::new(pattern, target, Mode::Embedding, options)
}

impl HeapConfiguration {
    /// Returns a lazy iterator over all embeddings of `pattern` in this configuration.
    pub fn embeddings_of<'a>(&'a self, pattern: &'a HeapConfiguration, options: &EmbeddingOptions) -> Embeddings<'a> {
        embeddings_of(pattern, self, options)
    }

    /// Returns `true` if both configurations are equal up to renaming of nodes
    /// and hyperedges. External order, variable names, node types and full
    /// nonterminal labels (including stacks) must agree.
    pub fn is_isomorphic_to(&self, other: &HeapConfiguration) -> bool {
        if self.node_count() == 0 && self.edge_count() == 0 {
            return other.node_count() == 0 && other.edge_count() == 0;
        }
        Embeddings::new(self, other, Mode::Isomorphism, &EmbeddingOptions::default())
            .next()
            .is_some()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Mode {
    Embedding,
    Isomorphism,
}

#[derive(Debug, Copy, Clone)]
enum Slot {
    Node(NodeId),
    Edge(EdgeId),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    Fresh,
    Running,
    Exhausted,
}

/// One level of the backtracking search: candidates for a single slot.
#[derive(Debug)]
struct Frame {
    candidates: Vec<u32>,
    next: usize,
    assigned: Option<u32>,
}

/// Adjacency information that the heap does not store directly.
#[derive(Debug, Default)]
struct GraphIndex {
    predecessors: BTreeMap<NodeId, Vec<(NodeId, SelectorLabel)>>,
    attached: BTreeMap<NodeId, Vec<EdgeId>>,
    attachments: BTreeMap<NodeId, usize>,
}

impl GraphIndex {
    fn new(heap: &HeapConfiguration) -> Self {
        let mut index = GraphIndex::default();
        for node in heap.nodes() {
            for (label, target) in heap.selectors_of(node) {
                index
                    .predecessors
                    .entry(target)
                    .or_default()
                    .push((node, label.clone()));
            }
        }
        for edge in heap.edges() {
            for &node in heap.tentacles_of(edge) {
                *index.attachments.entry(node).or_default() += 1;
                let attached = index.attached.entry(node).or_default();
                if !attached.contains(&edge) {
                    attached.push(edge);
                }
            }
        }
        index
    }

    fn predecessors(&self, node: NodeId) -> &[(NodeId, SelectorLabel)] {
        self.predecessors.get(&node).map_or(&[][..], |v| v.as_slice())
    }

    fn in_degree(&self, node: NodeId) -> usize {
        self.predecessors(node).len()
    }

    fn attached(&self, node: NodeId) -> &[EdgeId] {
        self.attached.get(&node).map_or(&[][..], |v| v.as_slice())
    }

    fn attachments(&self, node: NodeId) -> usize {
        self.attachments.get(&node).copied().unwrap_or(0)
    }
}

/// Lazy iterator over the embeddings of a pattern in a target graph.
pub struct Embeddings<'a> {
    pattern: &'a HeapConfiguration,
    target: &'a HeapConfiguration,
    mode: Mode,
    indexed: bool,
    guard_active: bool,
    ignore_constants: bool,
    guarded: BTreeSet<NodeId>,
    pattern_index: GraphIndex,
    target_index: GraphIndex,
    slots: Vec<Slot>,
    frames: Vec<Frame>,
    node_map: BTreeMap<NodeId, NodeId>,
    used_nodes: BTreeSet<NodeId>,
    edge_map: BTreeMap<EdgeId, EdgeId>,
    used_edges: BTreeSet<EdgeId>,
    state: State,
}

impl<'a> Embeddings<'a> {
    fn new(
        pattern: &'a HeapConfiguration,
        target: &'a HeapConfiguration,
        mode: Mode,
        options: &EmbeddingOptions,
    ) -> Self {
        let guard_active = mode == Mode::Embedding && options.min_dereference_depth > 0;
        let ignore_constants = !options.admissible_constants;
        let guarded = if guard_active {
            guarded_nodes(target, options)
        } else {
            BTreeSet::new()
        };
        Self {
            pattern,
            target,
            mode,
            indexed: options.indexed,
            guard_active,
            ignore_constants,
            guarded,
            pattern_index: GraphIndex::new(pattern),
            target_index: GraphIndex::new(target),
            slots: search_order(pattern),
            frames: Vec::new(),
            node_map: BTreeMap::new(),
            used_nodes: BTreeSet::new(),
            edge_map: BTreeMap::new(),
            used_edges: BTreeSet::new(),
            state: State::Fresh,
        }
    }

    /// Cheap necessary conditions on element counts.
    fn plausible(&self) -> bool {
        let (p, t) = (self.pattern, self.target);
        if self.slots.is_empty() {
            return false;
        }
        match self.mode {
            Mode::Embedding => {
                p.node_count() <= t.node_count()
                    && p.edge_count() <= t.edge_count()
                    && p.selector_count() <= t.selector_count()
            }
            Mode::Isomorphism => {
                p.node_count() == t.node_count()
                    && p.edge_count() == t.edge_count()
                    && p.selector_count() == t.selector_count()
                    && p.external_count() == t.external_count()
                    && p.variable_count() == t.variable_count()
            }
        }
    }

    fn push_frame(&mut self) {
        let candidates = match self.slots[self.frames.len()] {
            Slot::Node(node) => self.node_candidates(node).into_iter().map(u32::from).collect(),
            Slot::Edge(edge) => self.edge_candidates(edge).into_iter().map(EdgeId::index).collect(),
        };
        self.frames.push(Frame {
            candidates,
            next: 0,
            assigned: None,
        });
    }

    fn assign(&mut self, level: usize, candidate: u32) {
        match self.slots[level] {
            Slot::Node(node) => {
                let image = NodeId::new(candidate);
                self.node_map.insert(node, image);
                self.used_nodes.insert(image);
            }
            Slot::Edge(edge) => {
                let image = EdgeId::new(candidate);
                self.edge_map.insert(edge, image);
                self.used_edges.insert(image);
            }
        }
        self.frames[level].assigned = Some(candidate);
    }

    fn unassign(&mut self, level: usize) {
        let Some(candidate) = self.frames[level].assigned.take() else {
            return;
        };
        match self.slots[level] {
            Slot::Node(node) => {
                self.node_map.remove(&node);
                self.used_nodes.remove(&NodeId::new(candidate));
            }
            Slot::Edge(edge) => {
                self.edge_map.remove(&edge);
                self.used_edges.remove(&EdgeId::new(candidate));
            }
        }
    }

    fn advance(&mut self, level: usize) -> Option<u32> {
        let frame = &mut self.frames[level];
        let candidate = frame.candidates.get(frame.next).copied();
        frame.next += 1;
        candidate
    }

    fn node_candidates(&self, node: NodeId) -> Vec<NodeId> {
        self.narrowed_candidates(node)
            .into_iter()
            .filter(|&t| self.node_feasible(node, t))
            .collect()
    }

    /// Uses an already matched neighbour to restrict the candidates of `node`.
    fn narrowed_candidates(&self, node: NodeId) -> Vec<NodeId> {
        for (source, label) in self.pattern_index.predecessors(node) {
            if *source == node {
                continue;
            }
            if let Some(&image) = self.node_map.get(source) {
                return self.target.selector_target(image, label.label()).into_iter().collect();
            }
        }
        for (label, successor) in self.pattern.selectors_of(node) {
            if successor == node {
                continue;
            }
            if let Some(&image) = self.node_map.get(&successor) {
                return self
                    .target_index
                    .predecessors(image)
                    .iter()
                    .filter(|(_, l)| l == label)
                    .map(|&(source, _)| source)
                    .collect();
            }
        }
        self.target.nodes().collect()
    }

    fn node_feasible(&self, node: NodeId, candidate: NodeId) -> bool {
        let (p, t) = (self.pattern, self.target);
        if self.used_nodes.contains(&candidate) {
            return false;
        }

        let pattern_type = p.node_type(node);
        let target_type = t.node_type(candidate);
        if pattern_type != target_type {
            let null_boundary = self.mode == Mode::Embedding && p.is_external(node) && target_type.is_constant();
            if !null_boundary {
                return false;
            }
        }

        let same_degrees = p.out_degree(node) == t.out_degree(candidate)
            && self.pattern_index.in_degree(node) == self.target_index.in_degree(candidate)
            && self.pattern_index.attachments(node) == self.target_index.attachments(candidate);

        match self.mode {
            Mode::Isomorphism => {
                if !same_degrees
                    || p.external_position(node) != t.external_position(candidate)
                    || p.variables_at(node) != t.variables_at(candidate)
                {
                    return false;
                }
            }
            Mode::Embedding => {
                if !p.is_external(node)
                    && (!same_degrees || t.is_external(candidate) || !t.variables_at(candidate).is_empty())
                {
                    return false;
                }
                if self.guard_active && p.out_degree(node) > 0 && !self.admissible(candidate) {
                    return false;
                }
            }
        }

        for (label, successor) in p.selectors_of(node) {
            let found = t.selector_target(candidate, label.label());
            let consistent = if successor == node {
                found == Some(candidate)
            } else if let Some(&image) = self.node_map.get(&successor) {
                found == Some(image)
            } else {
                found.is_some()
            };
            if !consistent {
                return false;
            }
        }
        for (source, label) in self.pattern_index.predecessors(node) {
            if *source == node {
                continue;
            }
            if let Some(&image) = self.node_map.get(source) {
                if t.selector_target(image, label.label()) != Some(candidate) {
                    return false;
                }
            }
        }
        true
    }

    fn admissible(&self, candidate: NodeId) -> bool {
        if self.target.is_external(candidate)
            && !(self.ignore_constants && self.target.node_type(candidate).is_constant())
        {
            return false;
        }
        !self.guarded.contains(&candidate)
    }

    fn labels_compatible(&self, pattern_label: &Nonterminal, target_label: &Nonterminal) -> bool {
        if !pattern_label.has_same_label(target_label) {
            return false;
        }
        match self.mode {
            Mode::Embedding if self.indexed => true,
            _ => pattern_label.stack() == target_label.stack(),
        }
    }

    fn edge_candidates(&self, edge: EdgeId) -> Vec<EdgeId> {
        let pattern_label = self.pattern.label_of(edge);
        let images: Vec<NodeId> = self
            .pattern
            .tentacles_of(edge)
            .iter()
            .map(|n| self.node_map[n])
            .collect();
        let pool: Vec<EdgeId> = match images.first() {
            Some(&first) => self.target_index.attached(first).to_vec(),
            None => self.target.edges().collect(),
        };
        pool.into_iter()
            .filter(|e| !self.used_edges.contains(e))
            .filter(|&e| self.labels_compatible(pattern_label, self.target.label_of(e)))
            .filter(|&e| self.target.tentacles_of(e) == images.as_slice())
            .collect()
    }

    fn current_matching(&self) -> Matching {
        Matching {
            nodes: self.node_map.clone(),
            edges: self.edge_map.clone(),
        }
    }
}

impl Iterator for Embeddings<'_> {
    type Item = Matching;

    fn next(&mut self) -> Option<Matching> {
        if self.state == State::Fresh {
            if !self.plausible() {
                self.state = State::Exhausted;
                return None;
            }
            self.state = State::Running;
            self.push_frame();
        }
        while self.state == State::Running {
            let Some(top) = self.frames.len().checked_sub(1) else {
                self.state = State::Exhausted;
                break;
            };
            self.unassign(top);
            match self.advance(top) {
                Some(candidate) => {
                    self.assign(top, candidate);
                    if self.frames.len() == self.slots.len() {
                        return Some(self.current_matching());
                    }
                    self.push_frame();
                }
                None => {
                    self.frames.pop();
                }
            }
        }
        None
    }
}

/// Nodes first (breadth-first from the external nodes), hyperedges last.
fn search_order(pattern: &HeapConfiguration) -> Vec<Slot> {
    let index = GraphIndex::new(pattern);
    let mut order = Vec::with_capacity(pattern.node_count() + pattern.edge_count());
    let mut seen = BTreeSet::new();
    let roots: Vec<NodeId> = pattern.externals().iter().copied().chain(pattern.nodes()).collect();
    for root in roots {
        if !seen.insert(root) {
            continue;
        }
        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            order.push(Slot::Node(node));
            let successors = pattern.selectors_of(node).map(|(_, n)| n);
            let predecessors = index.predecessors(node).iter().map(|&(n, _)| n);
            let co_attached = index
                .attached(node)
                .iter()
                .flat_map(|&e| pattern.tentacles_of(e).iter().copied());
            let neighbours: Vec<NodeId> = successors.chain(predecessors).chain(co_attached).collect();
            for neighbour in neighbours {
                if seen.insert(neighbour) {
                    queue.push_back(neighbour);
                }
            }
        }
    }
    order.extend(pattern.edges().map(Slot::Edge));
    order
}

/// Nodes reachable from a relevant variable in fewer than `min_dereference_depth` selector hops.
fn guarded_nodes(target: &HeapConfiguration, options: &EmbeddingOptions) -> BTreeSet<NodeId> {
    let mut distance: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut queue = VecDeque::new();
    for (name, node) in target.variables() {
        if !options.admissible_constants && options.constants.contains(name) {
            continue;
        }
        if distance.insert(node, 0).is_none() {
            queue.push_back(node);
        }
    }
    while let Some(node) = queue.pop_front() {
        let next = distance[&node] + 1;
        if next >= options.min_dereference_depth {
            continue;
        }
        for (_, successor) in target.selectors_of(node) {
            if !distance.contains_key(&successor) {
                distance.insert(successor, next);
                queue.push_back(successor);
            }
        }
    }
    distance.into_keys().collect()
}
