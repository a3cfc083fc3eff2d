//! Hyperedge replacement grammars.
//!
//! A [`Grammar`] maps left-hand side nonterminals to their right-hand side
//! graphs. A right-hand side of a rule for a nonterminal of rank `r` has exactly
//! `r` external nodes, in tentacle order. Grammars are assembled once with a
//! [`GrammarBuilder`] and are read-only afterwards.
//!
//! On [`build`][GrammarBuilder::build], two derived tables are computed:
//!
//! - **Collapsed rules**: variants of each right-hand side in which some external
//!   nodes are merged. They let canonicalization fold structures whose boundary
//!   nodes coincide, such as a cyclic list that starts and ends in the same node.
//! - **Selector exposure**: for every `(label, tentacle, selector)`, whether some
//!   derivation starting at that label eventually creates the selector at the
//!   node attached to that tentacle.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::embedding::Matching;
use crate::heap::HeapConfiguration;
use crate::nonterminal::Nonterminal;
use crate::types::NodeId;

/// A right-hand side with merged external nodes.
///
/// The external node at original position `i` became the external node at
/// position `original_to_collapsed[i]` of the collapsed graph. Node and hyperedge
/// ids of the collapsed graph are ids of the original graph.
#[derive(Debug, Clone)]
pub struct CollapsedHeapConfiguration {
    original: HeapConfiguration,
    collapsed: HeapConfiguration,
    original_to_collapsed: Vec<usize>,
}

impl CollapsedHeapConfiguration {
    /// Merges the external nodes of `original` according to `original_to_collapsed`.
    pub fn new(original: HeapConfiguration, original_to_collapsed: Vec<usize>) -> Self {
        let mut builder = original.builder();
        builder.merge_externals(&original_to_collapsed);
        Self {
            collapsed: builder.build(),
            original,
            original_to_collapsed,
        }
    }

    pub fn original(&self) -> &HeapConfiguration {
        &self.original
    }

    pub fn collapsed(&self) -> &HeapConfiguration {
        &self.collapsed
    }

    pub fn original_to_collapsed(&self) -> &[usize] {
        &self.original_to_collapsed
    }

    /// Turns a matching of the collapsed graph into a map from the original graph.
    ///
    /// The result is not injective: merged external nodes share their image.
    pub fn lift(&self, matching: &Matching) -> Matching {
        let nodes: BTreeMap<NodeId, NodeId> = self
            .original
            .nodes()
            .map(|node| {
                let collapsed = match self.original.external_position(node) {
                    Some(position) => self.collapsed.external_at(self.original_to_collapsed[position]),
                    None => node,
                };
                (node, matching.node(collapsed))
            })
            .collect();
        let edges = self.original.edges().map(|e| (e, matching.edge(e))).collect();
        Matching::new(nodes, edges)
    }
}

/// An immutable rule table.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    rules: BTreeMap<Nonterminal, Vec<HeapConfiguration>>,
    collapsed: BTreeMap<Nonterminal, Vec<CollapsedHeapConfiguration>>,
    ranks: BTreeMap<String, usize>,
    exposable: BTreeSet<(String, usize, String)>,
}

impl Grammar {
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::default()
    }

    /// Number of `(lhs, rhs)` pairs.
    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// All `(lhs, rhs)` pairs, grouped by left-hand side.
    pub fn rules(&self) -> impl Iterator<Item = (&Nonterminal, &HeapConfiguration)> + '_ {
        self.rules
            .iter()
            .flat_map(|(lhs, rhs)| rhs.iter().map(move |r| (lhs, r)))
    }

    pub fn left_hand_sides(&self) -> impl Iterator<Item = &Nonterminal> + '_ {
        self.rules.keys()
    }

    /// Right-hand sides of the exact left-hand side `lhs` (including its stack).
    pub fn right_hand_sides(&self, lhs: &Nonterminal) -> &[HeapConfiguration] {
        self.rules.get(lhs).map_or(&[][..], Vec::as_slice)
    }

    /// All rules whose left-hand side carries the label `label`, for any stack.
    pub fn rules_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = (&'a Nonterminal, &'a HeapConfiguration)> + 'a {
        self.rules().filter(move |(lhs, _)| lhs.label() == label)
    }

    /// Labels of all left-hand sides.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.rules.keys().map(Nonterminal::label).collect()
    }

    /// Rank of `label`, if it occurs anywhere in the grammar.
    pub fn rank_of(&self, label: &str) -> Option<usize> {
        self.ranks.get(label).copied()
    }

    pub fn is_indexed(&self) -> bool {
        self.rules.keys().any(Nonterminal::is_indexed)
    }

    /// Collapsed variants of the right-hand sides of `lhs`.
    pub fn collapsed_rules(&self, lhs: &Nonterminal) -> &[CollapsedHeapConfiguration] {
        self.collapsed.get(lhs).map_or(&[][..], Vec::as_slice)
    }

    /// Returns `true` if some derivation from a hyperedge labeled `label` can
    /// produce a selector `selector` at the node attached to `tentacle`.
    pub fn can_expose(&self, label: &str, tentacle: usize, selector: &str) -> bool {
        self.exposable
            .contains(&(label.to_string(), tentacle, selector.to_string()))
    }
}

/// Collects rules and computes the derived tables of a [`Grammar`].
#[derive(Debug, Clone, Default)]
pub struct GrammarBuilder {
    rules: BTreeMap<Nonterminal, Vec<HeapConfiguration>>,
    ranks: BTreeMap<String, usize>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn register_rank(&mut self, label: &Nonterminal) {
        let rank = *self.ranks.entry(label.label().to_string()).or_insert(label.rank());
        assert_eq!(
            rank,
            label.rank(),
            "Nonterminal {} used with ranks {} and {}",
            label,
            rank,
            label.rank()
        );
    }

    /// Adds the rule `lhs -> rhs`.
    ///
    /// # Panics
    ///
    /// Panics if the external node count of `rhs` differs from the rank of `lhs`,
    /// or if a label is used with two different ranks.
    pub fn add_rule(&mut self, lhs: Nonterminal, rhs: HeapConfiguration) -> &mut Self {
        assert_eq!(
            rhs.external_count(),
            lhs.rank(),
            "Right-hand side of {} of rank {} has {} external nodes: {}",
            lhs,
            lhs.rank(),
            rhs.external_count(),
            rhs
        );
        self.register_rank(&lhs);
        for edge in rhs.edges() {
            self.register_rank(rhs.label_of(edge));
        }
        self.rules.entry(lhs).or_default().push(rhs);
        self
    }

    pub fn add_rules(&mut self, lhs: Nonterminal, rhs: impl IntoIterator<Item = HeapConfiguration>) -> &mut Self {
        for r in rhs {
            self.add_rule(lhs.clone(), r);
        }
        self
    }

    pub fn build(self) -> Grammar {
        let mut collapsed: BTreeMap<Nonterminal, Vec<CollapsedHeapConfiguration>> = BTreeMap::new();
        for (lhs, rhs) in &self.rules {
            let variants: Vec<CollapsedHeapConfiguration> = rhs
                .iter()
                .flat_map(|r| {
                    external_partitions(r, lhs.reduction_tentacles())
                        .into_iter()
                        .map(move |partition| CollapsedHeapConfiguration::new(r.clone(), partition))
                })
                .collect();
            if !variants.is_empty() {
                debug!("{} collapsed rules for {}", variants.len(), lhs);
                collapsed.insert(lhs.clone(), variants);
            }
        }
        let exposable = exposable_selectors(&self.rules);
        Grammar {
            rules: self.rules,
            collapsed,
            ranks: self.ranks,
            exposable,
        }
    }
}

/// Ways to merge the external nodes of `rhs` into fewer positions.
///
/// A partition maps every external position to a new position. Each partition
/// merges at least two externals, only merges externals of equal type, puts at
/// most one non-reduction tentacle into each class, and never gives a node two
/// selectors with the same label. Partitions equal up to renaming of the new
/// positions are generated once, in their first-occurrence normal form.
pub fn external_partitions(rhs: &HeapConfiguration, reduction_tentacles: &[bool]) -> Vec<Vec<usize>> {
    let rank = rhs.external_count();
    let mut result = Vec::new();
    if rank < 2 {
        return result;
    }
    let mut chosen = Vec::with_capacity(rank);
    extend_partition(rhs, reduction_tentacles, rank - 1, &mut chosen, &mut result);
    result.retain(|partition| mergeable(rhs, partition));
    result
}

fn extend_partition(
    rhs: &HeapConfiguration,
    reduction_tentacles: &[bool],
    classes: usize,
    chosen: &mut Vec<usize>,
    result: &mut Vec<Vec<usize>>,
) {
    let position = chosen.len();
    if position == rhs.external_count() {
        result.push(chosen.clone());
        return;
    }
    let fresh = chosen.iter().max().map_or(0, |&m| m + 1);
    for class in 0..=fresh.min(classes - 1) {
        if let Some(first) = chosen.iter().position(|&c| c == class) {
            if rhs.node_type(rhs.external_at(first)) != rhs.node_type(rhs.external_at(position)) {
                continue;
            }
            let second_non_reduction = !reduction_tentacles[position]
                && chosen
                    .iter()
                    .zip(reduction_tentacles)
                    .any(|(&c, &reduction)| c == class && !reduction);
            if second_non_reduction {
                continue;
            }
        }
        chosen.push(class);
        extend_partition(rhs, reduction_tentacles, classes, chosen, result);
        chosen.pop();
    }
}

fn mergeable(rhs: &HeapConfiguration, partition: &[usize]) -> bool {
    let mut labels: BTreeMap<usize, BTreeSet<&str>> = BTreeMap::new();
    for (position, &class) in partition.iter().enumerate() {
        let node = rhs.external_at(position);
        let seen = labels.entry(class).or_default();
        for (label, _) in rhs.selectors_of(node) {
            if !seen.insert(label.label()) {
                return false;
            }
        }
    }
    true
}

/// Fixpoint of "selector `s` appears at tentacle `t` of label `l`".
fn exposable_selectors(rules: &BTreeMap<Nonterminal, Vec<HeapConfiguration>>) -> BTreeSet<(String, usize, String)> {
    let mut exposable = BTreeSet::new();
    for (lhs, rhs) in rules {
        for r in rhs {
            for (tentacle, &node) in r.externals().iter().enumerate() {
                for (selector, _) in r.selectors_of(node) {
                    exposable.insert((lhs.label().to_string(), tentacle, selector.label().to_string()));
                }
            }
        }
    }
    loop {
        let mut derived = Vec::new();
        for (lhs, rhs) in rules {
            for r in rhs {
                for (tentacle, &node) in r.externals().iter().enumerate() {
                    for edge in r.attached_edges_of(node) {
                        let inner = r.label_of(edge).label();
                        for (position, _) in r.tentacles_of(edge).iter().enumerate().filter(|&(_, &n)| n == node) {
                            for (label, t, selector) in &exposable {
                                if label == inner && *t == position {
                                    derived.push((lhs.label().to_string(), tentacle, selector.clone()));
                                }
                            }
                        }
                    }
                }
            }
        }
        let before = exposable.len();
        exposable.extend(derived);
        if exposable.len() == before {
            return exposable;
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::fixtures::*;
    use crate::heap::HeapBuilder;
    use crate::types::NodeType;

    #[test]
    fn test_sll_grammar() {
        let grammar = sll_grammar();
        assert_eq!(grammar.rule_count(), 2);
        assert_eq!(grammar.labels(), ["SLL"].into_iter().collect());
        assert_eq!(grammar.rank_of("SLL"), Some(2));
        assert_eq!(grammar.rank_of("DLL"), None);
        assert_eq!(grammar.right_hand_sides(&sll()).len(), 2);
        assert_eq!(grammar.rules_for("SLL").count(), 2);
        assert!(!grammar.is_indexed());
    }

    #[test]
    #[should_panic(expected = "external nodes")]
    fn test_rule_rank_mismatch() {
        let mut builder = Grammar::builder();
        builder.add_rule(Nonterminal::new("SLL", 3), sll_base_rule());
    }

    #[test]
    #[should_panic(expected = "used with ranks")]
    fn test_label_rank_consistency() {
        let mut builder = Grammar::builder();
        builder.add_rule(sll(), sll_base_rule());
        let mut rhs = HeapBuilder::new();
        let nodes = rhs.add_nodes(list_type(), 3);
        for &n in &nodes {
            rhs.set_external(n);
        }
        builder.add_rule(Nonterminal::new("SLL", 3), rhs.build());
    }

    #[test]
    fn test_selector_exposure() {
        let grammar = sll_grammar();
        assert!(grammar.can_expose("SLL", 0, "next"));
        assert!(!grammar.can_expose("SLL", 1, "next"));
        assert!(!grammar.can_expose("SLL", 0, "prev"));
    }

    #[test]
    fn test_transitive_selector_exposure() {
        let mut rhs = HeapBuilder::new();
        let nodes = rhs.add_nodes(list_type(), 2);
        rhs.add_nonterminal_edge(sll(), vec![nodes[1], nodes[0]]);
        rhs.set_external(nodes[0]).set_external(nodes[1]);

        let mut builder = Grammar::builder();
        builder.add_rules(sll(), [sll_base_rule(), sll_recursive_rule()]);
        builder.add_rule(Nonterminal::new("REV", 2), rhs.build());
        let grammar = builder.build();

        assert!(grammar.can_expose("REV", 1, "next"));
        assert!(!grammar.can_expose("REV", 0, "next"));
    }

    #[test]
    fn test_partitions() {
        let mut rhs = HeapBuilder::new();
        let nodes = rhs.add_nodes(list_type(), 3);
        for &n in &nodes {
            rhs.set_external(n);
        }
        let rhs = rhs.build();

        let all = external_partitions(&rhs, &[true, true, true]);
        assert_eq!(all, vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0], vec![0, 1, 1]]);

        let restricted = external_partitions(&rhs, &[false, false, true]);
        assert_eq!(restricted, vec![vec![0, 1, 0], vec![0, 1, 1]]);
    }

    #[test]
    fn test_partitions_respect_types_and_selectors() {
        let mut rhs = HeapBuilder::new();
        let a = rhs.add_node(list_type());
        let null = rhs.add_node(NodeType::null());
        rhs.set_external(a).set_external(null);
        assert!(external_partitions(&rhs.build(), &[true, true]).is_empty());

        let mut rhs = HeapBuilder::new();
        let nodes = rhs.add_nodes(list_type(), 3);
        rhs.add_selector(nodes[0], "next", nodes[2]);
        rhs.add_selector(nodes[1], "next", nodes[2]);
        rhs.set_external(nodes[0]).set_external(nodes[1]);
        assert!(external_partitions(&rhs.build(), &[true, true]).is_empty());
    }

    #[test]
    fn test_collapsed_rules() {
        let plain = sll_grammar();
        assert!(plain.collapsed_rules(&sll()).is_empty());

        let grammar = reducible_sll_grammar();
        let lhs = reducible_sll();
        let collapsed = grammar.collapsed_rules(&lhs);
        assert_eq!(collapsed.len(), 2);

        let base = &collapsed[0];
        assert_eq!(base.original_to_collapsed(), &[0, 0]);
        assert_eq!(base.collapsed().node_count(), 1);
        let node = base.collapsed().external_at(0);
        assert_eq!(base.collapsed().selector_target(node, "next"), Some(node));
    }

    #[test]
    fn test_lift() {
        let grammar = reducible_sll_grammar();
        let collapsed = &grammar.collapsed_rules(&reducible_sll())[1];

        let mut builder = HeapBuilder::new();
        let a = builder.add_node(list_type());
        let b = builder.add_node(list_type());
        builder.add_selector(a, "next", b);
        builder.add_nonterminal_edge(reducible_sll(), vec![b, a]);
        let heap = builder.build();

        let options = crate::embedding::EmbeddingOptions::default();
        let matching = heap.embeddings_of(collapsed.collapsed(), &options).next().unwrap();
        let lifted = collapsed.lift(&matching);

        let original = collapsed.original();
        assert_eq!(lifted.node(original.external_at(0)), a);
        assert_eq!(lifted.node(original.external_at(1)), a);
        assert_eq!(lifted.edge_pairs().count(), 1);
    }
}
