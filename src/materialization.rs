//! Materialization: unfolding nonterminal hyperedges on demand.
//!
//! Before a program dereferences `x.next`, the node of `x` must carry a concrete
//! `next` selector. Such a pair `(x, next)` is a *violation point*. The
//! [`Materializer`] repeatedly picks a violation point that is not yet
//! satisfied and replaces a hyperedge attached to the variable's node by every
//! right-hand side that creates the selector there. Every result satisfies all
//! violation points of the call.
//!
//! A violation point that cannot be satisfied (the variable points to null, or
//! no rule creates the selector) prunes its branch; it is not an error. A
//! violation point whose variable does not exist is ignored.
//!
//! In indexed mode the rules are grouped by the stack materialization they
//! need. For every group, the abstract stacks of the graph are materialized
//! first, then the rules, instantiated to the materialized stack, are glued in.

use std::cell::RefCell;
use std::collections::BTreeSet;

use log::{debug, trace};

use crate::cache::Cache;
use crate::context::AnalysisContext;
use crate::grammar::Grammar;
use crate::heap::HeapConfiguration;
use crate::nonterminal::Nonterminal;
use crate::stack::{IndexSymbol, Stack};
use crate::types::{EdgeId, NodeId};

/// Memoized rule lookups, keyed by `(label, tentacle, selector)`.
///
/// Values are left-hand sides together with the index of the right-hand side.
pub(crate) type ResolverCache = Cache<(String, usize, String), Vec<(Nonterminal, usize)>>;

/// A set of `(variable, selector)` pairs about to be dereferenced.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ViolationPoints {
    points: BTreeSet<(String, String)>,
}

impl ViolationPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, variable: impl Into<String>, selector: impl Into<String>) -> &mut Self {
        self.points.insert((variable.into(), selector.into()));
        self
    }

    pub fn contains(&self, variable: &str, selector: &str) -> bool {
        self.iter().any(|(v, s)| v == variable && s == selector)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.points.iter().map(|(v, s)| (v.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<V, S> FromIterator<(V, S)> for ViolationPoints
where
    V: Into<String>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (V, S)>>(iter: T) -> Self {
        let mut points = ViolationPoints::new();
        for (variable, selector) in iter {
            points.add(variable, selector);
        }
        points
    }
}

/// Finds the rules whose right-hand side creates a selector at a given tentacle.
#[derive(Debug, Clone, Copy)]
pub struct ViolationPointResolver<'a> {
    grammar: &'a Grammar,
    cache: &'a RefCell<ResolverCache>,
}

impl<'a> ViolationPointResolver<'a> {
    pub(crate) fn new(grammar: &'a Grammar, cache: &'a RefCell<ResolverCache>) -> Self {
        Self { grammar, cache }
    }

    /// Rules `lhs -> rhs` with the label and rank of `nonterminal` whose external
    /// node at `tentacle` has a `selector` selector.
    ///
    /// Stacks are not compared; in indexed mode the caller filters with the matcher.
    pub fn rules_creating(
        &self,
        nonterminal: &Nonterminal,
        tentacle: usize,
        selector: &str,
    ) -> Vec<(Nonterminal, &'a HeapConfiguration)> {
        let key = (nonterminal.label().to_string(), tentacle, selector.to_string());
        let grammar = self.grammar;
        let found = self
            .cache
            .borrow_mut()
            .get_or_insert_with(key, || compute_rules(grammar, nonterminal, tentacle, selector));
        found
            .into_iter()
            .map(|(lhs, index)| {
                let rhs = &grammar.right_hand_sides(&lhs)[index];
                (lhs, rhs)
            })
            .collect()
    }
}

fn compute_rules(grammar: &Grammar, nonterminal: &Nonterminal, tentacle: usize, selector: &str) -> Vec<(Nonterminal, usize)> {
    let mut rules = Vec::new();
    for lhs in grammar.left_hand_sides() {
        if !lhs.has_same_label(nonterminal) {
            continue;
        }
        for (index, rhs) in grammar.right_hand_sides(lhs).iter().enumerate() {
            if rhs.has_selector(rhs.external_at(tentacle), selector) {
                rules.push((lhs.clone(), index));
            }
        }
    }
    trace!(
        "{} rules create {} at tentacle {} of {}",
        rules.len(),
        selector,
        tentacle,
        nonterminal
    );
    rules
}

/// Backward concretization strategy.
#[derive(Debug, Clone, Copy)]
pub struct Materializer<'a> {
    context: &'a AnalysisContext,
}

impl<'a> Materializer<'a> {
    pub fn new(context: &'a AnalysisContext) -> Self {
        Self { context }
    }

    fn resolver(&self) -> ViolationPointResolver<'a> {
        ViolationPointResolver::new(self.context.grammar(), self.context.resolver_cache())
    }

    /// Returns all graphs obtained by unfolding `heap` until every violation
    /// point holds.
    ///
    /// A graph that already satisfies all points is returned as the single
    /// result. An empty result means some point cannot be satisfied.
    pub fn materialize(&self, heap: &HeapConfiguration, points: &ViolationPoints) -> Vec<HeapConfiguration> {
        let mut results = Vec::new();
        let mut worklist = vec![heap.clone()];
        while let Some(current) = worklist.pop() {
            match self.first_violation(&current, points) {
                None => results.push(current),
                Some((node, selector)) => {
                    let successors = self.resolve(&current, node, selector);
                    worklist.extend(successors.into_iter().rev());
                }
            }
        }
        debug!(
            "materialization of {} violation points produced {} graphs",
            points.len(),
            results.len()
        );
        results
    }

    /// The node and selector of the first violation point that does not hold.
    fn first_violation<'p>(&self, heap: &HeapConfiguration, points: &'p ViolationPoints) -> Option<(NodeId, &'p str)> {
        for (variable, selector) in points.iter() {
            let Some(node) = heap.variable_target(variable) else {
                debug!("variable {} of violation point ({}, {}) is not present", variable, variable, selector);
                continue;
            };
            if !heap.has_selector(node, selector) {
                return Some((node, selector));
            }
        }
        None
    }

    /// Unfolds the first attached hyperedge that yields any successor.
    fn resolve(&self, heap: &HeapConfiguration, node: NodeId, selector: &str) -> Vec<HeapConfiguration> {
        if heap.node_type(node).is_constant() {
            debug!("cannot materialize {} at constant node {}", selector, node);
            return Vec::new();
        }
        let grammar = self.context.grammar();
        for edge in heap.attached_edges_of(node) {
            let label = heap.label_of(edge);
            let Some(tentacle) = heap.tentacles_of(edge).iter().position(|&n| n == node) else {
                continue;
            };
            if !grammar.can_expose(label.label(), tentacle, selector) {
                continue;
            }
            let rules = self.resolver().rules_creating(label, tentacle, selector);
            trace!("resolve {} at {} via {} with {} rules", selector, node, label, rules.len());
            let successors = if label.is_indexed() {
                self.apply_indexed(heap, edge, rules)
            } else {
                rules
                    .into_iter()
                    .map(|(_, rhs)| {
                        let mut builder = heap.builder();
                        builder.replace_nonterminal_edge(edge, rhs);
                        builder.build()
                    })
                    .collect()
            };
            if !successors.is_empty() {
                return successors;
            }
        }
        debug!("no hyperedge at {} can expose {}", node, selector);
        Vec::new()
    }

    fn apply_indexed(
        &self,
        heap: &HeapConfiguration,
        edge: EdgeId,
        rules: Vec<(Nonterminal, &HeapConfiguration)>,
    ) -> Vec<HeapConfiguration> {
        let matcher = self.context.matcher();
        let label = heap.label_of(edge);

        let mut groups: Vec<(Vec<IndexSymbol>, Vec<(Nonterminal, &HeapConfiguration)>)> = Vec::new();
        for (lhs, rhs) in rules {
            let Some(stack_match) = matcher.match_stacks(label, &lhs) else {
                continue;
            };
            let materialization = stack_match.materialization();
            match groups.iter_mut().find(|(m, _)| m.as_slice() == materialization) {
                Some((_, group)) => group.push((lhs, rhs)),
                None => groups.push((materialization.to_vec(), vec![(lhs, rhs)])),
            }
        }

        let mut results = Vec::new();
        for (materialization, rules) in groups {
            let mut builder = heap.builder();
            let materialized_label = if materialization.is_empty() {
                label.clone()
            } else {
                let symbol = label
                    .stack()
                    .and_then(Stack::abstract_end)
                    .unwrap_or_else(|| panic!("Cannot materialize {} of edge {} in {}", label, edge, heap))
                    .clone();
                builder.materialize_stacks(&symbol, &materialization);
                label.with_prolonged_stack(&materialization)
            };
            let materialized = builder.build();

            for (lhs, rhs) in rules {
                let instantiation = matcher.necessary_instantiation(&materialized_label, &lhs);
                let mut rule = rhs.builder();
                rule.instantiate_stacks(&instantiation);
                let rule = rule.build();

                let mut builder = materialized.builder();
                builder.replace_nonterminal_edge(edge, &rule);
                results.push(builder.build());
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::canonicalization::ProgramPoint;
    use crate::config::AbstractionConfig;
    use crate::fixtures::*;
    use crate::heap::HeapBuilder;
    use crate::types::NodeType;

    /// `x` at `a`, `SLL(a, null)`.
    fn abstract_list() -> (HeapConfiguration, NodeId, NodeId) {
        let mut builder = HeapBuilder::new();
        let a = builder.add_node(list_type());
        let null = builder.add_node(NodeType::null());
        builder.add_variable("null", null).add_variable("x", a);
        builder.add_nonterminal_edge(sll(), vec![a, null]);
        (builder.build(), a, null)
    }

    fn points(pairs: &[(&str, &str)]) -> ViolationPoints {
        pairs.iter().copied().collect()
    }

    fn satisfies(heap: &HeapConfiguration, points: &ViolationPoints) -> bool {
        points.iter().all(|(variable, selector)| {
            heap.variable_target(variable)
                .is_some_and(|node| heap.has_selector(node, selector))
        })
    }

    #[test]
    fn test_violation_points() {
        let mut points = ViolationPoints::new();
        assert!(points.is_empty());
        points.add("x", "next").add("y", "prev").add("x", "next");
        assert_eq!(points.len(), 2);
        assert!(points.contains("y", "prev"));
        assert!(!points.contains("y", "next"));
        assert_eq!(points.iter().next(), Some(("x", "next")));
    }

    #[test]
    fn test_resolver_filters_and_caches() {
        let grammar = confluent_sll_grammar();
        let cache = RefCell::new(ResolverCache::new());
        let resolver = ViolationPointResolver::new(&grammar, &cache);

        let rules = resolver.rules_creating(&sll(), 0, "next");
        assert_eq!(rules.len(), 2);
        assert!(rules[0].1.is_isomorphic_to(&sll_base_rule()));
        assert!(resolver.rules_creating(&sll(), 1, "next").is_empty());
        assert!(resolver.rules_creating(&sll(), 0, "prev").is_empty());
        assert_eq!(cache.borrow().len(), 3);

        resolver.rules_creating(&sll(), 0, "next");
        assert_eq!(cache.borrow().hits(), 1);
    }

    #[test]
    fn test_unfold_list() {
        let context = AnalysisContext::new(sll_grammar(), AbstractionConfig::default());
        let (heap, _, _) = abstract_list();
        let points = points(&[("x", "next")]);

        let results = context.materialize(&heap, &points);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| satisfies(r, &points)));

        let mut expected = HeapBuilder::new();
        let a = expected.add_node(list_type());
        let n1 = expected.add_node(list_type());
        let null = expected.add_node(NodeType::null());
        expected.add_variable("null", null).add_variable("x", a);
        expected.add_selector(a, "next", n1);
        expected.add_nonterminal_edge(sll(), vec![n1, null]);
        let expected = expected.build();
        assert!(results.iter().any(|r| r.is_isomorphic_to(&expected)));

        let x = results[0].variable_target("x").unwrap();
        let base = results
            .iter()
            .find(|r| r.edge_count() == 0)
            .expect("base rule unfolds to a single selector");
        assert_eq!(base.selector_target(x, "next"), base.variable_target("null"));
    }

    #[test]
    fn test_null_variable_is_unsatisfiable() {
        let context = AnalysisContext::new(sll_grammar(), AbstractionConfig::default());
        let (heap, _, null) = abstract_list();
        let mut builder = heap.into_builder();
        builder.add_variable("x", null);
        let heap = builder.build();

        assert!(context.materialize(&heap, &points(&[("x", "next")])).is_empty());
    }

    #[test]
    fn test_satisfied_and_missing_points() {
        let context = AnalysisContext::new(sll_grammar(), AbstractionConfig::default());
        let (heap, nodes) = list(2);
        let mut builder = heap.into_builder();
        builder.add_variable("x", nodes[0]);
        let heap = builder.build();

        let results = context.materialize(&heap, &points(&[("x", "next"), ("y", "next")]));
        assert_eq!(results.len(), 1);
        assert!(results[0].is_isomorphic_to(&heap));
    }

    #[test]
    fn test_unexposable_selector() {
        let context = AnalysisContext::new(sll_grammar(), AbstractionConfig::default());
        let mut builder = HeapBuilder::new();
        let a = builder.add_node(list_type());
        let b = builder.add_node(list_type());
        builder.add_nonterminal_edge(sll(), vec![b, a]);
        builder.add_variable("x", a);
        let heap = builder.build();

        assert!(context.materialize(&heap, &points(&[("x", "next")])).is_empty());
        assert!(context.materialize(&heap, &points(&[("x", "prev")])).is_empty());
    }

    #[test]
    fn test_all_points_hold_in_every_result() {
        let context = AnalysisContext::new(sll_grammar(), AbstractionConfig::default());
        let (heap, _, null) = abstract_list();
        let mut builder = heap.into_builder();
        let b = builder.add_node(list_type());
        builder.add_nonterminal_edge(sll(), vec![b, null]);
        builder.add_variable("y", b);
        let heap = builder.build();

        let points = points(&[("x", "next"), ("y", "next")]);
        let results = context.materialize(&heap, &points);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| satisfies(r, &points)));
    }

    #[test]
    fn test_indexed_unfold() {
        let config = AbstractionConfig {
            indexed: true,
            ..AbstractionConfig::default()
        };
        let context = AnalysisContext::new(null_terminated_indexed_grammar(), config);
        let mut builder = HeapBuilder::new();
        let a = builder.add_node(list_type());
        let null = builder.add_node(NodeType::null());
        builder.add_variable("null", null).add_variable("x", a);
        builder.add_nonterminal_edge(indexed_b(vec![x()]), vec![a, null]);
        let heap = builder.build();

        let results = context.materialize(&heap, &points(&[("x", "next")]));
        assert_eq!(results.len(), 2);

        let terminated = results.iter().find(|r| r.edge_count() == 0).unwrap();
        assert_eq!(terminated.selector_target(a, "next"), Some(null));

        let unfolded = results.iter().find(|r| r.edge_count() == 1).unwrap();
        let n = unfolded.selector_target(a, "next").unwrap();
        let edge = unfolded.edges().next().unwrap();
        assert_eq!(unfolded.label_of(edge).to_string(), "B[X]");
        assert_eq!(unfolded.tentacles_of(edge), &[n, null]);
    }

    #[test]
    fn test_indexed_unfold_of_concrete_stack() {
        let config = AbstractionConfig {
            indexed: true,
            ..AbstractionConfig::default()
        };
        let context = AnalysisContext::new(null_terminated_indexed_grammar(), config);
        let mut builder = HeapBuilder::new();
        let a = builder.add_node(list_type());
        let null = builder.add_node(NodeType::null());
        builder.add_variable("null", null).add_variable("x", a);
        builder.add_nonterminal_edge(indexed_b(vec![s(), s(), z()]), vec![a, null]);
        let heap = builder.build();

        let results = context.materialize(&heap, &points(&[("x", "next")]));
        assert_eq!(results.len(), 1);
        let edge = results[0].edges().next().unwrap();
        assert_eq!(results[0].label_of(edge).to_string(), "B[s,Z]");
    }

    #[test]
    fn test_unfold_then_fold_restores_graph() {
        let config = AbstractionConfig {
            backward_confluent: true,
            ..AbstractionConfig::default()
        };
        let context = AnalysisContext::new(confluent_sll_grammar(), config);
        let (heap, _, _) = abstract_list();

        for unfolded in context.materialize(&heap, &points(&[("x", "next")])) {
            let folded = context.canonicalize(&unfolded, ProgramPoint::Return);
            assert_eq!(folded.len(), 1);
            assert!(folded[0].is_isomorphic_to(&heap));
        }
    }
}
