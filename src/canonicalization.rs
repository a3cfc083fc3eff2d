//! Canonicalization: folding concrete structure into nonterminal hyperedges.
//!
//! # Algorithm
//!
//! Starting from the input graph, every rule `lhs -> rhs` of the grammar is
//! tried: each embedding of `rhs` is replaced by a single hyperedge labeled
//! `lhs`, attached to the images of the external nodes of `rhs`. Rewritten
//! graphs are processed again until no rule applies; those terminal graphs are
//! the result.
//!
//! - For a **backward confluent** grammar, only the first successful rewrite of
//!   each graph is followed, and the result is a single graph.
//! - Otherwise all rewrites are explored. The result holds the most abstract
//!   terminal graphs, without isomorphic duplicates; a terminal graph with more
//!   nodes and selectors than another one is a dead end of rule application
//!   order and is dropped.
//!
//! Graphs that only rewrite into each other, as with the rules `A -> B` and
//! `B -> A`, count as terminal; one of them is returned.
//!
//! Rules are tried in grammar order; collapsed variants of a rule's right-hand
//! sides come after the originals.
//!
//! # Aggressiveness
//!
//! The dereference depth of the [embedding search][crate::embedding] normally
//! keeps structure next to variables concrete. It drops to zero when the graph
//! grows beyond [`aggressive_abstraction_threshold`][crate::config::AbstractionConfig::aggressive_abstraction_threshold]
//! nodes, or at [`ProgramPoint::Return`] when configured.
//!
//! # Indexed mode
//!
//! Before rules are tried, stacks are abstracted (see
//! [`stack_canonicalization`][crate::stack_canonicalization]). Each embedding must
//! then pass an index check: the stacks of matched hyperedges are unified with
//! the rule's stacks, which may materialize stacks in the graph and instantiate
//! the stack variable of the rule. The new hyperedge carries the instantiated
//! stack of `lhs`.

use log::{debug, trace};

use crate::context::AnalysisContext;
use crate::embedding::{EmbeddingOptions, Matching};
use crate::grammar::CollapsedHeapConfiguration;
use crate::heap::HeapConfiguration;
use crate::nonterminal::Nonterminal;
use crate::stack::IndexSymbol;
use crate::stack_canonicalization::StackCanonicalizer;

/// The kind of program location a state belongs to.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum ProgramPoint {
    #[default]
    Ordinary,
    /// The statement has exactly one successor; abstraction can wait.
    UniqueSuccessor,
    /// The end of a method.
    Return,
}

/// A rule right-hand side, possibly with merged external nodes.
#[derive(Debug, Copy, Clone)]
enum Pattern<'g> {
    Original(&'g HeapConfiguration),
    Collapsed(&'g CollapsedHeapConfiguration),
}

impl<'g> Pattern<'g> {
    fn graph(self) -> &'g HeapConfiguration {
        match self {
            Pattern::Original(rhs) => rhs,
            Pattern::Collapsed(collapsed) => collapsed.collapsed(),
        }
    }
}

/// Forward abstraction strategy.
#[derive(Debug, Clone, Copy)]
pub struct Canonicalizer<'a> {
    context: &'a AnalysisContext,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(context: &'a AnalysisContext) -> Self {
        Self { context }
    }

    /// Abstracts `heap` at a program point of kind `point`.
    ///
    /// Returns a single graph for backward confluent grammars, and possibly
    /// several otherwise, but never none. A graph no rule applies to is
    /// returned unchanged.
    pub fn canonicalize(&self, heap: &HeapConfiguration, point: ProgramPoint) -> Vec<HeapConfiguration> {
        let config = self.context.config();
        if point == ProgramPoint::UniqueSuccessor && config.ignore_unique_successor_points {
            return vec![heap.clone()];
        }

        let aggressive = heap.node_count() > config.aggressive_abstraction_threshold
            || (point == ProgramPoint::Return && config.aggressive_return_abstraction);
        let depth = if aggressive { 0 } else { config.min_dereference_depth };
        debug!(
            "canonicalize graph with {} nodes at {:?} (dereference depth {})",
            heap.node_count(),
            point,
            depth
        );
        let options = config.embedding_options(depth);

        let mut graph = RewriteGraph::default();
        graph.insert(self.canonicalize_stacks(heap.clone()));
        let mut worklist = vec![0];
        while let Some(current) = worklist.pop() {
            let mut fresh = Vec::new();
            for successor in self.rewrite(&graph.states[current], &options) {
                let (index, new) = graph.insert(self.canonicalize_stacks(successor));
                graph.successors[current].push(index);
                if new {
                    fresh.push(index);
                }
            }
            worklist.extend(fresh.into_iter().rev());
        }
        trace!("explored {} graphs", graph.states.len());

        let results = most_abstract(graph.into_normal_forms());
        debug!("canonicalization produced {} graphs", results.len());
        results
    }

    fn canonicalize_stacks(&self, heap: HeapConfiguration) -> HeapConfiguration {
        if !self.context.config().indexed {
            return heap;
        }
        StackCanonicalizer::new(self.context.stack_grammar(), self.context.null_guards()).canonicalize(&heap)
    }

    /// All graphs obtained by one rewrite step, or only the first one for confluent grammars.
    fn rewrite(&self, heap: &HeapConfiguration, options: &EmbeddingOptions) -> Vec<HeapConfiguration> {
        let config = self.context.config();
        let grammar = self.context.grammar();
        let first_only = config.backward_confluent;

        let mut successors = Vec::new();
        for lhs in grammar.left_hand_sides() {
            let originals = grammar.right_hand_sides(lhs).iter().map(Pattern::Original);
            let collapsed = grammar
                .collapsed_rules(lhs)
                .iter()
                .filter(|_| config.collapsed_rules)
                .map(Pattern::Collapsed);
            for pattern in originals.chain(collapsed) {
                for matching in heap.embeddings_of(pattern.graph(), options) {
                    let Some(successor) = self.replace(heap, lhs, pattern, &matching) else {
                        continue;
                    };
                    successors.push(successor);
                    if first_only {
                        return successors;
                    }
                }
            }
        }
        successors
    }

    /// Replaces one embedding by a hyperedge, or `None` if the index check fails.
    fn replace(
        &self,
        heap: &HeapConfiguration,
        lhs: &Nonterminal,
        pattern: Pattern<'_>,
        matching: &Matching,
    ) -> Option<HeapConfiguration> {
        let (target, label) = if self.context.config().indexed {
            match pattern {
                Pattern::Original(rhs) => self.check_indices(heap, rhs, matching, lhs)?,
                Pattern::Collapsed(collapsed) => {
                    self.check_indices(heap, collapsed.original(), &collapsed.lift(matching), lhs)?
                }
            }
        } else {
            (heap.clone(), lhs.clone())
        };

        trace!("replace embedding of {} by {}", pattern.graph(), label);
        let mut builder = target.into_builder();
        match pattern {
            Pattern::Original(rhs) => {
                builder.replace_matching(rhs, matching, label);
            }
            Pattern::Collapsed(collapsed) => {
                builder.replace_matching_with_collapsed_externals(
                    collapsed.collapsed(),
                    matching,
                    label,
                    collapsed.original_to_collapsed(),
                );
            }
        }
        Some(builder.build())
    }

    /// Unifies the stacks of all matched hyperedges.
    ///
    /// On success, returns the graph with materialized stacks and the label for
    /// the new hyperedge.
    fn check_indices(
        &self,
        heap: &HeapConfiguration,
        pattern: &HeapConfiguration,
        matching: &Matching,
        lhs: &Nonterminal,
    ) -> Option<(HeapConfiguration, Nonterminal)> {
        let matcher = self.context.matcher();
        let mut materializations: Vec<(IndexSymbol, Vec<IndexSymbol>)> = Vec::new();
        let mut instantiation: Vec<IndexSymbol> = Vec::new();

        for edge in pattern.edges() {
            let target_label = materialized(heap.label_of(matching.edge(edge)), &materializations);
            let pattern_label = instantiated(pattern.label_of(edge), &instantiation);
            let stack_match = matcher.match_stacks(&target_label, &pattern_label)?;

            if let Some(rule) = matcher.materialization_rule(&target_label, &pattern_label) {
                add_materialization(&mut materializations, &mut instantiation, rule);
            }
            if stack_match.needs_instantiation() {
                if instantiation.is_empty() {
                    instantiation = stack_match.instantiation().to_vec();
                } else if instantiation != stack_match.instantiation() {
                    trace!(
                        "conflicting instantiations {:?} and {:?}",
                        instantiation,
                        stack_match.instantiation()
                    );
                    return None;
                }
            }
        }

        let mut builder = heap.builder();
        for (symbol, postfix) in &materializations {
            builder.materialize_stacks(symbol, postfix);
        }
        let target = builder.build();

        let mut builder = pattern.builder();
        builder.instantiate_stacks(&instantiation);
        let pattern = builder.build();

        for edge in pattern.edges() {
            let expected = pattern.label_of(edge);
            let actual = target.label_of(matching.edge(edge));
            if !expected.has_same_label(actual) || expected.stack() != actual.stack() {
                return None;
            }
        }

        let label = match lhs.stack() {
            Some(stack) if stack.ends_with_variable() && !instantiation.is_empty() => {
                lhs.with_prolonged_stack(&instantiation)
            }
            _ => lhs.clone(),
        };
        Some((target, label))
    }
}

/// Applies the materialization for the abstract end of `label`, if any.
fn materialized(label: &Nonterminal, materializations: &[(IndexSymbol, Vec<IndexSymbol>)]) -> Nonterminal {
    let Some(stack) = label.stack() else {
        return label.clone();
    };
    match materializations.iter().find(|(symbol, _)| stack.ends_with(symbol)) {
        Some((_, postfix)) => label.with_prolonged_stack(postfix),
        None => label.clone(),
    }
}

fn instantiated(label: &Nonterminal, instantiation: &[IndexSymbol]) -> Nonterminal {
    match label.stack() {
        Some(stack) if stack.ends_with_variable() && !instantiation.is_empty() => {
            label.with_prolonged_stack(instantiation)
        }
        _ => label.clone(),
    }
}

/// Records `symbol -> postfix`, composing it with the materializations recorded so far.
fn add_materialization(
    materializations: &mut Vec<(IndexSymbol, Vec<IndexSymbol>)>,
    instantiation: &mut Vec<IndexSymbol>,
    (symbol, postfix): (IndexSymbol, Vec<IndexSymbol>),
) {
    for (_, existing) in materializations.iter_mut() {
        if existing.last() == Some(&symbol) {
            existing.pop();
            existing.extend_from_slice(&postfix);
        }
    }
    if !materializations.iter().any(|(s, _)| *s == symbol) {
        materializations.push((symbol.clone(), postfix.clone()));
    }
    if instantiation.last() == Some(&symbol) {
        instantiation.pop();
        instantiation.extend(postfix);
    }
}

/// Graphs reached during canonicalization, up to isomorphism, with their rewrite steps.
#[derive(Debug, Default)]
struct RewriteGraph {
    states: Vec<HeapConfiguration>,
    successors: Vec<Vec<usize>>,
}

impl RewriteGraph {
    /// Returns the index of `heap` and whether it was not known before.
    fn insert(&mut self, heap: HeapConfiguration) -> (usize, bool) {
        if let Some(index) = self.states.iter().position(|g| g.is_isomorphic_to(&heap)) {
            return (index, false);
        }
        self.states.push(heap);
        self.successors.push(Vec::new());
        (self.states.len() - 1, true)
    }

    /// Marks the states reachable from `start`, including `start` itself.
    fn reachable_from(&self, start: usize) -> Vec<bool> {
        let mut seen = vec![false; self.states.len()];
        let mut stack = vec![start];
        seen[start] = true;
        while let Some(i) = stack.pop() {
            for &j in &self.successors[i] {
                if !seen[j] {
                    seen[j] = true;
                    stack.push(j);
                }
            }
        }
        seen
    }

    /// One graph per set of mutually rewritable graphs that no rule leads out of.
    ///
    /// A graph without successors forms such a set on its own. Cyclic rules
    /// (`A -> B`, `B -> A`) form larger ones, represented by their first graph.
    fn into_normal_forms(self) -> Vec<HeapConfiguration> {
        let reach: Vec<Vec<bool>> = (0..self.states.len()).map(|i| self.reachable_from(i)).collect();
        let mut normal = Vec::new();
        for (i, state) in self.states.into_iter().enumerate() {
            let component = (0..reach.len()).filter(|&j| reach[i][j]);
            let mut closed = true;
            let mut first = true;
            for j in component {
                closed &= reach[j][i];
                first &= j >= i;
            }
            if closed && first {
                normal.push(state);
            }
        }
        normal
    }
}

/// Drops results that another result abstracts further: it has no more nodes,
/// no more selectors, and fewer of at least one.
fn most_abstract(results: Vec<HeapConfiguration>) -> Vec<HeapConfiguration> {
    let size = |h: &HeapConfiguration| (h.node_count(), h.selector_count());
    let dominated = |h: &HeapConfiguration| {
        let (nodes, selectors) = size(h);
        results.iter().any(|other| {
            let (n, s) = size(other);
            n <= nodes && s <= selectors && (n, s) != (nodes, selectors)
        })
    };
    let keep: Vec<bool> = results.iter().map(|h| !dominated(h)).collect();
    results
        .into_iter()
        .zip(keep)
        .filter_map(|(h, keep)| keep.then_some(h))
        .collect()
}
