//! Abstraction of stacks.
//!
//! Before graph structure is folded in indexed mode, the stacks of all indexed
//! hyperedges are abstracted together by undoing stack productions: with the
//! default grammar `Z` becomes `X` and `s X` becomes `X` (and likewise for `C`
//! and `Y`). A production is undone only if it can be undone on *every* edge
//! that could be affected, so that the relation between neighbouring stacks
//! (e.g. a height difference of one) survives. Rounds repeat until nothing
//! changes.
//!
//! Stacks are left alone while a null-pointer guard holds: some node points to
//! the null node through a selector that terminating rules use for null.

use std::collections::BTreeSet;

use log::{debug, trace};

use crate::grammar::Grammar;
use crate::heap::{HeapBuilder, HeapConfiguration};
use crate::stack::Stack;
use crate::stack_grammar::{StackGrammar, StackProduction};
use crate::types::EdgeId;

/// Name of the variable bound to the null node.
pub const NULL_VARIABLE: &str = "null";

/// Selector labels that point to a null node in some right-hand side of a rule
/// whose left-hand side stack ends in a bottom symbol.
pub fn null_pointer_guards(grammar: &Grammar) -> BTreeSet<String> {
    let mut guards = BTreeSet::new();
    for (lhs, rhs) in grammar.rules() {
        let terminating = lhs
            .stack()
            .and_then(Stack::last)
            .is_some_and(|symbol| symbol.is_bottom());
        if !terminating {
            continue;
        }
        for node in rhs.nodes() {
            for (label, target) in rhs.selectors_of(node) {
                if rhs.node_type(target).is_constant() {
                    guards.insert(label.label().to_string());
                }
            }
        }
    }
    guards
}

/// Abstracts stacks of indexed hyperedges by reversing stack productions.
#[derive(Debug, Clone, Copy)]
pub struct StackCanonicalizer<'a> {
    grammar: &'a StackGrammar,
    null_guards: &'a BTreeSet<String>,
}

impl<'a> StackCanonicalizer<'a> {
    pub fn new(grammar: &'a StackGrammar, null_guards: &'a BTreeSet<String>) -> Self {
        Self { grammar, null_guards }
    }

    /// Returns `heap` with all stacks abstracted as far as possible.
    pub fn canonicalize(&self, heap: &HeapConfiguration) -> HeapConfiguration {
        if !self.is_allowed(heap) {
            debug!("stack abstraction blocked by a null-pointer guard");
            return heap.clone();
        }
        let order = self.grammar.reversal_order();
        let mut builder = heap.builder();
        loop {
            let mut applied = false;
            for production in &order {
                applied |= self.undo(&mut builder, production);
            }
            if !applied {
                break;
            }
        }
        builder.build()
    }

    fn is_allowed(&self, heap: &HeapConfiguration) -> bool {
        if self.null_guards.is_empty() {
            return true;
        }
        let Some(null) = heap.variable_target(NULL_VARIABLE) else {
            return true;
        };
        !heap
            .predecessors_of(null)
            .iter()
            .any(|(_, label)| self.null_guards.contains(label.label()))
    }

    /// Whether `production` may be undone given an edge with this stack.
    fn is_possible(&self, stack: &Stack, production: &StackProduction) -> bool {
        let Some(last) = stack.last() else {
            return true;
        };
        if production.is_recursive() {
            !self.grammar.bottoms_of(production.lhs()).contains(&last)
                && (last != production.lhs() || stack.ends_with_all(production.rhs()))
        } else {
            last != production.lhs()
        }
    }

    /// Undoes `production` on every applicable edge, unless some edge forbids it.
    fn undo(&self, builder: &mut HeapBuilder, production: &StackProduction) -> bool {
        let heap = builder.current();
        let mut updates: Vec<(EdgeId, Stack)> = Vec::new();
        for edge in heap.edges() {
            let Some(stack) = heap.label_of(edge).stack() else {
                continue;
            };
            if !self.is_possible(stack, production) {
                return false;
            }
            if !stack.is_empty() && stack.ends_with_all(production.rhs()) {
                let abstracted = stack.with_replaced_suffix(production.rhs().len(), production.lhs().clone());
                updates.push((edge, abstracted));
            }
        }
        if updates.is_empty() {
            return false;
        }
        trace!("undo {} on {} edges", production, updates.len());
        for (edge, stack) in updates {
            let label = builder.current().label_of(edge).with_stack(stack);
            builder.replace_nonterminal(edge, label);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::fixtures::*;
    use crate::heap::HeapBuilder;
    use crate::stack::IndexSymbol;
    use crate::types::NodeType;

    fn stacks(heap: &HeapConfiguration) -> Vec<String> {
        heap.edges().map(|e| heap.label_of(e).to_string()).collect()
    }

    fn chain(labels: Vec<crate::nonterminal::Nonterminal>) -> HeapConfiguration {
        let mut builder = HeapBuilder::new();
        let nodes = builder.add_nodes(list_type(), labels.len() + 1);
        for (i, label) in labels.into_iter().enumerate() {
            builder.add_nonterminal_edge(label, vec![nodes[i], nodes[i + 1]]);
        }
        builder.build()
    }

    #[test]
    fn test_abstracts_all_edges_together() {
        let heap = chain(vec![indexed_b(vec![s(), s(), z()]), indexed_b(vec![s(), z()])]);
        let grammar = StackGrammar::default();
        let guards = BTreeSet::new();
        let result = StackCanonicalizer::new(&grammar, &guards).canonicalize(&heap);
        assert_eq!(stacks(&result), vec!["B[s,X]", "B[X]"]);
    }

    #[test]
    fn test_mixed_ends_block_abstraction() {
        let heap = chain(vec![indexed_b(vec![s(), z()]), indexed_b(vec![s(), s(), x()])]);
        let grammar = StackGrammar::default();
        let guards = BTreeSet::new();
        let result = StackCanonicalizer::new(&grammar, &guards).canonicalize(&heap);
        assert_eq!(stacks(&result), vec!["B[s,Z]", "B[s,s,X]"]);
    }

    #[test]
    fn test_plain_edges_are_ignored() {
        let heap = chain(vec![sll(), indexed_b(vec![s(), IndexSymbol::bottom("C")])]);
        let grammar = StackGrammar::default();
        let guards = BTreeSet::new();
        let result = StackCanonicalizer::new(&grammar, &guards).canonicalize(&heap);
        assert_eq!(stacks(&result), vec!["SLL", "B[Y]"]);
    }

    #[test]
    fn test_null_pointer_guard() {
        let mut builder = chain(vec![indexed_b(vec![s(), z()])]).into_builder();
        let leaf = builder.add_node(list_type());
        let null = builder.add_node(NodeType::null());
        builder.add_selector(leaf, "left", null).add_variable(NULL_VARIABLE, null);
        let heap = builder.build();

        let grammar = StackGrammar::default();
        let guards: BTreeSet<String> = ["left".to_string()].into_iter().collect();
        let blocked = StackCanonicalizer::new(&grammar, &guards).canonicalize(&heap);
        assert_eq!(stacks(&blocked), vec!["B[s,Z]"]);

        let unguarded = BTreeSet::new();
        let result = StackCanonicalizer::new(&grammar, &unguarded).canonicalize(&heap);
        assert_eq!(stacks(&result), vec!["B[X]"]);
    }

    #[test]
    fn test_guards_from_grammar() {
        let mut rhs = HeapBuilder::new();
        let e0 = rhs.add_node(list_type());
        let e1 = rhs.add_node(NodeType::null());
        rhs.add_selector(e0, "left", e1).add_selector(e0, "right", e1);
        rhs.set_external(e0).set_external(e1);

        let mut builder = Grammar::builder();
        builder.add_rule(indexed_b(vec![z()]), rhs.build());
        builder.add_rule(indexed_b(vec![s(), IndexSymbol::Variable]), sll_base_rule());
        let guards = null_pointer_guards(&builder.build());
        assert_eq!(guards, ["left".to_string(), "right".to_string()].into_iter().collect());

        assert!(null_pointer_guards(&sll_grammar()).is_empty());
    }
}
