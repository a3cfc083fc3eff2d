//! Unification of nonterminal stacks.
//!
//! The [`IndexMatcher`] compares a *materializable* nonterminal `M` (taken from a
//! heap, its stack may end in an abstract symbol) with an *instantiable* one `I`
//! (a rule left-hand side, its stack may end in a variable). It computes the two
//! obligations that make both stacks equal:
//!
//! - a **materialization**: the sequence replacing the trailing abstract symbol of `M`,
//! - an **instantiation**: the sequence replacing the trailing variable of `I`.
//!
//! The stacks are walked position by position. Past the end of `M`, symbols are
//! read from the materialization built so far, shifted by one since its first
//! symbol replaces the last symbol of `M`. Past the end of `I`, the variable is
//! read. An abstract symbol of `M` against a concrete symbol of `I` is expanded
//! with the first fitting [stack production][StackGrammar::production_for],
//! replacing the last tentatively materialized symbol.
//!
//! Results, positive and negative, are memoized by value of the pair `(M, I)`.

use std::cell::RefCell;

use log::trace;

use crate::cache::Cache;
use crate::nonterminal::Nonterminal;
use crate::stack::{IndexSymbol, Stack};
use crate::stack_grammar::StackGrammar;

/// Obligations under which two stacks become equal.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct StackMatch {
    materialization: Vec<IndexSymbol>,
    instantiation: Vec<IndexSymbol>,
}

impl StackMatch {
    pub fn materialization(&self) -> &[IndexSymbol] {
        &self.materialization
    }

    pub fn instantiation(&self) -> &[IndexSymbol] {
        &self.instantiation
    }

    pub fn needs_materialization(&self) -> bool {
        !self.materialization.is_empty()
    }

    pub fn needs_instantiation(&self) -> bool {
        !self.instantiation.is_empty()
    }
}

/// Memoizing stack matcher.
#[derive(Debug)]
pub struct IndexMatcher {
    grammar: StackGrammar,
    cache: RefCell<Cache<(Nonterminal, Nonterminal), Option<StackMatch>>>,
}

impl IndexMatcher {
    pub fn new(grammar: StackGrammar) -> Self {
        Self {
            grammar,
            cache: RefCell::new(Cache::new()),
        }
    }

    pub fn stack_grammar(&self) -> &StackGrammar {
        &self.grammar
    }

    /// Unifies the stacks of `materializable` and `instantiable`.
    ///
    /// Returns `None` if no materialization and instantiation make them equal.
    pub fn match_stacks(&self, materializable: &Nonterminal, instantiable: &Nonterminal) -> Option<StackMatch> {
        let key = (materializable.clone(), instantiable.clone());
        if let Some(known) = self.cache.borrow_mut().get(&key) {
            return known.clone();
        }
        let result = unify(&self.grammar, materializable, instantiable);
        trace!(
            "match {} against {}: {:?}",
            materializable,
            instantiable,
            result
        );
        self.cache.borrow_mut().insert(key, result.clone());
        result
    }

    pub fn can_match(&self, materializable: &Nonterminal, instantiable: &Nonterminal) -> bool {
        self.match_stacks(materializable, instantiable).is_some()
    }

    pub fn needs_materialization(&self, materializable: &Nonterminal, instantiable: &Nonterminal) -> bool {
        self.match_stacks(materializable, instantiable)
            .is_some_and(|m| m.needs_materialization())
    }

    /// The abstract symbol at the end of `materializable` together with the
    /// sequence replacing it, if a materialization is needed.
    pub fn materialization_rule(
        &self,
        materializable: &Nonterminal,
        instantiable: &Nonterminal,
    ) -> Option<(IndexSymbol, Vec<IndexSymbol>)> {
        let result = self.match_stacks(materializable, instantiable)?;
        if !result.needs_materialization() {
            return None;
        }
        let symbol = materializable.stack()?.abstract_end()?.clone();
        Some((symbol, result.materialization))
    }

    pub fn needs_instantiation(&self, materializable: &Nonterminal, instantiable: &Nonterminal) -> bool {
        self.match_stacks(materializable, instantiable)
            .is_some_and(|m| m.needs_instantiation())
    }

    /// The sequence replacing the variable of `instantiable`; empty if none is needed or no match exists.
    pub fn necessary_instantiation(&self, materializable: &Nonterminal, instantiable: &Nonterminal) -> Vec<IndexSymbol> {
        self.match_stacks(materializable, instantiable)
            .map(|m| m.instantiation)
            .unwrap_or_default()
    }

    pub fn cache_hits(&self) -> usize {
        self.cache.borrow().hits()
    }

    pub fn cache_misses(&self) -> usize {
        self.cache.borrow().misses()
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }
}

fn symbols_of(nonterminal: &Nonterminal) -> &[IndexSymbol] {
    nonterminal.stack().map_or(&[][..], Stack::symbols)
}

fn unify(grammar: &StackGrammar, materializable: &Nonterminal, instantiable: &Nonterminal) -> Option<StackMatch> {
    if materializable.label() != instantiable.label() {
        return None;
    }
    let m = symbols_of(materializable);
    let i = symbols_of(instantiable);

    let mut result = StackMatch::default();
    for pos in 0..m.len().max(i.len()) {
        let s1 = match m.get(pos) {
            Some(symbol) => symbol.clone(),
            None => result.materialization.get(pos + 1 - m.len())?.clone(),
        };
        let s2 = i.get(pos).cloned().unwrap_or(IndexSymbol::Variable);

        match (&s1, &s2) {
            (IndexSymbol::Concrete { .. }, IndexSymbol::Concrete { .. }) if s1 != s2 => return None,
            (_, IndexSymbol::Variable) => result.instantiation.push(s1),
            (IndexSymbol::Abstract(_), IndexSymbol::Concrete { .. }) => {
                result.materialization.pop();
                let production = grammar.production_for(&s1, &s2)?;
                result.materialization.extend_from_slice(production);
            }
            _ => {}
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::stack_grammar::StackProduction;

    fn s() -> IndexSymbol {
        IndexSymbol::concrete("s")
    }
    fn x() -> IndexSymbol {
        IndexSymbol::abstract_symbol("X")
    }
    fn z() -> IndexSymbol {
        IndexSymbol::bottom("Z")
    }
    fn b(symbols: Vec<IndexSymbol>) -> Nonterminal {
        Nonterminal::indexed("B", 2, symbols)
    }

    #[test]
    fn test_materialize_with_single_production() {
        let grammar = StackGrammar::new(vec![StackProduction::new(x(), vec![s(), z()])]);
        let matcher = IndexMatcher::new(grammar);
        let m = b(vec![s(), x()]);
        let i = b(vec![s(), s(), z()]);

        assert!(matcher.can_match(&m, &i));
        assert!(matcher.needs_materialization(&m, &i));
        assert!(!matcher.needs_instantiation(&m, &i));
        assert_eq!(matcher.materialization_rule(&m, &i), Some((x(), vec![s(), z()])));
    }

    #[test]
    fn test_materialize_with_default_grammar() {
        let matcher = IndexMatcher::new(StackGrammar::default());
        let m = b(vec![s(), x()]);
        let i = b(vec![s(), s(), z()]);
        assert_eq!(matcher.materialization_rule(&m, &i), Some((x(), vec![s(), z()])));

        let deep = b(vec![s(), s(), s(), z()]);
        assert_eq!(matcher.materialization_rule(&m, &deep), Some((x(), vec![s(), s(), z()])));
    }

    #[test]
    fn test_instantiation() {
        let matcher = IndexMatcher::new(StackGrammar::default());
        let m = b(vec![s(), s(), x()]);
        let i = b(vec![s(), IndexSymbol::Variable]);

        assert!(matcher.can_match(&m, &i));
        assert!(!matcher.needs_materialization(&m, &i));
        assert_eq!(matcher.necessary_instantiation(&m, &i), vec![s(), x()]);
    }

    #[test]
    fn test_materialization_and_instantiation() {
        let matcher = IndexMatcher::new(StackGrammar::default());
        let m = b(vec![x()]);
        let i = b(vec![s(), IndexSymbol::Variable]);

        let result = matcher.match_stacks(&m, &i).unwrap();
        assert_eq!(result.materialization(), &[s(), x()]);
        assert_eq!(result.instantiation(), &[x()]);
    }

    #[test]
    fn test_mismatch() {
        let matcher = IndexMatcher::new(StackGrammar::default());
        assert!(!matcher.can_match(&b(vec![s(), z()]), &b(vec![z()])));
        assert!(!matcher.can_match(&b(vec![x()]), &b(vec![IndexSymbol::bottom("C")])));
        assert!(!matcher.needs_materialization(&b(vec![z()]), &b(vec![s(), z()])));
        assert!(matcher.necessary_instantiation(&b(vec![z()]), &b(vec![s(), z()])).is_empty());

        let other = Nonterminal::indexed("T", 2, vec![z()]);
        assert!(!matcher.can_match(&b(vec![z()]), &other));
    }

    #[test]
    fn test_concrete_stack_past_materialization() {
        let matcher = IndexMatcher::new(StackGrammar::default());
        assert!(!matcher.can_match(&b(vec![z()]), &b(vec![z(), IndexSymbol::Variable])));
    }

    #[test]
    fn test_memoization() {
        let matcher = IndexMatcher::new(StackGrammar::default());
        let m = b(vec![s(), x()]);
        let i = b(vec![s(), s(), z()]);
        matcher.can_match(&m, &i);
        matcher.needs_materialization(&m, &i);
        matcher.materialization_rule(&m, &i);
        assert_eq!(matcher.cache_misses(), 1);
        assert_eq!(matcher.cache_hits(), 2);

        matcher.clear_cache();
        matcher.can_match(&m, &i);
        assert_eq!(matcher.cache_misses(), 1);
    }

    /// Several productions start with `s`; only the first is tried, so the
    /// second stack below cannot be reached by materialization.
    #[test]
    fn test_single_production_candidate() {
        let t = IndexSymbol::concrete("t");
        let grammar = StackGrammar::new(vec![
            StackProduction::new(x(), vec![s(), z()]),
            StackProduction::new(x(), vec![s(), t.clone(), z()]),
        ]);
        let matcher = IndexMatcher::new(grammar);
        assert!(matcher.can_match(&b(vec![x()]), &b(vec![s(), z()])));
        assert!(!matcher.can_match(&b(vec![x()]), &b(vec![s(), t, z()])));
    }
}

#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use super::*;

    fn concrete_stack() -> impl Strategy<Value = Vec<IndexSymbol>> {
        (
            prop::collection::vec(prop::sample::select(vec!["s", "t"]), 0..5),
            prop::sample::select(vec!["Z", "C"]),
        )
            .prop_map(|(prefix, bottom)| {
                let mut symbols: Vec<IndexSymbol> = prefix.into_iter().map(IndexSymbol::concrete).collect();
                symbols.push(IndexSymbol::bottom(bottom));
                symbols
            })
    }

    fn heap_stack() -> impl Strategy<Value = Vec<IndexSymbol>> {
        (concrete_stack(), any::<bool>()).prop_map(|(mut symbols, abstract_end)| {
            if abstract_end {
                symbols.pop();
                symbols.push(IndexSymbol::abstract_symbol("X"));
            }
            symbols
        })
    }

    proptest! {
        #[test]
        fn concrete_stacks_match_iff_equal(m in concrete_stack(), i in concrete_stack()) {
            let matcher = IndexMatcher::new(StackGrammar::default());
            let expected = m == i;
            let m = Nonterminal::indexed("B", 2, m);
            let i = Nonterminal::indexed("B", 2, i);
            prop_assert_eq!(matcher.can_match(&m, &i), expected);
        }

        #[test]
        fn instantiation_restores_stack(symbols in heap_stack(), cut in 0usize..6) {
            let cut = cut % symbols.len();
            let mut prefix = symbols[..cut].to_vec();
            prefix.push(IndexSymbol::Variable);

            let matcher = IndexMatcher::new(StackGrammar::default());
            let m = Nonterminal::indexed("B", 2, symbols);
            let i = Nonterminal::indexed("B", 2, prefix);

            prop_assert!(matcher.can_match(&m, &i));
            prop_assert!(!matcher.needs_materialization(&m, &i));
            let instantiated = i.with_prolonged_stack(&matcher.necessary_instantiation(&m, &i));
            prop_assert_eq!(instantiated.stack(), m.stack());
        }
    }
}
