//! Stack-production grammars: how abstract index symbols expand.
//!
//! A production `X -> s X` rewrites the abstract symbol `X` at the end of a
//! stack into the sequence `s X`. The [default][StackGrammar::default] grammar is
//! the right-regular grammar
//!
//! ```text
//! X -> s X | Z
//! Y -> s Y | C
//! ```
//!
//! where `s` is a plain concrete symbol and `Z`, `C` are bottom symbols.
//! Read backwards, the same productions drive stack canonicalization.

use std::fmt;

use crate::stack::IndexSymbol;

/// A single production `lhs -> rhs` of a [`StackGrammar`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StackProduction {
    lhs: IndexSymbol,
    rhs: Vec<IndexSymbol>,
}

impl StackProduction {
    /// # Panics
    ///
    /// Panics if `lhs` is not abstract or `rhs` is empty.
    pub fn new(lhs: IndexSymbol, rhs: Vec<IndexSymbol>) -> Self {
        assert!(lhs.is_abstract(), "Stack production for non-abstract symbol {}", lhs);
        assert!(!rhs.is_empty(), "Stack production for {} has an empty right-hand side", lhs);
        Self { lhs, rhs }
    }

    pub fn lhs(&self) -> &IndexSymbol {
        &self.lhs
    }

    pub fn rhs(&self) -> &[IndexSymbol] {
        &self.rhs
    }

    /// Returns `true` if the right-hand side ends with the left-hand side again.
    pub fn is_recursive(&self) -> bool {
        self.rhs.last() == Some(&self.lhs)
    }
}

impl fmt::Display for StackProduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ->", self.lhs)?;
        for symbol in &self.rhs {
            write!(f, " {}", symbol)?;
        }
        Ok(())
    }
}

/// An ordered list of stack productions.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StackGrammar {
    productions: Vec<StackProduction>,
}

impl Default for StackGrammar {
    fn default() -> Self {
        let s = IndexSymbol::concrete("s");
        let x = IndexSymbol::abstract_symbol("X");
        let y = IndexSymbol::abstract_symbol("Y");
        StackGrammar::new(vec![
            StackProduction::new(x.clone(), vec![s.clone(), x.clone()]),
            StackProduction::new(x, vec![IndexSymbol::bottom("Z")]),
            StackProduction::new(y.clone(), vec![s, y.clone()]),
            StackProduction::new(y, vec![IndexSymbol::bottom("C")]),
        ])
    }
}

impl StackGrammar {
    pub fn new(productions: Vec<StackProduction>) -> Self {
        Self { productions }
    }

    pub fn productions(&self) -> &[StackProduction] {
        &self.productions
    }

    /// Productions rewriting `symbol`, in grammar order.
    pub fn productions_of(&self, symbol: &IndexSymbol) -> impl Iterator<Item = &StackProduction> + '_ {
        let symbol = symbol.clone();
        self.productions.iter().filter(move |p| *p.lhs() == symbol)
    }

    /// The right-hand side of the first production that rewrites `abstract_symbol`
    /// into a sequence starting with `desired`.
    ///
    /// Only this single candidate is ever considered; alternatives starting with
    /// the same symbol are ignored.
    pub fn production_for(&self, abstract_symbol: &IndexSymbol, desired: &IndexSymbol) -> Option<&[IndexSymbol]> {
        self.productions_of(abstract_symbol)
            .find(|p| p.rhs().first() == Some(desired))
            .map(StackProduction::rhs)
    }

    /// Bottom symbols that terminate the expansion of `abstract_symbol`.
    pub fn bottoms_of(&self, abstract_symbol: &IndexSymbol) -> Vec<&IndexSymbol> {
        self.productions_of(abstract_symbol)
            .filter(|p| !p.is_recursive())
            .filter_map(|p| p.rhs().last())
            .filter(|s| s.is_bottom())
            .collect()
    }

    /// Abstract symbols in order of first appearance.
    pub fn abstract_symbols(&self) -> Vec<&IndexSymbol> {
        let mut symbols: Vec<&IndexSymbol> = Vec::new();
        for production in &self.productions {
            if !symbols.contains(&production.lhs()) {
                symbols.push(production.lhs());
            }
        }
        symbols
    }

    /// Productions in the order they are undone by stack canonicalization:
    /// per abstract symbol, terminating productions before recursive ones.
    pub fn reversal_order(&self) -> Vec<&StackProduction> {
        let mut order = Vec::with_capacity(self.productions.len());
        for symbol in self.abstract_symbols() {
            order.extend(self.productions_of(symbol).filter(|p| !p.is_recursive()));
            order.extend(self.productions_of(symbol).filter(|p| p.is_recursive()));
        }
        order
    }
}
