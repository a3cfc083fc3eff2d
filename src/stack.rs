//! Index symbols and the stacks attached to indexed nonterminals.
//!
//! A stack is read left to right; its last symbol decides what can happen to it:
//!
//! - a **bottom** concrete symbol terminates the stack, nothing can be expanded;
//! - an **abstract** symbol can be materialized into a concrete prefix followed by
//!   (possibly) the abstract symbol again, using a [`StackGrammar`][crate::stack_grammar::StackGrammar];
//! - a **variable** only appears on rule left-hand sides and is bound to a suffix
//!   during matching (instantiation).

use std::fmt;

/// One symbol of a nonterminal stack.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum IndexSymbol {
    /// A fixed terminal symbol. `bottom` marks a stack-terminating symbol.
    Concrete { name: String, bottom: bool },
    /// A placeholder expanded by the stack grammar.
    Abstract(String),
    /// Binds to any suffix. Only legal as the last symbol of a rule left-hand side.
    Variable,
}

impl IndexSymbol {
    /// A non-bottom concrete symbol.
    pub fn concrete(name: impl Into<String>) -> Self {
        IndexSymbol::Concrete {
            name: name.into(),
            bottom: false,
        }
    }

    /// A bottom (stack-terminating) concrete symbol.
    pub fn bottom(name: impl Into<String>) -> Self {
        IndexSymbol::Concrete {
            name: name.into(),
            bottom: true,
        }
    }

    pub fn abstract_symbol(name: impl Into<String>) -> Self {
        IndexSymbol::Abstract(name.into())
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, IndexSymbol::Concrete { bottom: true, .. })
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, IndexSymbol::Concrete { .. })
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, IndexSymbol::Abstract(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, IndexSymbol::Variable)
    }
}

impl fmt::Display for IndexSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSymbol::Concrete { name, .. } => write!(f, "{}", name),
            IndexSymbol::Abstract(name) => write!(f, "{}", name),
            IndexSymbol::Variable => write!(f, "()"),
        }
    }
}

/// An immutable sequence of index symbols.
///
/// # Invariants
///
/// - Variables, abstract symbols and bottom symbols only occur in the last position.
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Stack(Vec<IndexSymbol>);

impl Stack {
    /// Creates a stack from its symbols.
    ///
    /// # Panics
    ///
    /// Panics if a variable, abstract or bottom symbol occurs before the last position.
    pub fn new(symbols: Vec<IndexSymbol>) -> Self {
        if let Some((_, prefix)) = symbols.split_last() {
            for (i, symbol) in prefix.iter().enumerate() {
                assert!(
                    matches!(symbol, IndexSymbol::Concrete { bottom: false, .. }),
                    "Symbol {} at position {} of stack {:?} may only terminate a stack",
                    symbol,
                    i,
                    symbols
                );
            }
        }
        Stack(symbols)
    }

    pub fn empty() -> Self {
        Stack(Vec::new())
    }

    pub fn symbols(&self) -> &[IndexSymbol] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&IndexSymbol> {
        self.0.get(i)
    }

    pub fn last(&self) -> Option<&IndexSymbol> {
        self.0.last()
    }

    pub fn ends_with(&self, symbol: &IndexSymbol) -> bool {
        self.0.last() == Some(symbol)
    }

    /// Returns `true` if the stack ends with the given symbol sequence.
    pub fn ends_with_all(&self, suffix: &[IndexSymbol]) -> bool {
        self.0.ends_with(suffix)
    }

    /// Returns `true` if the stack is terminated by a bottom symbol.
    pub fn is_concrete(&self) -> bool {
        self.0.last().is_some_and(IndexSymbol::is_bottom)
    }

    pub fn ends_with_variable(&self) -> bool {
        self.0.last().is_some_and(IndexSymbol::is_variable)
    }

    /// Returns the trailing abstract symbol, if any.
    pub fn abstract_end(&self) -> Option<&IndexSymbol> {
        self.0.last().filter(|s| s.is_abstract())
    }

    /// Replaces the last symbol by `postfix`.
    ///
    /// This is both materialization (abstract end) and instantiation (variable end).
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty or ends with a concrete symbol.
    pub fn with_replaced_last(&self, postfix: &[IndexSymbol]) -> Stack {
        match self.0.last() {
            None => panic!("Cannot prolong an empty stack"),
            Some(last) => assert!(
                !last.is_concrete(),
                "Cannot prolong stack {} ending in concrete symbol {}",
                self,
                last
            ),
        }
        let mut symbols = self.0[..self.0.len() - 1].to_vec();
        symbols.extend_from_slice(postfix);
        Stack::new(symbols)
    }

    /// Drops the last `n` symbols and appends `symbol`.
    pub fn with_replaced_suffix(&self, n: usize, symbol: IndexSymbol) -> Stack {
        assert!(n <= self.0.len(), "Cannot drop {} symbols from stack {}", n, self);
        let mut symbols = self.0[..self.0.len() - n].to_vec();
        symbols.push(symbol);
        Stack::new(symbols)
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, symbol) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", symbol)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<IndexSymbol>> for Stack {
    fn from(symbols: Vec<IndexSymbol>) -> Self {
        Stack::new(symbols)
    }
}
