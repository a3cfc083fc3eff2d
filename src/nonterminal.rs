//! Abstraction labels of nonterminal hyperedges.

use std::fmt;

use crate::stack::{IndexSymbol, Stack};

/// The label of a nonterminal hyperedge.
///
/// Two nonterminals with the same `label` always have the same rank; the
/// grammar and the heap builder both reject violations. In indexed mode a
/// nonterminal additionally carries a [`Stack`].
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Nonterminal {
    label: String,
    rank: usize,
    reduction_tentacles: Vec<bool>,
    stack: Option<Stack>,
}

impl Nonterminal {
    /// Creates a plain nonterminal without reduction tentacles.
    pub fn new(label: impl Into<String>, rank: usize) -> Self {
        Self {
            label: label.into(),
            rank,
            reduction_tentacles: vec![false; rank],
            stack: None,
        }
    }

    /// Creates a plain nonterminal whose rank is the number of given flags.
    pub fn with_reduction_tentacles(label: impl Into<String>, reduction_tentacles: Vec<bool>) -> Self {
        Self {
            label: label.into(),
            rank: reduction_tentacles.len(),
            reduction_tentacles,
            stack: None,
        }
    }

    /// Creates an indexed nonterminal.
    pub fn indexed(label: impl Into<String>, rank: usize, stack: impl Into<Stack>) -> Self {
        Self {
            label: label.into(),
            rank,
            reduction_tentacles: vec![false; rank],
            stack: Some(stack.into()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// # Panics
    ///
    /// Panics if `tentacle >= rank`.
    pub fn is_reduction_tentacle(&self, tentacle: usize) -> bool {
        assert!(
            tentacle < self.rank,
            "Tentacle {} out of range for nonterminal {} of rank {}",
            tentacle,
            self,
            self.rank
        );
        self.reduction_tentacles[tentacle]
    }

    pub fn reduction_tentacles(&self) -> &[bool] {
        &self.reduction_tentacles
    }

    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }

    pub fn is_indexed(&self) -> bool {
        self.stack.is_some()
    }

    /// Returns `true` if both nonterminals denote the same abstraction label,
    /// ignoring stacks and reduction flags.
    pub fn has_same_label(&self, other: &Nonterminal) -> bool {
        self.label == other.label && self.rank == other.rank
    }

    /// The same nonterminal with another stack.
    pub fn with_stack(&self, stack: Stack) -> Nonterminal {
        Nonterminal {
            stack: Some(stack),
            ..self.clone()
        }
    }

    /// Replaces the last stack symbol by `postfix`.
    ///
    /// # Panics
    ///
    /// Panics if the nonterminal is not indexed, or its stack cannot be prolonged.
    pub fn with_prolonged_stack(&self, postfix: &[IndexSymbol]) -> Nonterminal {
        let stack = self
            .stack
            .as_ref()
            .unwrap_or_else(|| panic!("Nonterminal {} carries no stack", self));
        self.with_stack(stack.with_replaced_last(postfix))
    }
}

impl fmt::Display for Nonterminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(stack) = &self.stack {
            write!(f, "{}", stack)?;
        }
        Ok(())
    }
}
