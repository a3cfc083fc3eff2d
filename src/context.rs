//! The per-run analysis context.
//!
//! An [`AnalysisContext`] owns everything that lives as long as one analysis
//! run: the grammar, the stack grammar, the configuration and the memo tables
//! of the matcher and the violation point resolver. Strategies borrow it.
//!
//! The context uses interior mutability for its caches, so it is `Send` but not
//! `Sync`: parallel workers each need their own context.

use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::cache::Cache;
use crate::canonicalization::{Canonicalizer, ProgramPoint};
use crate::config::AbstractionConfig;
use crate::grammar::Grammar;
use crate::heap::HeapConfiguration;
use crate::materialization::{Materializer, ResolverCache, ViolationPoints};
use crate::matcher::IndexMatcher;
use crate::stack_canonicalization::null_pointer_guards;
use crate::stack_grammar::StackGrammar;

#[derive(Debug)]
pub struct AnalysisContext {
    config: AbstractionConfig,
    grammar: Grammar,
    matcher: IndexMatcher,
    null_guards: BTreeSet<String>,
    resolver_cache: RefCell<ResolverCache>,
}

impl AnalysisContext {
    /// Creates a context with the default stack grammar.
    pub fn new(grammar: Grammar, config: AbstractionConfig) -> Self {
        Self::with_stack_grammar(grammar, StackGrammar::default(), config)
    }

    pub fn with_stack_grammar(grammar: Grammar, stack_grammar: StackGrammar, config: AbstractionConfig) -> Self {
        let null_guards = null_pointer_guards(&grammar);
        Self {
            config,
            grammar,
            matcher: IndexMatcher::new(stack_grammar),
            null_guards,
            resolver_cache: RefCell::new(Cache::new()),
        }
    }

    pub fn config(&self) -> &AbstractionConfig {
        &self.config
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn matcher(&self) -> &IndexMatcher {
        &self.matcher
    }

    pub fn stack_grammar(&self) -> &StackGrammar {
        self.matcher.stack_grammar()
    }

    /// Selector labels that block stack canonicalization when they point to null.
    pub fn null_guards(&self) -> &BTreeSet<String> {
        &self.null_guards
    }

    pub(crate) fn resolver_cache(&self) -> &RefCell<ResolverCache> {
        &self.resolver_cache
    }

    pub fn canonicalizer(&self) -> Canonicalizer<'_> {
        Canonicalizer::new(self)
    }

    pub fn materializer(&self) -> Materializer<'_> {
        Materializer::new(self)
    }

    /// Abstracts `heap`; see [`Canonicalizer::canonicalize`].
    pub fn canonicalize(&self, heap: &HeapConfiguration, point: ProgramPoint) -> Vec<HeapConfiguration> {
        self.canonicalizer().canonicalize(heap, point)
    }

    /// Concretizes `heap`; see [`Materializer::materialize`].
    pub fn materialize(&self, heap: &HeapConfiguration, points: &ViolationPoints) -> Vec<HeapConfiguration> {
        self.materializer().materialize(heap, points)
    }

    /// Drops all memoized results.
    pub fn clear_caches(&self) {
        self.matcher.clear_cache();
        self.resolver_cache.borrow_mut().clear();
    }
}
