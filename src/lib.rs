//! # hrg-rs: Heap abstraction with hyperedge replacement grammars
//!
//! **`hrg-rs`** is the abstraction core of a shape analysis.
//! It keeps symbolic heaps finite by folding concrete pointer structure into nonterminal hyperedges
//! (*canonicalization*) and unfolds that structure again when a program is about to dereference it
//! (*materialization*).
//!
//! ## Heaps as hypergraphs
//!
//! A [`HeapConfiguration`][crate::heap::HeapConfiguration] is a graph whose nodes are heap objects.
//! Selector edges (`next`, `left`, ...) are the concrete pointers; *nonterminal hyperedges* stand for
//! unbounded structure between the nodes they attach to, such as "a singly linked list from `a` to `b`".
//! Program variables are names bound to nodes. Graphs are immutable; all changes go through a
//! [`HeapBuilder`][crate::heap::HeapBuilder].
//!
//! A [`Grammar`][crate::grammar::Grammar] says what a nonterminal means: each rule `SLL -> rhs` lists a
//! graph the hyperedge may be replaced by.
//!
//! ## Key Features
//!
//! - **Lazy embedding search**: [`embeddings_of`][crate::embedding::embeddings_of] enumerates matches of a
//!   rule on demand, with the exactness and dereference-depth guards abstraction needs.
//! - **Canonicalization** folds every rule occurrence, deterministically for backward confluent grammars.
//! - **Materialization** unfolds exactly the hyperedges needed to satisfy a set of violation points.
//! - **Indexed grammars**: nonterminals may carry a stack of index symbols, unified by the
//!   [`IndexMatcher`][crate::matcher::IndexMatcher] and abstracted with a stack grammar.
//! - **Explicit context**: all memo tables live in an [`AnalysisContext`][crate::context::AnalysisContext];
//!   nothing is global.
//!
//! ## Basic Usage
//!
//! ```rust
//! use hrg_rs::canonicalization::ProgramPoint;
//! use hrg_rs::config::AbstractionConfig;
//! use hrg_rs::context::AnalysisContext;
//! use hrg_rs::grammar::Grammar;
//! use hrg_rs::heap::HeapBuilder;
//! use hrg_rs::materialization::ViolationPoints;
//! use hrg_rs::nonterminal::Nonterminal;
//! use hrg_rs::types::NodeType;
//!
//! let list = NodeType::new("List");
//! let sll = Nonterminal::new("SLL", 2);
//!
//! // SLL -> e0 -next-> e1
//! let mut base = HeapBuilder::new();
//! let e = base.add_nodes(list.clone(), 2);
//! base.add_selector(e[0], "next", e[1]);
//! base.set_external(e[0]).set_external(e[1]);
//!
//! // SLL -> e0 -next-> n, SLL(n, e1)
//! let mut step = HeapBuilder::new();
//! let e = step.add_nodes(list.clone(), 3);
//! step.add_selector(e[0], "next", e[1]);
//! step.add_nonterminal_edge(sll.clone(), vec![e[1], e[2]]);
//! step.set_external(e[0]).set_external(e[2]);
//!
//! let mut grammar = Grammar::builder();
//! grammar.add_rules(sll.clone(), [base.build(), step.build()]);
//! let context = AnalysisContext::new(grammar.build(), AbstractionConfig::default());
//!
//! // x -> a -next-> b -next-> c -next-> null
//! let mut heap = HeapBuilder::new();
//! let nodes = heap.add_nodes(list, 3);
//! let null = heap.add_node(NodeType::null());
//! heap.add_variable("x", nodes[0]).add_variable("null", null);
//! heap.add_selector(nodes[0], "next", nodes[1])
//!     .add_selector(nodes[1], "next", nodes[2])
//!     .add_selector(nodes[2], "next", null);
//! let heap = heap.build();
//!
//! // The node of `x` stays concrete, the rest of the list is folded.
//! let abstracted = context.canonicalize(&heap, ProgramPoint::Ordinary);
//! assert!(abstracted.iter().any(|h| h.node_count() == 3 && h.edge_count() == 1));
//!
//! // Before `x.next.next` is read, the list is unfolded again.
//! let points: ViolationPoints = [("x", "next")].into_iter().collect();
//! for h in &abstracted {
//!     for concrete in context.materialize(h, &points) {
//!         let x = concrete.variable_target("x").unwrap();
//!         assert!(concrete.has_selector(x, "next"));
//!     }
//! }
//! ```
//!
//! ## Core Components
//!
//! - **[`heap`]**: the graph model and its builder.
//! - **[`embedding`]**: subgraph matching and isomorphism.
//! - **[`grammar`]**: rule tables, collapsed rules and the selector-exposure index.
//! - **[`canonicalization`]** and **[`materialization`]**: the two abstraction strategies.
//! - **[`matcher`]**, **[`stack_grammar`]**, **[`stack_canonicalization`]**: the indexed extension.
//!
//! For the embedding constraints that make abstraction sound, check the [`embedding`] module documentation.

pub mod cache;
pub mod canonicalization;
pub mod config;
pub mod context;
pub mod embedding;
pub mod grammar;
pub mod heap;
pub mod materialization;
pub mod matcher;
pub mod nonterminal;
pub mod stack;
pub mod stack_canonicalization;
pub mod stack_grammar;
pub mod types;

#[cfg(test)]
mod fixtures;
