//! Graphs and grammars shared by the unit tests.

use crate::grammar::Grammar;
use crate::heap::{HeapBuilder, HeapConfiguration};
use crate::nonterminal::Nonterminal;
use crate::stack::IndexSymbol;
use crate::types::{NodeId, NodeType};

pub fn list_type() -> NodeType {
    NodeType::new("List")
}

pub fn sll() -> Nonterminal {
    Nonterminal::new("SLL", 2)
}

/// `SLL` whose second tentacle is a reduction tentacle, enabling the collapsed `[0, 0]` rules.
pub fn reducible_sll() -> Nonterminal {
    Nonterminal::with_reduction_tentacles("SLL", vec![false, true])
}

pub fn s() -> IndexSymbol {
    IndexSymbol::concrete("s")
}

pub fn z() -> IndexSymbol {
    IndexSymbol::bottom("Z")
}

pub fn x() -> IndexSymbol {
    IndexSymbol::abstract_symbol("X")
}

pub fn indexed_b(symbols: Vec<IndexSymbol>) -> Nonterminal {
    Nonterminal::indexed("B", 2, symbols)
}

/// A list of `n` nodes linked by `next`, ending in the null node.
///
/// Returns the graph and its nodes in list order; the last node is the null
/// node, bound to the variable `null`.
pub fn list(n: usize) -> (HeapConfiguration, Vec<NodeId>) {
    let mut builder = HeapBuilder::new();
    let mut nodes = builder.add_nodes(list_type(), n);
    let null = builder.add_node(NodeType::null());
    builder.add_variable("null", null);
    nodes.push(null);
    for pair in nodes.windows(2) {
        builder.add_selector(pair[0], "next", pair[1]);
    }
    (builder.build(), nodes)
}

/// `e0 -next-> e1`
pub fn sll_base_rule() -> HeapConfiguration {
    let mut builder = HeapBuilder::new();
    let e0 = builder.add_node(list_type());
    let e1 = builder.add_node(list_type());
    builder.add_selector(e0, "next", e1);
    builder.set_external(e0).set_external(e1);
    builder.build()
}

/// `e0 -next-> n`, `label(n, e1)`
pub fn recursive_rule(label: Nonterminal) -> HeapConfiguration {
    let mut builder = HeapBuilder::new();
    let e0 = builder.add_node(list_type());
    let n = builder.add_node(list_type());
    let e1 = builder.add_node(list_type());
    builder.add_selector(e0, "next", n);
    builder.add_nonterminal_edge(label, vec![n, e1]);
    builder.set_external(e0).set_external(e1);
    builder.build()
}

pub fn sll_recursive_rule() -> HeapConfiguration {
    recursive_rule(sll())
}

/// `SLL(e0, n)`, `SLL(n, e1)`
pub fn sll_concat_rule() -> HeapConfiguration {
    let mut builder = HeapBuilder::new();
    let e0 = builder.add_node(list_type());
    let n = builder.add_node(list_type());
    let e1 = builder.add_node(list_type());
    builder.add_nonterminal_edge(sll(), vec![e0, n]);
    builder.add_nonterminal_edge(sll(), vec![n, e1]);
    builder.set_external(e0).set_external(e1);
    builder.build()
}

/// Base and recursive rule.
pub fn sll_grammar() -> Grammar {
    let mut builder = Grammar::builder();
    builder.add_rules(sll(), [sll_base_rule(), sll_recursive_rule()]);
    builder.build()
}

/// Base, recursive and concatenation rule; backward confluent.
pub fn confluent_sll_grammar() -> Grammar {
    let mut builder = Grammar::builder();
    builder.add_rules(sll(), [sll_base_rule(), sll_recursive_rule(), sll_concat_rule()]);
    builder.build()
}

pub fn reducible_sll_grammar() -> Grammar {
    let mut builder = Grammar::builder();
    builder.add_rules(
        reducible_sll(),
        [sll_base_rule(), recursive_rule(reducible_sll())],
    );
    builder.build()
}

/// Lists whose length is the stack height:
/// `B[Z] -> e0 -next-> e1` and `B[s,()] -> e0 -next-> n, B[()](n, e1)`.
pub fn indexed_list_grammar() -> Grammar {
    let mut builder = Grammar::builder();
    builder.add_rule(indexed_b(vec![z()]), sll_base_rule());
    builder.add_rule(
        indexed_b(vec![s(), IndexSymbol::Variable]),
        recursive_rule(indexed_b(vec![IndexSymbol::Variable])),
    );
    builder.build()
}

/// Like [indexed_list_grammar], but the base rule ends in a null node, so
/// `next` becomes a null-pointer guard.
pub fn null_terminated_indexed_grammar() -> Grammar {
    let mut base = HeapBuilder::new();
    let e0 = base.add_node(list_type());
    let e1 = base.add_node(NodeType::null());
    base.add_selector(e0, "next", e1);
    base.set_external(e0).set_external(e1);

    let mut builder = Grammar::builder();
    builder.add_rule(indexed_b(vec![z()]), base.build());
    builder.add_rule(
        indexed_b(vec![s(), IndexSymbol::Variable]),
        recursive_rule(indexed_b(vec![IndexSymbol::Variable])),
    );
    builder.build()
}
