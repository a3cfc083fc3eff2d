//! Canonicalization and materialization benchmarks on singly linked lists.
//!
//! Run with:
//! ```bash
//! cargo bench --bench abstraction
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hrg_rs::canonicalization::ProgramPoint;
use hrg_rs::config::AbstractionConfig;
use hrg_rs::context::AnalysisContext;
use hrg_rs::grammar::Grammar;
use hrg_rs::heap::{HeapBuilder, HeapConfiguration};
use hrg_rs::materialization::ViolationPoints;
use hrg_rs::nonterminal::Nonterminal;
use hrg_rs::types::NodeType;

// ============================================================================
// Helpers
// ============================================================================

/// Base, recursive and concatenation rule for `SLL`.
fn sll_grammar() -> Grammar {
    let list = NodeType::new("List");
    let sll = Nonterminal::new("SLL", 2);

    let mut base = HeapBuilder::new();
    let e = base.add_nodes(list.clone(), 2);
    base.add_selector(e[0], "next", e[1]);
    base.set_external(e[0]).set_external(e[1]);

    let mut step = HeapBuilder::new();
    let e = step.add_nodes(list.clone(), 3);
    step.add_selector(e[0], "next", e[1]);
    step.add_nonterminal_edge(sll.clone(), vec![e[1], e[2]]);
    step.set_external(e[0]).set_external(e[2]);

    let mut concat = HeapBuilder::new();
    let e = concat.add_nodes(list, 3);
    concat.add_nonterminal_edge(sll.clone(), vec![e[0], e[1]]);
    concat.add_nonterminal_edge(sll.clone(), vec![e[1], e[2]]);
    concat.set_external(e[0]).set_external(e[2]);

    let mut builder = Grammar::builder();
    builder.add_rules(sll, [base.build(), step.build(), concat.build()]);
    builder.build()
}

fn list(n: usize) -> HeapConfiguration {
    let mut builder = HeapBuilder::new();
    let mut nodes = builder.add_nodes(NodeType::new("List"), n);
    let null = builder.add_node(NodeType::null());
    builder.add_variable("null", null).add_variable("x", nodes[0]);
    nodes.push(null);
    for pair in nodes.windows(2) {
        builder.add_selector(pair[0], "next", pair[1]);
    }
    builder.build()
}

fn context() -> AnalysisContext {
    let config = AbstractionConfig {
        backward_confluent: true,
        aggressive_abstraction_threshold: usize::MAX,
        ..AbstractionConfig::default()
    };
    AnalysisContext::new(sll_grammar(), config)
}

// ============================================================================
// Benchmark: canonicalization of lists of growing length
// ============================================================================

fn bench_canonicalize_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("abstraction/canonicalize");
    group.sample_size(20);

    let context = context();
    for n in [4, 8, 16, 32] {
        let heap = list(n);
        group.bench_with_input(BenchmarkId::new("list", n), &heap, |b, heap| {
            b.iter(|| context.canonicalize(heap, ProgramPoint::Ordinary));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: materialization after abstraction
// ============================================================================

fn bench_materialize_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("abstraction/materialize");

    let context = context();
    let points: ViolationPoints = [("x", "next")].into_iter().collect();
    for n in [4, 16] {
        let abstracted = context.canonicalize(&list(n), ProgramPoint::Return);
        group.bench_with_input(BenchmarkId::new("list", n), &abstracted, |b, abstracted| {
            b.iter(|| {
                abstracted
                    .iter()
                    .map(|h| context.materialize(h, &points).len())
                    .sum::<usize>()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_canonicalize_list, bench_materialize_list);

criterion_main!(benches);
