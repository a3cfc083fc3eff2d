use clap::Parser;

use hrg_rs::canonicalization::ProgramPoint;
use hrg_rs::config::AbstractionConfig;
use hrg_rs::context::AnalysisContext;
use hrg_rs::grammar::Grammar;
use hrg_rs::heap::{HeapBuilder, HeapConfiguration};
use hrg_rs::materialization::ViolationPoints;
use hrg_rs::nonterminal::Nonterminal;
use hrg_rs::stack::IndexSymbol;
use hrg_rs::types::NodeType;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Length of the list.
    #[arg(value_name = "INT", default_value = "4")]
    n: usize,

    /// Number of unfolding steps after abstraction.
    #[clap(long, value_name = "INT", default_value = "2")]
    steps: usize,
}

fn b(symbols: Vec<IndexSymbol>) -> Nonterminal {
    Nonterminal::indexed("B", 2, symbols)
}

/// `B[Z] -> e0 -next-> null`, `B[s,()] -> e0 -next-> n, B[()](n, e1)`
fn indexed_grammar() -> Grammar {
    let list = NodeType::new("List");
    let s = IndexSymbol::concrete("s");
    let z = IndexSymbol::bottom("Z");

    let mut base = HeapBuilder::new();
    let e0 = base.add_node(list.clone());
    let e1 = base.add_node(NodeType::null());
    base.add_selector(e0, "next", e1);
    base.set_external(e0).set_external(e1);

    let mut step = HeapBuilder::new();
    let e = step.add_nodes(list, 3);
    step.add_selector(e[0], "next", e[1]);
    step.add_nonterminal_edge(b(vec![IndexSymbol::Variable]), vec![e[1], e[2]]);
    step.set_external(e[0]).set_external(e[2]);

    let mut builder = Grammar::builder();
    builder.add_rule(b(vec![z]), base.build());
    builder.add_rule(b(vec![s, IndexSymbol::Variable]), step.build());
    builder.build()
}

fn list(n: usize) -> HeapConfiguration {
    let mut builder = HeapBuilder::new();
    let mut nodes = builder.add_nodes(NodeType::new("List"), n.max(1));
    let null = builder.add_node(NodeType::null());
    builder.add_variable("null", null).add_variable("x", nodes[0]);
    nodes.push(null);
    for pair in nodes.windows(2) {
        builder.add_selector(pair[0], "next", pair[1]);
    }
    builder.build()
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let config = AbstractionConfig {
        indexed: true,
        backward_confluent: true,
        ..AbstractionConfig::default()
    };
    let context = AnalysisContext::new(indexed_grammar(), config);
    println!("null-pointer guards: {:?}", context.null_guards());

    let heap = list(args.n);
    let mut states = context.canonicalize(&heap, ProgramPoint::Return);
    for h in &states {
        println!("abstract = {}", h);
    }

    let points: ViolationPoints = [("x", "next")].into_iter().collect();
    for step in 1..=args.steps {
        let mut next = Vec::new();
        for h in &states {
            for concrete in context.materialize(h, &points) {
                // Advance `x` by one node.
                let x = concrete.variable_target("x");
                let successor = x.and_then(|x| concrete.selector_target(x, "next"));
                let mut builder = concrete.into_builder();
                match successor {
                    Some(node) if !builder.current().node_type(node).is_constant() => {
                        builder.add_variable("x", node);
                    }
                    _ => continue,
                }
                next.push(builder.build());
            }
        }
        println!("step {}: {} states", step, next.len());
        for h in &next {
            println!("  {}", h);
        }
        states = next;
    }

    println!(
        "matcher cache: {} hits, {} misses",
        context.matcher().cache_hits(),
        context.matcher().cache_misses()
    );

    Ok(())
}
