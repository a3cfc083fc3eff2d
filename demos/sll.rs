use clap::Parser;

use hrg_rs::canonicalization::ProgramPoint;
use hrg_rs::config::AbstractionConfig;
use hrg_rs::context::AnalysisContext;
use hrg_rs::grammar::Grammar;
use hrg_rs::heap::{HeapBuilder, HeapConfiguration};
use hrg_rs::materialization::ViolationPoints;
use hrg_rs::nonterminal::Nonterminal;
use hrg_rs::types::NodeType;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Length of the list.
    #[arg(value_name = "INT", default_value = "5")]
    n: usize,

    /// Minimal dereference depth.
    #[clap(long, value_name = "INT", default_value = "1")]
    depth: usize,

    /// Add the concatenation rule and treat the grammar as backward confluent.
    #[clap(long)]
    confluent: bool,

    /// Abstract as at a return point.
    #[clap(long)]
    at_return: bool,
}

fn sll_grammar(confluent: bool) -> Grammar {
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

    let mut builder = Grammar::builder();
    builder.add_rules(sll.clone(), [base.build(), step.build()]);
    if confluent {
        let mut concat = HeapBuilder::new();
        let e = concat.add_nodes(list, 3);
        concat.add_nonterminal_edge(sll.clone(), vec![e[0], e[1]]);
        concat.add_nonterminal_edge(sll.clone(), vec![e[1], e[2]]);
        concat.set_external(e[0]).set_external(e[2]);
        builder.add_rule(sll, concat.build());
    }
    builder.build()
}

/// `x -> n0 -next-> ... -next-> null`
fn list(n: usize) -> HeapConfiguration {
    let mut builder = HeapBuilder::new();
    let mut nodes = builder.add_nodes(NodeType::new("List"), n);
    let null = builder.add_node(NodeType::null());
    builder.add_variable("null", null);
    if let Some(&head) = nodes.first() {
        builder.add_variable("x", head);
    }
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

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let config = AbstractionConfig {
        min_dereference_depth: args.depth,
        backward_confluent: args.confluent,
        ..AbstractionConfig::default()
    };
    let context = AnalysisContext::new(sll_grammar(args.confluent), config);
    println!("grammar with {} rules", context.grammar().rule_count());

    let heap = list(args.n);
    println!("input = {}", heap);

    let point = if args.at_return {
        ProgramPoint::Return
    } else {
        ProgramPoint::Ordinary
    };
    let abstracted = context.canonicalize(&heap, point);
    println!("Canonicalization produced {} graphs:", abstracted.len());
    for h in &abstracted {
        println!("  {}", h);
    }

    let points: ViolationPoints = [("x", "next")].into_iter().collect();
    for h in &abstracted {
        let concrete = context.materialize(h, &points);
        println!("Materializing {} gives {} graphs:", h, concrete.len());
        for c in &concrete {
            println!("  {}", c);
        }
    }

    context.clear_caches();

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
