use clap::Parser;

use mapset_rs::config::MapSetConfig;
use mapset_rs::manager::MapSetManager;
use mapset_rs::reference::MapSet;
use mapset_rs::visitor::MapSetVisitor;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Largest divisor and dividend (both range over `0..=max`).
    #[arg(value_name = "INT", default_value = "2")]
    max: i64,

    /// Unique table size (in bits, so the initial size is `2^bits` buckets).
    #[clap(long, value_name = "INT", default_value = "10")]
    bits: usize,

    /// Print the result as a Graphviz DOT graph.
    #[clap(long)]
    dot: bool,
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

    let config = MapSetConfig::default().with_bucket_bits(args.bits);
    let mgr = MapSetManager::<&str, i64>::with_config(0, config);
    println!("mgr = {:?}", mgr);

    // Search space: every (divisor, dividend) pair in 0..=max.
    let values: Vec<i64> = (0..=args.max).collect();
    let space = mgr.cartesian_product(MapSet::UNIT, &"divisor", &values);
    let space = mgr.cartesian_product(space, &"dividend", &values);
    println!("space: {} states in {} nodes", mgr.count(space), mgr.node_count(space));

    // quotient = dividend / divisor, skipping the division by zero.
    let mut visitor = MapSetVisitor::new(&mgr, space);
    let mut result = MapSet::EMPTY;
    while visitor.next() {
        let divisor = visitor.get(&"divisor");
        if divisor == 0 {
            log::debug!("divisor = 0: all dividends at once");
        } else {
            let dividend = visitor.get(&"dividend");
            visitor.put(&"quotient", dividend / divisor);
        }
        result = mgr.merge(result, visitor.current_subset());
    }

    println!(
        "Ran {} iterations for {} states",
        visitor.iterations(),
        mgr.count(space)
    );
    println!("result: {} states in {} nodes", mgr.count(result), mgr.node_count(result));
    for (dim, values) in mgr.dims_and_values(result) {
        println!("  {} ∈ {:?}", dim, values);
    }
    if mgr.count(result) <= num_bigint::BigUint::from(32u32) {
        for state in mgr.iter_states(result) {
            println!("  {:?}", state);
        }
    }

    if args.dot {
        println!("{}", mgr.to_dot(&[result])?);
    }

    let stats = mgr.merge_cache_stats();
    println!(
        "merge cache: {} entries, {} hits, {} misses",
        stats.entries, stats.hits, stats.misses
    );

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
