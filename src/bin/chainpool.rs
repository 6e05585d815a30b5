//! chainpool CLI — run the toy engine through the multi-chain orchestrator
//!
//! Commands:
//!   chainpool demo [config.json]   — single-chain and multi-chain runs
//!   chainpool init-config <path>   — write a default configuration file

use chainpool::state::ColumnSpec;
use chainpool::{
    AnalyzeOptions, ChainState, Chains, ClusterEngine, ColumnMetadata, DataTable, EngineConfig,
    InitializationMode, LatentState, PartitionState, RowMetadata, ToyEngine,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::env;
use std::process;
use std::sync::Arc;

const N_ROWS: usize = 60;
const N_COLS: usize = 6;
const N_CHAINS: usize = 3;
const N_SWEEPS: usize = 5;

fn print_usage() {
    println!(
        r#"
chainpool — seed-sequenced multi-chain dispatch

Usage: chainpool <command> [options]

Commands:
  demo        [config.json]     Run one chain, then {} chains, on synthetic data
  init-config <path>            Write a default configuration file
  help                          Show this message

Logging follows RUST_LOG (default: info).
"#,
        N_CHAINS
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let result = match args[1].as_str() {
        "demo" => cmd_demo(args.get(2).map(String::as_str)),
        "init-config" => cmd_init_config(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn cmd_init_config(args: &[String]) -> chainpool::Result<()> {
    let path = args
        .first()
        .ok_or_else(|| chainpool::ChainpoolError::Config("init-config needs a path".into()))?;
    EngineConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path);
    Ok(())
}

/// Two blocks of correlated columns plus one categorical column
fn synthetic_table(rng: &mut StdRng) -> chainpool::Result<(ColumnMetadata, RowMetadata, DataTable)> {
    let mut specs: Vec<ColumnSpec> = (0..N_COLS - 1)
        .map(|c| ColumnSpec::continuous(format!("x{}", c)))
        .collect();
    specs.push(ColumnSpec::categorical("group", &["a", "b", "c"]));

    let rows: Vec<Vec<f64>> = (0..N_ROWS)
        .map(|r| {
            let group = r % 3;
            let mut row: Vec<f64> = (0..N_COLS - 1)
                .map(|c| {
                    let centre = if c < 3 { group as f64 * 4.0 } else { -(group as f64) };
                    centre + rng.gen_range(-1.0..1.0)
                })
                .collect();
            row.push(group as f64);
            row
        })
        .collect();

    Ok((
        ColumnMetadata::new(specs),
        RowMetadata::numbered(N_ROWS),
        DataTable::from_rows(&rows)?,
    ))
}

fn summarize(latent: &LatentState, partition: &PartitionState) -> String {
    let state = ChainState::new(latent.clone(), partition.clone());
    format!(
        "{} view(s), clusters per view {:?}, fingerprint {}",
        latent.num_views(),
        state.clusters_per_view(),
        &state.fingerprint()[..12]
    )
}

fn print_chains(sweep: usize, latent: &Chains<LatentState>, partition: &Chains<PartitionState>) {
    for (i, (l, p)) in latent.iter().zip(partition.iter()).enumerate() {
        println!("  sweep {:>2} chain {}: {}", sweep, i, summarize(l, p));
    }
}

fn cmd_demo(config_path: Option<&str>) -> chainpool::Result<()> {
    let config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    println!("Configuration: {:?}", config);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (columns, rows, data) = synthetic_table(&mut rng)?;
    let mut engine = ClusterEngine::from_config(Arc::new(ToyEngine::default()), &config)?;
    let options = AnalyzeOptions::default();

    println!("\nStep 1: single chain");
    println!("{}", "-".repeat(60));
    let (mut latent, mut partition) =
        engine.initialize(&columns, &rows, &data, InitializationMode::FromThePrior, 1)?;
    print_chains(0, &latent, &partition);
    for sweep in 1..=N_SWEEPS {
        (latent, partition) = engine.analyze(&columns, &data, latent, partition, &options)?;
        print_chains(sweep, &latent, &partition);
    }

    println!("\nStep 2: {} chains", N_CHAINS);
    println!("{}", "-".repeat(60));
    let (mut latent, mut partition) =
        engine.initialize(&columns, &rows, &data, InitializationMode::FromThePrior, N_CHAINS)?;
    print_chains(0, &latent, &partition);
    for sweep in 1..=N_SWEEPS {
        (latent, partition) = engine.analyze(&columns, &data, latent, partition, &options)?;
        print_chains(sweep, &latent, &partition);
    }

    let stats = engine.pool_stats();
    println!(
        "\nDone: {} contexts pushed, {} tasks run, {} context bytes, next seed {:?}",
        stats.contexts_pushed,
        stats.tasks_run,
        stats.context_bytes,
        engine.seeds().peek()
    );
    Ok(())
}
