//! Capacitance extraction from geometry files
//!
//! Usage:
//!   cargo run --release --bin fastcap -- plates.geo
//!   cargo run --release --bin fastcap -- --list system.lst --order 3 --tol 1e-3
//!   cargo run --release --bin fastcap -- --help

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use fastcap::{CapacitanceResult, FastcapConfig, LoadOptions, Problem};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "fastcap")]
#[command(version = fastcap::VERSION)]
#[command(about = "Multipole-accelerated capacitance extraction", long_about = None)]
struct Args {
    /// Conductor geometry files, each loaded into its own group
    inputs: Vec<PathBuf>,

    /// List file naming conductor and dielectric surfaces
    #[arg(short, long)]
    list: Option<PathBuf>,

    /// JSON configuration file; command line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Expansion order (0 = automatic)
    #[arg(short, long)]
    order: Option<usize>,

    /// Partitioning depth (negative = automatic)
    #[arg(short, long, allow_hyphen_values = true)]
    depth: Option<i32>,

    /// Relative GMRES tolerance
    #[arg(short, long)]
    tol: Option<f64>,

    /// Global permittivity factor
    #[arg(short, long)]
    perm_factor: Option<f64>,

    /// Cap on GMRES iterations per conductor
    #[arg(long)]
    max_iterations: Option<usize>,

    /// GMRES restart length
    #[arg(long)]
    restart: Option<usize>,

    /// Panels per octree leaf
    #[arg(long)]
    leaf_capacity: Option<usize>,

    /// Multipole acceptance ratio
    #[arg(long)]
    separation_ratio: Option<f64>,

    /// Maximum size of a preconditioner block
    #[arg(long)]
    block_limit: Option<usize>,

    /// Comma separated conductor prefixes to skip
    #[arg(long, value_delimiter = ',')]
    skip: Option<Vec<String>>,

    /// Comma separated conductor prefixes to remove
    #[arg(long, value_delimiter = ',')]
    remove: Option<Vec<String>>,

    /// Disable the near-field block preconditioner
    #[arg(long)]
    no_precondition: bool,

    /// Report non-converged columns instead of failing
    #[arg(long)]
    allow_partial: bool,

    /// Write the result as JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct ColumnOutput {
    conductor: String,
    iterations: usize,
    residual: f64,
    converged: bool,
}

#[derive(Serialize)]
struct ResultOutput {
    version: &'static str,
    conductors: Vec<String>,
    capacitance: Vec<Vec<f64>>,
    panels: usize,
    expansion_order: usize,
    tree_depth: usize,
    columns: Vec<ColumnOutput>,
}

impl From<&CapacitanceResult> for ResultOutput {
    fn from(result: &CapacitanceResult) -> Self {
        Self {
            version: fastcap::VERSION,
            conductors: result.conductors().to_vec(),
            capacitance: result.to_rows(),
            panels: result.panel_count(),
            expansion_order: result.expansion_order(),
            tree_depth: result.tree_depth(),
            columns: result
                .reports()
                .iter()
                .map(|r| ColumnOutput {
                    conductor: r.conductor.clone(),
                    iterations: r.iterations,
                    residual: r.residual,
                    converged: r.converged,
                })
                .collect(),
        }
    }
}

fn build_config(args: &Args) -> anyhow::Result<FastcapConfig> {
    let mut config = match &args.config {
        Some(path) => FastcapConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => FastcapConfig::default(),
    };
    if let Some(order) = args.order {
        config = config.with_expansion_order(order)?;
    }
    if let Some(depth) = args.depth {
        config = config.with_partitioning_depth(depth);
    }
    if let Some(tol) = args.tol {
        config = config.with_iter_tol(tol)?;
    }
    if let Some(factor) = args.perm_factor {
        config = config.with_perm_factor(factor)?;
    }
    if let Some(max_iterations) = args.max_iterations {
        config = config.with_max_iterations(max_iterations)?;
    }
    if let Some(restart) = args.restart {
        config = config.with_restart(restart)?;
    }
    if let Some(capacity) = args.leaf_capacity {
        config = config.with_leaf_capacity(capacity)?;
    }
    if let Some(ratio) = args.separation_ratio {
        config = config.with_separation_ratio(ratio)?;
    }
    if let Some(limit) = args.block_limit {
        config = config.with_precond_block_limit(limit)?;
    }
    if args.skip.is_some() {
        config = config.with_skip_conductors(args.skip.clone())?;
    }
    if args.remove.is_some() {
        config = config.with_remove_conductors(args.remove.clone())?;
    }
    if args.no_precondition {
        config = config.with_precondition(false);
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = build_config(&args)?;
    if args.dump_config {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }
    if args.inputs.is_empty() && args.list.is_none() {
        bail!("no input: give geometry files or --list");
    }

    let mut problem = Problem::new();
    problem.set_config(config)?;

    if let Some(list) = &args.list {
        problem
            .load_list(list)
            .with_context(|| format!("loading list file {}", list.display()))?;
    }
    for input in &args.inputs {
        problem
            .load(input, &LoadOptions::default())
            .with_context(|| format!("loading geometry {}", input.display()))?;
    }
    log::info!(
        "fastcap {} ({}): {} panels, {} conductors",
        fastcap::VERSION,
        fastcap::GIT_HASH,
        problem.panel_count(),
        problem.conductors().len()
    );

    let result = if args.allow_partial {
        problem.solve_allow_partial()?
    } else {
        problem.solve()?
    };

    print!("{}", result.to_table());
    if !result.is_converged() {
        eprintln!("warning: some columns did not reach the requested tolerance");
    }

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&ResultOutput::from(&result))?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        log::info!("result written to {}", path.display());
    }

    Ok(())
}
