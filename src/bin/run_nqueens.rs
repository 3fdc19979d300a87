use clap::Parser;
use nqueens_bench::analysis::run_analysis;
use nqueens_bench::config::Config;
use nqueens_bench::error::SweepError;
use nqueens_bench::logging::init_logging;
use nqueens_bench::records::{coverage, RecordTable};
use nqueens_bench::report::{print_analysis, sweep_table};
use nqueens_bench::solver::{set_affinity, CommandSolver};
use nqueens_bench::sweep::SweepDriver;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "run_nqueens")]
#[command(about = "Run the N-Queens solver over every (N, algorithm, seed) and analyze the results")]
struct Args {
    /// Path to a TOML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Solver executable (overrides config)
    #[arg(long)]
    solver: Option<PathBuf>,

    /// Board sizes, comma-separated
    #[arg(long, value_delimiter = ',')]
    n_values: Option<Vec<u32>>,

    /// First seed (inclusive)
    #[arg(long)]
    seed_start: Option<i64>,

    /// Last seed (exclusive)
    #[arg(long)]
    seed_end: Option<i64>,

    /// Pass the debug flag to the solver
    #[arg(long)]
    debug: bool,

    /// Concurrent solver invocations
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Per-run timeout in seconds, 0 disables it
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// CPU core to pin the driver and its children to
    #[arg(long)]
    core_id: Option<usize>,

    /// Record store the solver appends to
    #[arg(long)]
    record_store: Option<PathBuf>,

    /// Directory for charts and derived files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Skip the analysis after the sweep
    #[arg(long)]
    no_analysis: bool,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also append log events to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level, args.log_file.as_deref()) {
        eprintln!("Error: cannot open log file: {}", e);
        std::process::exit(1);
    }

    let mut config = Config::load(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    apply_overrides(&mut config, &args);
    if let Err(e) = config.sweep.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Some(core_id) = config.sweep.core_id {
        match set_affinity(core_id) {
            Ok(()) => tracing::info!(core_id, "pinned to core"),
            Err(e) => tracing::warn!(core_id, error = %e, "could not pin to core"),
        }
    }

    let solver = match CommandSolver::new(&config.paths.solver, config.sweep.timeout()) {
        Ok(solver) => solver,
        Err(SweepError::SolverNotFound(path)) => {
            eprintln!("Error: Executable not found at {}", path.display());
            eprintln!("Please build the solver first or pass --solver.");
            std::process::exit(1);
        }
    };

    let grid = config.sweep.grid();
    let record_store = config.paths.record_store_path();
    let driver = SweepDriver::new(solver)
        .debug(config.sweep.debug)
        .workers(config.sweep.workers);
    let summary = driver.run(&grid, Some(&config.paths.sweep_log_path()));

    println!();
    sweep_table(&summary).printstd();

    if record_store.is_file() {
        match RecordTable::load(&record_store) {
            Ok(table) => {
                let cov = coverage(&grid, &table.records);
                if !cov.is_complete() {
                    tracing::warn!(
                        matched = cov.matched,
                        missing = cov.missing.len(),
                        outside_grid = cov.outside_grid,
                        duplicated = cov.duplicated.len(),
                        "record store does not match the grid one-to-one"
                    );
                    for spec in cov.missing.iter().take(10) {
                        tracing::warn!(n = spec.n_queens, algorithm = %spec.algorithm, seed = spec.seed, "no record for run");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not check record coverage"),
        }
    }

    if args.no_analysis {
        tracing::info!("analysis skipped");
    } else {
        println!("\nRunning analysis...");
        match run_analysis(&record_store, &config.output_dir(), config.analysis.reduced_k) {
            Ok(outcome) => print_analysis(&outcome.report, &outcome.artifacts),
            Err(e) => {
                tracing::error!(error = %e, "analysis failed");
                println!("Analysis skipped: {}", e);
            }
        }
    }

    println!("\nAll executions completed! Check `{}` and generated charts.", record_store.display());
}

fn apply_overrides(config: &mut Config, args: &Args) {
    let sweep = &mut config.sweep;
    if let Some(n_values) = &args.n_values {
        sweep.n_values = n_values.clone();
    }
    if let Some(start) = args.seed_start {
        sweep.seed_start = start;
    }
    if let Some(end) = args.seed_end {
        sweep.seed_end = end;
    }
    if args.debug {
        sweep.debug = true;
    }
    if let Some(workers) = args.workers {
        sweep.workers = workers;
    }
    if let Some(secs) = args.timeout_secs {
        sweep.timeout_secs = secs;
    }
    if args.core_id.is_some() {
        sweep.core_id = args.core_id;
    }

    let paths = &mut config.paths;
    if let Some(solver) = &args.solver {
        paths.solver = solver.clone();
    }
    if let Some(store) = &args.record_store {
        paths.record_store = Some(store.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.analysis.output_dir = Some(dir.clone());
    }
}
