use clap::Parser;
use nqueens_bench::analysis::run_analysis;
use nqueens_bench::config::Config;
use nqueens_bench::logging::init_logging;
use nqueens_bench::report::print_analysis;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "analyze_nqueens")]
#[command(about = "Aggregate an N-Queens record store into charts, a reduced CSV and a JSON report")]
struct Args {
    /// Record store to analyze (default: <data_dir>/summary.csv)
    record_store: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Directory for charts and derived files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Rows kept from each end of the store in the reduced export
    #[arg(short = 'k', long)]
    reduced_k: Option<usize>,

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
    if let Some(dir) = args.output_dir {
        config.analysis.output_dir = Some(dir);
    }
    if let Some(k) = args.reduced_k {
        config.analysis.reduced_k = k;
    }

    let record_store = args
        .record_store
        .unwrap_or_else(|| config.paths.record_store_path());
    let output_dir = config.output_dir();

    match run_analysis(&record_store, &output_dir, config.analysis.reduced_k) {
        Ok(outcome) => {
            print_analysis(&outcome.report, &outcome.artifacts);
            let written = outcome.artifacts.iter().filter(|a| a.written()).count();
            println!(
                "\nWrote {}/{} artifacts to {}",
                written,
                outcome.artifacts.len(),
                output_dir.display()
            );
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
