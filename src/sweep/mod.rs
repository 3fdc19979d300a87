//! Runs the solver once per grid triple and keeps going whatever happens to
//! an individual run.

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::thread;
use std::time::{Duration, Instant};

use crate::analysis::panic_message;
use crate::grid::{AlgorithmType, ParameterGrid, RunSpec};
use crate::sink::{CsvSink, SinkHandle};
use crate::solver::Solver;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
    LaunchFailed(String),
    Panicked(String),
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }

    fn label(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed { .. } => "failed",
            RunStatus::TimedOut => "timed_out",
            RunStatus::LaunchFailed(_) => "launch_failed",
            RunStatus::Panicked(_) => "panicked",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Position of the triple in grid order.
    pub index: usize,
    pub spec: RunSpec,
    pub status: RunStatus,
    pub wall_time: Duration,
    pub stdout: String,
    pub stderr: String,
}

/// One line of the sweep log.
#[derive(Serialize, Debug, Clone)]
pub struct LedgerRow {
    pub n_queens: u32,
    pub algorithm: AlgorithmType,
    pub seed: i64,
    pub status: &'static str,
    pub exit_code: Option<i32>,
    pub wall_seconds: f64,
    pub detail: String,
}

impl From<&RunOutcome> for LedgerRow {
    fn from(outcome: &RunOutcome) -> Self {
        let (exit_code, detail) = match &outcome.status {
            RunStatus::Failed { exit_code } => (*exit_code, String::new()),
            RunStatus::Succeeded => (Some(0), String::new()),
            RunStatus::LaunchFailed(msg) | RunStatus::Panicked(msg) => (None, msg.clone()),
            RunStatus::TimedOut => (None, String::new()),
        };
        LedgerRow {
            n_queens: outcome.spec.n_queens,
            algorithm: outcome.spec.algorithm,
            seed: outcome.spec.seed,
            status: outcome.status.label(),
            exit_code,
            wall_seconds: outcome.wall_time.as_secs_f64(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    /// One outcome per grid triple, in grid order.
    pub outcomes: Vec<RunOutcome>,
    /// Sweep log rows dropped because the log writer had stopped.
    pub ledger_rows_lost: usize,
}

impl SweepSummary {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(RunStatus::is_success)
    }

    pub fn count<F: Fn(&RunStatus) -> bool>(&self, pred: F) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| !o.status.is_success())
    }
}

/// Producer side of the sweep log, shared by every worker.
struct Ledger {
    handle: SinkHandle<LedgerRow>,
    lost: AtomicUsize,
}

impl Ledger {
    fn record(&self, outcome: &RunOutcome) {
        if self.handle.append(LedgerRow::from(outcome)) {
            return;
        }
        if self.lost.fetch_add(1, Ordering::Relaxed) == 0 {
            tracing::warn!(
                n = outcome.spec.n_queens,
                algorithm = %outcome.spec.algorithm,
                seed = outcome.spec.seed,
                "sweep log writer stopped; this and later runs are missing from the log"
            );
        }
    }
}

pub struct SweepDriver<S> {
    solver: S,
    debug: bool,
    workers: usize,
    echo_output: bool,
}

impl<S: Solver> SweepDriver<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            debug: false,
            workers: 1,
            echo_output: true,
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Print each run's captured output to stdout/stderr.
    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    /// Runs the whole grid, appending one line per run to the sweep log at
    /// `ledger` when given. Never fails: every triple is attempted exactly once.
    pub fn run(&self, grid: &ParameterGrid, ledger: Option<&Path>) -> SweepSummary {
        let sink = ledger.and_then(|path| match CsvSink::<LedgerRow>::open(path) {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "sweep log unavailable; continuing without it");
                None
            }
        });
        let ledger = sink.as_ref().and_then(CsvSink::handle).map(|handle| Ledger {
            handle,
            lost: AtomicUsize::new(0),
        });

        tracing::info!(runs = grid.len(), workers = self.workers, "starting sweep");
        let mut outcomes = if self.workers == 1 || grid.len() <= 1 {
            grid.iter()
                .enumerate()
                .map(|(index, spec)| self.execute(index, spec, ledger.as_ref()))
                .collect()
        } else {
            self.run_pooled(grid, ledger.as_ref())
        };
        outcomes.sort_by_key(|o: &RunOutcome| o.index);

        let ledger_rows_lost = ledger.map_or(0, |l| l.lost.into_inner());
        if let Some(sink) = sink {
            match sink.finish() {
                Ok(rows) => tracing::debug!(rows, "sweep log closed"),
                Err(e) => tracing::warn!(error = %e, "failed to finish sweep log"),
            }
        }

        SweepSummary {
            outcomes,
            ledger_rows_lost,
        }
    }

    /// `workers` threads pull grid indices from a shared cursor; the scope is
    /// the barrier that waits for every run.
    fn run_pooled(&self, grid: &ParameterGrid, ledger: Option<&Ledger>) -> Vec<RunOutcome> {
        let cursor = AtomicUsize::new(0);
        let (tx, rx) = channel();

        thread::scope(|scope| {
            for _ in 0..self.workers.min(grid.len()) {
                let tx = tx.clone();
                let cursor = &cursor;
                scope.spawn(move || loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(spec) = grid.get(index) else {
                        break;
                    };
                    if tx.send(self.execute(index, spec, ledger)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);
            rx.into_iter().collect()
        })
    }

    fn execute(&self, index: usize, spec: RunSpec, ledger: Option<&Ledger>) -> RunOutcome {
        if self.echo_output {
            println!("\nRunning N-Queens Solver: {}", spec);
        }
        tracing::debug!(n = spec.n_queens, algorithm = %spec.algorithm, seed = spec.seed, "run started");

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.solver.run(&spec, self.debug)));
        let wall_time = started.elapsed();

        let (status, stdout, stderr) = match result {
            Ok(Ok(output)) => {
                let status = if output.timed_out {
                    RunStatus::TimedOut
                } else if output.exit_code == Some(0) {
                    RunStatus::Succeeded
                } else {
                    RunStatus::Failed {
                        exit_code: output.exit_code,
                    }
                };
                (status, output.stdout, output.stderr)
            }
            Ok(Err(e)) => (RunStatus::LaunchFailed(e.to_string()), String::new(), String::new()),
            Err(payload) => (
                RunStatus::Panicked(panic_message(payload.as_ref())),
                String::new(),
                String::new(),
            ),
        };

        let outcome = RunOutcome {
            index,
            spec,
            status,
            wall_time,
            stdout,
            stderr,
        };
        self.report(&outcome);
        if let Some(ledger) = ledger {
            ledger.record(&outcome);
        }
        outcome
    }

    fn report(&self, outcome: &RunOutcome) {
        let spec = &outcome.spec;
        if self.echo_output {
            println!("{}", outcome.stdout);
            if !outcome.stderr.is_empty() {
                println!("Error: {}", outcome.stderr);
            }
        }
        if !outcome.stderr.is_empty() {
            tracing::warn!(n = spec.n_queens, algorithm = %spec.algorithm, seed = spec.seed, stderr = %outcome.stderr.trim_end(), "solver wrote to stderr");
        }
        match &outcome.status {
            RunStatus::Succeeded => {}
            RunStatus::Failed { exit_code } => {
                tracing::warn!(n = spec.n_queens, algorithm = %spec.algorithm, seed = spec.seed, exit_code = ?exit_code, "solver exited unsuccessfully")
            }
            RunStatus::TimedOut => {
                tracing::warn!(n = spec.n_queens, algorithm = %spec.algorithm, seed = spec.seed, wall_seconds = outcome.wall_time.as_secs_f64(), "solver timed out and was killed")
            }
            RunStatus::LaunchFailed(e) => {
                tracing::error!(n = spec.n_queens, algorithm = %spec.algorithm, seed = spec.seed, error = %e, "execution failed")
            }
            RunStatus::Panicked(e) => {
                tracing::error!(n = spec.n_queens, algorithm = %spec.algorithm, seed = spec.seed, error = %e, "solver panicked")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::solver::RunOutput;
    use std::sync::Mutex;

    /// Records every call; seed 1 fails to launch, seed 2 exits 3, N=8 seed 0 panics.
    #[derive(Default)]
    struct ScriptedSolver {
        calls: Mutex<Vec<RunSpec>>,
    }

    impl Solver for ScriptedSolver {
        fn run(&self, spec: &RunSpec, _debug: bool) -> Result<RunOutput, SolverError> {
            self.calls.lock().unwrap().push(*spec);
            match (spec.n_queens, spec.seed) {
                (8, 0) => panic!("solver blew up"),
                (_, 1) => Err(SolverError::Launch(std::io::Error::other("no such file"))),
                (_, 2) => Ok(RunOutput {
                    exit_code: Some(3),
                    stderr: "bad board".to_string(),
                    ..Default::default()
                }),
                _ => Ok(RunOutput {
                    exit_code: Some(0),
                    stdout: format!("solved {}", spec.n_queens),
                    ..Default::default()
                }),
            }
        }
    }

    fn grid() -> ParameterGrid {
        ParameterGrid::new(vec![4, 8], AlgorithmType::ALL.to_vec(), 0..4)
    }

    #[test]
    fn sequential_sweep_attempts_every_triple_in_order() {
        let driver = SweepDriver::new(ScriptedSolver::default()).echo_output(false);
        let summary = driver.run(&grid(), None);

        assert_eq!(summary.attempted(), grid().len());
        let calls = driver.solver.calls.lock().unwrap().clone();
        assert_eq!(calls, grid().iter().collect::<Vec<_>>());
        let order: Vec<RunSpec> = summary.outcomes.iter().map(|o| o.spec).collect();
        assert_eq!(order, calls);
    }

    #[test]
    fn failures_are_isolated_and_classified() {
        let driver = SweepDriver::new(ScriptedSolver::default()).echo_output(false);
        let summary = driver.run(&grid(), None);

        // 16 runs: seeds 1 and 2 fail everywhere, N=8 seed 0 panics for both algorithms.
        assert_eq!(summary.count(|s| matches!(s, RunStatus::LaunchFailed(_))), 4);
        assert_eq!(summary.count(|s| matches!(s, RunStatus::Failed { exit_code: Some(3) })), 4);
        assert_eq!(summary.count(|s| matches!(s, RunStatus::Panicked(_))), 2);
        assert_eq!(summary.succeeded(), 6);
        assert_eq!(summary.failures().count(), 10);

        let last = summary.outcomes.last().unwrap();
        assert_eq!(last.spec.seed, 3);
        assert_eq!(last.stdout, "solved 8");
    }

    #[test]
    fn pooled_sweep_matches_sequential_outcomes() {
        let driver = SweepDriver::new(ScriptedSolver::default())
            .workers(4)
            .echo_output(false);
        let summary = driver.run(&grid(), None);

        assert_eq!(summary.attempted(), 16);
        assert_eq!(driver.solver.calls.lock().unwrap().len(), 16);
        let order: Vec<RunSpec> = summary.outcomes.iter().map(|o| o.spec).collect();
        assert_eq!(order, grid().iter().collect::<Vec<_>>());
        assert!(summary.outcomes.iter().enumerate().all(|(i, o)| o.index == i));
        assert_eq!(summary.succeeded(), 6);
    }

    #[test]
    fn ledger_gets_one_row_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("logs").join("sweep_log.csv");
        let driver = SweepDriver::new(ScriptedSolver::default())
            .workers(3)
            .echo_output(false);
        driver.run(&grid(), Some(&ledger));

        let mut reader = csv::Reader::from_path(&ledger).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["n_queens", "algorithm", "seed", "status", "exit_code", "wall_seconds", "detail"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 16);
        assert_eq!(rows.iter().filter(|r| &r[3] == "panicked").count(), 2);
        assert!(rows
            .iter()
            .any(|r| &r[3] == "panicked" && r[6].contains("solver blew up")));
    }

    struct SlowSolver;

    impl Solver for SlowSolver {
        fn run(&self, _spec: &RunSpec, _debug: bool) -> Result<RunOutput, SolverError> {
            std::thread::sleep(Duration::from_millis(100));
            Ok(RunOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dead_ledger_writer_is_counted_not_fatal() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        // The first flush fails with ENOSPC and the writer thread exits.
        let grid = ParameterGrid::new(vec![4], vec![AlgorithmType::Genetic], 0..4);
        let summary = SweepDriver::new(SlowSolver)
            .echo_output(false)
            .run(&grid, Some(full));

        assert_eq!(summary.succeeded(), 4);
        assert_eq!(summary.ledger_rows_lost, 3);
    }

    #[test]
    fn healthy_ledger_loses_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let summary = SweepDriver::new(ScriptedSolver::default())
            .workers(2)
            .echo_output(false)
            .run(&grid(), Some(&dir.path().join("sweep_log.csv")));
        assert_eq!(summary.ledger_rows_lost, 0);
    }

    #[test]
    fn empty_grid_runs_nothing() {
        let driver = SweepDriver::new(ScriptedSolver::default()).echo_output(false);
        let summary = driver.run(&ParameterGrid::new(vec![], AlgorithmType::ALL.to_vec(), 0..3), None);
        assert_eq!(summary.attempted(), 0);
        assert!(driver.solver.calls.lock().unwrap().is_empty());
    }
}
