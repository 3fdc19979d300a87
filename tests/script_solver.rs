//! Drives small shell-script solvers through the real process contract.
#![cfg(unix)]

use nqueens_bench::analysis::run_analysis;
use nqueens_bench::grid::{AlgorithmType, ParameterGrid};
use nqueens_bench::records::{coverage, RecordTable};
use nqueens_bench::solver::CommandSolver;
use nqueens_bench::sweep::{RunStatus, SweepDriver};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// Writing an executable while another thread forks can fail with ETXTBSY.
static SERIAL: Mutex<()> = Mutex::new(());

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn sweep_fills_record_store_and_feeds_analysis() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("summary.csv");
    fs::write(&store, "NQueens,AlgorithmType,Seed,ElapsedTimeSeconds,Intersections\n").unwrap();

    // Odd seeds leave one intersection, so every algorithm fails one run in three.
    let script = write_script(
        dir.path(),
        "solver.sh",
        &format!(
            "echo \"$1,$2,$3,0.$1$3,$(($3 % 2))\" >> '{}'\necho \"solved N=$1\"",
            store.display()
        ),
    );

    let grid = ParameterGrid::new(vec![4, 6], AlgorithmType::ALL.to_vec(), 0..3);
    let solver = CommandSolver::new(&script, Some(Duration::from_secs(30))).unwrap();
    let driver = SweepDriver::new(solver).workers(2).echo_output(false);
    let ledger = dir.path().join("sweep_log.csv");
    let summary = driver.run(&grid, Some(&ledger));

    assert_eq!(summary.attempted(), 12);
    assert_eq!(summary.succeeded(), 12);
    assert!(summary.outcomes.iter().all(|o| o.stdout.starts_with("solved N=")));
    assert_eq!(fs::read_to_string(&ledger).unwrap().lines().count(), 13);

    let table = RecordTable::load(&store).unwrap();
    assert!(coverage(&grid, &table.records).is_complete());

    let out = dir.path().join("charts");
    let outcome = run_analysis(&store, &out, 5).unwrap();
    let report = &outcome.report;
    assert_eq!(report.records, 12);
    for algorithm in AlgorithmType::ALL {
        let rate = report.failure_rate(algorithm).unwrap();
        assert!((rate - 1.0 / 3.0).abs() < 1e-9);
    }

    let reduced = fs::read_to_string(out.join("summaryReduced.csv")).unwrap();
    let mut lines = reduced.lines();
    assert_eq!(
        lines.next(),
        Some("NQueens,AlgorithmType,Seed,ElapsedTimeSeconds,Intersections")
    );
    assert_eq!(lines.count(), 10);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("aggregate_report.json")).unwrap()).unwrap();
    assert_eq!(json["records"], 12);
    assert_eq!(json["failure_rates"].as_array().unwrap().len(), 2);
}

#[test]
fn non_zero_exit_is_recorded_and_sweep_continues() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "flaky.sh",
        "if [ \"$3\" = \"1\" ]; then echo boom >&2; exit 3; fi\necho \"ok $4\"",
    );

    let grid = ParameterGrid::new(vec![8], vec![AlgorithmType::Genetic], 0..3);
    let solver = CommandSolver::new(&script, None).unwrap();
    let summary = SweepDriver::new(solver)
        .debug(true)
        .echo_output(false)
        .run(&grid, None);

    let statuses: Vec<RunStatus> = summary.outcomes.iter().map(|o| o.status.clone()).collect();
    assert_eq!(
        statuses,
        vec![
            RunStatus::Succeeded,
            RunStatus::Failed { exit_code: Some(3) },
            RunStatus::Succeeded,
        ]
    );
    assert_eq!(summary.outcomes[1].stderr.trim(), "boom");
    assert_eq!(summary.outcomes[2].stdout.trim(), "ok True");
}

#[test]
fn hung_solver_is_killed_at_the_timeout() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "hang.sh", "exec sleep 5");

    let grid = ParameterGrid::new(vec![4], vec![AlgorithmType::Tournament], 0..1);
    let solver = CommandSolver::new(&script, Some(Duration::from_millis(200))).unwrap();
    let started = Instant::now();
    let summary = SweepDriver::new(solver).echo_output(false).run(&grid, None);

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(summary.outcomes[0].status, RunStatus::TimedOut);
}

#[test]
fn timeout_also_stops_processes_the_solver_started() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    // No exec: the shell stays the direct child and `sleep` holds the pipes.
    let script = write_script(dir.path(), "launcher.sh", "echo starting\nsleep 6\necho done");

    let grid = ParameterGrid::new(vec![4], vec![AlgorithmType::Genetic], 0..2);
    let solver = CommandSolver::new(&script, Some(Duration::from_millis(200))).unwrap();
    let started = Instant::now();
    let summary = SweepDriver::new(solver).echo_output(false).run(&grid, None);

    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
    assert_eq!(summary.count(|s| *s == RunStatus::TimedOut), 2);
    assert!(summary.outcomes.iter().all(|o| o.stdout.contains("starting") && !o.stdout.contains("done")));
}

#[test]
fn analysis_rejects_missing_and_empty_stores() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");
    assert!(matches!(
        run_analysis(&missing, dir.path(), 5),
        Err(nqueens_bench::error::AnalysisError::RecordStoreMissing(_))
    ));

    let empty = dir.path().join("empty.csv");
    fs::write(&empty, "NQueens,AlgorithmType,Seed\n").unwrap();
    assert!(matches!(
        run_analysis(&empty, dir.path(), 5),
        Err(nqueens_bench::error::AnalysisError::EmptyRecordStore(_))
    ));
}
