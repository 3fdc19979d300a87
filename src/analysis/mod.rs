//! Aggregate statistics over a loaded record table, and the artifacts
//! rendered from them.

use serde::Serialize;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::charts;
use crate::error::{AnalysisError, ArtifactError};
use crate::grid::AlgorithmType;
use crate::records::{NumericField, RecordTable, RunRecord};
use crate::stats::{self, BoxStats};

/// Failure statistics for one algorithm.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FailureRate {
    pub algorithm: AlgorithmType,
    pub runs: usize,
    /// Runs whose intersection count is known.
    pub judged: usize,
    pub failures: usize,
    /// Fraction of judged runs with `intersections > 0`; absent for an empty group.
    pub rate: Option<f64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ElapsedDistribution {
    pub algorithm: AlgorithmType,
    pub stats: Option<BoxStats>,
    /// Runs in the group without a usable elapsed time.
    pub missing: usize,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ComplexityPoint {
    pub algorithm: AlgorithmType,
    pub n_queens: u32,
    pub complexity: f64,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ComplexityScatter {
    pub points: Vec<ComplexityPoint>,
    /// Labelled runs left out: unknown size or complexity, or a complexity a
    /// log axis cannot place.
    pub dropped: usize,
}

impl ComplexityScatter {
    /// Bounds of the plotted values: `((n_min, n_max), (c_min, c_max))`.
    pub fn bounds(&self) -> Option<((u32, u32), (f64, f64))> {
        let first = self.points.first()?;
        let mut n = (first.n_queens, first.n_queens);
        let mut c = (first.complexity, first.complexity);
        for p in &self.points[1..] {
            n = (n.0.min(p.n_queens), n.1.max(p.n_queens));
            c = (c.0.min(p.complexity), c.1.max(p.complexity));
        }
        Some((n, c))
    }
}

/// Pairwise-complete Pearson correlations between measured fields.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub fields: Vec<NumericField>,
    /// Row-major, `values[i][j]` is the correlation of `fields[i]` and `fields[j]`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: NumericField, b: NumericField) -> Option<f64> {
        let i = self.fields.iter().position(|f| *f == a)?;
        let j = self.fields.iter().position(|f| *f == b)?;
        self.values[i][j]
    }
}

/// Mean elapsed time over valid runs, paired with the group's failure rate.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ValidElapsed {
    pub algorithm: AlgorithmType,
    pub valid_runs: usize,
    pub mean_elapsed: Option<f64>,
    pub failure_rate: Option<f64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AggregateReport {
    pub records: usize,
    pub unlabelled: usize,
    pub failure_rates: Vec<FailureRate>,
    pub elapsed: Vec<ElapsedDistribution>,
    pub complexity: ComplexityScatter,
    pub correlation: CorrelationMatrix,
    pub valid_elapsed: Vec<ValidElapsed>,
    /// Positions (in load order) of the rows in the reduced export.
    pub reduced_rows: Vec<usize>,
}

impl AggregateReport {
    pub fn compute(table: &RecordTable, reduced_k: usize) -> Self {
        let failure_rates = failure_rates(&table.records);
        let valid_elapsed = valid_elapsed(&table.records, &failure_rates);
        AggregateReport {
            records: table.len(),
            unlabelled: table.unlabelled(),
            elapsed: elapsed_distribution(&table.records),
            complexity: complexity_scatter(&table.records),
            correlation: correlation_matrix(&table.records, &table.present_fields),
            failure_rates,
            valid_elapsed,
            reduced_rows: reduced_indices(table.len(), reduced_k),
        }
    }

    pub fn failure_rate(&self, algorithm: AlgorithmType) -> Option<f64> {
        lookup_rate(&self.failure_rates, algorithm)
    }
}

fn group(records: &[RunRecord], algorithm: AlgorithmType) -> impl Iterator<Item = &RunRecord> {
    records
        .iter()
        .filter(move |r| r.algorithm_type() == Some(algorithm))
}

fn lookup_rate(rates: &[FailureRate], algorithm: AlgorithmType) -> Option<f64> {
    rates
        .iter()
        .find(|r| r.algorithm == algorithm)
        .and_then(|r| r.rate)
}

/// Failure rate per declared algorithm, including algorithms with no runs.
pub fn failure_rates(records: &[RunRecord]) -> Vec<FailureRate> {
    AlgorithmType::ALL
        .iter()
        .map(|&algorithm| {
            let mut runs = 0;
            let mut judged = 0;
            let mut failures = 0;
            for record in group(records, algorithm) {
                runs += 1;
                if let Some(failed) = record.failure {
                    judged += 1;
                    failures += failed as usize;
                }
            }
            FailureRate {
                algorithm,
                runs,
                judged,
                failures,
                rate: (judged > 0).then(|| failures as f64 / judged as f64),
            }
        })
        .collect()
}

pub fn elapsed_distribution(records: &[RunRecord]) -> Vec<ElapsedDistribution> {
    AlgorithmType::ALL
        .iter()
        .map(|&algorithm| {
            let mut values = Vec::new();
            let mut missing = 0;
            for record in group(records, algorithm) {
                match record.elapsed_time_seconds {
                    Some(v) => values.push(v),
                    None => missing += 1,
                }
            }
            ElapsedDistribution {
                algorithm,
                stats: BoxStats::from_values(&values),
                missing,
            }
        })
        .collect()
}

pub fn complexity_scatter(records: &[RunRecord]) -> ComplexityScatter {
    let mut scatter = ComplexityScatter::default();
    for record in records {
        let Some(algorithm) = record.algorithm_type() else {
            continue;
        };
        match (record.n_queens, record.complexity) {
            (Some(n_queens), Some(complexity)) if complexity > 0.0 => {
                scatter.points.push(ComplexityPoint {
                    algorithm,
                    n_queens,
                    complexity,
                })
            }
            _ => scatter.dropped += 1,
        }
    }
    scatter
}

/// Correlations over the measured fields present in the store; seed is excluded.
pub fn correlation_matrix(records: &[RunRecord], present: &[NumericField]) -> CorrelationMatrix {
    let fields: Vec<NumericField> = present
        .iter()
        .copied()
        .filter(NumericField::is_measurement)
        .collect();
    let columns: Vec<Vec<Option<f64>>> = fields
        .iter()
        .map(|&f| records.iter().map(|r| r.value(f)).collect())
        .collect();

    let values = columns
        .iter()
        .map(|xs| {
            columns
                .iter()
                .map(|ys| stats::pearson_pairwise(xs, ys))
                .collect()
        })
        .collect();

    CorrelationMatrix { fields, values }
}

/// Mean elapsed time of valid runs per algorithm, annotated with the failure
/// rate of the same group.
pub fn valid_elapsed(records: &[RunRecord], rates: &[FailureRate]) -> Vec<ValidElapsed> {
    AlgorithmType::ALL
        .iter()
        .map(|&algorithm| {
            let times: Vec<f64> = group(records, algorithm)
                .filter(|r| r.is_valid())
                .filter_map(|r| r.elapsed_time_seconds)
                .collect();
            ValidElapsed {
                algorithm,
                valid_runs: times.len(),
                mean_elapsed: stats::mean(&times),
                failure_rate: lookup_rate(rates, algorithm),
            }
        })
        .collect()
}

/// First `k` and last `k` row positions, without repeating rows when the
/// table has fewer than `2k` rows.
pub fn reduced_indices(len: usize, k: usize) -> Vec<usize> {
    if len <= 2 * k {
        return (0..len).collect();
    }
    (0..k).chain(len - k..len).collect()
}

/// The files produced by one analysis run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    ElapsedTimeComparison,
    TimeComplexityComparison,
    FailureRateComparison,
    CorrelationHeatmap,
    AvgElapsedTimeValid,
    ReducedExport,
    ReportJson,
}

impl Artifact {
    pub const ALL: [Artifact; 7] = [
        Artifact::ElapsedTimeComparison,
        Artifact::TimeComplexityComparison,
        Artifact::FailureRateComparison,
        Artifact::CorrelationHeatmap,
        Artifact::AvgElapsedTimeValid,
        Artifact::ReducedExport,
        Artifact::ReportJson,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::ElapsedTimeComparison => "elapsed_time_comparison.svg",
            Artifact::TimeComplexityComparison => "time_complexity_comparison.svg",
            Artifact::FailureRateComparison => "failure_rate_comparison.svg",
            Artifact::CorrelationHeatmap => "parameter_correlation_heatmap.svg",
            Artifact::AvgElapsedTimeValid => "avg_elapsed_time_valid.svg",
            Artifact::ReducedExport => "summaryReduced.csv",
            Artifact::ReportJson => "aggregate_report.json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactOutcome {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub error: Option<String>,
}

impl ArtifactOutcome {
    pub fn written(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: AggregateReport,
    pub artifacts: Vec<ArtifactOutcome>,
}

/// Loads the record store, computes the report and writes every artifact.
///
/// Only a missing or empty store (or an unusable output directory) is an
/// error; each artifact fails on its own and is reported in the outcome.
pub fn run_analysis(
    record_store: &Path,
    output_dir: &Path,
    reduced_k: usize,
) -> Result<AnalysisOutcome, AnalysisError> {
    let table = RecordTable::load(record_store)?;
    fs::create_dir_all(output_dir)?;

    let report = AggregateReport::compute(&table, reduced_k);
    let artifacts = write_artifacts(&table, &report, output_dir);
    Ok(AnalysisOutcome { report, artifacts })
}

pub fn write_artifacts(
    table: &RecordTable,
    report: &AggregateReport,
    output_dir: &Path,
) -> Vec<ArtifactOutcome> {
    Artifact::ALL
        .iter()
        .map(|&artifact| {
            let path = output_dir.join(artifact.file_name());
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                write_artifact(artifact, table, report, &path)
            }));
            let error = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };
            match &error {
                None => tracing::info!(path = %path.display(), "wrote artifact"),
                Some(e) => tracing::warn!(path = %path.display(), error = %e, "artifact skipped"),
            }
            ArtifactOutcome {
                artifact,
                path,
                error,
            }
        })
        .collect()
}

fn write_artifact(
    artifact: Artifact,
    table: &RecordTable,
    report: &AggregateReport,
    path: &Path,
) -> Result<(), ArtifactError> {
    match artifact {
        Artifact::ElapsedTimeComparison => charts::elapsed_time_boxplot(&report.elapsed, path),
        Artifact::TimeComplexityComparison => charts::complexity_scatter(&report.complexity, path),
        Artifact::FailureRateComparison => charts::failure_rate_bars(&report.failure_rates, path),
        Artifact::CorrelationHeatmap => charts::correlation_heatmap(&report.correlation, path),
        Artifact::AvgElapsedTimeValid => charts::valid_elapsed_bars(&report.valid_elapsed, path),
        Artifact::ReducedExport => write_reduced(table, &report.reduced_rows, path),
        Artifact::ReportJson => {
            let file = fs::File::create(path)?;
            serde_json::to_writer_pretty(file, report)?;
            Ok(())
        }
    }
}

/// Writes the selected rows with the store's own header and raw cells.
pub fn write_reduced(table: &RecordTable, rows: &[usize], path: &Path) -> Result<(), ArtifactError> {
    let mut out = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    out.write_byte_record(&table.headers)?;
    for &i in rows {
        if let Some(row) = table.rows.get(i) {
            out.write_byte_record(row)?;
        }
    }
    out.flush()?;
    Ok(())
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
