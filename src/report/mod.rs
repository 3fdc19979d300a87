use prettytable::{row, Table};

use crate::analysis::{AggregateReport, ArtifactOutcome};
use crate::charts::failure_rate_caption;
use crate::sweep::{RunStatus, SweepSummary};

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "n/a".to_string(),
    }
}

fn fmt_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

/// Per-algorithm summary: failure rate, elapsed distribution and valid-run mean.
pub fn algorithm_table(report: &AggregateReport) -> Table {
    let mut table = Table::new();
    table.add_row(row![
        "Algorithm",
        "Runs",
        "Failures",
        "Failure Rate",
        "Median Time (s)",
        "IQR (s)",
        "Valid Runs",
        "Avg Valid Time (s)"
    ]);

    for ((rate, elapsed), valid) in report
        .failure_rates
        .iter()
        .zip(&report.elapsed)
        .zip(&report.valid_elapsed)
    {
        let median = elapsed.stats.as_ref().map(|s| s.median);
        let iqr = elapsed.stats.as_ref().map(|s| s.q3 - s.q1);
        table.add_row(row![
            rate.algorithm.label(),
            rate.runs,
            format!("{}/{}", rate.failures, rate.judged),
            fmt_rate(rate.rate),
            fmt_opt(median, 4),
            fmt_opt(iqr, 4),
            valid.valid_runs,
            fmt_opt(valid.mean_elapsed, 4),
        ]);
    }
    table
}

/// Correlation matrix with two-decimal cells.
pub fn correlation_table(report: &AggregateReport) -> Table {
    let matrix = &report.correlation;
    let mut table = Table::new();

    let mut header = vec![prettytable::Cell::new("")];
    header.extend(matrix.fields.iter().map(|f| prettytable::Cell::new(f.header())));
    table.add_row(prettytable::Row::new(header));

    for (field, values) in matrix.fields.iter().zip(&matrix.values) {
        let mut cells = vec![prettytable::Cell::new(field.header())];
        cells.extend(values.iter().map(|v| prettytable::Cell::new(&fmt_opt(*v, 2))));
        table.add_row(prettytable::Row::new(cells));
    }
    table
}

pub fn print_analysis(report: &AggregateReport, artifacts: &[ArtifactOutcome]) {
    println!(
        "\nAnalyzed {} records ({} without a known algorithm)",
        report.records, report.unlabelled
    );
    algorithm_table(report).printstd();

    for valid in &report.valid_elapsed {
        println!("{}: {}", valid.algorithm, failure_rate_caption(valid.failure_rate));
    }
    if report.complexity.dropped > 0 {
        println!(
            "{} runs left out of the complexity chart (missing or non-positive complexity)",
            report.complexity.dropped
        );
    }

    println!("\nCorrelation Matrix (Seed excluded)");
    correlation_table(report).printstd();

    let mut table = Table::new();
    table.add_row(row!["Artifact", "Path", "Status"]);
    for outcome in artifacts {
        table.add_row(row![
            format!("{:?}", outcome.artifact),
            outcome.path.display(),
            outcome.error.as_deref().unwrap_or("written"),
        ]);
    }
    table.printstd();
}

/// Run counts per status at the end of a sweep.
pub fn sweep_table(summary: &SweepSummary) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Status", "Runs"]);
    table.add_row(row!["Succeeded", summary.count(|s| matches!(s, RunStatus::Succeeded))]);
    table.add_row(row!["Non-zero exit", summary.count(|s| matches!(s, RunStatus::Failed { .. }))]);
    table.add_row(row!["Timed out", summary.count(|s| matches!(s, RunStatus::TimedOut))]);
    table.add_row(row!["Launch failed", summary.count(|s| matches!(s, RunStatus::LaunchFailed(_)))]);
    table.add_row(row!["Panicked", summary.count(|s| matches!(s, RunStatus::Panicked(_)))]);
    table.add_row(row!["TOTAL", summary.attempted()]);
    if summary.ledger_rows_lost > 0 {
        table.add_row(row!["Missing from sweep log", summary.ledger_rows_lost]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordTable;

    #[test]
    fn tables_have_one_row_per_group_and_field() {
        let csv = "NQueens,AlgorithmType,Seed,ElapsedTimeSeconds,Intersections\n\
                   8,Genetic,0,1.0,0\n\
                   8,Genetic,1,2.0,1\n";
        let table = RecordTable::from_reader(csv.as_bytes()).unwrap();
        let report = AggregateReport::compute(&table, 5);

        let algorithms = algorithm_table(&report);
        assert_eq!(algorithms.len(), 3);
        let text = algorithms.to_string();
        assert!(text.contains("50.0%"));
        assert!(text.contains("n/a"));

        // NQueens, ElapsedTimeSeconds, Intersections plus the header row.
        assert_eq!(correlation_table(&report).len(), 4);
    }

    #[test]
    fn formats_missing_values_as_na() {
        assert_eq!(fmt_opt(None, 2), "n/a");
        assert_eq!(fmt_opt(Some(0.123456), 2), "0.12");
        assert_eq!(fmt_rate(Some(0.5)), "50.0%");
    }
}
