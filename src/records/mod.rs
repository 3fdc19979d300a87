//! Loading the shared record store into typed [`RunRecord`]s.
//!
//! The store is written by the external solver, one row per run. Columns are
//! located by header name. Any cell that does not coerce to a number becomes
//! a missing value; the row itself is always kept.

use csv::ByteRecord;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AnalysisError;
use crate::grid::{AlgorithmType, ParameterGrid, RunSpec};

/// Every numeric column of the record store, in canonical order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    Id,
    NQueens,
    Seed,
    MutationRate,
    FinalMutationRate,
    Generations,
    PopulationSize,
    Complexity,
    ElapsedTimeSeconds,
    StagnationCount,
    StagnationMutationThresholdHigh,
    StagnationMutationThresholdLow,
    Intersections,
    Failures,
}

impl NumericField {
    pub const ALL: [NumericField; 14] = [
        NumericField::Id,
        NumericField::NQueens,
        NumericField::Seed,
        NumericField::MutationRate,
        NumericField::FinalMutationRate,
        NumericField::Generations,
        NumericField::PopulationSize,
        NumericField::Complexity,
        NumericField::ElapsedTimeSeconds,
        NumericField::StagnationCount,
        NumericField::StagnationMutationThresholdHigh,
        NumericField::StagnationMutationThresholdLow,
        NumericField::Intersections,
        NumericField::Failures,
    ];

    /// Column header in the record store.
    pub fn header(&self) -> &'static str {
        match self {
            NumericField::Id => "Id",
            NumericField::NQueens => "NQueens",
            NumericField::Seed => "Seed",
            NumericField::MutationRate => "MutationRate",
            NumericField::FinalMutationRate => "FinalMutationRate",
            NumericField::Generations => "Generations",
            NumericField::PopulationSize => "PopulationSize",
            NumericField::Complexity => "Complexity",
            NumericField::ElapsedTimeSeconds => "ElapsedTimeSeconds",
            NumericField::StagnationCount => "StagnationCount",
            NumericField::StagnationMutationThresholdHigh => "StagnationMutationThresholdHigh",
            NumericField::StagnationMutationThresholdLow => "StagnationMutationThresholdLow",
            NumericField::Intersections => "Intersections",
            NumericField::Failures => "Failures",
        }
    }

    /// Seed is an arbitrary label rather than a measured quantity.
    pub fn is_measurement(&self) -> bool {
        !matches!(self, NumericField::Seed)
    }
}

pub const ALGORITHM_TYPE_HEADER: &str = "AlgorithmType";

/// Parameters only the genetic algorithm reports.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GeneticParams {
    pub mutation_rate: Option<f64>,
    pub final_mutation_rate: Option<f64>,
    pub generations: Option<f64>,
    pub population_size: Option<f64>,
    pub stagnation_count: Option<f64>,
    pub stagnation_threshold_high: Option<f64>,
    pub stagnation_threshold_low: Option<f64>,
}

/// The algorithm that produced a record, with its algorithm-specific fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Algorithm {
    Genetic(GeneticParams),
    Tournament,
}

impl Algorithm {
    pub fn kind(&self) -> AlgorithmType {
        match self {
            Algorithm::Genetic(_) => AlgorithmType::Genetic,
            Algorithm::Tournament => AlgorithmType::Tournament,
        }
    }
}

/// One solver invocation's outcome. `None` marks a missing or unparseable cell.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RunRecord {
    pub id: Option<i64>,
    pub n_queens: Option<u32>,
    pub seed: Option<i64>,
    /// `None` when the label is missing or not a known algorithm.
    pub algorithm: Option<Algorithm>,
    pub complexity: Option<f64>,
    pub elapsed_time_seconds: Option<f64>,
    pub intersections: Option<f64>,
    pub failures: Option<f64>,
    /// Derived at load time: `intersections > 0`. `None` if intersections is missing.
    pub failure: Option<bool>,
}

impl RunRecord {
    pub fn algorithm_type(&self) -> Option<AlgorithmType> {
        self.algorithm.as_ref().map(Algorithm::kind)
    }

    /// A run is valid when its board has no constraint violations.
    pub fn is_valid(&self) -> bool {
        self.failure == Some(false)
    }

    pub fn genetic(&self) -> Option<&GeneticParams> {
        match &self.algorithm {
            Some(Algorithm::Genetic(params)) => Some(params),
            _ => None,
        }
    }

    /// Numeric view used by table-wide statistics. Genetic-only fields are
    /// missing for every other algorithm.
    pub fn value(&self, field: NumericField) -> Option<f64> {
        let genetic = self.genetic();
        match field {
            NumericField::Id => self.id.map(|v| v as f64),
            NumericField::NQueens => self.n_queens.map(f64::from),
            NumericField::Seed => self.seed.map(|v| v as f64),
            NumericField::MutationRate => genetic.and_then(|g| g.mutation_rate),
            NumericField::FinalMutationRate => genetic.and_then(|g| g.final_mutation_rate),
            NumericField::Generations => genetic.and_then(|g| g.generations),
            NumericField::PopulationSize => genetic.and_then(|g| g.population_size),
            NumericField::Complexity => self.complexity,
            NumericField::ElapsedTimeSeconds => self.elapsed_time_seconds,
            NumericField::StagnationCount => genetic.and_then(|g| g.stagnation_count),
            NumericField::StagnationMutationThresholdHigh => {
                genetic.and_then(|g| g.stagnation_threshold_high)
            }
            NumericField::StagnationMutationThresholdLow => {
                genetic.and_then(|g| g.stagnation_threshold_low)
            }
            NumericField::Intersections => self.intersections,
            NumericField::Failures => self.failures,
        }
    }

    pub fn run_spec(&self) -> Option<RunSpec> {
        Some(RunSpec {
            n_queens: self.n_queens?,
            algorithm: self.algorithm_type()?,
            seed: self.seed?,
        })
    }
}

/// Flat row in the record-store schema, as the solver writes it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RecordRow {
    pub id: Option<i64>,
    pub n_queens: Option<u32>,
    pub algorithm_type: Option<AlgorithmType>,
    pub seed: Option<i64>,
    pub mutation_rate: Option<f64>,
    pub final_mutation_rate: Option<f64>,
    pub generations: Option<f64>,
    pub population_size: Option<f64>,
    pub complexity: Option<f64>,
    pub elapsed_time_seconds: Option<f64>,
    pub stagnation_count: Option<f64>,
    pub stagnation_mutation_threshold_high: Option<f64>,
    pub stagnation_mutation_threshold_low: Option<f64>,
    pub intersections: Option<u64>,
    pub failures: Option<f64>,
}

/// Parses a numeric cell; blanks, text, NaN and infinities are missing.
pub fn coerce_f64(cell: Option<&str>) -> Option<f64> {
    let value = cell?.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Parses an integer cell, accepting integral floats such as `"12.0"`.
pub fn coerce_i64(cell: Option<&str>) -> Option<i64> {
    let cell = cell?.trim();
    if let Ok(value) = cell.parse::<i64>() {
        return Some(value);
    }
    let value = coerce_f64(Some(cell))?;
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

/// A cell as text; cells that are not valid UTF-8 count as missing.
fn text(row: &ByteRecord, pos: usize) -> Option<&str> {
    std::str::from_utf8(row.get(pos)?).ok()
}

/// Column positions resolved once from the header row.
#[derive(Debug, Clone, Default)]
struct ColumnIndex {
    numeric: FxHashMap<NumericField, usize>,
    algorithm: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &ByteRecord) -> Self {
        let mut index = ColumnIndex::default();
        for (pos, name) in headers.iter().enumerate() {
            let Ok(name) = std::str::from_utf8(name) else {
                continue;
            };
            let name = name.trim();
            if name == ALGORITHM_TYPE_HEADER {
                index.algorithm = Some(pos);
            } else if let Some(field) = NumericField::ALL.iter().find(|f| f.header() == name) {
                index.numeric.entry(*field).or_insert(pos);
            }
        }
        index
    }

    fn cell<'r>(&self, row: &'r ByteRecord, field: NumericField) -> Option<&'r str> {
        text(row, *self.numeric.get(&field)?)
    }

    fn parse(&self, row: &ByteRecord) -> RunRecord {
        let num = |field| coerce_f64(self.cell(row, field));
        let int = |field| coerce_i64(self.cell(row, field));

        let algorithm = self
            .algorithm
            .and_then(|pos| text(row, pos))
            .and_then(|label| label.parse::<AlgorithmType>().ok())
            .map(|kind| match kind {
                AlgorithmType::Genetic => Algorithm::Genetic(GeneticParams {
                    mutation_rate: num(NumericField::MutationRate),
                    final_mutation_rate: num(NumericField::FinalMutationRate),
                    generations: num(NumericField::Generations),
                    population_size: num(NumericField::PopulationSize),
                    stagnation_count: num(NumericField::StagnationCount),
                    stagnation_threshold_high: num(NumericField::StagnationMutationThresholdHigh),
                    stagnation_threshold_low: num(NumericField::StagnationMutationThresholdLow),
                }),
                AlgorithmType::Tournament => Algorithm::Tournament,
            });

        let intersections = num(NumericField::Intersections);

        RunRecord {
            id: int(NumericField::Id),
            n_queens: int(NumericField::NQueens)
                .filter(|v| *v > 0)
                .and_then(|v| u32::try_from(v).ok()),
            seed: int(NumericField::Seed),
            algorithm,
            complexity: num(NumericField::Complexity),
            elapsed_time_seconds: num(NumericField::ElapsedTimeSeconds),
            intersections,
            failures: num(NumericField::Failures),
            failure: intersections.map(|v| v > 0.0),
        }
    }
}

/// The loaded record store: typed records plus the raw cells they came from.
#[derive(Debug, Clone)]
pub struct RecordTable {
    /// Header and rows exactly as read, for the reduced export.
    pub headers: ByteRecord,
    pub rows: Vec<ByteRecord>,
    pub records: Vec<RunRecord>,
    /// Numeric fields that have a column in this store.
    pub present_fields: Vec<NumericField>,
}

impl RecordTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows whose algorithm label is missing or unknown.
    pub fn unlabelled(&self) -> usize {
        self.records.iter().filter(|r| r.algorithm.is_none()).count()
    }

    /// Parses a store from any reader; used directly by tests.
    pub fn from_reader<R: std::io::Read>(input: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(input);
        let headers = reader.byte_headers()?.clone();
        let index = ColumnIndex::from_headers(&headers);

        let mut rows = Vec::new();
        let mut records = Vec::new();
        for row in reader.byte_records() {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable row");
                    continue;
                }
            };
            records.push(index.parse(&row));
            rows.push(row);
        }

        let present_fields = NumericField::ALL
            .iter()
            .copied()
            .filter(|f| index.numeric.contains_key(f))
            .collect();

        Ok(Self {
            headers,
            rows,
            records,
            present_fields,
        })
    }

    /// Loads the record store. Missing or empty stores are fatal for analysis.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        if !path.is_file() {
            return Err(AnalysisError::RecordStoreMissing(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        if table.is_empty() {
            return Err(AnalysisError::EmptyRecordStore(path.to_path_buf()));
        }
        let unlabelled = table.unlabelled();
        if unlabelled > 0 {
            tracing::warn!(unlabelled, "records without a known AlgorithmType are left out of per-algorithm groups");
        }
        tracing::info!(records = table.len(), path = %path.display(), "loaded record store");
        Ok(table)
    }
}

/// How well a record table covers the triples a grid requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    pub matched: usize,
    /// Requested triples with no record, in grid order.
    pub missing: Vec<RunSpec>,
    /// Records whose triple is not in the grid or cannot be determined.
    pub outside_grid: usize,
    /// Triples that have more than one record.
    pub duplicated: Vec<RunSpec>,
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.outside_grid == 0 && self.duplicated.is_empty()
    }
}

pub fn coverage(grid: &ParameterGrid, records: &[RunRecord]) -> Coverage {
    let requested: FxHashSet<RunSpec> = grid.iter().collect();
    let mut seen: FxHashMap<RunSpec, usize> = FxHashMap::default();
    let mut outside_grid = 0;

    for spec in records.iter().map(RunRecord::run_spec) {
        match spec {
            Some(spec) if requested.contains(&spec) => *seen.entry(spec).or_default() += 1,
            _ => outside_grid += 1,
        }
    }

    let mut result = Coverage {
        outside_grid,
        ..Default::default()
    };
    for spec in grid.iter() {
        match seen.get(&spec).copied().unwrap_or(0) {
            0 => result.missing.push(spec),
            1 => result.matched += 1,
            _ => {
                result.matched += 1;
                result.duplicated.push(spec);
            }
        }
    }
    result
}
