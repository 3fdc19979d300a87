//! Sweep and analysis configuration, loaded from an optional TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::grid::{AlgorithmType, ParameterGrid};

/// Board sizes swept by default.
pub const DEFAULT_N_VALUES: [u32; 14] = [4, 6, 8, 10, 12, 14, 16, 18, 20, 24, 32, 50, 64, 80];

/// Default per-run timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Head/tail size of the reduced export.
pub const DEFAULT_REDUCED_K: usize = 5;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    #[serde(default = "default_n_values")]
    pub n_values: Vec<u32>,
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<AlgorithmType>,
    #[serde(default)]
    pub seed_start: i64,
    #[serde(default = "default_seed_end")]
    pub seed_end: i64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Zero disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub core_id: Option<usize>,
}

fn default_n_values() -> Vec<u32> {
    DEFAULT_N_VALUES.to_vec()
}
fn default_algorithms() -> Vec<AlgorithmType> {
    AlgorithmType::ALL.to_vec()
}
fn default_seed_end() -> i64 {
    100
}
fn default_workers() -> usize {
    1
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            n_values: default_n_values(),
            algorithms: default_algorithms(),
            seed_start: 0,
            seed_end: default_seed_end(),
            debug: false,
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            core_id: None,
        }
    }
}

impl SweepConfig {
    pub fn grid(&self) -> ParameterGrid {
        ParameterGrid::new(
            self.n_values.clone(),
            self.algorithms.clone(),
            self.seed_start..self.seed_end,
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(&n) = self.n_values.iter().find(|&&n| n == 0) {
            return Err(ConfigError::Invalid(format!("board size must be positive, got {}", n)));
        }
        if self.seed_end < self.seed_start {
            return Err(ConfigError::Invalid(format!(
                "seed range {}..{} is reversed",
                self.seed_start, self.seed_end
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_solver")]
    pub solver: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Shared CSV the solver appends to (default: `<data_dir>/summary.csv`).
    #[serde(default)]
    pub record_store: Option<PathBuf>,
    /// Per-run outcome ledger (default: `<data_dir>/sweep_log.csv`).
    #[serde(default)]
    pub sweep_log: Option<PathBuf>,
}

fn default_solver() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("bin/Release/net8.0/NQueensV1.exe")
    } else {
        PathBuf::from("bin/Release/net8.0/NQueensV1")
    }
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("Data")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            solver: default_solver(),
            data_dir: default_data_dir(),
            record_store: None,
            sweep_log: None,
        }
    }
}

impl PathsConfig {
    pub fn record_store_path(&self) -> PathBuf {
        self.record_store
            .clone()
            .unwrap_or_else(|| self.data_dir.join("summary.csv"))
    }

    pub fn sweep_log_path(&self) -> PathBuf {
        self.sweep_log
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sweep_log.csv"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_reduced_k")]
    pub reduced_k: usize,
    /// Where charts and derived files go (default: the data directory).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_reduced_k() -> usize {
    DEFAULT_REDUCED_K
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reduced_k: default_reduced_k(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Loads the config file if one is given; otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.analysis
            .output_dir
            .clone()
            .unwrap_or_else(|| self.paths.data_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_reference_sweep() {
        let config = Config::default();
        let grid = config.sweep.grid();
        assert_eq!(grid.n_values.len(), 14);
        assert_eq!(grid.algorithms, vec![AlgorithmType::Genetic, AlgorithmType::Tournament]);
        assert_eq!(grid.len(), 14 * 2 * 100);
        assert!(!config.sweep.debug);
        assert_eq!(config.paths.record_store_path(), PathBuf::from("Data/summary.csv"));
        assert_eq!(config.output_dir(), PathBuf::from("Data"));
        assert_eq!(config.analysis.reduced_k, 5);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = Config::parse(
            r#"
            [sweep]
            n_values = [4, 8]
            algorithms = ["Tournament"]
            seed_end = 3
            timeout_secs = 0

            [analysis]
            output_dir = "charts"
            "#,
        )
        .unwrap();

        assert_eq!(config.sweep.grid().len(), 2 * 3);
        assert_eq!(config.sweep.timeout(), None);
        assert_eq!(config.sweep.workers, 1);
        assert_eq!(config.output_dir(), PathBuf::from("charts"));
        assert_eq!(config.paths.solver, default_solver());
    }

    #[test]
    fn rejects_reversed_seed_range_and_zero_workers() {
        let mut sweep = SweepConfig::default();
        sweep.seed_start = 10;
        sweep.seed_end = 2;
        assert!(sweep.validate().is_err());

        let mut sweep = SweepConfig::default();
        sweep.workers = 0;
        assert!(sweep.validate().is_err());

        assert!(SweepConfig::default().validate().is_ok());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
