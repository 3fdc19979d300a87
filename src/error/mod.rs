use std::path::PathBuf;

/// Errors raised while loading the sweep/analysis configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by a single solver invocation. These never abort a sweep.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("failed to launch solver: {0}")]
    Launch(std::io::Error),

    #[error("failed while waiting for solver: {0}")]
    Wait(std::io::Error),
}

/// Errors that stop a sweep before any run is attempted.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Executable not found at {}", .0.display())]
    SolverNotFound(PathBuf),
}

/// Errors that stop the analysis pipeline before any artifact is produced.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("record store not found at {}", .0.display())]
    RecordStoreMissing(PathBuf),

    #[error("record store at {} contains no records", .0.display())]
    EmptyRecordStore(PathBuf),

    #[error("failed to read record store: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to produce one artifact. Collected per artifact, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("nothing to draw: {0}")]
    NoData(&'static str),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("json write failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
