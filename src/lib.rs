pub mod analysis;
pub mod charts;
pub mod config;
pub mod error;
pub mod grid;
pub mod logging;
pub mod records;
pub mod report;
pub mod sink;
pub mod solver;
pub mod stats;
pub mod sweep;
