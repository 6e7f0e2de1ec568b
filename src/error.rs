use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("File is empty: {}", .0.display())]
    EmptyContent(PathBuf),

    #[error("Environment setup failed: {0}")]
    EnvironmentSetupFailed(String),

    #[error("Simulator exited with code {0}")]
    NonZeroExit(i32),

    #[error("Incomplete results: expected {expected} sweep files, found {found}")]
    IncompleteResults { expected: u64, found: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run failed: {0}")]
    RunFailed(String),

    #[error("Invalid request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Duplicate sample {signal}@{time} in sweep {sweep}, seed {seed}")]
    DuplicateSample {
        sweep: u64,
        seed: u64,
        signal: String,
        time: Decimal,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Typed errors that callers match on. Everything else is wrapped into
    /// [`SimError::RunFailed`] at run boundaries.
    pub fn is_domain(&self) -> bool {
        !matches!(self, SimError::Io(_))
    }

    /// Wrap a non-domain error into `RunFailed`, leaving typed errors alone.
    pub fn into_run_failure(self) -> SimError {
        if self.is_domain() {
            self
        } else {
            SimError::RunFailed(self.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
