//! Error taxonomy for the federated learning subsystem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FederatedError {
    #[error("dimension mismatch: expected {expected}, got {actual}")] DimensionMismatch { expected: usize, actual: usize },
    #[error("unknown agent: {0}")] UnknownAgent(String),
    #[error("invalid configuration: {0}")] InvalidConfig(String),
    #[error("config source error: {0}")] Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, FederatedError>;

/// Fails with `DimensionMismatch` unless `actual == expected`.
pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual { return Err(FederatedError::DimensionMismatch { expected, actual }); }
    Ok(())
}
