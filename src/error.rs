//! Error types for the trading engine

use thiserror::Error;

/// Failures that abort a single tick.
///
/// Insufficient data never shows up here: indicators degrade to neutral
/// values and the risk gate degrades to a rejection instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("market data store error: {0}")]
    Store(String),

    #[error("market connector error: {0}")]
    Connector(String),

    #[error("invalid market data: {0}")]
    InvalidData(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
