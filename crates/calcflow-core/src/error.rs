//! Error taxonomy shared by every layer.
//!
//! Configuration errors are returned to the immediate caller. Calculation and
//! processing errors are turned into validation entries and lifecycle
//! notifications by the coordinator.

use serde::Serialize;
use serde_json::Value;

/// Error type for calculation orchestration.
#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    /// An engine or tab reference could not be resolved, or inputs are malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// One or more engines failed during submission.
    #[error(transparent)]
    Calculation(#[from] CalculationError),

    /// A merge rule or downstream pass failed.
    #[error("{phase} failed: {message}")]
    Processing { phase: String, message: String },

    /// Network or protocol level failure outside a calculation.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CalcError {
    /// Build a processing error for the given phase.
    pub fn processing(phase: &str, message: impl Into<String>) -> Self {
        Self::Processing {
            phase: phase.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error must be surfaced as a hard failure.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Aggregate failure raised when any engine of a calculation fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unable to complete calculation(s): {} of the submitted engine(s) failed", failures.len())]
pub struct CalculationError {
    /// One record per failed engine, in registry order.
    pub failures: Vec<EngineFailure>,
}

impl CalculationError {
    #[must_use]
    pub fn new(failures: Vec<EngineFailure>) -> Self {
        Self { failures }
    }

    /// Names of the engines that failed.
    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.calc_engine.as_str())
    }
}

/// Diagnostic record for one failed engine submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineFailure {
    /// Engine name as submitted to the service.
    pub calc_engine: String,
    /// Human readable message.
    pub message: String,
    /// Detailed text (response body, inner exception).
    pub detail: Option<String>,
    /// Stack or trace listing, one frame per entry.
    pub stack_trace: Vec<String>,
    /// Request configuration that produced the failure.
    pub configuration: Value,
    /// Inputs that produced the failure.
    pub inputs: Value,
}
