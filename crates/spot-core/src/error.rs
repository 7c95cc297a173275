use thiserror::Error;

use crate::side::Side;

/// Errors from calibration, streaming and persistence of SPOT detectors.
#[derive(Debug, Error)]
pub enum SpotError {
    #[error("insufficient calibration data: {0}")]
    InsufficientCalibrationData(String),

    #[error("degenerate variance: {count} identical peaks cannot be fitted by moments")]
    DegenerateVariance { count: usize },

    #[error("zero peak count on {side} side: extreme quantile is undefined")]
    ZeroPeakCount { side: Side },

    #[error("unsupported input shape: {0}")]
    UnsupportedInputShape(String),

    #[error("non-finite {side} threshold (gamma={gamma}, sigma={sigma})")]
    NonFiniteThreshold { side: Side, gamma: f64, sigma: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("detector has not been calibrated")]
    NotCalibrated,

    #[error("detector faulted and must be re-calibrated: {0}")]
    DetectorFaulted(String),

    #[error("no detector registered for metric: {0}")]
    UnknownMetric(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("corrupt detector state: {0}")]
    CorruptState(String),
}

impl SpotError {
    /// Whether this error invalidates the detector that produced it.
    ///
    /// Rejected input leaves the state untouched; numerical failures during an
    /// update may leave it half-applied.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SpotError::ZeroPeakCount { .. }
                | SpotError::DegenerateVariance { .. }
                | SpotError::NonFiniteThreshold { .. }
        )
    }
}

impl From<serde_json::Error> for SpotError {
    fn from(e: serde_json::Error) -> Self {
        SpotError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for SpotError {
    fn from(e: std::io::Error) -> Self {
        SpotError::Persistence(e.to_string())
    }
}

/// Convenience type alias for SPOT results.
pub type SpotResult<T> = Result<T, SpotError>;
