use thiserror::Error;

/// Errors surfaced by the factor-model pipeline.
///
/// Every variant indicates a logic or data-quality defect upstream rather
/// than a transient fault: errors are raised at the point of detection and
/// propagated to the caller unmodified, with no retries or degraded output.
#[derive(Debug, Error)]
pub enum CurveModelError {
    /// Too few observations for the requested computation (covariance
    /// estimation or a rolling window).
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The eigenvector matrix could not be inverted.
    #[error("eigenvector basis is singular and cannot be inverted")]
    SingularBasis,

    /// Score/basis column counts or date indices do not line up.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The eigen-solver returned a non-negligible imaginary component for a
    /// matrix that is real-symmetric by construction.
    #[error("numerical anomaly: {0}")]
    NumericalAnomaly(String),

    /// Filesystem failure while persisting or loading a model bundle.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted model bundle failed to encode, decode, or validate.
    #[error("model serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CurveModelError>;
