use nalgebra_sparse::pattern::SparsityPatternFormatError;
use thiserror::Error;

/// Errors raised while configuring or seeding an integrator batch.
///
/// Integration failures are not errors: a lane that diverges or runs out of
/// steps ends in [`SdcStatus::Failed`](crate::integrator::SdcStatus::Failed).
#[derive(Debug, Error)]
pub enum SdcError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("batch must contain at least one lane")]
    EmptyBatch,

    #[error("system has zero dimension")]
    ZeroDimension,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("lane {lane} out of range for a batch of {lanes}")]
    LaneOutOfRange { lane: usize, lanes: usize },

    #[error("malformed CSR layout: {0}")]
    Layout(#[from] SparsityPatternFormatError),

    #[error("CSR layout is missing the diagonal entry of row {row}")]
    MissingDiagonal { row: usize },

    #[error("CSR layout declares {declared} entries but the system reports nnz = {reported}")]
    NonZeroMismatch { declared: usize, reported: usize },
}

pub type SdcResult<T> = std::result::Result<T, SdcError>;
