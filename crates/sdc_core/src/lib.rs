//! The `sdc_core` crate integrates batches of stiff ODE systems (typically
//! chemical reaction networks) with an implicit spectral deferred correction
//! scheme, advancing every system of the batch in lock-step.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `ReactionSystem` (right-hand side and
//!   sparse Jacobian), `LinearSolver` (per-lane Newton solve).
//! - **Batched storage**: `VectorSet` and `SparseMatrix` keep one value per lane in
//!   structure-of-arrays layout.
//! - **Execution**: `Sequential` and rayon-backed `Threaded` contexts.
//! - **Integrator**: the `SdcIntegrator` state machine with its settings and per-lane status.
pub mod error;
pub mod exec;
pub mod integrator;
pub mod linear;
pub mod quadrature;
pub mod sparse;
pub mod systems;
pub mod traits;
pub mod vector;
pub mod vector_set;

pub use error::{SdcError, SdcResult};
pub use exec::{ExecutionContext, Sequential, Threaded};
pub use integrator::{BatchSummary, LaneCounters, LaneReport, SdcIntegrator, SdcSettings, SdcStatus, StepControl};
pub use quadrature::SdcOrder;
pub use traits::{LinearSolver, ReactionSystem, Scalar};
pub use vector_set::VectorSet;
