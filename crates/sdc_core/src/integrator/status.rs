//! Per-lane integration status and the transition rules between states.
//!
//! Everything here is a pure function of one lane's own registers, which is
//! what lets the integrator evaluate it for all lanes in lock-step.

use crate::traits::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdcStatus {
    StartTimestep,
    StartSDCIteration,
    StartNode,
    StartNewton,
    Completed,
    Failed,
}

impl SdcStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SdcStatus::Completed | SdcStatus::Failed)
    }

    /// True when the next `prepare` begins a fresh node (quadrature and guess).
    pub fn starts_node(self) -> bool {
        matches!(
            self,
            SdcStatus::StartTimestep | SdcStatus::StartSDCIteration | SdcStatus::StartNode
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SdcStatus::StartTimestep => "start-timestep",
            SdcStatus::StartSDCIteration => "start-sdc-iteration",
            SdcStatus::StartNode => "start-node",
            SdcStatus::StartNewton => "start-newton",
            SdcStatus::Completed => "completed",
            SdcStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SdcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress counters of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneCounters {
    /// Completed time steps.
    pub step: usize,
    /// Current correction sweep, `1..=order`.
    pub sdc: usize,
    /// Current node, `1..number_nodes`.
    pub node: usize,
    /// Newton iterations at the current node.
    pub newton: usize,
}

impl LaneCounters {
    pub const START: LaneCounters = LaneCounters {
        step: 0,
        sdc: 1,
        node: 1,
        newton: 0,
    };

    /// Counters after entering `status`. Terminal states freeze the counters.
    pub fn after(self, status: SdcStatus) -> LaneCounters {
        match status {
            SdcStatus::Completed | SdcStatus::Failed => self,
            SdcStatus::StartTimestep => LaneCounters {
                step: self.step + 1,
                ..LaneCounters::START
            },
            SdcStatus::StartSDCIteration => LaneCounters {
                sdc: self.sdc + 1,
                node: 1,
                newton: 0,
                ..self
            },
            SdcStatus::StartNode => LaneCounters {
                node: self.node + 1,
                newton: 0,
                ..self
            },
            SdcStatus::StartNewton => LaneCounters {
                newton: self.newton + 1,
                ..self
            },
        }
    }
}

/// Batch-wide limits consulted by the transition rule.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits<T: Scalar> {
    pub tolerance: T,
    pub maximum_newton: usize,
    pub fail_if_maximum_newton: bool,
    pub maximum_steps: usize,
    pub number_nodes: usize,
    pub sweeps: usize,
    pub time_target: T,
    pub small: T,
}

/// Status a lane moves to after a Newton update.
pub(crate) fn next_status<T: Scalar>(
    status: SdcStatus,
    counters: LaneCounters,
    newton_error: T,
    last_node_time: T,
    limits: &Limits<T>,
) -> SdcStatus {
    if status.is_terminal() {
        return status;
    }

    let newton_done = newton_error < limits.tolerance
        || (!limits.fail_if_maximum_newton && counters.newton == limits.maximum_newton);

    if newton_done {
        if counters.node < limits.number_nodes - 1 {
            return SdcStatus::StartNode;
        }
        if counters.sdc < limits.sweeps {
            return SdcStatus::StartSDCIteration;
        }
        let two = T::one() + T::one();
        if (last_node_time - limits.time_target).abs() < two * limits.small {
            SdcStatus::Completed
        } else if counters.step == limits.maximum_steps {
            SdcStatus::Failed
        } else {
            SdcStatus::StartTimestep
        }
    } else if counters.newton == limits.maximum_newton {
        SdcStatus::Failed
    } else {
        SdcStatus::StartNewton
    }
}
