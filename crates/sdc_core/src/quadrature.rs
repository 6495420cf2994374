use crate::traits::{lit, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Formal order of the SDC scheme.
///
/// The order fixes the node count and the number of correction sweeps per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SdcOrder {
    /// Two nodes (step endpoints), trapezoid quadrature, two sweeps.
    Second,
    /// Three evenly spaced nodes, Simpson quadrature, four sweeps.
    #[default]
    Fourth,
}

impl SdcOrder {
    pub fn order(self) -> usize {
        match self {
            SdcOrder::Second => 2,
            SdcOrder::Fourth => 4,
        }
    }

    pub fn number_nodes(self) -> usize {
        match self {
            SdcOrder::Second => 2,
            SdcOrder::Fourth => 3,
        }
    }

    pub fn quadrature(self) -> QuadratureRule {
        match self {
            SdcOrder::Second => QuadratureRule::Trapezoid,
            SdcOrder::Fourth => QuadratureRule::Simpson,
        }
    }
}

impl fmt::Display for SdcOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {}", self.order())
    }
}

/// Node-to-node integration rule over evenly spaced nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadratureRule {
    Trapezoid,
    Simpson,
}

static TRAPEZOID: [[f64; 2]; 1] = [[1.0, 1.0]];
static SIMPSON: [[f64; 3]; 2] = [[5.0, 8.0, -1.0], [-1.0, 8.0, 5.0]];

impl QuadratureRule {
    fn denominator(self) -> f64 {
        match self {
            QuadratureRule::Trapezoid => 2.0,
            QuadratureRule::Simpson => 12.0,
        }
    }

    /// Weights (before division by the denominator) for the integral from
    /// node `node - 1` to node `node`.
    pub fn weights(self, node: usize) -> &'static [f64] {
        match self {
            QuadratureRule::Trapezoid => &TRAPEZOID[node - 1],
            QuadratureRule::Simpson => &SIMPSON[node - 1],
        }
    }

    /// Integral of the interpolant of `f` from node `node - 1` to node `node`.
    ///
    /// `spacing` is the distance between consecutive nodes and `f(k)` the
    /// integrand at node `k`.
    #[inline]
    pub fn node_integral<T: Scalar>(self, node: usize, spacing: T, f: impl Fn(usize) -> T) -> T {
        let sum = self
            .weights(node)
            .iter()
            .enumerate()
            .fold(T::zero(), |acc, (k, &w)| acc + lit::<T>(w) * f(k));
        spacing / lit(self.denominator()) * sum
    }
}
