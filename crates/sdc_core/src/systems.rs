//! Reference reaction networks.

use crate::traits::ReactionSystem;

/// Independent first-order decays, dy_i/dt = -k_i y_i.
#[derive(Debug, Clone)]
pub struct LinearDecay {
    pub rates: Vec<f64>,
}

impl LinearDecay {
    pub fn new(rates: Vec<f64>) -> Self {
        Self { rates }
    }

    /// Single-species decay with unit rate.
    pub fn unit() -> Self {
        Self::new(vec![1.0])
    }
}

impl ReactionSystem<f64> for LinearDecay {
    fn neqs(&self) -> usize {
        self.rates.len()
    }

    fn csr_col_index(&self) -> Vec<usize> {
        (0..self.rates.len()).collect()
    }

    fn csr_row_count(&self) -> Vec<usize> {
        (0..=self.rates.len()).collect()
    }

    fn evaluate(&self, _t: f64, y: &[f64], rate: &mut [f64]) {
        for i in 0..self.rates.len() {
            rate[i] = -self.rates[i] * y[i];
        }
    }

    fn evaluate_with_jacobian(&self, t: f64, y: &[f64], rate: &mut [f64], jacobian: &mut [f64]) {
        self.evaluate(t, y, rate);
        for i in 0..self.rates.len() {
            jacobian[i] = -self.rates[i];
        }
    }
}

/// Robertson's three-species chemical kinetics problem.
///
/// y0 -> y1 (k1), 2 y1 -> y1 + y2 (k2), y1 + y2 -> y0 + y2 (k3).
/// Total mass y0 + y1 + y2 is conserved.
#[derive(Debug, Clone, Copy)]
pub struct Robertson {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
}

impl Default for Robertson {
    fn default() -> Self {
        Self {
            k1: 0.04,
            k2: 3.0e7,
            k3: 1.0e4,
        }
    }
}

impl ReactionSystem<f64> for Robertson {
    fn neqs(&self) -> usize {
        3
    }

    fn csr_col_index(&self) -> Vec<usize> {
        vec![0, 1, 2, 0, 1, 2, 0, 1, 2]
    }

    fn csr_row_count(&self) -> Vec<usize> {
        vec![0, 3, 6, 9]
    }

    fn evaluate(&self, _t: f64, y: &[f64], rate: &mut [f64]) {
        let forward = self.k1 * y[0];
        let recombine = self.k3 * y[1] * y[2];
        let dimer = self.k2 * y[1] * y[1];
        rate[0] = -forward + recombine;
        rate[1] = forward - recombine - dimer;
        rate[2] = dimer;
    }

    fn evaluate_with_jacobian(&self, t: f64, y: &[f64], rate: &mut [f64], jacobian: &mut [f64]) {
        self.evaluate(t, y, rate);
        jacobian[0] = -self.k1;
        jacobian[1] = self.k3 * y[2];
        jacobian[2] = self.k3 * y[1];
        jacobian[3] = self.k1;
        jacobian[4] = -self.k3 * y[2] - 2.0 * self.k2 * y[1];
        jacobian[5] = -self.k3 * y[1];
        jacobian[6] = 0.0;
        jacobian[7] = 2.0 * self.k2 * y[1];
        jacobian[8] = 0.0;
    }
}
