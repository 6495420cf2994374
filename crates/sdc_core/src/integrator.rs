//! Batched implicit spectral deferred correction.
//!
//! One `SdcIntegrator` advances `lanes` independent ODE systems in lock-step.
//! Every call to [`SdcIntegrator::prepare`] / [`SdcIntegrator::solve`] /
//! [`SdcIntegrator::update`] touches all lanes; what actually happens to a lane
//! depends only on its own status, so lanes drift apart in the state machine
//! while still sharing every synchronization point.
//!
//! Per-lane state is kept as parallel arrays (one entry per lane) and node
//! histories as [`VectorSet`]s, never as one object per lane.

pub mod settings;
pub mod status;

pub use settings::{SdcSettings, StepControl};
pub use status::{LaneCounters, SdcStatus};

use crate::error::{SdcError, SdcResult};
use crate::exec::{ExecutionContext, Sequential};
use crate::sparse::{CsrLayout, SparseMatrix};
use crate::traits::{lit, LinearSolver, ReactionSystem, Scalar};
use crate::vector::RealVector;
use crate::vector_set::VectorSet;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use status::{next_status, Limits};

/// Newton error assigned when a node starts, before any correction is known.
const NEWTON_ERROR_SENTINEL: f64 = 1.0e30;

/// Snapshot of one lane, suitable for logging or serialization.
#[derive(Debug, Clone, Serialize)]
pub struct LaneReport<T> {
    pub lane: usize,
    pub status: SdcStatus,
    pub counters: LaneCounters,
    pub current_time: T,
    pub time_step: T,
    pub newton_error: T,
    pub solution: Vec<T>,
}

/// Outcome of [`SdcIntegrator::integrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub iterations: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct SdcIntegrator<T, S, L, E = Sequential>
where
    T: Scalar,
{
    system: S,
    solver: L,
    exec: E,
    settings: SdcSettings,
    limits: Limits<T>,
    lanes: usize,
    neqs: usize,
    number_nodes: usize,

    status: Vec<SdcStatus>,
    step_counter: Vec<usize>,
    sdc_counter: Vec<usize>,
    node_counter: Vec<usize>,
    newton_counter: Vec<usize>,

    time_previous: Vec<T>,
    time_step: Vec<T>,
    newton_error: Vec<T>,
    time_nodes: VectorSet<T>,

    y_old: Vec<VectorSet<T>>,
    f_old: Vec<VectorSet<T>>,
    y_new: Vec<VectorSet<T>>,
    f_new: Vec<VectorSet<T>>,

    q_node: VectorSet<T>,
    y_delta: VectorSet<T>,
    implicit_rhs: VectorSet<T>,
    j_new: SparseMatrix<T>,
    scratch: VectorSet<T>,

    lane_scalars: Vec<T>,
    lane_norms: Vec<T>,
    lane_buffer: Vec<T>,
    next_status: Vec<SdcStatus>,
    next_counters: Vec<LaneCounters>,
}

impl<T, S, L, E> SdcIntegrator<T, S, L, E>
where
    T: Scalar,
    S: ReactionSystem<T>,
    L: LinearSolver<T>,
    E: ExecutionContext,
{
    /// Builds a batch with one lane per lane of `initial_state`.
    pub fn new(
        system: S,
        solver: L,
        exec: E,
        settings: SdcSettings,
        initial_state: &VectorSet<T>,
    ) -> SdcResult<Self> {
        settings.validate()?;
        let neqs = system.neqs();
        if neqs == 0 {
            return Err(SdcError::ZeroDimension);
        }
        let lanes = initial_state.lanes();
        if lanes == 0 {
            return Err(SdcError::EmptyBatch);
        }
        let layout = layout_of::<T, S>(&system)?;
        let number_nodes = settings.order.number_nodes();

        let mut sdc = Self {
            limits: limits_for(&settings),
            system,
            solver,
            exec,
            settings,
            lanes,
            neqs,
            number_nodes,
            status: vec![SdcStatus::StartTimestep; lanes],
            step_counter: vec![0; lanes],
            sdc_counter: vec![1; lanes],
            node_counter: vec![1; lanes],
            newton_counter: vec![0; lanes],
            time_previous: vec![T::zero(); lanes],
            time_step: vec![T::zero(); lanes],
            newton_error: vec![T::zero(); lanes],
            time_nodes: VectorSet::zeros(number_nodes, lanes),
            y_old: Vec::new(),
            f_old: Vec::new(),
            y_new: Vec::new(),
            f_new: Vec::new(),
            q_node: VectorSet::zeros(neqs, lanes),
            y_delta: VectorSet::zeros(neqs, lanes),
            implicit_rhs: VectorSet::zeros(neqs, lanes),
            j_new: SparseMatrix::new(layout, lanes),
            scratch: VectorSet::zeros(neqs, lanes),
            lane_scalars: vec![T::zero(); lanes],
            lane_norms: vec![T::zero(); lanes],
            lane_buffer: Vec::new(),
            next_status: vec![SdcStatus::StartTimestep; lanes],
            next_counters: vec![LaneCounters::START; lanes],
        };
        sdc.initialize(initial_state, settings)?;

        log::debug!(
            "SDC batch ready: {} lanes, {} equations, {} Jacobian entries, {}",
            lanes,
            neqs,
            sdc.j_new.layout().nnz(),
            settings.order
        );
        Ok(sdc)
    }

    /// Installs the CSR pattern the system writes its Jacobian in.
    ///
    /// `row_count` holds the row offsets (`neqs + 1` entries). The pattern must
    /// describe `neqs` rows and hold exactly `system.nnz()` entries. Stored
    /// matrix values are reset.
    pub fn set_jacobian_layout(&mut self, col_index: Vec<usize>, row_count: Vec<usize>) -> SdcResult<()> {
        let rows = row_count.len().saturating_sub(1);
        if rows != self.neqs {
            return Err(SdcError::DimensionMismatch {
                expected: self.neqs,
                actual: rows,
            });
        }
        let layout = CsrLayout::from_csr(self.neqs, col_index, row_count)?;
        if layout.nnz() != self.system.nnz() {
            return Err(SdcError::NonZeroMismatch {
                declared: layout.nnz(),
                reported: self.system.nnz(),
            });
        }
        self.j_new = SparseMatrix::new(layout, self.lanes);
        Ok(())
    }

    /// Seeds node 0 with `initial_state`, clears all history and puts every
    /// lane in `StartTimestep`.
    pub fn initialize(&mut self, initial_state: &VectorSet<T>, settings: SdcSettings) -> SdcResult<()> {
        settings.validate()?;
        if initial_state.lanes() != self.lanes {
            return Err(SdcError::DimensionMismatch {
                expected: self.lanes,
                actual: initial_state.lanes(),
            });
        }
        if initial_state.components() != self.neqs {
            return Err(SdcError::DimensionMismatch {
                expected: self.neqs,
                actual: initial_state.components(),
            });
        }

        let (lanes, neqs) = (self.lanes, self.neqs);
        self.settings = settings;
        self.limits = limits_for(&settings);
        self.number_nodes = settings.order.number_nodes();
        let nodes = self.number_nodes;

        let zeros = VectorSet::zeros(neqs, lanes);
        self.y_old = vec![initial_state.clone(); nodes];
        self.y_new = vec![initial_state.clone(); nodes];
        self.f_old = vec![zeros.clone(); nodes];
        self.f_new = vec![zeros; nodes];

        let start = lit::<T>(settings.start_time);
        let window = lit::<T>(settings.end_time - settings.start_time);
        let first_step = lit::<T>(settings.initial_time_step()).min(window);
        self.time_nodes = VectorSet::filled(nodes, lanes, start);
        self.time_previous.fill(start);
        self.time_step.fill(first_step);
        self.newton_error.fill(lit(NEWTON_ERROR_SENTINEL));

        self.status.fill(SdcStatus::StartTimestep);
        self.step_counter.fill(0);
        self.sdc_counter.fill(1);
        self.node_counter.fill(1);
        self.newton_counter.fill(0);

        self.q_node.fill(T::zero());
        self.y_delta.fill(T::zero());
        self.implicit_rhs.fill(T::zero());
        Ok(())
    }

    /// Assembles the next Newton system for every active lane.
    ///
    /// Calling this twice without an intervening [`SdcIntegrator::update`]
    /// rebuilds the same system.
    pub fn prepare(&mut self) {
        self.initialize_nodes();
        self.evaluate_quadrature();
        self.guess_new_solution();
        self.reset_newton_error();
        self.evaluate_system();
        self.setup_linear_system();
    }

    /// Solves every active lane's Newton system with the configured solver.
    ///
    /// On failure the correction of every lane is zeroed, so an `update` that
    /// follows anyway leaves the solutions unchanged.
    pub fn solve(&mut self) -> Result<()> {
        let (neqs, nnz) = (self.neqs, self.j_new.layout().nnz());
        let width = nnz + 2 * neqs;
        self.lane_buffer.resize(self.lanes * width, T::zero());

        let solver = &self.solver;
        let pattern = self.j_new.layout().pattern();
        let (matrix, rhs, status) = (&self.j_new, &self.implicit_rhs, &self.status);
        let solved = self
            .exec
            .try_for_each_chunk(&mut self.lane_buffer, width, |lane, chunk| {
                let (a, rest) = chunk.split_at_mut(nnz);
                let (b, x) = rest.split_at_mut(neqs);
                x.fill(T::zero());
                if status[lane].is_terminal() {
                    return Ok(());
                }
                matrix.read_lane(lane, a);
                rhs.read_lane(lane, b);
                solver
                    .solve(pattern, a, x, b)
                    .with_context(|| format!("Linear solve failed for lane {lane}."))
            });
        if let Err(err) = solved {
            // A later `update` must not replay the previous correction.
            self.y_delta.fill(T::zero());
            return Err(err);
        }

        let buffer = &self.lane_buffer;
        self.y_delta
            .for_each_mut(&self.exec, |c, lane, v| *v = buffer[lane * width + nnz + neqs + c]);
        Ok(())
    }

    /// Applies the Newton correction and advances every lane's status.
    pub fn update(&mut self) {
        self.update_solution();
        self.update_status();
    }

    /// Drives `prepare` / `solve` / `update` until every lane is terminal.
    pub fn integrate(&mut self, max_iterations: usize) -> Result<BatchSummary> {
        let mut iterations = 0;
        while !self.all_finished() {
            if iterations == max_iterations {
                let running = self.status.iter().filter(|s| !s.is_terminal()).count();
                bail!(
                    "Batch did not finish within {} iterations ({} of {} lanes still running).",
                    max_iterations,
                    running,
                    self.lanes
                );
            }
            self.prepare();
            self.solve()?;
            self.update();
            iterations += 1;
        }

        let summary = self.summary(iterations);
        log::info!(
            "SDC batch finished after {} iterations: {} completed, {} failed",
            summary.iterations,
            summary.completed,
            summary.failed
        );
        Ok(summary)
    }

    pub fn summary(&self, iterations: usize) -> BatchSummary {
        let completed = self
            .status
            .iter()
            .filter(|&&s| s == SdcStatus::Completed)
            .count();
        let failed = self.status.iter().filter(|&&s| s == SdcStatus::Failed).count();
        BatchSummary {
            iterations,
            completed,
            failed,
        }
    }

    // ---- phases -------------------------------------------------------------

    /// Seeds the nodes of lanes starting a step and lays out their node times.
    ///
    /// Rolling the previous step's last node into node 0 and picking the new
    /// step size happen on the transition into `StartTimestep` (see
    /// `advance_timestep`), so this phase only reads state it does not write.
    fn initialize_nodes(&mut self) {
        let status = &self.status;
        let fresh = |lane: usize| status[lane] == SdcStatus::StartTimestep;
        if !(0..self.lanes).any(fresh) {
            return;
        }

        // First step: seed f_old[0] from the initial condition.
        let step = &self.step_counter;
        let first = |lane: usize| fresh(lane) && step[lane] == 0;
        if (0..self.lanes).any(first) {
            let neqs = self.neqs;
            let width = 2 * neqs;
            self.lane_buffer.resize(self.lanes * width, T::zero());
            let (system, y0, times) = (&self.system, &self.y_old[0], &self.time_previous);
            self.exec
                .for_each_chunk(&mut self.lane_buffer, width, |lane, chunk| {
                    if !first(lane) {
                        return;
                    }
                    let (y, rate) = chunk.split_at_mut(neqs);
                    y0.read_lane(lane, y);
                    system.evaluate(times[lane], y, rate);
                });
            let buffer = &self.lane_buffer;
            self.f_old[0].for_each_mut(&self.exec, |c, lane, v| {
                if first(lane) {
                    *v = buffer[lane * width + neqs + c];
                }
            });
        }

        let exec = &self.exec;
        let (y_head, y_tail) = self.y_old.split_at_mut(1);
        for node in y_tail.iter_mut() {
            node.copy_lanes_from(exec, &y_head[0], fresh);
        }
        let (f_head, f_tail) = self.f_old.split_at_mut(1);
        for node in f_tail.iter_mut() {
            node.copy_lanes_from(exec, &f_head[0], fresh);
        }

        let intervals = lit::<T>((self.number_nodes - 1) as f64);
        let target = self.limits.time_target;
        let (previous, step_size) = (&self.time_previous, &self.time_step);
        self.time_nodes.for_each_mut(exec, |node, lane, t| {
            if fresh(lane) {
                let dt_node = step_size[lane] / intervals;
                *t = (previous[lane] + lit::<T>(node as f64) * dt_node).min(target);
            }
        });
    }

    /// Copies the finished sweep into the `old` history for lanes entering a
    /// new sweep.
    fn save_sdc_iteration(&mut self) {
        let next = &self.next_status;
        let mask = |lane: usize| next[lane] == SdcStatus::StartSDCIteration;
        let exec = &self.exec;
        for node in 1..self.number_nodes {
            self.y_old[node].copy_lanes_from(exec, &self.y_new[node], mask);
            self.f_old[node].copy_lanes_from(exec, &self.f_new[node], mask);
        }
    }

    /// Quadrature of the previous sweep's derivatives over the current node interval.
    fn evaluate_quadrature(&mut self) {
        let rule = self.settings.order.quadrature();
        let (status, node, times, f_old) =
            (&self.status, &self.node_counter, &self.time_nodes, &self.f_old);
        self.q_node.for_each_mut(&self.exec, |c, lane, q| {
            if !status[lane].starts_node() {
                return;
            }
            let spacing = times.get(1, lane) - times.get(0, lane);
            *q = rule.node_integral(node[lane], spacing, |k| f_old[k].get(c, lane));
        });
    }

    /// Initial Newton iterate at the current node.
    ///
    /// Later sweeps start from the previous sweep's value at this node, the
    /// first sweep from the value just computed at the node before.
    fn guess_new_solution(&mut self) {
        let (status, node, sdc) = (&self.status, &self.node_counter, &self.sdc_counter);
        let exec = &self.exec;
        for k in 1..self.number_nodes {
            let (head, tail) = self.y_new.split_at_mut(k);
            let (previous, current, old) = (&head[k - 1], &mut tail[0], &self.y_old[k]);
            current.for_each_mut(exec, |c, lane, v| {
                if status[lane].starts_node() && node[lane] == k {
                    *v = if sdc[lane] > 1 {
                        old.get(c, lane)
                    } else {
                        previous.get(c, lane)
                    };
                }
            });
        }
    }

    fn reset_newton_error(&mut self) {
        let status = &self.status;
        let sentinel = lit::<T>(NEWTON_ERROR_SENTINEL);
        self.exec.for_each(&mut self.newton_error, |lane, e| {
            if status[lane].starts_node() {
                *e = sentinel;
            }
        });
    }

    /// Rate and Jacobian at the current iterate of every active lane.
    fn evaluate_system(&mut self) {
        let (neqs, nnz) = (self.neqs, self.j_new.layout().nnz());
        let width = 2 * neqs + nnz;
        self.lane_buffer.resize(self.lanes * width, T::zero());

        let (system, status, node) = (&self.system, &self.status, &self.node_counter);
        let (times, y_new) = (&self.time_nodes, &self.y_new);
        self.exec
            .for_each_chunk(&mut self.lane_buffer, width, |lane, chunk| {
                if status[lane].is_terminal() {
                    return;
                }
                let m = node[lane];
                let (y, rest) = chunk.split_at_mut(neqs);
                let (rate, jacobian) = rest.split_at_mut(neqs);
                y_new[m].read_lane(lane, y);
                system.evaluate_with_jacobian(times.get(m, lane), y, rate, jacobian);
            });

        let exec = &self.exec;
        let buffer = &self.lane_buffer;
        for (k, f_new) in self.f_new.iter_mut().enumerate().skip(1) {
            f_new.for_each_mut(exec, |c, lane, v| {
                if !status[lane].is_terminal() && node[lane] == k {
                    *v = buffer[lane * width + neqs + c];
                }
            });
        }
        self.j_new.values_mut().for_each_mut(exec, |e, lane, v| {
            if !status[lane].is_terminal() {
                *v = buffer[lane * width + 2 * neqs + e];
            }
        });
    }

    /// Forms `A = I + (t_{m-1} - t_m) J` in place of the Jacobian and
    /// `b = (y_{m-1} - y_m) + (t_m - t_{m-1}) (f_m - f_old_m) + q_m`.
    fn setup_linear_system(&mut self) {
        let (status, node, times) = (&self.status, &self.node_counter, &self.time_nodes);

        // Terminal lanes get a zero scale, which leaves them an identity system.
        self.exec.for_each(&mut self.lane_scalars, |lane, h| {
            *h = if status[lane].is_terminal() {
                T::zero()
            } else {
                let m = node[lane];
                times.get(m - 1, lane) - times.get(m, lane)
            };
        });
        self.j_new.mul_lanes(&self.exec, &self.lane_scalars);
        self.j_new.add_to_diagonal(&self.exec, T::one());

        let (y_new, f_new, f_old, q) = (&self.y_new, &self.f_new, &self.f_old, &self.q_node);
        self.implicit_rhs.for_each_mut(&self.exec, |c, lane, b| {
            if status[lane].is_terminal() {
                *b = T::zero();
                return;
            }
            let m = node[lane];
            let dt = times.get(m, lane) - times.get(m - 1, lane);
            *b = y_new[m - 1].get(c, lane) - y_new[m].get(c, lane)
                + dt * (f_new[m].get(c, lane) - f_old[m].get(c, lane))
                + q.get(c, lane);
        });
    }

    /// `y_m += Δy` and the relative Newton error `‖Δy‖_F / (‖y_m‖_max + small)`.
    fn update_solution(&mut self) {
        let (status, node, delta) = (&self.status, &self.node_counter, &self.y_delta);
        let exec = &self.exec;
        for (k, y) in self.y_new.iter_mut().enumerate().skip(1) {
            y.for_each_mut(exec, |c, lane, v| {
                if !status[lane].is_terminal() && node[lane] == k {
                    *v = *v + delta.get(c, lane);
                }
            });
        }

        let y_new = &self.y_new;
        self.scratch
            .for_each_mut(exec, |c, lane, v| *v = y_new[node[lane]].get(c, lane));
        self.y_delta.frobenius_norm(exec, &mut self.lane_scalars);
        self.scratch.max_norm(exec, &mut self.lane_norms);

        let (delta_norm, y_norm, small) = (&self.lane_scalars, &self.lane_norms, self.limits.small);
        exec.for_each(&mut self.newton_error, |lane, e| {
            if !status[lane].is_terminal() {
                *e = delta_norm[lane] / (y_norm[lane] + small);
            }
        });
    }

    fn update_status(&mut self) {
        let limits = self.limits;
        let last = self.number_nodes - 1;
        let exec = &self.exec;

        {
            let (status, error, times) = (&self.status, &self.newton_error, &self.time_nodes);
            let (step, sdc, node, newton) = (
                &self.step_counter,
                &self.sdc_counter,
                &self.node_counter,
                &self.newton_counter,
            );
            let counters = |lane: usize| LaneCounters {
                step: step[lane],
                sdc: sdc[lane],
                node: node[lane],
                newton: newton[lane],
            };
            exec.for_each(&mut self.next_status, |lane, s| {
                *s = next_status(
                    status[lane],
                    counters(lane),
                    error[lane],
                    times.get(last, lane),
                    &limits,
                );
            });
            let next = &self.next_status;
            exec.for_each(&mut self.next_counters, |lane, c| {
                *c = counters(lane).after(next[lane]);
            });
        }

        let counters = &self.next_counters;
        exec.for_each(&mut self.step_counter, |lane, v| *v = counters[lane].step);
        exec.for_each(&mut self.sdc_counter, |lane, v| *v = counters[lane].sdc);
        exec.for_each(&mut self.node_counter, |lane, v| *v = counters[lane].node);
        exec.for_each(&mut self.newton_counter, |lane, v| *v = counters[lane].newton);

        self.save_sdc_iteration();
        self.advance_timestep();

        let newly_failed = self
            .status
            .iter()
            .zip(&self.next_status)
            .filter(|(old, new)| !old.is_terminal() && **new == SdcStatus::Failed)
            .count();
        std::mem::swap(&mut self.status, &mut self.next_status);

        if newly_failed > 0 {
            log::warn!("{} lane(s) failed during this update", newly_failed);
        }
        log::trace!(
            "update: {} of {} lanes finished",
            self.status.iter().filter(|s| s.is_terminal()).count(),
            self.lanes
        );
    }

    /// Moves lanes entering a new step forward: the last node becomes node 0
    /// and the step size is recomputed.
    fn advance_timestep(&mut self) {
        let next = &self.next_status;
        let entering = |lane: usize| next[lane] == SdcStatus::StartTimestep;
        let entered = (0..self.lanes).filter(|&lane| entering(lane)).count();
        if entered == 0 {
            return;
        }
        log::debug!("{} lane(s) starting a new time step", entered);

        let last = self.number_nodes - 1;
        let exec = &self.exec;
        let times = &self.time_nodes;
        exec.for_each(&mut self.time_previous, |lane, t| {
            if entering(lane) {
                *t = times.get(last, lane);
            }
        });

        self.y_old[0].copy_lanes_from(exec, &self.y_new[last], entering);
        self.f_old[0].copy_lanes_from(exec, &self.f_new[last], entering);
        self.y_new[0].copy_lanes_from(exec, &self.y_old[0], entering);
        self.f_new[0].copy_lanes_from(exec, &self.f_old[0], entering);

        let limits = self.limits;
        let adaptive = self.settings.use_adaptive_timestep;
        let control = self.settings.step_control;
        let (now, error) = (&self.time_previous, &self.newton_error);
        exec.for_each(&mut self.time_step, |lane, dt| {
            if !entering(lane) {
                return;
            }
            let remaining = limits.time_target - now[lane];
            *dt = if adaptive {
                control.next_time_step(*dt, limits.tolerance, error[lane], remaining)
            } else {
                (*dt).min(remaining)
            };
        });
    }

    // ---- accessors ----------------------------------------------------------

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn neqs(&self) -> usize {
        self.neqs
    }

    pub fn number_nodes(&self) -> usize {
        self.number_nodes
    }

    pub fn settings(&self) -> &SdcSettings {
        &self.settings
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn jacobian_layout(&self) -> &CsrLayout {
        self.j_new.layout()
    }

    // Per-lane accessors panic on `lane >= lanes()`, like slice indexing.

    fn check_lane(&self, lane: usize) {
        assert!(
            lane < self.lanes,
            "lane {lane} out of range for a batch of {}",
            self.lanes
        );
    }

    pub fn status(&self, lane: usize) -> SdcStatus {
        self.check_lane(lane);
        self.status[lane]
    }

    pub fn counters(&self, lane: usize) -> LaneCounters {
        self.check_lane(lane);
        LaneCounters {
            step: self.step_counter[lane],
            sdc: self.sdc_counter[lane],
            node: self.node_counter[lane],
            newton: self.newton_counter[lane],
        }
    }

    pub fn is_finished(&self, lane: usize) -> bool {
        self.status(lane).is_terminal()
    }

    pub fn is_started(&self, lane: usize) -> bool {
        self.counters(lane) != LaneCounters::START
    }

    pub fn all_finished(&self) -> bool {
        self.status.iter().all(|s| s.is_terminal())
    }

    /// Solution at the current node. After `Completed` this is the value at the end time.
    pub fn current_solution(&self, lane: usize) -> RealVector<T> {
        self.check_lane(lane);
        self.y_new[self.node_counter[lane]].lane(lane)
    }

    pub fn previous_solution(&self, lane: usize) -> RealVector<T> {
        self.check_lane(lane);
        self.y_new[self.node_counter[lane] - 1].lane(lane)
    }

    pub fn current_time(&self, lane: usize) -> T {
        self.check_lane(lane);
        self.time_nodes.get(self.node_counter[lane], lane)
    }

    pub fn previous_time(&self, lane: usize) -> T {
        self.check_lane(lane);
        self.time_nodes.get(self.node_counter[lane] - 1, lane)
    }

    pub fn time_step(&self, lane: usize) -> T {
        self.check_lane(lane);
        self.time_step[lane]
    }

    pub fn time_nodes(&self, lane: usize) -> RealVector<T> {
        self.check_lane(lane);
        self.time_nodes.lane(lane)
    }

    pub fn newton_error(&self, lane: usize) -> T {
        self.check_lane(lane);
        self.newton_error[lane]
    }

    pub fn q_node(&self, lane: usize) -> RealVector<T> {
        self.check_lane(lane);
        self.q_node.lane(lane)
    }

    /// Current-node solutions of every lane.
    pub fn final_solutions(&self) -> VectorSet<T> {
        let mut out = VectorSet::zeros(self.neqs, self.lanes);
        let (y_new, node) = (&self.y_new, &self.node_counter);
        out.for_each_mut(&self.exec, |c, lane, v| *v = y_new[node[lane]].get(c, lane));
        out
    }

    /// Newton matrix values (CSR order) and right-hand side assembled for `lane`.
    pub fn linear_system(&self, lane: usize) -> (Vec<T>, RealVector<T>) {
        self.check_lane(lane);
        (self.j_new.lane_values(lane), self.implicit_rhs.lane(lane))
    }

    /// Installs an externally computed Newton correction for `lane`.
    pub fn set_delta(&mut self, lane: usize, delta: &[T]) -> SdcResult<()> {
        if lane >= self.lanes {
            return Err(SdcError::LaneOutOfRange {
                lane,
                lanes: self.lanes,
            });
        }
        if delta.len() != self.neqs {
            return Err(SdcError::DimensionMismatch {
                expected: self.neqs,
                actual: delta.len(),
            });
        }
        self.y_delta.set_lane(lane, delta);
        Ok(())
    }

    pub fn report(&self, lane: usize) -> LaneReport<T> {
        self.check_lane(lane);
        LaneReport {
            lane,
            status: self.status[lane],
            counters: self.counters(lane),
            current_time: self.current_time(lane),
            time_step: self.time_step[lane],
            newton_error: self.newton_error[lane],
            solution: self.current_solution(lane).into_vec(),
        }
    }
}

fn layout_of<T: Scalar, S: ReactionSystem<T>>(system: &S) -> SdcResult<CsrLayout> {
    let layout = CsrLayout::from_csr(system.neqs(), system.csr_col_index(), system.csr_row_count())?;
    if layout.nnz() != system.nnz() {
        return Err(SdcError::NonZeroMismatch {
            declared: layout.nnz(),
            reported: system.nnz(),
        });
    }
    Ok(layout)
}

fn limits_for<T: Scalar>(settings: &SdcSettings) -> Limits<T> {
    Limits {
        tolerance: lit(settings.tolerance),
        maximum_newton: settings.maximum_newton,
        fail_if_maximum_newton: settings.fail_if_maximum_newton,
        maximum_steps: settings.maximum_steps,
        number_nodes: settings.order.number_nodes(),
        sweeps: settings.order.order(),
        time_target: lit(settings.end_time),
        small: lit(settings.small),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Threaded;
    use crate::linear::DenseLu;
    use crate::systems::{LinearDecay, Robertson};

    /// dy/dt = -k y with the Jacobian reported as zero, so Newton degrades to a
    /// fixed-point iteration that contracts by `k * spacing` per pass.
    struct FixedPointDecay {
        k: f64,
    }

    impl ReactionSystem<f64> for FixedPointDecay {
        fn neqs(&self) -> usize {
            1
        }
        fn csr_col_index(&self) -> Vec<usize> {
            vec![0]
        }
        fn csr_row_count(&self) -> Vec<usize> {
            vec![0, 1]
        }
        fn evaluate(&self, _t: f64, y: &[f64], rate: &mut [f64]) {
            rate[0] = -self.k * y[0];
        }
        fn evaluate_with_jacobian(&self, t: f64, y: &[f64], rate: &mut [f64], jacobian: &mut [f64]) {
            self.evaluate(t, y, rate);
            jacobian[0] = 0.0;
        }
    }

    /// dy/dt = c.
    struct ConstantRate {
        rates: Vec<f64>,
    }

    impl ReactionSystem<f64> for ConstantRate {
        fn neqs(&self) -> usize {
            self.rates.len()
        }
        fn csr_col_index(&self) -> Vec<usize> {
            (0..self.rates.len()).collect()
        }
        fn csr_row_count(&self) -> Vec<usize> {
            (0..=self.rates.len()).collect()
        }
        fn evaluate(&self, _t: f64, _y: &[f64], rate: &mut [f64]) {
            rate.copy_from_slice(&self.rates);
        }
        fn evaluate_with_jacobian(&self, t: f64, y: &[f64], rate: &mut [f64], jacobian: &mut [f64]) {
            self.evaluate(t, y, rate);
            jacobian.fill(0.0);
        }
    }

    /// Declares an nnz that disagrees with its column index.
    struct MisreportedNnz;

    impl ReactionSystem<f64> for MisreportedNnz {
        fn neqs(&self) -> usize {
            1
        }
        fn csr_col_index(&self) -> Vec<usize> {
            vec![0]
        }
        fn csr_row_count(&self) -> Vec<usize> {
            vec![0, 1]
        }
        fn nnz(&self) -> usize {
            2
        }
        fn evaluate(&self, _t: f64, _y: &[f64], rate: &mut [f64]) {
            rate[0] = 0.0;
        }
        fn evaluate_with_jacobian(&self, _t: f64, _y: &[f64], rate: &mut [f64], jacobian: &mut [f64]) {
            rate[0] = 0.0;
            jacobian[0] = 0.0;
        }
    }

    struct FailingSolver;

    impl LinearSolver<f64> for FailingSolver {
        fn solve(
            &self,
            _layout: &nalgebra_sparse::pattern::SparsityPattern,
            _matrix: &[f64],
            _x: &mut [f64],
            _rhs: &[f64],
        ) -> Result<()> {
            bail!("Newton matrix is singular.")
        }
    }

    fn fixed_step(time_step: f64) -> SdcSettings {
        SdcSettings {
            time_step,
            use_adaptive_timestep: false,
            ..SdcSettings::default()
        }
    }

    fn assert_err_contains<T>(result: SdcResult<T>, needle: &str) {
        match result {
            Ok(_) => panic!("expected error containing \"{needle}\""),
            Err(err) => {
                let message = format!("{err}");
                assert!(
                    message.contains(needle),
                    "expected error to contain \"{needle}\", got \"{message}\""
                );
            }
        }
    }

    fn cycle<S, L, E>(sdc: &mut SdcIntegrator<f64, S, L, E>)
    where
        S: ReactionSystem<f64>,
        L: LinearSolver<f64>,
        E: ExecutionContext,
    {
        sdc.prepare();
        sdc.solve().expect("linear solve should succeed");
        sdc.update();
    }

    fn check_counters<S, L, E>(sdc: &SdcIntegrator<f64, S, L, E>, lane: usize)
    where
        S: ReactionSystem<f64>,
        L: LinearSolver<f64>,
        E: ExecutionContext,
    {
        let c = sdc.counters(lane);
        let settings = sdc.settings();
        assert!(c.sdc >= 1 && c.sdc <= settings.order.order());
        assert!(c.node >= 1 && c.node < sdc.number_nodes());
        assert!(c.newton <= settings.maximum_newton);
        match sdc.status(lane) {
            SdcStatus::StartTimestep => {
                assert_eq!((c.sdc, c.node, c.newton), (1, 1, 0));
            }
            SdcStatus::StartSDCIteration => assert_eq!((c.node, c.newton), (1, 0)),
            SdcStatus::StartNode => assert_eq!(c.newton, 0),
            _ => {}
        }
    }

    #[test]
    fn fourth_order_decay_reaches_exact_solution() {
        let settings = SdcSettings {
            tolerance: 1e-10,
            ..fixed_step(2e-3)
        };
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        let summary = sdc.integrate(1_000_000).expect("integration should finish");

        assert_eq!(summary.completed, 1);
        assert_eq!(sdc.status(0), SdcStatus::Completed);
        assert!((sdc.current_time(0) - 1.0).abs() < 1e-12);
        let y = sdc.current_solution(0)[0];
        assert!((y - (-1.0f64).exp()).abs() < 1e-8, "y(1) = {y}");
    }

    #[test]
    fn second_order_decay_is_accurate() {
        let settings = SdcSettings {
            tolerance: 1e-10,
            order: crate::quadrature::SdcOrder::Second,
            ..fixed_step(1e-3)
        };
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        assert_eq!(sdc.number_nodes(), 2);
        sdc.integrate(1_000_000).expect("integration should finish");

        assert_eq!(sdc.status(0), SdcStatus::Completed);
        let y = sdc.current_solution(0)[0];
        assert!((y - (-1.0f64).exp()).abs() < 1e-5, "y(1) = {y}");
    }

    #[test]
    fn counters_respect_bounds_after_every_update() {
        let settings = SdcSettings {
            tolerance: 1e-10,
            ..SdcSettings::default()
        };
        let y0 = VectorSet::from_lane_major(2, 2, &[1.0, 2.0, 0.5, 0.0]);
        let mut sdc = SdcIntegrator::new(
            LinearDecay::new(vec![1.0, 10.0]),
            DenseLu,
            Sequential,
            settings,
            &y0,
        )
        .expect("integrator should build");
        let mut guard = 0;
        while !sdc.all_finished() {
            cycle(&mut sdc);
            for lane in 0..sdc.lanes() {
                check_counters(&sdc, lane);
            }
            guard += 1;
            assert!(guard < 100_000, "integration did not terminate");
        }
        assert_eq!(sdc.summary(guard).completed, 2);
    }

    #[test]
    fn unconverged_newton_fails_at_the_limit() {
        let settings = SdcSettings {
            tolerance: 1e-14,
            maximum_newton: 2,
            ..fixed_step(0.25)
        };
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(FixedPointDecay { k: 1.0 }, DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        let summary = sdc.integrate(100).expect("batch should terminate");

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.iterations, 3);
        assert_eq!(sdc.status(0), SdcStatus::Failed);
        assert_eq!(sdc.counters(0).newton, 2);
    }

    #[test]
    fn soft_newton_limit_accepts_and_completes() {
        let settings = SdcSettings {
            tolerance: 1e-14,
            maximum_newton: 2,
            fail_if_maximum_newton: false,
            ..fixed_step(0.25)
        };
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(FixedPointDecay { k: 1.0 }, DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        sdc.integrate(10_000).expect("batch should terminate");

        assert_eq!(sdc.status(0), SdcStatus::Completed);
        assert!(sdc.current_solution(0)[0].is_finite());
        assert!((sdc.current_time(0) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn step_budget_exhaustion_fails() {
        let settings = SdcSettings {
            maximum_steps: 3,
            ..fixed_step(0.1)
        };
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        sdc.integrate(100_000).expect("batch should terminate");

        assert_eq!(sdc.status(0), SdcStatus::Failed);
        assert_eq!(sdc.counters(0).step, 3);
        assert!((sdc.current_time(0) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn finished_lanes_are_frozen() {
        let settings = SdcSettings {
            tolerance: 1e-14,
            maximum_newton: 2,
            ..fixed_step(0.25)
        };
        // Lane 0 sits at the fixed point y = 0 and converges at once; lane 1 fails.
        let y0 = VectorSet::from_lane_major(1, 2, &[0.0, 1.0]);
        let mut sdc = SdcIntegrator::new(FixedPointDecay { k: 1.0 }, DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");

        while sdc.status(1) != SdcStatus::Failed {
            cycle(&mut sdc);
        }
        let frozen = sdc.current_solution(1);
        let counters = sdc.counters(1);

        while !sdc.all_finished() {
            cycle(&mut sdc);
            assert_eq!(sdc.status(1), SdcStatus::Failed);
            assert_eq!(sdc.current_solution(1), frozen);
            assert_eq!(sdc.counters(1), counters);
            let (matrix, rhs) = sdc.linear_system(1);
            assert_eq!(matrix, vec![1.0]);
            assert_eq!(rhs[0], 0.0);
        }
        assert_eq!(sdc.status(0), SdcStatus::Completed);
        assert_eq!(sdc.current_solution(0)[0], 0.0);
    }

    #[test]
    fn repeated_prepare_builds_the_same_system() {
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");

        sdc.prepare();
        let first = (sdc.linear_system(0), sdc.time_nodes(0), sdc.q_node(0));
        sdc.prepare();
        assert_eq!((sdc.linear_system(0), sdc.time_nodes(0), sdc.q_node(0)), first);

        // Same check at the start of the second step.
        sdc.solve().expect("solve");
        sdc.update();
        while !(sdc.status(0) == SdcStatus::StartTimestep && sdc.counters(0).step == 1) {
            cycle(&mut sdc);
        }
        sdc.prepare();
        let second = (sdc.linear_system(0), sdc.time_nodes(0), sdc.q_node(0));
        sdc.prepare();
        assert_eq!((sdc.linear_system(0), sdc.time_nodes(0), sdc.q_node(0)), second);
        assert!((sdc.time_nodes(0)[0] - 0.1).abs() < 1e-15);
        assert!((sdc.time_nodes(0)[2] - 0.2).abs() < 1e-15);
    }

    #[test]
    fn repeated_prepare_is_stable_in_every_phase() {
        let settings = SdcSettings {
            end_time: 0.1,
            tolerance: 1e-6,
            ..fixed_step(1e-3)
        };
        let y0 = VectorSet::broadcast(&[1.0, 0.0, 0.0], 1);
        let mut sdc = SdcIntegrator::new(Robertson::default(), DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        let snapshot = |sdc: &SdcIntegrator<f64, Robertson, DenseLu>| {
            (sdc.linear_system(0), sdc.q_node(0), sdc.time_nodes(0))
        };

        let mut pending = vec![
            SdcStatus::StartSDCIteration,
            SdcStatus::StartNode,
            SdcStatus::StartNewton,
        ];
        while !pending.is_empty() {
            assert!(!sdc.all_finished(), "never reached {pending:?}");
            let status = sdc.status(0);
            sdc.prepare();
            if let Some(i) = pending.iter().position(|&s| s == status) {
                let first = snapshot(&sdc);
                sdc.prepare();
                assert_eq!(snapshot(&sdc), first, "second prepare at {status} differs");
                pending.remove(i);
            }
            sdc.solve().expect("solve");
            sdc.update();
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn lane_accessors_panic_past_the_batch() {
        let y0 = VectorSet::filled(1, 2, 1.0);
        let sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");
        sdc.current_solution(2);
    }

    #[test]
    fn failed_solve_leaves_no_stale_correction() {
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), FailingSolver, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");
        sdc.prepare();
        sdc.set_delta(0, &[0.5]).expect("lane 0 exists");
        assert!(sdc.solve().is_err());
        sdc.update();
        assert_eq!(sdc.previous_solution(0)[0], 1.0);
        assert_eq!(sdc.status(0), SdcStatus::StartNode);
        assert_eq!(sdc.current_solution(0)[0], 1.0);
    }

    #[test]
    fn jacobian_layout_is_validated_against_the_system() {
        let y0 = VectorSet::broadcast(&[1.0, 0.0, 0.0], 1);
        let mut sdc = SdcIntegrator::new(Robertson::default(), DenseLu, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");
        cycle(&mut sdc);

        sdc.set_jacobian_layout(vec![0, 1, 2, 0, 1, 2, 0, 1, 2], vec![0, 3, 6, 9])
            .expect("dense layout matches");
        assert_eq!(sdc.jacobian_layout().nnz(), 9);
        assert_eq!(sdc.linear_system(0).0, vec![0.0; 9]);

        assert_err_contains(
            sdc.set_jacobian_layout(vec![0, 1, 2], vec![0, 1, 2, 3]),
            "system reports nnz = 9",
        );
        assert_err_contains(
            sdc.set_jacobian_layout(vec![0, 1, 0, 1], vec![0, 2, 4]),
            "dimension mismatch",
        );
        assert_err_contains(
            sdc.set_jacobian_layout(vec![1, 2, 0, 1, 2, 0, 1, 0, 1], vec![0, 2, 5, 9]),
            "diagonal entry of row 0",
        );
        sdc.integrate(1_000_000).expect("integration should finish");
        assert_eq!(sdc.status(0), SdcStatus::Completed);
    }

    #[test]
    fn quadrature_of_constant_rate_is_rate_times_spacing() {
        let y0 = VectorSet::filled(2, 1, 1.0);
        let system = ConstantRate {
            rates: vec![2.0, -1.0],
        };
        let mut sdc = SdcIntegrator::new(system, DenseLu, Sequential, fixed_step(0.2), &y0)
            .expect("integrator should build");
        sdc.prepare();
        let q = sdc.q_node(0);
        assert!((q[0] - 0.2).abs() < 1e-15);
        assert!((q[1] + 0.1).abs() < 1e-15);

        sdc.solve().expect("solve");
        sdc.update();
        sdc.integrate(10_000).expect("integration should finish");
        let y = sdc.current_solution(0);
        assert!((y[0] - 3.0).abs() < 1e-12);
        assert!(y[1].abs() < 1e-12);
    }

    #[test]
    fn adaptive_steps_stay_within_growth_band() {
        let settings = SdcSettings {
            end_time: 5.0,
            tolerance: 1e-8,
            ..SdcSettings::default()
        };
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::new(vec![2.0]), DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        assert!((sdc.time_step(0) - 0.5).abs() < 1e-15);

        let mut step = 0;
        let mut dt = sdc.time_step(0);
        while !sdc.all_finished() {
            cycle(&mut sdc);
            let last = sdc.number_nodes() - 1;
            assert!(sdc.time_nodes(0)[last] <= 5.0);
            if sdc.status(0) == SdcStatus::StartTimestep && sdc.counters(0).step != step {
                step = sdc.counters(0).step;
                let next = sdc.time_step(0);
                let remaining = 5.0 - sdc.time_nodes(0)[last];
                if next != remaining {
                    let ratio = next / dt;
                    assert!(ratio >= 0.25 - 1e-12 && ratio <= 4.0 + 1e-12, "ratio {ratio}");
                }
                dt = next;
            }
        }
        assert_eq!(sdc.status(0), SdcStatus::Completed);
        assert!((sdc.current_time(0) - 5.0).abs() < 1e-15);
    }

    #[test]
    fn robertson_conserves_mass() {
        let settings = SdcSettings {
            end_time: 0.1,
            tolerance: 1e-8,
            ..fixed_step(1e-3)
        };
        let y0 = VectorSet::broadcast(&[1.0, 0.0, 0.0], 1);
        let mut sdc = SdcIntegrator::new(Robertson::default(), DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        let mut guard = 0;
        while !sdc.all_finished() {
            cycle(&mut sdc);
            let y = sdc.current_solution(0);
            assert!((y.iter().sum::<f64>() - 1.0).abs() < 1e-10);
            guard += 1;
            assert!(guard < 100_000, "integration did not terminate");
        }

        assert_eq!(sdc.status(0), SdcStatus::Completed);
        let y = sdc.current_solution(0);
        assert!((y[0] - 0.996).abs() < 1e-3, "y0 = {}", y[0]);
        assert!(y[1] > 0.0 && y[1] < 1e-4, "y1 = {}", y[1]);
    }

    #[test]
    fn threaded_batch_matches_sequential() {
        let settings = SdcSettings {
            end_time: 0.05,
            tolerance: 1e-8,
            ..fixed_step(1e-3)
        };
        let lanes = 6;
        let values: Vec<f64> = (0..lanes)
            .flat_map(|l| {
                let a = 1.0 - 0.1 * l as f64;
                [a, 0.0, 1.0 - a]
            })
            .collect();
        let y0 = VectorSet::from_lane_major(3, lanes, &values);

        let mut seq = SdcIntegrator::new(Robertson::default(), DenseLu, Sequential, settings, &y0)
            .expect("integrator should build");
        let mut par = SdcIntegrator::new(
            Robertson::default(),
            DenseLu,
            Threaded::with_min_len(1),
            settings,
            &y0,
        )
        .expect("integrator should build");
        let a = seq.integrate(1_000_000).expect("sequential run");
        let b = par.integrate(1_000_000).expect("threaded run");

        assert_eq!(a, b);
        assert_eq!(a.completed, lanes);
        let (ys, yp) = (seq.final_solutions(), par.final_solutions());
        for (s, p) in ys.as_slice().iter().zip(yp.as_slice()) {
            assert!((s - p).abs() < 1e-14);
        }
    }

    #[test]
    fn external_delta_is_applied_by_update() {
        let y0 = VectorSet::filled(1, 2, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");
        assert!(!sdc.is_started(0));

        sdc.prepare();
        sdc.set_delta(0, &[0.5]).expect("lane 0 exists");
        sdc.set_delta(1, &[0.0]).expect("lane 1 exists");
        sdc.update();

        assert!(sdc.is_started(0));
        assert_eq!(sdc.status(0), SdcStatus::StartNewton);
        assert!((sdc.current_solution(0)[0] - 1.5).abs() < 1e-15);
        assert!((sdc.newton_error(0) - 0.5 / 1.5).abs() < 1e-12);
        assert_eq!(sdc.previous_solution(0)[0], 1.0);
        assert!((sdc.current_time(0) - 0.05).abs() < 1e-15);
        assert_eq!(sdc.previous_time(0), 0.0);
        // A zero correction converges immediately.
        assert_eq!(sdc.status(1), SdcStatus::StartNode);

        assert_err_contains(sdc.set_delta(2, &[0.0]), "out of range");
        assert_err_contains(sdc.set_delta(0, &[0.0, 1.0]), "dimension mismatch");
    }

    #[test]
    fn solver_failure_names_the_lane() {
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), FailingSolver, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");
        sdc.prepare();
        let err = sdc.solve().expect_err("solve should fail");
        let message = format!("{err:#}");
        assert!(message.contains("lane 0"), "got \"{message}\"");
        assert!(message.contains("singular"), "got \"{message}\"");
    }

    #[test]
    fn integrate_reports_iteration_budget() {
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");
        let err = sdc.integrate(3).expect_err("budget too small");
        assert!(format!("{err}").contains("did not finish"));
    }

    #[test]
    fn rejects_invalid_construction() {
        let y0 = VectorSet::filled(1, 1, 1.0);
        assert_err_contains(
            SdcIntegrator::new(MisreportedNnz, DenseLu, Sequential, SdcSettings::default(), &y0),
            "nnz",
        );
        assert_err_contains(
            SdcIntegrator::new(
                LinearDecay::unit(),
                DenseLu,
                Sequential,
                SdcSettings::default(),
                &VectorSet::zeros(1, 0),
            ),
            "at least one lane",
        );
        assert_err_contains(
            SdcIntegrator::new(
                LinearDecay::unit(),
                DenseLu,
                Sequential,
                SdcSettings::default(),
                &VectorSet::zeros(2, 1),
            ),
            "dimension mismatch",
        );
        assert_err_contains(
            SdcIntegrator::new(
                LinearDecay::unit(),
                DenseLu,
                Sequential,
                SdcSettings {
                    end_time: -1.0,
                    ..SdcSettings::default()
                },
                &y0,
            ),
            "invalid settings",
        );
    }

    #[test]
    fn initialize_restarts_the_batch() {
        let y0 = VectorSet::filled(1, 1, 1.0);
        let mut sdc = SdcIntegrator::new(LinearDecay::unit(), DenseLu, Sequential, fixed_step(0.1), &y0)
            .expect("integrator should build");
        sdc.integrate(100_000).expect("first run");
        assert!(sdc.all_finished());

        let restart = SdcSettings {
            start_time: 1.0,
            end_time: 2.0,
            ..fixed_step(0.1)
        };
        sdc.initialize(&VectorSet::filled(1, 1, 2.0), restart)
            .expect("reinitialize");
        assert_eq!(sdc.status(0), SdcStatus::StartTimestep);
        assert_eq!(sdc.counters(0), LaneCounters::START);
        assert_eq!(sdc.current_solution(0)[0], 2.0);
        assert_eq!(sdc.time_nodes(0)[0], 1.0);
        sdc.integrate(100_000).expect("second run");
        assert!((sdc.current_solution(0)[0] - 2.0 * (-1.0f64).exp()).abs() < 1e-6);

        let report = sdc.report(0);
        assert_eq!(report.status, SdcStatus::Completed);
        assert_eq!(report.solution.len(), 1);
    }
}
