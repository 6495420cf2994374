//! Batched vectors stored as a structure of arrays.
//!
//! A `VectorSet` holds `lanes` independent vectors of `components` entries each.
//! Storage is component-major (`data[c * lanes + l]`), so the same component of
//! every lane sits in one contiguous run and elementwise work vectorizes across
//! lanes. Reductions run over the component dimension and produce one scalar
//! per lane.

use crate::exec::ExecutionContext;
use crate::traits::Scalar;
use crate::vector::RealVector;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSet<T: Scalar> {
    components: usize,
    lanes: usize,
    data: Vec<T>,
}

impl<T: Scalar> VectorSet<T> {
    pub fn zeros(components: usize, lanes: usize) -> Self {
        Self::filled(components, lanes, T::zero())
    }

    pub fn filled(components: usize, lanes: usize, value: T) -> Self {
        Self {
            components,
            lanes,
            data: vec![value; components * lanes],
        }
    }

    /// Builds a set from lane-major values (`values[l * components + c]`).
    pub fn from_lane_major(components: usize, lanes: usize, values: &[T]) -> Self {
        assert_eq!(values.len(), components * lanes, "value count mismatch");
        let mut set = Self::zeros(components, lanes);
        for lane in 0..lanes {
            for c in 0..components {
                set.data[c * lanes + lane] = values[lane * components + c];
            }
        }
        set
    }

    /// Builds a set from component-major values (`values[c * lanes + l]`).
    pub fn from_component_major(components: usize, lanes: usize, values: Vec<T>) -> Self {
        assert_eq!(values.len(), components * lanes, "value count mismatch");
        Self {
            components,
            lanes,
            data: values,
        }
    }

    /// Builds a set with every lane equal to `vector`.
    pub fn broadcast(vector: &[T], lanes: usize) -> Self {
        let components = vector.len();
        let mut data = Vec::with_capacity(components * lanes);
        for &value in vector {
            data.extend(std::iter::repeat(value).take(lanes));
        }
        Self {
            components,
            lanes,
            data,
        }
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn index(&self, component: usize, lane: usize) -> usize {
        component * self.lanes + lane
    }

    #[inline]
    pub fn get(&self, component: usize, lane: usize) -> T {
        self.data[self.index(component, lane)]
    }

    #[inline]
    pub fn set(&mut self, component: usize, lane: usize, value: T) {
        let idx = self.index(component, lane);
        self.data[idx] = value;
    }

    /// Gathers one lane into a standalone vector.
    pub fn lane(&self, lane: usize) -> RealVector<T> {
        let mut out = RealVector::zeros(self.components);
        self.read_lane(lane, &mut out);
        out
    }

    pub fn read_lane(&self, lane: usize, out: &mut [T]) {
        assert!(lane < self.lanes, "lane {lane} out of range");
        for (c, v) in out.iter_mut().enumerate().take(self.components) {
            *v = self.data[c * self.lanes + lane];
        }
    }

    /// Scatters `values` into one lane.
    pub fn set_lane(&mut self, lane: usize, values: &[T]) {
        assert!(lane < self.lanes, "lane {lane} out of range");
        assert_eq!(values.len(), self.components, "component count mismatch");
        for (c, &v) in values.iter().enumerate() {
            self.data[c * self.lanes + lane] = v;
        }
    }

    /// Copies every lane of `source` into `self`.
    pub fn equals(&mut self, source: &VectorSet<T>) {
        self.check_shape(source);
        self.data.copy_from_slice(&source.data);
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn negate(&mut self) -> &mut Self {
        self.data.iter_mut().for_each(|v| *v = -*v);
        self
    }

    /// Runs `body(component, lane, &mut value)` over every entry.
    pub fn for_each_mut<E, F>(&mut self, exec: &E, body: F)
    where
        E: ExecutionContext,
        F: Fn(usize, usize, &mut T) + Sync + Send,
    {
        let lanes = self.lanes;
        exec.for_each(&mut self.data, |idx, v| body(idx / lanes, idx % lanes, v));
    }

    /// Copies lanes of `source` for which `mask(lane)` holds.
    pub fn copy_lanes_from<E, M>(&mut self, exec: &E, source: &VectorSet<T>, mask: M)
    where
        E: ExecutionContext,
        M: Fn(usize) -> bool + Sync + Send,
    {
        self.check_shape(source);
        let (lanes, src) = (self.lanes, &source.data);
        exec.for_each(&mut self.data, |idx, v| {
            if mask(idx % lanes) {
                *v = src[idx];
            }
        });
    }

    /// Multiplies every lane by its own scalar.
    pub fn mul_lanes<E: ExecutionContext>(&mut self, exec: &E, scalars: &[T]) {
        assert_eq!(scalars.len(), self.lanes, "lane count mismatch");
        let lanes = self.lanes;
        exec.for_each(&mut self.data, |idx, v| *v = *v * scalars[idx % lanes]);
    }

    /// Adds each lane's own scalar to every component of that lane.
    pub fn add_lanes<E: ExecutionContext>(&mut self, exec: &E, scalars: &[T]) {
        assert_eq!(scalars.len(), self.lanes, "lane count mismatch");
        let lanes = self.lanes;
        exec.for_each(&mut self.data, |idx, v| *v = *v + scalars[idx % lanes]);
    }

    /// Per-lane max norm into `out`.
    pub fn max_norm<E: ExecutionContext>(&self, exec: &E, out: &mut [T]) {
        let data = &self.data;
        self.reduce_lanes(exec, out, T::zero(), |acc, idx| acc.max(data[idx].abs()), |r| r);
    }

    /// Per-lane Frobenius (Euclidean) norm into `out`.
    pub fn frobenius_norm<E: ExecutionContext>(&self, exec: &E, out: &mut [T]) {
        let data = &self.data;
        self.reduce_lanes(
            exec,
            out,
            T::zero(),
            |acc, idx| acc + data[idx] * data[idx],
            |r| r.sqrt(),
        );
    }

    /// Per-lane RMS norm into `out`.
    pub fn rms_norm<E: ExecutionContext>(&self, exec: &E, out: &mut [T]) {
        let data = &self.data;
        let n = self.component_count();
        self.reduce_lanes(
            exec,
            out,
            T::zero(),
            |acc, idx| acc + data[idx] * data[idx],
            |r| (r / n).sqrt(),
        );
    }

    /// Per-lane weighted RMS norm against `weights` into `out`.
    pub fn wrms_norm<E: ExecutionContext>(&self, exec: &E, weights: &VectorSet<T>, out: &mut [T]) {
        self.check_shape(weights);
        let (data, w) = (&self.data, &weights.data);
        let n = self.component_count();
        self.reduce_lanes(
            exec,
            out,
            T::zero(),
            |acc, idx| {
                let scaled = data[idx] * w[idx];
                acc + scaled * scaled
            },
            |r| (r / n).sqrt(),
        );
    }

    /// Per-lane minimum component into `out`.
    pub fn min<E: ExecutionContext>(&self, exec: &E, out: &mut [T]) {
        let data = &self.data;
        self.reduce_lanes(exec, out, T::infinity(), |acc, idx| acc.min(data[idx]), |r| r);
    }

    /// Folds the components of every lane starting from `seed`.
    ///
    /// Barriers bracket the accumulation so that all elementwise writes are
    /// visible before it starts and every lane's result before it is read.
    fn reduce_lanes<E, F, G>(&self, exec: &E, out: &mut [T], seed: T, fold: F, finish: G)
    where
        E: ExecutionContext,
        F: Fn(T, usize) -> T + Sync + Send,
        G: Fn(T) -> T + Sync + Send,
    {
        assert_eq!(out.len(), self.lanes, "lane count mismatch");
        let (lanes, components) = (self.lanes, self.components);
        exec.barrier();
        exec.for_each(out, |lane, result| {
            let acc = (0..components).fold(seed, |acc, c| fold(acc, c * lanes + lane));
            *result = finish(acc);
        });
        exec.barrier();
    }

    fn component_count(&self) -> T {
        T::from_usize(self.components.max(1)).unwrap_or_else(T::one)
    }

    fn check_shape(&self, other: &VectorSet<T>) {
        assert!(
            self.components == other.components && self.lanes == other.lanes,
            "vector set shape mismatch: {}x{} vs {}x{}",
            self.components,
            self.lanes,
            other.components,
            other.lanes
        );
    }
}

macro_rules! elementwise_ops {
    ($($trait:ident::$method:ident => $op:tt),* $(,)?) => {
        $(
            impl<T: Scalar> $trait<&VectorSet<T>> for VectorSet<T> {
                fn $method(&mut self, rhs: &VectorSet<T>) {
                    self.check_shape(rhs);
                    for (a, &b) in self.data.iter_mut().zip(rhs.data.iter()) {
                        *a = *a $op b;
                    }
                }
            }

            impl<T: Scalar> $trait<T> for VectorSet<T> {
                fn $method(&mut self, rhs: T) {
                    for a in self.data.iter_mut() {
                        *a = *a $op rhs;
                    }
                }
            }
        )*
    };
}

elementwise_ops!(
    AddAssign::add_assign => +,
    SubAssign::sub_assign => -,
    MulAssign::mul_assign => *,
    DivAssign::div_assign => /,
);
