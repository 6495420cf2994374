use crate::traits::Scalar;
use std::ops::{AddAssign, Deref, DerefMut, DivAssign, MulAssign, SubAssign};

/// Fixed-length numeric vector for a single lane.
///
/// The length is fixed at construction; every elementwise operation requires
/// operands of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct RealVector<T: Scalar> {
    data: Vec<T>,
}

impl<T: Scalar> RealVector<T> {
    pub fn zeros(len: usize) -> Self {
        Self::filled(len, T::zero())
    }

    pub fn filled(len: usize, value: T) -> Self {
        Self {
            data: vec![value; len],
        }
    }

    pub fn from_slice(values: &[T]) -> Self {
        Self {
            data: values.to_vec(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Copies `source` into `self`.
    pub fn equals(&mut self, source: &[T]) {
        self.data.copy_from_slice(source);
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn negate(&mut self) -> &mut Self {
        self.data.iter_mut().for_each(|v| *v = -*v);
        self
    }

    pub fn abs(&mut self) -> &mut Self {
        self.data.iter_mut().for_each(|v| *v = v.abs());
        self
    }

    pub fn inv(&mut self) -> &mut Self {
        self.data.iter_mut().for_each(|v| *v = v.recip());
        self
    }

    pub fn max_norm(&self) -> T {
        self.data
            .iter()
            .fold(T::zero(), |acc, v| acc.max(v.abs()))
    }

    pub fn frobenius_norm(&self) -> T {
        self.sum_of_squares().sqrt()
    }

    pub fn rms_norm(&self) -> T {
        self.mean_square(self.sum_of_squares()).sqrt()
    }

    /// Weighted RMS norm: sqrt(sum((v_i * w_i)^2) / n).
    pub fn wrms_norm(&self, weights: &[T]) -> T {
        assert_eq!(weights.len(), self.data.len(), "weight length mismatch");
        let sum = self
            .data
            .iter()
            .zip(weights)
            .fold(T::zero(), |acc, (&v, &w)| acc + (v * w) * (v * w));
        self.mean_square(sum).sqrt()
    }

    pub fn min(&self) -> T {
        self.data.iter().fold(T::infinity(), |acc, &v| acc.min(v))
    }

    fn sum_of_squares(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &v| acc + v * v)
    }

    fn mean_square(&self, sum: T) -> T {
        if self.data.is_empty() {
            return T::zero();
        }
        sum / T::from_usize(self.data.len()).unwrap_or_else(T::one)
    }
}

impl<T: Scalar> Deref for RealVector<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T: Scalar> DerefMut for RealVector<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Scalar> From<Vec<T>> for RealVector<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

macro_rules! elementwise_ops {
    ($($trait:ident::$method:ident => $op:tt),* $(,)?) => {
        $(
            impl<T: Scalar> $trait<&RealVector<T>> for RealVector<T> {
                fn $method(&mut self, rhs: &RealVector<T>) {
                    assert_eq!(self.data.len(), rhs.data.len(), "vector length mismatch");
                    for (a, &b) in self.data.iter_mut().zip(rhs.data.iter()) {
                        *a = *a $op b;
                    }
                }
            }

            impl<T: Scalar> $trait<T> for RealVector<T> {
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
