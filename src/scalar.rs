//! Number types a discretised model can be evaluated with.
//!
//! Evaluation is written once, generically over [`Scalar`], and run either on
//! plain `f64` or on dual numbers to obtain exact Jacobian columns.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub trait Scalar:
    Clone
    + Debug
    + From<f64>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Mul<f64, Output = Self>
{
    fn exp(&self) -> Self;
    fn ln(&self) -> Self;
    fn sqrt(&self) -> Self;
    fn powf(&self, n: f64) -> Self;
    /// Real part, used for comparisons.
    fn re(&self) -> f64;

    fn abs(&self) -> Self {
        if self.re() < 0.0 {
            -self.clone()
        } else {
            self.clone()
        }
    }

    fn pow(&self, exponent: &Self) -> Self {
        (self.ln() * exponent.clone()).exp()
    }
}

impl Scalar for f64 {
    fn exp(&self) -> Self {
        f64::exp(*self)
    }

    fn ln(&self) -> Self {
        f64::ln(*self)
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn powf(&self, n: f64) -> Self {
        f64::powf(*self, n)
    }

    fn re(&self) -> f64 {
        *self
    }

    fn abs(&self) -> Self {
        f64::abs(*self)
    }

    fn pow(&self, exponent: &Self) -> Self {
        f64::powf(*self, *exponent)
    }
}

#[cfg(feature = "autodiff")]
impl Scalar for num_dual::Dual64 {
    fn exp(&self) -> Self {
        num_dual::DualNum::exp(self)
    }

    fn ln(&self) -> Self {
        num_dual::DualNum::ln(self)
    }

    fn sqrt(&self) -> Self {
        num_dual::DualNum::sqrt(self)
    }

    fn powf(&self, n: f64) -> Self {
        num_dual::DualNum::powf(self, n)
    }

    fn re(&self) -> f64 {
        self.re
    }
}
