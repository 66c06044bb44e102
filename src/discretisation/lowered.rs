//! Flat vector expressions produced by the discretisation.

use std::rc::Rc;

use nalgebra_sparse::CsrMatrix;

use crate::error::{ModelError, ModelResult};
use crate::expression::MathFunction;
use crate::scalar::Scalar;
use crate::sparse::mul_vec;

/// Element-wise arithmetic between two vectors.
///
/// An operand of length one is broadcast against the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elementwise {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

/// A vector-valued expression over the flattened state `y` and time `t`.
///
/// Constant subtrees are folded as the expression is assembled, so a
/// lowered expression that does not touch the state is a single
/// [`Lowered::Constant`].
#[derive(Debug, Clone)]
pub enum Lowered {
    Constant(Vec<f64>),
    /// A contiguous slice of the state vector.
    State { start: usize, len: usize },
    Time,
    Linear(Rc<CsrMatrix<f64>>, Box<Lowered>),
    Negate(Box<Lowered>),
    Elementwise(Elementwise, Box<Lowered>, Box<Lowered>),
    Function(MathFunction, Box<Lowered>),
    Minimum(Box<Lowered>),
    Maximum(Box<Lowered>),
}

impl Lowered {
    pub fn len(&self) -> usize {
        match self {
            Lowered::Constant(values) => values.len(),
            Lowered::State { len, .. } => *len,
            Lowered::Time | Lowered::Minimum(_) | Lowered::Maximum(_) => 1,
            Lowered::Linear(matrix, _) => matrix.nrows(),
            Lowered::Negate(child) | Lowered::Function(_, child) => child.len(),
            Lowered::Elementwise(_, left, right) => left.len().max(right.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Lowered::Constant(_))
    }

    /// Whether evaluation reads `y` or `t`.
    pub fn depends_on_state(&self) -> bool {
        match self {
            Lowered::Constant(_) => false,
            Lowered::State { .. } | Lowered::Time => true,
            Lowered::Linear(_, child)
            | Lowered::Negate(child)
            | Lowered::Function(_, child)
            | Lowered::Minimum(child)
            | Lowered::Maximum(child) => child.depends_on_state(),
            Lowered::Elementwise(_, left, right) => {
                left.depends_on_state() || right.depends_on_state()
            }
        }
    }

    pub fn linear(matrix: CsrMatrix<f64>, child: Lowered) -> ModelResult<Lowered> {
        if matrix.ncols() != child.len() {
            return Err(ModelError::discretization(format!(
                "cannot apply a {}x{} operator to a vector of length {}",
                matrix.nrows(),
                matrix.ncols(),
                child.len()
            )));
        }
        Ok(Lowered::Linear(Rc::new(matrix), Box::new(child)).folded())
    }

    pub fn negate(child: Lowered) -> Lowered {
        Lowered::Negate(Box::new(child)).folded()
    }

    pub fn elementwise(op: Elementwise, left: Lowered, right: Lowered) -> ModelResult<Lowered> {
        let (a, b) = (left.len(), right.len());
        if a != b && a != 1 && b != 1 {
            return Err(ModelError::discretization(format!(
                "cannot combine vectors of length {} and {}",
                a, b
            )));
        }
        Ok(Lowered::Elementwise(op, Box::new(left), Box::new(right)).folded())
    }

    pub fn function(func: MathFunction, child: Lowered) -> Lowered {
        Lowered::Function(func, Box::new(child)).folded()
    }

    pub fn minimum(child: Lowered) -> Lowered {
        Lowered::Minimum(Box::new(child)).folded()
    }

    pub fn maximum(child: Lowered) -> Lowered {
        Lowered::Maximum(Box::new(child)).folded()
    }

    /// Sum of several vectors of equal length.
    pub fn sum(terms: Vec<Lowered>) -> ModelResult<Lowered> {
        let mut terms = terms.into_iter();
        let first = terms
            .next()
            .ok_or_else(|| ModelError::discretization("cannot sum an empty list of terms"))?;
        terms.try_fold(first, |acc, term| Lowered::elementwise(Elementwise::Add, acc, term))
    }

    /// Stretches a length-one vector to `len` entries.
    pub fn broadcast_to(self, len: usize) -> ModelResult<Lowered> {
        match self.len() {
            n if n == len => Ok(self),
            1 => Lowered::linear(crate::sparse::ones_column(len), self),
            n => Err(ModelError::discretization(format!(
                "expected a vector of length {}, found {}",
                len, n
            ))),
        }
    }

    fn folded(self) -> Lowered {
        if self.is_constant() || self.depends_on_state() {
            return self;
        }
        Lowered::Constant(self.evaluate::<f64>(0.0, &[]))
    }

    pub fn evaluate<T: Scalar>(&self, t: f64, y: &[T]) -> Vec<T> {
        match self {
            Lowered::Constant(values) => values.iter().map(|&v| T::from(v)).collect(),
            Lowered::State { start, len } => y[*start..start + len].to_vec(),
            Lowered::Time => vec![T::from(t)],
            Lowered::Linear(matrix, child) => mul_vec(matrix, &child.evaluate(t, y)),
            Lowered::Negate(child) => child.evaluate(t, y).into_iter().map(|v| -v).collect(),
            Lowered::Function(func, child) => child
                .evaluate(t, y)
                .iter()
                .map(|v| match func {
                    MathFunction::Exp => v.exp(),
                    MathFunction::Log => v.ln(),
                    MathFunction::Sqrt => v.sqrt(),
                    MathFunction::Abs => v.abs(),
                })
                .collect(),
            Lowered::Minimum(child) => extremum(child.evaluate(t, y), |a, b| a < b),
            Lowered::Maximum(child) => extremum(child.evaluate(t, y), |a, b| a > b),
            Lowered::Elementwise(op, left, right) => {
                let a = left.evaluate(t, y);
                let n = a.len().max(right.len());
                // Constant exponents keep negative bases well defined.
                if let (Elementwise::Power, Lowered::Constant(e)) = (op, right.as_ref()) {
                    if e.len() == 1 {
                        return a.iter().map(|v| v.powf(e[0])).collect();
                    }
                }
                let b = right.evaluate(t, y);
                (0..n)
                    .map(|i| {
                        let x = a[if a.len() == 1 { 0 } else { i }].clone();
                        let z = b[if b.len() == 1 { 0 } else { i }].clone();
                        match op {
                            Elementwise::Add => x + z,
                            Elementwise::Subtract => x - z,
                            Elementwise::Multiply => x * z,
                            Elementwise::Divide => x / z,
                            Elementwise::Power => x.pow(&z),
                        }
                    })
                    .collect()
            }
        }
    }
}

fn extremum<T: Scalar>(values: Vec<T>, better: impl Fn(f64, f64) -> bool) -> Vec<T> {
    let best = values.into_iter().reduce(|acc, v| if better(v.re(), acc.re()) { v } else { acc });
    vec![best.unwrap_or_else(|| T::from(f64::NAN))]
}
