//! Time integration of discretised models.
//!
//! Every solver implements [`Solver`]: it receives a [`DiscretisedModel`]
//! and a fixed grid of output times, owns its stepping policy, and returns a
//! [`Solution`] sampled on that grid. A termination event cuts the solve
//! short; the solution then ends at the located event time.
//!
//! # Solvers Provided
//!
//! - [`BackwardEuler`](implicit::BackwardEuler): adaptive implicit Euler for
//!   semi-explicit DAEs, with Newton iterations on the model Jacobian
//! - `ExplicitIntegrator` (feature `solvers`): explicit Runge-Kutta methods
//!   from `differential-equations` for models without algebraic states
//! - [`NewtonRaphson`]: the nonlinear solver used inside implicit steps
//!
//! # Examples
//!
//! ```
//! use voltaic::solvers::{NewtonRaphson, SolverError};
//! use nalgebra::DMatrix;
//!
//! // x^2 - 4 = 0
//! let f = |x: &[f64]| (vec![x[0] * x[0] - 4.0], DMatrix::from_element(1, 1, 2.0 * x[0]));
//! let (root, _) = NewtonRaphson::new(1e-10, 20).solve(f, &[1.0])?;
//! assert!((root[0] - 2.0).abs() < 1e-8);
//! # Ok::<(), SolverError>(())
//! ```

pub mod implicit;
#[cfg(feature = "solvers")]
pub mod integration;

pub use implicit::BackwardEuler;

use std::time::Duration;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::discretisation::{DiscretisedModel, ProcessedVariable};
use crate::model::EventType;

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Errors that can occur during solving.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    /// Maximum iterations exceeded without convergence
    #[error("Newton iteration did not converge within {0} iterations")]
    MaxIterationsExceeded(usize),
    /// Singular Jacobian matrix encountered
    #[error("Singular Jacobian matrix")]
    SingularJacobian,
    /// Step size too small
    #[error("Step size {step:e} too small at t = {t}")]
    StepSizeTooSmall { t: f64, step: f64 },
    /// Solution diverged
    #[error("Solution diverged")]
    Diverged,
    /// A vector does not match the model's state layout
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// The output times are unusable
    #[error("Invalid time grid: {0}")]
    InvalidTimeGrid(String),
    /// The external integrator failed
    #[error("Integrator failed: {0}")]
    IntegratorFailed(String),
    /// The requested solver needs the 'solvers' feature
    #[error("This solver requires the 'solvers' feature to be enabled")]
    FeatureNotEnabled,
    /// The model has algebraic states an explicit integrator cannot handle
    #[error("Explicit integration needs a pure ODE model, found {0} algebraic states")]
    AlgebraicStates(usize),
    /// Too many states for a fixed-capacity integrator
    #[error("Problem has {0} states but integrator capacity is {1}")]
    TooManyStates(usize, usize),
}

/// A time integrator for discretised models.
pub trait Solver {
    /// Relative tolerance of the error control.
    fn rtol(&self) -> f64;

    /// Integrates `model` from `t_eval[0]`, sampling at every time in `t_eval`.
    fn solve(&self, model: &DiscretisedModel, t_eval: &[f64]) -> SolverResult<Solution>;
}

/// Why a solve stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    FinalTime,
    /// A termination event fired
    Event(String),
}

/// States sampled on the output grid.
#[derive(Debug, Clone)]
pub struct Solution {
    pub t: Vec<f64>,
    /// One state vector per entry of `t`
    pub y: Vec<Vec<f64>>,
    pub solve_time: Duration,
    pub termination: Termination,
    pub stats: SolverStats,
}

impl Solution {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn last_state(&self) -> Option<&[f64]> {
        self.y.last().map(Vec::as_slice)
    }

    /// Values of a processed variable at every output time.
    pub fn evaluate(&self, variable: &ProcessedVariable) -> Vec<Vec<f64>> {
        self.t.iter().zip(&self.y).map(|(&t, y)| variable.evaluate(t, y)).collect()
    }
}

/// Statistics from a solver run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverStats {
    /// Accepted time steps
    pub steps: usize,
    /// Rejected time steps
    pub rejected_steps: usize,
    /// Newton iterations across all steps
    pub newton_iterations: usize,
    /// Number of Jacobian evaluations
    pub jacobian_evals: usize,
}

/// Newton-Raphson solver for nonlinear algebraic equations.
///
/// Solves systems of the form F(x) = 0 using the Newton-Raphson method:
/// x_{k+1} = x_k - J^{-1} F(x_k)
///
/// where J is the Jacobian matrix dF/dx.
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonRaphson {
    /// Convergence tolerance on the residual norm
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Relaxation factor (1.0 = full Newton step)
    pub relaxation: f64,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        NewtonRaphson::new(1e-10, 20)
    }
}

impl NewtonRaphson {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        NewtonRaphson { tolerance, max_iterations, relaxation: 1.0 }
    }

    /// Damped Newton method.
    pub fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }

    /// Solves `F(x) = 0` from `x0`, returning the root and the iteration count.
    ///
    /// `f` returns the residuals and the Jacobian at `x`.
    pub fn solve<F>(&self, f: F, x0: &[f64]) -> SolverResult<(Vec<f64>, usize)>
    where
        F: Fn(&[f64]) -> (Vec<f64>, DMatrix<f64>),
    {
        let mut x = x0.to_vec();
        for iteration in 0..self.max_iterations {
            let (residuals, jacobian) = f(&x);
            let norm = residuals.iter().map(|r| r * r).sum::<f64>().sqrt();
            if !norm.is_finite() {
                return Err(SolverError::Diverged);
            }
            if norm < self.tolerance {
                return Ok((x, iteration));
            }
            let dx = jacobian
                .lu()
                .solve(&(-DVector::from_vec(residuals)))
                .ok_or(SolverError::SingularJacobian)?;
            for (xi, dxi) in x.iter_mut().zip(dx.iter()) {
                *xi += self.relaxation * dxi;
            }
            if dx.norm() < self.tolerance * (1.0 + DVector::from_column_slice(&x).norm()) {
                return Ok((x, iteration + 1));
            }
        }
        Err(SolverError::MaxIterationsExceeded(self.max_iterations))
    }
}

/// Checks that the output grid has at least two strictly increasing times.
pub(crate) fn validate_time_grid(t_eval: &[f64]) -> SolverResult<()> {
    if t_eval.len() < 2 {
        return Err(SolverError::InvalidTimeGrid("need at least two output times".to_string()));
    }
    if let Some(w) = t_eval.windows(2).find(|w| !(w[1] > w[0])) {
        return Err(SolverError::InvalidTimeGrid(format!(
            "times must be strictly increasing, found {} then {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// Watches event signs across accepted steps.
#[derive(Debug, Clone)]
pub(crate) struct EventMonitor {
    previous: Vec<f64>,
    warned: Vec<bool>,
}

impl EventMonitor {
    pub(crate) fn new(model: &DiscretisedModel, t: f64, y: &[f64]) -> Self {
        let previous = model.event_values(t, y);
        EventMonitor { warned: vec![false; previous.len()], previous }
    }

    /// Name of a termination event that is already negative.
    pub(crate) fn initially_fired(&self, model: &DiscretisedModel) -> Option<String> {
        model
            .events()
            .iter()
            .zip(&self.previous)
            .find(|(e, &v)| e.event_type == EventType::Termination && v < 0.0)
            .map(|(e, _)| e.name.clone())
    }

    /// Checks the step `(t0, y0) -> (t1, y1)`. Returns the first termination
    /// event crossed with its linearly interpolated time and state.
    pub(crate) fn check(
        &mut self,
        model: &DiscretisedModel,
        (t0, y0): (f64, &[f64]),
        (t1, y1): (f64, &[f64]),
    ) -> Option<(String, f64, Vec<f64>)> {
        let current = model.event_values(t1, y1);
        let mut fired: Option<(usize, f64)> = None;
        for (i, event) in model.events().iter().enumerate() {
            let (before, after) = (self.previous[i], current[i]);
            if !(before >= 0.0 && after < 0.0) {
                continue;
            }
            match event.event_type {
                EventType::Termination => {
                    let theta = before / (before - after);
                    if fired.map_or(true, |(_, best)| theta < best) {
                        fired = Some((i, theta));
                    }
                }
                EventType::Warning | EventType::InterpolantExtrapolation => {
                    if !self.warned[i] {
                        warn!("Event '{}' triggered at t = {}", event.name, t1);
                        self.warned[i] = true;
                    }
                }
            }
        }
        self.previous = current;
        fired.map(|(i, theta)| {
            let y = y0.iter().zip(y1).map(|(a, b)| a + theta * (b - a)).collect();
            (model.events()[i].name.clone(), t0 + theta * (t1 - t0), y)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::discretisation::Discretisation;
    use crate::domain::{Domain, Domains};
    use crate::error::ModelResult;
    use crate::expression::{Expr, Variable};
    use crate::geometry::Geometry;
    use crate::mesh::{Mesh, VarPts};
    use crate::model::{Equations, Event, ModelBuilder, StateKey, Submodel, Variables};

    /// `u' = -u` from `u = 1`, stopped once `u` drops below `threshold`.
    struct Decay {
        threshold: f64,
    }

    impl Submodel for Decay {
        fn name(&self) -> &str {
            "decay"
        }

        fn get_fundamental_variables(&self) -> ModelResult<Variables> {
            let mut v = Variables::new();
            v.insert("u", Expr::from(Variable::new("u", Domains::new(vec![Domain::CurrentCollector]))));
            Ok(v)
        }

        fn set_rhs(&self, variables: &Variables) -> ModelResult<Equations> {
            let u = variables.require("u")?;
            let mut rhs = Equations::new();
            rhs.insert(StateKey::from_expr(u)?, -u);
            Ok(rhs)
        }

        fn set_initial_conditions(&self, variables: &Variables) -> ModelResult<Equations> {
            let mut ics = Equations::new();
            ics.insert(StateKey::from_expr(variables.require("u")?)?, Expr::scalar(1.0));
            Ok(ics)
        }

        fn set_events(&self, variables: &Variables) -> ModelResult<Vec<Event>> {
            Ok(vec![Event::termination("Half life", variables.require("u")? - self.threshold)])
        }
    }

    pub(super) fn decay_model(threshold: f64) -> DiscretisedModel {
        let model = ModelBuilder::new("decay").with_submodel(Decay { threshold }).build().unwrap();
        let mesh = Mesh::new(&Geometry::default(), &VarPts::uniform(3)).unwrap();
        Discretisation::new(Rc::new(mesh)).process_model(&model).unwrap()
    }

    #[test]
    fn test_event_on_threshold_has_not_fired() {
        let model = decay_model(0.5);
        let mut monitor = EventMonitor::new(&model, 0.0, &[0.5]);
        assert_eq!(model.event_values(0.0, &[0.5]), vec![0.0]);
        assert!(monitor.initially_fired(&model).is_none());

        // Landing exactly on zero is not a crossing; leaving it is
        assert!(monitor.check(&model, (0.0, &[0.5]), (1.0, &[0.5])).is_none());
        let (name, t, y) = monitor.check(&model, (1.0, &[0.5]), (2.0, &[0.25])).unwrap();
        assert_eq!(name, "Half life");
        assert_eq!(t, 1.0);
        assert_eq!(y, vec![0.5]);
    }

    #[test]
    fn test_event_crossing_is_interpolated() {
        let model = decay_model(0.5);
        let mut monitor = EventMonitor::new(&model, 0.0, &[1.0]);
        assert!(monitor.check(&model, (0.0, &[1.0]), (1.0, &[0.75])).is_none());
        let (_, t, y) = monitor.check(&model, (1.0, &[0.75]), (2.0, &[0.25])).unwrap();
        assert!((t - 1.5).abs() < 1e-12);
        assert!((y[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_newton_raphson_linear() {
        // Solve x - 5 = 0
        let f = |x: &[f64]| (vec![x[0] - 5.0], DMatrix::from_element(1, 1, 1.0));
        let (solution, iterations) = NewtonRaphson::new(1e-6, 10).solve(f, &[0.0]).unwrap();
        assert!((solution[0] - 5.0).abs() < 1e-6);
        assert!(iterations <= 2);
    }

    #[test]
    fn test_newton_raphson_nonlinear_system() {
        // x^2 + y^2 = 4, x = y
        let f = |v: &[f64]| {
            let residual = vec![v[0] * v[0] + v[1] * v[1] - 4.0, v[0] - v[1]];
            let jacobian = DMatrix::from_row_slice(2, 2, &[2.0 * v[0], 2.0 * v[1], 1.0, -1.0]);
            (residual, jacobian)
        };
        let (solution, _) = NewtonRaphson::new(1e-10, 50).solve(f, &[1.0, 0.5]).unwrap();
        assert!((solution[0] - 2f64.sqrt()).abs() < 1e-8);
        assert!((solution[1] - 2f64.sqrt()).abs() < 1e-8);
    }

    #[test]
    fn test_newton_raphson_singular() {
        let f = |x: &[f64]| (vec![x[0] - 1.0], DMatrix::zeros(1, 1));
        let err = NewtonRaphson::default().solve(f, &[0.0]).unwrap_err();
        assert_eq!(err, SolverError::SingularJacobian);
    }

    #[test]
    fn test_time_grid_validation() {
        assert!(validate_time_grid(&[0.0, 1.0, 2.0]).is_ok());
        assert!(validate_time_grid(&[0.0]).is_err());
        assert!(matches!(
            validate_time_grid(&[0.0, 1.0, 1.0]),
            Err(SolverError::InvalidTimeGrid(_))
        ));
    }

    #[test]
    fn test_solver_error_display() {
        let err = SolverError::FeatureNotEnabled;
        assert_eq!(err.to_string(), "This solver requires the 'solvers' feature to be enabled");
        let err = SolverError::DimensionMismatch { expected: 3, found: 2 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, found 2");
    }
}
