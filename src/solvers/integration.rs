//! Explicit Runge-Kutta integration of pure-ODE models.
//!
//! Wraps the integrators of the
//! [`differential-equations`](https://docs.rs/differential-equations/) crate.
//! The state lives in a fixed-capacity `SVector<f64, N>`; models with more
//! than `N` states, or with any algebraic state, are rejected.

use std::time::Instant;

use differential_equations::methods::{ExplicitRungeKutta, ImplicitRungeKutta};
use differential_equations::ode::{ODEProblem, ODE};
use nalgebra::SVector;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::discretisation::DiscretisedModel;
use crate::solvers::{
    validate_time_grid, EventMonitor, Solution, Solver, SolverError, SolverResult, SolverStats,
    Termination,
};

/// Integration methods available for time-stepping.
///
/// For details on each method, refer to the
/// [`differential-equations`](https://docs.rs/differential-equations/) crate
/// documentation. Fixed-step methods take their step from the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationMethod {
    /// Adaptive Dormand-Prince 5(4)
    Dopri5,
    /// Adaptive implicit Radau5
    Radau5,
    /// Fixed-step 4th-order Runge-Kutta
    RK4,
    /// Fixed-step forward Euler
    Euler,
    /// Fixed-step Heun method
    Heun,
}

/// ODE wrapper around a discretised model.
struct ModelODE<'a, const N: usize> {
    model: &'a DiscretisedModel,
    n: usize,
}

impl<const N: usize> ODE<f64, SVector<f64, N>> for ModelODE<'_, N> {
    fn diff(&self, t: f64, y: &SVector<f64, N>, dydt: &mut SVector<f64, N>) {
        let rate = self.model.rhs(t, &y.as_slice()[..self.n]);
        for (i, r) in rate.into_iter().enumerate() {
            dydt[i] = r;
        }
    }

    fn jacobian(
        &self,
        t: f64,
        y: &SVector<f64, N>,
        dfdy: &mut differential_equations::prelude::Matrix<f64>,
    ) {
        let jac = self.model.jacobian(t, &y.as_slice()[..self.n]);
        for i in 0..self.n {
            for j in 0..self.n {
                dfdy[(i, j)] = jac[(i, j)];
            }
        }
    }
}

/// Solver backed by `differential-equations`, for up to `N` states.
///
/// # Examples
///
/// ```
/// use voltaic::solvers::integration::{ExplicitIntegrator, IntegrationMethod};
/// use voltaic::solvers::Solver;
///
/// let solver = ExplicitIntegrator::<64>::new(IntegrationMethod::RK4).with_step(1e-3);
/// assert_eq!(solver.rtol(), 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitIntegrator<const N: usize> {
    pub method: IntegrationMethod,
    pub rtol: f64,
    pub atol: f64,
    /// Step of the fixed-step methods
    pub step: f64,
}

impl<const N: usize> ExplicitIntegrator<N> {
    pub fn new(method: IntegrationMethod) -> Self {
        ExplicitIntegrator { method, rtol: 1e-6, atol: 1e-8, step: 1e-2 }
    }

    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Advances `y` from `t0` to `t1`, returning every accepted step.
    fn advance(
        &self,
        ode: &ModelODE<'_, N>,
        t0: f64,
        t1: f64,
        y: &[f64],
    ) -> SolverResult<Vec<(f64, Vec<f64>)>> {
        let mut y0 = SVector::<f64, N>::zeros();
        for (i, v) in y.iter().enumerate() {
            y0[i] = *v;
        }
        let problem = ODEProblem::new(ode, t0, t1, y0);
        let step = self.step.min(t1 - t0);
        let solution = match self.method {
            IntegrationMethod::Dopri5 => {
                let mut solver = ExplicitRungeKutta::dopri5().rtol(self.rtol).atol(self.atol);
                problem.solve(&mut solver)
            }
            IntegrationMethod::Radau5 => {
                let mut solver = ImplicitRungeKutta::radau5().rtol(self.rtol).atol(self.atol);
                problem.solve(&mut solver)
            }
            IntegrationMethod::RK4 => problem.solve(&mut ExplicitRungeKutta::rk4(step)),
            IntegrationMethod::Euler => problem.solve(&mut ExplicitRungeKutta::euler(step)),
            IntegrationMethod::Heun => problem.solve(&mut ExplicitRungeKutta::heun(step)),
        }
        .map_err(|e| SolverError::IntegratorFailed(e.to_string()))?;
        let steps: Vec<(f64, Vec<f64>)> = solution
            .t
            .iter()
            .zip(&solution.y)
            .skip(1)
            .map(|(t, y)| (*t, y.as_slice()[..ode.n].to_vec()))
            .collect();
        if steps.is_empty() {
            return Err(SolverError::IntegratorFailed("empty solution".to_string()));
        }
        Ok(steps)
    }
}

impl<const N: usize> Solver for ExplicitIntegrator<N> {
    fn rtol(&self) -> f64 {
        self.rtol
    }

    fn solve(&self, model: &DiscretisedModel, t_eval: &[f64]) -> SolverResult<Solution> {
        validate_time_grid(t_eval)?;
        if model.len_algebraic() > 0 {
            return Err(SolverError::AlgebraicStates(model.len_algebraic()));
        }
        let n = model.len();
        if n > N {
            return Err(SolverError::TooManyStates(n, N));
        }
        let start = Instant::now();
        let ode = ModelODE::<N> { model, n };
        let mut stats = SolverStats::default();
        let mut y = model.y0().to_vec();
        let mut events = EventMonitor::new(model, t_eval[0], &y);
        let mut out_t = vec![t_eval[0]];
        let mut out_y = vec![y.clone()];
        let mut termination = events
            .initially_fired(model)
            .map_or(Termination::FinalTime, Termination::Event);

        if termination == Termination::FinalTime {
            // Events are located between accepted steps, not output times
            'outputs: for w in t_eval.windows(2) {
                let steps = self.advance(&ode, w[0], w[1], &y)?;
                stats.steps += steps.len();
                let mut t = w[0];
                for (t_next, y_next) in steps {
                    let crossing = events.check(model, (t, &y), (t_next, &y_next));
                    if let Some((name, t_event, y_event)) = crossing {
                        out_t.push(t_event);
                        out_y.push(y_event);
                        termination = Termination::Event(name);
                        break 'outputs;
                    }
                    t = t_next;
                    y = y_next;
                }
                out_t.push(w[1]);
                out_y.push(y.clone());
            }
        }
        info!("Integrated '{}' with {:?}: {} steps", model.name(), self.method, stats.steps);
        Ok(Solution { t: out_t, y: out_y, solve_time: start.elapsed(), termination, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::tests::decay_model;

    #[test]
    fn test_event_located_between_output_times() {
        // u' = -u from u = 1 crosses 0.5 at ln 2, well inside a single output interval
        let model = decay_model(0.5);
        let solver = ExplicitIntegrator::<8>::new(IntegrationMethod::RK4).with_step(1e-2);
        let solution = solver.solve(&model, &[0.0, 1.0]).unwrap();
        assert_eq!(solution.termination, Termination::Event("Half life".to_string()));
        let t_end = *solution.t.last().unwrap();
        assert!((t_end - 2f64.ln()).abs() < 1e-3, "terminated at {}", t_end);
        assert!(solution.stats.steps > 1);
    }

    #[test]
    fn test_decay_without_event_reaches_final_time() {
        let model = decay_model(0.5);
        let solution = ExplicitIntegrator::<8>::new(IntegrationMethod::Dopri5)
            .solve(&model, &[0.0, 0.1])
            .unwrap();
        assert_eq!(solution.termination, Termination::FinalTime);
        assert!((solution.last_state().unwrap()[0] - (-0.1f64).exp()).abs() < 1e-5);
    }
}
