//! Adaptive backward Euler for semi-explicit DAEs.

use std::time::Instant;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::discretisation::DiscretisedModel;
use crate::solvers::{
    validate_time_grid, EventMonitor, NewtonRaphson, Solution, Solver, SolverError, SolverResult,
    SolverStats, Termination,
};

/// Implicit Euler with step-doubling error control.
///
/// Solves `dy_d/dt = f(t, y)`, `0 = g(t, y)`. Each step is taken once with
/// size `h` and once as two half steps; the difference estimates the local
/// error, which is kept below `atol + rtol |y|` component-wise. Algebraic
/// states are made consistent with the differential ones before the first
/// step.
///
/// # Examples
///
/// ```
/// use voltaic::solvers::{BackwardEuler, Solver};
///
/// let solver = BackwardEuler::default().with_tolerances(1e-5, 1e-8);
/// assert_eq!(solver.rtol(), 1e-5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackwardEuler {
    pub rtol: f64,
    pub atol: f64,
    /// First trial step; defaults to a hundredth of the first output interval
    pub initial_step: Option<f64>,
    pub min_step: f64,
    pub max_step: f64,
    #[serde(skip)]
    pub newton: NewtonRaphson,
}

impl Default for BackwardEuler {
    fn default() -> Self {
        BackwardEuler {
            rtol: 1e-6,
            atol: 1e-8,
            initial_step: None,
            min_step: 1e-12,
            max_step: f64::INFINITY,
            newton: NewtonRaphson::default(),
        }
    }
}

impl BackwardEuler {
    pub fn new() -> Self {
        BackwardEuler::default()
    }

    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = Some(step);
        self
    }

    pub fn with_max_step(mut self, step: f64) -> Self {
        self.max_step = step;
        self
    }

    pub fn with_newton(mut self, newton: NewtonRaphson) -> Self {
        self.newton = newton;
        self
    }

    /// Solves the algebraic equations at `t` for the algebraic states,
    /// holding the differential ones fixed.
    pub fn consistent_state(
        &self,
        model: &DiscretisedModel,
        t: f64,
        y: &[f64],
        stats: &mut SolverStats,
    ) -> SolverResult<Vec<f64>> {
        let n_d = model.len_rhs();
        if model.len_algebraic() == 0 {
            return Ok(y.to_vec());
        }
        let full = |algebraic: &[f64]| -> Vec<f64> {
            y[..n_d].iter().chain(algebraic).copied().collect()
        };
        let (algebraic, iterations) = self.newton.solve(
            |z| {
                let state = full(z);
                let jac = model.jacobian(t, &state);
                let n = state.len();
                (model.algebraic(t, &state), jac.view((n_d, n_d), (n - n_d, n - n_d)).into_owned())
            },
            &y[n_d..],
        )?;
        stats.newton_iterations += iterations;
        stats.jacobian_evals += iterations + 1;
        Ok(full(&algebraic))
    }

    /// One implicit Euler step of size `h` from `(t, y)`.
    fn step(
        &self,
        model: &DiscretisedModel,
        t: f64,
        y: &[f64],
        h: f64,
        stats: &mut SolverStats,
    ) -> SolverResult<Vec<f64>> {
        let n_d = model.len_rhs();
        let t_new = t + h;
        let (z, iterations) = self.newton.solve(
            |z| {
                let mut residual: Vec<f64> = model
                    .rhs(t_new, z)
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (z[i] - y[i]) / h - f)
                    .collect();
                residual.extend(model.algebraic(t_new, z));
                let mut jac: DMatrix<f64> = -model.jacobian(t_new, z);
                for i in 0..n_d {
                    jac[(i, i)] += 1.0 / h;
                }
                (residual, jac)
            },
            y,
        )?;
        stats.newton_iterations += iterations;
        stats.jacobian_evals += iterations + 1;
        Ok(z)
    }

    fn error_norm(&self, coarse: &[f64], fine: &[f64]) -> f64 {
        coarse
            .iter()
            .zip(fine)
            .map(|(a, b)| (a - b).abs() / (self.atol + self.rtol * b.abs()))
            .fold(0.0, f64::max)
    }
}

impl Solver for BackwardEuler {
    fn rtol(&self) -> f64 {
        self.rtol
    }

    fn solve(&self, model: &DiscretisedModel, t_eval: &[f64]) -> SolverResult<Solution> {
        validate_time_grid(t_eval)?;
        let start = Instant::now();
        let mut stats = SolverStats::default();
        let t_end = t_eval[t_eval.len() - 1];

        let mut t = t_eval[0];
        let mut y = self.consistent_state(model, t, model.y0(), &mut stats)?;
        let mut out_t = vec![t];
        let mut out_y = vec![y.clone()];
        let mut events = EventMonitor::new(model, t, &y);
        info!("Solving '{}' with {} states up to t = {}", model.name(), y.len(), t_end);

        let finish = |out_t, out_y, stats, termination| Solution {
            t: out_t,
            y: out_y,
            solve_time: start.elapsed(),
            termination,
            stats,
        };
        if let Some(name) = events.initially_fired(model) {
            warn!("Event '{}' is already triggered at the initial state", name);
            return Ok(finish(out_t, out_y, stats, Termination::Event(name)));
        }

        let max_step = self.max_step.min(t_end - t);
        let mut h = self.initial_step.unwrap_or((t_eval[1] - t_eval[0]) / 100.0).min(max_step);
        for &target in &t_eval[1..] {
            while t < target {
                let h_try = h.min(target - t);
                if h_try < self.min_step {
                    return Err(SolverError::StepSizeTooSmall { t, step: h_try });
                }
                let attempt = self.step(model, t, &y, h_try, &mut stats).and_then(|coarse| {
                    let half = self.step(model, t, &y, h_try / 2.0, &mut stats)?;
                    let fine = self.step(model, t + h_try / 2.0, &half, h_try / 2.0, &mut stats)?;
                    Ok((self.error_norm(&coarse, &fine), fine))
                });
                let (err, fine) = match attempt {
                    Ok(result) => result,
                    Err(e @ (SolverError::MaxIterationsExceeded(_)
                    | SolverError::SingularJacobian
                    | SolverError::Diverged)) => {
                        stats.rejected_steps += 1;
                        debug!("Newton failed at t = {} with h = {:e}: {}", t, h_try, e);
                        h = h_try / 4.0;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if err > 1.0 {
                    stats.rejected_steps += 1;
                    warn!("Rejected step at t = {} with h = {:e} (error {:.2})", t, h_try, err);
                    h = h_try * (0.9 / err.sqrt()).max(0.2);
                    continue;
                }

                let t_new = if target - (t + h_try) <= self.min_step { target } else { t + h_try };
                stats.steps += 1;
                if let Some((name, t_event, y_event)) = events.check(model, (t, &y), (t_new, &fine)) {
                    info!("Event '{}' terminated the solve at t = {}", name, t_event);
                    out_t.push(t_event);
                    out_y.push(y_event);
                    return Ok(finish(out_t, out_y, stats, Termination::Event(name)));
                }
                t = t_new;
                y = fine;
                let growth = if err > 0.0 { (0.9 / err.sqrt()).clamp(0.2, 5.0) } else { 5.0 };
                h = (h_try * growth).min(max_step);
            }
            out_t.push(t);
            out_y.push(y.clone());
        }

        let solution = finish(out_t, out_y, stats, Termination::FinalTime);
        info!(
            "Solved '{}' in {:?}: {} steps, {} rejected",
            model.name(),
            solution.solve_time,
            solution.stats.steps,
            solution.stats.rejected_steps
        );
        Ok(solution)
    }
}
