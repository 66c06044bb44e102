//! TOML configuration of a simulation.
//!
//! Every section is optional and falls back to its default:
//!
//! ```toml
//! [var_pts]
//! x_n = 10
//! size_n = 15
//!
//! [time]
//! end = 1.0
//! points = 51
//!
//! [solver]
//! method = "BackwardEuler"
//! rtol = 1e-6
//!
//! [parameters]
//! "Current function" = 1.0
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::mesh::VarPts;
use crate::parameters::ParameterValues;
use crate::solvers::{BackwardEuler, Solver, SolverResult};

/// Errors raised while loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Uniformly spaced output times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeGrid {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

impl Default for TimeGrid {
    fn default() -> Self {
        TimeGrid { start: 0.0, end: 1.0, points: 100 }
    }
}

impl TimeGrid {
    pub fn times(&self) -> Vec<f64> {
        match self.points {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let dt = (self.end - self.start) / (n - 1) as f64;
                (0..n).map(|i| self.start + i as f64 * dt).collect()
            }
        }
    }
}

/// Which integrator to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverMethod {
    #[default]
    BackwardEuler,
    /// Adaptive explicit Runge-Kutta; needs the `solvers` feature
    Dopri5,
    /// Fixed-step explicit Runge-Kutta; needs the `solvers` feature
    RK4,
}

/// Capacity of the fixed-size explicit integrators built from configuration.
#[cfg(feature = "solvers")]
pub const EXPLICIT_CAPACITY: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub method: SolverMethod,
    pub rtol: f64,
    pub atol: f64,
    /// Step of fixed-step methods, or the first trial step of adaptive ones
    pub step: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig { method: SolverMethod::default(), rtol: 1e-6, atol: 1e-8, step: None }
    }
}

impl SolverConfig {
    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    /// Builds the configured solver.
    pub fn build(&self) -> SolverResult<Box<dyn Solver>> {
        match self.method {
            SolverMethod::BackwardEuler => {
                let mut solver = BackwardEuler::new().with_tolerances(self.rtol, self.atol);
                if let Some(step) = self.step {
                    solver = solver.with_initial_step(step);
                }
                Ok(Box::new(solver))
            }
            SolverMethod::Dopri5 | SolverMethod::RK4 => self.build_explicit(),
        }
    }

    #[cfg(feature = "solvers")]
    fn build_explicit(&self) -> SolverResult<Box<dyn Solver>> {
        use crate::solvers::integration::{ExplicitIntegrator, IntegrationMethod};

        let method = match self.method {
            SolverMethod::RK4 => IntegrationMethod::RK4,
            _ => IntegrationMethod::Dopri5,
        };
        let mut solver = ExplicitIntegrator::<EXPLICIT_CAPACITY>::new(method)
            .with_tolerances(self.rtol, self.atol);
        if let Some(step) = self.step {
            solver = solver.with_step(step);
        }
        Ok(Box::new(solver))
    }

    #[cfg(not(feature = "solvers"))]
    fn build_explicit(&self) -> SolverResult<Box<dyn Solver>> {
        Err(crate::solvers::SolverError::FeatureNotEnabled)
    }
}

/// Everything a [`Simulation`](crate::simulation::Simulation) needs besides
/// the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub var_pts: VarPts,
    pub geometry: Geometry,
    pub time: TimeGrid,
    pub solver: SolverConfig,
    /// Constant parameter values, in file order
    pub parameters: IndexMap<String, f64>,
}

impl SimulationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        SimulationConfig::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn parameter_values(&self) -> ParameterValues {
        ParameterValues::from(self.parameters.clone())
    }

    pub fn with_parameter(mut self, name: &str, value: f64) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::SolverError;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = SimulationConfig::from_toml_str(
            r#"
            [var_pts]
            x_n = 7

            [time]
            end = 2.0
            points = 5

            [parameters]
            "Current function" = 0.5
            "Cell thickness [m]" = 2.25e-4
            "#,
        )
        .unwrap();
        assert_eq!(config.var_pts.x_n, 7);
        assert_eq!(config.var_pts.x_s, VarPts::default().x_s);
        assert_eq!(config.time.times(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(config.solver, SolverConfig::default());
        assert_eq!(config.parameters.get_index(0).unwrap().0, "Current function");
        assert_eq!(config.parameter_values().constant("Current function"), Some(0.5));
    }

    #[test]
    fn test_invalid_toml() {
        let err = SimulationConfig::from_toml_str("[time]\npoints = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = SimulationConfig::load_from_file("does/not/exist.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_build_solver() {
        let solver = SolverConfig::default().with_rtol(1e-4).build().unwrap();
        assert_eq!(solver.rtol(), 1e-4);

        let explicit = SolverConfig { method: SolverMethod::RK4, ..SolverConfig::default() }.build();
        if cfg!(feature = "solvers") {
            assert!(explicit.is_ok());
        } else {
            assert!(matches!(explicit, Err(SolverError::FeatureNotEnabled)));
        }
    }
}
