//! The parameter → mesh → discretisation → solve pipeline.
//!
//! # Examples
//!
//! ```
//! use voltaic::config::SimulationConfig;
//! use voltaic::model::ModelBuilder;
//! use voltaic::parameters::LithiumIonParameters;
//! use voltaic::simulation::Simulation;
//! use voltaic::submodels::{ConstantCurrent, ElectrolyteDiffusion};
//!
//! let param = LithiumIonParameters::new();
//! let model = ModelBuilder::new("electrolyte")
//!     .with_submodel(ConstantCurrent::new(param.clone()))
//!     .with_submodel(ElectrolyteDiffusion::new(param))
//!     .build()
//!     .unwrap();
//!
//! let config = SimulationConfig::from_toml_str(
//!     r#"
//!     [var_pts]
//!     x_n = 5
//!     x_s = 5
//!     x_p = 5
//!
//!     [time]
//!     end = 0.1
//!     points = 3
//!
//!     [parameters]
//!     "Current function" = 1.0
//!     "Typical current density [A.m-2]" = 24.0
//!     "Cell thickness [m]" = 2.25e-4
//!     "Dimensionless negative electrode thickness" = 0.4444
//!     "Dimensionless positive electrode thickness" = 0.4444
//!     "Typical electrolyte concentration [mol.m-3]" = 1000.0
//!     "Electrolyte source coefficient" = 0.5
//!     "Dimensionless initial electrolyte concentration" = 1.0
//!     "#,
//! )
//! .unwrap();
//!
//! let mut sim = Simulation::new(model, config);
//! let solution = sim.solve().unwrap();
//! assert_eq!(solution.t.len(), 3);
//! ```

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::info;

use crate::config::{ConfigError, SimulationConfig};
use crate::discretisation::{DiscretisedModel, Discretisation};
use crate::error::{ModelError, ModelResult};
use crate::mesh::Mesh;
use crate::model::Model;
use crate::parameters::ParameterValues;
use crate::solvers::{Solution, Solver, SolverError, Termination};

/// Result type for running simulations.
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Any error raised along the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A model together with everything needed to solve it.
pub struct Simulation {
    model: Model,
    config: SimulationConfig,
    parameter_values: ParameterValues,
    solver: Option<Box<dyn Solver>>,
    built: Option<DiscretisedModel>,
}

impl Simulation {
    pub fn new(model: Model, config: SimulationConfig) -> Self {
        let parameter_values = config.parameter_values();
        Simulation { model, config, parameter_values, solver: None, built: None }
    }

    pub fn from_config_file<P: AsRef<Path>>(model: Model, path: P) -> SimulationResult<Self> {
        Ok(Simulation::new(model, SimulationConfig::load_from_file(path)?))
    }

    /// Adds values (including function parameters) on top of the configured
    /// constants.
    pub fn with_parameter_values(mut self, values: ParameterValues) -> Self {
        self.parameter_values.update(values);
        self.built = None;
        self
    }

    /// Uses `solver` instead of the configured one.
    pub fn with_solver(mut self, solver: Box<dyn Solver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Processes parameters, meshes the geometry and discretises the model.
    /// Later calls reuse the result.
    pub fn build(&mut self) -> ModelResult<&DiscretisedModel> {
        if self.built.is_none() {
            let values = &self.parameter_values;
            let geometry = values.process_geometry(&self.config.geometry)?;
            let mesh = Mesh::new(&geometry, &self.config.var_pts)?;
            let processed = values.process_model(&self.model)?;
            let discretised = Discretisation::new(Rc::new(mesh)).process_model(&processed)?;
            info!("Built simulation of '{}' with {} states", self.model.name(), discretised.len());
            self.built = Some(discretised);
        }
        self.built
            .as_ref()
            .ok_or_else(|| ModelError::discretization("model was not discretised"))
    }

    pub fn discretised(&self) -> Option<&DiscretisedModel> {
        self.built.as_ref()
    }

    /// Builds if needed and solves on the configured time grid.
    pub fn solve(&mut self) -> SimulationResult<Solution> {
        let t_eval = self.config.time.times();
        self.build()?;
        let configured;
        let solver: &dyn Solver = match &self.solver {
            Some(solver) => solver.as_ref(),
            None => {
                configured = self.config.solver.build()?;
                configured.as_ref()
            }
        };
        let model = self
            .built
            .as_ref()
            .ok_or_else(|| ModelError::discretization("model was not discretised"))?;
        Ok(solver.solve(model, &t_eval)?)
    }
}

/// Cost and outcome of one solve in a [`work_precision`] sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkPrecisionPoint {
    pub rtol: f64,
    pub solve_time: Duration,
    pub steps: usize,
    pub final_time: f64,
    pub final_state: Vec<f64>,
    pub termination: Termination,
}

/// Solves the same model at several relative tolerances in parallel.
///
/// `factory` is called once per tolerance, on the worker thread, so every
/// solve owns a fresh model, mesh and discretisation.
pub fn work_precision<F>(
    factory: F,
    config: &SimulationConfig,
    rtols: &[f64],
) -> SimulationResult<Vec<WorkPrecisionPoint>>
where
    F: Fn() -> ModelResult<Model> + Sync,
{
    rtols
        .par_iter()
        .map(|&rtol| -> SimulationResult<WorkPrecisionPoint> {
            let mut config = config.clone();
            config.solver.rtol = rtol;
            let mut sim = Simulation::new(factory()?, config);
            let solution = sim.solve()?;
            Ok(WorkPrecisionPoint {
                rtol,
                solve_time: solution.solve_time,
                steps: solution.stats.steps,
                final_time: solution.t.last().copied().unwrap_or(f64::NAN),
                final_state: solution.last_state().map(<[f64]>::to_vec).unwrap_or_default(),
                termination: solution.termination,
            })
        })
        .collect()
}
