//! # Voltaic: Symbolic Battery Modelling
//!
//! Physical mechanisms of a lithium-ion cell are written as *submodels* that
//! publish symbolic variables and equations on named geometric domains. The
//! submodels are merged into one model, parameter values are substituted,
//! and the model is discretised onto a mesh and handed to a solver.
//!
//! ```text
//! Submodel ──► ModelBuilder ──► Model ──► ParameterValues ──► Discretisation ──► Solver
//!  (symbolic)     (staged)     (merged)     (numbers in)        (sparse maps)     (DAE)
//! ```
//!
//! ## Example
//!
//! ```
//! use voltaic::domain::{Domain, Domains};
//! use voltaic::expression::{grad, Expr, Variable};
//!
//! let c = Expr::from(Variable::new("c", Domains::new(vec![Domain::Separator])));
//! let flux = -grad(&c).unwrap();
//! assert_eq!(flux.to_string(), "-grad(c)");
//! ```
//!
//! Domains are checked as expressions are built. The gradient of a quantity
//! that lives on no domain fails immediately:
//!
//! ```
//! use voltaic::expression::{grad, Expr};
//! use voltaic::ModelError;
//!
//! let err = grad(&Expr::scalar(1.0)).unwrap_err();
//! assert!(matches!(err, ModelError::Domain(_)));
//! ```
//!
//! Build stages are enforced by the type system. Coupled variables can only
//! be requested once the fundamental ones exist:
//!
//! ```compile_fail
//! use voltaic::model::ModelBuilder;
//!
//! let builder = ModelBuilder::new("cell");
//! let coupled = builder.build_coupled_variables(); // Compile error!
//! ```
//!
//! ## Optional Features
//!
//! - **`autodiff`** (default): exact Jacobians with forward-mode dual numbers from `num-dual`
//! - **`solvers`**: explicit Runge-Kutta integration via `differential-equations`
//!
//! Enable features in your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! voltaic = { version = "0.1", features = ["solvers"] }
//! ```

#[cfg(feature = "autodiff")]
pub mod autodiff;
pub mod config;
pub mod discretisation;
pub mod domain;
pub mod error;
pub mod expression;
pub mod geometry;
pub mod mesh;
pub mod model;
pub mod parameters;
pub mod scalar;
pub mod simulation;
pub mod solvers;
pub mod submodels;

pub(crate) mod sparse;

pub use error::{ModelError, ModelResult};
pub use expression::Expr;
pub use model::{Model, ModelBuilder, Submodel};
pub use simulation::Simulation;
