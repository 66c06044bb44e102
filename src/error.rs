//! Errors raised while building, processing and discretising models.
//!
//! Every variant is fatal to assembly: once one is returned the partially
//! built model must be discarded.

use crate::domain::Domain;

/// Result type for model construction and discretisation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while composing symbolic models.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// An operator was applied to an expression with an incompatible or missing domain
    #[error("Domain error: {0}")]
    Domain(String),
    /// A fundamental variable was declared twice with different domains
    #[error("Variable '{name}' already exists on {existing:?}, cannot redeclare it on {new:?}")]
    VariableCollision {
        /// Dictionary key of the variable
        name: String,
        /// Primary domains of the variable already registered
        existing: Vec<Domain>,
        /// Primary domains of the conflicting declaration
        new: Vec<Domain>,
    },
    /// A coupled-variable stage requested a key no submodel has provided
    #[error("Missing variable '{0}': not provided by any submodel built so far")]
    MissingVariable(String),
    /// No mesh entry or discrete operator exists for what is being discretised
    #[error("Discretisation error: {0}")]
    Discretization(String),
    /// A parameter has no value or was never substituted
    #[error("Parameter error: {0}")]
    Parameter(String),
    /// The assembled equations do not determine every state variable
    #[error("Model is not well posed: {0}")]
    IllPosed(String),
}

impl ModelError {
    pub(crate) fn domain(msg: impl Into<String>) -> Self {
        ModelError::Domain(msg.into())
    }

    pub(crate) fn discretization(msg: impl Into<String>) -> Self {
        ModelError::Discretization(msg.into())
    }
}
