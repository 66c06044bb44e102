//! Externally supplied variables.

use crate::error::ModelResult;
use crate::expression::Expr;
use crate::model::{Submodel, Variables};

/// Publishes a fixed set of expressions as fundamental variables.
///
/// Used to plug in quantities from correlations that live outside the
/// framework, or fixed inputs for testing a submodel on its own.
///
/// # Examples
///
/// ```
/// use voltaic::expression::Expr;
/// use voltaic::model::Submodel;
/// use voltaic::submodels::PrescribedVariables;
///
/// let inputs = PrescribedVariables::new("inputs").with("Total current density", Expr::scalar(1.0));
/// assert!(inputs.get_fundamental_variables().unwrap().contains("Total current density"));
/// ```
#[derive(Debug, Clone)]
pub struct PrescribedVariables {
    name: String,
    variables: Variables,
}

impl PrescribedVariables {
    /// An empty set of inputs, reported under `name` during the build.
    pub fn new(name: &str) -> Self {
        PrescribedVariables { name: name.to_string(), variables: Variables::new() }
    }

    /// Publishes `expr` under `key`, replacing any earlier value.
    pub fn with(mut self, key: &str, expr: Expr) -> Self {
        self.variables.insert(key, expr);
        self
    }
}

impl Submodel for PrescribedVariables {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_fundamental_variables(&self) -> ModelResult<Variables> {
        for (_, expr) in self.variables.iter() {
            expr.check()?;
        }
        Ok(self.variables.clone())
    }
}
