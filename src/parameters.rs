//! Symbolic parameters and their numerical values.
//!
//! Submodels are written against [`LithiumIonParameters`], a set of named
//! [`Expr::parameter`] leaves. Before discretisation a [`ParameterValues`]
//! map replaces every leaf by a number (or, for function parameters, by an
//! expression of the argument), producing a new model.
//!
//! # Examples
//!
//! ```
//! use voltaic::expression::Expr;
//! use voltaic::parameters::ParameterValues;
//!
//! let mut values = ParameterValues::new();
//! values.set_constant("k", 2.0);
//! let processed = values.process_expr(&(Expr::parameter("k") * 3.0)).unwrap();
//! assert_eq!(processed.as_scalar(), Some(6.0));
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::domain::Electrode;
use crate::error::{ModelError, ModelResult};
use crate::expression::{full_broadcast, Expr, Symbol};
use crate::geometry::Geometry;
use crate::model::Model;

/// Parameters of one electrode.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeParameters {
    pub electrode: Electrode,
    /// Dimensionless thickness
    pub l: Expr,
    /// Dimensionless surface area density times particle radius
    pub a_r: Expr,
    /// Maximum concentration relative to the negative electrode's
    pub gamma: Expr,
    pub c_max: Expr,
    /// Typical particle radius
    pub r_typ: Expr,
    /// Area-weighted mean particle radius (dimensionless)
    pub r_av: Expr,
    /// Area-weighted particle-size standard deviation (dimensionless)
    pub sd: Expr,
    pub eps_s: Expr,
}

impl ElectrodeParameters {
    pub fn new(electrode: Electrode) -> Self {
        let e = electrode.name();
        let lower = electrode.lower();
        let gamma = match electrode {
            Electrode::Negative => Expr::scalar(1.0),
            Electrode::Positive => Expr::parameter("Positive to negative maximum concentration ratio"),
        };
        ElectrodeParameters {
            electrode,
            l: Expr::parameter(&format!("Dimensionless {} electrode thickness", lower)),
            a_r: Expr::parameter(&format!("{} electrode dimensionless surface area density", e)),
            gamma,
            c_max: Expr::parameter(&format!("Maximum concentration in {} electrode [mol.m-3]", lower)),
            r_typ: Expr::parameter(&format!("{} particle radius [m]", e)),
            r_av: Expr::parameter(&format!("{} area-weighted mean particle radius", e)),
            sd: Expr::parameter(&format!("{} area-weighted particle-size standard deviation", e)),
            eps_s: Expr::parameter(&format!(
                "{} electrode active material volume fraction",
                e
            )),
        }
    }

    /// Initial particle concentration as a function of `x`.
    pub fn c_init(&self, x: Expr) -> Expr {
        Expr::function_parameter(
            &format!("Initial concentration in {} electrode", self.electrode.lower()),
            x,
        )
    }
}

/// The named parameters of a lithium-ion cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LithiumIonParameters {
    /// Temperature scale
    pub delta_t: Expr,
    pub t_ref: Expr,
    pub theta: Expr,
    pub i_typ: Expr,
    pub potential_scale: Expr,
    /// Total cell thickness
    pub l_x: Expr,
    pub l_cn: Expr,
    pub l_cp: Expr,
    /// Thickness of the cell including both current collectors
    pub l: Expr,
    pub lambda: Expr,
    pub rho: Expr,
    pub h: Expr,
    pub sigma_cn: Expr,
    pub sigma_cp: Expr,
    pub t_init: Expr,
    /// Electrolyte source coefficient
    pub s: Expr,
    pub c_e_init: Expr,
    pub c_e_typ: Expr,
    pub a_cc: Expr,
    pub n: ElectrodeParameters,
    pub p: ElectrodeParameters,
}

impl Default for LithiumIonParameters {
    fn default() -> Self {
        LithiumIonParameters::new()
    }
}

impl LithiumIonParameters {
    pub fn new() -> Self {
        LithiumIonParameters {
            delta_t: Expr::parameter("Temperature scale [K]"),
            t_ref: Expr::parameter("Reference temperature [K]"),
            theta: Expr::parameter("Dimensionless reciprocal reference temperature"),
            i_typ: Expr::parameter("Typical current density [A.m-2]"),
            potential_scale: Expr::parameter("Typical potential scale [V]"),
            l_x: Expr::parameter("Cell thickness [m]"),
            l_cn: Expr::parameter("Dimensionless negative current collector thickness"),
            l_cp: Expr::parameter("Dimensionless positive current collector thickness"),
            l: Expr::parameter("Dimensionless total thickness"),
            lambda: Expr::parameter("Dimensionless thermal conductivity"),
            rho: Expr::parameter("Dimensionless effective heat capacity"),
            h: Expr::parameter("Dimensionless heat transfer coefficient"),
            sigma_cn: Expr::parameter("Dimensionless negative current collector conductivity"),
            sigma_cp: Expr::parameter("Dimensionless positive current collector conductivity"),
            t_init: Expr::parameter("Dimensionless initial temperature"),
            s: Expr::parameter("Electrolyte source coefficient"),
            c_e_init: Expr::parameter("Dimensionless initial electrolyte concentration"),
            c_e_typ: Expr::parameter("Typical electrolyte concentration [mol.m-3]"),
            a_cc: Expr::parameter("Current collector area [m2]"),
            n: ElectrodeParameters::new(Electrode::Negative),
            p: ElectrodeParameters::new(Electrode::Positive),
        }
    }

    pub fn electrode(&self, electrode: Electrode) -> &ElectrodeParameters {
        match electrode {
            Electrode::Negative => &self.n,
            Electrode::Positive => &self.p,
        }
    }

    /// Dimensionless applied current density at time `t`.
    pub fn current(&self) -> Expr {
        Expr::function_parameter("Current function", Expr::time())
    }
}

/// Value of one parameter.
#[derive(Clone)]
pub enum ParameterValue {
    Constant(f64),
    /// Maps the (processed) argument to an expression
    Function(Arc<dyn Fn(&Expr) -> Expr + Send + Sync>),
}

impl fmt::Debug for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Constant(v) => write!(f, "Constant({})", v),
            ParameterValue::Function(_) => write!(f, "Function(..)"),
        }
    }
}

/// Map from parameter names to values.
#[derive(Debug, Clone, Default)]
pub struct ParameterValues {
    values: IndexMap<String, ParameterValue>,
}

impl From<IndexMap<String, f64>> for ParameterValues {
    fn from(constants: IndexMap<String, f64>) -> Self {
        ParameterValues {
            values: constants.into_iter().map(|(k, v)| (k, ParameterValue::Constant(v))).collect(),
        }
    }
}

impl ParameterValues {
    pub fn new() -> Self {
        ParameterValues::default()
    }

    pub fn set_constant(&mut self, name: &str, value: f64) -> &mut Self {
        self.values.insert(name.to_string(), ParameterValue::Constant(value));
        self
    }

    pub fn set_function<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Expr) -> Expr + Send + Sync + 'static,
    {
        self.values.insert(name.to_string(), ParameterValue::Function(Arc::new(f)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParameterValue::Constant(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Adds every entry of `other`, overriding existing ones.
    pub fn update(&mut self, other: ParameterValues) {
        self.values.extend(other.values);
    }

    /// Replaces every parameter in `expr` by its value.
    pub fn process_expr(&self, expr: &Expr) -> ModelResult<Expr> {
        expr.substitute(&mut |node| match node.symbol() {
            Symbol::Parameter(name) => match self.values.get(name) {
                Some(ParameterValue::Constant(v)) => Ok(Some(Expr::scalar(*v))),
                Some(ParameterValue::Function(_)) => Err(ModelError::Parameter(format!(
                    "'{}' is used as a constant but its value is a function",
                    name
                ))),
                None => Err(ModelError::Parameter(format!("no value for parameter '{}'", name))),
            },
            Symbol::FunctionParameter { name, argument } => {
                let argument = self.process_expr(argument)?;
                let value = match self.values.get(name) {
                    Some(ParameterValue::Constant(v)) => Expr::scalar(*v),
                    Some(ParameterValue::Function(f)) => f(&argument),
                    None => {
                        return Err(ModelError::Parameter(format!(
                            "no value for function parameter '{}'",
                            name
                        )))
                    }
                };
                let target = argument.domains()?;
                if value.domains()?.is_empty() && !target.is_empty() {
                    Ok(Some(full_broadcast(&value, target.clone())?))
                } else {
                    value.check()?;
                    Ok(Some(value))
                }
            }
            _ => Ok(None),
        })
    }

    /// Returns a copy of `model` with every parameter replaced.
    pub fn process_model(&self, model: &Model) -> ModelResult<Model> {
        debug!("Processing parameters of model '{}'", model.name());
        model.map_expressions(&mut |e| self.process_expr(e))
    }

    /// Returns a copy of `geometry` with thicknesses and size ranges taken
    /// from the parameter values, where present.
    pub fn process_geometry(&self, geometry: &Geometry) -> ModelResult<Geometry> {
        let mut out = geometry.clone();
        let thicknesses = [
            self.constant("Negative electrode thickness [m]"),
            self.constant("Separator thickness [m]"),
            self.constant("Positive electrode thickness [m]"),
        ];
        match thicknesses {
            [Some(l_n), Some(l_s), Some(l_p)] => {
                let total = l_n + l_s + l_p;
                if total <= 0.0 {
                    return Err(ModelError::Parameter(format!(
                        "cell thickness must be positive, got {}",
                        total
                    )));
                }
                out.l_n = l_n / total;
                out.l_s = l_s / total;
                out.l_p = l_p / total;
            }
            [None, None, None] => {}
            _ => {
                return Err(ModelError::Parameter(
                    "electrode and separator thicknesses must be given together".to_string(),
                ))
            }
        }
        for electrode in [Electrode::Negative, Electrode::Positive] {
            let e = electrode.name();
            let min = self.constant(&format!("{} minimum particle radius", e));
            let max = self.constant(&format!("{} maximum particle radius", e));
            let range = match electrode {
                Electrode::Negative => &mut out.size_range_n,
                Electrode::Positive => &mut out.size_range_p,
            };
            if let Some(min) = min {
                range.0 = min;
            }
            if let Some(max) = max {
                range.1 = max;
            }
        }
        out.validate()?;
        Ok(out)
    }
}

/// A complete, physically plausible set of dimensionless values for tests.
#[cfg(test)]
pub(crate) fn test_values() -> ParameterValues {
    let constants: IndexMap<String, f64> = [
        ("Temperature scale [K]", 1.0),
        ("Reference temperature [K]", 298.15),
        ("Dimensionless reciprocal reference temperature", 0.008),
        ("Typical current density [A.m-2]", 24.0),
        ("Typical potential scale [V]", 0.0257),
        ("Cell thickness [m]", 2.25e-4),
        ("Dimensionless negative current collector thickness", 0.1),
        ("Dimensionless positive current collector thickness", 0.1),
        ("Dimensionless total thickness", 1.2),
        ("Dimensionless thermal conductivity", 1.0),
        ("Dimensionless effective heat capacity", 1.0),
        ("Dimensionless heat transfer coefficient", 0.1),
        ("Dimensionless negative current collector conductivity", 100.0),
        ("Dimensionless positive current collector conductivity", 100.0),
        ("Dimensionless initial temperature", 0.0),
        ("Electrolyte source coefficient", 0.5),
        ("Dimensionless initial electrolyte concentration", 1.0),
        ("Typical electrolyte concentration [mol.m-3]", 1000.0),
        ("Current collector area [m2]", 0.1),
        ("Dimensionless negative electrode thickness", 100.0 / 225.0),
        ("Dimensionless positive electrode thickness", 100.0 / 225.0),
        ("Negative electrode dimensionless surface area density", 1.8),
        ("Positive electrode dimensionless surface area density", 1.5),
        ("Positive to negative maximum concentration ratio", 2.0),
        ("Maximum concentration in negative electrode [mol.m-3]", 24983.0),
        ("Maximum concentration in positive electrode [mol.m-3]", 51217.0),
        ("Negative particle radius [m]", 1e-5),
        ("Positive particle radius [m]", 1e-5),
        ("Negative area-weighted mean particle radius", 1.0),
        ("Positive area-weighted mean particle radius", 1.0),
        ("Negative area-weighted particle-size standard deviation", 0.3),
        ("Positive area-weighted particle-size standard deviation", 0.3),
        ("Negative electrode active material volume fraction", 0.6),
        ("Positive electrode active material volume fraction", 0.5),
        ("Initial concentration in negative electrode", 0.8),
        ("Initial concentration in positive electrode", 0.6),
        ("Current function", 1.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    ParameterValues::from(constants)
}
