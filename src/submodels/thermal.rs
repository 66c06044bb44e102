//! Heat generation and temperature.
//!
//! Both options share the heat-generation coupling: Ohmic heating in the
//! electrodes and electrolyte, irreversible reaction heating, reversible
//! (entropic) heating, and Ohmic heating in the two current collectors. The
//! total `Q = Q_ohm + Q_rxn + Q_rev` is averaged through the cell including
//! the current collectors.
//!
//! * [`ThermalOption::Lumped`] evolves one x-averaged temperature.
//! * [`ThermalOption::XFull`] resolves the temperature across the cell with a
//!   conductive flux `q = -lambda grad(T)` and cooled or insulated edges.

use serde::{Deserialize, Serialize};

use crate::domain::{Domain, WHOLE_CELL};
use crate::error::{ModelError, ModelResult};
use crate::expression::{
    boundary_value, concatenation, div, flux_with_boundary_conditions, full_broadcast, grad, inner,
    primary_broadcast, x_average, yz_average, Expr, FluxBoundaryConditions, Side, Symbol, Variable,
};
use crate::model::{BoundaryConditions, Equations, StateKey, Submodel, Variables};
use crate::parameters::LithiumIonParameters;

use super::on_current_collector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThermalOption {
    /// Single temperature, uniform through the cell
    #[default]
    Lumped,
    /// Temperature resolved in x
    XFull,
}

/// Heat exchange at the outer faces of the current collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoolingOption {
    /// Newton cooling to ambient temperature
    #[default]
    Cooled,
    Insulated,
}

const COUPLED_INPUTS: [&str; 13] = [
    "Cell temperature",
    "Negative electrode interfacial current density",
    "Positive electrode interfacial current density",
    "Negative electrode reaction overpotential",
    "Positive electrode reaction overpotential",
    "Negative electrode entropic change",
    "Positive electrode entropic change",
    "Electrolyte current density",
    "Electrolyte potential",
    "Negative electrode current density",
    "Positive electrode current density",
    "Negative electrode potential",
    "Positive electrode potential",
];

#[derive(Debug, Clone)]
pub struct Thermal {
    param: LithiumIonParameters,
    option: ThermalOption,
    cooling: CoolingOption,
}

impl Thermal {
    pub fn new(param: LithiumIonParameters, option: ThermalOption) -> Self {
        Thermal { param, option, cooling: CoolingOption::default() }
    }

    pub fn with_cooling(mut self, cooling: CoolingOption) -> Self {
        self.cooling = cooling;
        self
    }

    pub fn option(&self) -> ThermalOption {
        self.option
    }

    fn dimensional_temperature(&self, t: &Expr) -> Expr {
        &self.param.delta_t * t + &self.param.t_ref
    }

    fn heating_scale(&self) -> Expr {
        &self.param.i_typ * &self.param.potential_scale / &self.param.l_x
    }

    fn flux_law(&self, t: &Expr) -> ModelResult<Expr> {
        Ok(-(&self.param.lambda * grad(t)?))
    }

    /// Average through the cell including both current collectors.
    fn x_average_with_collectors(&self, q: &Expr, q_cn: &Expr, q_cp: &Expr) -> ModelResult<Expr> {
        let p = &self.param;
        Ok((&p.l_cn * q_cn + x_average(q)? + &p.l_cp * q_cp) / &p.l)
    }

    fn standard_fundamental_variables(
        &self,
        t: Expr,
        t_cn: Expr,
        t_cp: Expr,
        t_x_av: Expr,
    ) -> ModelResult<Variables> {
        let pieces = t.orphans();
        let [t_n, t_s, t_p] = through_cell_pieces(&t, &pieces)?;
        let t_vol_av = yz_average(&t_x_av)?;
        let q = self.flux_law(&t)?;

        let mut v = Variables::new();
        let mut publish = |key: &str, value: Expr| {
            v.insert(format!("{} [K]", key), self.dimensional_temperature(&value));
            v.insert(key, value);
        };
        publish("Negative current collector temperature", t_cn);
        publish("X-averaged negative electrode temperature", x_average(t_n)?);
        publish("Negative electrode temperature", t_n.clone());
        publish("X-averaged separator temperature", x_average(t_s)?);
        publish("Separator temperature", t_s.clone());
        publish("X-averaged positive electrode temperature", x_average(t_p)?);
        publish("Positive electrode temperature", t_p.clone());
        publish("Positive current collector temperature", t_cp);
        publish("Cell temperature", t);
        publish("X-averaged cell temperature", t_x_av);
        publish("Volume-averaged cell temperature", t_vol_av);
        v.insert("Heat flux [W.m-2]", q.clone());
        v.insert("Heat flux", q);
        Ok(v)
    }

    fn state(&self, variables: &Variables) -> ModelResult<(Expr, StateKey)> {
        let key = match self.option {
            ThermalOption::Lumped => "X-averaged cell temperature",
            ThermalOption::XFull => "Cell temperature",
        };
        let t = variables.require(key)?.clone();
        let state = StateKey::from_expr(&t)?;
        Ok((t, state))
    }

    fn edge_conditions(&self, variables: &Variables) -> ModelResult<FluxBoundaryConditions> {
        match self.cooling {
            CoolingOption::Insulated => Ok(FluxBoundaryConditions::no_flux()),
            CoolingOption::Cooled => {
                let h = &self.param.h;
                let t_cn = variables.require("Negative current collector temperature")?;
                let t_cp = variables.require("Positive current collector temperature")?;
                Ok(FluxBoundaryConditions::new(-(h * t_cn), h * t_cp))
            }
        }
    }
}

/// Splits a through-cell temperature into its electrode and separator parts.
fn through_cell_pieces<'a>(t: &Expr, pieces: &'a [Expr]) -> ModelResult<[&'a Expr; 3]> {
    match pieces {
        [t_n, t_s, t_p] if matches!(t.symbol(), Symbol::Concatenation(_)) => Ok([t_n, t_s, t_p]),
        _ => Err(ModelError::domain(format!(
            "cell temperature '{}' must be a concatenation over the three cell domains",
            t
        ))),
    }
}

impl Submodel for Thermal {
    fn name(&self) -> &str {
        match self.option {
            ThermalOption::Lumped => "lumped thermal",
            ThermalOption::XFull => "x-full thermal",
        }
    }

    fn get_fundamental_variables(&self) -> ModelResult<Variables> {
        match self.option {
            ThermalOption::Lumped => {
                let t_x_av = Expr::from(Variable::new(
                    "X-averaged cell temperature",
                    crate::domain::Domains::new(vec![Domain::CurrentCollector]),
                ));
                let pieces = WHOLE_CELL
                    .iter()
                    .map(|d| primary_broadcast(&t_x_av, vec![*d]))
                    .collect::<ModelResult<Vec<Expr>>>()?;
                let t = concatenation(pieces)?;
                self.standard_fundamental_variables(t, t_x_av.clone(), t_x_av.clone(), t_x_av)
            }
            ThermalOption::XFull => {
                let pieces = [
                    ("Negative electrode temperature", Domain::NegativeElectrode),
                    ("Separator temperature", Domain::Separator),
                    ("Positive electrode temperature", Domain::PositiveElectrode),
                ]
                .into_iter()
                .map(|(name, d)| Expr::from(Variable::new(name, on_current_collector(d))))
                .collect();
                let t = concatenation(pieces)?;
                let t_cn = boundary_value(&t, Side::Left)?;
                let t_cp = boundary_value(&t, Side::Right)?;
                let t_x_av = x_average(&t)?;
                self.standard_fundamental_variables(t, t_cn, t_cp, t_x_av)
            }
        }
    }

    fn coupled_dependencies(&self) -> Vec<String> {
        COUPLED_INPUTS
            .iter()
            .chain(std::iter::once(&"Current collector current density"))
            .map(|s| s.to_string())
            .collect()
    }

    fn get_coupled_variables(&self, variables: &Variables) -> ModelResult<Variables> {
        let p = &self.param;
        let t = variables.require("Cell temperature")?;
        let pieces = t.orphans();
        let [t_n, _, t_p] = through_cell_pieces(t, &pieces)?;

        let j_n = variables.require("Negative electrode interfacial current density")?;
        let j_p = variables.require("Positive electrode interfacial current density")?;
        let eta_r_n = variables.require("Negative electrode reaction overpotential")?;
        let eta_r_p = variables.require("Positive electrode reaction overpotential")?;
        let dudt_n = variables.require("Negative electrode entropic change")?;
        let dudt_p = variables.require("Positive electrode entropic change")?;
        let i_e = variables.require("Electrolyte current density")?;
        let phi_e = variables.require("Electrolyte potential")?;
        let i_s_n = variables.require("Negative electrode current density")?;
        let i_s_p = variables.require("Positive electrode current density")?;
        let phi_s_n = variables.require("Negative electrode potential")?;
        let phi_s_p = variables.require("Positive electrode potential")?;
        let i_cc = variables.require("Current collector current density")?;

        // Ohmic heating in the current collectors
        let q_ohm_s_cn = i_cc.pow(2.0) / &p.sigma_cn;
        let q_ohm_s_cp = i_cc.pow(2.0) / &p.sigma_cp;

        let zero_s = || full_broadcast(&Expr::scalar(0.0), on_current_collector(Domain::Separator));

        let q_ohm_s_n = -inner(i_s_n, &grad(phi_s_n)?)?;
        let q_ohm_s_p = -inner(i_s_p, &grad(phi_s_p)?)?;
        let q_ohm_s = concatenation(vec![q_ohm_s_n, zero_s()?, q_ohm_s_p])?;
        let q_ohm_e = -inner(i_e, &grad(phi_e)?)?;
        let q_ohm = q_ohm_s + q_ohm_e;

        let q_rxn = concatenation(vec![j_n * eta_r_n, zero_s()?, j_p * eta_r_p])?;

        let theta_inv = p.theta.pow(-1.0);
        let q_rev_n = j_n * (&theta_inv + t_n) * dudt_n;
        let q_rev_p = j_p * (&theta_inv + t_p) * dudt_p;
        let q_rev = concatenation(vec![q_rev_n, zero_s()?, q_rev_p])?;

        let q = &q_ohm + &q_rxn + &q_rev;
        let q_av = self.x_average_with_collectors(&q, &q_ohm_s_cn, &q_ohm_s_cp)?;
        let q_vol_av = yz_average(&q_av)?;

        let scale = self.heating_scale();
        let mut out = Variables::new();
        let mut publish = |key: &str, value: Expr| {
            out.insert(format!("{} [A.V.m-3]", key), &scale * &value);
            out.insert(key, value);
        };
        publish("Negative current collector Ohmic heating", q_ohm_s_cn);
        publish("Positive current collector Ohmic heating", q_ohm_s_cp);
        publish("Ohmic heating", q_ohm);
        publish("Irreversible electrochemical heating", q_rxn);
        publish("Reversible heating", q_rev);
        publish("Total heating", q);
        publish("X-averaged total heating", q_av);
        publish("Volume-averaged total heating", q_vol_av);
        for (_, expr) in out.iter() {
            expr.check()?;
        }
        Ok(out)
    }

    fn set_rhs(&self, variables: &Variables) -> ModelResult<Equations> {
        let p = &self.param;
        let (t, key) = self.state(variables)?;
        let rate = match self.option {
            ThermalOption::Lumped => {
                let q_av = variables.require("X-averaged total heating")?;
                let cooling = match self.cooling {
                    CoolingOption::Cooled => 2.0 * &p.h * &t / &p.l,
                    CoolingOption::Insulated => Expr::scalar(0.0),
                };
                (q_av - cooling) / &p.rho
            }
            ThermalOption::XFull => {
                let q = variables.require("Total heating")?;
                let interior = self.flux_law(&t)?;
                let flux = flux_with_boundary_conditions(&interior, &self.edge_conditions(variables)?)?;
                (-div(&flux)? + q) / &p.rho
            }
        };
        let mut rhs = Equations::new();
        rhs.insert(key, rate);
        Ok(rhs)
    }

    fn set_initial_conditions(&self, variables: &Variables) -> ModelResult<Equations> {
        let (_, key) = self.state(variables)?;
        let mut ics = Equations::new();
        ics.insert(key, self.param.t_init.clone());
        Ok(ics)
    }

    fn set_boundary_conditions(&self, variables: &Variables) -> ModelResult<BoundaryConditions> {
        let mut bcs = BoundaryConditions::new();
        if self.option == ThermalOption::XFull {
            let (_, key) = self.state(variables)?;
            bcs.insert(key, self.edge_conditions(variables)?);
        }
        Ok(bcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domains;
    use crate::model::ModelBuilder;
    use crate::submodels::PrescribedVariables;

    /// Zero electrochemistry with a unit current in the current collector.
    fn zero_inputs() -> PrescribedVariables {
        let zero = |d: Domain| full_broadcast(&Expr::scalar(0.0), on_current_collector(d)).unwrap();
        let (a_n, a_s, a_p) =
            (zero(Domain::NegativeElectrode), zero(Domain::Separator), zero(Domain::PositiveElectrode));
        let whole = concatenation(vec![a_n.clone(), a_s, a_p.clone()]).unwrap();
        let i_cell = primary_broadcast(&Expr::scalar(1.0), vec![Domain::CurrentCollector]).unwrap();
        PrescribedVariables::new("zero electrochemistry")
            .with("Negative electrode interfacial current density", a_n.clone())
            .with("Positive electrode interfacial current density", a_p.clone())
            .with("Negative electrode reaction overpotential", a_n.clone())
            .with("Positive electrode reaction overpotential", a_p.clone())
            .with("Negative electrode entropic change", a_n.clone())
            .with("Positive electrode entropic change", a_p.clone())
            .with("Electrolyte potential", whole.clone())
            .with("Electrolyte current density", whole)
            .with("Negative electrode potential", a_n.clone())
            .with("Negative electrode current density", a_n)
            .with("Positive electrode potential", a_p.clone())
            .with("Positive electrode current density", a_p)
            .with("Current collector current density", i_cell)
    }

    #[test]
    fn test_total_heating_is_sum_of_sources() {
        for option in [ThermalOption::Lumped, ThermalOption::XFull] {
            let model = ModelBuilder::new("thermal")
                .with_submodel(Thermal::new(LithiumIonParameters::new(), option))
                .with_submodel(zero_inputs())
                .build()
                .unwrap();
            let v = model.variables();
            let sum = v.get("Ohmic heating").unwrap()
                + v.get("Irreversible electrochemical heating").unwrap()
                + v.get("Reversible heating").unwrap();
            assert_eq!(v.get("Total heating").unwrap(), &sum);
            assert_eq!(model.rhs().len(), 1);
        }
    }

    #[test]
    fn test_lumped_temperature_is_broadcast() {
        let thermal = Thermal::new(LithiumIonParameters::new(), ThermalOption::Lumped);
        let v = thermal.get_fundamental_variables().unwrap();
        let t = v.get("Cell temperature").unwrap();
        assert_eq!(
            t.domains().unwrap(),
            &Domains::new(WHOLE_CELL.to_vec()).with_secondary(vec![Domain::CurrentCollector])
        );
        let t_x_av = v.get("X-averaged cell temperature").unwrap();
        assert!(t_x_av.as_variable().is_some());
        assert!(v.get("Volume-averaged cell temperature").unwrap().domains().unwrap().is_empty());
    }

    #[test]
    fn test_xfull_edge_temperatures() {
        let thermal = Thermal::new(LithiumIonParameters::new(), ThermalOption::XFull);
        let v = thermal.get_fundamental_variables().unwrap();
        let t_cn = v.get("Negative current collector temperature").unwrap();
        assert_eq!(t_cn.domains().unwrap().primary, vec![Domain::CurrentCollector]);
        assert!(v.contains("Positive current collector temperature [K]"));
    }

    #[test]
    fn test_cell_temperature_must_stay_a_concatenation() {
        let whole_cell = Domains::new(WHOLE_CELL.to_vec()).with_secondary(vec![Domain::CurrentCollector]);
        let uniform = full_broadcast(&Expr::scalar(1.0), whole_cell).unwrap();
        for option in [ThermalOption::Lumped, ThermalOption::XFull] {
            let err = ModelBuilder::new("thermal")
                .with_submodel(Thermal::new(LithiumIonParameters::new(), option))
                .with_submodel(zero_inputs().with("Cell temperature", uniform.clone()))
                .build()
                .unwrap_err();
            assert!(matches!(err, ModelError::Domain(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_missing_coupled_input() {
        let err = ModelBuilder::new("thermal")
            .with_submodel(Thermal::new(LithiumIonParameters::new(), ThermalOption::Lumped))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingVariable(_)));
    }
}
