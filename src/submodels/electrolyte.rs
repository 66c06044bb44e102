//! Cation transport in the electrolyte.

use crate::domain::Domain;
use crate::error::ModelResult;
use crate::expression::{
    concatenation, div, flux_with_boundary_conditions, full_broadcast, grad, minimum, x_average,
    Expr, FluxBoundaryConditions, Variable,
};
use crate::model::{BoundaryConditions, Equations, Event, StateKey, Submodel, Variables};
use crate::parameters::LithiumIonParameters;

use super::on_current_collector;

/// Cation flux `N = -grad(c)` joined with its boundary values.
pub fn cation_flux(c: &Expr, bcs: &FluxBoundaryConditions) -> ModelResult<Expr> {
    let interior = -grad(c)?;
    flux_with_boundary_conditions(&interior, bcs)
}

/// Conservation of cations: `dc/dt = -div(N) + s j`.
pub fn cation_conservation(
    c: &Expr,
    j: &Expr,
    s: &Expr,
    bcs: &FluxBoundaryConditions,
) -> ModelResult<Expr> {
    let flux = cation_flux(c, bcs)?;
    let rate = -div(&flux)? + s * j;
    rate.check()?;
    Ok(rate)
}

/// Diffusion of the electrolyte concentration across the whole cell.
///
/// Flux boundary conditions default to no flux at both ends.
#[derive(Debug, Clone)]
pub struct ElectrolyteDiffusion {
    param: LithiumIonParameters,
    flux_bcs: FluxBoundaryConditions,
    concentration_cutoff: f64,
}

impl ElectrolyteDiffusion {
    pub fn new(param: LithiumIonParameters) -> Self {
        ElectrolyteDiffusion {
            param,
            flux_bcs: FluxBoundaryConditions::no_flux(),
            concentration_cutoff: 1e-4,
        }
    }

    pub fn with_flux_boundary_conditions(mut self, bcs: FluxBoundaryConditions) -> Self {
        self.flux_bcs = bcs;
        self
    }

    /// Concentration below which the solve terminates.
    pub fn with_concentration_cutoff(mut self, cutoff: f64) -> Self {
        self.concentration_cutoff = cutoff;
        self
    }

    fn concentration(&self, variables: &Variables) -> ModelResult<(Expr, StateKey)> {
        let c_e = variables.require("Electrolyte concentration")?.clone();
        let key = StateKey::from_expr(&c_e)?;
        Ok((c_e, key))
    }
}

impl Submodel for ElectrolyteDiffusion {
    fn name(&self) -> &str {
        "electrolyte diffusion"
    }

    fn get_fundamental_variables(&self) -> ModelResult<Variables> {
        let c_typ = &self.param.c_e_typ;
        let pieces = [
            ("Negative electrolyte concentration", Domain::NegativeElectrode),
            ("Separator electrolyte concentration", Domain::Separator),
            ("Positive electrolyte concentration", Domain::PositiveElectrode),
        ];
        let mut variables = Variables::new();
        let mut children = Vec::new();
        for (name, domain) in pieces {
            let c = Expr::from(
                Variable::new(name, on_current_collector(domain)).with_bounds(0.0, f64::INFINITY),
            );
            variables.insert(format!("{} [mol.m-3]", name), c_typ * &c);
            variables.insert(name, c.clone());
            children.push(c);
        }
        let c_e = concatenation(children)?;
        let c_e_av = x_average(&c_e)?;
        let flux = cation_flux(&c_e, &self.flux_bcs)?;

        variables.insert("Electrolyte concentration [mol.m-3]", c_typ * &c_e);
        variables.insert("Electrolyte concentration", c_e);
        variables.insert("X-averaged electrolyte concentration [mol.m-3]", c_typ * &c_e_av);
        variables.insert("X-averaged electrolyte concentration", c_e_av);
        variables.insert("Electrolyte flux", flux);
        Ok(variables)
    }

    fn coupled_dependencies(&self) -> Vec<String> {
        vec![
            "Negative electrode interfacial current density".to_string(),
            "Positive electrode interfacial current density".to_string(),
        ]
    }

    fn get_coupled_variables(&self, variables: &Variables) -> ModelResult<Variables> {
        let j_n = variables.require("Negative electrode interfacial current density")?;
        let j_p = variables.require("Positive electrode interfacial current density")?;
        let j_s = full_broadcast(&Expr::scalar(0.0), on_current_collector(Domain::Separator))?;
        let j = concatenation(vec![j_n.clone(), j_s, j_p.clone()])?;

        let mut out = Variables::new();
        out.insert("Interfacial current density", j);
        Ok(out)
    }

    fn set_rhs(&self, variables: &Variables) -> ModelResult<Equations> {
        let (c_e, key) = self.concentration(variables)?;
        let j = variables.require("Interfacial current density")?;
        let mut rhs = Equations::new();
        rhs.insert(key, cation_conservation(&c_e, j, &self.param.s, &self.flux_bcs)?);
        Ok(rhs)
    }

    fn set_initial_conditions(&self, variables: &Variables) -> ModelResult<Equations> {
        let (_, key) = self.concentration(variables)?;
        let mut ics = Equations::new();
        ics.insert(key, self.param.c_e_init.clone());
        Ok(ics)
    }

    fn set_boundary_conditions(&self, variables: &Variables) -> ModelResult<BoundaryConditions> {
        let (_, key) = self.concentration(variables)?;
        let mut bcs = BoundaryConditions::new();
        bcs.insert(key, self.flux_bcs.clone());
        Ok(bcs)
    }

    fn set_events(&self, variables: &Variables) -> ModelResult<Vec<Event>> {
        let (c_e, _) = self.concentration(variables)?;
        Ok(vec![Event::termination(
            "Minimum electrolyte concentration",
            minimum(&c_e)? - self.concentration_cutoff,
        )])
    }
}
