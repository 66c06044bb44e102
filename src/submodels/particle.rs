//! Particle-size distributions with fast diffusion inside each particle.

use std::f64::consts::PI;

use crate::domain::{Domains, Electrode};
use crate::error::ModelResult;
use crate::expression::{
    boundary_value, full_broadcast, full_broadcast_to_edges, integral, maximum, minimum,
    primary_broadcast, r_average, secondary_broadcast, yz_average, CoordSys, Expr, Side,
    SpatialVariable, Variable,
};
use crate::model::{Equations, Event, StateKey, Submodel, Variables};
use crate::parameters::{ElectrodeParameters, LithiumIonParameters};

use super::on_current_collector;

/// Where in the electrode the single representative particle takes its
/// initial concentration from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RepresentativePosition {
    /// `x = 0` for the negative electrode, `x = 1` for the positive one
    #[default]
    OuterEdge,
    /// A given through-cell coordinate
    At(f64),
}

impl RepresentativePosition {
    pub fn x(&self, electrode: Electrode) -> f64 {
        match (self, electrode) {
            (RepresentativePosition::At(x), _) => *x,
            (RepresentativePosition::OuterEdge, Electrode::Negative) => 0.0,
            (RepresentativePosition::OuterEdge, Electrode::Positive) => 1.0,
        }
    }
}

/// Lognormal density with mean `mean` and standard deviation `sd`.
pub fn lognormal(x: &Expr, mean: &Expr, sd: &Expr) -> Expr {
    let mu_ln = (mean.pow(2.0) / (mean.pow(2.0) + sd.pow(2.0)).sqrt()).ln();
    let sigma_ln = (1.0 + sd.pow(2.0) / mean.pow(2.0)).ln().sqrt();
    let exponent = -((x.ln() - &mu_ln).pow(2.0)) / (2.0 * sigma_ln.pow(2.0));
    exponent.exp() / (2.0 * PI * sigma_ln.pow(2.0) * x.pow(2.0)).sqrt()
}

/// A single, x-averaged distribution of particle sizes per electrode.
///
/// Concentration is uniform inside each particle, so the state is the
/// surface concentration as a function of particle radius `R`:
///
/// `dc/dt = -3 j / (a_R R)` in the negative electrode, with an extra factor
/// `1 / gamma_p` in the positive one.
#[derive(Debug, Clone)]
pub struct FastSingleSizeDistribution {
    param: LithiumIonParameters,
    electrode: Electrode,
    position: RepresentativePosition,
    tol: f64,
}

impl FastSingleSizeDistribution {
    pub fn new(param: LithiumIonParameters, electrode: Electrode) -> Self {
        FastSingleSizeDistribution {
            param,
            electrode,
            position: RepresentativePosition::default(),
            tol: 1e-4,
        }
    }

    pub fn with_representative_position(mut self, position: RepresentativePosition) -> Self {
        self.position = position;
        self
    }

    /// Distance from 0 and 1 at which the concentration events fire.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    fn electrode_param(&self) -> &ElectrodeParameters {
        self.param.electrode(self.electrode)
    }

    fn state_name(&self) -> String {
        format!(
            "X-averaged {} particle surface concentration distribution",
            self.electrode.lower()
        )
    }

    fn state(&self, variables: &Variables) -> ModelResult<(Expr, StateKey)> {
        let c = variables.require(&self.state_name())?.clone();
        let key = StateKey::from_expr(&c)?;
        Ok((c, key))
    }

    fn distribution_variables(&self, r: &SpatialVariable) -> ModelResult<Variables> {
        let (e, lower) = (self.electrode.name(), self.electrode.lower());
        let ep = self.electrode_param();
        let size_domain = self.electrode.particle_size_domain();
        let radius = Expr::spatial(r.clone());

        let f_a = lognormal(&radius, &ep.r_av, &ep.sd);
        let total = integral(&(&radius * &f_a), r)?;
        let f_v = &radius * &f_a / primary_broadcast(&total, vec![size_domain])?;
        let r_a_mean = integral(&(&radius * &f_a), r)?;
        let r_v_mean = integral(&(&radius * &f_v), r)?;

        let mut v = Variables::new();
        v.insert(format!("{} particle sizes [m]", e), &ep.r_typ * &radius);
        v.insert(format!("{} particle sizes", e), radius);
        v.insert(
            format!("X-averaged {} area-weighted particle-size distribution [m-1]", lower),
            &f_a / &ep.r_typ,
        );
        v.insert(format!("X-averaged {} area-weighted particle-size distribution", lower), f_a);
        v.insert(
            format!("X-averaged {} volume-weighted particle-size distribution [m-1]", lower),
            &f_v / &ep.r_typ,
        );
        v.insert(format!("X-averaged {} volume-weighted particle-size distribution", lower), f_v);
        v.insert(format!("{} area-weighted mean particle radius [m]", e), &ep.r_typ * &r_a_mean);
        v.insert(format!("{} area-weighted mean particle radius", e), r_a_mean);
        v.insert(format!("{} volume-weighted mean particle radius [m]", e), &ep.r_typ * &r_v_mean);
        v.insert(format!("{} volume-weighted mean particle radius", e), r_v_mean);
        Ok(v)
    }

    fn concentration_variables(&self, c_dist: &Expr, c_s_xav: &Expr) -> ModelResult<Variables> {
        let (e, lower) = (self.electrode.name(), self.electrode.lower());
        let c_max = &self.electrode_param().c_max;
        let c_s = secondary_broadcast(c_s_xav, vec![self.electrode.electrode_domain()])?;
        let c_dist_x = secondary_broadcast(c_dist, vec![self.electrode.electrode_domain()])?;
        let c_surf = boundary_value(&c_s, Side::Right)?;
        let c_surf_xav = boundary_value(c_s_xav, Side::Right)?;
        let c_vol_av = r_average(c_s_xav)?;

        let mut v = Variables::new();
        let mut publish = |key: String, value: Expr| {
            v.insert(format!("{} [mol.m-3]", key), c_max * &value);
            v.insert(key, value);
        };
        publish(self.state_name(), c_dist.clone());
        publish(format!("{} particle surface concentration distribution", e), c_dist_x);
        publish(format!("{} particle concentration", e), c_s);
        publish(format!("X-averaged {} particle concentration", lower), c_s_xav.clone());
        publish(format!("{} particle surface concentration", e), c_surf);
        publish(format!("X-averaged {} particle surface concentration", lower), c_surf_xav);
        publish(format!("{} electrode volume-averaged concentration", e), c_vol_av);
        Ok(v)
    }

    fn flux_variables(&self) -> ModelResult<Variables> {
        let (e, lower) = (self.electrode.name(), self.electrode.lower());
        let zero = Expr::scalar(0.0);
        let n_s = full_broadcast_to_edges(
            &zero,
            Domains::new(vec![self.electrode.particle_domain()])
                .with_secondary(vec![self.electrode.electrode_domain()])
                .with_tertiary(vec![crate::domain::Domain::CurrentCollector]),
        )?;
        let n_s_xav = full_broadcast(&zero, on_current_collector(self.electrode.electrode_domain()))?;
        let mut v = Variables::new();
        v.insert(format!("{} particle flux", e), n_s);
        v.insert(format!("X-averaged {} particle flux", lower), n_s_xav);
        Ok(v)
    }
}

impl Submodel for FastSingleSizeDistribution {
    fn name(&self) -> &str {
        match self.electrode {
            Electrode::Negative => "negative fast single size distribution",
            Electrode::Positive => "positive fast single size distribution",
        }
    }

    fn get_fundamental_variables(&self) -> ModelResult<Variables> {
        let size_domains = on_current_collector(self.electrode.particle_size_domain());
        let c_dist = Expr::from(
            Variable::new(&self.state_name(), size_domains.clone()).with_bounds(0.0, 1.0),
        );
        let r = SpatialVariable::new(
            &format!("R_{}", self.electrode.suffix()),
            size_domains,
            CoordSys::Cartesian,
        )?;

        let mut variables = self.distribution_variables(&r)?;

        // Surface concentration averaged with the volume-weighted distribution
        let f_v = variables
            .require(&format!(
                "X-averaged {} volume-weighted particle-size distribution",
                self.electrode.lower()
            ))?
            .clone();
        let c_surf_xav = integral(&(&f_v * &c_dist), &r)?;
        let c_s_xav = primary_broadcast(&c_surf_xav, vec![self.electrode.particle_domain()])?;

        variables.merge(self.concentration_variables(&c_dist, &c_s_xav)?)?;
        variables.merge(self.flux_variables()?)?;
        Ok(variables)
    }

    fn get_coupled_variables(&self, variables: &Variables) -> ModelResult<Variables> {
        let (e, lower) = (self.electrode.name(), self.electrode.lower());
        let ep = self.electrode_param();
        let c_vol_av = variables.require(&format!("{} electrode volume-averaged concentration", e))?;
        let c_total = yz_average(c_vol_av)?;
        let moles = c_total * &ep.c_max * &ep.eps_s * &ep.l * &self.param.l_x * &self.param.a_cc;
        let mut v = Variables::new();
        v.insert(format!("Total lithium in {} electrode [mol]", lower), moles);
        Ok(v)
    }

    fn set_rhs(&self, variables: &Variables) -> ModelResult<Equations> {
        let (_, key) = self.state(variables)?;
        let j = variables.require(&format!(
            "X-averaged {} electrode interfacial current density distribution",
            self.electrode.lower()
        ))?;
        let r = variables.require(&format!("{} particle sizes", self.electrode.name()))?;
        let ep = self.electrode_param();
        let rate = match self.electrode {
            Electrode::Negative => -3.0 * j / &ep.a_r / r,
            Electrode::Positive => -3.0 * j / &ep.a_r / &ep.gamma / r,
        };
        rate.check()?;
        let mut rhs = Equations::new();
        rhs.insert(key, rate);
        Ok(rhs)
    }

    /// Initial conditions cannot depend on x for a single distribution, so the
    /// initial profile is sampled at the representative position.
    fn set_initial_conditions(&self, variables: &Variables) -> ModelResult<Equations> {
        let (_, key) = self.state(variables)?;
        let x = self.position.x(self.electrode);
        let mut ics = Equations::new();
        ics.insert(key, self.electrode_param().c_init(Expr::scalar(x)));
        Ok(ics)
    }

    fn set_events(&self, variables: &Variables) -> ModelResult<Vec<Event>> {
        let (c, _) = self.state(variables)?;
        let lower = self.electrode.lower();
        Ok(vec![
            Event::termination(
                &format!("Minimum {} particle surface concentration", lower),
                minimum(&c)? - self.tol,
            ),
            Event::termination(
                &format!("Maximum {} particle surface concentration", lower),
                (1.0 - self.tol) - maximum(&c)?,
            ),
        ])
    }
}
