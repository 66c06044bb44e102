//! Leading-order interfacial current distribution.

use crate::domain::{Domain, Electrode};
use crate::error::ModelResult;
use crate::expression::{primary_broadcast, Expr};
use crate::model::{Submodel, Variables};
use crate::parameters::LithiumIonParameters;

/// Spreads the applied current uniformly over each electrode.
///
/// The volumetric interfacial current is `i / l_n` in the negative electrode
/// and `-i / l_p` in the positive one, and the same value is seen by every
/// particle size.
#[derive(Debug, Clone)]
pub struct ConstantCurrent {
    param: LithiumIonParameters,
}

impl ConstantCurrent {
    pub fn new(param: LithiumIonParameters) -> Self {
        ConstantCurrent { param }
    }
}

impl Submodel for ConstantCurrent {
    fn name(&self) -> &str {
        "constant current"
    }

    fn get_fundamental_variables(&self) -> ModelResult<Variables> {
        let param = &self.param;
        let current = param.current();
        let i_cc = primary_broadcast(&current, vec![Domain::CurrentCollector])?;
        let j_scale = &param.i_typ / &param.l_x;

        let mut variables = Variables::new();
        variables.insert("Total current density [A.m-2]", &param.i_typ * &current);
        variables.insert("Total current density", current);
        variables.insert("Current collector current density [A.m-2]", &param.i_typ * &i_cc);
        variables.insert("Current collector current density", i_cc.clone());

        for electrode in [Electrode::Negative, Electrode::Positive] {
            let (e, lower) = (electrode.name(), electrode.lower());
            let l = &param.electrode(electrode).l;
            let j_xav = match electrode {
                Electrode::Negative => &i_cc / l,
                Electrode::Positive => -(&i_cc / l),
            };
            let j = primary_broadcast(&j_xav, vec![electrode.electrode_domain()])?;
            let j_dist = primary_broadcast(&j_xav, vec![electrode.particle_size_domain()])?;

            variables.insert(
                format!("X-averaged {} electrode interfacial current density [A.m-3]", lower),
                &j_scale * &j_xav,
            );
            variables.insert(
                format!("{} electrode interfacial current density [A.m-3]", e),
                &j_scale * &j,
            );
            variables.insert(
                format!("X-averaged {} electrode interfacial current density distribution", lower),
                j_dist,
            );
            variables.insert(format!("X-averaged {} electrode interfacial current density", lower), j_xav);
            variables.insert(format!("{} electrode interfacial current density", e), j);
        }
        Ok(variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_distribution_domains() {
        let vars = ConstantCurrent::new(LithiumIonParameters::new()).get_fundamental_variables().unwrap();
        let j_n = vars.require("Negative electrode interfacial current density").unwrap();
        let d = j_n.domains().unwrap();
        assert_eq!(d.primary, vec![Domain::NegativeElectrode]);
        assert_eq!(d.secondary, vec![Domain::CurrentCollector]);

        let dist = vars
            .require("X-averaged positive electrode interfacial current density distribution")
            .unwrap();
        assert_eq!(dist.domains().unwrap().primary, vec![Domain::PositiveParticleSize]);
        assert!(vars.contains("Current collector current density [A.m-2]"));
    }
}
