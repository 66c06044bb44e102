//! Physical submodels.
//!
//! Each submodel implements [`Submodel`](crate::model::Submodel) for one
//! mechanism. Variable keys follow the pattern
//! `"<X-averaged?> <domain> <quantity>"`, and every fundamental quantity is
//! also published with a `" [unit]"` suffix in dimensional form.

pub mod electrolyte;
pub mod interface;
pub mod particle;
pub mod prescribed;
pub mod thermal;

pub use electrolyte::{cation_conservation, cation_flux, ElectrolyteDiffusion};
pub use interface::ConstantCurrent;
pub use particle::{FastSingleSizeDistribution, RepresentativePosition};
pub use prescribed::PrescribedVariables;
pub use thermal::{CoolingOption, Thermal, ThermalOption};

use crate::domain::{Domain, Domains};

/// Domains of a quantity on `primary`, repeated over the current collector.
pub(crate) fn on_current_collector(primary: Domain) -> Domains {
    Domains::new(vec![primary]).with_secondary(vec![Domain::CurrentCollector])
}
