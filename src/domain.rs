//! Geometric domains and their composition rules.
//!
//! Domains form a closed set. The through-cell domains concatenate along `x`
//! in the physical left-to-right order of the cell (negative electrode,
//! separator, positive electrode). Particle and particle-size domains nest
//! inside an electrode through the secondary and tertiary roles of
//! [`Domains`].
//!
//! # Examples
//!
//! ```
//! use voltaic::domain::{Domain, concatenate_domains};
//!
//! let x = concatenate_domains(&[
//!     vec![Domain::NegativeElectrode],
//!     vec![Domain::Separator],
//!     vec![Domain::PositiveElectrode],
//! ])
//! .unwrap();
//! assert_eq!(x.len(), 3);
//!
//! // Reversed order is not the physical ordering of the cell
//! assert!(concatenate_domains(&[
//!     vec![Domain::PositiveElectrode],
//!     vec![Domain::NegativeElectrode],
//! ])
//! .is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A named geometric domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    NegativeElectrode,
    Separator,
    PositiveElectrode,
    NegativeParticle,
    PositiveParticle,
    NegativeParticleSize,
    PositiveParticleSize,
    CurrentCollector,
}

/// The through-cell domains in their fixed physical order.
pub const WHOLE_CELL: [Domain; 3] =
    [Domain::NegativeElectrode, Domain::Separator, Domain::PositiveElectrode];

/// Independent coordinate a domain is parameterised by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coordinate {
    /// Through-cell coordinate
    X,
    /// Radial coordinate inside negative particles
    RNegative,
    /// Radial coordinate inside positive particles
    RPositive,
    /// Particle radius of the negative size distribution
    SizeNegative,
    /// Particle radius of the positive size distribution
    SizePositive,
    /// Current-collector coordinate
    Z,
}

impl Domain {
    /// All domains, in declaration order.
    pub const ALL: [Domain; 8] = [
        Domain::NegativeElectrode,
        Domain::Separator,
        Domain::PositiveElectrode,
        Domain::NegativeParticle,
        Domain::PositiveParticle,
        Domain::NegativeParticleSize,
        Domain::PositiveParticleSize,
        Domain::CurrentCollector,
    ];

    /// The name used in variable keys, e.g. `"negative electrode"`.
    pub fn name(&self) -> &'static str {
        match self {
            Domain::NegativeElectrode => "negative electrode",
            Domain::Separator => "separator",
            Domain::PositiveElectrode => "positive electrode",
            Domain::NegativeParticle => "negative particle",
            Domain::PositiveParticle => "positive particle",
            Domain::NegativeParticleSize => "negative particle size",
            Domain::PositiveParticleSize => "positive particle size",
            Domain::CurrentCollector => "current collector",
        }
    }

    /// The spatial coordinate the domain is meshed along.
    pub fn coordinate(&self) -> Coordinate {
        match self {
            Domain::NegativeElectrode | Domain::Separator | Domain::PositiveElectrode => {
                Coordinate::X
            }
            Domain::NegativeParticle => Coordinate::RNegative,
            Domain::PositiveParticle => Coordinate::RPositive,
            Domain::NegativeParticleSize => Coordinate::SizeNegative,
            Domain::PositiveParticleSize => Coordinate::SizePositive,
            Domain::CurrentCollector => Coordinate::Z,
        }
    }

    /// Position along `x`, for through-cell domains only.
    pub fn through_cell_rank(&self) -> Option<usize> {
        WHOLE_CELL.iter().position(|d| d == self)
    }

    /// Whether this is one of the through-cell domains.
    pub fn is_through_cell(&self) -> bool {
        self.through_cell_rank().is_some()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Domain {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| ModelError::domain(format!("unknown domain '{}'", s)))
    }
}

/// Electrode tag used to specialise per-electrode submodels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Electrode {
    Negative,
    Positive,
}

impl Electrode {
    /// Capitalised name, e.g. `"Negative"`.
    pub fn name(&self) -> &'static str {
        match self {
            Electrode::Negative => "Negative",
            Electrode::Positive => "Positive",
        }
    }

    /// Lower-case name, e.g. `"negative"`.
    pub fn lower(&self) -> &'static str {
        match self {
            Electrode::Negative => "negative",
            Electrode::Positive => "positive",
        }
    }

    /// Short suffix used in symbol names (`n` / `p`).
    pub fn suffix(&self) -> &'static str {
        match self {
            Electrode::Negative => "n",
            Electrode::Positive => "p",
        }
    }

    /// The through-cell domain of this electrode.
    pub fn electrode_domain(&self) -> Domain {
        match self {
            Electrode::Negative => Domain::NegativeElectrode,
            Electrode::Positive => Domain::PositiveElectrode,
        }
    }

    /// The radial domain of this electrode's particles.
    pub fn particle_domain(&self) -> Domain {
        match self {
            Electrode::Negative => Domain::NegativeParticle,
            Electrode::Positive => Domain::PositiveParticle,
        }
    }

    /// The particle-radius domain of this electrode's size distribution.
    pub fn particle_size_domain(&self) -> Domain {
        match self {
            Electrode::Negative => Domain::NegativeParticleSize,
            Electrode::Positive => Domain::PositiveParticleSize,
        }
    }
}

/// Primary and auxiliary domains of an expression.
///
/// The primary list is the axis an expression varies along fastest; the
/// secondary and tertiary lists are the outer axes it is repeated over. An
/// empty primary list means the expression is domain-less (a plain scalar).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Domains {
    pub primary: Vec<Domain>,
    pub secondary: Vec<Domain>,
    pub tertiary: Vec<Domain>,
}

impl Domains {
    /// Domain-less.
    pub fn none() -> Self {
        Domains::default()
    }

    /// Domains with only a primary axis.
    pub fn new(primary: impl Into<Vec<Domain>>) -> Self {
        Domains { primary: primary.into(), secondary: Vec::new(), tertiary: Vec::new() }
    }

    pub fn with_secondary(mut self, secondary: impl Into<Vec<Domain>>) -> Self {
        self.secondary = secondary.into();
        self
    }

    pub fn with_tertiary(mut self, tertiary: impl Into<Vec<Domain>>) -> Self {
        self.tertiary = tertiary.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Domains left after the primary axis is reduced away (integration,
    /// averaging, boundary evaluation).
    pub fn shifted_up(&self) -> Domains {
        Domains {
            primary: self.secondary.clone(),
            secondary: self.tertiary.clone(),
            tertiary: Vec::new(),
        }
    }

    /// Domains after a new primary axis is added underneath.
    pub fn pushed_down(&self, primary: Vec<Domain>) -> ModelResult<Domains> {
        if !self.tertiary.is_empty() {
            return Err(ModelError::domain(format!(
                "cannot broadcast onto {:?}: source already uses a tertiary domain",
                primary
            )));
        }
        Ok(Domains {
            primary,
            secondary: self.primary.clone(),
            tertiary: self.secondary.clone(),
        })
    }

    /// Domains after a new secondary axis is inserted.
    pub fn with_inserted_secondary(&self, secondary: Vec<Domain>) -> ModelResult<Domains> {
        if self.primary.is_empty() {
            return Err(ModelError::domain(
                "secondary broadcast needs a source with a primary domain",
            ));
        }
        if !self.tertiary.is_empty() {
            return Err(ModelError::domain(format!(
                "cannot broadcast onto secondary {:?}: source already uses a tertiary domain",
                secondary
            )));
        }
        Ok(Domains {
            primary: self.primary.clone(),
            secondary,
            tertiary: self.secondary.clone(),
        })
    }

    /// Domains of a binary operation between expressions on `self` and `other`.
    ///
    /// Domain-less operands adopt the other side's domains; otherwise the
    /// primary domains must agree, and auxiliary domains must agree where both
    /// sides declare them.
    pub fn combine(&self, other: &Domains) -> ModelResult<Domains> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.primary != other.primary {
            return Err(ModelError::domain(format!(
                "children have different domains: {:?} and {:?}",
                self.primary, other.primary
            )));
        }
        let secondary = merge_aux(&self.secondary, &other.secondary, "secondary")?;
        let tertiary = merge_aux(&self.tertiary, &other.tertiary, "tertiary")?;
        Ok(Domains { primary: self.primary.clone(), secondary, tertiary })
    }
}

pub(crate) fn merge_aux(a: &[Domain], b: &[Domain], role: &str) -> ModelResult<Vec<Domain>> {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => Ok(b.to_vec()),
        (_, true) => Ok(a.to_vec()),
        _ if a == b => Ok(a.to_vec()),
        _ => Err(ModelError::domain(format!(
            "children have different {} domains: {:?} and {:?}",
            role, a, b
        ))),
    }
}

/// Concatenates primary domain lists, enforcing the fixed physical ordering.
///
/// Children must not overlap, must all be through-cell domains, and together
/// must form a contiguous run of [`WHOLE_CELL`] in left-to-right order.
pub fn concatenate_domains(children: &[Vec<Domain>]) -> ModelResult<Vec<Domain>> {
    let flat: Vec<Domain> = children.iter().flatten().copied().collect();
    if flat.is_empty() {
        return Err(ModelError::domain("cannot concatenate expressions without domains"));
    }
    for (i, d) in flat.iter().enumerate() {
        if flat[..i].contains(d) {
            return Err(ModelError::domain(format!(
                "domain '{}' appears more than once in concatenation",
                d
            )));
        }
    }
    if flat.len() == 1 {
        return Ok(flat);
    }
    let ranks = flat
        .iter()
        .map(|d| {
            d.through_cell_rank().ok_or_else(|| {
                ModelError::domain(format!("domain '{}' cannot be concatenated along x", d))
            })
        })
        .collect::<ModelResult<Vec<usize>>>()?;
    if ranks.windows(2).any(|w| w[1] != w[0] + 1) {
        return Err(ModelError::domain(format!(
            "concatenation {:?} does not follow the cell order negative electrode, separator, positive electrode",
            flat
        )));
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_names_round_trip() {
        for d in Domain::ALL {
            assert_eq!(d.name().parse::<Domain>().unwrap(), d);
        }
        assert!("anode".parse::<Domain>().is_err());
    }

    #[test]
    fn test_concatenation_fixed_order() {
        let ok = concatenate_domains(&[
            vec![Domain::NegativeElectrode],
            vec![Domain::Separator, Domain::PositiveElectrode],
        ])
        .unwrap();
        assert_eq!(ok, WHOLE_CELL.to_vec());

        let orders = [
            [Domain::Separator, Domain::NegativeElectrode, Domain::PositiveElectrode],
            [Domain::PositiveElectrode, Domain::Separator, Domain::NegativeElectrode],
            [Domain::NegativeElectrode, Domain::PositiveElectrode, Domain::Separator],
        ];
        for order in orders {
            let children: Vec<Vec<Domain>> = order.iter().map(|d| vec![*d]).collect();
            assert!(matches!(concatenate_domains(&children), Err(ModelError::Domain(_))));
        }
    }

    #[test]
    fn test_concatenation_rejects_gaps_and_overlap() {
        assert!(concatenate_domains(&[
            vec![Domain::NegativeElectrode],
            vec![Domain::PositiveElectrode]
        ])
        .is_err());
        assert!(concatenate_domains(&[
            vec![Domain::NegativeElectrode],
            vec![Domain::NegativeElectrode]
        ])
        .is_err());
        assert!(concatenate_domains(&[
            vec![Domain::NegativeParticle],
            vec![Domain::NegativeElectrode]
        ])
        .is_err());
    }

    #[test]
    fn test_broadcast_domain_shifts() {
        let cc = Domains::new(vec![Domain::CurrentCollector]);
        let particle = cc.pushed_down(vec![Domain::NegativeParticle]).unwrap();
        assert_eq!(particle.secondary, vec![Domain::CurrentCollector]);

        let full = particle.with_inserted_secondary(vec![Domain::NegativeElectrode]).unwrap();
        assert_eq!(full.primary, vec![Domain::NegativeParticle]);
        assert_eq!(full.secondary, vec![Domain::NegativeElectrode]);
        assert_eq!(full.tertiary, vec![Domain::CurrentCollector]);

        assert_eq!(full.shifted_up().primary, vec![Domain::NegativeElectrode]);
        assert!(full.pushed_down(vec![Domain::Separator]).is_err());
    }

    #[test]
    fn test_combine_domains() {
        let n = Domains::new(vec![Domain::NegativeElectrode]);
        let n_cc = n.clone().with_secondary(vec![Domain::CurrentCollector]);
        let p = Domains::new(vec![Domain::PositiveElectrode]);

        assert_eq!(Domains::none().combine(&n_cc).unwrap(), n_cc);
        assert_eq!(n.combine(&n_cc).unwrap(), n_cc);
        assert!(n.combine(&p).is_err());
    }
}
