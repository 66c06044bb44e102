//! Numeric coordinate ranges of every domain.
//!
//! All lengths are dimensionless: through-cell coordinates are scaled by the
//! total cell thickness, particle radii by the typical particle radius.

use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::{ModelError, ModelResult};
use crate::expression::CoordSys;

/// Coordinate ranges of the cell.
///
/// # Examples
///
/// ```
/// use voltaic::domain::Domain;
/// use voltaic::geometry::Geometry;
///
/// let geometry = Geometry::default();
/// let (start, end) = geometry.range(Domain::Separator);
/// assert!((start - geometry.l_n).abs() < 1e-12);
/// assert!((end - geometry.l_n - geometry.l_s).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Negative electrode thickness
    pub l_n: f64,
    /// Separator thickness
    pub l_s: f64,
    /// Positive electrode thickness
    pub l_p: f64,
    /// Range of particle radii resolved in the negative size distribution
    pub size_range_n: (f64, f64),
    /// Range of particle radii resolved in the positive size distribution
    pub size_range_p: (f64, f64),
    /// Coordinate system used inside the particles
    pub particle_coord_sys: CoordSys,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            l_n: 100.0 / 225.0,
            l_s: 25.0 / 225.0,
            l_p: 100.0 / 225.0,
            size_range_n: (0.0, 2.5),
            size_range_p: (0.0, 2.5),
            particle_coord_sys: CoordSys::Spherical,
        }
    }
}

impl Geometry {
    pub fn new(l_n: f64, l_s: f64, l_p: f64) -> Self {
        Geometry { l_n, l_s, l_p, ..Default::default() }
    }

    pub fn with_size_ranges(mut self, negative: (f64, f64), positive: (f64, f64)) -> Self {
        self.size_range_n = negative;
        self.size_range_p = positive;
        self
    }

    pub fn with_particle_coord_sys(mut self, coord_sys: CoordSys) -> Self {
        self.particle_coord_sys = coord_sys;
        self
    }

    /// Coordinate range `(start, end)` of a domain.
    pub fn range(&self, domain: Domain) -> (f64, f64) {
        match domain {
            Domain::NegativeElectrode => (0.0, self.l_n),
            Domain::Separator => (self.l_n, self.l_n + self.l_s),
            Domain::PositiveElectrode => (self.l_n + self.l_s, self.l_n + self.l_s + self.l_p),
            Domain::NegativeParticle | Domain::PositiveParticle => (0.0, 1.0),
            Domain::NegativeParticleSize => self.size_range_n,
            Domain::PositiveParticleSize => self.size_range_p,
            Domain::CurrentCollector => (0.0, 1.0),
        }
    }

    pub fn coord_sys(&self, domain: Domain) -> CoordSys {
        match domain {
            Domain::NegativeParticle | Domain::PositiveParticle => self.particle_coord_sys,
            _ => CoordSys::Cartesian,
        }
    }

    /// Checks that every range is finite and non-empty.
    pub fn validate(&self) -> ModelResult<()> {
        for domain in Domain::ALL {
            let (start, end) = self.range(domain);
            if !(start.is_finite() && end.is_finite() && end > start) {
                return Err(ModelError::discretization(format!(
                    "domain '{}' has an empty or invalid range [{}, {}]",
                    domain, start, end
                )));
            }
            if start < 0.0 {
                return Err(ModelError::discretization(format!(
                    "domain '{}' starts at negative coordinate {}",
                    domain, start
                )));
            }
        }
        Ok(())
    }
}
