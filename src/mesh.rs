//! One-dimensional finite-volume meshes and their discrete operators.
//!
//! Every domain gets a uniform [`SubMesh`]: `npts` cells, their edges and their
//! centres (nodes). Variables live on nodes; gradients live on the interior
//! edges between neighbouring nodes; fluxes with boundary values live on all
//! edges. The [`Mesh`] builds every operator the discretisation needs once,
//! per domain and per contiguous run of through-cell domains, and then only
//! hands out shared references.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::ops::Index;

use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Domain, Domains};
use crate::error::{ModelError, ModelResult};
use crate::expression::{CoordSys, Side};
use crate::geometry::Geometry;
use crate::sparse::from_triplets;

/// Number of cells per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarPts {
    pub x_n: usize,
    pub x_s: usize,
    pub x_p: usize,
    pub r_n: usize,
    pub r_p: usize,
    /// Particle-size points in the negative electrode
    pub size_n: usize,
    /// Particle-size points in the positive electrode
    pub size_p: usize,
    pub z: usize,
}

impl Default for VarPts {
    fn default() -> Self {
        VarPts { x_n: 20, x_s: 20, x_p: 20, r_n: 30, r_p: 30, size_n: 30, size_p: 30, z: 1 }
    }
}

impl VarPts {
    /// The same number of points in every domain except the current collector.
    pub fn uniform(npts: usize) -> Self {
        VarPts {
            x_n: npts,
            x_s: npts,
            x_p: npts,
            r_n: npts,
            r_p: npts,
            size_n: npts,
            size_p: npts,
            z: 1,
        }
    }

    pub fn points(&self, domain: Domain) -> usize {
        match domain {
            Domain::NegativeElectrode => self.x_n,
            Domain::Separator => self.x_s,
            Domain::PositiveElectrode => self.x_p,
            Domain::NegativeParticle => self.r_n,
            Domain::PositiveParticle => self.r_p,
            Domain::NegativeParticleSize => self.size_n,
            Domain::PositiveParticleSize => self.size_p,
            Domain::CurrentCollector => self.z,
        }
    }
}

/// Uniform one-dimensional mesh of a single domain or of a run of domains.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    pub edges: Vec<f64>,
    pub nodes: Vec<f64>,
    pub coord_sys: CoordSys,
}

impl SubMesh {
    pub fn uniform(start: f64, end: f64, npts: usize, coord_sys: CoordSys) -> Self {
        let h = (end - start) / npts as f64;
        let edges: Vec<f64> = (0..=npts).map(|i| start + h * i as f64).collect();
        SubMesh::from_edges(edges, coord_sys)
    }

    fn from_edges(edges: Vec<f64>, coord_sys: CoordSys) -> Self {
        let nodes = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        SubMesh { edges, nodes, coord_sys }
    }

    pub fn npts(&self) -> usize {
        self.nodes.len()
    }

    /// Joins neighbouring submeshes into one; their ranges must touch.
    pub fn combine(parts: &[&SubMesh]) -> ModelResult<SubMesh> {
        let Some(first) = parts.first() else {
            return Err(ModelError::discretization("cannot combine an empty list of submeshes"));
        };
        let mut edges = first.edges.clone();
        for part in &parts[1..] {
            if part.coord_sys != first.coord_sys {
                return Err(ModelError::discretization(
                    "cannot combine submeshes with different coordinate systems",
                ));
            }
            let last = edges.last().copied().unwrap_or(f64::NAN);
            let next = part.edges[0];
            if (last - next).abs() > 1e-12 {
                return Err(ModelError::discretization(format!(
                    "submeshes are not contiguous: one ends at {} and the next starts at {}",
                    last, next
                )));
            }
            edges.extend_from_slice(&part.edges[1..]);
        }
        Ok(SubMesh::from_edges(edges, first.coord_sys))
    }

    /// Cell volumes: widths in cartesian coordinates, shell volumes in spherical.
    pub fn cell_volumes(&self) -> Vec<f64> {
        self.edges
            .windows(2)
            .map(|w| match self.coord_sys {
                CoordSys::Cartesian => w[1] - w[0],
                CoordSys::Spherical => 4.0 * PI * (w[1].powi(3) - w[0].powi(3)) / 3.0,
            })
            .collect()
    }
}

/// Sparse operators acting on one block of node values.
#[derive(Debug, Clone)]
pub struct DiscreteOperators {
    /// Nodes to interior edges, `(n - 1) x n`
    pub gradient: CsrMatrix<f64>,
    /// Full edges to nodes, `n x (n + 1)`
    pub divergence: CsrMatrix<f64>,
    /// Quadrature weights, `1 x n`
    pub integral: CsrMatrix<f64>,
    /// Volume-weighted mean, `1 x n`
    pub average: CsrMatrix<f64>,
    /// Interior edges to nodes, `n x (n - 1)`
    pub interior_edges_to_nodes: CsrMatrix<f64>,
    /// Full edges to nodes, `n x (n + 1)`
    pub edges_to_nodes: CsrMatrix<f64>,
    boundary_left: CsrMatrix<f64>,
    boundary_right: CsrMatrix<f64>,
}

impl DiscreteOperators {
    pub fn new(mesh: &SubMesh) -> Self {
        let n = mesh.npts();
        let x = &mesh.nodes;
        let e = &mesh.edges;

        let gradient = from_triplets(
            n.saturating_sub(1),
            n,
            (0..n.saturating_sub(1)).flat_map(|i| {
                let dx = x[i + 1] - x[i];
                [(i, i, -1.0 / dx), (i, i + 1, 1.0 / dx)]
            }),
        );

        let divergence = from_triplets(
            n,
            n + 1,
            (0..n).flat_map(|i| match mesh.coord_sys {
                CoordSys::Cartesian => {
                    let h = e[i + 1] - e[i];
                    [(i, i, -1.0 / h), (i, i + 1, 1.0 / h)]
                }
                CoordSys::Spherical => {
                    let v = (e[i + 1].powi(3) - e[i].powi(3)) / 3.0;
                    [(i, i, -e[i].powi(2) / v), (i, i + 1, e[i + 1].powi(2) / v)]
                }
            }),
        );

        let volumes = mesh.cell_volumes();
        let total: f64 = volumes.iter().sum();
        let integral = from_triplets(1, n, volumes.iter().enumerate().map(|(j, &w)| (0, j, w)));
        let average =
            from_triplets(1, n, volumes.iter().enumerate().map(|(j, &w)| (0, j, w / total)));

        let interior_edges_to_nodes = if n < 2 {
            from_triplets(n, 0, std::iter::empty())
        } else {
            let mut triplets = vec![(0, 0, 1.0), (n - 1, n - 2, 1.0)];
            for i in 1..n - 1 {
                triplets.push((i, i - 1, 0.5));
                triplets.push((i, i, 0.5));
            }
            from_triplets(n, n - 1, triplets)
        };
        let edges_to_nodes =
            from_triplets(n, n + 1, (0..n).flat_map(|i| [(i, i, 0.5), (i, i + 1, 0.5)]));

        let (boundary_left, boundary_right) = if n < 2 {
            (from_triplets(1, n, [(0, 0, 1.0)]), from_triplets(1, n, [(0, 0, 1.0)]))
        } else {
            let a = (x[0] - e[0]) / (x[1] - x[0]);
            let b = (e[n] - x[n - 1]) / (x[n - 1] - x[n - 2]);
            (
                from_triplets(1, n, [(0, 0, 1.0 + a), (0, 1, -a)]),
                from_triplets(1, n, [(0, n - 1, 1.0 + b), (0, n - 2, -b)]),
            )
        };

        DiscreteOperators {
            gradient,
            divergence,
            integral,
            average,
            interior_edges_to_nodes,
            edges_to_nodes,
            boundary_left,
            boundary_right,
        }
    }

    /// Linear extrapolation of node values to one end, `1 x n`.
    pub fn boundary(&self, side: Side) -> &CsrMatrix<f64> {
        match side {
            Side::Left => &self.boundary_left,
            Side::Right => &self.boundary_right,
        }
    }
}

/// The submeshes of every domain and their cached operators.
///
/// # Examples
///
/// ```
/// use voltaic::domain::Domain;
/// use voltaic::geometry::Geometry;
/// use voltaic::mesh::{Mesh, VarPts};
///
/// let mesh = Mesh::new(&Geometry::default(), &VarPts::uniform(5)).unwrap();
/// assert_eq!(mesh[Domain::Separator].npts(), 5);
/// let whole = [Domain::NegativeElectrode, Domain::Separator, Domain::PositiveElectrode];
/// assert_eq!(mesh.npts(&whole).unwrap(), 15);
/// assert_eq!(mesh.operators(&whole).unwrap().gradient.nrows(), 14);
/// ```
#[derive(Debug, Clone)]
pub struct Mesh {
    submeshes: BTreeMap<Domain, SubMesh>,
    runs: BTreeMap<Vec<Domain>, SubMesh>,
    operators: BTreeMap<Vec<Domain>, DiscreteOperators>,
}

impl Mesh {
    pub fn new(geometry: &Geometry, var_pts: &VarPts) -> ModelResult<Self> {
        geometry.validate()?;
        let mut submeshes = BTreeMap::new();
        for domain in Domain::ALL {
            let npts = var_pts.points(domain);
            if npts == 0 {
                return Err(ModelError::discretization(format!(
                    "domain '{}' needs at least one mesh point",
                    domain
                )));
            }
            let (start, end) = geometry.range(domain);
            submeshes.insert(domain, SubMesh::uniform(start, end, npts, geometry.coord_sys(domain)));
        }

        let mut runs = BTreeMap::new();
        for domain in Domain::ALL {
            runs.insert(vec![domain], submeshes[&domain].clone());
        }
        use Domain::{NegativeElectrode as N, PositiveElectrode as P, Separator as S};
        for run in [vec![N, S], vec![S, P], vec![N, S, P]] {
            let parts: Vec<&SubMesh> = run.iter().map(|d| &submeshes[d]).collect();
            runs.insert(run, SubMesh::combine(&parts)?);
        }

        let operators =
            runs.iter().map(|(k, m)| (k.clone(), DiscreteOperators::new(m))).collect();
        debug!("Built mesh with {} domain runs", runs.len());
        Ok(Mesh { submeshes, runs, operators })
    }

    pub fn submesh(&self, domain: Domain) -> ModelResult<&SubMesh> {
        self.submeshes.get(&domain).ok_or_else(|| {
            ModelError::discretization(format!("no mesh entry for domain '{}'", domain))
        })
    }

    /// Submesh of a run of domains, e.g. the whole cell.
    pub fn combined(&self, domains: &[Domain]) -> ModelResult<&SubMesh> {
        self.runs.get(domains).ok_or_else(|| {
            ModelError::discretization(format!("no mesh entry for domains {:?}", domains))
        })
    }

    pub fn operators(&self, domains: &[Domain]) -> ModelResult<&DiscreteOperators> {
        self.operators.get(domains).ok_or_else(|| {
            ModelError::discretization(format!("no discrete operators for domains {:?}", domains))
        })
    }

    /// Number of nodes across a list of domains; an empty list counts as one.
    pub fn npts(&self, domains: &[Domain]) -> ModelResult<usize> {
        domains.iter().map(|d| Ok(self.submesh(*d)?.npts())).sum::<ModelResult<usize>>().map(
            |n| if domains.is_empty() { 1 } else { n },
        )
    }

    /// Number of values an expression on `domains` holds.
    pub fn size(&self, domains: &Domains) -> ModelResult<usize> {
        Ok(self.npts(&domains.primary)?
            * self.npts(&domains.secondary)?
            * self.npts(&domains.tertiary)?)
    }
}

impl Index<Domain> for Mesh {
    type Output = SubMesh;

    /// # Panics
    ///
    /// Never for a mesh built by [`Mesh::new`], which covers every domain.
    fn index(&self, domain: Domain) -> &SubMesh {
        &self.submeshes[&domain]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::mul_vec;

    fn mesh() -> Mesh {
        Mesh::new(&Geometry::new(0.4, 0.2, 0.4), &VarPts::uniform(6)).unwrap()
    }

    #[test]
    fn test_grad_of_linear_profile_is_constant() {
        let m = mesh();
        let whole = [Domain::NegativeElectrode, Domain::Separator, Domain::PositiveElectrode];
        let sub = m.combined(&whole).unwrap();
        let u: Vec<f64> = sub.nodes.iter().map(|x| 3.0 * x - 1.0).collect();
        let g = mul_vec(&m.operators(&whole).unwrap().gradient, &u);
        assert_eq!(g.len(), 17);
        for v in g {
            assert!((v - 3.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_div_of_constant_flux_is_zero() {
        let m = mesh();
        for domain in [Domain::Separator, Domain::PositiveParticle] {
            let ops = m.operators(&[domain]).unwrap();
            let n = m[domain].npts();
            let d = mul_vec(&ops.divergence, &vec![2.5; n + 1]);
            // spherical divergence of a constant flux is 2 * N / r, not zero
            if m[domain].coord_sys == CoordSys::Cartesian {
                assert!(d.iter().all(|v| v.abs() < 1e-10));
            } else {
                assert!(d.iter().all(|v| *v > 0.0));
            }
        }
    }

    #[test]
    fn test_spherical_divergence_of_linear_flux() {
        // N = r gives div N = 3 exactly in the finite-volume sense
        let m = mesh();
        let sub = &m[Domain::NegativeParticle];
        let d = mul_vec(&m.operators(&[Domain::NegativeParticle]).unwrap().divergence, &sub.edges);
        assert!(d.iter().all(|v| (v - 3.0).abs() < 1e-10));
    }

    #[test]
    fn test_averages_of_constants_are_exact() {
        let m = mesh();
        for domain in Domain::ALL {
            let ops = m.operators(&[domain]).unwrap();
            let n = m[domain].npts();
            let avg = mul_vec(&ops.average, &vec![0.7; n]);
            assert!((avg[0] - 0.7).abs() < 1e-12);
        }
        let sphere = mul_vec(
            &m.operators(&[Domain::PositiveParticle]).unwrap().integral,
            &vec![1.0; m[Domain::PositiveParticle].npts()],
        );
        assert!((sphere[0] - 4.0 * PI / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_boundary_extrapolation_of_linear_profile() {
        let m = mesh();
        let sub = &m[Domain::Separator];
        let u: Vec<f64> = sub.nodes.iter().map(|x| 2.0 * x + 1.0).collect();
        let ops = m.operators(&[Domain::Separator]).unwrap();
        let left = mul_vec(ops.boundary(Side::Left), &u)[0];
        let right = mul_vec(ops.boundary(Side::Right), &u)[0];
        assert!((left - (2.0 * 0.4 + 1.0)).abs() < 1e-10);
        assert!((right - (2.0 * 0.6 + 1.0)).abs() < 1e-10);
    }

    #[test]
    fn test_missing_run_fails() {
        let m = mesh();
        let err = m.operators(&[Domain::NegativeElectrode, Domain::PositiveElectrode]);
        assert!(matches!(err, Err(ModelError::Discretization(_))));
    }

    #[test]
    fn test_zero_points_rejected() {
        let pts = VarPts { x_s: 0, ..VarPts::default() };
        assert!(Mesh::new(&Geometry::default(), &pts).is_err());
    }

    #[test]
    fn test_combine_requires_contiguous() {
        let a = SubMesh::uniform(0.0, 1.0, 2, CoordSys::Cartesian);
        let b = SubMesh::uniform(1.5, 2.0, 2, CoordSys::Cartesian);
        assert!(SubMesh::combine(&[&a, &b]).is_err());
        let c = SubMesh::uniform(1.0, 2.0, 3, CoordSys::Cartesian);
        assert_eq!(SubMesh::combine(&[&a, &c]).unwrap().npts(), 5);
    }
}
