//! Domain-aware operators: differential operators, reductions, broadcasts and
//! concatenations.
//!
//! All of these check the shapes of their operands and fail with
//! [`ModelError::Domain`] when the combination makes no geometric sense.

use super::{
    BinaryOperator, BroadcastKind, Expr, Location, Shape, Side, SpatialVariable, Symbol,
    UnaryOperator,
};
use crate::domain::{concatenate_domains, merge_aux, Domain, Domains};
use crate::error::{ModelError, ModelResult};

fn node_located<'a>(x: &'a Expr, op: &str) -> ModelResult<&'a Shape> {
    let shape = x.shape()?;
    if shape.location != Location::Nodes {
        return Err(ModelError::domain(format!(
            "{} of '{}' needs node values, found {:?}",
            op, x, shape.location
        )));
    }
    Ok(shape)
}

fn with_primary<'a>(x: &'a Expr, op: &str) -> ModelResult<&'a Shape> {
    let shape = node_located(x, op)?;
    if shape.domains.is_empty() {
        return Err(ModelError::domain(format!("cannot take {} of domain-less '{}'", op, x)));
    }
    Ok(shape)
}

fn unary(op: UnaryOperator, child: &Expr, shape: Shape) -> Expr {
    Expr::make(Symbol::Unary(op, child.clone()), Ok(shape))
}

/// Gradient along the primary coordinate; the result lives on interior edges.
pub fn grad(x: &Expr) -> ModelResult<Expr> {
    let shape = with_primary(x, "gradient")?;
    let first = shape.domains.primary[0].coordinate();
    if shape.domains.primary.iter().any(|d| d.coordinate() != first) {
        return Err(ModelError::domain(format!(
            "gradient of '{}' spans more than one coordinate",
            x
        )));
    }
    let out = Shape { domains: shape.domains.clone(), location: Location::InteriorEdges };
    Ok(unary(UnaryOperator::Gradient, x, out))
}

/// Divergence of a flux that includes its boundary values.
///
/// The flux must live on full edges, i.e. come from
/// [`flux_with_boundary_conditions`] or [`full_broadcast_to_edges`].
pub fn div(flux: &Expr) -> ModelResult<Expr> {
    let shape = flux.shape()?;
    if shape.domains.is_empty() {
        return Err(ModelError::domain(format!("cannot take divergence of domain-less '{}'", flux)));
    }
    if shape.location != Location::Edges {
        return Err(ModelError::domain(format!(
            "divergence of '{}' needs a flux on all edges (left boundary, interior, right boundary), found {:?}",
            flux, shape.location
        )));
    }
    let out = Shape { domains: shape.domains.clone(), location: Location::Nodes };
    Ok(unary(UnaryOperator::Divergence, flux, out))
}

/// Integral of `f` over the domain of the spatial variable `var`.
pub fn integral(f: &Expr, var: &SpatialVariable) -> ModelResult<Expr> {
    let shape = with_primary(f, "integral")?;
    if shape.domains.primary != var.domains().primary {
        return Err(ModelError::domain(format!(
            "integration variable '{}' on {:?} does not match integrand domain {:?}",
            var.name(),
            var.domains().primary,
            shape.domains.primary
        )));
    }
    let out = Shape::nodes(shape.domains.shifted_up());
    Ok(Expr::make(Symbol::Integral(f.clone(), var.clone()), Ok(out)))
}

pub(crate) fn average(x: &Expr) -> ModelResult<Expr> {
    let shape = with_primary(x, "average")?;
    let out = Shape::nodes(shape.domains.shifted_up());
    Ok(unary(UnaryOperator::Average, x, out))
}

/// Mesh-weighted average through the cell thickness.
///
/// Domain-less inputs are returned unchanged.
pub fn x_average(x: &Expr) -> ModelResult<Expr> {
    let domains = x.domains()?;
    if domains.is_empty() {
        return Ok(x.clone());
    }
    if !domains.primary.iter().all(Domain::is_through_cell) {
        return Err(ModelError::domain(format!(
            "x-average of '{}' needs a through-cell domain, found {:?}",
            x, domains.primary
        )));
    }
    average(x)
}

/// Average over the current collector; domain-less inputs are returned unchanged.
pub fn yz_average(x: &Expr) -> ModelResult<Expr> {
    let domains = x.domains()?;
    if domains.is_empty() {
        return Ok(x.clone());
    }
    if domains.primary != [Domain::CurrentCollector] {
        return Err(ModelError::domain(format!(
            "yz-average of '{}' needs the current collector domain, found {:?}",
            x, domains.primary
        )));
    }
    average(x)
}

/// Volume average over a particle.
pub fn r_average(x: &Expr) -> ModelResult<Expr> {
    let domains = x.domains()?;
    let is_particle = matches!(
        domains.primary.as_slice(),
        [Domain::NegativeParticle] | [Domain::PositiveParticle]
    );
    if !is_particle {
        return Err(ModelError::domain(format!(
            "r-average of '{}' needs a particle domain, found {:?}",
            x, domains.primary
        )));
    }
    average(x)
}

fn reduction(op: UnaryOperator, x: &Expr, name: &str) -> ModelResult<Expr> {
    node_located(x, name)?;
    Ok(unary(op, x, Shape::nodes(Domains::none())))
}

/// Smallest entry of `x` over all of its domains.
pub fn minimum(x: &Expr) -> ModelResult<Expr> {
    reduction(UnaryOperator::Minimum, x, "minimum")
}

/// Largest entry of `x` over all of its domains.
pub fn maximum(x: &Expr) -> ModelResult<Expr> {
    reduction(UnaryOperator::Maximum, x, "maximum")
}

/// Value of `x` extrapolated to one end of its primary domain.
pub fn boundary_value(x: &Expr, side: Side) -> ModelResult<Expr> {
    let shape = with_primary(x, "boundary value")?;
    let out = Shape::nodes(shape.domains.shifted_up());
    Ok(unary(UnaryOperator::BoundaryValue(side), x, out))
}

/// Pointwise product after edge-located operands are moved to nodes.
pub fn inner(a: &Expr, b: &Expr) -> ModelResult<Expr> {
    let product = Expr::binary(BinaryOperator::Inner, a, b);
    product.check()?;
    Ok(product)
}

fn broadcast(kind: BroadcastKind, child: &Expr, shape: Shape) -> Expr {
    Expr::make(Symbol::Broadcast(kind, child.clone()), Ok(shape))
}

/// Replicates a domain-less expression over `domains`.
pub fn full_broadcast(child: &Expr, domains: Domains) -> ModelResult<Expr> {
    full(BroadcastKind::Full, Location::Nodes, child, domains)
}

/// Replicates a domain-less expression over every edge of `domains`.
pub fn full_broadcast_to_edges(child: &Expr, domains: Domains) -> ModelResult<Expr> {
    full(BroadcastKind::FullToEdges, Location::Edges, child, domains)
}

fn full(kind: BroadcastKind, location: Location, child: &Expr, domains: Domains) -> ModelResult<Expr> {
    let shape = node_located(child, "full broadcast")?;
    if !shape.domains.is_empty() {
        return Err(ModelError::domain(format!(
            "full broadcast needs a domain-less source, '{}' lives on {:?}",
            child, shape.domains.primary
        )));
    }
    if domains.is_empty() {
        return Err(ModelError::domain("full broadcast needs a target domain"));
    }
    Ok(broadcast(kind, child, Shape { domains, location }))
}

/// Adds a new primary axis underneath `child`.
///
/// A domain-less source becomes a plain expression on `primary`.
pub fn primary_broadcast(child: &Expr, primary: Vec<Domain>) -> ModelResult<Expr> {
    let shape = node_located(child, "primary broadcast")?;
    if primary.is_empty() {
        return Err(ModelError::domain("primary broadcast needs a target domain"));
    }
    if shape.domains.primary.iter().any(|d| primary.contains(d)) {
        return Err(ModelError::domain(format!(
            "cannot broadcast '{}' onto its own domain {:?}",
            child, primary
        )));
    }
    let domains = shape.domains.pushed_down(primary)?;
    Ok(broadcast(BroadcastKind::Primary, child, Shape::nodes(domains)))
}

/// Inserts a new secondary axis; the source keeps its primary domain.
pub fn secondary_broadcast(child: &Expr, secondary: Vec<Domain>) -> ModelResult<Expr> {
    let shape = node_located(child, "secondary broadcast")?;
    if secondary.is_empty() {
        return Err(ModelError::domain("secondary broadcast needs a target domain"));
    }
    let domains = shape.domains.with_inserted_secondary(secondary)?;
    Ok(broadcast(BroadcastKind::Secondary, child, Shape::nodes(domains)))
}

/// Concatenates expressions.
///
/// Two forms are accepted:
///
/// * node-located pieces on consecutive through-cell domains, giving one
///   expression over their union;
/// * a flux `[left, interior, right]`, where `interior` lives on interior
///   edges and the boundary values are domain-less or live on the interior's
///   secondary domain. The result lives on full edges.
pub fn concatenation(children: Vec<Expr>) -> ModelResult<Expr> {
    if children.is_empty() {
        return Err(ModelError::domain("cannot concatenate an empty list"));
    }
    let shapes = children.iter().map(Expr::shape).collect::<ModelResult<Vec<&Shape>>>()?;

    if shapes.iter().any(|s| s.location == Location::InteriorEdges) {
        let out = flux_shape(&children, &shapes)?;
        return Ok(Expr::make(Symbol::Concatenation(children), Ok(out)));
    }

    if let Some(i) = shapes.iter().position(|s| s.location != Location::Nodes) {
        return Err(ModelError::domain(format!(
            "cannot concatenate '{}' located on {:?}",
            children[i], shapes[i].location
        )));
    }
    if let Some(i) = shapes.iter().position(|s| s.domains.is_empty()) {
        return Err(ModelError::domain(format!(
            "cannot concatenate domain-less '{}' with expressions on domains",
            children[i]
        )));
    }
    let primaries: Vec<Vec<Domain>> = shapes.iter().map(|s| s.domains.primary.clone()).collect();
    let primary = concatenate_domains(&primaries)?;
    let mut secondary = Vec::new();
    let mut tertiary = Vec::new();
    for shape in &shapes {
        secondary = merge_aux(&secondary, &shape.domains.secondary, "secondary")?;
        tertiary = merge_aux(&tertiary, &shape.domains.tertiary, "tertiary")?;
    }
    let domains = Domains { primary, secondary, tertiary };
    Ok(Expr::make(Symbol::Concatenation(children), Ok(Shape::nodes(domains))))
}

fn flux_shape(children: &[Expr], shapes: &[&Shape]) -> ModelResult<Shape> {
    let [left, interior, right] = shapes else {
        return Err(ModelError::domain(format!(
            "a flux concatenation takes (left, interior, right), got {} pieces",
            shapes.len()
        )));
    };
    if interior.location != Location::InteriorEdges {
        return Err(ModelError::domain(format!(
            "the middle of a flux concatenation must be an interior flux, found '{}'",
            children[1]
        )));
    }
    let boundary_domains = interior.domains.shifted_up();
    for (side, shape) in [("left", left), ("right", right)] {
        let fits = shape.location == Location::Nodes
            && (shape.domains.is_empty() || shape.domains == boundary_domains);
        if !fits {
            return Err(ModelError::domain(format!(
                "{} boundary value of flux '{}' must be domain-less or live on {:?}",
                side, children[1], boundary_domains.primary
            )));
        }
    }
    Ok(Shape { domains: interior.domains.clone(), location: Location::Edges })
}

/// Flux boundary values at the two ends of a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxBoundaryConditions {
    pub left: Expr,
    pub right: Expr,
}

impl FluxBoundaryConditions {
    pub fn new(left: Expr, right: Expr) -> Self {
        FluxBoundaryConditions { left, right }
    }

    /// Zero flux at both ends.
    pub fn no_flux() -> Self {
        FluxBoundaryConditions::new(Expr::scalar(0.0), Expr::scalar(0.0))
    }
}

impl Default for FluxBoundaryConditions {
    fn default() -> Self {
        FluxBoundaryConditions::no_flux()
    }
}

/// Joins an interior flux with its boundary values, in the fixed order
/// (left, interior, right).
pub fn flux_with_boundary_conditions(
    interior: &Expr,
    bcs: &FluxBoundaryConditions,
) -> ModelResult<Expr> {
    concatenation(vec![bcs.left.clone(), interior.clone(), bcs.right.clone()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WHOLE_CELL;
    use crate::expression::{CoordSys, Variable};

    fn on(name: &str, primary: Vec<Domain>) -> Expr {
        Expr::from(Variable::new(
            name,
            Domains::new(primary).with_secondary(vec![Domain::CurrentCollector]),
        ))
    }

    #[test]
    fn test_grad_of_domainless_fails() {
        let err = grad(&Expr::scalar(1.0)).unwrap_err();
        assert!(matches!(err, ModelError::Domain(_)));
        assert!(grad(&Expr::parameter("a")).is_err());
    }

    #[test]
    fn test_div_needs_boundary_values() {
        let c = on("c", vec![Domain::Separator]);
        let interior = -grad(&c).unwrap();
        assert!(div(&interior).is_err());

        let flux =
            flux_with_boundary_conditions(&interior, &FluxBoundaryConditions::default()).unwrap();
        assert_eq!(flux.location().unwrap(), Location::Edges);
        let divergence = div(&flux).unwrap();
        assert_eq!(divergence.location().unwrap(), Location::Nodes);
        assert_eq!(divergence.domains().unwrap(), c.domains().unwrap());
    }

    #[test]
    fn test_flux_boundary_order() {
        let c = on("c", vec![Domain::NegativeElectrode]);
        let interior = -grad(&c).unwrap();
        let bcs = FluxBoundaryConditions::new(Expr::scalar(1.0), Expr::scalar(-2.0));
        let flux = flux_with_boundary_conditions(&interior, &bcs).unwrap();
        let orphans = flux.orphans();
        assert_eq!(orphans[0].as_scalar(), Some(1.0));
        assert_eq!(orphans[1], interior);
        assert_eq!(orphans[2].as_scalar(), Some(-2.0));
    }

    #[test]
    fn test_boundary_values_on_current_collector() {
        let t = on("T", WHOLE_CELL.to_vec());
        let interior = -grad(&t).unwrap();
        let t_left = boundary_value(&t, Side::Left).unwrap();
        assert_eq!(t_left.domains().unwrap().primary, vec![Domain::CurrentCollector]);
        let bcs = FluxBoundaryConditions::new(t_left.clone(), -t_left);
        assert!(flux_with_boundary_conditions(&interior, &bcs).is_ok());

        let wrong = FluxBoundaryConditions::new(on("n", vec![Domain::Separator]), Expr::scalar(0.0));
        assert!(flux_with_boundary_conditions(&interior, &wrong).is_err());
    }

    #[test]
    fn test_concatenation_order_enforced() {
        let n = on("n", vec![Domain::NegativeElectrode]);
        let s = on("s", vec![Domain::Separator]);
        let p = on("p", vec![Domain::PositiveElectrode]);
        assert!(concatenation(vec![n.clone(), s.clone(), p.clone()]).is_ok());
        assert!(concatenation(vec![s.clone(), n.clone(), p.clone()]).is_err());
        assert!(concatenation(vec![n.clone(), p.clone()]).is_err());
        assert!(concatenation(vec![n.clone(), n]).is_err());
    }

    #[test]
    fn test_broadcast_domain_rules() {
        let i = on("i", vec![Domain::CurrentCollector]);
        assert!(full_broadcast(&i, Domains::new(vec![Domain::Separator])).is_err());

        let x_avg = Expr::from(Variable::new(
            "c_s_xav",
            Domains::new(vec![Domain::NegativeParticle])
                .with_secondary(vec![Domain::CurrentCollector]),
        ));
        let b = secondary_broadcast(&x_avg, vec![Domain::NegativeElectrode]).unwrap();
        let d = b.domains().unwrap();
        assert_eq!(d.primary, vec![Domain::NegativeParticle]);
        assert_eq!(d.secondary, vec![Domain::NegativeElectrode]);
        assert_eq!(d.tertiary, vec![Domain::CurrentCollector]);

        let p = primary_broadcast(&i, vec![Domain::Separator]).unwrap();
        let d = p.domains().unwrap();
        assert_eq!(d.primary, vec![Domain::Separator]);
        assert_eq!(d.secondary, vec![Domain::CurrentCollector]);
        assert!(primary_broadcast(&p, vec![Domain::Separator]).is_err());
    }

    #[test]
    fn test_reductions_shift_domains() {
        let r = SpatialVariable::new(
            "R_n",
            Domains::new(vec![Domain::NegativeParticleSize])
                .with_secondary(vec![Domain::CurrentCollector]),
            CoordSys::Cartesian,
        )
        .unwrap();
        let f = on("f", vec![Domain::NegativeParticleSize]);
        let total = integral(&f, &r).unwrap();
        assert_eq!(total.domains().unwrap().primary, vec![Domain::CurrentCollector]);

        let g = on("g", vec![Domain::PositiveParticleSize]);
        assert!(integral(&g, &r).is_err());

        let m = minimum(&f).unwrap();
        assert!(m.domains().unwrap().is_empty());

        let q = on("q", WHOLE_CELL.to_vec());
        let q_av = x_average(&q).unwrap();
        assert_eq!(q_av.domains().unwrap().primary, vec![Domain::CurrentCollector]);
        let q_vol = yz_average(&q_av).unwrap();
        assert!(q_vol.domains().unwrap().is_empty());
        assert!(yz_average(&q).is_err());
        assert!(r_average(&q).is_err());
    }
}
