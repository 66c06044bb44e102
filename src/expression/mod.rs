//! Immutable symbolic expression trees.
//!
//! Governing equations are written as trees of [`Expr`] nodes. Each node owns
//! its children through reference counting, so sub-expressions are shared
//! freely and never mutated. Every node carries its [`Shape`]: the domains it
//! lives on and whether its values sit on cell nodes or cell edges.
//!
//! Operators that depend on domains (gradient, divergence, broadcasts,
//! concatenation, integrals) are checked when the node is created and return
//! [`ModelResult`]. The arithmetic overloads (`+`, `-`, `*`, `/`) cannot return
//! a `Result`; a mismatch there produces a node whose shape is the error, and
//! that error surfaces the next time the node is checked or used by a checked
//! operator.
//!
//! # Examples
//!
//! ```
//! use voltaic::domain::{Domain, Domains};
//! use voltaic::expression::{grad, Expr, Location, Variable};
//!
//! let c = Expr::from(Variable::new(
//!     "Negative electrolyte concentration",
//!     Domains::new(vec![Domain::NegativeElectrode]),
//! ));
//! let flux = -grad(&c).unwrap();
//! assert_eq!(flux.location().unwrap(), Location::InteriorEdges);
//!
//! let scaled = 2.0 * &c + 1.0;
//! assert_eq!(scaled.domains().unwrap().primary, vec![Domain::NegativeElectrode]);
//! ```

mod display;
mod ops;
mod spatial;

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::domain::Domains;
use crate::error::{ModelError, ModelResult};

pub use spatial::{
    boundary_value, concatenation, div, flux_with_boundary_conditions, full_broadcast,
    full_broadcast_to_edges, grad, inner, integral, maximum, minimum, primary_broadcast,
    r_average, secondary_broadcast, x_average, yz_average, FluxBoundaryConditions,
};

/// Where on the staggered grid the values of an expression live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Cell centres (state variables)
    Nodes,
    /// Edges strictly between cell centres (gradient output)
    InteriorEdges,
    /// All edges, boundaries included (fluxes with boundary conditions)
    Edges,
}

/// Coordinate system of a spatial domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CoordSys {
    #[default]
    Cartesian,
    Spherical,
}

/// Left or right end of a one-dimensional domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Domains and grid location of an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub domains: Domains,
    pub location: Location,
}

impl Shape {
    fn nodes(domains: Domains) -> Self {
        Shape { domains, location: Location::Nodes }
    }
}

/// A named symbolic state quantity.
///
/// Names are dictionary keys across the whole model and must be unique per
/// physical quantity. Equality and hashing use the name and the domains.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    domains: Domains,
    bounds: Option<(f64, f64)>,
}

impl Variable {
    /// An unbounded variable.
    pub fn new(name: &str, domains: Domains) -> Self {
        Variable { name: name.to_string(), domains, bounds: None }
    }

    /// Sets physical bounds (min, max) on the variable.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = Some((lower, upper));
        self
    }

    /// The key the variable is solved and reported under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The domains the variable lives on.
    pub fn domains(&self) -> &Domains {
        &self.domains
    }

    /// Physical bounds set with [`Variable::with_bounds`], if any.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.domains == other.domains
    }
}

impl Eq for Variable {}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.domains.hash(state);
    }
}

/// An independent spatial coordinate over a domain (e.g. `x_n`, `R_n`).
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialVariable {
    name: String,
    domains: Domains,
    coord_sys: CoordSys,
}

impl SpatialVariable {
    pub fn new(name: &str, domains: Domains, coord_sys: CoordSys) -> ModelResult<Self> {
        let Some(first) = domains.primary.first() else {
            return Err(ModelError::domain(format!(
                "spatial variable '{}' needs a primary domain",
                name
            )));
        };
        if domains.primary.iter().any(|d| d.coordinate() != first.coordinate()) {
            return Err(ModelError::domain(format!(
                "spatial variable '{}' spans domains with different coordinates: {:?}",
                name, domains.primary
            )));
        }
        Ok(SpatialVariable { name: name.to_string(), domains, coord_sys })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domains(&self) -> &Domains {
        &self.domains
    }

    pub fn coord_sys(&self) -> CoordSys {
        self.coord_sys
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Negate,
    Gradient,
    Divergence,
    /// Mesh-weighted mean over the primary domain
    Average,
    Minimum,
    Maximum,
    BoundaryValue(Side),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Exp,
    Log,
    Sqrt,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    /// Pointwise product after moving edge values to nodes
    Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastKind {
    /// Domain-less value replicated over the target domains
    Full,
    /// Domain-less value replicated over the edges of the target domains
    FullToEdges,
    /// Adds a new primary axis; the source's domains move down one role
    Primary,
    /// Inserts a new secondary axis; the source's secondary becomes tertiary
    Secondary,
}

/// The tagged node kinds of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Scalar(f64),
    /// Named parameter, replaced by a value before discretisation
    Parameter(String),
    /// Named parameter depending on an argument (e.g. an initial profile of `x`)
    FunctionParameter { name: String, argument: Expr },
    Variable(Variable),
    SpatialVariable(SpatialVariable),
    Time,
    Unary(UnaryOperator, Expr),
    Function(MathFunction, Expr),
    Binary(BinaryOperator, Expr, Expr),
    Broadcast(BroadcastKind, Expr),
    Concatenation(Vec<Expr>),
    Integral(Expr, SpatialVariable),
}

#[derive(Debug, PartialEq)]
struct Node {
    symbol: Symbol,
    shape: ModelResult<Shape>,
}

/// A shared, immutable expression node.
#[derive(Clone)]
pub struct Expr(Rc<Node>);

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({})", self)
    }
}

impl From<Variable> for Expr {
    fn from(variable: Variable) -> Self {
        Expr::variable(variable)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::scalar(value)
    }
}

impl Expr {
    fn make(symbol: Symbol, shape: ModelResult<Shape>) -> Expr {
        Expr(Rc::new(Node { symbol, shape }))
    }

    pub fn scalar(value: f64) -> Expr {
        Expr::make(Symbol::Scalar(value), Ok(Shape::nodes(Domains::none())))
    }

    pub fn parameter(name: &str) -> Expr {
        Expr::make(Symbol::Parameter(name.to_string()), Ok(Shape::nodes(Domains::none())))
    }

    /// A parameter evaluated at `argument`; takes the argument's shape.
    pub fn function_parameter(name: &str, argument: Expr) -> Expr {
        let shape = argument.shape().cloned();
        Expr::make(Symbol::FunctionParameter { name: name.to_string(), argument }, shape)
    }

    pub fn variable(variable: Variable) -> Expr {
        let shape = Shape::nodes(variable.domains.clone());
        Expr::make(Symbol::Variable(variable), Ok(shape))
    }

    pub fn spatial(variable: SpatialVariable) -> Expr {
        let shape = Shape::nodes(variable.domains.clone());
        Expr::make(Symbol::SpatialVariable(variable), Ok(shape))
    }

    pub fn time() -> Expr {
        Expr::make(Symbol::Time, Ok(Shape::nodes(Domains::none())))
    }

    pub fn symbol(&self) -> &Symbol {
        &self.0.symbol
    }

    /// The node's shape, or the domain error recorded when it was built.
    pub fn shape(&self) -> ModelResult<&Shape> {
        self.0.shape.as_ref().map_err(Clone::clone)
    }

    pub fn domains(&self) -> ModelResult<&Domains> {
        Ok(&self.shape()?.domains)
    }

    pub fn location(&self) -> ModelResult<Location> {
        Ok(self.shape()?.location)
    }

    /// Returns `self` if its shape is valid.
    pub fn check(&self) -> ModelResult<&Expr> {
        self.shape()?;
        Ok(self)
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self.symbol() {
            Symbol::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self.symbol() {
            Symbol::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// The independent sub-expressions this node was built from, in order.
    ///
    /// For a concatenation these are the per-domain pieces.
    pub fn orphans(&self) -> Vec<Expr> {
        match self.symbol() {
            Symbol::Scalar(_)
            | Symbol::Parameter(_)
            | Symbol::Variable(_)
            | Symbol::SpatialVariable(_)
            | Symbol::Time => Vec::new(),
            Symbol::FunctionParameter { argument, .. } => vec![argument.clone()],
            Symbol::Unary(_, child)
            | Symbol::Function(_, child)
            | Symbol::Broadcast(_, child)
            | Symbol::Integral(child, _) => vec![child.clone()],
            Symbol::Binary(_, left, right) => vec![left.clone(), right.clone()],
            Symbol::Concatenation(children) => children.clone(),
        }
    }

    /// Rebuilds this node over new children, re-running the domain checks.
    pub fn with_children(&self, children: Vec<Expr>) -> ModelResult<Expr> {
        let expected = self.orphans().len();
        if children.len() != expected {
            return Err(ModelError::domain(format!(
                "expected {} children to rebuild '{}', got {}",
                expected,
                self,
                children.len()
            )));
        }
        let mut children = children.into_iter();
        let mut next = || children.next().ok_or_else(|| ModelError::domain("missing child"));
        let rebuilt = match self.symbol() {
            Symbol::Scalar(_)
            | Symbol::Parameter(_)
            | Symbol::Variable(_)
            | Symbol::SpatialVariable(_)
            | Symbol::Time => self.clone(),
            Symbol::FunctionParameter { name, .. } => Expr::function_parameter(name, next()?),
            Symbol::Unary(op, _) => {
                let child = next()?;
                match op {
                    UnaryOperator::Negate => -child,
                    UnaryOperator::Gradient => grad(&child)?,
                    UnaryOperator::Divergence => div(&child)?,
                    UnaryOperator::Average => spatial::average(&child)?,
                    UnaryOperator::Minimum => minimum(&child)?,
                    UnaryOperator::Maximum => maximum(&child)?,
                    UnaryOperator::BoundaryValue(side) => boundary_value(&child, *side)?,
                }
            }
            Symbol::Function(func, _) => Expr::function(*func, &next()?),
            Symbol::Binary(op, _, _) => {
                let left = next()?;
                let right = next()?;
                Expr::binary(*op, &left, &right)
            }
            Symbol::Broadcast(kind, _) => {
                let child = next()?;
                let target = self.domains()?.clone();
                match kind {
                    BroadcastKind::Full => full_broadcast(&child, target)?,
                    BroadcastKind::FullToEdges => full_broadcast_to_edges(&child, target)?,
                    BroadcastKind::Primary => primary_broadcast(&child, target.primary)?,
                    BroadcastKind::Secondary => secondary_broadcast(&child, target.secondary)?,
                }
            }
            Symbol::Concatenation(_) => concatenation(children.collect())?,
            Symbol::Integral(_, variable) => integral(&next()?, variable)?,
        };
        rebuilt.check()?;
        Ok(rebuilt)
    }

    /// Rebuilds the tree bottom-up, replacing every node for which `f`
    /// returns `Some`.
    pub fn substitute<F>(&self, f: &mut F) -> ModelResult<Expr>
    where
        F: FnMut(&Expr) -> ModelResult<Option<Expr>>,
    {
        if let Some(replacement) = f(self)? {
            return Ok(replacement);
        }
        let orphans = self.orphans();
        if orphans.is_empty() {
            return Ok(self.clone());
        }
        let children =
            orphans.iter().map(|c| c.substitute(f)).collect::<ModelResult<Vec<Expr>>>()?;
        if children.iter().zip(&orphans).all(|(new, old)| Rc::ptr_eq(&new.0, &old.0)) {
            return Ok(self.clone());
        }
        self.with_children(children)
    }

    /// Visits every node in pre-order.
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        for child in self.orphans() {
            child.visit(f);
        }
    }

    /// Distinct variables referenced in the tree, in first-seen order.
    pub fn variables(&self) -> Vec<Variable> {
        let mut found: Vec<Variable> = Vec::new();
        self.visit(&mut |e| {
            if let Some(v) = e.as_variable() {
                if !found.iter().any(|f| f.name() == v.name()) {
                    found.push(v.clone());
                }
            }
        });
        found
    }

    /// Names of all parameters referenced in the tree.
    pub fn parameters(&self) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        self.visit(&mut |e| {
            let name = match e.symbol() {
                Symbol::Parameter(name) | Symbol::FunctionParameter { name, .. } => name,
                _ => return,
            };
            if !found.contains(name) {
                found.push(name.clone());
            }
        });
        found
    }

    /// Whether the tree depends on the state or on time.
    pub fn depends_on_state(&self) -> bool {
        let mut dependent = false;
        self.visit(&mut |e| {
            if matches!(e.symbol(), Symbol::Variable(_) | Symbol::Time) {
                dependent = true;
            }
        });
        dependent
    }

    /// Elementary function applied pointwise.
    pub fn function(func: MathFunction, child: &Expr) -> Expr {
        if let Some(v) = child.as_scalar() {
            let folded = match func {
                MathFunction::Exp => v.exp(),
                MathFunction::Log => v.ln(),
                MathFunction::Sqrt => v.sqrt(),
                MathFunction::Abs => v.abs(),
            };
            return Expr::scalar(folded);
        }
        let shape = child.shape().cloned();
        Expr::make(Symbol::Function(func, child.clone()), shape)
    }

    pub fn exp(&self) -> Expr {
        Expr::function(MathFunction::Exp, self)
    }

    pub fn ln(&self) -> Expr {
        Expr::function(MathFunction::Log, self)
    }

    pub fn sqrt(&self) -> Expr {
        Expr::function(MathFunction::Sqrt, self)
    }

    pub fn abs(&self) -> Expr {
        Expr::function(MathFunction::Abs, self)
    }

    pub fn pow(&self, exponent: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOperator::Power, self, &exponent.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, WHOLE_CELL};

    fn var(name: &str, domain: Domain) -> Expr {
        Expr::from(Variable::new(
            name,
            Domains::new(vec![domain]).with_secondary(vec![Domain::CurrentCollector]),
        ))
    }

    #[test]
    fn test_orphans_round_trip() {
        let a = var("a", Domain::NegativeElectrode);
        let b = var("b", Domain::Separator);
        let c = var("c", Domain::PositiveElectrode);
        let cat = concatenation(vec![a.clone(), b.clone(), c.clone()]).unwrap();

        let orphans = cat.orphans();
        assert_eq!(orphans, vec![a, b, c]);

        let rebuilt = concatenation(orphans).unwrap();
        assert_eq!(rebuilt, cat);
        assert_eq!(rebuilt.domains().unwrap().primary, WHOLE_CELL.to_vec());
    }

    #[test]
    fn test_variable_equality_ignores_bounds() {
        let d = Domains::new(vec![Domain::NegativeParticleSize]);
        let a = Variable::new("c", d.clone()).with_bounds(0.0, 1.0);
        let b = Variable::new("c", d);
        assert_eq!(a, b);
        assert_eq!(a.bounds(), Some((0.0, 1.0)));
    }

    #[test]
    fn test_binary_domain_mismatch_poisons_node() {
        let a = var("a", Domain::NegativeElectrode);
        let c = var("c", Domain::PositiveElectrode);
        let bad = &a + &c;
        assert!(matches!(bad.check(), Err(ModelError::Domain(_))));

        // The error propagates through further arithmetic and checked operators
        let worse = bad * 2.0;
        assert!(worse.check().is_err());
        assert!(grad(&worse).is_err());
    }

    #[test]
    fn test_substitute_parameters() {
        let a = var("a", Domain::NegativeElectrode);
        let expr = Expr::parameter("k") * &a + Expr::parameter("k");
        assert_eq!(expr.parameters(), vec!["k".to_string()]);

        let replaced = expr
            .substitute(&mut |e| match e.symbol() {
                Symbol::Parameter(_) => Ok(Some(Expr::scalar(2.0))),
                _ => Ok(None),
            })
            .unwrap();
        assert!(replaced.parameters().is_empty());
        assert_eq!(replaced, Expr::scalar(2.0) * &a + 2.0);
    }

    #[test]
    fn test_spatial_variable_coordinates() {
        let ok = SpatialVariable::new("x", Domains::new(WHOLE_CELL.to_vec()), CoordSys::Cartesian);
        assert!(ok.is_ok());
        let mixed = SpatialVariable::new(
            "bad",
            Domains::new(vec![Domain::NegativeElectrode, Domain::NegativeParticle]),
            CoordSys::Cartesian,
        );
        assert!(mixed.is_err());
    }

    #[test]
    fn test_variables_collected_once() {
        let a = var("a", Domain::NegativeElectrode);
        let expr = &a * &a + Expr::time();
        let vars = expr.variables();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name(), "a");
        assert!(expr.depends_on_state());
        assert!(!Expr::scalar(1.0).depends_on_state());
    }
}
