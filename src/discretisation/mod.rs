//! Lowering of symbolic models onto a mesh.
//!
//! The [`Discretisation`] walks every expression of a processed [`Model`],
//! replaces each spatial operator with a sparse linear map taken from the
//! [`Mesh`], and emits a [`DiscretisedModel`]: a flat state vector layout
//! with callables for the right-hand side, algebraic residuals, events and
//! the Jacobian.
//!
//! # Layout
//!
//! Every state variable owns a contiguous slot of the state vector, rhs
//! variables first and algebraic variables after them. Within a slot the
//! primary coordinate varies fastest, then the secondary, then the tertiary.
//! The variables of a concatenated state key get adjacent slots in key order.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use voltaic::discretisation::Discretisation;
//! use voltaic::geometry::Geometry;
//! use voltaic::mesh::{Mesh, VarPts};
//! use voltaic::model::ModelBuilder;
//! use voltaic::parameters::{LithiumIonParameters, ParameterValues};
//! use voltaic::submodels::{ConstantCurrent, ElectrolyteDiffusion};
//!
//! let param = LithiumIonParameters::new();
//! let model = ModelBuilder::new("electrolyte")
//!     .with_submodel(ConstantCurrent::new(param.clone()))
//!     .with_submodel(ElectrolyteDiffusion::new(param))
//!     .build()
//!     .unwrap();
//!
//! let mut values = ParameterValues::new();
//! values
//!     .set_constant("Current function", 0.0)
//!     .set_constant("Typical current density [A.m-2]", 24.0)
//!     .set_constant("Cell thickness [m]", 2.25e-4)
//!     .set_constant("Dimensionless negative electrode thickness", 0.4)
//!     .set_constant("Dimensionless positive electrode thickness", 0.4)
//!     .set_constant("Typical electrolyte concentration [mol.m-3]", 1000.0)
//!     .set_constant("Electrolyte source coefficient", 0.5)
//!     .set_constant("Dimensionless initial electrolyte concentration", 1.0);
//! let processed = values.process_model(&model).unwrap();
//!
//! let mesh = Mesh::new(&Geometry::default(), &VarPts::uniform(4)).unwrap();
//! let discretised = Discretisation::new(Rc::new(mesh)).process_model(&processed).unwrap();
//! assert_eq!(discretised.len(), 12);
//! let rate = discretised.rhs(0.0, discretised.y0());
//! assert!(rate.iter().all(|r| r.abs() < 1e-12));
//! ```

mod lowered;

pub use lowered::{Elementwise, Lowered};

use std::collections::HashMap;
use std::rc::Rc;

use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use tracing::{debug, info};

use crate::domain::Domains;
use crate::error::{ModelError, ModelResult};
use crate::expression::{
    BinaryOperator, BroadcastKind, Expr, Location, Shape, Symbol, UnaryOperator, Variable,
};
use crate::mesh::{DiscreteOperators, Mesh};
use crate::model::{EventType, Model, StateKey, Variables};
use crate::scalar::Scalar;
use crate::sparse::{block_diagonal, from_triplets, identity, kron, ones_column};

/// The range of the state vector owned by one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSlot {
    pub variable: Variable,
    pub start: usize,
    pub len: usize,
}

impl StateSlot {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Ordered state slots, rhs variables first.
#[derive(Debug, Clone, Default)]
pub struct StateLayout {
    slots: Vec<StateSlot>,
    by_name: HashMap<String, usize>,
    len_rhs: usize,
}

impl StateLayout {
    fn new(model: &Model, mesh: &Mesh) -> ModelResult<Self> {
        let mut layout = StateLayout::default();
        let mut start = 0;
        let groups = [model.rhs().keys(), model.algebraic().keys()];
        for (group, keys) in groups.into_iter().enumerate() {
            for variable in keys.flat_map(StateKey::variables) {
                let len = mesh.size(variable.domains())?;
                layout.by_name.insert(variable.name().to_string(), layout.slots.len());
                layout.slots.push(StateSlot { variable: variable.clone(), start, len });
                start += len;
            }
            if group == 0 {
                layout.len_rhs = start;
            }
        }
        Ok(layout)
    }

    pub fn slots(&self) -> &[StateSlot] {
        &self.slots
    }

    pub fn slot(&self, name: &str) -> Option<&StateSlot> {
        self.by_name.get(name).map(|&i| &self.slots[i])
    }

    pub fn len(&self) -> usize {
        self.slots.last().map_or(0, |s| s.start + s.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of differential states, which come first.
    pub fn len_rhs(&self) -> usize {
        self.len_rhs
    }

    fn key_start(&self, key: &StateKey) -> ModelResult<usize> {
        let first = key
            .variables()
            .first()
            .ok_or_else(|| ModelError::discretization("empty state key"))?;
        self.slot(first.name())
            .map(|s| s.start)
            .ok_or_else(|| not_a_state(first.name()))
    }

    fn key_len(&self, key: &StateKey) -> ModelResult<usize> {
        key.variables()
            .iter()
            .map(|v| self.slot(v.name()).map(|s| s.len).ok_or_else(|| not_a_state(v.name())))
            .sum()
    }
}

fn not_a_state(name: &str) -> ModelError {
    ModelError::discretization(format!("variable '{}' is not a state variable", name))
}

/// Binds a model's domains to a mesh.
#[derive(Debug, Clone)]
pub struct Discretisation {
    mesh: Rc<Mesh>,
}

impl Discretisation {
    pub fn new(mesh: Rc<Mesh>) -> Self {
        Discretisation { mesh }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Lowers a processed model. Parameters must already be substituted.
    pub fn process_model(&self, model: &Model) -> ModelResult<DiscretisedModel> {
        let layout = StateLayout::new(model, &self.mesh)?;
        let lowering = Lowering { mesh: &self.mesh, layout: &layout };

        let rhs = model
            .rhs()
            .iter()
            .map(|(key, expr)| lowering.equation(key, expr))
            .collect::<ModelResult<Vec<_>>>()?;
        let algebraic = model
            .algebraic()
            .iter()
            .map(|(key, expr)| lowering.equation(key, expr))
            .collect::<ModelResult<Vec<_>>>()?;

        let mut y0 = vec![0.0; layout.len()];
        for key in model.rhs().keys().chain(model.algebraic().keys()) {
            let ic = model
                .initial_conditions()
                .get(key)
                .ok_or_else(|| {
                    ModelError::IllPosed(format!("no initial condition for '{}'", key.name()))
                })?;
            let lowered = lowering.equation(key, ic)?;
            if lowered.depends_on_state() {
                return Err(ModelError::IllPosed(format!(
                    "initial condition for '{}' depends on the state or time",
                    key.name()
                )));
            }
            let start = layout.key_start(key)?;
            let values = lowered.evaluate::<f64>(0.0, &[]);
            y0[start..start + values.len()].copy_from_slice(&values);
        }

        let events = model
            .events()
            .iter()
            .map(|event| {
                let expression = lowering.lower(&event.expression)?;
                if expression.len() != 1 {
                    return Err(ModelError::discretization(format!(
                        "event '{}' must evaluate to a scalar, found {} values",
                        event.name,
                        expression.len()
                    )));
                }
                Ok(DiscreteEvent { name: event.name.clone(), event_type: event.event_type, expression })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        info!(
            "Discretised model '{}': {} states ({} differential), {} events",
            model.name(),
            layout.len(),
            layout.len_rhs(),
            events.len()
        );
        Ok(DiscretisedModel {
            name: model.name().to_string(),
            mesh: Rc::clone(&self.mesh),
            layout,
            rhs,
            algebraic,
            y0,
            events,
            variables: model.variables().clone(),
        })
    }
}

/// A scalar event over the discretised state; fires when negative.
#[derive(Debug, Clone)]
pub struct DiscreteEvent {
    pub name: String,
    pub event_type: EventType,
    pub expression: Lowered,
}

impl DiscreteEvent {
    pub fn evaluate(&self, t: f64, y: &[f64]) -> f64 {
        self.expression.evaluate(t, y)[0]
    }
}

/// A variable lowered for post-processing.
#[derive(Debug, Clone)]
pub struct ProcessedVariable {
    pub name: String,
    pub domains: Domains,
    pub expression: Lowered,
}

impl ProcessedVariable {
    pub fn evaluate(&self, t: f64, y: &[f64]) -> Vec<f64> {
        self.expression.evaluate(t, y)
    }
}

/// A model reduced to array operations on a flat state vector.
#[derive(Debug, Clone)]
pub struct DiscretisedModel {
    name: String,
    mesh: Rc<Mesh>,
    layout: StateLayout,
    rhs: Vec<Lowered>,
    algebraic: Vec<Lowered>,
    y0: Vec<f64>,
    events: Vec<DiscreteEvent>,
    variables: Variables,
}

impl DiscretisedModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.layout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn len_rhs(&self) -> usize {
        self.layout.len_rhs()
    }

    pub fn len_algebraic(&self) -> usize {
        self.len() - self.len_rhs()
    }

    pub fn y0(&self) -> &[f64] {
        &self.y0
    }

    pub fn events(&self) -> &[DiscreteEvent] {
        &self.events
    }

    pub fn rhs(&self, t: f64, y: &[f64]) -> Vec<f64> {
        stacked(&self.rhs, t, y)
    }

    pub fn algebraic(&self, t: f64, y: &[f64]) -> Vec<f64> {
        stacked(&self.algebraic, t, y)
    }

    /// `[rhs; algebraic]` for any scalar type.
    pub fn system<T: Scalar>(&self, t: f64, y: &[T]) -> Vec<T> {
        let mut out = stacked(&self.rhs, t, y);
        out.extend(stacked(&self.algebraic, t, y));
        out
    }

    /// DAE residual `[ydot_d - rhs; algebraic]`.
    pub fn residual(&self, t: f64, y: &[f64], ydot: &[f64]) -> Vec<f64> {
        let mut out: Vec<f64> =
            self.rhs(t, y).iter().zip(ydot).map(|(f, yd)| yd - f).collect();
        out.extend(self.algebraic(t, y));
        out
    }

    pub fn event_values(&self, t: f64, y: &[f64]) -> Vec<f64> {
        self.events.iter().map(|e| e.evaluate(t, y)).collect()
    }

    /// Jacobian of [`DiscretisedModel::system`] with respect to `y`.
    pub fn jacobian(&self, t: f64, y: &[f64]) -> DMatrix<f64> {
        #[cfg(feature = "autodiff")]
        {
            crate::autodiff::jacobian(|x| self.system(t, x), y)
        }
        #[cfg(not(feature = "autodiff"))]
        {
            jacobian_fd(|x| self.system(t, x), y)
        }
    }

    /// Lowers one of the model's variables for post-processing.
    pub fn process_variable(&self, name: &str) -> ModelResult<ProcessedVariable> {
        let expr = self.variables.require(name)?;
        let lowering = Lowering { mesh: &self.mesh, layout: &self.layout };
        debug!("Lowering output variable '{}'", name);
        Ok(ProcessedVariable {
            name: name.to_string(),
            domains: expr.domains()?.clone(),
            expression: lowering.lower(expr)?,
        })
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }
}

fn stacked<T: Scalar>(pieces: &[Lowered], t: f64, y: &[T]) -> Vec<T> {
    pieces.iter().flat_map(|p| p.evaluate(t, y)).collect()
}

/// Rewrites expressions into [`Lowered`] form for one mesh and layout.
struct Lowering<'a> {
    mesh: &'a Mesh,
    layout: &'a StateLayout,
}

impl Lowering<'_> {
    /// Number of primary blocks an expression on `domains` repeats over.
    fn blocks(&self, domains: &Domains) -> ModelResult<usize> {
        Ok(self.mesh.npts(&domains.secondary)? * self.mesh.npts(&domains.tertiary)?)
    }

    fn block_operator(
        &self,
        domains: &Domains,
        select: impl Fn(&DiscreteOperators) -> &CsrMatrix<f64>,
    ) -> ModelResult<CsrMatrix<f64>> {
        let ops = self.mesh.operators(&domains.primary)?;
        Ok(block_diagonal(self.blocks(domains)?, select(ops)))
    }

    /// Lowers the right-hand side of an equation into the key's slot order.
    fn equation(&self, key: &StateKey, expr: &Expr) -> ModelResult<Lowered> {
        let len = self.layout.key_len(key)?;
        let lowered = self.lower(expr)?.broadcast_to(len)?;
        match key {
            StateKey::Variable(_) => Ok(lowered),
            StateKey::Concatenation(variables) => {
                let domains = key.to_expr()?.domains()?.clone();
                let blocks = self.blocks(&domains)?;
                let total = self.mesh.npts(&domains.primary)?;
                let mut triplets = Vec::with_capacity(len);
                let (mut row, mut offset) = (0, 0);
                for variable in variables {
                    let n = self.mesh.npts(&variable.domains().primary)?;
                    for b in 0..blocks {
                        for j in 0..n {
                            triplets.push((row, b * total + offset + j, 1.0));
                            row += 1;
                        }
                    }
                    offset += n;
                }
                Lowered::linear(from_triplets(len, len, triplets), lowered)
            }
        }
    }

    fn lower(&self, expr: &Expr) -> ModelResult<Lowered> {
        let shape = expr.shape()?;
        match expr.symbol() {
            Symbol::Scalar(value) => Ok(Lowered::Constant(vec![*value])),
            Symbol::Parameter(name) | Symbol::FunctionParameter { name, .. } => {
                Err(ModelError::Parameter(format!(
                    "parameter '{}' must be given a value before discretisation",
                    name
                )))
            }
            Symbol::Variable(variable) => {
                let slot = self.layout.slot(variable.name()).ok_or_else(|| not_a_state(variable.name()))?;
                if slot.variable.domains() != variable.domains() {
                    return Err(ModelError::discretization(format!(
                        "variable '{}' is used on different domains than its state slot",
                        variable.name()
                    )));
                }
                Ok(Lowered::State { start: slot.start, len: slot.len })
            }
            Symbol::SpatialVariable(variable) => {
                let nodes = &self.mesh.combined(&variable.domains().primary)?.nodes;
                let blocks = self.blocks(variable.domains())?;
                Ok(Lowered::Constant(
                    nodes.iter().cycle().take(nodes.len() * blocks).copied().collect(),
                ))
            }
            Symbol::Time => Ok(Lowered::Time),
            Symbol::Unary(op, child) => self.lower_unary(*op, child),
            Symbol::Function(func, child) => Ok(Lowered::function(*func, self.lower(child)?)),
            Symbol::Binary(op, left, right) => self.lower_binary(*op, left, right),
            Symbol::Broadcast(kind, child) => self.lower_broadcast(*kind, child, &shape.domains),
            Symbol::Concatenation(children) => self.lower_concatenation(children, shape),
            Symbol::Integral(f, _) => {
                let op = self.block_operator(f.domains()?, |ops| &ops.integral)?;
                Lowered::linear(op, self.lower(f)?)
            }
        }
    }

    fn lower_unary(&self, op: UnaryOperator, child: &Expr) -> ModelResult<Lowered> {
        let lowered = self.lower(child)?;
        let domains = child.domains()?;
        let matrix = match op {
            UnaryOperator::Negate => return Ok(Lowered::negate(lowered)),
            UnaryOperator::Minimum => return Ok(Lowered::minimum(lowered)),
            UnaryOperator::Maximum => return Ok(Lowered::maximum(lowered)),
            UnaryOperator::Gradient => self.block_operator(domains, |ops| &ops.gradient)?,
            UnaryOperator::Divergence => {
                if child.location()? != Location::Edges {
                    return Err(ModelError::discretization(format!(
                        "divergence needs a flux on full edges, '{}' is not",
                        child
                    )));
                }
                self.block_operator(domains, |ops| &ops.divergence)?
            }
            UnaryOperator::Average => self.block_operator(domains, |ops| &ops.average)?,
            UnaryOperator::BoundaryValue(side) => {
                self.block_operator(domains, |ops| ops.boundary(side))?
            }
        };
        Lowered::linear(matrix, lowered)
    }

    fn lower_binary(&self, op: BinaryOperator, left: &Expr, right: &Expr) -> ModelResult<Lowered> {
        let (a, b) = (self.lower(left)?, self.lower(right)?);
        let op = match op {
            BinaryOperator::Add => Elementwise::Add,
            BinaryOperator::Subtract => Elementwise::Subtract,
            BinaryOperator::Multiply => Elementwise::Multiply,
            BinaryOperator::Divide => Elementwise::Divide,
            BinaryOperator::Power => Elementwise::Power,
            BinaryOperator::Inner => {
                let a = self.to_nodes(left, a)?;
                let b = self.to_nodes(right, b)?;
                return Lowered::elementwise(Elementwise::Multiply, a, b);
            }
        };
        Lowered::elementwise(op, a, b)
    }

    fn to_nodes(&self, expr: &Expr, lowered: Lowered) -> ModelResult<Lowered> {
        let domains = expr.domains()?;
        let matrix = match expr.location()? {
            Location::Nodes => return Ok(lowered),
            Location::InteriorEdges => {
                self.block_operator(domains, |ops| &ops.interior_edges_to_nodes)?
            }
            Location::Edges => self.block_operator(domains, |ops| &ops.edges_to_nodes)?,
        };
        Lowered::linear(matrix, lowered)
    }

    fn lower_broadcast(
        &self,
        kind: BroadcastKind,
        child: &Expr,
        target: &Domains,
    ) -> ModelResult<Lowered> {
        let lowered = self.lower(child)?;
        match kind {
            BroadcastKind::Full => lowered.broadcast_to(self.mesh.size(target)?),
            BroadcastKind::FullToEdges => {
                let edges = (self.mesh.npts(&target.primary)? + 1) * self.blocks(target)?;
                lowered.broadcast_to(edges)
            }
            BroadcastKind::Primary => {
                let n = self.mesh.npts(&target.primary)?;
                let matrix = kron(&identity(lowered.len()), &ones_column(n));
                Lowered::linear(matrix, lowered)
            }
            BroadcastKind::Secondary => {
                let p = self.mesh.npts(&target.primary)?;
                let k = self.mesh.npts(&target.secondary)?;
                let outer = lowered.len() / p.max(1);
                let matrix = kron(&identity(outer), &kron(&ones_column(k), &identity(p)));
                Lowered::linear(matrix, lowered)
            }
        }
    }

    fn lower_concatenation(&self, children: &[Expr], shape: &Shape) -> ModelResult<Lowered> {
        if shape.location == Location::Edges {
            return self.lower_flux(children, shape);
        }
        let domains = &shape.domains;
        let blocks = self.blocks(domains)?;
        let total = self.mesh.npts(&domains.primary)?;
        let mut terms = Vec::with_capacity(children.len());
        let mut offset = 0;
        for child in children {
            let n = self.mesh.npts(&child.domains()?.primary)?;
            let lowered = self.lower(child)?.broadcast_to(n * blocks)?;
            let placement = from_triplets(
                total * blocks,
                n * blocks,
                (0..blocks).flat_map(move |b| (0..n).map(move |j| (b * total + offset + j, b * n + j, 1.0))),
            );
            terms.push(Lowered::linear(placement, lowered)?);
            offset += n;
        }
        Lowered::sum(terms)
    }

    /// `[left, interior, right]` interleaved per block onto full edges.
    fn lower_flux(&self, children: &[Expr], shape: &Shape) -> ModelResult<Lowered> {
        let [left, interior, right] = children else {
            return Err(ModelError::discretization(format!(
                "a flux needs exactly a left value, an interior and a right value, found {} parts",
                children.len()
            )));
        };
        let blocks = self.blocks(&shape.domains)?;
        let n = self.mesh.npts(&shape.domains.primary)?;
        let width = n + 1;
        let interior_len = (n - 1) * blocks;

        let left = self.lower(left)?.broadcast_to(blocks)?;
        let right = self.lower(right)?.broadcast_to(blocks)?;
        let interior = self.lower(interior)?.broadcast_to(interior_len)?;

        let rows = width * blocks;
        let place_left = from_triplets(rows, blocks, (0..blocks).map(|b| (b * width, b, 1.0)));
        let place_right =
            from_triplets(rows, blocks, (0..blocks).map(|b| (b * width + n, b, 1.0)));
        let place_interior = from_triplets(
            rows,
            interior_len,
            (0..blocks).flat_map(|b| (0..n - 1).map(move |j| (b * width + 1 + j, b * (n - 1) + j, 1.0))),
        );
        Lowered::sum(vec![
            Lowered::linear(place_left, left)?,
            Lowered::linear(place_interior, interior)?,
            Lowered::linear(place_right, right)?,
        ])
    }
}

/// Forward-difference approximation of `df/dx` at `x`.
pub fn jacobian_fd<F>(f: F, x: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let base = f(x);
    let mut jac = DMatrix::zeros(base.len(), x.len());
    let mut shifted = x.to_vec();
    for j in 0..x.len() {
        let h = f64::EPSILON.sqrt() * x[j].abs().max(1.0);
        shifted[j] = x[j] + h;
        for (i, (plus, f0)) in f(&shifted).iter().zip(&base).enumerate() {
            jac[(i, j)] = (plus - f0) / h;
        }
        shifted[j] = x[j];
    }
    jac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::expression::{
        concatenation, div, flux_with_boundary_conditions, grad, maximum, FluxBoundaryConditions,
        SpatialVariable,
    };
    use crate::expression::CoordSys;
    use crate::geometry::Geometry;
    use crate::mesh::VarPts;
    use crate::model::{Equations, Event, ModelBuilder, Submodel};

    #[derive(Default)]
    struct Fixture {
        variables: Variables,
        rhs: Equations,
        algebraic: Equations,
        initial_conditions: Equations,
        events: Vec<Event>,
    }

    impl Submodel for Fixture {
        fn name(&self) -> &str {
            "fixture"
        }
        fn get_fundamental_variables(&self) -> ModelResult<Variables> {
            Ok(self.variables.clone())
        }
        fn set_rhs(&self, _: &Variables) -> ModelResult<Equations> {
            Ok(self.rhs.clone())
        }
        fn set_algebraic(&self, _: &Variables) -> ModelResult<Equations> {
            Ok(self.algebraic.clone())
        }
        fn set_initial_conditions(&self, _: &Variables) -> ModelResult<Equations> {
            Ok(self.initial_conditions.clone())
        }
        fn set_events(&self, _: &Variables) -> ModelResult<Vec<Event>> {
            Ok(self.events.clone())
        }
    }

    fn discretise(fixture: Fixture, var_pts: VarPts) -> ModelResult<DiscretisedModel> {
        let model = ModelBuilder::new("fixture").with_submodel(fixture).build()?;
        let mesh = Mesh::new(&Geometry::default(), &var_pts)?;
        Discretisation::new(Rc::new(mesh)).process_model(&model)
    }

    fn on(domain: Domain) -> Domains {
        Domains::new(vec![domain])
    }

    fn key(expr: &Expr) -> StateKey {
        StateKey::from_expr(expr).unwrap()
    }

    #[test]
    fn test_layout_puts_rhs_first() {
        let u = Expr::from(Variable::new("u", on(Domain::Separator)));
        let v = Expr::from(Variable::new("v", on(Domain::CurrentCollector)));
        let mut fixture = Fixture::default();
        fixture.variables.insert("v", v.clone());
        fixture.variables.insert("u", u.clone());
        fixture.algebraic.insert(key(&v), &v - 1.0);
        fixture.rhs.insert(key(&u), -&u);
        fixture.initial_conditions.insert(key(&u), Expr::scalar(2.0));
        fixture.initial_conditions.insert(key(&v), Expr::scalar(0.5));

        let model = discretise(fixture, VarPts::uniform(3)).unwrap();
        let slots = model.layout().slots();
        assert_eq!(slots[0].variable.name(), "u");
        assert_eq!(slots[0].range(), 0..3);
        assert_eq!(slots[1].range(), 3..4);
        assert_eq!(model.len_rhs(), 3);
        assert_eq!(model.len_algebraic(), 1);
        assert_eq!(model.y0(), &[2.0, 2.0, 2.0, 0.5]);
        assert_eq!(model.residual(0.0, model.y0(), &[0.0; 3]), vec![2.0, 2.0, 2.0, -0.5]);
    }

    #[test]
    fn test_gradient_of_linear_profile() {
        let x = SpatialVariable::new("x_s", on(Domain::Separator), CoordSys::Cartesian).unwrap();
        let u = Expr::from(Variable::new("u", on(Domain::Separator)));
        let mut fixture = Fixture::default();
        fixture.variables.insert("u", u.clone());
        fixture.variables.insert("Gradient", grad(&u).unwrap());
        fixture.rhs.insert(key(&u), Expr::scalar(0.0));
        fixture.initial_conditions.insert(key(&u), 3.0 * Expr::spatial(x));

        let model = discretise(fixture, VarPts::uniform(6)).unwrap();
        let gradient = model.process_variable("Gradient").unwrap();
        let values = gradient.evaluate(0.0, model.y0());
        assert_eq!(values.len(), 5);
        assert!(values.iter().all(|g| (g - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_flux_boundary_values_are_placed_at_the_ends() {
        let u = Expr::from(Variable::new("u", on(Domain::Separator)));
        let bcs = FluxBoundaryConditions::new(Expr::scalar(1.0), Expr::scalar(2.0));
        let flux = flux_with_boundary_conditions(&-grad(&u).unwrap(), &bcs).unwrap();
        let mut fixture = Fixture::default();
        fixture.variables.insert("u", u.clone());
        fixture.variables.insert("Flux", flux.clone());
        fixture.rhs.insert(key(&u), -div(&flux).unwrap());
        fixture.initial_conditions.insert(key(&u), Expr::scalar(1.0));

        let model = discretise(fixture, VarPts::uniform(4)).unwrap();
        let values = model.process_variable("Flux").unwrap().evaluate(0.0, model.y0());
        assert_eq!(values.len(), 5);
        assert_eq!(values[0], 1.0);
        assert_eq!(values[4], 2.0);
        assert!(values[1..4].iter().all(|v| v.abs() < 1e-12));

        let rate = model.rhs(0.0, model.y0());
        assert!(rate[1..3].iter().all(|r| r.abs() < 1e-9));
        assert!(rate[0] > 0.0);
        assert!(rate[3] < 0.0);
    }

    #[test]
    fn test_concatenated_state_round_trips_through_layout() {
        let cc = |d| Domains::new(vec![d]).with_secondary(vec![Domain::CurrentCollector]);
        let parts: Vec<Expr> = [Domain::NegativeElectrode, Domain::Separator, Domain::PositiveElectrode]
            .into_iter()
            .enumerate()
            .map(|(i, d)| Expr::from(Variable::new(&format!("c{}", i), cc(d))))
            .collect();
        let c = concatenation(parts).unwrap();
        let mut fixture = Fixture::default();
        fixture.variables.insert("c", c.clone());
        fixture.rhs.insert(key(&c), c.clone());
        fixture.initial_conditions.insert(key(&c), Expr::scalar(0.0));

        let var_pts = VarPts { x_n: 2, x_s: 3, x_p: 2, z: 2, ..VarPts::uniform(2) };
        let model = discretise(fixture, var_pts).unwrap();
        assert_eq!(model.len(), 14);
        let y: Vec<f64> = (0..14).map(f64::from).collect();
        assert_eq!(model.rhs(0.0, &y), y);

        // the concatenated vector interleaves the pieces per current-collector point
        let whole = model.process_variable("c").unwrap().evaluate(0.0, &y);
        assert_eq!(&whole[..7], &[0.0, 1.0, 4.0, 5.0, 6.0, 10.0, 11.0]);
    }

    #[test]
    fn test_jacobian_of_linear_decay() {
        let u = Expr::from(Variable::new("u", on(Domain::Separator)));
        let mut fixture = Fixture::default();
        fixture.variables.insert("u", u.clone());
        fixture.rhs.insert(key(&u), -2.0 * &u.pow(2.0));
        fixture.initial_conditions.insert(key(&u), Expr::scalar(1.5));

        let model = discretise(fixture, VarPts::uniform(3)).unwrap();
        let jac = model.jacobian(0.0, model.y0());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { -6.0 } else { 0.0 };
                assert!((jac[(i, j)] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_unprocessed_parameter_is_rejected() {
        let u = Expr::from(Variable::new("u", on(Domain::CurrentCollector)));
        let mut fixture = Fixture::default();
        fixture.variables.insert("u", u.clone());
        fixture.rhs.insert(key(&u), Expr::parameter("k") * &u);
        fixture.initial_conditions.insert(key(&u), Expr::scalar(1.0));
        let err = discretise(fixture, VarPts::uniform(3)).unwrap_err();
        assert!(matches!(err, ModelError::Parameter(_)));
    }

    #[test]
    fn test_fd_jacobian_simple() {
        let f = |v: &[f64]| vec![v[0] * v[0], v[0] * v[1]];
        let jac = jacobian_fd(f, &[2.0, 3.0]);
        assert!((jac[(0, 0)] - 4.0).abs() < 1e-6);
        assert!(jac[(0, 1)].abs() < 1e-6);
        assert!((jac[(1, 0)] - 3.0).abs() < 1e-6);
        assert!((jac[(1, 1)] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_events_must_be_scalar() {
        let u = Expr::from(Variable::new("u", on(Domain::Separator)));
        let mut fixture = Fixture::default();
        fixture.variables.insert("u", u.clone());
        fixture.rhs.insert(key(&u), Expr::scalar(-1.0));
        fixture.initial_conditions.insert(key(&u), Expr::scalar(1.0));
        fixture.events.push(Event::termination("vector", u.clone()));
        let err = discretise(fixture, VarPts::uniform(3)).unwrap_err();
        assert!(matches!(err, ModelError::Discretization(_)));
    }

    #[test]
    fn test_event_values() {
        let u = Expr::from(Variable::new("u", on(Domain::Separator)));
        let mut fixture = Fixture::default();
        fixture.variables.insert("u", u.clone());
        fixture.rhs.insert(key(&u), Expr::scalar(-1.0));
        fixture.initial_conditions.insert(key(&u), Expr::scalar(1.0));
        fixture.events.push(Event::termination("ceiling", 2.0 - maximum(&u).unwrap()));
        let model = discretise(fixture, VarPts::uniform(3)).unwrap();
        assert_eq!(model.event_values(0.0, &[1.0, 2.5, 0.0]), vec![-0.5]);
        assert_eq!(model.events()[0].name, "ceiling");
    }
}
