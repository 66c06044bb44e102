//! The submodel protocol and whole-cell model assembly.
//!
//! A battery model is a list of [`Submodel`]s, each describing one physical
//! mechanism. Building runs every submodel through the same stages, in
//! order, and merges what each stage returns into the model:
//!
//! 1. fundamental variables (the states each submodel owns, plus the
//!    quantities derived from them alone);
//! 2. coupled variables (quantities that need other submodels' variables),
//!    run in an order resolved from each submodel's declared dependencies;
//! 3. right-hand sides, algebraic equations, initial conditions, boundary
//!    conditions and events.
//!
//! The build state is tracked in the type of [`ModelBuilder`], so stages can
//! only run in order and only once. Assembly ends with a [`Model`], whose
//! equation sets are read-only.
//!
//! # Examples
//!
//! ```
//! use voltaic::model::ModelBuilder;
//! use voltaic::parameters::LithiumIonParameters;
//! use voltaic::submodels::{ConstantCurrent, ElectrolyteDiffusion};
//!
//! let param = LithiumIonParameters::new();
//! let model = ModelBuilder::new("electrolyte only")
//!     .with_submodel(ConstantCurrent::new(param.clone()))
//!     .with_submodel(ElectrolyteDiffusion::new(param))
//!     .build()
//!     .unwrap();
//! assert_eq!(model.rhs().len(), 1);
//! assert!(model.variables().contains("Electrolyte concentration"));
//! ```

use std::marker::PhantomData;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{ModelError, ModelResult};
use crate::expression::{concatenation, Expr, FluxBoundaryConditions, Symbol, Variable};

/// Ordered map from variable keys to expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables(IndexMap<String, Expr>);

impl Variables {
    pub fn new() -> Self {
        Variables(IndexMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, expr: Expr) -> Option<Expr> {
        self.0.insert(name.into(), expr)
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.0.get(name)
    }

    /// Looks up a variable another submodel must have provided.
    pub fn require(&self, name: &str) -> ModelResult<&Expr> {
        self.0.get(name).ok_or_else(|| ModelError::MissingVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Expr)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges `other` into `self`.
    ///
    /// Re-declaring an existing key is allowed only on the same domains.
    pub fn merge(&mut self, other: Variables) -> ModelResult<()> {
        for (name, expr) in other.0 {
            let domains = expr.domains()?;
            if let Some(existing) = self.0.get(&name) {
                let existing = existing.domains()?;
                if existing != domains {
                    return Err(ModelError::VariableCollision {
                        name,
                        existing: existing.primary.clone(),
                        new: domains.primary.clone(),
                    });
                }
            }
            self.0.insert(name, expr);
        }
        Ok(())
    }
}

impl FromIterator<(String, Expr)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, Expr)>>(iter: I) -> Self {
        Variables(iter.into_iter().collect())
    }
}

impl IntoIterator for Variables {
    type Item = (String, Expr);
    type IntoIter = indexmap::map::IntoIter<String, Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The state an equation evolves: one variable, or a concatenation of
/// per-domain variables solved as one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    Variable(Variable),
    Concatenation(Vec<Variable>),
}

impl StateKey {
    pub fn from_expr(expr: &Expr) -> ModelResult<Self> {
        match expr.symbol() {
            Symbol::Variable(v) => Ok(StateKey::Variable(v.clone())),
            Symbol::Concatenation(children) => children
                .iter()
                .map(|c| {
                    c.as_variable().cloned().ok_or_else(|| {
                        ModelError::domain(format!("'{}' is not a state variable", c))
                    })
                })
                .collect::<ModelResult<Vec<Variable>>>()
                .map(StateKey::Concatenation),
            _ => Err(ModelError::domain(format!(
                "equations must be keyed by a variable or a concatenation of variables, not '{}'",
                expr
            ))),
        }
    }

    pub fn variables(&self) -> &[Variable] {
        match self {
            StateKey::Variable(v) => std::slice::from_ref(v),
            StateKey::Concatenation(vs) => vs,
        }
    }

    pub fn name(&self) -> String {
        self.variables().iter().map(Variable::name).collect::<Vec<_>>().join(", ")
    }

    pub fn to_expr(&self) -> ModelResult<Expr> {
        match self {
            StateKey::Variable(v) => Ok(Expr::from(v.clone())),
            StateKey::Concatenation(vs) => {
                concatenation(vs.iter().cloned().map(Expr::from).collect())
            }
        }
    }
}

/// Equations keyed by the state they determine.
pub type Equations = IndexMap<StateKey, Expr>;

/// Flux boundary conditions keyed by the state they apply to.
pub type BoundaryConditions = IndexMap<StateKey, FluxBoundaryConditions>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Stops the solve
    Termination,
    /// Logged, the solve continues
    Warning,
    /// An interpolated quantity left its data range
    InterpolantExtrapolation,
}

/// A scalar condition monitored during a solve. It fires when its
/// expression becomes negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub expression: Expr,
    pub event_type: EventType,
}

impl Event {
    pub fn new(name: &str, expression: Expr, event_type: EventType) -> Self {
        Event { name: name.to_string(), expression, event_type }
    }

    pub fn termination(name: &str, expression: Expr) -> Self {
        Event::new(name, expression, EventType::Termination)
    }
}

/// A physical mechanism contributing to a model.
///
/// Every stage receives the variables merged so far and returns a fresh
/// collection; the builder does the merging. Stages a mechanism does not use
/// keep their empty default.
pub trait Submodel {
    fn name(&self) -> &str;

    fn get_fundamental_variables(&self) -> ModelResult<Variables> {
        Ok(Variables::new())
    }

    /// Keys that must exist before [`Submodel::get_coupled_variables`] runs.
    fn coupled_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn get_coupled_variables(&self, _variables: &Variables) -> ModelResult<Variables> {
        Ok(Variables::new())
    }

    fn set_rhs(&self, _variables: &Variables) -> ModelResult<Equations> {
        Ok(Equations::new())
    }

    fn set_algebraic(&self, _variables: &Variables) -> ModelResult<Equations> {
        Ok(Equations::new())
    }

    fn set_initial_conditions(&self, _variables: &Variables) -> ModelResult<Equations> {
        Ok(Equations::new())
    }

    fn set_boundary_conditions(&self, _variables: &Variables) -> ModelResult<BoundaryConditions> {
        Ok(BoundaryConditions::new())
    }

    fn set_events(&self, _variables: &Variables) -> ModelResult<Vec<Event>> {
        Ok(Vec::new())
    }
}

/// Marker trait for the build stages of a [`ModelBuilder`].
pub trait BuildState {}

/// Submodels registered, nothing built yet.
#[derive(Debug, Clone, Copy)]
pub struct Constructed;
impl BuildState for Constructed {}

/// Every submodel's fundamental variables are merged.
#[derive(Debug, Clone, Copy)]
pub struct FundamentalVariablesBuilt;
impl BuildState for FundamentalVariablesBuilt {}

/// Every submodel's coupled variables are merged.
#[derive(Debug, Clone, Copy)]
pub struct CoupledVariablesBuilt;
impl BuildState for CoupledVariablesBuilt {}

/// Staged builder of a whole-cell model.
pub struct ModelBuilder<S: BuildState> {
    name: String,
    submodels: Vec<Box<dyn Submodel>>,
    variables: Variables,
    _state: PhantomData<S>,
}

impl<S: BuildState> ModelBuilder<S> {
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn submodel_names(&self) -> Vec<&str> {
        self.submodels.iter().map(|s| s.name()).collect()
    }

    fn advance<T: BuildState>(self) -> ModelBuilder<T> {
        ModelBuilder {
            name: self.name,
            submodels: self.submodels,
            variables: self.variables,
            _state: PhantomData,
        }
    }
}

impl ModelBuilder<Constructed> {
    pub fn new(name: &str) -> Self {
        ModelBuilder {
            name: name.to_string(),
            submodels: Vec::new(),
            variables: Variables::new(),
            _state: PhantomData,
        }
    }

    pub fn with_submodel(mut self, submodel: impl Submodel + 'static) -> Self {
        self.submodels.push(Box::new(submodel));
        self
    }

    pub fn with_boxed_submodel(mut self, submodel: Box<dyn Submodel>) -> Self {
        self.submodels.push(submodel);
        self
    }

    pub fn build_fundamental_variables(mut self) -> ModelResult<ModelBuilder<FundamentalVariablesBuilt>> {
        for submodel in &self.submodels {
            debug!("Building fundamental variables of '{}'", submodel.name());
            let new = submodel.get_fundamental_variables()?;
            self.variables.merge(new)?;
        }
        Ok(self.advance())
    }

    /// Runs every stage and assembles the model.
    pub fn build(self) -> ModelResult<Model> {
        self.build_fundamental_variables()?.build_coupled_variables()?.assemble()
    }
}

impl ModelBuilder<FundamentalVariablesBuilt> {
    /// Runs the coupled stage of every submodel, each as soon as its declared
    /// dependencies exist.
    pub fn build_coupled_variables(mut self) -> ModelResult<ModelBuilder<CoupledVariablesBuilt>> {
        let mut pending: Vec<usize> = (0..self.submodels.len()).collect();
        while !pending.is_empty() {
            let (ready, waiting): (Vec<usize>, Vec<usize>) = pending.iter().partition(|&&i| {
                self.submodels[i]
                    .coupled_dependencies()
                    .iter()
                    .all(|key| self.variables.contains(key))
            });
            if ready.is_empty() {
                let missing = waiting
                    .iter()
                    .flat_map(|&i| self.submodels[i].coupled_dependencies())
                    .find(|key| !self.variables.contains(key))
                    .unwrap_or_default();
                return Err(ModelError::MissingVariable(missing));
            }
            for i in ready {
                let submodel = &self.submodels[i];
                debug!("Building coupled variables of '{}'", submodel.name());
                let new = submodel.get_coupled_variables(&self.variables)?;
                self.variables.merge(new)?;
            }
            pending = waiting;
        }
        Ok(self.advance())
    }
}

impl ModelBuilder<CoupledVariablesBuilt> {
    /// Collects equations, conditions and events from every submodel and
    /// checks that the result is well posed.
    pub fn assemble(self) -> ModelResult<Model> {
        let mut rhs = Equations::new();
        let mut algebraic = Equations::new();
        let mut initial_conditions = Equations::new();
        let mut boundary_conditions = BoundaryConditions::new();
        let mut events = Vec::new();

        for submodel in &self.submodels {
            let v = &self.variables;
            rhs.extend(checked(submodel.set_rhs(v)?)?);
            algebraic.extend(checked(submodel.set_algebraic(v)?)?);
            initial_conditions.extend(checked(submodel.set_initial_conditions(v)?)?);
            boundary_conditions.extend(submodel.set_boundary_conditions(v)?);
            for event in submodel.set_events(v)? {
                event.expression.check()?;
                events.push(event);
            }
        }

        let model = Model {
            name: self.name,
            submodels: self.submodels.iter().map(|s| s.name().to_string()).collect(),
            variables: self.variables,
            rhs,
            algebraic,
            initial_conditions,
            boundary_conditions,
            events,
        };
        model.check_well_posedness()?;
        info!(
            "Assembled model '{}': {} variables, {} rhs, {} algebraic, {} events",
            model.name,
            model.variables.len(),
            model.rhs.len(),
            model.algebraic.len(),
            model.events.len()
        );
        Ok(model)
    }
}

fn checked(equations: Equations) -> ModelResult<Equations> {
    for expr in equations.values() {
        expr.check()?;
    }
    Ok(equations)
}

/// An assembled, read-only model.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    submodels: Vec<String>,
    variables: Variables,
    rhs: Equations,
    algebraic: Equations,
    initial_conditions: Equations,
    boundary_conditions: BoundaryConditions,
    events: Vec<Event>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn submodels(&self) -> &[String] {
        &self.submodels
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn rhs(&self) -> &Equations {
        &self.rhs
    }

    pub fn algebraic(&self) -> &Equations {
        &self.algebraic
    }

    pub fn initial_conditions(&self) -> &Equations {
        &self.initial_conditions
    }

    pub fn boundary_conditions(&self) -> &BoundaryConditions {
        &self.boundary_conditions
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Names of every variable the equations evolve, rhs states first.
    pub fn state_variables(&self) -> Vec<&Variable> {
        self.rhs.keys().chain(self.algebraic.keys()).flat_map(StateKey::variables).collect()
    }

    /// Applies `f` to every expression in the model, returning a new model.
    pub fn map_expressions<F>(&self, f: &mut F) -> ModelResult<Model>
    where
        F: FnMut(&Expr) -> ModelResult<Expr>,
    {
        let mut map = |eqs: &Equations| -> ModelResult<Equations> {
            eqs.iter().map(|(k, e)| Ok((k.clone(), f(e)?))).collect()
        };
        let rhs = map(&self.rhs)?;
        let algebraic = map(&self.algebraic)?;
        let initial_conditions = map(&self.initial_conditions)?;
        let variables = self
            .variables
            .iter()
            .map(|(k, e)| Ok((k.clone(), f(e)?)))
            .collect::<ModelResult<Variables>>()?;
        let boundary_conditions = self
            .boundary_conditions
            .iter()
            .map(|(k, bc)| {
                Ok((k.clone(), FluxBoundaryConditions::new(f(&bc.left)?, f(&bc.right)?)))
            })
            .collect::<ModelResult<BoundaryConditions>>()?;
        let events = self
            .events
            .iter()
            .map(|e| Ok(Event::new(&e.name, f(&e.expression)?, e.event_type)))
            .collect::<ModelResult<Vec<Event>>>()?;
        Ok(Model {
            name: self.name.clone(),
            submodels: self.submodels.clone(),
            variables,
            rhs,
            algebraic,
            initial_conditions,
            boundary_conditions,
            events,
        })
    }

    /// Checks that the equations determine every state exactly once.
    pub fn check_well_posedness(&self) -> ModelResult<()> {
        for key in self.algebraic.keys() {
            if self.rhs.contains_key(key) {
                return Err(ModelError::IllPosed(format!(
                    "'{}' has both a differential and an algebraic equation",
                    key.name()
                )));
            }
        }
        let states = self.state_variables();
        for (i, v) in states.iter().enumerate() {
            if states[..i].iter().any(|w| w.name() == v.name()) {
                return Err(ModelError::IllPosed(format!(
                    "'{}' is determined by more than one equation",
                    v.name()
                )));
            }
        }
        for key in self.rhs.keys().chain(self.algebraic.keys()) {
            let Some(ic) = self.initial_conditions.get(key) else {
                return Err(ModelError::IllPosed(format!(
                    "no initial condition for '{}'",
                    key.name()
                )));
            };
            if ic.depends_on_state() {
                return Err(ModelError::IllPosed(format!(
                    "initial condition for '{}' depends on the state",
                    key.name()
                )));
            }
        }
        for (key, bc) in &self.boundary_conditions {
            if !self.rhs.contains_key(key) && !self.algebraic.contains_key(key) {
                return Err(ModelError::IllPosed(format!(
                    "boundary conditions given for '{}', which no equation determines",
                    key.name()
                )));
            }
            bc.left.check()?;
            bc.right.check()?;
        }
        let referenced = self
            .rhs
            .values()
            .chain(self.algebraic.values())
            .chain(self.boundary_conditions.values().flat_map(|bc| [&bc.left, &bc.right]))
            .chain(self.events.iter().map(|e| &e.expression));
        for expr in referenced {
            for v in expr.variables() {
                if !states.iter().any(|s| s.name() == v.name()) {
                    return Err(ModelError::IllPosed(format!(
                        "'{}' appears in an equation but is not a state variable",
                        v.name()
                    )));
                }
            }
        }
        Ok(())
    }
}
