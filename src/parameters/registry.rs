//! Named object registry
//!
//! A [`Registry`] owns a flat namespace of parameters, child registries
//! ("organizers"), equations, calculators and reserved names. Every name is
//! unique within the registry. The registry has its own tracker slot, and
//! every parameter and child registry it holds propagates changes into it, so
//! the registry's stamp is newer than any cache built before a member changed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::calculator::SharedCalculator;
use crate::equation::{compile, Equation, Symbol, SymbolTable};
use crate::error::{FitError, Result};
use crate::parameters::constraints::{Constraint, Restraint};
use crate::parameters::{Parameter, ParameterRef};
use crate::tracker::{ChangeTracker, TrackerId};
use crate::value::Value;

/// Registry shared between owners
pub type SharedRegistry = Rc<RefCell<Registry>>;

/// Collection of named parameters, sub-registries, equations and calculators
pub struct Registry {
    name: String,
    tracker: ChangeTracker,
    id: TrackerId,
    parameters: IndexMap<String, ParameterRef>,
    organizers: IndexMap<String, SharedRegistry>,
    equations: IndexMap<String, Rc<Equation>>,
    calculators: IndexMap<String, SharedCalculator>,
    reserved: IndexSet<String>,
    constraints: Vec<Constraint>,
    restraints: Vec<Rc<Restraint>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .field("organizers", &self.organizers.keys().collect::<Vec<_>>())
            .field("equations", &self.equations.keys().collect::<Vec<_>>())
            .field("calculators", &self.calculators.keys().collect::<Vec<_>>())
            .field("reserved", &self.reserved)
            .finish()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.tracker.release(self.id);
    }
}

impl Registry {
    /// Create an empty registry
    ///
    /// # Examples
    ///
    /// ```
    /// use srfit_rs::{ChangeTracker, Registry};
    ///
    /// let tracker = ChangeTracker::new();
    /// let registry = Registry::new(&tracker, "phase");
    /// assert_eq!(registry.name(), "phase");
    /// assert!(registry.is_empty());
    /// ```
    pub fn new(tracker: &ChangeTracker, name: &str) -> Self {
        Self {
            name: name.to_string(),
            tracker: tracker.clone(),
            id: tracker.register(),
            parameters: IndexMap::new(),
            organizers: IndexMap::new(),
            equations: IndexMap::new(),
            calculators: IndexMap::new(),
            reserved: IndexSet::new(),
            constraints: Vec::new(),
            restraints: Vec::new(),
        }
    }

    /// Wrap the registry for sharing as an organizer.
    pub fn into_shared(self) -> SharedRegistry {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn tracker_id(&self) -> TrackerId {
        self.id
    }

    /// Stamp of the most recent change to the registry or any member.
    pub fn stamp(&self) -> u64 {
        self.tracker.stamp(self.id)
    }

    /// Like [`Registry::stamp`], but also covering the inputs of constraints
    /// on member parameters, which may live outside the registry.
    pub fn logical_stamp(&self) -> Result<u64> {
        let mut stamp = self.stamp();
        for entry in self.parameters.values() {
            let param = entry.target()?;
            if param.is_constrained() {
                stamp = stamp.max(param.logical_stamped()?.1);
            }
        }
        for child in self.organizers.values() {
            stamp = stamp.max(child.borrow().logical_stamp()?);
        }
        for calc in self.calculators.values() {
            stamp = stamp.max(calc.borrow().registry().logical_stamp()?);
        }
        Ok(stamp)
    }

    /// Whether `name` is used by any member or reservation.
    pub fn is_taken(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
            || self.organizers.contains_key(name)
            || self.equations.contains_key(name)
            || self.calculators.contains_key(name)
            || self.reserved.contains(name)
    }

    /// All names in use, parameters first.
    pub fn names(&self) -> Vec<String> {
        self.parameters
            .keys()
            .chain(self.organizers.keys())
            .chain(self.equations.keys())
            .chain(self.calculators.keys())
            .chain(self.reserved.iter())
            .cloned()
            .collect()
    }

    pub(crate) fn check_name(&self, name: &str) -> Result<()> {
        if self.is_taken(name) {
            return Err(FitError::NameCollision(name.to_string()));
        }
        Ok(())
    }

    fn check_tracker(&self, tracker: &ChangeTracker, name: &str) -> Result<()> {
        if !self.tracker.same_arena(tracker) {
            return Err(FitError::TrackerMismatch(name.to_string()));
        }
        Ok(())
    }

    /// Add a parameter or proxy
    ///
    /// # Arguments
    ///
    /// * `param` - The parameter, or a proxy exposing another owner's parameter
    ///
    /// # Returns
    ///
    /// `Ok(())` if the parameter was added, or `NameCollision` if its name is
    /// already used in this registry
    pub fn add_parameter(&mut self, param: impl Into<ParameterRef>) -> Result<()> {
        let entry = param.into();
        let name = entry.name().to_string();
        self.check_name(&name)?;
        let target = entry.target()?;
        self.check_tracker(target.tracker(), &name)?;

        self.tracker.add_subject(target.tracker_id(), self.id)?;
        self.parameters.insert(name.clone(), entry);
        self.tracker.click(self.id);
        debug!(registry = %self.name, parameter = %name, "added parameter");
        Ok(())
    }

    /// Create a parameter and add it
    ///
    /// ```
    /// use srfit_rs::{ChangeTracker, Registry, Value};
    ///
    /// let tracker = ChangeTracker::new();
    /// let mut registry = Registry::new(&tracker, "peak");
    /// let width = registry.new_parameter("width", 0.5).unwrap();
    /// assert_eq!(registry.value("width").unwrap(), Value::Scalar(0.5));
    /// assert!(registry.new_parameter("width", 1.0).is_err());
    /// # drop(width);
    /// ```
    pub fn new_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<Parameter> {
        self.check_name(name)?;
        let param = Parameter::new(&self.tracker, name, value);
        self.add_parameter(&param)?;
        Ok(param)
    }

    /// Remove a parameter by name
    ///
    /// Any constraint this registry holds on the parameter is dropped and the
    /// parameter stops propagating changes into the registry.
    pub fn remove_parameter(&mut self, name: &str) -> Result<ParameterRef> {
        let entry = self
            .parameters
            .shift_remove(name)
            .ok_or_else(|| FitError::NotFound(format!("parameter '{}'", name)))?;

        if let Ok(target) = entry.target() {
            let mut released = false;
            self.constraints.retain(|c| {
                if c.parameter().refers_to(&target) {
                    released |= c.is_active();
                    false
                } else {
                    true
                }
            });
            if released {
                target.set_constraint(None);
            }
            self.tracker.remove_subject(target.tracker_id(), self.id);
        }
        self.tracker.click(self.id);
        debug!(registry = %self.name, parameter = %name, "removed parameter");
        Ok(entry)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterRef> {
        self.parameters.get(name)
    }

    /// The parameter registered under `name`, resolving proxies.
    pub fn parameter(&self, name: &str) -> Result<Parameter> {
        self.parameters
            .get(name)
            .ok_or_else(|| FitError::NotFound(format!("parameter '{}'", name)))?
            .target()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterRef> {
        self.parameters.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Constraint-aware value of a parameter.
    pub fn value(&self, name: &str) -> Result<Value> {
        self.parameter(name)?.logical_value()
    }

    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.parameter(name)?.set_value(value);
        Ok(())
    }

    /// Add a child registry
    ///
    /// The child's name must be free. With `check`, the child's own names must
    /// not collide with names in this registry either.
    pub fn add_organizer(&mut self, child: SharedRegistry, check: bool) -> Result<()> {
        let (child_name, child_id) = {
            let borrowed = child.try_borrow().map_err(|_| {
                FitError::CycleDetected(format!("registry '{}' cannot contain itself", self.name))
            })?;
            self.check_name(borrowed.name())?;
            if check {
                if let Some(clash) = borrowed.names().into_iter().find(|n| self.is_taken(n)) {
                    return Err(FitError::NameCollision(clash));
                }
            }
            self.check_tracker(borrowed.tracker(), borrowed.name())?;
            (borrowed.name().to_string(), borrowed.tracker_id())
        };

        self.tracker.add_subject(child_id, self.id)?;
        self.organizers.insert(child_name.clone(), child);
        self.tracker.click(self.id);
        debug!(registry = %self.name, organizer = %child_name, "added organizer");
        Ok(())
    }

    pub fn remove_organizer(&mut self, name: &str) -> Result<SharedRegistry> {
        let child = self
            .organizers
            .shift_remove(name)
            .ok_or_else(|| FitError::NotFound(format!("organizer '{}'", name)))?;
        let child_id = child.borrow().tracker_id();
        self.tracker.remove_subject(child_id, self.id);
        self.tracker.click(self.id);
        debug!(registry = %self.name, organizer = %name, "removed organizer");
        Ok(child)
    }

    pub fn organizer(&self, name: &str) -> Option<SharedRegistry> {
        self.organizers.get(name).cloned()
    }

    /// Register a compiled equation under `name`. An equation already
    /// registered under that name is replaced.
    pub fn register_equation(&mut self, name: &str, equation: Rc<Equation>) -> Result<()> {
        if !self.equations.contains_key(name) {
            self.check_name(name)?;
        }
        self.equations.insert(name.to_string(), equation);
        debug!(registry = %self.name, equation = %name, "registered equation");
        Ok(())
    }

    /// Compile `source` against this registry and register it under `name`.
    pub fn define_equation(&mut self, name: &str, source: &str) -> Result<Rc<Equation>> {
        if !self.equations.contains_key(name) {
            self.check_name(name)?;
        }
        let mut table = self.symbol_table();
        let equation = compile(name, source, &mut table, false)?.equation;
        self.register_equation(name, equation.clone())?;
        Ok(equation)
    }

    pub fn equation(&self, name: &str) -> Option<Rc<Equation>> {
        self.equations.get(name).cloned()
    }

    pub(crate) fn unregister_equation(&mut self, name: &str) -> Option<Rc<Equation>> {
        self.equations.shift_remove(name)
    }

    /// Make a calculator callable as `name(args...)` in later equations.
    ///
    /// Without an explicit name the calculator's own name is used.
    pub fn register_calculator(&mut self, calc: SharedCalculator, name: Option<&str>) -> Result<()> {
        let (name, calc_id) = {
            let borrowed = calc.try_borrow().map_err(|_| {
                FitError::CycleDetected("calculator is already borrowed".to_string())
            })?;
            let name = name.unwrap_or_else(|| borrowed.name()).to_string();
            self.check_tracker(borrowed.registry().tracker(), &name)?;
            (name, borrowed.registry().tracker_id())
        };
        self.check_name(&name)?;

        self.tracker.add_subject(calc_id, self.id)?;
        self.calculators.insert(name.clone(), calc);
        self.tracker.click(self.id);
        debug!(registry = %self.name, calculator = %name, "registered calculator");
        Ok(())
    }

    pub fn calculator(&self, name: &str) -> Option<SharedCalculator> {
        self.calculators.get(name).cloned()
    }

    /// Reserve `name` so that no member can take it.
    pub fn reserve(&mut self, name: &str) -> Result<()> {
        self.check_name(name)?;
        self.reserved.insert(name.to_string());
        Ok(())
    }

    /// Give back a reserved name. Returns whether it was reserved.
    pub fn release_name(&mut self, name: &str) -> bool {
        self.reserved.shift_remove(name)
    }

    /// Propagate changes of the slot `id` into this registry.
    pub(crate) fn attach(&mut self, id: TrackerId) -> Result<()> {
        self.tracker.add_subject(id, self.id)?;
        self.tracker.click(self.id);
        Ok(())
    }

    pub(crate) fn detach(&mut self, id: TrackerId) {
        self.tracker.remove_subject(id, self.id);
        self.tracker.click(self.id);
    }

    /// Compiler view of the registry: parameters, equations and calculators.
    pub fn symbol_table(&self) -> SymbolTable {
        let mut table = SymbolTable::new(&self.tracker);
        for (name, entry) in &self.parameters {
            table.insert(name, Symbol::Parameter(entry.clone()));
        }
        for (name, equation) in &self.equations {
            table.insert(name, Symbol::Equation(equation.clone()));
        }
        for (name, calc) in &self.calculators {
            table.insert(name, Symbol::Calculator(calc.clone()));
        }
        table
    }

    /// Whether any member's value depends on `param`.
    pub fn depends_on(&self, param: &Parameter) -> bool {
        self.parameters.values().any(|entry| {
            entry.target().map_or(false, |p| {
                p.ptr_eq(param) || p.constraint().map_or(false, |eq| eq.depends_on(param))
            })
        }) || self
            .organizers
            .values()
            .any(|child| child.try_borrow().map_or(false, |c| c.depends_on(param)))
            || self
                .calculators
                .values()
                .any(|calc| calc.try_borrow().map_or(false, |c| c.registry().depends_on(param)))
    }

    /// Constrain a parameter to the value of an expression
    ///
    /// The expression is compiled against this registry's names; unknown names
    /// fail with `UnresolvedVariable`.
    ///
    /// ```
    /// use srfit_rs::{ChangeTracker, Registry, Value};
    ///
    /// let tracker = ChangeTracker::new();
    /// let mut registry = Registry::new(&tracker, "model");
    /// let p = registry.new_parameter("p", 0.0).unwrap();
    /// let q = registry.new_parameter("q", 3.0).unwrap();
    ///
    /// registry.constrain(&p, "2 * q").unwrap();
    /// assert_eq!(registry.value("p").unwrap(), Value::Scalar(6.0));
    ///
    /// q.set_value(4.0);
    /// assert_eq!(p.logical_value().unwrap(), Value::Scalar(8.0));
    /// ```
    pub fn constrain(&mut self, param: impl Into<ParameterRef>, source: &str) -> Result<()> {
        let entry = param.into();
        let mut table = self.symbol_table();
        let name = format!("constraint_{}", entry.name());
        let equation = compile(&name, source, &mut table, false)?.equation;
        self.constrain_equation(entry, equation)
    }

    /// Constrain a parameter to a compiled equation.
    ///
    /// Fails with `CycleDetected` if the equation reads the parameter. A
    /// previous constraint on the parameter is replaced.
    pub fn constrain_equation(
        &mut self,
        param: impl Into<ParameterRef>,
        equation: Rc<Equation>,
    ) -> Result<()> {
        let entry = param.into();
        let target = entry.target()?;
        if equation.depends_on(&target) {
            return Err(FitError::CycleDetected(format!(
                "constraint on '{}' depends on itself",
                entry.name()
            )));
        }

        // Entries superseded by another registry's constraint are dropped too.
        self.constraints.retain(|c| c.is_active());
        let before = self.constraints.len();
        self.constraints.retain(|c| !c.parameter().refers_to(&target));
        if self.constraints.len() != before || target.is_constrained() {
            warn!(
                registry = %self.name,
                parameter = %entry.name(),
                "replacing existing constraint"
            );
        }

        target.set_constraint(Some(equation.clone()));
        debug!(registry = %self.name, parameter = %entry.name(), source = %equation.source(), "constrained");
        self.constraints.push(Constraint::new(entry, equation));
        Ok(())
    }

    /// Remove the constraint on a parameter, searching child registries too.
    pub fn unconstrain(&mut self, param: impl Into<ParameterRef>) -> Result<()> {
        let entry = param.into();
        let target = entry.target()?;
        if let Some(pos) = self
            .constraints
            .iter()
            .position(|c| c.parameter().refers_to(&target))
        {
            let constraint = self.constraints.remove(pos);
            if constraint.is_active() {
                target.set_constraint(None);
            }
            debug!(registry = %self.name, parameter = %entry.name(), "unconstrained");
            return Ok(());
        }
        for child in self.organizers.values() {
            if child.borrow_mut().unconstrain(entry.clone()).is_ok() {
                return Ok(());
            }
        }
        Err(FitError::NotFound(format!(
            "no constraint on '{}'",
            entry.name()
        )))
    }

    /// Restrain an expression to `[lb, ub]` with uncertainty `sig`
    ///
    /// # Arguments
    ///
    /// * `source` - Expression over this registry's names
    /// * `lb`, `ub` - Bounds; use infinities for one-sided restraints
    /// * `sig` - Scale of the penalty
    /// * `scaled` - Whether the penalty is multiplied by the caller's weight
    ///
    /// # Returns
    ///
    /// The installed restraint, needed to remove it again
    pub fn restrain(
        &mut self,
        source: &str,
        lb: f64,
        ub: f64,
        sig: f64,
        scaled: bool,
    ) -> Result<Rc<Restraint>> {
        let mut table = self.symbol_table();
        let equation = compile("restraint", source, &mut table, false)?.equation;
        Ok(self.restrain_equation(equation, lb, ub, sig, scaled))
    }

    pub fn restrain_equation(
        &mut self,
        equation: Rc<Equation>,
        lb: f64,
        ub: f64,
        sig: f64,
        scaled: bool,
    ) -> Rc<Restraint> {
        let restraint = Rc::new(Restraint::new(equation, lb, ub, sig, scaled));
        self.restraints.push(restraint.clone());
        debug!(registry = %self.name, lb, ub, sig, "restrained");
        restraint
    }

    /// Remove a restraint, searching child registries too.
    pub fn unrestrain(&mut self, restraint: &Rc<Restraint>) -> Result<()> {
        if let Some(pos) = self
            .restraints
            .iter()
            .position(|r| Rc::ptr_eq(r, restraint))
        {
            self.restraints.remove(pos);
            return Ok(());
        }
        for child in self.organizers.values() {
            if child.borrow_mut().unrestrain(restraint).is_ok() {
                return Ok(());
            }
        }
        Err(FitError::NotFound("restraint".to_string()))
    }

    /// Active constraints of this registry, its children and its calculators.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut all: Vec<Constraint> = self
            .constraints
            .iter()
            .filter(|c| c.is_active())
            .cloned()
            .collect();
        for child in self.organizers.values() {
            all.extend(child.borrow().constraints());
        }
        for calc in self.calculators.values() {
            all.extend(calc.borrow().registry().constraints());
        }
        all
    }

    /// Restraints of this registry, its children and its calculators.
    pub fn restraints(&self) -> Vec<Rc<Restraint>> {
        let mut all = self.restraints.clone();
        for child in self.organizers.values() {
            all.extend(child.borrow().restraints());
        }
        for calc in self.calculators.values() {
            all.extend(calc.borrow().registry().restraints());
        }
        all
    }

    /// Sum of all restraint penalties with weight `w`.
    pub fn penalty(&self, w: f64) -> Result<f64> {
        self.restraints()
            .iter()
            .try_fold(0.0, |acc, r| Ok(acc + r.penalty(w)?))
    }
}
