//! Fit contributions
//!
//! A [`FitContribution`] binds a [`Profile`](crate::Profile) of observed data,
//! a main equation computing the model signal and a residual equation
//! comparing the two. Each call to [`FitContribution::residual`] pulls fresh
//! values through the memoized equation graphs, so only the parts of the
//! model whose inputs changed since the last call are recomputed.
//!
//! ```
//! use ndarray::array;
//! use srfit_rs::{ChangeTracker, FitContribution, Profile};
//!
//! let tracker = ChangeTracker::new();
//! let profile = Profile::new(&tracker).into_shared();
//! profile
//!     .borrow_mut()
//!     .set_observed_profile(array![0.0, 1.0, 2.0], array![0.0, 1.0, 4.0], None)
//!     .unwrap();
//!
//! let mut contribution = FitContribution::new(&tracker, "quadratic");
//! contribution.set_profile(profile.clone()).unwrap();
//! contribution.set_equation("x**2").unwrap();
//!
//! assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, 0.0]);
//! assert_eq!(profile.borrow().ycalc(), Some(&array![0.0, 1.0, 4.0]));
//! ```

use std::rc::Rc;

use indexmap::IndexMap;
use ndarray::Array1;
use serde::Serialize;
use tracing::debug;

use crate::calculator::SharedCalculator;
use crate::config::{ContributionConfig, ResidualForm};
use crate::equation::{compile, Equation, Symbol, SymbolTable};
use crate::error::{FitError, Result};
use crate::generator::SharedGenerator;
use crate::parameters::{
    Constraint, Parameter, ParameterProxy, ParameterRef, Registry, Restraint, SharedRegistry,
};
use crate::profile::SharedProfile;
use crate::tracker::ChangeTracker;
use crate::value::Value;

/// Name under which the main equation is visible to the residual.
pub const EQUATION_NAME: &str = "eq";

/// How far a contribution has been set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionState {
    /// Neither a profile nor an equation
    Uninitialized,

    /// A profile is bound, the main equation is missing
    ProfileBound,

    /// A main equation exists; the residual is the default one if a profile is bound
    EquationBound,

    /// An explicitly chosen residual is installed
    ResidualBound,
}

#[derive(Debug)]
struct ProfileBinding {
    profile: SharedProfile,
    xname: String,
    yname: String,
    dyname: String,
}

impl ProfileBinding {
    fn names(&self) -> [&str; 3] {
        [&self.xname, &self.yname, &self.dyname]
    }
}

#[derive(Debug)]
struct MainEquation {
    equation: Rc<Equation>,
    allow_new_vars: bool,
    namespace: Vec<ParameterRef>,
}

/// Snapshot of a contribution for reporting
#[derive(Debug, Clone, Serialize)]
pub struct ContributionSummary {
    pub name: String,
    pub state: ContributionState,
    pub profile: Option<ProfileSummary>,
    pub equation: Option<String>,
    pub residual: Option<String>,
    pub generators: Vec<String>,
    pub parameters: Vec<ParameterSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub xname: String,
    pub yname: String,
    pub dyname: String,
    pub points: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    pub value: Option<Value>,
    pub constrained: bool,
    pub proxy: bool,
}

/// Residual-producing unit of a fit
#[derive(Debug)]
pub struct FitContribution {
    registry: Registry,
    config: ContributionConfig,
    binding: Option<ProfileBinding>,
    generators: IndexMap<String, SharedGenerator>,
    equation: Option<MainEquation>,
    residual: Option<Rc<Equation>>,
    residual_form: Option<ResidualForm>,
}

impl FitContribution {
    /// Create an empty contribution with the default configuration.
    pub fn new(tracker: &ChangeTracker, name: &str) -> Self {
        Self::with_config(tracker, name, ContributionConfig::default())
    }

    pub fn with_config(tracker: &ChangeTracker, name: &str, config: ContributionConfig) -> Self {
        Self {
            registry: Registry::new(tracker, name),
            config,
            binding: None,
            generators: IndexMap::new(),
            equation: None,
            residual: None,
            residual_form: None,
        }
    }

    pub fn name(&self) -> &str {
        self.registry.name()
    }

    pub fn config(&self) -> &ContributionConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ChangeTracker {
        self.registry.tracker()
    }

    /// The contribution's own registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn state(&self) -> ContributionState {
        match (&self.binding, &self.equation) {
            (None, None) => ContributionState::Uninitialized,
            (Some(_), None) => ContributionState::ProfileBound,
            (_, Some(_)) if self.residual.is_some() && self.residual_form.is_some() => {
                ContributionState::ResidualBound
            }
            (_, Some(_)) => ContributionState::EquationBound,
        }
    }

    pub fn profile(&self) -> Option<SharedProfile> {
        self.binding.as_ref().map(|b| b.profile.clone())
    }

    /// Names of the bound `x`, `y` and `dy` proxies.
    pub fn profile_names(&self) -> Option<[&str; 3]> {
        self.binding.as_ref().map(ProfileBinding::names)
    }

    /// Bind a profile, exposing its columns under their own names.
    pub fn set_profile(&mut self, profile: SharedProfile) -> Result<()> {
        self.set_profile_named(profile, None, None, None)
    }

    /// Bind a profile, exposing its columns under the given names
    ///
    /// Proxies of a previously bound profile are removed first and every
    /// generator is rebound. An existing main equation is rebuilt against the
    /// new proxies together with its residual; if that fails, nothing
    /// changes.
    pub fn set_profile_named(
        &mut self,
        profile: SharedProfile,
        xname: Option<&str>,
        yname: Option<&str>,
        dyname: Option<&str>,
    ) -> Result<()> {
        let (proxies, binding) = {
            let p = profile.borrow();
            if !p.xpar().tracker().same_arena(self.tracker()) {
                return Err(FitError::TrackerMismatch(format!("profile of '{}'", self.name())));
            }
            let xname = xname.unwrap_or_else(|| p.xpar().name()).to_string();
            let yname = yname.unwrap_or_else(|| p.ypar().name()).to_string();
            let dyname = dyname.unwrap_or_else(|| p.dypar().name()).to_string();
            let proxies = [
                ParameterProxy::new(&xname, p.xpar()),
                ParameterProxy::new(&yname, p.ypar()),
                ParameterProxy::new(&dyname, p.dypar()),
            ];
            let binding = ProfileBinding {
                profile: profile.clone(),
                xname,
                yname,
                dyname,
            };
            (proxies, binding)
        };

        let new_names = binding.names();
        let old_names: Vec<String> = self
            .binding
            .as_ref()
            .map(|b| b.names().iter().map(|n| n.to_string()).collect())
            .unwrap_or_default();
        for (i, name) in new_names.iter().enumerate() {
            if new_names[..i].contains(name) {
                return Err(FitError::NameCollision(name.to_string()));
            }
            if self.registry.is_taken(name) && !old_names.iter().any(|o| o == name) {
                return Err(FitError::NameCollision(name.to_string()));
            }
            let external = self
                .equation
                .as_ref()
                .map_or(false, |main| main.namespace.iter().any(|e| e.name() == *name));
            if external {
                return Err(FitError::NameCollision(name.to_string()));
            }
        }

        // Rebuild against the namespace as it will look after the swap.
        let rebuilt = match &self.equation {
            Some(main) => {
                let mut table = self.symbol_table(&main.namespace);
                for name in &old_names {
                    table.remove(name);
                }
                for proxy in &proxies {
                    table.insert(proxy.name(), Symbol::Parameter(proxy.clone().into()));
                }
                table.remove(EQUATION_NAME);
                let equation =
                    compile(EQUATION_NAME, main.equation.source(), &mut table, false)?.equation;
                let residual = self.compile_residual(&mut table, &equation, &binding, None)?;
                Some((equation, residual))
            }
            None => None,
        };

        for name in &old_names {
            if self.registry.contains(name) {
                self.registry.remove_parameter(name)?;
            }
        }
        for proxy in proxies {
            self.registry.add_parameter(proxy)?;
        }
        for gen in self.generators.values() {
            gen.borrow_mut().set_profile(profile.clone());
        }
        debug!(
            contribution = %self.name(),
            x = %binding.xname,
            y = %binding.yname,
            dy = %binding.dyname,
            "bound profile"
        );
        self.binding = Some(binding);

        if let Some((equation, residual)) = rebuilt {
            self.install_equation(equation.clone())?;
            if let Some(main) = self.equation.as_mut() {
                main.equation = equation;
            }
            self.residual = Some(residual);
        }
        Ok(())
    }

    /// Add a generator, usable by bare name in equations
    ///
    /// # Arguments
    ///
    /// * `gen` - The generator
    /// * `name` - Name in the equation namespace; defaults to the generator's name
    ///
    /// # Returns
    ///
    /// `NameCollision` if the name is taken. When no main equation exists, the
    /// generator's output becomes the main equation.
    pub fn add_generator(&mut self, gen: SharedGenerator, name: Option<&str>) -> Result<()> {
        let (name, gen_id) = {
            let g = gen.borrow();
            let name = name.unwrap_or_else(|| g.name()).to_string();
            if !g.registry().tracker().same_arena(self.tracker()) {
                return Err(FitError::TrackerMismatch(name));
            }
            (name, g.registry().tracker_id())
        };
        self.registry.reserve(&name)?;
        if let Err(e) = self.registry.attach(gen_id) {
            self.registry.release_name(&name);
            return Err(e);
        }
        if let Some(binding) = &self.binding {
            gen.borrow_mut().set_profile(binding.profile.clone());
        }
        self.generators.insert(name.clone(), gen);
        debug!(contribution = %self.name(), generator = %name, "added generator");

        if self.equation.is_none() {
            if let Err(e) = self.set_equation_with(&name, false, &[]) {
                if let Some(gen) = self.generators.shift_remove(&name) {
                    let id = gen.borrow().registry().tracker_id();
                    self.registry.detach(id);
                }
                self.registry.release_name(&name);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn generator(&self, name: &str) -> Option<SharedGenerator> {
        self.generators.get(name).cloned()
    }

    /// Names of the generators, in insertion order.
    pub fn generator_names(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }

    /// Make a calculator callable as `name(args...)`.
    pub fn add_calculator(&mut self, calc: SharedCalculator, name: Option<&str>) -> Result<()> {
        self.registry.register_calculator(calc, name)
    }

    /// Set the main equation with the configured `allow_new_vars` default.
    pub fn set_equation(&mut self, source: &str) -> Result<()> {
        let allow_new_vars = self.config.allow_new_vars;
        self.set_equation_with(source, allow_new_vars, &[])
    }

    /// Set the main equation
    ///
    /// `namespace` holds extra parameters the equation may use without them
    /// becoming part of the contribution; their names must not already be in
    /// use. Unknown names become new parameters owned by the contribution
    /// when `allow_new_vars` is set. On any error the previous equation stays
    /// installed.
    pub fn set_equation_with(
        &mut self,
        source: &str,
        allow_new_vars: bool,
        namespace: &[ParameterRef],
    ) -> Result<()> {
        for (i, entry) in namespace.iter().enumerate() {
            let name = entry.name();
            if self.registry.is_taken(name) || namespace[..i].iter().any(|e| e.name() == name) {
                return Err(FitError::NameCollision(name.to_string()));
            }
            if !entry.target()?.tracker().same_arena(self.tracker()) {
                return Err(FitError::TrackerMismatch(name.to_string()));
            }
        }

        let mut table = self.symbol_table(namespace);
        table.remove(EQUATION_NAME);
        let compiled = compile(EQUATION_NAME, source, &mut table, allow_new_vars)?;
        for param in &compiled.new_parameters {
            self.registry.check_name(param.name())?;
        }
        let residual = match &self.binding {
            Some(binding) => Some(self.compile_residual(
                &mut table,
                &compiled.equation,
                binding,
                None,
            )?),
            None => None,
        };

        for param in compiled.new_parameters {
            self.registry.add_parameter(param)?;
        }
        self.install_equation(compiled.equation.clone())?;
        self.equation = Some(MainEquation {
            equation: compiled.equation,
            allow_new_vars,
            namespace: namespace.to_vec(),
        });
        self.residual = residual;
        debug!(contribution = %self.name(), source, "set equation");
        Ok(())
    }

    /// Source of the main equation
    pub fn equation_source(&self) -> Option<&str> {
        self.equation.as_ref().map(|m| m.equation.source())
    }

    pub fn equation(&self) -> Option<Rc<Equation>> {
        self.equation.as_ref().map(|m| m.equation.clone())
    }

    /// Whether the main equation was allowed to create parameters.
    pub fn allows_new_vars(&self) -> Option<bool> {
        self.equation.as_ref().map(|m| m.allow_new_vars)
    }

    /// Choose the residual
    ///
    /// `"chiv"` and `"resv"` select the built-in forms; any other string is
    /// compiled as an expression over `eq`, the profile names and the
    /// contribution's parameters. `None` keeps the last chosen form, or the
    /// configured default. Without a main equation the choice is remembered
    /// and applied once an equation is set.
    pub fn set_residual_equation(&mut self, source: Option<&str>) -> Result<()> {
        let binding = self.binding.as_ref().ok_or(FitError::ProfileNotSet)?;
        let form = match source {
            Some(source) => ResidualForm::parse(source),
            None => self.current_residual_form(),
        };

        let main = match &self.equation {
            Some(main) => main,
            None => {
                if source.is_some() {
                    self.residual_form = Some(form);
                }
                return Ok(());
            }
        };

        let text = form.source(&binding.yname, &binding.dyname);
        let unchanged = self
            .residual
            .as_ref()
            .map_or(false, |r| r.source() == text);
        if !unchanged {
            let mut table = self.symbol_table(&main.namespace);
            let residual =
                self.compile_residual(&mut table, &main.equation, binding, Some(&form))?;
            self.residual = Some(residual);
            debug!(contribution = %self.name(), residual = %text, "set residual");
        }
        if source.is_some() {
            self.residual_form = Some(form);
        }
        Ok(())
    }

    /// Source of the installed residual
    pub fn residual_source(&self) -> Option<&str> {
        self.residual.as_ref().map(|r| r.source())
    }

    pub fn residual_equation(&self) -> Option<Rc<Equation>> {
        self.residual.clone()
    }

    /// Evaluate the residual
    ///
    /// The main equation's value is stored in the profile as the calculated
    /// signal before the residual is evaluated. Scalars are broadcast to the
    /// number of observed points.
    pub fn residual(&self) -> Result<Array1<f64>> {
        let binding = self.binding.as_ref().ok_or(FitError::ProfileNotSet)?;
        let main = self.equation.as_ref().ok_or(FitError::EquationNotSet)?;
        let residual = self.residual.as_ref().ok_or(FitError::EquationNotSet)?;

        let points = observed_points(&binding.profile)?;
        let ycalc = main.equation.evaluate()?.into_array(points)?;
        binding.profile.borrow_mut().set_ycalc(ycalc);
        residual.evaluate()?.into_array(points)
    }

    /// Evaluate the main equation only.
    pub fn evaluate(&self) -> Result<Value> {
        self.equation
            .as_ref()
            .ok_or(FitError::EquationNotSet)?
            .equation
            .evaluate()
    }

    /// `chi^2 = sum(((ycalc - y) / dy)^2)` for the current parameter values.
    pub fn chi2(&self) -> Result<f64> {
        let (y, dy, ycalc) = self.observed_and_calculated()?;
        Ok(((&ycalc - &y) / &dy).mapv(|r| r * r).sum())
    }

    /// `Rw = sqrt(sum((ycalc - y)^2) / sum(y^2))` for the current parameter values.
    pub fn rw(&self) -> Result<f64> {
        let (y, _, ycalc) = self.observed_and_calculated()?;
        let diff = (&ycalc - &y).mapv(|r| r * r).sum();
        Ok((diff / y.mapv(|v| v * v).sum()).sqrt())
    }

    /// Restraint penalty of the contribution, its children and generators.
    pub fn penalty(&self, w: f64) -> Result<f64> {
        self.restraints()
            .iter()
            .try_fold(0.0, |acc, r| Ok(acc + r.penalty(w)?))
    }

    /// Active constraints, including those of generators.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut all = self.registry.constraints();
        for gen in self.generators.values() {
            all.extend(gen.borrow().registry().constraints());
        }
        all
    }

    /// Restraints, including those of generators.
    pub fn restraints(&self) -> Vec<Rc<Restraint>> {
        let mut all = self.registry.restraints();
        for gen in self.generators.values() {
            all.extend(gen.borrow().registry().restraints());
        }
        all
    }

    pub fn add_parameter(&mut self, param: impl Into<ParameterRef>) -> Result<()> {
        self.registry.add_parameter(param)
    }

    pub fn new_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<Parameter> {
        self.registry.new_parameter(name, value)
    }

    pub fn remove_parameter(&mut self, name: &str) -> Result<ParameterRef> {
        self.registry.remove_parameter(name)
    }

    pub fn parameter(&self, name: &str) -> Result<Parameter> {
        self.registry.parameter(name)
    }

    /// Constraint-aware value of a parameter.
    pub fn value(&self, name: &str) -> Result<Value> {
        self.registry.value(name)
    }

    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.registry.set_value(name, value)
    }

    pub fn add_organizer(&mut self, child: SharedRegistry, check: bool) -> Result<()> {
        self.registry.add_organizer(child, check)
    }

    /// Constrain a parameter to an expression over the contribution's names.
    pub fn constrain(&mut self, param: impl Into<ParameterRef>, source: &str) -> Result<()> {
        let entry = param.into();
        let mut table = self.symbol_table(&[]);
        table.remove(EQUATION_NAME);
        let name = format!("constraint_{}", entry.name());
        let equation = compile(&name, source, &mut table, false)?.equation;
        self.registry.constrain_equation(entry, equation)
    }

    pub fn unconstrain(&mut self, param: impl Into<ParameterRef>) -> Result<()> {
        self.registry.unconstrain(param)
    }

    /// Restrain an expression over the contribution's names to `[lb, ub]`.
    pub fn restrain(
        &mut self,
        source: &str,
        lb: f64,
        ub: f64,
        sig: f64,
        scaled: bool,
    ) -> Result<Rc<Restraint>> {
        let mut table = self.symbol_table(&[]);
        let equation = compile("restraint", source, &mut table, false)?.equation;
        Ok(self.registry.restrain_equation(equation, lb, ub, sig, scaled))
    }

    pub fn unrestrain(&mut self, restraint: &Rc<Restraint>) -> Result<()> {
        self.registry.unrestrain(restraint)
    }

    /// Snapshot of the contribution for reporting.
    pub fn summary(&self) -> ContributionSummary {
        let parameters = self
            .registry
            .parameters()
            .map(|entry| {
                let target = entry.target().ok();
                ParameterSummary {
                    name: entry.name().to_string(),
                    value: target.as_ref().and_then(|p| p.logical_value().ok()),
                    constrained: target.as_ref().map_or(false, Parameter::is_constrained),
                    proxy: entry.is_proxy(),
                }
            })
            .collect();
        ContributionSummary {
            name: self.name().to_string(),
            state: self.state(),
            profile: self.binding.as_ref().map(|b| ProfileSummary {
                xname: b.xname.clone(),
                yname: b.yname.clone(),
                dyname: b.dyname.clone(),
                points: b.profile.borrow().len(),
            }),
            equation: self.equation_source().map(str::to_string),
            residual: self.residual_source().map(str::to_string),
            generators: self.generator_names(),
            parameters,
        }
    }

    /// [`FitContribution::summary`] as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }

    fn current_residual_form(&self) -> ResidualForm {
        self.residual_form
            .clone()
            .unwrap_or_else(|| self.config.default_residual.clone())
    }

    /// Registry names plus generators and `namespace`.
    fn symbol_table(&self, namespace: &[ParameterRef]) -> SymbolTable {
        let mut table = self.registry.symbol_table();
        table.set_new_parameter_value(self.config.new_parameter_value);
        for (name, gen) in &self.generators {
            table.insert(name, Symbol::Generator(gen.clone()));
        }
        for entry in namespace {
            table.insert(entry.name(), Symbol::Parameter(entry.clone()));
        }
        table
    }

    /// Compile the residual for `equation`, using `form` or the current form.
    fn compile_residual(
        &self,
        table: &mut SymbolTable,
        equation: &Rc<Equation>,
        binding: &ProfileBinding,
        form: Option<&ResidualForm>,
    ) -> Result<Rc<Equation>> {
        let form = form.cloned().unwrap_or_else(|| self.current_residual_form());
        let source = form.source(&binding.yname, &binding.dyname);
        table.insert(EQUATION_NAME, Symbol::Equation(equation.clone()));
        Ok(compile("residual", &source, table, false)?.equation)
    }

    fn install_equation(&mut self, equation: Rc<Equation>) -> Result<()> {
        self.registry.unregister_equation(EQUATION_NAME);
        self.registry.register_equation(EQUATION_NAME, equation)
    }

    fn observed_and_calculated(&self) -> Result<(Array1<f64>, Array1<f64>, Array1<f64>)> {
        let binding = self.binding.as_ref().ok_or(FitError::ProfileNotSet)?;
        let main = self.equation.as_ref().ok_or(FitError::EquationNotSet)?;
        let points = observed_points(&binding.profile)?;
        let ycalc = main.equation.evaluate()?.into_array(points)?;
        let profile = binding.profile.borrow();
        Ok((profile.y(), profile.dy(), ycalc))
    }
}

/// Number of observed points, checking that `y` and `dy` agree.
fn observed_points(profile: &SharedProfile) -> Result<usize> {
    let profile = profile.borrow();
    let (y, dy) = (profile.y(), profile.dy());
    if y.len() != dy.len() {
        return Err(FitError::ShapeMismatch {
            expected: y.len(),
            found: dy.len(),
        });
    }
    Ok(y.len())
}
