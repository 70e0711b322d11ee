//! Aliases for parameters owned elsewhere.
//!
//! A [`ParameterProxy`] exposes another owner's parameter under a local name
//! without copying or owning it. Reads and writes go straight to the target,
//! and the proxy's freshness is the target's tracker.

use std::fmt;
use std::rc::Weak;

use crate::error::{FitError, Result};
use crate::parameters::parameter::{Parameter, ParameterCell};
use crate::tracker::TrackerId;
use crate::value::Value;

/// Non-owning alias of a [`Parameter`] under another name
#[derive(Clone)]
pub struct ParameterProxy {
    name: String,
    target: Weak<ParameterCell>,
}

impl fmt::Debug for ParameterProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterProxy")
            .field("name", &self.name)
            .field("target", &self.target().ok().map(|t| t.name().to_string()))
            .finish()
    }
}

impl ParameterProxy {
    /// Create a proxy called `name` for `target`.
    pub fn new(name: &str, target: &Parameter) -> Self {
        Self {
            name: name.to_string(),
            target: target.downgrade(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The aliased parameter, or `NotFound` once its owner has dropped it.
    pub fn target(&self) -> Result<Parameter> {
        self.target
            .upgrade()
            .map(Parameter::from_cell)
            .ok_or_else(|| {
                FitError::NotFound(format!("target of proxy '{}' no longer exists", self.name))
            })
    }

    pub fn value(&self) -> Result<Value> {
        Ok(self.target()?.value())
    }

    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        self.target()?.set_value(value);
        Ok(())
    }

    /// Whether this proxy aliases `param`.
    pub fn aliases(&self, param: &Parameter) -> bool {
        self.target().map_or(false, |t| t.ptr_eq(param))
    }
}

/// A parameter as registered in a registry: owned directly or through a proxy.
#[derive(Debug, Clone)]
pub enum ParameterRef {
    /// The registry refers to the parameter itself
    Direct(Parameter),

    /// The registry exposes someone else's parameter under a local name
    Proxy(ParameterProxy),
}

impl From<Parameter> for ParameterRef {
    fn from(p: Parameter) -> Self {
        ParameterRef::Direct(p)
    }
}

impl From<&Parameter> for ParameterRef {
    fn from(p: &Parameter) -> Self {
        ParameterRef::Direct(p.clone())
    }
}

impl From<ParameterProxy> for ParameterRef {
    fn from(p: ParameterProxy) -> Self {
        ParameterRef::Proxy(p)
    }
}

impl ParameterRef {
    /// Name under which the parameter is registered.
    pub fn name(&self) -> &str {
        match self {
            ParameterRef::Direct(p) => p.name(),
            ParameterRef::Proxy(p) => p.name(),
        }
    }

    /// The underlying parameter, resolving proxies.
    pub fn target(&self) -> Result<Parameter> {
        match self {
            ParameterRef::Direct(p) => Ok(p.clone()),
            ParameterRef::Proxy(p) => p.target(),
        }
    }

    pub fn value(&self) -> Result<Value> {
        Ok(self.target()?.value())
    }

    /// Constraint-aware value.
    pub fn logical_value(&self) -> Result<Value> {
        self.target()?.logical_value()
    }

    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        self.target()?.set_value(value);
        Ok(())
    }

    pub fn tracker_id(&self) -> Result<TrackerId> {
        Ok(self.target()?.tracker_id())
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, ParameterRef::Proxy(_))
    }

    /// Whether this entry resolves to `param`.
    pub fn refers_to(&self, param: &Parameter) -> bool {
        self.target().map_or(false, |t| t.ptr_eq(param))
    }
}
