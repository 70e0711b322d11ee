//! Turning expressions into equation graphs.
//!
//! [`compile`] resolves every identifier of a parsed [`Expression`] against a
//! [`SymbolTable`] and lowers the tree into the node arena of an
//! [`Equation`]. Identifiers that appear more than once share a single leaf.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::calculator::SharedCalculator;
use crate::equation::expression::{Expression, UnaryOp};
use crate::equation::functions::Builtin;
use crate::equation::graph::{Equation, Node, NodeId, NodeKind};
use crate::error::{FitError, Result};
use crate::generator::SharedGenerator;
use crate::parameters::{Parameter, ParameterRef};
use crate::tracker::ChangeTracker;
use crate::value::Value;

/// Object an identifier can resolve to
#[derive(Clone)]
pub enum Symbol {
    /// A parameter, owned or proxied; used as a bare name
    Parameter(ParameterRef),

    /// A previously compiled equation; used as a bare name
    Equation(Rc<Equation>),

    /// A profile generator; used as a bare name
    Generator(SharedGenerator),

    /// A calculator; used as `name(args...)`
    Calculator(SharedCalculator),
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Parameter(p) => write!(f, "Parameter({})", p.name()),
            Symbol::Equation(eq) => write!(f, "Equation({})", eq.name()),
            Symbol::Generator(_) => f.write_str("Generator"),
            Symbol::Calculator(_) => f.write_str("Calculator"),
        }
    }
}

/// Name to object view used by the compiler
///
/// Parameters created while compiling with `allow_new_vars` are allocated on
/// the table's tracker with the table's default value.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: IndexMap<String, Symbol>,
    tracker: ChangeTracker,
    new_value: Value,
}

impl SymbolTable {
    pub fn new(tracker: &ChangeTracker) -> Self {
        Self {
            symbols: IndexMap::new(),
            tracker: tracker.clone(),
            new_value: Value::Scalar(1.0),
        }
    }

    /// Value given to parameters created during compilation.
    pub fn set_new_parameter_value(&mut self, value: impl Into<Value>) {
        self.new_value = value.into();
    }

    /// Bind `name`, replacing any previous binding.
    pub fn insert(&mut self, name: &str, symbol: Symbol) {
        self.symbols.insert(name.to_string(), symbol);
    }

    pub fn remove(&mut self, name: &str) -> Option<Symbol> {
        self.symbols.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }
}

/// Result of a successful compilation
#[derive(Debug, Clone)]
pub struct Compiled {
    /// The built equation
    pub equation: Rc<Equation>,

    /// Parameters created for unknown identifiers, in order of first use
    pub new_parameters: Vec<Parameter>,
}

/// Compile `source` into an equation called `name`.
///
/// Unknown identifiers become fresh parameters (also inserted into `table`)
/// when `allow_new_vars` is set; otherwise compilation fails with
/// `UnresolvedVariable` listing every unknown name. Unknown function names
/// always fail. On error the table is left unchanged.
pub fn compile(
    name: &str,
    source: &str,
    table: &mut SymbolTable,
    allow_new_vars: bool,
) -> Result<Compiled> {
    let expr = Expression::parse(source)?;

    let mut unknown_vars = Vec::new();
    let mut unknown_funcs = Vec::new();
    expr.visit(&mut |e| match e {
        Expression::Variable(var) if !table.contains(var) => {
            if !unknown_vars.contains(var) {
                unknown_vars.push(var.clone());
            }
        }
        Expression::Function(func, _)
            if !table.contains(func) && Builtin::from_name(func).is_none() =>
        {
            unknown_funcs.push(func.clone());
        }
        _ => {}
    });
    if !unknown_funcs.is_empty() || (!unknown_vars.is_empty() && !allow_new_vars) {
        let mut names = unknown_funcs;
        if !allow_new_vars {
            names.extend(unknown_vars);
        }
        return Err(FitError::unresolved(names));
    }

    let mut created: IndexMap<String, Parameter> = IndexMap::new();
    for var in &unknown_vars {
        let param = Parameter::new(&table.tracker, var, table.new_value.clone());
        created.insert(var.clone(), param);
    }

    let mut builder = Builder {
        table: &*table,
        created: &created,
        nodes: Vec::new(),
        leaves: HashMap::new(),
    };
    let root = builder.lower(&expr)?;
    let nodes = builder.nodes;

    for (var, param) in &created {
        table.insert(var, Symbol::Parameter(ParameterRef::Direct(param.clone())));
    }
    debug!(equation = name, source, nodes = nodes.len(), "compiled equation");

    Ok(Compiled {
        equation: Rc::new(Equation::new(name, source, nodes, root)),
        new_parameters: created.into_values().collect(),
    })
}

struct Builder<'a> {
    table: &'a SymbolTable,
    created: &'a IndexMap<String, Parameter>,
    nodes: Vec<Node>,
    leaves: HashMap<String, NodeId>,
}

impl Builder<'_> {
    fn push(&mut self, kind: NodeKind, operands: Vec<NodeId>) -> NodeId {
        self.nodes.push(Node::new(kind, operands));
        NodeId(self.nodes.len() - 1)
    }

    fn lower(&mut self, expr: &Expression) -> Result<NodeId> {
        match expr {
            Expression::Number(v) => Ok(self.push(NodeKind::Literal(Value::Scalar(*v)), vec![])),
            Expression::Variable(name) => self.leaf(name),
            Expression::Unary(UnaryOp::Neg, inner) => {
                let operand = self.lower(inner)?;
                Ok(self.push(NodeKind::Negate, vec![operand]))
            }
            Expression::Binary(op, lhs, rhs) => {
                let lhs = self.lower(lhs)?;
                let rhs = self.lower(rhs)?;
                Ok(self.push(NodeKind::Binary(*op), vec![lhs, rhs]))
            }
            Expression::Function(name, args) => {
                let kind = match self.table.get(name) {
                    Some(Symbol::Calculator(calc)) => NodeKind::Calculator(calc.clone()),
                    Some(_) => {
                        return Err(FitError::InvalidExpression(format!(
                            "'{}' is not callable",
                            name
                        )))
                    }
                    None => {
                        let builtin = Builtin::from_name(name)
                            .ok_or_else(|| FitError::unresolved(vec![name.clone()]))?;
                        builtin.check_arity(name, args.len())?;
                        NodeKind::Builtin(builtin)
                    }
                };
                let operands = args
                    .iter()
                    .map(|arg| self.lower(arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.push(kind, operands))
            }
        }
    }

    fn leaf(&mut self, name: &str) -> Result<NodeId> {
        if let Some(&id) = self.leaves.get(name) {
            return Ok(id);
        }
        let kind = match self.table.get(name) {
            Some(Symbol::Parameter(p)) => NodeKind::Parameter(p.target()?),
            Some(Symbol::Equation(eq)) => NodeKind::Equation(eq.clone()),
            Some(Symbol::Generator(gen)) => NodeKind::Generator(gen.clone()),
            Some(Symbol::Calculator(_)) => {
                return Err(FitError::InvalidExpression(format!(
                    "calculator '{}' must be called with arguments",
                    name
                )))
            }
            None => match self.created.get(name) {
                Some(p) => NodeKind::Parameter(p.clone()),
                None => return Err(FitError::unresolved(vec![name.to_string()])),
            },
        };
        let id = self.push(kind, vec![]);
        self.leaves.insert(name.to_string(), id);
        Ok(id)
    }
}
