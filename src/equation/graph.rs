//! Memoized evaluation of compiled equations.
//!
//! An [`Equation`] is an arena of nodes in post-order: every node's operands
//! have smaller indices than the node itself, so the graph cannot contain a
//! cycle. Each interior node caches its last value together with the stamp
//! it was computed at and recomputes only when an operand reports a newer
//! stamp.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::calculator::SharedCalculator;
use crate::equation::expression::BinaryOp;
use crate::equation::functions::Builtin;
use crate::error::Result;
use crate::generator::{self, SharedGenerator};
use crate::parameters::Parameter;
use crate::value::Value;

/// Index of a node inside its equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub(crate) usize);

pub(crate) enum NodeKind {
    Literal(Value),
    Parameter(Parameter),
    Equation(Rc<Equation>),
    Generator(SharedGenerator),
    Calculator(SharedCalculator),
    Negate,
    Binary(BinaryOp),
    Builtin(Builtin),
}

struct Cached {
    value: Value,
    stamp: u64,
}

pub(crate) struct Node {
    kind: NodeKind,
    operands: Vec<NodeId>,
    cache: RefCell<Option<Cached>>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, operands: Vec<NodeId>) -> Self {
        Self {
            kind,
            operands,
            cache: RefCell::new(None),
        }
    }
}

/// A compiled equation
///
/// Equations are immutable once built and are shared through `Rc`: the main
/// equation of a contribution is also a leaf (`eq`) of its residual equation.
pub struct Equation {
    name: String,
    source: String,
    nodes: Vec<Node>,
    root: NodeId,
    recomputations: Cell<usize>,
}

impl fmt::Debug for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equation")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Equation {
    pub(crate) fn new(name: &str, source: &str, nodes: Vec<Node>, root: NodeId) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            nodes,
            root,
            recomputations: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The string this equation was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of operator invocations since the equation was built.
    pub fn recomputations(&self) -> usize {
        self.recomputations.get()
    }

    /// Evaluate the equation, reusing cached node values that are still fresh.
    pub fn evaluate(&self) -> Result<Value> {
        self.evaluate_stamped().map(|(value, _)| value)
    }

    /// Value and the newest stamp it depends on.
    pub(crate) fn evaluate_stamped(&self) -> Result<(Value, u64)> {
        self.eval_node(self.root)
    }

    /// Parameters appearing as leaves, in order of first appearance.
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut params: Vec<Parameter> = Vec::new();
        for node in &self.nodes {
            if let NodeKind::Parameter(p) = &node.kind {
                if !params.iter().any(|q| q.ptr_eq(p)) {
                    params.push(p.clone());
                }
            }
        }
        params
    }

    /// Whether evaluating this equation reads `param`, directly or through
    /// sub-equations, constraints, generators and calculators.
    pub fn depends_on(&self, param: &Parameter) -> bool {
        self.nodes.iter().any(|node| match &node.kind {
            NodeKind::Parameter(p) => {
                p.ptr_eq(param) || p.constraint().map_or(false, |c| c.depends_on(param))
            }
            NodeKind::Equation(eq) => eq.depends_on(param),
            NodeKind::Generator(gen) => gen
                .try_borrow()
                .map_or(false, |g| g.registry().depends_on(param)),
            NodeKind::Calculator(calc) => calc
                .try_borrow()
                .map_or(false, |c| c.registry().depends_on(param)),
            _ => false,
        })
    }

    fn eval_node(&self, id: NodeId) -> Result<(Value, u64)> {
        let node = &self.nodes[id.0];

        // Leaves report their own stamps; there is nothing to cache.
        match &node.kind {
            NodeKind::Literal(value) => return Ok((value.clone(), 0)),
            NodeKind::Parameter(param) => return param.logical_stamped(),
            NodeKind::Equation(eq) => return eq.evaluate_stamped(),
            _ => {}
        }

        let mut args = Vec::with_capacity(node.operands.len());
        let mut stamp = 0;
        for &operand in &node.operands {
            let (value, operand_stamp) = self.eval_node(operand)?;
            stamp = stamp.max(operand_stamp);
            args.push(value);
        }
        stamp = match &node.kind {
            NodeKind::Generator(gen) => stamp.max(generator::stamp(&*gen.borrow())?),
            NodeKind::Calculator(calc) => stamp.max(calc.borrow().registry().logical_stamp()?),
            _ => stamp,
        };

        if let Some(cached) = node.cache.borrow().as_ref() {
            if cached.stamp >= stamp {
                return Ok((cached.value.clone(), cached.stamp));
            }
        }

        let value = match &node.kind {
            NodeKind::Negate => args[0].map(|v| -v),
            NodeKind::Binary(op) => {
                let op = *op;
                args[0].zip_with(&args[1], |a, b| op.apply(a, b))?
            }
            NodeKind::Builtin(builtin) => builtin.apply(&args)?,
            NodeKind::Generator(gen) => generator::signal(&*gen.borrow())?,
            NodeKind::Calculator(calc) => calc.borrow().calculate(&args)?,
            NodeKind::Literal(_) | NodeKind::Parameter(_) | NodeKind::Equation(_) => {
                unreachable!("leaf nodes return before caching")
            }
        };
        self.recomputations.set(self.recomputations.get() + 1);
        trace!(equation = %self.name, node = id.0, stamp, "recompute");

        *node.cache.borrow_mut() = Some(Cached {
            value: value.clone(),
            stamp,
        });
        Ok((value, stamp))
    }
}
