//! Expression parsing
//!
//! This module turns an equation string into an immutable [`Expression`] tree.
//! It knows nothing about parameters or evaluation; resolving identifiers is
//! the job of the compiler.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/") unary)*
//! unary   := ("-" | "+") unary | power
//! power   := primary (("**" | "^") unary)?
//! primary := identifier "(" args? ")" | identifier | number | "(" expr ")"
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, multispace0},
    combinator::recognize,
    multi::many0,
    number::complete::double,
    sequence::pair,
    IResult, Parser,
};

use crate::error::{FitError, Result};

type ParseResult<'a, T> = IResult<&'a str, T>;

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant number
    Number(f64),

    /// Variable reference
    Variable(String),

    /// Unary operations
    Unary(UnaryOp, Box<Expression>),

    /// Binary operations
    Binary(BinaryOp, Box<Expression>, Box<Expression>),

    /// Function call
    Function(String, Vec<Expression>),
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Negation (-)
    Neg,
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Addition (+)
    Add,

    /// Subtraction (-)
    Sub,

    /// Multiplication (*)
    Mul,

    /// Division (/)
    Div,

    /// Power (** or ^)
    Pow,
}

impl BinaryOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Pow => lhs.powf(rhs),
        }
    }
}

impl Expression {
    /// Parse an expression from a string
    ///
    /// A malformed string fails with [`FitError::Parse`] naming the token
    /// where parsing stopped.
    pub fn parse(input: &str) -> Result<Self> {
        match expr_parser(input) {
            Ok((remainder, expr)) => {
                let remainder = remainder.trim_start();
                if remainder.is_empty() {
                    Ok(expr)
                } else {
                    Err(FitError::Parse {
                        token: first_token(remainder),
                        message: "unexpected trailing input".to_string(),
                    })
                }
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(FitError::Parse {
                token: first_token(e.input.trim_start()),
                message: format!("expected an operand ({:?})", e.code),
            }),
            Err(nom::Err::Incomplete(_)) => Err(FitError::Parse {
                token: first_token(""),
                message: "incomplete expression".to_string(),
            }),
        }
    }

    /// Find all variable names used in the expression
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.visit(&mut |e| {
            if let Expression::Variable(name) = e {
                vars.push(name.clone());
            }
        });
        vars.sort();
        vars.dedup();
        vars
    }

    /// Find all function names called in the expression
    pub fn functions(&self) -> Vec<String> {
        let mut funcs = Vec::new();
        self.visit(&mut |e| {
            if let Expression::Function(name, _) = e {
                funcs.push(name.clone());
            }
        });
        funcs.sort();
        funcs.dedup();
        funcs
    }

    /// Pre-order walk over every node
    pub fn visit(&self, f: &mut dyn FnMut(&Expression)) {
        f(self);
        match self {
            Self::Number(_) | Self::Variable(_) => {}
            Self::Unary(_, expr) => expr.visit(f),
            Self::Binary(_, left, right) => {
                left.visit(f);
                right.visit(f);
            }
            Self::Function(_, args) => {
                for arg in args {
                    arg.visit(f);
                }
            }
        }
    }
}

fn first_token(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        None => "end of input".to_string(),
        Some(c) if c.is_alphanumeric() || c == '_' || c == '.' => input
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
            .collect(),
        Some(c) => c.to_string(),
    }
}

// Parser functions using nom

fn space(input: &str) -> ParseResult<'_, &str> {
    multispace0(input)
}

/// Match `token` after optional whitespace
fn punct<'a>(input: &'a str, token: &'static str) -> ParseResult<'a, &'a str> {
    let (input, _) = space(input)?;
    tag(token).parse(input)
}

/// Parse an identifier (variable or function name)
fn identifier(input: &str) -> ParseResult<'_, String> {
    let mut parser = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ));

    let (input, matched) = parser.parse(input)?;
    Ok((input, matched.to_string()))
}

/// Parse a number
fn number(input: &str) -> ParseResult<'_, Expression> {
    let parsed: ParseResult<'_, f64> = double(input);
    let (input, num) = parsed?;
    Ok((input, Expression::Number(num)))
}

/// Parse the arguments of a call, after the opening parenthesis
fn call_args(input: &str, name: String) -> ParseResult<'_, Expression> {
    if let Ok((input, _)) = punct(input, ")") {
        return Ok((input, Expression::Function(name, vec![])));
    }

    let (mut input, first) = expr_parser(input)?;
    let mut args = vec![first];
    while let Ok((after_comma, _)) = punct(input, ",") {
        let (after_arg, arg) = expr_parser(after_comma)?;
        args.push(arg);
        input = after_arg;
    }
    let (input, _) = punct(input, ")")?;

    Ok((input, Expression::Function(name, args)))
}

/// Parse a parenthesized expression
fn parens(input: &str) -> ParseResult<'_, Expression> {
    let (input, _) = punct(input, "(")?;
    let (input, expr) = expr_parser(input)?;
    let (input, _) = punct(input, ")")?;
    Ok((input, expr))
}

/// Parse a primary expression (function call, variable, number, or parenthesized expression)
fn primary(input: &str) -> ParseResult<'_, Expression> {
    let (input, _) = space(input)?;

    if let Ok((rest, name)) = identifier(input) {
        // An identifier followed by "(" commits to a call so that errors
        // inside the argument list are reported where they occur.
        if let Ok((after_paren, _)) = punct(rest, "(") {
            return call_args(after_paren, name);
        }
        return Ok((rest, Expression::Variable(name)));
    }

    if let Ok(result) = number(input) {
        return Ok(result);
    }

    parens(input)
}

/// Parse a power expression (right associative)
fn power(input: &str) -> ParseResult<'_, Expression> {
    let (input, base) = primary(input)?;

    match punct(input, "**").or_else(|_| punct(input, "^")) {
        Ok((after_op, _)) => {
            let (rest, exponent) = unary(after_op)?;
            Ok((
                rest,
                Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

/// Parse a unary expression (-expr, +expr)
fn unary(input: &str) -> ParseResult<'_, Expression> {
    if let Ok((rest, _)) = punct(input, "-") {
        let (rest, expr) = unary(rest)?;
        return Ok((rest, Expression::Unary(UnaryOp::Neg, Box::new(expr))));
    }
    if let Ok((rest, _)) = punct(input, "+") {
        return unary(rest);
    }
    power(input)
}

/// Try each operator token in turn
fn operator<'a>(input: &'a str, ops: &[(&'static str, BinaryOp)]) -> Option<(&'a str, BinaryOp)> {
    ops.iter()
        .find_map(|&(token, op)| punct(input, token).ok().map(|(rest, _)| (rest, op)))
}

/// Parse a multiplicative expression (left associative)
fn term(input: &str) -> ParseResult<'_, Expression> {
    let (mut input, mut left) = unary(input)?;

    while let Some((after_op, op)) = operator(input, &[("*", BinaryOp::Mul), ("/", BinaryOp::Div)]) {
        let (rest, right) = unary(after_op)?;
        left = Expression::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }

    Ok((input, left))
}

/// Parse an additive expression (left associative)
fn expr_parser(input: &str) -> ParseResult<'_, Expression> {
    let (mut input, mut left) = term(input)?;

    while let Some((after_op, op)) = operator(input, &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)]) {
        let (rest, right) = term(after_op)?;
        left = Expression::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }

    Ok((input, left))
}
