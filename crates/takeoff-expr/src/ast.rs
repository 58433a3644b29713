use std::fmt;

use crate::functions::{Constant, Function};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Pow => "**",
        }
    }

    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => left / right,
            Self::Rem => left % right,
            Self::Pow => left.powf(right),
        }
    }
}

/// Expression tree. Function calls and constants are resolved while
/// parsing; only variables remain to be bound at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Constant(Constant),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Visit every variable reference in source order.
    pub fn for_each_variable<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Self::Number(_) | Self::Constant(_) => {}
            Self::Variable(name) => visit(name),
            Self::Unary { operand, .. } => operand.for_each_variable(visit),
            Self::Binary { left, right, .. } => {
                left.for_each_variable(visit);
                right.for_each_variable(visit);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.for_each_variable(visit);
                }
            }
        }
    }
}

/// Fully parenthesized rendering, used in diagnostics.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Constant(c) => f.write_str(c.name()),
            Self::Variable(name) => f.write_str(name),
            Self::Unary { operand, .. } => write!(f, "(-{operand})"),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Call { function, args } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
