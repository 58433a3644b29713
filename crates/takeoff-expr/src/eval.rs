use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{Expr, UnaryOp};
use crate::error::ExprError;
use crate::functions::is_reserved;
use crate::parser::{parse, ParseLimits};

/// Variable bindings for one evaluation.
pub type Variables = BTreeMap<String, f64>;

/// A formula that has been tokenized and parsed once and can be evaluated
/// any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Compile with the default limits.
    pub fn compile(source: &str) -> Result<Self, ExprError> {
        Self::compile_with(source, &ParseLimits::default())
    }

    pub fn compile_with(source: &str, limits: &ParseLimits) -> Result<Self, ExprError> {
        let root = parse(source, limits)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The formula text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.root
    }

    /// Names of the variables the formula references. Constants and
    /// function names are not included.
    pub fn identifiers(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.root.for_each_variable(&mut |name| {
            names.insert(name);
        });
        names
    }

    /// Resolve every variable reference without evaluating anything.
    ///
    /// Fails on the first reference, in source order, for which `is_bound`
    /// returns `false`.
    pub fn check(&self, is_bound: impl Fn(&str) -> bool) -> Result<(), ExprError> {
        let mut unbound = None;
        self.root.for_each_variable(&mut |name| {
            if unbound.is_none() && !is_bound(name) {
                unbound = Some(name);
            }
        });
        match unbound {
            Some(name) => Err(ExprError::UnknownIdentifier {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Evaluate against `variables`.
    ///
    /// Names are resolved before any arithmetic happens. The result must be
    /// finite and non-negative.
    pub fn evaluate(&self, variables: &Variables) -> Result<f64, ExprError> {
        if let Some(name) = variables.keys().find(|name| is_reserved(name)) {
            return Err(ExprError::ReservedName { name: name.clone() });
        }
        self.check(|name| variables.contains_key(name))?;

        let value = walk(&self.root, variables);
        if !value.is_finite() {
            return Err(self.calculation_error(variables, format!("result is not finite ({value})")));
        }
        if value < 0.0 {
            return Err(self.calculation_error(variables, format!("result is negative ({value})")));
        }
        Ok(value)
    }

    fn calculation_error(&self, variables: &Variables, reason: String) -> ExprError {
        let referenced = self.identifiers();
        ExprError::Calculation {
            formula: self.source.clone(),
            variables: variables
                .iter()
                .filter(|(name, _)| referenced.contains(name.as_str()))
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
            reason,
        }
    }
}

/// Compile and evaluate in one step.
pub fn evaluate(source: &str, variables: &Variables) -> Result<f64, ExprError> {
    Expression::compile(source)?.evaluate(variables)
}

// Every variable was resolved by `check`; an unbound name here would be a bug,
// and evaluates to NaN so it is caught by the finiteness check.
fn walk(expr: &Expr, variables: &Variables) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Constant(c) => c.value(),
        Expr::Variable(name) => variables.get(name).copied().unwrap_or(f64::NAN),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => -walk(operand, variables),
        Expr::Binary { op, left, right } => op.apply(walk(left, variables), walk(right, variables)),
        Expr::Call { function, args } => {
            let values: Vec<f64> = args.iter().map(|arg| walk(arg, variables)).collect();
            function.apply(&values)
        }
    }
}
