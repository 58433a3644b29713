use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use takeoff_expr::{is_reserved, Expression, ParseLimits};
use takeoff_types::FormulaId;
use takeoff_units::Unit;

use crate::error::CalcError;

/// Numeric bounds a normalized input must satisfy.
///
/// All bounds are optional; an empty constraint accepts every finite value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConstraint {
    /// Exclusive lower bound (`value > gt`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    /// Inclusive lower bound (`value >= ge`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ge: Option<f64>,
    /// Exclusive upper bound (`value < lt`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    /// Inclusive upper bound (`value <= le`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub le: Option<f64>,
    /// The value must be a whole number.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub integer: bool,
}

impl InputConstraint {
    /// Strictly positive values, the common case for dimensions.
    pub fn positive() -> Self {
        Self {
            gt: Some(0.0),
            ..Self::default()
        }
    }

    pub fn non_negative() -> Self {
        Self {
            ge: Some(0.0),
            ..Self::default()
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    /// `true` if `value` satisfies every bound.
    pub fn allows(&self, value: f64) -> bool {
        self.gt.map_or(true, |b| value > b)
            && self.ge.map_or(true, |b| value >= b)
            && self.lt.map_or(true, |b| value < b)
            && self.le.map_or(true, |b| value <= b)
            && (!self.integer || value.fract() == 0.0)
    }

    /// Readable form for `name`, e.g. `length > 0`.
    pub fn describe(&self, name: &str) -> String {
        let mut parts = Vec::new();
        for (bound, op) in [(self.gt, ">"), (self.ge, ">="), (self.lt, "<"), (self.le, "<=")] {
            if let Some(bound) = bound {
                parts.push(format!("{name} {op} {bound}"));
            }
        }
        if self.integer {
            parts.push(format!("{name} is a whole number"));
        }
        if parts.is_empty() {
            return format!("{name} is any finite number");
        }
        parts.join(" and ")
    }
}

/// One input a formula declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredInput {
    pub name: String,
    /// Unit the value is normalized to before evaluation.
    pub unit: Unit,
    #[serde(default, skip_serializing_if = "InputConstraint::is_unconstrained")]
    pub constraint: InputConstraint,
}

impl RequiredInput {
    pub fn new(name: impl Into<String>, unit: Unit) -> Self {
        Self {
            name: name.into(),
            unit,
            constraint: InputConstraint::default(),
        }
    }

    pub fn with_constraint(mut self, constraint: InputConstraint) -> Self {
        self.constraint = constraint;
        self
    }
}

fn first_version() -> u32 {
    1
}

/// A named formula with its declared inputs and output unit.
///
/// Definitions are immutable once results reference them; a changed
/// formula is published under a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaDefinition {
    pub id: FormulaId,
    #[serde(default = "first_version")]
    pub version: u32,
    #[serde(default)]
    pub description: String,
    pub expression: String,
    #[serde(default)]
    pub inputs: Vec<RequiredInput>,
    pub output_unit: Unit,
}

impl FormulaDefinition {
    pub fn new(
        id: impl Into<FormulaId>,
        expression: impl Into<String>,
        output_unit: Unit,
    ) -> Self {
        Self {
            id: id.into(),
            version: 1,
            description: String::new(),
            expression: expression.into(),
            inputs: Vec::new(),
            output_unit,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_input(mut self, input: RequiredInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn input(&self, name: &str) -> Option<&RequiredInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Compile the expression and check it against the declared inputs.
    ///
    /// Input names must be unique and must not shadow a function or
    /// constant; every variable the expression references must be declared.
    pub fn compile(&self, limits: &ParseLimits) -> Result<Expression, CalcError> {
        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(
                    self.definition_error(format!("input '{}' declared twice", input.name))
                );
            }
            if is_reserved(&input.name) {
                return Err(CalcError::Security {
                    formula_id: self.id.clone(),
                    source: takeoff_expr::ExprError::ReservedName {
                        name: input.name.clone(),
                    },
                });
            }
            if !input.constraint.is_unconstrained() {
                self.check_bounds(input)?;
            }
        }

        let expression =
            Expression::compile_with(&self.expression, limits).map_err(|source| {
                CalcError::Security {
                    formula_id: self.id.clone(),
                    source,
                }
            })?;
        expression
            .check(|name| seen.contains(name))
            .map_err(|source| CalcError::Security {
                formula_id: self.id.clone(),
                source,
            })?;
        Ok(expression)
    }

    fn check_bounds(&self, input: &RequiredInput) -> Result<(), CalcError> {
        let c = &input.constraint;
        let bounds = [c.gt, c.ge, c.lt, c.le];
        if bounds.iter().flatten().any(|b| !b.is_finite()) {
            return Err(self.definition_error(format!(
                "constraint on '{}' has a non-finite bound",
                input.name
            )));
        }
        let lower = c.gt.into_iter().chain(c.ge).fold(f64::NEG_INFINITY, f64::max);
        let upper = c.lt.into_iter().chain(c.le).fold(f64::INFINITY, f64::min);
        if lower > upper {
            return Err(self.definition_error(format!(
                "constraint '{}' can never hold",
                c.describe(&input.name)
            )));
        }
        Ok(())
    }

    fn definition_error(&self, reason: String) -> CalcError {
        CalcError::Definition {
            formula_id: self.id.clone(),
            reason,
        }
    }
}
