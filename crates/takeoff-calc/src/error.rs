use std::fmt;

use serde::{Deserialize, Serialize};
use takeoff_expr::ExprError;
use takeoff_types::FormulaId;
use takeoff_units::Unit;

/// A single problem with a supplied input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum InputIssue {
    Missing {
        name: String,
    },
    IncompatibleUnit {
        name: String,
        expected: Unit,
        supplied: Unit,
    },
    NotFinite {
        name: String,
    },
    OutOfRange {
        name: String,
        value: f64,
        constraint: String,
    },
}

impl InputIssue {
    pub fn name(&self) -> &str {
        match self {
            Self::Missing { name }
            | Self::IncompatibleUnit { name, .. }
            | Self::NotFinite { name }
            | Self::OutOfRange { name, .. } => name,
        }
    }
}

impl fmt::Display for InputIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => write!(f, "missing input '{name}'"),
            Self::IncompatibleUnit {
                name,
                expected,
                supplied,
            } => write!(
                f,
                "input '{name}' given in {supplied} ({}), expected {expected} ({})",
                supplied.class(),
                expected.class()
            ),
            Self::NotFinite { name } => write!(f, "input '{name}' is not a finite number"),
            Self::OutOfRange {
                name,
                value,
                constraint,
            } => write!(f, "input '{name}' = {value} violates {constraint}"),
        }
    }
}

/// Every problem found with the inputs for one formula.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid inputs for {formula_id}: {}", render(.issues))]
pub struct ValidationError {
    pub formula_id: FormulaId,
    pub issues: Vec<InputIssue>,
}

impl ValidationError {
    /// Names of all missing inputs.
    pub fn missing(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter(|i| matches!(i, InputIssue::Missing { .. }))
            .map(InputIssue::name)
            .collect()
    }
}

fn render(issues: &[InputIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced by the assembly calculator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    /// The supplied inputs are insufficient or unusable.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The formula text is malformed or reaches outside the allow-list.
    #[error("formula {formula_id} rejected: {source}")]
    Security {
        formula_id: FormulaId,
        #[source]
        source: ExprError,
    },

    /// The formula evaluated to an unusable number.
    #[error("formula {formula_id} failed: {source}")]
    Calculation {
        formula_id: FormulaId,
        #[source]
        source: ExprError,
    },

    /// The definition itself is inconsistent.
    #[error("invalid formula definition {formula_id}: {reason}")]
    Definition { formula_id: FormulaId, reason: String },
}

impl CalcError {
    pub fn formula_id(&self) -> &FormulaId {
        match self {
            Self::Validation(e) => &e.formula_id,
            Self::Security { formula_id, .. }
            | Self::Calculation { formula_id, .. }
            | Self::Definition { formula_id, .. } => formula_id,
        }
    }

    /// `true` when the formula, not the inputs, was at fault before evaluation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Security { .. } | Self::Definition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_issue() {
        let err = ValidationError {
            formula_id: FormulaId::new("wall-net-area"),
            issues: vec![
                InputIssue::Missing {
                    name: "height".into(),
                },
                InputIssue::OutOfRange {
                    name: "length".into(),
                    value: -2.0,
                    constraint: "length > 0".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid inputs for wall-net-area: missing input 'height'; input 'length' = -2 violates length > 0"
        );
        assert_eq!(err.missing(), vec!["height"]);
    }

    #[test]
    fn issues_serialize_with_tag() {
        let issue = InputIssue::IncompatibleUnit {
            name: "area".into(),
            expected: Unit::SquareMetre,
            supplied: Unit::Metre,
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["issue"], "incompatible_unit");
        assert_eq!(json["supplied"], "m");
    }
}
