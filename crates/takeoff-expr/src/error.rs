use std::collections::BTreeMap;

/// Errors produced while compiling or evaluating an expression.
///
/// Everything except [`ExprError::Calculation`] means the formula text
/// itself is malformed or reaches outside the allow-list.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    /// A character outside the accepted lexical set.
    #[error("unexpected character '{found}' at position {position}")]
    Lex { position: usize, found: char },

    /// Structurally invalid expression, or a resource limit was exceeded.
    #[error("parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// An identifier that is neither a bound variable, a constant nor an
    /// allow-listed function.
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String },

    /// A variable was supplied under the name of a function or constant.
    #[error("'{name}' is reserved and cannot be used as a variable name")]
    ReservedName { name: String },

    /// Evaluation finished but produced an unusable number.
    #[error("calculation error in '{formula}': {reason}")]
    Calculation {
        formula: String,
        variables: BTreeMap<String, f64>,
        reason: String,
    },
}

impl ExprError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// `true` when the formula text was rejected rather than evaluated.
    pub fn is_security(&self) -> bool {
        !matches!(self, Self::Calculation { .. })
    }
}
