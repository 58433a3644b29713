//! Allow-list expression evaluator for the Takeoff quantity engine.
//!
//! Formulas are written in a small closed grammar: decimal numbers,
//! variables, `+ - * / ** %`, parentheses and calls to a fixed set of pure
//! functions (`sqrt`, `pow`, `abs`, `min`, `max`, `round`, `floor`, `ceil`,
//! `sin`, `cos`, `tan`) plus the constants `pi` and `e`. The text is
//! tokenized, parsed into a tree and walked numerically. Nothing outside
//! that grammar is reachable from formula text.
//!
//! Evaluation happens in three stages, each of which can reject:
//!
//! 1. **Lexing** rejects any character outside the accepted set.
//! 2. **Parsing** rejects malformed structure, calls to unknown functions,
//!    wrong argument counts and inputs beyond the configured limits.
//! 3. **Resolution** rejects references to unbound variables.
//!
//! Only then is the tree evaluated. A non-finite or negative result is a
//! [`ExprError::Calculation`] carrying the formula and the variable values
//! it referenced.
//!
//! ```rust
//! use takeoff_expr::{evaluate, ExprError, Variables};
//!
//! let mut vars = Variables::new();
//! vars.insert("length".into(), 5.0);
//! vars.insert("height".into(), 3.0);
//! assert_eq!(evaluate("length * height", &vars).unwrap(), 15.0);
//!
//! let err = evaluate("exec(1)", &vars).unwrap_err();
//! assert_eq!(err, ExprError::UnknownIdentifier { name: "exec".into() });
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod functions;
pub mod parser;
pub mod token;

pub use error::ExprError;
pub use eval::{evaluate, Expression, Variables};
pub use functions::{is_reserved, round_to, Constant, Function};
pub use parser::ParseLimits;
