//! Assembly calculator for the Takeoff quantity engine.
//!
//! A [`FormulaDefinition`] names an expression, the inputs it needs (each
//! with a unit and optional bounds) and the unit of its result. The
//! [`Calculator`] checks an [`InputSet`] against those declarations,
//! converts every value to the declared unit, evaluates the expression with
//! `takeoff-expr` and returns a [`CalculationResult`] with a step-by-step
//! breakdown.
//!
//! ```rust
//! use takeoff_calc::{Calculator, FormulaDefinition, InputSet, RequiredInput};
//! use takeoff_units::Unit;
//!
//! let formula = FormulaDefinition::new("slab-volume", "area * thickness", Unit::CubicMetre)
//!     .with_input(RequiredInput::new("area", Unit::SquareMetre))
//!     .with_input(RequiredInput::new("thickness", Unit::Metre));
//! let inputs = InputSet::new()
//!     .with("area", 40.0, Unit::SquareMetre)
//!     .with("thickness", 150.0, Unit::Millimetre);
//!
//! let result = Calculator::default().calculate(&formula, &inputs).unwrap();
//! assert_eq!(result.amount, 6.0);
//! assert_eq!(result.steps.len(), 3);
//! ```

pub mod calculator;
pub mod error;
pub mod formula;
pub mod input;
pub mod result;

pub use calculator::Calculator;
pub use error::{CalcError, InputIssue, ValidationError};
pub use formula::{FormulaDefinition, InputConstraint, RequiredInput};
pub use input::InputSet;
pub use result::{CalculationResult, CalculationStep};
