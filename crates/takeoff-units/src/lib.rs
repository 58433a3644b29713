//! Unit conversion for the Takeoff quantity engine.
//!
//! Units form a small closed set per physical quantity class. Conversions
//! only happen within a class; crossing classes is an
//! [`UnitError::Incompatible`] error. Every unit's size relative to its
//! class base is an exact rational, so chained conversions compose without
//! accumulating rounding error.
//!
//! Everything here is a pure function and safe to call from any thread.
//!
//! ```rust
//! use takeoff_units::{convert, Unit};
//!
//! let metres = convert(12.0, Unit::Foot, Unit::Metre).unwrap();
//! assert!((metres - 3.6576).abs() < 1e-12);
//! assert!(convert(1.0, Unit::Metre, Unit::SquareMetre).is_err());
//! ```

pub mod convert;
pub mod error;
pub mod factor;
pub mod quantity;
pub mod unit;

pub use convert::{conversion_factor, convert};
pub use error::UnitError;
pub use factor::Factor;
pub use quantity::Quantity;
pub use unit::{Unit, UnitClass};
