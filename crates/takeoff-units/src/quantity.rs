use std::fmt;

use serde::{Deserialize, Serialize};

use crate::convert::convert;
use crate::error::UnitError;
use crate::unit::Unit;

/// A numeric value tagged with its unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Express this quantity in another unit of the same class.
    pub fn to_unit(&self, unit: Unit) -> Result<Self, UnitError> {
        Ok(Self {
            value: convert(self.value, self.unit, unit)?,
            unit,
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_unit_converts_value_and_tag() {
        let q = Quantity::new(250.0, Unit::Centimetre).to_unit(Unit::Metre).unwrap();
        assert_eq!(q, Quantity::new(2.5, Unit::Metre));
    }

    #[test]
    fn serializes_with_unit_symbol() {
        let json = serde_json::to_string(&Quantity::new(1.5, Unit::SquareMetre)).unwrap();
        assert_eq!(json, r#"{"value":1.5,"unit":"m2"}"#);
    }

    #[test]
    fn display() {
        assert_eq!(Quantity::new(13.5, Unit::SquareMetre).to_string(), "13.5 m2");
    }
}
