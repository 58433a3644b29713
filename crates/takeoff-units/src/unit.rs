use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnitError;
use crate::factor::Factor;

/// Physical quantity class. Conversion is only defined within one class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    Length,
    Area,
    Volume,
    Count,
    Currency,
    /// Dimensionless factors such as waste or lap allowances.
    Ratio,
}

impl fmt::Display for UnitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Length => "length",
            Self::Area => "area",
            Self::Volume => "volume",
            Self::Count => "count",
            Self::Currency => "currency",
            Self::Ratio => "ratio",
        };
        f.write_str(name)
    }
}

/// A supported measurement unit, serialized as its symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "mm")]
    Millimetre,
    #[serde(rename = "cm")]
    Centimetre,
    #[serde(rename = "m")]
    Metre,
    #[serde(rename = "km")]
    Kilometre,
    #[serde(rename = "in")]
    Inch,
    #[serde(rename = "ft")]
    Foot,
    #[serde(rename = "yd")]
    Yard,

    #[serde(rename = "mm2")]
    SquareMillimetre,
    #[serde(rename = "cm2")]
    SquareCentimetre,
    #[serde(rename = "m2")]
    SquareMetre,
    #[serde(rename = "in2")]
    SquareInch,
    #[serde(rename = "ft2")]
    SquareFoot,
    #[serde(rename = "yd2")]
    SquareYard,

    #[serde(rename = "cm3")]
    CubicCentimetre,
    #[serde(rename = "l")]
    Litre,
    #[serde(rename = "m3")]
    CubicMetre,
    #[serde(rename = "in3")]
    CubicInch,
    #[serde(rename = "ft3")]
    CubicFoot,
    #[serde(rename = "yd3")]
    CubicYard,

    #[serde(rename = "ea")]
    Each,
    #[serde(rename = "pair")]
    Pair,
    #[serde(rename = "dozen")]
    Dozen,
    #[serde(rename = "hundred")]
    Hundred,

    #[serde(rename = "cur")]
    Currency,
    #[serde(rename = "cent")]
    CurrencyMinor,

    #[serde(rename = "ratio")]
    Ratio,
    #[serde(rename = "%")]
    Percent,
}

impl Unit {
    /// Every supported unit, grouped by class.
    pub const ALL: [Unit; 27] = [
        Unit::Millimetre,
        Unit::Centimetre,
        Unit::Metre,
        Unit::Kilometre,
        Unit::Inch,
        Unit::Foot,
        Unit::Yard,
        Unit::SquareMillimetre,
        Unit::SquareCentimetre,
        Unit::SquareMetre,
        Unit::SquareInch,
        Unit::SquareFoot,
        Unit::SquareYard,
        Unit::CubicCentimetre,
        Unit::Litre,
        Unit::CubicMetre,
        Unit::CubicInch,
        Unit::CubicFoot,
        Unit::CubicYard,
        Unit::Each,
        Unit::Pair,
        Unit::Dozen,
        Unit::Hundred,
        Unit::Currency,
        Unit::CurrencyMinor,
        Unit::Ratio,
        Unit::Percent,
    ];

    pub fn class(&self) -> UnitClass {
        match self {
            Self::Millimetre
            | Self::Centimetre
            | Self::Metre
            | Self::Kilometre
            | Self::Inch
            | Self::Foot
            | Self::Yard => UnitClass::Length,
            Self::SquareMillimetre
            | Self::SquareCentimetre
            | Self::SquareMetre
            | Self::SquareInch
            | Self::SquareFoot
            | Self::SquareYard => UnitClass::Area,
            Self::CubicCentimetre
            | Self::Litre
            | Self::CubicMetre
            | Self::CubicInch
            | Self::CubicFoot
            | Self::CubicYard => UnitClass::Volume,
            Self::Each | Self::Pair | Self::Dozen | Self::Hundred => UnitClass::Count,
            Self::Currency | Self::CurrencyMinor => UnitClass::Currency,
            Self::Ratio | Self::Percent => UnitClass::Ratio,
        }
    }

    /// Canonical symbol, identical to the serialized form.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Millimetre => "mm",
            Self::Centimetre => "cm",
            Self::Metre => "m",
            Self::Kilometre => "km",
            Self::Inch => "in",
            Self::Foot => "ft",
            Self::Yard => "yd",
            Self::SquareMillimetre => "mm2",
            Self::SquareCentimetre => "cm2",
            Self::SquareMetre => "m2",
            Self::SquareInch => "in2",
            Self::SquareFoot => "ft2",
            Self::SquareYard => "yd2",
            Self::CubicCentimetre => "cm3",
            Self::Litre => "l",
            Self::CubicMetre => "m3",
            Self::CubicInch => "in3",
            Self::CubicFoot => "ft3",
            Self::CubicYard => "yd3",
            Self::Each => "ea",
            Self::Pair => "pair",
            Self::Dozen => "dozen",
            Self::Hundred => "hundred",
            Self::Currency => "cur",
            Self::CurrencyMinor => "cent",
            Self::Ratio => "ratio",
            Self::Percent => "%",
        }
    }

    /// Exact size of one of this unit expressed in its class base unit
    /// (metre, square metre, cubic metre, each, currency major unit, ratio).
    pub fn to_base(&self) -> Factor {
        match self {
            Self::Millimetre => Factor::new(1, 1_000),
            Self::Centimetre => Factor::new(1, 100),
            Self::Metre => Factor::ONE,
            Self::Kilometre => Factor::new(1_000, 1),
            Self::Inch => Factor::new(254, 10_000),
            Self::Foot => Factor::new(3_048, 10_000),
            Self::Yard => Factor::new(9_144, 10_000),

            Self::SquareMillimetre => Factor::new(1, 1_000_000),
            Self::SquareCentimetre => Factor::new(1, 10_000),
            Self::SquareMetre => Factor::ONE,
            Self::SquareInch => Factor::new(64_516, 100_000_000),
            Self::SquareFoot => Factor::new(9_290_304, 100_000_000),
            Self::SquareYard => Factor::new(83_612_736, 100_000_000),

            Self::CubicCentimetre => Factor::new(1, 1_000_000),
            Self::Litre => Factor::new(1, 1_000),
            Self::CubicMetre => Factor::ONE,
            Self::CubicInch => Factor::new(16_387_064, 1_000_000_000_000),
            Self::CubicFoot => Factor::new(28_316_846_592, 1_000_000_000_000),
            Self::CubicYard => Factor::new(764_554_857_984, 1_000_000_000_000),

            Self::Each => Factor::ONE,
            Self::Pair => Factor::new(2, 1),
            Self::Dozen => Factor::new(12, 1),
            Self::Hundred => Factor::new(100, 1),

            Self::Currency => Factor::ONE,
            Self::CurrencyMinor => Factor::new(1, 100),

            Self::Ratio => Factor::ONE,
            Self::Percent => Factor::new(1, 100),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        let lower = wanted.to_lowercase();
        let normalized = match lower.as_str() {
            "m²" => "m2",
            "m³" => "m3",
            "ft²" | "sf" => "ft2",
            "ft³" | "cf" => "ft3",
            "pcs" | "each" => "ea",
            other => other,
        };
        Unit::ALL
            .iter()
            .copied()
            .find(|u| u.symbol().eq_ignore_ascii_case(normalized))
            .ok_or_else(|| UnitError::UnknownSymbol(wanted.to_string()))
    }
}
