use std::fmt;

use serde::{Deserialize, Serialize};

/// An exact, reduced rational conversion factor.
///
/// Factors between supported units are products of small decimal ratios
/// (e.g. `1 ft = 3048/10000 m`), so numerator and denominator stay well
/// inside `u128` and, once reduced, inside the range `f64` represents
/// exactly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Factor {
    num: u128,
    den: u128,
}

impl Factor {
    /// The identity factor.
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// Create a reduced factor `num / den`. Both parts must be non-zero.
    pub const fn new(num: u128, den: u128) -> Self {
        let g = gcd(num, den);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    pub fn numerator(&self) -> u128 {
        self.num
    }

    pub fn denominator(&self) -> u128 {
        self.den
    }

    pub fn is_one(&self) -> bool {
        self.num == self.den
    }

    /// The reciprocal factor (for converting back).
    pub fn inverse(&self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /// Compose two factors exactly: applying `self` then `next`.
    ///
    /// Cross-reduces before multiplying so the result is already in lowest
    /// terms and never larger than the direct factor between the endpoints.
    pub fn then(&self, next: &Self) -> Self {
        let g1 = gcd(self.num, next.den);
        let g2 = gcd(next.num, self.den);
        Self {
            num: (self.num / g1) * (next.num / g2),
            den: (self.den / g2) * (next.den / g1),
        }
    }

    /// Apply the factor to an amount.
    ///
    /// Whole-number factors (`12`) and unit fractions (`1/100`) take one
    /// correctly rounded operation. Other factors multiply by the numerator
    /// and then divide by the denominator, so at most two roundings. Amounts
    /// large enough to overflow that product use the rounded ratio instead.
    pub fn apply(&self, amount: f64) -> f64 {
        if self.is_one() {
            return amount;
        }
        let (num, den) = (self.num as f64, self.den as f64);
        if self.den == 1 {
            return amount * num;
        }
        if self.num == 1 {
            return amount / den;
        }
        let scaled = amount * num;
        if scaled.is_finite() {
            scaled / den
        } else {
            amount * (num / den)
        }
    }

    /// Floating-point approximation of the factor.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Debug for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factor({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

const fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    if a == 0 {
        1
    } else {
        a
    }
}
