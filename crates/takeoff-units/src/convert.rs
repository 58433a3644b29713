use crate::error::UnitError;
use crate::factor::Factor;
use crate::unit::Unit;

/// Exact factor that turns an amount in `from` into an amount in `to`.
///
/// Identical units always yield [`Factor::ONE`].
pub fn conversion_factor(from: Unit, to: Unit) -> Result<Factor, UnitError> {
    if from == to {
        return Ok(Factor::ONE);
    }
    if from.class() != to.class() {
        return Err(UnitError::incompatible(from, to));
    }
    Ok(from.to_base().then(&to.to_base().inverse()))
}

/// Convert `amount` from one unit to another within the same class.
///
/// Converting a unit to itself returns `amount` untouched, bit for bit.
pub fn convert(amount: f64, from: Unit, to: Unit) -> Result<f64, UnitError> {
    if from == to {
        return Ok(amount);
    }
    Ok(conversion_factor(from, to)?.apply(amount))
}
