use crate::unit::Unit;

/// Errors produced by unit parsing and conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    /// The two units measure different physical quantities.
    #[error("incompatible units: cannot convert {from} ({from_class}) to {to} ({to_class})")]
    Incompatible {
        from: Unit,
        to: Unit,
        from_class: String,
        to_class: String,
    },

    /// The unit symbol is not part of the supported set.
    #[error("unknown unit symbol: '{0}'")]
    UnknownSymbol(String),
}

impl UnitError {
    pub(crate) fn incompatible(from: Unit, to: Unit) -> Self {
        Self::Incompatible {
            from,
            to,
            from_class: from.class().to_string(),
            to_class: to.class().to_string(),
        }
    }
}
