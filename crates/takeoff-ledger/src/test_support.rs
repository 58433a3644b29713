use std::collections::BTreeMap;

use takeoff_types::{Digest, ElementId, FormulaId, ResultId};
use takeoff_units::{Quantity, Unit};

use crate::event::{LedgerEvent, RecordedResult};

pub(crate) fn recorded(element: &str, amount: f64) -> RecordedResult {
    RecordedResult {
        result_id: ResultId::new(),
        element: ElementId::new(element),
        formula_id: FormulaId::new("wall-net-area"),
        formula_version: 1,
        amount,
        unit: Unit::SquareMetre,
        inputs: BTreeMap::from([("length".to_string(), Quantity::new(5.0, Unit::Metre))]),
        result_digest: Digest::from_hash([1; 32]),
    }
}

pub(crate) fn created(element: &str, amount: f64) -> LedgerEvent {
    LedgerEvent::Created(recorded(element, amount))
}
