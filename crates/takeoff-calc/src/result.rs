use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use takeoff_types::FormulaId;
use takeoff_units::{Quantity, Unit};

/// One line of a calculation breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationStep {
    pub label: String,
    pub value: f64,
    pub unit: Unit,
}

/// The outcome of one successful calculation.
///
/// Contains no identifiers or timestamps, so evaluating the same formula
/// with the same inputs always yields an identical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub formula_id: FormulaId,
    pub formula_version: u32,
    pub amount: f64,
    pub unit: Unit,
    /// One step per declared input in declaration order, then the formula.
    pub steps: Vec<CalculationStep>,
    /// Inputs as actually used, normalized to the formula's units.
    pub inputs: BTreeMap<String, Quantity>,
}

impl CalculationResult {
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.amount, self.unit)
    }

    /// The step recording the formula and the final amount.
    pub fn final_step(&self) -> Option<&CalculationStep> {
        self.steps.last()
    }
}
