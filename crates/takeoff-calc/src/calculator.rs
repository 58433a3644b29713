use std::collections::BTreeMap;

use takeoff_expr::{round_to, ExprError, ParseLimits, Variables};
use takeoff_units::Quantity;
use tracing::debug;

use crate::error::{CalcError, InputIssue, ValidationError};
use crate::formula::FormulaDefinition;
use crate::input::InputSet;
use crate::result::{CalculationResult, CalculationStep};

/// Evaluates formula definitions against input sets.
///
/// Stateless apart from its settings; one instance can serve any number of
/// threads.
#[derive(Debug, Clone)]
pub struct Calculator {
    decimal_places: u32,
    limits: ParseLimits,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(4, ParseLimits::default())
    }
}

impl Calculator {
    pub fn new(decimal_places: u32, limits: ParseLimits) -> Self {
        Self {
            decimal_places,
            limits,
        }
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    pub fn limits(&self) -> &ParseLimits {
        &self.limits
    }

    /// Run one formula.
    ///
    /// The formula is compiled and checked first, then every declared input
    /// is validated and normalized; all input problems are reported together.
    /// Inputs the formula does not declare are ignored.
    pub fn calculate(
        &self,
        formula: &FormulaDefinition,
        inputs: &InputSet,
    ) -> Result<CalculationResult, CalcError> {
        let expression = formula.compile(&self.limits)?;
        let normalized = self.normalize(formula, inputs)?;

        let variables: Variables = normalized
            .iter()
            .map(|(name, q)| (name.clone(), q.value))
            .collect();
        let raw = expression.evaluate(&variables).map_err(|source| match source {
            ExprError::Calculation { .. } => CalcError::Calculation {
                formula_id: formula.id.clone(),
                source,
            },
            _ => CalcError::Security {
                formula_id: formula.id.clone(),
                source,
            },
        })?;

        let mut amount = round_to(raw, self.decimal_places as i32);
        if amount == 0.0 {
            amount = 0.0;
        }

        let mut steps: Vec<CalculationStep> = formula
            .inputs
            .iter()
            .filter_map(|input| {
                normalized.get(&input.name).map(|q| CalculationStep {
                    label: input.name.clone(),
                    value: q.value,
                    unit: q.unit,
                })
            })
            .collect();
        steps.push(CalculationStep {
            label: formula.expression.clone(),
            value: amount,
            unit: formula.output_unit,
        });

        debug!(formula = %formula.id, amount, unit = %formula.output_unit, "formula evaluated");

        Ok(CalculationResult {
            formula_id: formula.id.clone(),
            formula_version: formula.version,
            amount,
            unit: formula.output_unit,
            steps,
            inputs: normalized,
        })
    }

    fn normalize(
        &self,
        formula: &FormulaDefinition,
        inputs: &InputSet,
    ) -> Result<BTreeMap<String, Quantity>, ValidationError> {
        let mut issues = Vec::new();
        let mut normalized = BTreeMap::new();

        for required in &formula.inputs {
            let name = &required.name;
            let Some(supplied) = inputs.get(name) else {
                issues.push(InputIssue::Missing { name: name.clone() });
                continue;
            };
            if !supplied.value.is_finite() {
                issues.push(InputIssue::NotFinite { name: name.clone() });
                continue;
            }
            let Ok(quantity) = supplied.to_unit(required.unit) else {
                issues.push(InputIssue::IncompatibleUnit {
                    name: name.clone(),
                    expected: required.unit,
                    supplied: supplied.unit,
                });
                continue;
            };
            if !required.constraint.allows(quantity.value) {
                issues.push(InputIssue::OutOfRange {
                    name: name.clone(),
                    value: quantity.value,
                    constraint: required.constraint.describe(name),
                });
                continue;
            }
            normalized.insert(name.clone(), quantity);
        }

        if issues.is_empty() {
            Ok(normalized)
        } else {
            debug!(formula = %formula.id, issues = issues.len(), "input validation failed");
            Err(ValidationError {
                formula_id: formula.id.clone(),
                issues,
            })
        }
    }
}
