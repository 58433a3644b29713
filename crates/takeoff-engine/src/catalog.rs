use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use takeoff_calc::FormulaDefinition;
use takeoff_expr::ParseLimits;
use takeoff_types::FormulaId;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// On-disk shape of a catalog.
///
/// ```toml
/// [[formula]]
/// id = "wall-net-area"
/// expression = "length * height - opening_area"
/// output_unit = "m2"
/// inputs = [
///     { name = "length", unit = "m", constraint = { gt = 0 } },
///     { name = "height", unit = "m", constraint = { gt = 0 } },
///     { name = "opening_area", unit = "m2", constraint = { ge = 0 } },
/// ]
///
/// [classifications]
/// wall = ["wall-net-area"]
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    #[serde(default, rename = "formula")]
    formulas: Vec<FormulaDefinition>,
    #[serde(default)]
    classifications: BTreeMap<String, Vec<FormulaId>>,
}

/// Validated formula definitions and the element classifications they apply to.
///
/// Every formula has been compiled against the grammar and its declared
/// inputs before it is accepted, so a loaded catalog never holds a formula
/// the evaluator would reject for its text alone.
#[derive(Debug, Clone, Default)]
pub struct FormulaCatalog {
    formulas: Vec<FormulaDefinition>,
    classifications: BTreeMap<String, Vec<FormulaId>>,
}

impl FormulaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str, limits: &ParseLimits) -> EngineResult<Self> {
        let document: CatalogDocument =
            toml::from_str(text).map_err(|e| EngineError::Catalog(e.to_string()))?;

        let mut catalog = Self::new();
        for formula in document.formulas {
            catalog.insert(formula, limits)?;
        }
        for (classification, ids) in document.classifications {
            for id in ids {
                catalog.assign(&classification, id)?;
            }
        }
        debug!(
            formulas = catalog.len(),
            classifications = catalog.classifications.len(),
            "formula catalog loaded"
        );
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>, limits: &ParseLimits) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Catalog(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text, limits)
    }

    /// Add a formula after checking it compiles against its declared inputs.
    ///
    /// Identifiers are never reused: a changed formula needs a new id.
    pub fn insert(&mut self, formula: FormulaDefinition, limits: &ParseLimits) -> EngineResult<()> {
        if self.get(&formula.id).is_some() {
            return Err(EngineError::Catalog(format!(
                "formula {} is defined more than once",
                formula.id
            )));
        }
        formula.compile(limits)?;
        self.formulas.push(formula);
        Ok(())
    }

    /// Make `formula` apply to elements of `classification`.
    pub fn assign(&mut self, classification: &str, formula: FormulaId) -> EngineResult<()> {
        if self.get(&formula).is_none() {
            return Err(EngineError::Catalog(format!(
                "classification '{classification}' refers to unknown formula {formula}"
            )));
        }
        let assigned = self
            .classifications
            .entry(classification.to_string())
            .or_default();
        if !assigned.contains(&formula) {
            assigned.push(formula);
        }
        Ok(())
    }

    pub fn get(&self, id: &FormulaId) -> Option<&FormulaDefinition> {
        self.formulas.iter().find(|f| &f.id == id)
    }

    /// Formulas in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FormulaDefinition> {
        self.formulas.iter()
    }

    /// Formulas that apply to `classification`, in assignment order.
    pub fn for_classification(&self, classification: &str) -> Vec<&FormulaDefinition> {
        self.classifications
            .get(classification)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn classifications(&self) -> impl Iterator<Item = &str> {
        self.classifications.keys().map(String::as_str)
    }

    /// Classifications `formula` is assigned to.
    pub fn classifications_of(&self, formula: &FormulaId) -> BTreeSet<&str> {
        self.classifications
            .iter()
            .filter(|(_, ids)| ids.contains(formula))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}
