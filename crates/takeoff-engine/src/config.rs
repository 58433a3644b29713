use std::path::Path;

use serde::{Deserialize, Serialize};
use takeoff_calc::Calculator;
use takeoff_expr::ParseLimits;

use crate::error::{EngineError, EngineResult};

/// Settings for the quantity engine.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Decimal places results are rounded to.
    pub decimal_places: u32,
    /// How often a lost ledger race is retried before giving up.
    pub max_append_retries: u32,
    /// Longest accepted formula, in bytes.
    pub max_expression_length: usize,
    /// Deepest accepted nesting of parentheses, calls and unary operators.
    pub max_nesting_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decimal_places: 4,
            max_append_retries: 5,
            max_expression_length: 4096,
            max_nesting_depth: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> EngineResult<()> {
        // round_to takes an i32 and 10^places must stay finite.
        if self.decimal_places > 15 {
            return Err(EngineError::Config(format!(
                "decimal_places must be at most 15, got {}",
                self.decimal_places
            )));
        }
        if self.max_expression_length == 0 || self.max_nesting_depth == 0 {
            return Err(EngineError::Config(
                "expression limits must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_length: self.max_expression_length,
            max_depth: self.max_nesting_depth,
        }
    }

    pub fn calculator(&self) -> Calculator {
        Calculator::new(self.decimal_places, self.parse_limits())
    }

    /// Total append attempts per ledger write, including the first.
    pub fn append_attempts(&self) -> u32 {
        self.max_append_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = EngineConfig::from_toml_str("decimal_places = 2\nmax_append_retries = 0\n").unwrap();
        assert_eq!(config.decimal_places, 2);
        assert_eq!(config.append_attempts(), 1);
        assert_eq!(config.max_nesting_depth, 64);
        assert_eq!(config.calculator().decimal_places(), 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("decimals = 2").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(EngineConfig::from_toml_str("decimal_places = 40").is_err());
        assert!(EngineConfig::from_toml_str("max_nesting_depth = 0").is_err());
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "max_expression_length = 128\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.parse_limits().max_length, 128);

        let missing = EngineConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.to_string().contains("absent.toml"));
    }
}
