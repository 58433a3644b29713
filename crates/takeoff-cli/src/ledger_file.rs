use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use takeoff_engine::{
    EngineConfig, InMemoryEngine, InMemoryLedger, InMemoryResultStore, LedgerEntry,
    QuantityEngine, StoredResult,
};

/// Ledger entries and stored results persisted as one JSON document.
///
/// Entries are written and read back exactly as sealed, so `verify` sees
/// whatever the file holds.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerFile {
    #[serde(default)]
    pub entries: Vec<LedgerEntry>,
    #[serde(default)]
    pub results: Vec<StoredResult>,
}

impl LedgerFile {
    /// Read `path`, or start empty if it does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading ledger file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing ledger file {}", path.display()))
    }

    /// Replace `path` atomically: write a sibling temp file, then rename it.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .with_context(|| format!("replacing ledger file {}", path.display()))?;
        Ok(())
    }

    pub fn into_engine(self, config: EngineConfig) -> InMemoryEngine {
        QuantityEngine::new(
            config,
            InMemoryLedger::from_entries(self.entries),
            InMemoryResultStore::from_results(self.results),
        )
    }

    pub fn from_engine(engine: &InMemoryEngine) -> anyhow::Result<Self> {
        Ok(Self {
            entries: engine.ledger().export()?,
            results: engine.store().export()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeoff_engine::{
        ElementId, FormulaDefinition, InputSet, ProjectId, RequiredInput, Unit,
    };

    fn engine_with_results() -> InMemoryEngine {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let formula = FormulaDefinition::new("slab-volume", "area * thickness", Unit::CubicMetre)
            .with_input(RequiredInput::new("area", Unit::SquareMetre))
            .with_input(RequiredInput::new("thickness", Unit::Metre));
        let project = ProjectId::new("tower-a");
        for (element, area) in [("slab-1", 40.0), ("slab-2", 12.5), ("slab-1", 42.0)] {
            let inputs = InputSet::new()
                .with("area", area, Unit::SquareMetre)
                .with("thickness", 175.0, Unit::Millimetre);
            engine.calculate_for_element(&project, &ElementId::new(element), &inputs, [&formula]);
        }
        engine
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = LedgerFile::load(&dir.path().join("none.json")).unwrap();
        assert!(file.entries.is_empty());
        assert!(file.results.is_empty());
    }

    #[test]
    fn saved_ledger_reloads_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let engine = engine_with_results();
        LedgerFile::from_engine(&engine).unwrap().save(&path).unwrap();

        let reloaded = LedgerFile::load(&path).unwrap();
        assert_eq!(reloaded.entries.len(), 4);
        assert_eq!(reloaded.results.len(), 3);

        let engine = reloaded.into_engine(EngineConfig::default());
        let project = ProjectId::new("tower-a");
        assert!(engine.verify_ledger(&project).unwrap().is_intact());
        assert!(engine.audit_results(&project).unwrap().is_consistent());
    }

    #[test]
    fn edited_file_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        LedgerFile::from_engine(&engine_with_results())
            .unwrap()
            .save(&path)
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let edited = text.replacen("\"amount\": 7.0", "\"amount\": 70.0", 1);
        assert_ne!(text, edited);
        std::fs::write(&path, edited).unwrap();

        let engine = LedgerFile::load(&path).unwrap().into_engine(EngineConfig::default());
        let report = engine.verify_ledger(&ProjectId::new("tower-a")).unwrap();
        assert_eq!(report.flagged_sequences().into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "not json").unwrap();
        let err = LedgerFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("parsing ledger file"));
    }
}
