use std::collections::BTreeSet;

use serde::Serialize;
use takeoff_crypto::{ChainDiscrepancy, HashChainVerifier};
use takeoff_types::{Digest, ProjectId};
use tracing::warn;

use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use crate::traits::LedgerReader;

/// Result of re-walking one project's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub project: ProjectId,
    pub entry_count: u64,
    pub head: Option<Digest>,
    pub violations: Vec<Violation>,
}

/// A discrepancy, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub seq: u64,
    pub description: String,
}

impl From<&ChainDiscrepancy> for Violation {
    fn from(discrepancy: &ChainDiscrepancy) -> Self {
        Self {
            seq: discrepancy.sequence(),
            description: discrepancy.to_string(),
        }
    }
}

impl IntegrityReport {
    /// Returns `true` if no discrepancy was found.
    pub fn is_intact(&self) -> bool {
        self.violations.is_empty()
    }

    /// Sequence numbers with at least one discrepancy.
    pub fn flagged_sequences(&self) -> BTreeSet<u64> {
        self.violations.iter().map(|v| v.seq).collect()
    }

    /// Turn the first violation into a hard error.
    pub fn into_result(self) -> Result<Self, LedgerError> {
        match self.violations.first() {
            None => Ok(self),
            Some(first) => Err(LedgerError::IntegrityViolation {
                project: self.project.clone(),
                seq: first.seq,
                reason: first.description.clone(),
            }),
        }
    }
}

/// Chain integrity checks over a [`LedgerReader`].
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verify entries already read from storage.
    pub fn verify_entries(project: &ProjectId, entries: &[LedgerEntry]) -> IntegrityReport {
        let discrepancies = HashChainVerifier::verify(entries);
        let violations: Vec<Violation> = discrepancies.iter().map(Violation::from).collect();
        for violation in &violations {
            warn!(project = %project, seq = violation.seq, "{}", violation.description);
        }
        IntegrityReport {
            project: project.clone(),
            entry_count: entries.len() as u64,
            head: entries.last().map(|e| e.digest),
            violations,
        }
    }

    pub fn verify_chain<R: LedgerReader + ?Sized>(
        reader: &R,
        project: &ProjectId,
    ) -> Result<IntegrityReport, LedgerError> {
        let entries = reader.read_all(project)?;
        Ok(Self::verify_entries(project, &entries))
    }

    /// Verify every project the reader knows about.
    pub fn verify_all<R: LedgerReader + ?Sized>(
        reader: &R,
    ) -> Result<Vec<IntegrityReport>, LedgerError> {
        reader
            .projects()?
            .iter()
            .map(|project| Self::verify_chain(reader, project))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;
    use crate::test_support::created;
    use crate::traits::LedgerWriter;

    fn ledger_with(project: &ProjectId, count: usize) -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        for i in 0..count {
            ledger
                .append(project, created(&format!("wall-{i}"), i as f64))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn intact_chain_has_no_violations() {
        let p = ProjectId::new("p");
        let report = ChainVerifier::verify_chain(&ledger_with(&p, 5), &p).unwrap();
        assert!(report.is_intact());
        assert_eq!(report.entry_count, 5);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn tampered_entry_is_flagged_alone() {
        let p = ProjectId::new("p");
        let mut entries = ledger_with(&p, 6).read_all(&p).unwrap();
        entries[3].event = created("wall-3", 1000.0);

        let report = ChainVerifier::verify_entries(&p, &entries);
        assert_eq!(report.flagged_sequences(), BTreeSet::from([4]));

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, LedgerError::IntegrityViolation { seq: 4, .. }));
    }

    #[test]
    fn deleted_entry_is_reported_as_gap() {
        let p = ProjectId::new("p");
        let mut entries = ledger_with(&p, 4).read_all(&p).unwrap();
        entries.remove(1);
        let report = ChainVerifier::verify_entries(&p, &entries);
        assert_eq!(report.flagged_sequences(), BTreeSet::from([3]));
        assert!(report.violations[0].description.contains("sequence gap"));
    }

    #[test]
    fn verify_all_covers_every_project() {
        let ledger = InMemoryLedger::new();
        for name in ["a", "b", "c"] {
            ledger
                .append(&ProjectId::new(name), created("wall-1", 1.0))
                .unwrap();
        }
        let reports = ChainVerifier::verify_all(&ledger).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(IntegrityReport::is_intact));
    }
}
