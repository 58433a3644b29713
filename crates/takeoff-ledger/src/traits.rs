use takeoff_types::{EntryId, ProjectId};

use crate::entry::{EntryRef, LedgerEntry};
use crate::error::LedgerError;
use crate::event::LedgerEvent;
use crate::filter::EntryFilter;

/// Write boundary for calculation ledger appends.
pub trait LedgerWriter: Send + Sync {
    /// Append one event at the end of the project's chain.
    fn append(&self, project: &ProjectId, event: LedgerEvent) -> Result<LedgerEntry, LedgerError>;

    /// Append `events` as one unit, but only if the chain's next sequence
    /// number is still `expected_seq`. Otherwise nothing is written and
    /// [`LedgerError::ConcurrentAppend`] is returned.
    fn append_at(
        &self,
        project: &ProjectId,
        expected_seq: u64,
        events: Vec<LedgerEvent>,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// Read boundary for ledger queries and verification.
pub trait LedgerReader: Send + Sync {
    fn head(&self, project: &ProjectId) -> Result<Option<EntryRef>, LedgerError>;

    /// Every entry of the project in sequence order.
    fn read_all(&self, project: &ProjectId) -> Result<Vec<LedgerEntry>, LedgerError>;

    fn get(&self, project: &ProjectId, id: EntryId) -> Result<Option<LedgerEntry>, LedgerError>;

    fn projects(&self) -> Result<Vec<ProjectId>, LedgerError>;

    fn entry_count(&self, project: &ProjectId) -> Result<u64, LedgerError>;

    /// Entries matching `filter`, in sequence order.
    fn entries_for(
        &self,
        project: &ProjectId,
        filter: &EntryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .read_all(project)?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect())
    }

    /// Sequence number the next append to `project` will receive.
    fn next_seq(&self, project: &ProjectId) -> Result<u64, LedgerError> {
        Ok(self.head(project)?.map_or(1, |head| head.next_seq()))
    }
}
