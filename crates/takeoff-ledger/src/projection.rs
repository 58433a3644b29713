use std::collections::{BTreeMap, HashMap};

use takeoff_types::{ElementId, EntryId, FormulaId, ProjectId, ResultId};

use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use crate::event::{LedgerEvent, RecordedResult};
use crate::traits::LedgerReader;

/// A result that is live according to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveQuantity {
    pub result: RecordedResult,
    /// Entry that recorded the result.
    pub entry_id: EntryId,
    pub seq: u64,
}

/// Live result per (element, formula), rebuilt by replaying a chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveQuantityProjection {
    live: BTreeMap<(ElementId, FormulaId), LiveQuantity>,
    /// Every result recorded so far, so a retraction can restore the one it
    /// replaced.
    recorded: HashMap<ResultId, LiveQuantity>,
    replayed: u64,
}

impl LiveQuantityProjection {
    /// Replay entries in order. Failure events do not change live results.
    pub fn from_entries(entries: &[LedgerEntry]) -> Self {
        let mut projection = Self::default();
        for entry in entries {
            projection.apply(entry);
        }
        projection
    }

    pub fn build<R: LedgerReader + ?Sized>(
        reader: &R,
        project: &ProjectId,
    ) -> Result<Self, LedgerError> {
        Ok(Self::from_entries(&reader.read_all(project)?))
    }

    pub fn apply(&mut self, entry: &LedgerEntry) {
        self.replayed += 1;
        match &entry.event {
            LedgerEvent::Created(result) | LedgerEvent::Recomputed { result, .. } => {
                let live = LiveQuantity {
                    result: result.clone(),
                    entry_id: entry.id,
                    seq: entry.seq,
                };
                self.recorded.insert(result.result_id, live.clone());
                self.live
                    .insert((result.element.clone(), result.formula_id.clone()), live);
            }
            LedgerEvent::Superseded {
                result_id,
                element,
                formula_id,
                ..
            } => {
                let key = (element.clone(), formula_id.clone());
                if self
                    .live
                    .get(&key)
                    .is_some_and(|live| live.result.result_id == *result_id)
                {
                    self.live.remove(&key);
                }
            }
            LedgerEvent::Retracted {
                result_id,
                element,
                formula_id,
                restores,
                ..
            } => {
                let key = (element.clone(), formula_id.clone());
                if self
                    .live
                    .get(&key)
                    .is_some_and(|live| live.result.result_id == *result_id)
                {
                    self.live.remove(&key);
                    if let Some(previous) = (*restores).and_then(|id| self.recorded.get(&id)) {
                        self.live.insert(key, previous.clone());
                    }
                }
            }
            LedgerEvent::ValidationFailed { .. }
            | LedgerEvent::SecurityRejected { .. }
            | LedgerEvent::CalculationFailed { .. } => {}
        }
    }

    pub fn get(&self, element: &ElementId, formula: &FormulaId) -> Option<&LiveQuantity> {
        self.live.get(&(element.clone(), formula.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveQuantity> {
        self.live.values()
    }

    pub fn for_element<'a>(
        &'a self,
        element: &'a ElementId,
    ) -> impl Iterator<Item = &'a LiveQuantity> + 'a {
        self.live
            .iter()
            .filter(move |((e, _), _)| e == element)
            .map(|(_, live)| live)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of entries replayed.
    pub fn replayed(&self) -> u64 {
        self.replayed
    }
}
