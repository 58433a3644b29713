use std::collections::BTreeSet;

use takeoff_types::{ElementId, FormulaId, ResultId};

use crate::entry::LedgerEntry;
use crate::event::EventKind;

/// Criteria for selecting ledger entries. An empty filter matches everything;
/// each criterion that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub kinds: BTreeSet<EventKind>,
    pub result: Option<ResultId>,
    pub element: Option<ElementId>,
    pub formula: Option<FormulaId>,
    pub from_seq: Option<u64>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Entries that created, replaced or superseded `result`.
    pub fn result(mut self, result: ResultId) -> Self {
        self.result = Some(result);
        self
    }

    pub fn element(mut self, element: ElementId) -> Self {
        self.element = Some(element);
        self
    }

    pub fn formula(mut self, formula: FormulaId) -> Self {
        self.formula = Some(formula);
        self
    }

    pub fn from_seq(mut self, seq: u64) -> Self {
        self.from_seq = Some(seq);
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&entry.kind) {
            return false;
        }
        if let Some(result) = &self.result {
            if !entry.event.referenced_results().contains(result) {
                return false;
            }
        }
        if let Some(element) = &self.element {
            if entry.event.element() != element {
                return false;
            }
        }
        if let Some(formula) = &self.formula {
            if entry.event.formula_id() != formula {
                return false;
            }
        }
        if let Some(from_seq) = self.from_seq {
            if entry.seq < from_seq {
                return false;
            }
        }
        true
    }
}
