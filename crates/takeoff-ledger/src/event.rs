use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use takeoff_types::{Digest, ElementId, EntryId, FormulaId, ResultId};
use takeoff_units::{Quantity, Unit};

/// Kind of a ledger entry, mirrored from its event for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Recomputed,
    Superseded,
    ValidationFailed,
    SecurityRejected,
    CalculationFailed,
    Retracted,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Created,
        EventKind::Recomputed,
        EventKind::Superseded,
        EventKind::ValidationFailed,
        EventKind::SecurityRejected,
        EventKind::CalculationFailed,
        EventKind::Retracted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Recomputed => "recomputed",
            Self::Superseded => "superseded",
            Self::ValidationFailed => "validation_failed",
            Self::SecurityRejected => "security_rejected",
            Self::CalculationFailed => "calculation_failed",
            Self::Retracted => "retracted",
        }
    }

    /// `true` for the kinds that record a failed attempt.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed
                | Self::SecurityRejected
                | Self::CalculationFailed
                | Self::Retracted
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown event kind '{s}'"))
    }
}

/// A calculation result as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResult {
    pub result_id: ResultId,
    pub element: ElementId,
    pub formula_id: FormulaId,
    pub formula_version: u32,
    pub amount: f64,
    pub unit: Unit,
    /// Normalized inputs the amount was computed from.
    pub inputs: BTreeMap<String, Quantity>,
    /// Fingerprint of the full result, including its step breakdown.
    pub result_digest: Digest,
}

impl RecordedResult {
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.amount, self.unit)
    }
}

/// Payload of a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// First live result for an (element, formula) pair.
    Created(RecordedResult),

    /// A new result replacing a previously live one.
    Recomputed {
        result: RecordedResult,
        replaces: ResultId,
    },

    /// A previously live result is no longer current. It stays queryable.
    Superseded {
        result_id: ResultId,
        element: ElementId,
        formula_id: FormulaId,
        /// Entry that recorded the superseded result.
        recorded_in: EntryId,
        superseded_by: ResultId,
    },

    ValidationFailed {
        element: ElementId,
        formula_id: FormulaId,
        issues: Vec<String>,
        inputs: BTreeMap<String, Quantity>,
    },

    SecurityRejected {
        element: ElementId,
        formula_id: FormulaId,
        expression: String,
        reason: String,
    },

    CalculationFailed {
        element: ElementId,
        formula_id: FormulaId,
        reason: String,
        variables: BTreeMap<String, f64>,
    },

    /// A result recorded just before this entry could not be stored. It is
    /// no longer live, and `restores` is live again if it was replaced.
    Retracted {
        result_id: ResultId,
        element: ElementId,
        formula_id: FormulaId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        restores: Option<ResultId>,
        reason: String,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Recomputed { .. } => EventKind::Recomputed,
            Self::Superseded { .. } => EventKind::Superseded,
            Self::ValidationFailed { .. } => EventKind::ValidationFailed,
            Self::SecurityRejected { .. } => EventKind::SecurityRejected,
            Self::CalculationFailed { .. } => EventKind::CalculationFailed,
            Self::Retracted { .. } => EventKind::Retracted,
        }
    }

    pub fn element(&self) -> &ElementId {
        match self {
            Self::Created(result) | Self::Recomputed { result, .. } => &result.element,
            Self::Superseded { element, .. }
            | Self::ValidationFailed { element, .. }
            | Self::SecurityRejected { element, .. }
            | Self::CalculationFailed { element, .. }
            | Self::Retracted { element, .. } => element,
        }
    }

    pub fn formula_id(&self) -> &FormulaId {
        match self {
            Self::Created(result) | Self::Recomputed { result, .. } => &result.formula_id,
            Self::Superseded { formula_id, .. }
            | Self::ValidationFailed { formula_id, .. }
            | Self::SecurityRejected { formula_id, .. }
            | Self::CalculationFailed { formula_id, .. }
            | Self::Retracted { formula_id, .. } => formula_id,
        }
    }

    /// The result this event records, for created and recomputed events.
    pub fn result(&self) -> Option<&RecordedResult> {
        match self {
            Self::Created(result) | Self::Recomputed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Every calculation result the event refers to.
    pub fn referenced_results(&self) -> Vec<ResultId> {
        match self {
            Self::Created(result) => vec![result.result_id],
            Self::Recomputed { result, replaces } => vec![result.result_id, *replaces],
            Self::Superseded {
                result_id,
                superseded_by,
                ..
            } => vec![*result_id, *superseded_by],
            Self::Retracted {
                result_id,
                restores,
                ..
            } => std::iter::once(*result_id).chain(*restores).collect(),
            _ => Vec::new(),
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match self {
            Self::Created(r) => format!("{} {} = {} {}", r.element, r.formula_id, r.amount, r.unit),
            Self::Recomputed { result: r, .. } => {
                format!("{} {} = {} {} (recomputed)", r.element, r.formula_id, r.amount, r.unit)
            }
            Self::Superseded {
                element,
                formula_id,
                result_id,
                ..
            } => format!("{element} {formula_id} result {} superseded", result_id.short_id()),
            Self::ValidationFailed {
                element,
                formula_id,
                issues,
                ..
            } => format!("{element} {formula_id}: {}", issues.join("; ")),
            Self::SecurityRejected {
                element,
                formula_id,
                reason,
                ..
            }
            | Self::CalculationFailed {
                element,
                formula_id,
                reason,
                ..
            } => format!("{element} {formula_id}: {reason}"),
            Self::Retracted {
                element,
                formula_id,
                result_id,
                reason,
                ..
            } => format!(
                "{element} {formula_id} result {} retracted: {reason}",
                result_id.short_id()
            ),
        }
    }
}
