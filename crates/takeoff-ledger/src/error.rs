use takeoff_types::ProjectId;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Another writer appended to the project after the caller read its head.
    #[error("concurrent append to project {project}: expected next seq {expected}, chain is at {actual}")]
    ConcurrentAppend {
        project: ProjectId,
        expected: u64,
        actual: u64,
    },

    #[error("integrity violation in project {project} at seq {seq}: {reason}")]
    IntegrityViolation {
        project: ProjectId,
        seq: u64,
        reason: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl LedgerError {
    /// `true` for failures that a fresh attempt may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentAppend { .. })
    }
}
