use takeoff_calc::CalcError;
use takeoff_crypto::HasherError;
use takeoff_ledger::LedgerError;
use takeoff_types::{ProjectId, ResultId};

/// Errors produced by the result store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("result {0} is already stored")]
    AlreadyStored(ResultId),

    #[error("result {0} is not stored")]
    UnknownResult(ResultId),

    #[error("result {0} is not live")]
    NotLive(ResultId),

    #[error("result store lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// The backing storage refused or failed the operation.
    #[error("result store backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The formula could not be evaluated against the inputs.
    #[error(transparent)]
    Calculation(#[from] CalcError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Other writers kept winning the race for the project's chain.
    #[error("ledger for project {project} still contended after {attempts} attempts")]
    RetriesExhausted { project: ProjectId, attempts: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("hashing error: {0}")]
    Hashing(#[from] HasherError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid formula catalog: {0}")]
    Catalog(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// `true` only when a fresh attempt may succeed without any change to
    /// the inputs, formulas or stored data.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
