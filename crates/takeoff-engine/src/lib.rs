//! Quantity orchestrator for the Takeoff engine.
//!
//! [`QuantityEngine`] takes an element's resolved inputs and the formulas
//! that apply to it, runs the assembly calculator for each formula and
//! appends exactly one ledger entry per attempt: a created or recomputed
//! result, a validation failure, a security rejection or a calculation
//! failure. A result the store refuses after it was recorded is followed by
//! a retraction. One failing formula never stops the others; the caller gets a
//! [`FormulaOutcome`] per formula.
//!
//! Formulas come from a [`FormulaCatalog`] loaded from TOML, results are
//! kept behind the [`ResultStore`] boundary and the engine's limits live in
//! [`EngineConfig`].

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;

pub use catalog::FormulaCatalog;
pub use config::EngineConfig;
pub use engine::{AuditFinding, AuditReport, FormulaOutcome, InMemoryEngine, QuantityEngine};
pub use error::{EngineError, EngineResult, StoreError};
pub use store::{InMemoryResultStore, ResultStatus, ResultStore, StoredResult};

// Re-export the types callers need to drive the engine.
pub use takeoff_calc::{
    CalcError, CalculationResult, CalculationStep, FormulaDefinition, InputConstraint, InputSet,
    RequiredInput,
};
pub use takeoff_ledger::{
    EntryFilter, EventKind, InMemoryLedger, IntegrityReport, LedgerEntry, LedgerEvent,
    LedgerReader, LedgerWriter,
};
pub use takeoff_types::{ElementId, FormulaId, ProjectId, ResultId};
pub use takeoff_units::{Quantity, Unit};
