//! Foundation types for the Takeoff quantity engine.
//!
//! Every other Takeoff crate depends on `takeoff-types`. It holds the
//! identifiers that tie a calculated quantity to its project, element and
//! formula, and the [`Digest`] used to link ledger entries.
//!
//! # Key Types
//!
//! - [`ProjectId`]: Scope of one independent ledger chain
//! - [`ElementId`]: A building component whose quantities are calculated
//! - [`FormulaId`]: Identifier of an immutable formula definition
//! - [`EntryId`]: UUID v7 identifier of a ledger entry
//! - [`ResultId`]: UUID v7 identifier of a calculation result
//! - [`Digest`]: 32-byte BLAKE3 fingerprint

pub mod digest;
pub mod error;
pub mod ids;

pub use digest::Digest;
pub use error::TypeError;
pub use ids::{ElementId, EntryId, FormulaId, ProjectId, ResultId};
