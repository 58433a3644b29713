//! Calculation ledger for the Takeoff quantity engine.
//!
//! Every calculation attempt for a project is recorded as a [`LedgerEntry`]
//! in that project's chain. Entries are append-only and hash-linked: each
//! digest covers the entry's sequence number, its content and the digest of
//! the entry before it, starting from [`takeoff_types::Digest::GENESIS`].
//! Chains are independent per project, so writers on different projects
//! never contend.
//!
//! This crate provides:
//! - [`LedgerEvent`] / [`LedgerEntry`] records
//! - `LedgerWriter` / `LedgerReader` trait boundaries, including
//!   compare-and-append ([`LedgerWriter::append_at`])
//! - [`InMemoryLedger`] with per-project locking
//! - [`ChainVerifier`] producing an [`IntegrityReport`] of every discrepancy
//! - [`LiveQuantityProjection`], the live result per element and formula

pub mod entry;
pub mod error;
pub mod event;
pub mod filter;
pub mod memory;
pub mod projection;
pub mod traits;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use entry::{EntryRef, LedgerEntry};
pub use error::LedgerError;
pub use event::{EventKind, LedgerEvent, RecordedResult};
pub use filter::EntryFilter;
pub use memory::InMemoryLedger;
pub use projection::{LiveQuantity, LiveQuantityProjection};
pub use traits::{LedgerReader, LedgerWriter};
pub use verify::{ChainVerifier, IntegrityReport, Violation};
