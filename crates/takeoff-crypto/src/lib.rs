//! Hashing primitives for the Takeoff quantity engine.
//!
//! Provides domain-separated BLAKE3 hashing and verification of per-project
//! hash chains. All hashing wraps the `blake3` crate; nothing here is
//! custom cryptography.

pub mod chain;
pub mod hasher;

pub use chain::{ChainDiscrepancy, ChainLink, HashChainVerifier};
pub use hasher::{ContentHasher, HasherError};
