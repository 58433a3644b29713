use takeoff_types::Digest;

use crate::hasher::{ContentHasher, HasherError};

/// An entry that participates in a per-project hash chain.
pub trait ChainLink {
    /// Position in the chain, starting at 1.
    fn sequence(&self) -> u64;
    /// The entry's stored digest.
    fn digest(&self) -> Digest;
    /// The stored digest of the predecessor ([`Digest::GENESIS`] for the first entry).
    fn prev_digest(&self) -> Digest;
    /// Canonical payload bytes covered by the digest.
    fn payload_bytes(&self) -> Result<Vec<u8>, HasherError>;
}

/// One problem found while walking a chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainDiscrepancy {
    /// The sequence number is not the one that should follow its predecessor.
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    /// The stored predecessor digest does not match the predecessor entry.
    #[error("broken link at sequence {sequence}: stored predecessor {stored}, actual {actual}")]
    BrokenLink {
        sequence: u64,
        stored: Digest,
        actual: Digest,
    },

    /// The stored digest does not match the entry's content.
    #[error("digest mismatch at sequence {sequence}: stored {stored}, computed {computed}")]
    DigestMismatch {
        sequence: u64,
        stored: Digest,
        computed: Digest,
    },

    /// The entry's payload could not be encoded for hashing.
    #[error("unreadable entry at sequence {sequence}: {reason}")]
    Unreadable { sequence: u64, reason: String },
}

impl ChainDiscrepancy {
    /// Sequence number of the entry the discrepancy was found at.
    pub fn sequence(&self) -> u64 {
        match self {
            Self::SequenceGap { found, .. } => *found,
            Self::BrokenLink { sequence, .. }
            | Self::DigestMismatch { sequence, .. }
            | Self::Unreadable { sequence, .. } => *sequence,
        }
    }
}

/// Hash chain integrity verifier.
///
/// Walks a chain in order and collects every discrepancy instead of
/// stopping at the first. Each entry is recomputed against its
/// predecessor's *stored* digest, so tampering with one entry flags that
/// entry alone; its successors still verify against what was stored.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain and return every discrepancy found (empty when intact).
    pub fn verify<L: ChainLink>(links: &[L]) -> Vec<ChainDiscrepancy> {
        let mut discrepancies = Vec::new();
        let mut expected_sequence = 1;
        let mut expected_prev = Digest::GENESIS;

        for link in links {
            let sequence = link.sequence();
            if sequence != expected_sequence {
                discrepancies.push(ChainDiscrepancy::SequenceGap {
                    expected: expected_sequence,
                    found: sequence,
                });
            }

            if link.prev_digest() != expected_prev {
                discrepancies.push(ChainDiscrepancy::BrokenLink {
                    sequence,
                    stored: link.prev_digest(),
                    actual: expected_prev,
                });
            }

            match link.payload_bytes() {
                Ok(payload) => {
                    let computed = Self::compute_digest(sequence, &payload, &expected_prev);
                    if computed != link.digest() {
                        discrepancies.push(ChainDiscrepancy::DigestMismatch {
                            sequence,
                            stored: link.digest(),
                            computed,
                        });
                    }
                }
                Err(e) => discrepancies.push(ChainDiscrepancy::Unreadable {
                    sequence,
                    reason: e.to_string(),
                }),
            }

            expected_sequence = sequence.saturating_add(1);
            expected_prev = link.digest();
        }

        discrepancies
    }

    /// Digest of one entry: domain tag, sequence number, predecessor digest
    /// and length-prefixed payload.
    pub fn compute_digest(sequence: u64, payload: &[u8], prev: &Digest) -> Digest {
        ContentHasher::LEDGER_ENTRY.hash_parts(&[
            sequence.to_be_bytes().as_slice(),
            prev.as_bytes().as_slice(),
            (payload.len() as u64).to_be_bytes().as_slice(),
            payload,
        ])
    }
}
