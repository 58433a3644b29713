use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use takeoff_crypto::{ChainLink, HashChainVerifier, HasherError};
use takeoff_types::{Digest, EntryId, ProjectId};

use crate::error::LedgerError;
use crate::event::{EventKind, LedgerEvent};

/// One immutable record in a project's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub project: ProjectId,
    pub seq: u64,
    pub kind: EventKind,
    pub recorded_at: DateTime<Utc>,
    pub event: LedgerEvent,
    pub prev_digest: Digest,
    pub digest: Digest,
}

/// The fields covered by an entry's digest, in canonical order.
#[derive(Serialize)]
struct EntryPayload<'a> {
    id: &'a EntryId,
    project: &'a ProjectId,
    kind: EventKind,
    recorded_at: &'a DateTime<Utc>,
    event: &'a LedgerEvent,
}

impl LedgerEntry {
    /// Build an entry at `seq` after `prev_digest` and compute its digest.
    pub fn seal(
        project: ProjectId,
        seq: u64,
        prev_digest: Digest,
        recorded_at: DateTime<Utc>,
        event: LedgerEvent,
    ) -> Result<Self, LedgerError> {
        let mut entry = Self {
            id: EntryId::new(),
            project,
            seq,
            kind: event.kind(),
            recorded_at,
            event,
            prev_digest,
            digest: Digest::GENESIS,
        };
        entry.digest = entry
            .recompute_digest()
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        Ok(entry)
    }

    /// Digest recomputed from the stored fields and stored predecessor digest.
    pub fn recompute_digest(&self) -> Result<Digest, HasherError> {
        let payload = self.payload_bytes()?;
        Ok(HashChainVerifier::compute_digest(
            self.seq,
            &payload,
            &self.prev_digest,
        ))
    }

    pub fn to_ref(&self) -> EntryRef {
        EntryRef {
            id: self.id,
            seq: self.seq,
            digest: self.digest,
        }
    }
}

impl ChainLink for LedgerEntry {
    fn sequence(&self) -> u64 {
        self.seq
    }

    fn digest(&self) -> Digest {
        self.digest
    }

    fn prev_digest(&self) -> Digest {
        self.prev_digest
    }

    fn payload_bytes(&self) -> Result<Vec<u8>, HasherError> {
        let payload = EntryPayload {
            id: &self.id,
            project: &self.project,
            kind: self.kind,
            recorded_at: &self.recorded_at,
            event: &self.event,
        };
        serde_json::to_vec(&payload).map_err(|e| HasherError::Serialization(e.to_string()))
    }
}

/// Position of the newest entry in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub id: EntryId,
    pub seq: u64,
    pub digest: Digest,
}

impl EntryRef {
    /// Sequence number the next append must use.
    pub fn next_seq(&self) -> u64 {
        self.seq + 1
    }
}
