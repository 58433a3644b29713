use takeoff_types::Digest;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a ledger entry and a calculation result with identical
/// bytes never share a digest.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for ledger entries.
    pub const LEDGER_ENTRY: Self = Self {
        domain: "takeoff-ledger-entry-v1",
    };
    /// Hasher for calculation results recorded in the ledger.
    pub const RESULT: Self = Self {
        domain: "takeoff-result-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        self.hash_parts(&[data])
    }

    /// Hash several byte strings in order, as one message.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(part);
        }
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value as JSON with domain separation.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<Digest, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Check that a value still hashes to the digest recorded for it.
    pub fn verify_json<T: serde::Serialize>(
        &self,
        value: &T,
        expected: &Digest,
    ) -> Result<bool, HasherError> {
        Ok(self.hash_json(value)? == *expected)
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
