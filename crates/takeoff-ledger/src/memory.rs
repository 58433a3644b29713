use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use takeoff_types::{Digest, EntryId, ProjectId};
use tracing::{info, warn};

use crate::entry::{EntryRef, LedgerEntry};
use crate::error::LedgerError;
use crate::event::LedgerEvent;
use crate::traits::{LedgerReader, LedgerWriter};
use crate::verify::ChainVerifier;

#[derive(Default)]
struct ProjectChain {
    entries: Vec<LedgerEntry>,
    /// First violation found when the chain was loaded. Appends are refused
    /// while it is set.
    broken: Option<LedgerError>,
}

impl ProjectChain {
    fn next_seq(&self) -> u64 {
        self.entries.last().map_or(1, |e| e.seq + 1)
    }

    fn ensure_appendable(&self) -> Result<(), LedgerError> {
        match &self.broken {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

type Chain = Arc<Mutex<ProjectChain>>;

/// In-memory ledger for tests, the CLI and embedding.
///
/// Each project's chain sits behind its own mutex, so appends to one project
/// never wait on another. The outer lock is only held to find or create a
/// chain.
#[derive(Default)]
pub struct InMemoryLedger {
    chains: RwLock<HashMap<ProjectId, Chain>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from previously stored entries, exactly as stored.
    ///
    /// Nothing is re-hashed or reordered, so verification reports whatever
    /// the stored data contains. A project whose loaded chain does not verify
    /// stays readable, but every append to it fails with the first
    /// [`LedgerError::IntegrityViolation`].
    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut grouped: HashMap<ProjectId, Vec<LedgerEntry>> = HashMap::new();
        for entry in entries {
            grouped.entry(entry.project.clone()).or_default().push(entry);
        }
        let chains = grouped
            .into_iter()
            .map(|(project, entries)| {
                let broken = ChainVerifier::verify_entries(&project, &entries)
                    .into_result()
                    .err();
                if broken.is_some() {
                    warn!(project = %project, "loaded chain does not verify, appends refused");
                }
                let chain = ProjectChain { entries, broken };
                (project, Arc::new(Mutex::new(chain)))
            })
            .collect();
        Self {
            chains: RwLock::new(chains),
        }
    }

    /// Every entry of every project, grouped by project in name order.
    pub fn export(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut all = Vec::new();
        for project in self.projects()? {
            all.extend(self.read_all(&project)?);
        }
        Ok(all)
    }

    fn existing_chain(&self, project: &ProjectId) -> Result<Option<Chain>, LedgerError> {
        let chains = self
            .chains
            .read()
            .map_err(|_| LedgerError::LockPoisoned("ledger read lock"))?;
        Ok(chains.get(project).cloned())
    }

    fn chain(&self, project: &ProjectId) -> Result<Chain, LedgerError> {
        if let Some(chain) = self.existing_chain(project)? {
            return Ok(chain);
        }
        let mut chains = self
            .chains
            .write()
            .map_err(|_| LedgerError::LockPoisoned("ledger write lock"))?;
        Ok(chains.entry(project.clone()).or_default().clone())
    }

    fn seal_batch(
        project: &ProjectId,
        chain: &ProjectChain,
        events: Vec<LedgerEvent>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut seq = chain.next_seq();
        let mut prev = chain.entries.last().map_or(Digest::GENESIS, |e| e.digest);
        let mut sealed = Vec::with_capacity(events.len());
        for event in events {
            let entry = LedgerEntry::seal(project.clone(), seq, prev, Utc::now(), event)?;
            seq += 1;
            prev = entry.digest;
            sealed.push(entry);
        }
        Ok(sealed)
    }
}

impl LedgerWriter for InMemoryLedger {
    fn append(&self, project: &ProjectId, event: LedgerEvent) -> Result<LedgerEntry, LedgerError> {
        let chain = self.chain(project)?;
        let mut chain = chain
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("project chain lock"))?;
        chain.ensure_appendable()?;

        let mut sealed = Self::seal_batch(project, &chain, vec![event])?;
        let entry = sealed.remove(0);
        chain.entries.push(entry.clone());

        info!(project = %project, seq = entry.seq, kind = %entry.kind, "ledger entry appended");
        Ok(entry)
    }

    fn append_at(
        &self,
        project: &ProjectId,
        expected_seq: u64,
        events: Vec<LedgerEvent>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let chain = self.chain(project)?;
        let mut chain = chain
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("project chain lock"))?;
        chain.ensure_appendable()?;

        let actual = chain.next_seq();
        if actual != expected_seq {
            return Err(LedgerError::ConcurrentAppend {
                project: project.clone(),
                expected: expected_seq,
                actual,
            });
        }

        let sealed = Self::seal_batch(project, &chain, events)?;
        chain.entries.extend(sealed.iter().cloned());

        for entry in &sealed {
            info!(project = %project, seq = entry.seq, kind = %entry.kind, "ledger entry appended");
        }
        Ok(sealed)
    }
}

impl LedgerReader for InMemoryLedger {
    fn head(&self, project: &ProjectId) -> Result<Option<EntryRef>, LedgerError> {
        let Some(chain) = self.existing_chain(project)? else {
            return Ok(None);
        };
        let chain = chain
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("project chain lock"))?;
        Ok(chain.entries.last().map(LedgerEntry::to_ref))
    }

    fn read_all(&self, project: &ProjectId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let Some(chain) = self.existing_chain(project)? else {
            return Ok(Vec::new());
        };
        let chain = chain
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("project chain lock"))?;
        Ok(chain.entries.clone())
    }

    fn get(&self, project: &ProjectId, id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        let Some(chain) = self.existing_chain(project)? else {
            return Ok(None);
        };
        let chain = chain
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("project chain lock"))?;
        Ok(chain.entries.iter().find(|e| e.id == id).cloned())
    }

    fn projects(&self) -> Result<Vec<ProjectId>, LedgerError> {
        let chains = self
            .chains
            .read()
            .map_err(|_| LedgerError::LockPoisoned("ledger read lock"))?;
        let mut ids: Vec<ProjectId> = chains.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn entry_count(&self, project: &ProjectId) -> Result<u64, LedgerError> {
        let Some(chain) = self.existing_chain(project)? else {
            return Ok(0);
        };
        let chain = chain
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("project chain lock"))?;
        Ok(chain.entries.len() as u64)
    }
}
