use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use takeoff_calc::CalculationResult;
use takeoff_types::{Digest, ElementId, EntryId, FormulaId, ProjectId, ResultId};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Live,
    Superseded,
}

/// A calculation result as kept by the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub result_id: ResultId,
    pub project: ProjectId,
    pub element: ElementId,
    /// Ledger entry that recorded this result.
    pub entry_id: EntryId,
    pub result: CalculationResult,
    pub result_digest: Digest,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<ResultId>,
}

impl StoredResult {
    pub fn formula_id(&self) -> &FormulaId {
        &self.result.formula_id
    }

    pub fn is_live(&self) -> bool {
        self.status == ResultStatus::Live
    }
}

/// Persistence boundary for calculation results.
///
/// Superseded results are kept; only their status changes.
pub trait ResultStore: Send + Sync {
    /// Check that `commit` of `result_id` superseding `supersedes` would be
    /// accepted right now, without storing anything.
    fn check_commit(
        &self,
        project: &ProjectId,
        result_id: ResultId,
        supersedes: Option<ResultId>,
    ) -> Result<(), StoreError>;

    /// Store `result` as live. If `supersedes` is given, that result must be
    /// live and is marked superseded by `result` in the same step.
    fn commit(&self, result: StoredResult, supersedes: Option<ResultId>)
        -> Result<(), StoreError>;

    fn get(&self, project: &ProjectId, id: ResultId) -> Result<Option<StoredResult>, StoreError>;

    /// The live result for an (element, formula) pair, if any.
    fn live(
        &self,
        project: &ProjectId,
        element: &ElementId,
        formula: &FormulaId,
    ) -> Result<Option<StoredResult>, StoreError>;

    /// Every result ever stored for the pair, oldest first.
    fn history(
        &self,
        project: &ProjectId,
        element: &ElementId,
        formula: &FormulaId,
    ) -> Result<Vec<StoredResult>, StoreError>;

    /// All live results of a project, in commit order.
    fn live_results(&self, project: &ProjectId) -> Result<Vec<StoredResult>, StoreError>;
}

/// In-memory result store.
#[derive(Default)]
pub struct InMemoryResultStore {
    projects: RwLock<HashMap<ProjectId, Vec<StoredResult>>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously exported results, keeping their order.
    pub fn from_results(results: impl IntoIterator<Item = StoredResult>) -> Self {
        let mut projects: HashMap<ProjectId, Vec<StoredResult>> = HashMap::new();
        for result in results {
            projects.entry(result.project.clone()).or_default().push(result);
        }
        Self {
            projects: RwLock::new(projects),
        }
    }

    /// Every stored result, grouped by project in name order.
    pub fn export(&self) -> Result<Vec<StoredResult>, StoreError> {
        let projects = self
            .projects
            .read()
            .map_err(|_| StoreError::LockPoisoned("result store read lock"))?;
        let mut names: Vec<&ProjectId> = projects.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .flat_map(|name| projects[name].iter().cloned())
            .collect())
    }

    fn read<T>(
        &self,
        project: &ProjectId,
        f: impl FnOnce(&[StoredResult]) -> T,
    ) -> Result<T, StoreError> {
        let projects = self
            .projects
            .read()
            .map_err(|_| StoreError::LockPoisoned("result store read lock"))?;
        Ok(f(projects.get(project).map(Vec::as_slice).unwrap_or_default()))
    }
}

fn same_pair(stored: &StoredResult, element: &ElementId, formula: &FormulaId) -> bool {
    &stored.element == element && stored.formula_id() == formula
}

fn commit_preconditions(
    results: &[StoredResult],
    result_id: ResultId,
    supersedes: Option<ResultId>,
) -> Result<(), StoreError> {
    if results.iter().any(|r| r.result_id == result_id) {
        return Err(StoreError::AlreadyStored(result_id));
    }
    if let Some(old) = supersedes {
        let previous = results
            .iter()
            .find(|r| r.result_id == old)
            .ok_or(StoreError::UnknownResult(old))?;
        if !previous.is_live() {
            return Err(StoreError::NotLive(old));
        }
    }
    Ok(())
}

impl ResultStore for InMemoryResultStore {
    fn check_commit(
        &self,
        project: &ProjectId,
        result_id: ResultId,
        supersedes: Option<ResultId>,
    ) -> Result<(), StoreError> {
        self.read(project, |results| {
            commit_preconditions(results, result_id, supersedes)
        })?
    }

    fn commit(
        &self,
        result: StoredResult,
        supersedes: Option<ResultId>,
    ) -> Result<(), StoreError> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| StoreError::LockPoisoned("result store write lock"))?;
        let results = projects.entry(result.project.clone()).or_default();

        commit_preconditions(results, result.result_id, supersedes)?;
        let previous = supersedes.and_then(|old| results.iter_mut().find(|r| r.result_id == old));
        if let Some(previous) = previous {
            previous.status = ResultStatus::Superseded;
            previous.superseded_by = Some(result.result_id);
        }
        results.push(result);
        Ok(())
    }

    fn get(&self, project: &ProjectId, id: ResultId) -> Result<Option<StoredResult>, StoreError> {
        self.read(project, |results| {
            results.iter().find(|r| r.result_id == id).cloned()
        })
    }

    fn live(
        &self,
        project: &ProjectId,
        element: &ElementId,
        formula: &FormulaId,
    ) -> Result<Option<StoredResult>, StoreError> {
        self.read(project, |results| {
            results
                .iter()
                .rev()
                .find(|r| r.is_live() && same_pair(r, element, formula))
                .cloned()
        })
    }

    fn history(
        &self,
        project: &ProjectId,
        element: &ElementId,
        formula: &FormulaId,
    ) -> Result<Vec<StoredResult>, StoreError> {
        self.read(project, |results| {
            results
                .iter()
                .filter(|r| same_pair(r, element, formula))
                .cloned()
                .collect()
        })
    }

    fn live_results(&self, project: &ProjectId) -> Result<Vec<StoredResult>, StoreError> {
        self.read(project, |results| {
            results.iter().filter(|r| r.is_live()).cloned().collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use takeoff_units::Unit;

    fn stored(project: &str, element: &str, amount: f64) -> StoredResult {
        StoredResult {
            result_id: ResultId::new(),
            project: ProjectId::new(project),
            element: ElementId::new(element),
            entry_id: EntryId::new(),
            result: CalculationResult {
                formula_id: FormulaId::new("area"),
                formula_version: 1,
                amount,
                unit: Unit::SquareMetre,
                steps: Vec::new(),
                inputs: BTreeMap::new(),
            },
            result_digest: Digest::GENESIS,
            status: ResultStatus::Live,
            superseded_by: None,
        }
    }

    #[test]
    fn supersession_keeps_history() {
        let store = InMemoryResultStore::new();
        let first = stored("p", "wall-1", 10.0);
        let second = stored("p", "wall-1", 12.0);
        store.commit(first.clone(), None).unwrap();
        store.commit(second.clone(), Some(first.result_id)).unwrap();

        let p = ProjectId::new("p");
        let element = ElementId::new("wall-1");
        let formula = FormulaId::new("area");

        let live = store.live(&p, &element, &formula).unwrap().unwrap();
        assert_eq!(live.result_id, second.result_id);

        let history = store.history(&p, &element, &formula).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, ResultStatus::Superseded);
        assert_eq!(history[0].superseded_by, Some(second.result_id));
        assert!(history[1].is_live());

        let old = store.get(&p, first.result_id).unwrap().unwrap();
        assert_eq!(old.result.amount, 10.0);
    }

    #[test]
    fn superseding_twice_is_rejected() {
        let store = InMemoryResultStore::new();
        let first = stored("p", "wall-1", 10.0);
        store.commit(first.clone(), None).unwrap();
        store.commit(stored("p", "wall-1", 11.0), Some(first.result_id)).unwrap();

        let err = store
            .commit(stored("p", "wall-1", 12.0), Some(first.result_id))
            .unwrap_err();
        assert_eq!(err, StoreError::NotLive(first.result_id));
        assert_eq!(store.live_results(&ProjectId::new("p")).unwrap().len(), 1);
    }

    #[test]
    fn unknown_or_duplicate_results_are_rejected() {
        let store = InMemoryResultStore::new();
        let result = stored("p", "wall-1", 1.0);
        let ghost = ResultId::new();
        assert_eq!(
            store.commit(result.clone(), Some(ghost)).unwrap_err(),
            StoreError::UnknownResult(ghost)
        );
        store.commit(result.clone(), None).unwrap();
        assert_eq!(
            store.commit(result.clone(), None).unwrap_err(),
            StoreError::AlreadyStored(result.result_id)
        );
    }

    #[test]
    fn check_commit_matches_commit_without_storing() {
        let store = InMemoryResultStore::new();
        let p = ProjectId::new("p");
        let first = stored("p", "wall-1", 10.0);
        let second = stored("p", "wall-1", 12.0);

        store.check_commit(&p, first.result_id, None).unwrap();
        assert!(store.live_results(&p).unwrap().is_empty());
        store.commit(first.clone(), None).unwrap();

        assert_eq!(
            store.check_commit(&p, first.result_id, None).unwrap_err(),
            StoreError::AlreadyStored(first.result_id)
        );
        store.check_commit(&p, second.result_id, Some(first.result_id)).unwrap();
        store.commit(second.clone(), Some(first.result_id)).unwrap();
        assert_eq!(
            store
                .check_commit(&p, ResultId::new(), Some(first.result_id))
                .unwrap_err(),
            StoreError::NotLive(first.result_id)
        );
    }

    #[test]
    fn export_and_reload_preserve_status() {
        let store = InMemoryResultStore::new();
        let first = stored("b", "wall-1", 1.0);
        let second = stored("b", "wall-1", 2.0);
        store.commit(stored("a", "slab-1", 3.0), None).unwrap();
        store.commit(first.clone(), None).unwrap();
        store.commit(second.clone(), Some(first.result_id)).unwrap();

        let exported = store.export().unwrap();
        assert_eq!(exported.len(), 3);
        assert_eq!(exported[0].project.as_str(), "a");

        let reloaded = InMemoryResultStore::from_results(exported);
        let live = reloaded
            .live(&ProjectId::new("b"), &ElementId::new("wall-1"), &FormulaId::new("area"))
            .unwrap()
            .unwrap();
        assert_eq!(live.result_id, second.result_id);
        assert_eq!(
            reloaded.get(&ProjectId::new("b"), first.result_id).unwrap().unwrap().status,
            ResultStatus::Superseded
        );
    }

    #[test]
    fn projects_are_separate() {
        let store = InMemoryResultStore::new();
        store.commit(stored("a", "wall-1", 1.0), None).unwrap();
        store.commit(stored("b", "wall-1", 2.0), None).unwrap();

        let a = store.live_results(&ProjectId::new("a")).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].result.amount, 1.0);
        assert!(store.live_results(&ProjectId::new("c")).unwrap().is_empty());
    }
}
