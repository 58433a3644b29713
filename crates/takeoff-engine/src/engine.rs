use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use takeoff_calc::{CalcError, CalculationResult, Calculator, FormulaDefinition, InputSet};
use takeoff_crypto::ContentHasher;
use takeoff_expr::ExprError;
use takeoff_ledger::{
    ChainVerifier, EntryFilter, EntryRef, InMemoryLedger, IntegrityReport, LedgerEntry,
    LedgerEvent, LedgerReader, LedgerWriter, LiveQuantityProjection, RecordedResult,
};
use takeoff_types::{ElementId, FormulaId, ProjectId, ResultId};
use takeoff_units::Quantity;
use tracing::{debug, error, info, warn};

use crate::catalog::FormulaCatalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::store::{InMemoryResultStore, ResultStatus, ResultStore, StoredResult};

/// Outcome of one formula run for an element.
#[derive(Debug)]
pub struct FormulaOutcome {
    pub formula_id: FormulaId,
    pub result: Result<StoredResult, EngineError>,
    /// Ledger entry recording the attempt. For a recomputation this is the
    /// `recomputed` entry, and for a result the store refused it is the
    /// `retracted` entry. `None` only if the ledger write itself failed.
    pub entry: Option<EntryRef>,
}

impl FormulaOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A mismatch between the result store and the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFinding {
    pub result_id: ResultId,
    pub description: String,
}

/// Cross-check of live stored results against the project's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub project: ProjectId,
    pub live_results: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }
}

type CommitLock = Arc<Mutex<()>>;

/// How a successful calculation ended up recorded.
enum Recorded {
    Stored(StoredResult, EntryRef),
    /// The store failed after the ledger entry was written, and a
    /// `retracted` entry undid it.
    Retracted(EngineError, EntryRef),
}

/// Runs formulas for elements and records every attempt in the ledger.
///
/// Calculations run without any lock held. Recording takes a per-project
/// lock, checks that the result store will accept the result, appends to
/// the ledger with a compare-and-append that is retried when another writer
/// got there first, and only then commits to the store. A result is never
/// stored without its ledger entry, and a ledger entry whose result the
/// store still refused is followed by a `retracted` entry.
pub struct QuantityEngine<L, S = InMemoryResultStore> {
    config: EngineConfig,
    calculator: Calculator,
    ledger: L,
    store: S,
    commit_locks: Mutex<HashMap<ProjectId, CommitLock>>,
}

/// Engine backed entirely by memory.
pub type InMemoryEngine = QuantityEngine<InMemoryLedger, InMemoryResultStore>;

impl InMemoryEngine {
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, InMemoryLedger::new(), InMemoryResultStore::new())
    }
}

impl<L, S> QuantityEngine<L, S>
where
    L: LedgerWriter + LedgerReader,
    S: ResultStore,
{
    pub fn new(config: EngineConfig, ledger: L, store: S) -> Self {
        Self {
            calculator: config.calculator(),
            config,
            ledger,
            store,
            commit_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run every formula against the element's inputs.
    ///
    /// Each formula gets its own outcome and exactly one recorded attempt;
    /// a failing formula does not stop the others.
    pub fn calculate_for_element<'a, I>(
        &self,
        project: &ProjectId,
        element: &ElementId,
        inputs: &InputSet,
        formulas: I,
    ) -> Vec<FormulaOutcome>
    where
        I: IntoIterator<Item = &'a FormulaDefinition>,
    {
        formulas
            .into_iter()
            .map(|formula| self.run_formula(project, element, inputs, formula))
            .collect()
    }

    /// Run the catalog's formulas for the element's classification.
    pub fn calculate_for_classification(
        &self,
        project: &ProjectId,
        element: &ElementId,
        classification: &str,
        inputs: &InputSet,
        catalog: &FormulaCatalog,
    ) -> Vec<FormulaOutcome> {
        let formulas = catalog.for_classification(classification);
        if formulas.is_empty() {
            debug!(classification, "no formulas apply");
        }
        self.calculate_for_element(project, element, inputs, formulas)
    }

    pub fn get_ledger(&self, project: &ProjectId) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.ledger.read_all(project)?)
    }

    pub fn entries_for(
        &self,
        project: &ProjectId,
        filter: &EntryFilter,
    ) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.ledger.entries_for(project, filter)?)
    }

    pub fn verify_ledger(&self, project: &ProjectId) -> EngineResult<IntegrityReport> {
        Ok(ChainVerifier::verify_chain(&self.ledger, project)?)
    }

    pub fn live_result(
        &self,
        project: &ProjectId,
        element: &ElementId,
        formula: &FormulaId,
    ) -> EngineResult<Option<StoredResult>> {
        Ok(self.store.live(project, element, formula)?)
    }

    pub fn result_history(
        &self,
        project: &ProjectId,
        element: &ElementId,
        formula: &FormulaId,
    ) -> EngineResult<Vec<StoredResult>> {
        Ok(self.store.history(project, element, formula)?)
    }

    /// Check that every live stored result is the live result recorded in
    /// the ledger, with the same amount, unit and digest, and that the
    /// ledger records no live result the store lacks.
    pub fn audit_results(&self, project: &ProjectId) -> EngineResult<AuditReport> {
        let projection = LiveQuantityProjection::build(&self.ledger, project)?;
        let live = self.store.live_results(project)?;
        let mut findings = Vec::new();

        for stored in &live {
            let finding = |description: String| AuditFinding {
                result_id: stored.result_id,
                description,
            };
            let Some(recorded) = projection.get(&stored.element, stored.formula_id()) else {
                findings.push(finding("no live ledger entry records this result".into()));
                continue;
            };
            let recorded = &recorded.result;
            if recorded.result_id != stored.result_id {
                findings.push(finding(format!(
                    "ledger records result {} as live instead",
                    recorded.result_id
                )));
                continue;
            }
            if recorded.amount.to_bits() != stored.result.amount.to_bits()
                || recorded.unit != stored.result.unit
            {
                findings.push(finding(format!(
                    "stored {} {} but ledger records {} {}",
                    stored.result.amount, stored.result.unit, recorded.amount, recorded.unit
                )));
            }
            if recorded.result_digest != stored.result_digest
                || !ContentHasher::RESULT.verify_json(&stored.result, &stored.result_digest)?
            {
                findings.push(finding("result digest does not match".into()));
            }
        }

        for recorded in projection.iter() {
            if !live.iter().any(|s| s.result_id == recorded.result.result_id) {
                findings.push(AuditFinding {
                    result_id: recorded.result.result_id,
                    description: format!(
                        "ledger entry seq {} records a live result the store does not hold",
                        recorded.seq
                    ),
                });
            }
        }

        for finding in &findings {
            warn!(project = %project, result = %finding.result_id, "{}", finding.description);
        }
        Ok(AuditReport {
            project: project.clone(),
            live_results: live.len(),
            findings,
        })
    }

    fn run_formula(
        &self,
        project: &ProjectId,
        element: &ElementId,
        inputs: &InputSet,
        formula: &FormulaDefinition,
    ) -> FormulaOutcome {
        match self.calculator.calculate(formula, inputs) {
            Ok(result) => match self.record_success(project, element, result) {
                Ok(Recorded::Stored(stored, entry)) => FormulaOutcome {
                    formula_id: formula.id.clone(),
                    result: Ok(stored),
                    entry: Some(entry),
                },
                Ok(Recorded::Retracted(err, entry)) => FormulaOutcome {
                    formula_id: formula.id.clone(),
                    result: Err(err),
                    entry: Some(entry),
                },
                Err(err) => FormulaOutcome {
                    formula_id: formula.id.clone(),
                    result: Err(err),
                    entry: None,
                },
            },
            Err(failure) => {
                let event = failure_event(element, formula, inputs, &failure);
                warn!(project = %project, element = %element, "{failure}");
                match self.record(project, vec![event]) {
                    Ok(entries) => FormulaOutcome {
                        formula_id: formula.id.clone(),
                        result: Err(failure.into()),
                        entry: entries.last().map(LedgerEntry::to_ref),
                    },
                    Err(err) => FormulaOutcome {
                        formula_id: formula.id.clone(),
                        result: Err(err),
                        entry: None,
                    },
                }
            }
        }
    }

    fn record_success(
        &self,
        project: &ProjectId,
        element: &ElementId,
        result: CalculationResult,
    ) -> EngineResult<Recorded> {
        let result_digest = ContentHasher::RESULT.hash_json(&result)?;
        let result_id = ResultId::new();
        let recorded = RecordedResult {
            result_id,
            element: element.clone(),
            formula_id: result.formula_id.clone(),
            formula_version: result.formula_version,
            amount: result.amount,
            unit: result.unit,
            inputs: result.inputs.clone(),
            result_digest,
        };

        let lock = self.commit_lock(project)?;
        let _guard = lock
            .lock()
            .map_err(|_| StoreError::LockPoisoned("project commit lock"))?;

        let prior = self.store.live(project, element, &result.formula_id)?;
        let supersedes = prior.as_ref().map(|p| p.result_id);
        self.store.check_commit(project, result_id, supersedes)?;
        let events = match &prior {
            None => vec![LedgerEvent::Created(recorded)],
            Some(previous) => vec![
                LedgerEvent::Superseded {
                    result_id: previous.result_id,
                    element: element.clone(),
                    formula_id: result.formula_id.clone(),
                    recorded_in: previous.entry_id,
                    superseded_by: result_id,
                },
                LedgerEvent::Recomputed {
                    result: recorded,
                    replaces: previous.result_id,
                },
            ],
        };

        let entries = self.append_with_retry(project, events)?;
        let Some(entry) = entries.last().map(LedgerEntry::to_ref) else {
            return Err(EngineError::Internal("ledger accepted an empty batch".into()));
        };

        let stored = StoredResult {
            result_id,
            project: project.clone(),
            element: element.clone(),
            entry_id: entry.id,
            result,
            result_digest,
            status: ResultStatus::Live,
            superseded_by: None,
        };
        if let Err(err) = self.store.commit(stored.clone(), supersedes) {
            return self.retract(project, &stored, supersedes, err);
        }

        info!(
            project = %project,
            element = %element,
            formula = %stored.formula_id(),
            amount = stored.result.amount,
            seq = entry.seq,
            "quantity recorded"
        );
        Ok(Recorded::Stored(stored, entry))
    }

    /// Record that `stored` was written to the ledger but not to the store.
    /// Called with the project's commit lock held.
    fn retract(
        &self,
        project: &ProjectId,
        stored: &StoredResult,
        restores: Option<ResultId>,
        cause: StoreError,
    ) -> EngineResult<Recorded> {
        error!(
            project = %project,
            element = %stored.element,
            result = %stored.result_id,
            "{cause}, retracting ledger entry"
        );
        let event = LedgerEvent::Retracted {
            result_id: stored.result_id,
            element: stored.element.clone(),
            formula_id: stored.formula_id().clone(),
            restores,
            reason: cause.to_string(),
        };
        match self.append_with_retry(project, vec![event]) {
            Ok(entries) => match entries.last() {
                Some(entry) => Ok(Recorded::Retracted(cause.into(), entry.to_ref())),
                None => Err(cause.into()),
            },
            Err(err) => {
                error!(project = %project, result = %stored.result_id, "retraction not recorded: {err}");
                Err(cause.into())
            }
        }
    }

    /// Append under the project's commit lock.
    fn record(&self, project: &ProjectId, events: Vec<LedgerEvent>) -> EngineResult<Vec<LedgerEntry>> {
        let lock = self.commit_lock(project)?;
        let _guard = lock
            .lock()
            .map_err(|_| StoreError::LockPoisoned("project commit lock"))?;
        self.append_with_retry(project, events)
    }

    /// Compare-and-append at the current head, retrying lost races with a
    /// fresh sequence lookup.
    fn append_with_retry(
        &self,
        project: &ProjectId,
        events: Vec<LedgerEvent>,
    ) -> EngineResult<Vec<LedgerEntry>> {
        let attempts = self.config.append_attempts();
        for attempt in 1..=attempts {
            let expected = self.ledger.next_seq(project)?;
            match self.ledger.append_at(project, expected, events.clone()) {
                Ok(entries) => return Ok(entries),
                Err(err) if err.is_retryable() => {
                    warn!(project = %project, attempt, "{err}, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(EngineError::RetriesExhausted {
            project: project.clone(),
            attempts,
        })
    }

    fn commit_lock(&self, project: &ProjectId) -> Result<CommitLock, StoreError> {
        let mut locks = self
            .commit_locks
            .lock()
            .map_err(|_| StoreError::LockPoisoned("commit lock table"))?;
        Ok(locks.entry(project.clone()).or_default().clone())
    }
}

/// The ledger event recording a failed attempt.
fn failure_event(
    element: &ElementId,
    formula: &FormulaDefinition,
    inputs: &InputSet,
    failure: &CalcError,
) -> LedgerEvent {
    let element = element.clone();
    let formula_id = formula.id.clone();
    match failure {
        CalcError::Validation(invalid) => LedgerEvent::ValidationFailed {
            element,
            formula_id,
            issues: invalid.issues.iter().map(ToString::to_string).collect(),
            inputs: finite_inputs(inputs),
        },
        CalcError::Security { source, .. } => LedgerEvent::SecurityRejected {
            element,
            formula_id,
            expression: formula.expression.clone(),
            reason: source.to_string(),
        },
        CalcError::Definition { reason, .. } => LedgerEvent::SecurityRejected {
            element,
            formula_id,
            expression: formula.expression.clone(),
            reason: reason.clone(),
        },
        CalcError::Calculation { source, .. } => {
            let (reason, variables) = match source {
                ExprError::Calculation {
                    reason, variables, ..
                } => (reason.clone(), variables.clone()),
                other => (other.to_string(), BTreeMap::new()),
            };
            LedgerEvent::CalculationFailed {
                element,
                formula_id,
                reason,
                variables,
            }
        }
    }
}

/// Input snapshot for the ledger. JSON has no encoding for NaN or infinity.
fn finite_inputs(inputs: &InputSet) -> BTreeMap<String, Quantity> {
    inputs
        .iter()
        .filter(|(_, q)| q.value.is_finite())
        .map(|(name, q)| (name.to_string(), *q))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;
    use takeoff_calc::{InputConstraint, RequiredInput};
    use takeoff_ledger::{EventKind, LedgerError};
    use takeoff_types::EntryId;
    use takeoff_units::Unit;

    fn wall_area() -> FormulaDefinition {
        FormulaDefinition::new("wall-net-area", "length * height - opening_area", Unit::SquareMetre)
            .with_input(RequiredInput::new("length", Unit::Metre).with_constraint(InputConstraint::positive()))
            .with_input(RequiredInput::new("height", Unit::Metre).with_constraint(InputConstraint::positive()))
            .with_input(RequiredInput::new("opening_area", Unit::SquareMetre))
    }

    fn wall_inputs(length: f64) -> InputSet {
        InputSet::new()
            .with("length", length, Unit::Metre)
            .with("height", 3.0, Unit::Metre)
            .with("opening_area", 1.5, Unit::SquareMetre)
    }

    fn ids() -> (ProjectId, ElementId) {
        (ProjectId::new("tower-a"), ElementId::new("wall-01"))
    }

    #[test]
    fn success_records_created_entry_and_live_result() {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        let outcomes = engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &[wall_area()]);

        assert_eq!(outcomes.len(), 1);
        let stored = outcomes[0].result.as_ref().unwrap();
        assert_eq!(stored.result.amount, 13.5);
        assert_eq!(stored.result.unit, Unit::SquareMetre);
        assert_eq!(stored.result.steps.len(), 4);

        let ledger = engine.get_ledger(&p).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].kind, EventKind::Created);
        assert_eq!(ledger[0].id, stored.entry_id);
        assert_eq!(outcomes[0].entry.unwrap().seq, 1);

        let recorded = ledger[0].event.result().unwrap();
        assert_eq!(recorded.amount, 13.5);
        assert_eq!(recorded.result_digest, stored.result_digest);
    }

    #[test]
    fn recomputation_supersedes_without_deleting() {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        let formulas = [wall_area()];
        let first = engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &formulas);
        let second = engine.calculate_for_element(&p, &e, &wall_inputs(6.0), &formulas);
        let first = first[0].result.as_ref().unwrap();
        let second = second[0].result.as_ref().unwrap();

        let kinds: Vec<EventKind> = engine.get_ledger(&p).unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Created, EventKind::Superseded, EventKind::Recomputed]
        );

        let id = FormulaId::new("wall-net-area");
        let live = engine.live_result(&p, &e, &id).unwrap().unwrap();
        assert_eq!(live.result_id, second.result_id);
        assert_eq!(live.result.amount, 16.5);

        let history = engine.result_history(&p, &e, &id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].result_id, first.result_id);
        assert_eq!(history[0].superseded_by, Some(second.result_id));

        let superseded = engine
            .entries_for(&p, &EntryFilter::new().kind(EventKind::Superseded))
            .unwrap();
        match &superseded[0].event {
            LedgerEvent::Superseded {
                result_id,
                recorded_in,
                superseded_by,
                ..
            } => {
                assert_eq!(*result_id, first.result_id);
                assert_eq!(*recorded_in, first.entry_id);
                assert_eq!(*superseded_by, second.result_id);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(engine.verify_ledger(&p).unwrap().is_intact());
        assert!(engine.audit_results(&p).unwrap().is_consistent());
    }

    #[test]
    fn each_failure_kind_records_one_entry_and_others_continue() {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        let formulas = vec![
            wall_area(),
            FormulaDefinition::new("escape", "exec(1)", Unit::Each),
            FormulaDefinition::new("deficit", "length - 10", Unit::Metre)
                .with_input(RequiredInput::new("length", Unit::Metre)),
            FormulaDefinition::new("perimeter", "2 * (length + width)", Unit::Metre)
                .with_input(RequiredInput::new("length", Unit::Metre))
                .with_input(RequiredInput::new("width", Unit::Metre)),
        ];

        let outcomes = engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &formulas);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            outcomes[1].result,
            Err(EngineError::Calculation(CalcError::Security { .. }))
        ));
        assert!(matches!(
            outcomes[2].result,
            Err(EngineError::Calculation(CalcError::Calculation { .. }))
        ));
        assert!(matches!(
            outcomes[3].result,
            Err(EngineError::Calculation(CalcError::Validation(_)))
        ));
        assert!(outcomes.iter().all(|o| o.entry.is_some()));

        let ledger = engine.get_ledger(&p).unwrap();
        let kinds: Vec<EventKind> = ledger.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Created,
                EventKind::SecurityRejected,
                EventKind::CalculationFailed,
                EventKind::ValidationFailed,
            ]
        );

        match &ledger[1].event {
            LedgerEvent::SecurityRejected { expression, reason, .. } => {
                assert_eq!(expression, "exec(1)");
                assert!(reason.contains("exec"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &ledger[2].event {
            LedgerEvent::CalculationFailed { variables, .. } => {
                assert_eq!(variables.get("length"), Some(&5.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &ledger[3].event {
            LedgerEvent::ValidationFailed { issues, inputs, .. } => {
                assert_eq!(issues, &vec!["missing input 'width'".to_string()]);
                assert!(inputs.contains_key("length"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn non_finite_inputs_are_left_out_of_the_snapshot() {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        let inputs = wall_inputs(f64::NAN);
        let outcomes = engine.calculate_for_element(&p, &e, &inputs, &[wall_area()]);
        assert!(!outcomes[0].is_success());

        let ledger = engine.get_ledger(&p).unwrap();
        match &ledger[0].event {
            LedgerEvent::ValidationFailed { inputs, .. } => {
                assert!(!inputs.contains_key("length"));
                assert!(inputs.contains_key("height"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(engine.verify_ledger(&p).unwrap().is_intact());
    }

    #[test]
    fn classification_selects_catalog_formulas() {
        let limits = EngineConfig::default().parse_limits();
        let mut catalog = FormulaCatalog::new();
        catalog.insert(wall_area(), &limits).unwrap();
        catalog
            .insert(FormulaDefinition::new("door-count", "1", Unit::Each), &limits)
            .unwrap();
        catalog.assign("wall", FormulaId::new("wall-net-area")).unwrap();
        catalog.assign("door", FormulaId::new("door-count")).unwrap();

        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        let outcomes =
            engine.calculate_for_classification(&p, &e, "wall", &wall_inputs(5.0), &catalog);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].formula_id.as_str(), "wall-net-area");

        let none = engine.calculate_for_classification(&p, &e, "roof", &wall_inputs(5.0), &catalog);
        assert!(none.is_empty());
        assert_eq!(engine.get_ledger(&p).unwrap().len(), 1);
    }

    #[test]
    fn audit_flags_results_missing_from_the_ledger() {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &[wall_area()]);

        let result = Calculator::default().calculate(&wall_area(), &wall_inputs(4.0)).unwrap();
        let orphan = StoredResult {
            result_id: ResultId::new(),
            project: p.clone(),
            element: ElementId::new("wall-02"),
            entry_id: EntryId::new(),
            result_digest: ContentHasher::RESULT.hash_json(&result).unwrap(),
            result,
            status: ResultStatus::Live,
            superseded_by: None,
        };
        engine.store().commit(orphan.clone(), None).unwrap();

        let report = engine.audit_results(&p).unwrap();
        assert_eq!(report.live_results, 2);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].result_id, orphan.result_id);
    }

    #[test]
    fn audit_flags_an_edited_step_breakdown() {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &[wall_area()]);

        let mut results = engine.store().export().unwrap();
        results[0].result.steps[0].value += 1.0;
        let edited = QuantityEngine::new(
            EngineConfig::default(),
            InMemoryLedger::from_entries(engine.ledger().export().unwrap()),
            InMemoryResultStore::from_results(results),
        );

        let report = edited.audit_results(&p).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].description, "result digest does not match");
    }

    /// Lets another writer in ahead of the engine a fixed number of times.
    struct ContendedLedger {
        inner: InMemoryLedger,
        races: AtomicU32,
    }

    impl ContendedLedger {
        fn new(races: u32) -> Self {
            Self {
                inner: InMemoryLedger::new(),
                races: AtomicU32::new(races),
            }
        }
    }

    impl LedgerWriter for ContendedLedger {
        fn append(&self, project: &ProjectId, event: LedgerEvent) -> Result<LedgerEntry, LedgerError> {
            self.inner.append(project, event)
        }

        fn append_at(
            &self,
            project: &ProjectId,
            expected_seq: u64,
            events: Vec<LedgerEvent>,
        ) -> Result<Vec<LedgerEntry>, LedgerError> {
            let raced = self
                .races
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if raced {
                self.inner.append(
                    project,
                    LedgerEvent::SecurityRejected {
                        element: ElementId::new("other-writer"),
                        formula_id: FormulaId::new("noise"),
                        expression: "x;".into(),
                        reason: "lex".into(),
                    },
                )?;
            }
            self.inner.append_at(project, expected_seq, events)
        }
    }

    impl LedgerReader for ContendedLedger {
        fn head(&self, project: &ProjectId) -> Result<Option<EntryRef>, LedgerError> {
            self.inner.head(project)
        }

        fn read_all(&self, project: &ProjectId) -> Result<Vec<LedgerEntry>, LedgerError> {
            self.inner.read_all(project)
        }

        fn get(&self, project: &ProjectId, id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
            self.inner.get(project, id)
        }

        fn projects(&self) -> Result<Vec<ProjectId>, LedgerError> {
            self.inner.projects()
        }

        fn entry_count(&self, project: &ProjectId) -> Result<u64, LedgerError> {
            self.inner.entry_count(project)
        }
    }

    #[test]
    fn lost_races_are_retried_with_a_fresh_sequence() {
        let engine = QuantityEngine::new(
            EngineConfig::default(),
            ContendedLedger::new(2),
            InMemoryResultStore::new(),
        );
        let (p, e) = ids();
        let outcomes = engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &[wall_area()]);

        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[0].entry.unwrap().seq, 3);
        let ledger = engine.get_ledger(&p).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger[2].kind, EventKind::Created);
        assert!(engine.verify_ledger(&p).unwrap().is_intact());
    }

    #[test]
    fn exhausted_retries_surface_as_transient_and_store_nothing() {
        let config = EngineConfig {
            max_append_retries: 2,
            ..EngineConfig::default()
        };
        let engine = QuantityEngine::new(config, ContendedLedger::new(u32::MAX), InMemoryResultStore::new());
        let (p, e) = ids();
        let outcomes = engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &[wall_area()]);

        match &outcomes[0].result {
            Err(err @ EngineError::RetriesExhausted { attempts, .. }) => {
                assert_eq!(*attempts, 3);
                assert!(err.is_transient());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(outcomes[0].entry.is_none());
        assert!(engine.store().live_results(&p).unwrap().is_empty());
    }

    /// Result store whose backend can be switched to failing.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryResultStore,
        refuse_checks: AtomicBool,
        refuse_commits: AtomicBool,
    }

    impl FlakyStore {
        fn backend_error() -> StoreError {
            StoreError::Backend("disk full".into())
        }
    }

    impl ResultStore for FlakyStore {
        fn check_commit(
            &self,
            project: &ProjectId,
            result_id: ResultId,
            supersedes: Option<ResultId>,
        ) -> Result<(), StoreError> {
            if self.refuse_checks.load(Ordering::SeqCst) {
                return Err(Self::backend_error());
            }
            self.inner.check_commit(project, result_id, supersedes)
        }

        fn commit(&self, result: StoredResult, supersedes: Option<ResultId>) -> Result<(), StoreError> {
            if self.refuse_commits.load(Ordering::SeqCst) {
                return Err(Self::backend_error());
            }
            self.inner.commit(result, supersedes)
        }

        fn get(&self, project: &ProjectId, id: ResultId) -> Result<Option<StoredResult>, StoreError> {
            self.inner.get(project, id)
        }

        fn live(
            &self,
            project: &ProjectId,
            element: &ElementId,
            formula: &FormulaId,
        ) -> Result<Option<StoredResult>, StoreError> {
            self.inner.live(project, element, formula)
        }

        fn history(
            &self,
            project: &ProjectId,
            element: &ElementId,
            formula: &FormulaId,
        ) -> Result<Vec<StoredResult>, StoreError> {
            self.inner.history(project, element, formula)
        }

        fn live_results(&self, project: &ProjectId) -> Result<Vec<StoredResult>, StoreError> {
            self.inner.live_results(project)
        }
    }

    #[test]
    fn failed_store_commit_is_retracted_in_the_ledger() {
        let engine = QuantityEngine::new(EngineConfig::default(), InMemoryLedger::new(), FlakyStore::default());
        let (p, e) = ids();
        let formulas = [wall_area()];
        let first = engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &formulas);
        let first = first[0].result.as_ref().unwrap().clone();

        engine.store().refuse_commits.store(true, Ordering::SeqCst);
        let second = engine.calculate_for_element(&p, &e, &wall_inputs(6.0), &formulas);
        let fresh = engine.calculate_for_element(&p, &ElementId::new("wall-02"), &wall_inputs(4.0), &formulas);

        assert!(matches!(
            second[0].result,
            Err(EngineError::Store(StoreError::Backend(_)))
        ));
        assert_eq!(second[0].entry.unwrap().seq, 4);
        assert!(!fresh[0].is_success());
        assert_eq!(fresh[0].entry.unwrap().seq, 6);

        let kinds: Vec<EventKind> = engine.get_ledger(&p).unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Created,
                EventKind::Superseded,
                EventKind::Recomputed,
                EventKind::Retracted,
                EventKind::Created,
                EventKind::Retracted,
            ]
        );

        let id = FormulaId::new("wall-net-area");
        let live = engine.live_result(&p, &e, &id).unwrap().unwrap();
        assert_eq!(live.result_id, first.result_id);
        assert!(engine.live_result(&p, &ElementId::new("wall-02"), &id).unwrap().is_none());

        let projection = LiveQuantityProjection::build(engine.ledger(), &p).unwrap();
        assert_eq!(projection.len(), 1);
        assert_eq!(projection.get(&e, &id).unwrap().result.result_id, first.result_id);
        assert!(engine.verify_ledger(&p).unwrap().is_intact());
        assert!(engine.audit_results(&p).unwrap().is_consistent());
    }

    #[test]
    fn store_refusing_up_front_leaves_the_ledger_untouched() {
        let store = FlakyStore::default();
        store.refuse_checks.store(true, Ordering::SeqCst);
        let engine = QuantityEngine::new(EngineConfig::default(), InMemoryLedger::new(), store);
        let (p, e) = ids();
        let outcomes = engine.calculate_for_element(&p, &e, &wall_inputs(5.0), &[wall_area()]);

        assert!(matches!(
            outcomes[0].result,
            Err(EngineError::Store(StoreError::Backend(_)))
        ));
        assert!(outcomes[0].entry.is_none());
        assert!(engine.get_ledger(&p).unwrap().is_empty());
        assert!(engine.audit_results(&p).unwrap().is_consistent());
    }

    #[test]
    fn chain_with_a_missing_entry_is_refused_without_retrying() {
        let engine = InMemoryEngine::in_memory(EngineConfig::default());
        let (p, e) = ids();
        for length in [4.0, 5.0] {
            engine.calculate_for_element(&p, &e, &wall_inputs(length), &[wall_area()]);
        }
        let mut entries = engine.ledger().export().unwrap();
        entries.remove(1);

        let engine = QuantityEngine::new(
            EngineConfig::default(),
            InMemoryLedger::from_entries(entries),
            InMemoryResultStore::new(),
        );
        let outcomes =
            engine.calculate_for_element(&p, &ElementId::new("wall-02"), &wall_inputs(5.0), &[wall_area()]);

        match &outcomes[0].result {
            Err(err @ EngineError::Ledger(LedgerError::IntegrityViolation { seq: 3, .. })) => {
                assert!(!err.is_transient());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(outcomes[0].entry.is_none());
        let seqs: Vec<u64> = engine.get_ledger(&p).unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 3]);
        assert!(engine.store().live_results(&p).unwrap().is_empty());
    }
}
