//! Calculation lifecycle: submit, normalize, merge, notify.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

use calcflow_core::constants::{downstream, phases, GENERIC_CALCULATION_ERROR, INPUT_TRIGGER, SYSTEM_VALIDATION_ID};
use calcflow_core::downstream::{DataTokenUpdate, GeneratedDocument};
use calcflow_core::{
    normalize, CalcEngineRegistry, CalcError, CalculationError, CalculationInputs, RawTabDef, ResultMerger,
    StoreChange, StoreObserver, StoreSubject, TabDef, Validation,
};

use crate::api::{ApiClient, ApiRequest};
use crate::downstream::{CalculationSink, DocumentSink};
use crate::interfaces::{CalculationObserver, CalculationSnapshot, CalculationSubject};
use crate::state::ApplicationState;
use crate::transport::{CalcService, CalculationTransport, SubmitConfiguration};
use crate::ui_block::UiBlock;

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Idle,
    Submitting,
    Normalizing,
    Merging,
    /// The last calculation failed; the store holds the previous results.
    Failed,
}

/// How a call to [`CalculationCoordinator::calculate`] ended.
#[derive(Debug, Clone)]
pub enum CalculationOutcome {
    /// A `calculate_start` observer vetoed the run.
    Cancelled,
    /// No enabled service engine is configured; nothing was submitted.
    NoServiceEngines,
    Completed(StoreChange),
    Failed(CalculationError),
}

impl CalculationOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Holds the busy flag for the lifetime of the guard.
struct BusyFlag<'a>(&'a AtomicBool);

impl<'a> BusyFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives calculations against the configured engines and owns the state
/// the UI reads.
pub struct CalculationCoordinator {
    registry: RwLock<CalcEngineRegistry>,
    transport: CalculationTransport,
    configuration: SubmitConfiguration,
    state: RwLock<ApplicationState>,
    observers: CalculationSubject,
    store_observers: StoreSubject,
    ui_block: Arc<UiBlock>,
    busy: AtomicBool,
    phase: Mutex<CoordinatorPhase>,
    api: Option<Arc<dyn ApiClient>>,
    documents: Option<Arc<dyn DocumentSink>>,
}

impl CalculationCoordinator {
    #[must_use]
    pub fn new(registry: CalcEngineRegistry, service: Arc<dyn CalcService>, configuration: SubmitConfiguration) -> Self {
        Self {
            registry: RwLock::new(registry),
            transport: CalculationTransport::new(service),
            configuration,
            state: RwLock::new(ApplicationState::default()),
            observers: CalculationSubject::new(),
            store_observers: StoreSubject::new(),
            ui_block: Arc::new(UiBlock::new()),
            busy: AtomicBool::new(false),
            phase: Mutex::new(CoordinatorPhase::Idle),
            api: None,
            documents: None,
        }
    }

    #[must_use]
    pub fn with_inputs(self, inputs: CalculationInputs) -> Self {
        *self.state.write() = ApplicationState::with_inputs(inputs);
        self
    }

    #[must_use]
    pub fn with_api(mut self, api: Arc<dyn ApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    #[must_use]
    pub fn with_documents(mut self, documents: Arc<dyn DocumentSink>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Share a UI block with the host.
    #[must_use]
    pub fn with_ui_block(mut self, ui_block: Arc<UiBlock>) -> Self {
        self.ui_block = ui_block;
        self
    }

    pub fn register_observer(&self, observer: Arc<dyn CalculationObserver>) {
        self.observers.register(observer);
    }

    pub fn register_store_observer(&self, observer: Arc<dyn StoreObserver>) {
        self.store_observers.register(observer);
    }

    pub fn state(&self) -> RwLockReadGuard<'_, ApplicationState> {
        self.state.read()
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, CalcEngineRegistry> {
        self.registry.read()
    }

    #[must_use]
    pub fn configuration(&self) -> &SubmitConfiguration {
        &self.configuration
    }

    #[must_use]
    pub fn ui_block(&self) -> &Arc<UiBlock> {
        &self.ui_block
    }

    #[must_use]
    pub fn is_calculating(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn phase(&self) -> CoordinatorPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: CoordinatorPhase) {
        debug!(?phase, "coordinator phase");
        *self.phase.lock() = phase;
    }

    pub fn set_input(&self, name: &str, value: Option<String>) {
        self.state.write().inputs.set(name, value);
    }

    /// Run a calculation, naming the input that triggered it.
    ///
    /// The trigger is visible to the engines as `iInputTrigger` and cleared
    /// once the calculation succeeds.
    pub async fn calculate_with_trigger(&self, input: &str) -> Result<CalculationOutcome, CalcError> {
        self.set_input(INPUT_TRIGGER, Some(input.to_string()));
        self.calculate(None).await
    }

    /// Submit current inputs, overlaid with `custom`, to every enabled
    /// service engine and merge the results.
    ///
    /// Engine failures are not returned as `Err`: they leave the store
    /// untouched, add one generic error message, notify
    /// `calculation_errors` after `calculate_end`, and come back as
    /// [`CalculationOutcome::Failed`]. `Err` means the request could not be
    /// built at all.
    pub async fn calculate(&self, custom: Option<&CalculationInputs>) -> Result<CalculationOutcome, CalcError> {
        if self.registry.read().default_engine().is_none() {
            debug!("no enabled service CalcEngine; skipping calculation");
            return Ok(CalculationOutcome::NoServiceEngines);
        }

        let inputs = {
            let state = self.state.read();
            custom.map_or_else(|| state.inputs.clone(), |c| state.inputs.overlaid_with(c))
        };
        inputs.validate()?;

        if !self.observers.calculate_start(&inputs) {
            info!("calculation cancelled");
            return Ok(CalculationOutcome::Cancelled);
        }

        let outcome = {
            let _block = self.ui_block.block();
            let _busy = BusyFlag::raise(&self.busy);
            {
                let mut state = self.state.write();
                state.errors.clear();
                state.warnings.clear();
            }
            self.run(inputs).await
        };

        self.set_phase(if outcome.is_completed() {
            CoordinatorPhase::Idle
        } else {
            CoordinatorPhase::Failed
        });
        self.observers.calculate_end();
        if let CalculationOutcome::Failed(failure) = &outcome {
            self.observers
                .calculation_errors(phases::SUBMIT_CALCULATION, &CalcError::Calculation(failure.clone()));
        }
        Ok(outcome)
    }

    async fn run(&self, inputs: CalculationInputs) -> CalculationOutcome {
        let start = Instant::now();
        let registry = self.registry.read().clone();

        self.set_phase(CoordinatorPhase::Submitting);
        let raw = match self.transport.submit(&inputs, registry.engines(), &self.configuration).await {
            Ok(raw) => raw,
            Err(failure) => return self.fail(failure),
        };

        self.set_phase(CoordinatorPhase::Normalizing);
        let mut tab_defs = normalize(raw, &registry);
        self.observers.results_processing(&mut tab_defs, &inputs);

        self.set_phase(CoordinatorPhase::Merging);
        let change = self.merge(&registry, &tab_defs, &inputs, true).await;

        let snapshot = CalculationSnapshot {
            inputs,
            tab_defs,
            configuration: self.configuration.clone(),
            duration: start.elapsed(),
        };
        info!(
            tabs = snapshot.tab_defs.len(),
            changed = change.keys.len(),
            duration = ?snapshot.duration,
            "calculation complete"
        );
        self.observers.calculation(&snapshot);
        self.state.write().last_calculation = Some(snapshot);
        CalculationOutcome::Completed(change)
    }

    fn fail(&self, failure: CalculationError) -> CalculationOutcome {
        for engine in &failure.failures {
            error!(
                calc_engine = %engine.calc_engine,
                message = %engine.message,
                detail = engine.detail.as_deref().unwrap_or_default(),
                stack_trace = ?engine.stack_trace,
                configuration = %engine.configuration,
                inputs = %engine.inputs,
                "CalcEngine submission failed"
            );
        }
        self.state
            .write()
            .errors
            .push(Validation::new(SYSTEM_VALIDATION_ID, GENERIC_CALCULATION_ERROR));
        CalculationOutcome::Failed(failure)
    }

    /// Merge normalized tabs, then run the queued side effects: store
    /// notification, processing errors, document delivery, data tokens.
    ///
    /// Nothing outside the merger runs while the state lock is held.
    async fn merge(
        &self,
        registry: &CalcEngineRegistry,
        tab_defs: &[TabDef],
        inputs: &CalculationInputs,
        clear_trigger: bool,
    ) -> StoreChange {
        let sink = CalculationSink::new();
        let change = {
            let mut state = self.state.write();
            let change = ResultMerger::new(registry, &sink).merge(tab_defs, &mut state.merge_target());
            if clear_trigger {
                state.inputs.remove(INPUT_TRIGGER);
            }
            change
        };
        self.store_observers.notify(&change);

        for (phase, err) in sink.take_processing_errors() {
            self.observers.processing_error(&phase, &err);
        }
        for document in sink.take_documents() {
            if let Err(err) = self.deliver_document(&document) {
                warn!(phase = phases::PROCESS_DOCGEN_RESULTS, error = %err, "document delivery failed");
                self.observers
                    .processing_error(phases::PROCESS_DOCGEN_RESULTS, &err);
            }
        }
        for update in sink.take_data_updates() {
            if let Err(err) = self.push_data_update(&update, inputs).await {
                warn!(phase = phases::PROCESS_DATA_UPDATE_RESULTS, error = %err, "data update failed");
                self.observers
                    .processing_error(phases::PROCESS_DATA_UPDATE_RESULTS, &err);
            }
        }
        change
    }

    fn deliver_document(&self, document: &GeneratedDocument) -> Result<(), CalcError> {
        match self.documents.as_deref() {
            Some(sink) => sink.deliver(document),
            None => Err(CalcError::processing(
                phases::PROCESS_DOCGEN_RESULTS,
                format!("no download target for {}", document.file_name),
            )),
        }
    }

    async fn push_data_update(&self, update: &DataTokenUpdate, inputs: &CalculationInputs) -> Result<(), CalcError> {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| CalcError::Configuration("no API endpoint configured for data updates".into()))?;
        let request = ApiRequest::new(inputs, &self.configuration, serde_json::to_value(update)?);
        api.submit(downstream::JWT_UPDATE_COMMAND, &request).await?;
        info!(tokens = update.data_tokens.len(), "data updates pushed");
        Ok(())
    }

    /// Merge host-supplied results without calling the service.
    ///
    /// Engines are synthesized from the tabs' `@calcEngineKey` and
    /// registered, so the results resolve like any other engine's. Loading
    /// the same key again reuses its engine.
    pub async fn load_manual_results(&self, mut raw: Vec<RawTabDef>) -> Result<StoreChange, CalcError> {
        let registry = {
            let mut registry = self.registry.write();
            let engines = registry.to_calc_engines(&raw)?;
            info!(engines = engines.len(), tabs = raw.len(), "loading manual results");
            registry.register_manual(engines)?;
            registry.clone()
        };
        for tab in &mut raw {
            let name = tab
                .calc_engine_key()
                .and_then(|key| registry.by_key(key))
                .map(|ce| ce.name.clone());
            if let Some(name) = name {
                tab.set_attribute("@calcEngine", &name);
            }
        }

        let inputs = self.state.read().inputs.clone();
        let tab_defs = normalize(raw, &registry);
        Ok(self.merge(&registry, &tab_defs, &inputs, false).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CalculationRequest, CalculationResponse, ServiceFault};
    use calcflow_core::CalcEngine;
    use futures::future::BoxFuture;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    struct StaticService {
        body: Value,
        calls: AtomicUsize,
        saw_block: AtomicBool,
        ui_block: Arc<UiBlock>,
    }

    impl CalcService for StaticService {
        fn calculate<'a>(
            &'a self,
            _request: &'a CalculationRequest,
        ) -> BoxFuture<'a, Result<CalculationResponse, ServiceFault>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.saw_block.store(self.ui_block.is_blocked(), Ordering::SeqCst);
                serde_json::from_value(self.body.clone()).map_err(|e| ServiceFault::new(e.to_string()))
            })
        }
    }

    fn service(body: Value, ui_block: &Arc<UiBlock>) -> Arc<StaticService> {
        Arc::new(StaticService {
            body,
            calls: AtomicUsize::new(0),
            saw_block: AtomicBool::new(false),
            ui_block: ui_block.clone(),
        })
    }

    fn coordinator(service: Arc<StaticService>, ui_block: Arc<UiBlock>) -> CalculationCoordinator {
        let registry = CalcEngineRegistry::new(vec![CalcEngine::new("Main", "Main_SE", "RBLResult")]).unwrap();
        CalculationCoordinator::new(registry, service, SubmitConfiguration::default()).with_ui_block(ui_block)
    }

    #[tokio::test]
    async fn success_merges_and_clears_trigger() {
        let ui = Arc::new(UiBlock::new());
        let svc = service(
            json!({"RBL": {"Profile": {"Data": {"TabDef": {
                "@calcEngine": "Main_SE", "@name": "RBLResult",
                "rbl-value": [{"@id": "total", "value": "42"}]
            }}}}}),
            &ui,
        );
        let coordinator = coordinator(svc.clone(), ui.clone());

        let outcome = coordinator.calculate_with_trigger("iAge").await.unwrap();

        assert!(outcome.is_completed());
        assert!(svc.saw_block.load(Ordering::SeqCst));
        assert!(!ui.is_blocked());
        assert!(!coordinator.is_calculating());
        assert_eq!(coordinator.phase(), CoordinatorPhase::Idle);
        let state = coordinator.state();
        assert_eq!(state.store.row_count(), 1);
        assert_eq!(state.inputs.get(INPUT_TRIGGER), None);
        assert!(state.last_calculation.is_some());
    }

    #[tokio::test]
    async fn failure_leaves_store_and_adds_generic_error() {
        let ui = Arc::new(UiBlock::new());
        let svc = service(json!({"Exception": {"Message": "boom"}}), &ui);
        let coordinator = coordinator(svc, ui.clone());

        let outcome = coordinator.calculate(None).await.unwrap();

        assert!(matches!(outcome, CalculationOutcome::Failed(_)));
        assert_eq!(coordinator.phase(), CoordinatorPhase::Failed);
        assert!(!ui.is_blocked());
        let state = coordinator.state();
        assert!(state.store.is_empty());
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].id, SYSTEM_VALIDATION_ID);
        assert_eq!(state.errors[0].text, GENERIC_CALCULATION_ERROR);
    }

    #[tokio::test]
    async fn no_service_engines_skips_submission() {
        let ui = Arc::new(UiBlock::new());
        let svc = service(json!({}), &ui);
        let mut manual = CalcEngine::new("M", "Manual_SE", "RBLResult");
        manual.manual_result = true;
        let coordinator = CalculationCoordinator::new(
            CalcEngineRegistry::new(vec![manual]).unwrap(),
            svc.clone(),
            SubmitConfiguration::default(),
        );
        let outcome = coordinator.calculate(None).await.unwrap();
        assert!(matches!(outcome, CalculationOutcome::NoServiceEngines));
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_input_tables_are_rejected_before_submit() {
        let ui = Arc::new(UiBlock::new());
        let svc = service(json!({}), &ui);
        let coordinator = coordinator(svc.clone(), ui);
        let mut custom = CalculationInputs::new();
        let mut table = calcflow_core::InputTable::new("dependents");
        table.rows.push(serde_json::Map::new());
        custom.tables.push(table);

        let err = coordinator.calculate(Some(&custom)).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    /// Reads coordinator state from inside merge callbacks.
    #[derive(Default)]
    struct StateReader {
        coordinator: OnceLock<Weak<CalculationCoordinator>>,
        reads: Mutex<Vec<(&'static str, bool)>>,
    }

    impl StateReader {
        fn record(&self, hook: &'static str) {
            let readable = self
                .coordinator
                .get()
                .and_then(Weak::upgrade)
                .is_some_and(|c| c.state.try_read_for(Duration::from_secs(1)).is_some());
            self.reads.lock().push((hook, readable));
        }
    }

    impl CalculationObserver for StateReader {
        fn on_processing_error(&self, _phase: &str, _error: &CalcError) {
            self.record("processing_error");
        }
    }

    impl DocumentSink for StateReader {
        fn deliver(&self, _document: &GeneratedDocument) -> Result<(), CalcError> {
            self.record("deliver");
            Ok(())
        }
    }

    #[tokio::test]
    async fn merge_callbacks_can_read_state() {
        let ui = Arc::new(UiBlock::new());
        let svc = service(
            json!({"RBL": {"Profile": {"Data": {"TabDef": {
                "@calcEngine": "Main_SE", "@name": "RBLResult",
                "rbl-defaults": [{"value": "orphan"}],
                "api-actions": [{"@id": "d", "action": "DocGen", "content": "aGk=", "file-name": "a.pdf"}]
            }}}}}),
            &ui,
        );
        let reader = Arc::new(StateReader::default());
        let coordinator = Arc::new(coordinator(svc, ui).with_documents(reader.clone()));
        reader.coordinator.set(Arc::downgrade(&coordinator)).unwrap();
        coordinator.register_observer(reader.clone());

        let outcome = coordinator.calculate(None).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(*reader.reads.lock(), [("processing_error", true), ("deliver", true)]);
    }
}
