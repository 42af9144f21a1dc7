//! Shared fixtures for the cross-crate integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};

use calcflow_core::downstream::GeneratedDocument;
use calcflow_core::{CalcEngine, CalcEngineRegistry, CalcError, CalculationInputs, Row, StoreChange, StoreObserver, TabDef};
use calcflow_orchestration::transport::{CalculationRequest, CalculationResponse, ServiceFault};
use calcflow_orchestration::{
    ApiClient, ApiRequest, CalcService, CalculationCoordinator, CalculationObserver, CalculationSnapshot,
    DocumentSink, SubmitConfiguration,
};

/// Wrap tab defs in a calculation response body.
#[must_use]
pub fn response(tab_defs: Value) -> Value {
    json!({
        "Diagnostics": {"CalcEngineVersion": "1.0", "Elapsed": 12},
        "RBL": {"Profile": {"Data": {"TabDef": tab_defs}}}
    })
}

/// Response body carrying an engine exception.
#[must_use]
pub fn exception(message: &str) -> Value {
    json!({"Exception": {"Message": message, "StackTrace": "at Engine.Calculate()\nat Service.Run()"}})
}

#[must_use]
pub fn rows(value: Value) -> Vec<Row> {
    serde_json::from_value(value).unwrap_or_default()
}

#[must_use]
pub fn engine(key: &str, name: &str, tabs: &[&str]) -> CalcEngine {
    let mut ce = CalcEngine::new(key, name, tabs.first().copied().unwrap_or("RBLResult"));
    ce.result_tabs = tabs.iter().map(|t| (*t).to_string()).collect();
    ce
}

#[derive(Debug, Clone)]
enum Script {
    Respond(Value),
    Unreachable(String),
}

/// In-memory [`CalcService`] answering per engine name.
///
/// Engines without a script get an `Exception` response.
#[derive(Default)]
pub struct ScriptedCalcService {
    scripts: Mutex<BTreeMap<String, Script>>,
    requests: Mutex<Vec<CalculationRequest>>,
}

impl ScriptedCalcService {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reply to `engine` with this response body from now on.
    pub fn respond(&self, engine: &str, body: Value) {
        self.scripts.lock().insert(engine.to_string(), Script::Respond(body));
    }

    /// Make `engine` fail as if the network call errored.
    pub fn unreachable(&self, engine: &str, message: &str) {
        self.scripts
            .lock()
            .insert(engine.to_string(), Script::Unreachable(message.to_string()));
    }

    #[must_use]
    pub fn requests(&self) -> Vec<CalculationRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl CalcService for ScriptedCalcService {
    fn calculate<'a>(&'a self, request: &'a CalculationRequest) -> BoxFuture<'a, Result<CalculationResponse, ServiceFault>> {
        Box::pin(async move {
            self.requests.lock().push(request.clone());
            let script = self.scripts.lock().get(&request.configuration.calc_engine).cloned();
            match script {
                Some(Script::Respond(body)) => {
                    serde_json::from_value(body).map_err(|e| ServiceFault::new(format!("bad scripted body: {e}")))
                }
                Some(Script::Unreachable(message)) => Err(ServiceFault::new(message)),
                None => serde_json::from_value(exception("no script for engine"))
                    .map_err(|e| ServiceFault::new(e.to_string())),
            }
        })
    }
}

/// Lifecycle event as seen by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CalculateStart,
    ResultsProcessing(usize),
    Calculation,
    CalculateEnd,
    CalculationErrors(String),
    ProcessingError(String),
    StoreChanged(Vec<String>),
}

type Injector = Box<dyn Fn(&mut Vec<TabDef>) + Send + Sync>;

/// Records every lifecycle and store event in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
    messages: Mutex<Vec<String>>,
    snapshots: Mutex<Vec<CalculationSnapshot>>,
    veto: bool,
    injector: Option<Injector>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Observer that cancels every calculation.
    #[must_use]
    pub fn vetoing() -> Arc<Self> {
        Arc::new(Self {
            veto: true,
            ..Self::default()
        })
    }

    /// Observer that rewrites results before they are merged.
    #[must_use]
    pub fn injecting(injector: impl Fn(&mut Vec<TabDef>) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            injector: Some(Box::new(injector)),
            ..Self::default()
        })
    }

    /// Register for lifecycle and store events.
    pub fn attach(self: &Arc<Self>, coordinator: &CalculationCoordinator) {
        coordinator.register_observer(self.clone());
        coordinator.register_store_observer(self.clone());
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Messages of errors passed to `calculation_errors` and `processing_error`.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<CalculationSnapshot> {
        self.snapshots.lock().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl CalculationObserver for RecordingObserver {
    fn on_calculate_start(&self, _inputs: &CalculationInputs) -> bool {
        self.push(Event::CalculateStart);
        !self.veto
    }

    fn on_results_processing(&self, tab_defs: &mut Vec<TabDef>, _inputs: &CalculationInputs) {
        if let Some(inject) = &self.injector {
            inject(tab_defs);
        }
        self.push(Event::ResultsProcessing(tab_defs.len()));
    }

    fn on_calculation(&self, snapshot: &CalculationSnapshot) {
        self.snapshots.lock().push(snapshot.clone());
        self.push(Event::Calculation);
    }

    fn on_calculate_end(&self) {
        self.push(Event::CalculateEnd);
    }

    fn on_calculation_errors(&self, phase: &str, error: &CalcError) {
        self.messages.lock().push(error.to_string());
        self.push(Event::CalculationErrors(phase.to_string()));
    }

    fn on_processing_error(&self, phase: &str, error: &CalcError) {
        self.messages.lock().push(error.to_string());
        self.push(Event::ProcessingError(phase.to_string()));
    }
}

impl StoreObserver for RecordingObserver {
    fn on_store_changed(&self, change: &StoreChange) {
        self.push(Event::StoreChanged(change.keys.iter().cloned().collect()));
    }
}

/// [`ApiClient`] that records commands and optionally fails them.
#[derive(Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<(String, ApiRequest)>>,
    fail: bool,
}

impl RecordingApi {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn calls(&self) -> Vec<(String, ApiRequest)> {
        self.calls.lock().clone()
    }
}

impl ApiClient for RecordingApi {
    fn submit<'a>(&'a self, command: &'a str, request: &'a ApiRequest) -> BoxFuture<'a, Result<Value, CalcError>> {
        Box::pin(async move {
            self.calls.lock().push((command.to_string(), request.clone()));
            if self.fail {
                Err(CalcError::Transport(format!("{command} returned 503")))
            } else {
                Ok(Value::Null)
            }
        })
    }
}

/// [`DocumentSink`] that keeps documents in memory.
#[derive(Default)]
pub struct RecordingDocuments {
    documents: Mutex<Vec<GeneratedDocument>>,
}

impl RecordingDocuments {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn documents(&self) -> Vec<GeneratedDocument> {
        self.documents.lock().clone()
    }
}

impl DocumentSink for RecordingDocuments {
    fn deliver(&self, document: &GeneratedDocument) -> Result<(), CalcError> {
        self.documents.lock().push(document.clone());
        Ok(())
    }
}

/// Coordinator over `engines` backed by `service`.
///
/// # Panics
///
/// Panics if `engines` repeats a key.
#[must_use]
pub fn coordinator(engines: Vec<CalcEngine>, service: &Arc<ScriptedCalcService>) -> CalculationCoordinator {
    let registry = CalcEngineRegistry::new(engines).unwrap_or_else(|e| panic!("invalid fixture engines: {e}"));
    CalculationCoordinator::new(registry, service.clone(), SubmitConfiguration::default())
}
