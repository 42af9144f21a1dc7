//! Concurrent per-engine submission and failure aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use calcflow_core::{CalcEngine, CalculationError, CalculationInputs, EngineFailure, InputTable, RawTabDef};

/// Service-wide fields of the request `Configuration` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitConfiguration {
    #[serde(rename = "TraceEnabled")]
    pub trace_enabled: bool,
    #[serde(rename = "SaveCE", skip_serializing_if = "Option::is_none")]
    pub save_ce: Option<String>,
    #[serde(rename = "RefreshCalcEngine")]
    pub refresh_calc_engine: bool,
    #[serde(rename = "AuthID", skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    #[serde(rename = "Client", skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(rename = "TestCE")]
    pub test_ce: bool,
    #[serde(rename = "CurrentPage", skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    #[serde(rename = "RequestIP", skip_serializing_if = "Option::is_none")]
    pub request_ip: Option<String>,
    #[serde(rename = "CurrentUICulture")]
    pub current_ui_culture: String,
    #[serde(rename = "Environment", skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(rename = "Framework")]
    pub framework: String,
    #[serde(rename = "Token", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for SubmitConfiguration {
    fn default() -> Self {
        Self {
            trace_enabled: false,
            save_ce: None,
            refresh_calc_engine: false,
            auth_id: None,
            client: None,
            test_ce: false,
            current_page: None,
            request_ip: None,
            current_ui_culture: "en-US".to_string(),
            environment: None,
            framework: "calcflow".to_string(),
            token: None,
        }
    }
}

/// Full `Configuration` block for one engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestConfiguration {
    #[serde(rename = "CalcEngine")]
    pub calc_engine: String,
    #[serde(rename = "InputTab")]
    pub input_tab: String,
    #[serde(rename = "ResultTabs")]
    pub result_tabs: Vec<String>,
    #[serde(rename = "PreCalcs", skip_serializing_if = "Option::is_none")]
    pub pre_calcs: Option<String>,
    #[serde(flatten)]
    pub shared: SubmitConfiguration,
}

/// Body of one calculation POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CalculationRequest {
    pub inputs: BTreeMap<String, String>,
    pub input_tables: Vec<InputTable>,
    pub configuration: RequestConfiguration,
}

impl CalculationRequest {
    /// Shared inputs plus the engine-specific configuration overrides.
    #[must_use]
    pub fn for_engine(engine: &CalcEngine, inputs: &CalculationInputs, configuration: &SubmitConfiguration) -> Self {
        Self {
            inputs: inputs.wire_values(),
            input_tables: inputs.tables.clone(),
            configuration: RequestConfiguration {
                calc_engine: engine.name.clone(),
                input_tab: engine.input_tab.clone(),
                result_tabs: engine.result_tabs.clone(),
                pre_calcs: engine.pre_calcs.clone(),
                shared: configuration.clone(),
            },
        }
    }
}

/// Engine-level exception reported inside a successful HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceException {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TabDefPayload {
    Many(Vec<RawTabDef>),
    One(RawTabDef),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RblData {
    #[serde(rename = "TabDef", default)]
    pub tab_def: Option<TabDefPayload>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RblProfile {
    #[serde(rename = "Data")]
    pub data: RblData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RblResults {
    #[serde(rename = "Profile")]
    pub profile: RblProfile,
}

/// Calculation response body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CalculationResponse {
    /// Timing and trace information, for logging only.
    #[serde(rename = "Diagnostics", default)]
    pub diagnostics: Option<Value>,
    #[serde(rename = "Exception", default)]
    pub exception: Option<ServiceException>,
    #[serde(rename = "RBL", default)]
    pub rbl: Option<RblResults>,
}

impl CalculationResponse {
    /// Extract the tab defs; an `Exception` block is a failure even on success status.
    pub fn into_tab_defs(self) -> Result<Vec<RawTabDef>, ServiceFault> {
        if let Some(exception) = self.exception {
            return Err(ServiceFault::from(exception));
        }
        let rbl = self
            .rbl
            .ok_or_else(|| ServiceFault::new("calculation response did not contain RBL results"))?;
        Ok(match rbl.profile.data.tab_def {
            Some(TabDefPayload::Many(tabs)) => tabs,
            Some(TabDefPayload::One(tab)) => vec![tab],
            None => Vec::new(),
        })
    }
}

/// Failure of one engine call, before request context is attached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ServiceFault {
    pub message: String,
    pub detail: Option<String>,
    pub stack_trace: Vec<String>,
}

impl ServiceFault {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            stack_trace: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn into_failure(self, request: &CalculationRequest) -> EngineFailure {
        let mut configuration = serde_json::to_value(&request.configuration).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut configuration {
            map.remove("Token");
        }
        EngineFailure {
            calc_engine: request.configuration.calc_engine.clone(),
            message: self.message,
            detail: self.detail,
            stack_trace: self.stack_trace,
            configuration,
            inputs: serde_json::to_value(&request.inputs).unwrap_or(Value::Null),
        }
    }
}

impl From<ServiceException> for ServiceFault {
    fn from(exception: ServiceException) -> Self {
        Self {
            message: exception.message,
            detail: None,
            stack_trace: exception
                .stack_trace
                .as_deref()
                .map(|s| s.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
                .unwrap_or_default(),
        }
    }
}

/// Remote calculation service.
pub trait CalcService: Send + Sync {
    /// Submit one engine's calculation.
    fn calculate<'a>(&'a self, request: &'a CalculationRequest) -> BoxFuture<'a, Result<CalculationResponse, ServiceFault>>;
}

/// Submits enabled service engines concurrently.
#[derive(Clone)]
pub struct CalculationTransport {
    service: Arc<dyn CalcService>,
}

impl CalculationTransport {
    #[must_use]
    pub fn new(service: Arc<dyn CalcService>) -> Self {
        Self { service }
    }

    /// Submit every enabled, non-manual engine and wait for all of them.
    ///
    /// Results are concatenated in registry order. Any failure discards all
    /// results and yields one aggregate error listing every failed engine.
    pub async fn submit(
        &self,
        inputs: &CalculationInputs,
        engines: &[CalcEngine],
        configuration: &SubmitConfiguration,
    ) -> Result<Vec<RawTabDef>, CalculationError> {
        let submissions = engines
            .iter()
            .filter(|ce| ce.is_service_engine())
            .map(|ce| self.submit_engine(ce, inputs, configuration));
        reduce_outcomes(join_all(submissions).await)
    }

    async fn submit_engine(
        &self,
        engine: &CalcEngine,
        inputs: &CalculationInputs,
        configuration: &SubmitConfiguration,
    ) -> Result<Vec<RawTabDef>, EngineFailure> {
        let request = CalculationRequest::for_engine(engine, inputs, configuration);
        debug!(calc_engine = %engine.name, key = %engine.key, "submitting calculation");

        let start = Instant::now();
        let outcome = match self.service.calculate(&request).await {
            Ok(response) => {
                if let Some(diagnostics) = &response.diagnostics {
                    debug!(calc_engine = %engine.name, %diagnostics, "calculation diagnostics");
                }
                response.into_tab_defs()
            }
            Err(fault) => Err(fault),
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(tabs) => {
                debug!(calc_engine = %engine.name, tabs = tabs.len(), ?elapsed, "calculation complete");
                Ok(tabs)
            }
            Err(fault) => {
                warn!(calc_engine = %engine.name, message = %fault.message, ?elapsed, "calculation failed");
                Err(fault.into_failure(&request))
            }
        }
    }
}

/// All-or-nothing reduction of per-engine outcomes.
pub fn reduce_outcomes(
    outcomes: Vec<Result<Vec<RawTabDef>, EngineFailure>>,
) -> Result<Vec<RawTabDef>, CalculationError> {
    let mut tabs = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(mut engine_tabs) => tabs.append(&mut engine_tabs),
            Err(failure) => failures.push(failure),
        }
    }
    if failures.is_empty() {
        Ok(tabs)
    } else {
        Err(CalculationError::new(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    /// Replies per engine name; records the order calls started and finished.
    struct FakeService {
        delays: BTreeMap<String, u64>,
        failing: Vec<String>,
        started: Mutex<Vec<String>>,
        finished: Mutex<Vec<String>>,
    }

    impl FakeService {
        fn new(failing: &[&str]) -> Self {
            Self {
                delays: BTreeMap::new(),
                failing: failing.iter().map(|s| (*s).to_string()).collect(),
                started: Mutex::new(Vec::new()),
                finished: Mutex::new(Vec::new()),
            }
        }
    }

    impl CalcService for FakeService {
        fn calculate<'a>(
            &'a self,
            request: &'a CalculationRequest,
        ) -> BoxFuture<'a, Result<CalculationResponse, ServiceFault>> {
            Box::pin(async move {
                let name = request.configuration.calc_engine.clone();
                self.started.lock().push(name.clone());
                if let Some(ms) = self.delays.get(&name) {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                }
                self.finished.lock().push(name.clone());
                if self.failing.contains(&name) {
                    return Ok(serde_json::from_value(json!({
                        "Exception": {"Message": format!("{name} blew up"), "StackTrace": "at A\n at B"}
                    }))
                    .unwrap());
                }
                Ok(serde_json::from_value(json!({
                    "Diagnostics": {"CalcEngineVersion": "1"},
                    "RBL": {"Profile": {"Data": {"TabDef": [
                        {"@calcEngine": name, "@name": "RBLResult"},
                        {"@calcEngine": name, "@name": "RBLChart"}
                    ]}}}
                }))
                .unwrap())
            })
        }
    }

    fn engines() -> Vec<CalcEngine> {
        let mut manual = CalcEngine::new("M1", "Manual_SE", "RBLResult");
        manual.manual_result = true;
        let mut disabled = CalcEngine::new("Off", "Off_SE", "RBLResult");
        disabled.enabled = false;
        vec![
            CalcEngine::new("Main", "Main_SE", "RBLResult"),
            manual,
            disabled,
            CalcEngine::new("Secondary", "Secondary_SE", "RBLResult"),
        ]
    }

    #[test]
    fn request_carries_engine_overrides() {
        let mut ce = CalcEngine::new("Main", "Main_SE", "RBLResult");
        ce.pre_calcs = Some("iAge=65".into());
        let inputs = CalculationInputs::new().with("iAge", "40");
        let request = CalculationRequest::for_engine(&ce, &inputs, &SubmitConfiguration::default());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["Inputs"]["iAge"], "40");
        assert_eq!(body["Configuration"]["CalcEngine"], "Main_SE");
        assert_eq!(body["Configuration"]["InputTab"], "RBLInput");
        assert_eq!(body["Configuration"]["ResultTabs"], json!(["RBLResult"]));
        assert_eq!(body["Configuration"]["PreCalcs"], "iAge=65");
        assert_eq!(body["Configuration"]["CurrentUICulture"], "en-US");
        assert!(body["Configuration"].get("Token").is_none());
    }

    #[test]
    fn single_tab_def_is_wrapped() {
        let response: CalculationResponse = serde_json::from_value(json!({
            "RBL": {"Profile": {"Data": {"TabDef": {"@calcEngine": "Main_SE", "@name": "RBLResult"}}}}
        }))
        .unwrap();
        assert_eq!(response.into_tab_defs().unwrap().len(), 1);
    }

    #[test]
    fn exception_is_a_failure() {
        let response: CalculationResponse = serde_json::from_value(json!({
            "Exception": {"Message": "bad input", "StackTrace": "at X\n\n  at Y"},
            "RBL": {"Profile": {"Data": {"TabDef": []}}}
        }))
        .unwrap();
        let fault = response.into_tab_defs().unwrap_err();
        assert_eq!(fault.message, "bad input");
        assert_eq!(fault.stack_trace, ["at X", "at Y"]);
    }

    #[test]
    fn missing_rbl_is_a_failure() {
        assert!(CalculationResponse::default().into_tab_defs().is_err());
    }

    #[tokio::test]
    async fn submits_only_service_engines_in_registry_order() {
        let mut service = FakeService::new(&[]);
        service.delays.insert("Main_SE".into(), 30);
        let service = Arc::new(service);
        let transport = CalculationTransport::new(service.clone());

        let tabs = transport
            .submit(&CalculationInputs::new(), &engines(), &SubmitConfiguration::default())
            .await
            .unwrap();

        assert_eq!(tabs.len(), 4);
        assert_eq!(tabs[0].calc_engine(), Some("Main_SE"));
        assert_eq!(tabs[1].name(), Some("RBLChart"));
        assert_eq!(tabs[2].calc_engine(), Some("Secondary_SE"));
        assert_eq!(service.started.lock().as_slice(), ["Main_SE", "Secondary_SE"]);
        // Secondary finished first: the calls ran concurrently.
        assert_eq!(service.finished.lock().as_slice(), ["Secondary_SE", "Main_SE"]);
    }

    #[tokio::test]
    async fn failure_waits_for_every_engine() {
        let mut service = FakeService::new(&["Main_SE"]);
        service.delays.insert("Secondary_SE".into(), 20);
        let service = Arc::new(service);
        let transport = CalculationTransport::new(service.clone());
        let inputs = CalculationInputs::new().with("iAge", "40");

        let err = transport
            .submit(&inputs, &engines(), &SubmitConfiguration::default())
            .await
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        let failure = &err.failures[0];
        assert_eq!(failure.calc_engine, "Main_SE");
        assert_eq!(failure.message, "Main_SE blew up");
        assert_eq!(failure.stack_trace.len(), 2);
        assert_eq!(failure.inputs["iAge"], "40");
        assert_eq!(failure.configuration["CalcEngine"], "Main_SE");
        assert_eq!(service.finished.lock().len(), 2);
    }

    #[tokio::test]
    async fn every_failure_is_reported() {
        let transport = CalculationTransport::new(Arc::new(FakeService::new(&["Main_SE", "Secondary_SE"])));
        let err = transport
            .submit(&CalculationInputs::new(), &engines(), &SubmitConfiguration::default())
            .await
            .unwrap_err();
        assert_eq!(err.engines().collect::<Vec<_>>(), ["Main_SE", "Secondary_SE"]);
    }

    #[test]
    fn reduce_empty_is_success() {
        assert!(reduce_outcomes(Vec::new()).unwrap().is_empty());
    }
}
