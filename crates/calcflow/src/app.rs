//! Application entry point and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::info;

use calcflow_cli::output::write_to_file;
use calcflow_cli::{CLICalculationReporter, CLIResultPresenter};
use calcflow_core::constants::exit_codes;
use calcflow_core::observers::LoggingStoreObserver;
use calcflow_core::{CalcEngine, CalcEngineRegistry, CalcError, CalculationInputs, RawTabDef};
use calcflow_orchestration::transport::{CalculationRequest, CalculationResponse, ServiceFault};
use calcflow_orchestration::{
    CalcService, CalculationCoordinator, CalculationOutcome, DirectoryDocumentSink, HttpApiClient, HttpCalcService,
    ResultPresenter,
};

use crate::config::AppConfig;

/// Stands in when no endpoint is configured; every call fails.
struct OfflineService;

impl CalcService for OfflineService {
    fn calculate<'a>(&'a self, _request: &'a CalculationRequest) -> BoxFuture<'a, Result<CalculationResponse, ServiceFault>> {
        Box::pin(async { Err::<CalculationResponse, _>(ServiceFault::new("no calculation endpoint configured")) })
    }
}

/// Run the application, returning the process exit code.
pub async fn run(config: &AppConfig) -> Result<i32> {
    if let Some(shell) = config.completion {
        let mut cmd = <AppConfig as clap::CommandFactory>::command();
        calcflow_cli::completion::generate_completion(&mut cmd, shell, &mut std::io::stdout());
        return Ok(exit_codes::SUCCESS);
    }

    let engines = match &config.engines {
        Some(path) => load_engines(path).with_context(|| format!("loading engines from {path}"))?,
        None => Vec::new(),
    };
    let registry = CalcEngineRegistry::new(engines)?;
    let inputs = load_inputs(config)?;

    let service: Arc<dyn CalcService> = match &config.endpoint {
        Some(endpoint) => Arc::new(HttpCalcService::new(endpoint.as_str(), config.timeout_duration())?),
        None => Arc::new(OfflineService),
    };
    let mut coordinator =
        CalculationCoordinator::new(registry, service, config.submit_configuration()).with_inputs(inputs);
    if let Some(api) = config.api_endpoint() {
        coordinator = coordinator.with_api(Arc::new(HttpApiClient::new(api, config.timeout_duration())?));
    }
    if let Some(dir) = &config.download_dir {
        coordinator = coordinator.with_documents(Arc::new(DirectoryDocumentSink::new(dir.as_str())));
    }

    coordinator.register_observer(Arc::new(CLICalculationReporter::new(config.quiet)));
    coordinator.register_store_observer(Arc::new(LoggingStoreObserver::new()));

    if let Some(path) = &config.manual_results {
        let raw = load_manual_results(path).with_context(|| format!("loading manual results from {path}"))?;
        coordinator.load_manual_results(raw).await?;
    }

    let outcome = coordinator.calculate(None).await?;
    info!(?outcome, "calculation finished");

    let presenter = CLIResultPresenter::new(config.format, config.verbose, config.quiet);
    let state = coordinator.state();
    let registry = coordinator.registry();
    match &config.output {
        Some(path) => write_to_file(path, &presenter.render(&state)).with_context(|| format!("writing {path}"))?,
        None => presenter.present_state(&state, &registry),
    }
    presenter.present_validations(&state.errors, &state.warnings);

    Ok(match outcome {
        CalculationOutcome::Failed(_) => exit_codes::ERROR_CALCULATION,
        _ if state.has_errors() => exit_codes::ERROR_VALIDATION,
        _ => exit_codes::SUCCESS,
    })
}

fn read_json(path: &str) -> Result<Value, CalcError> {
    let text = std::fs::read_to_string(path).map_err(|e| CalcError::Configuration(format!("cannot read {path}: {e}")))?;
    serde_json::from_str(&text).map_err(|e| CalcError::Configuration(format!("{path} is not valid JSON: {e}")))
}

fn load_engines(path: &str) -> Result<Vec<CalcEngine>, CalcError> {
    serde_json::from_value(read_json(path)?)
        .map_err(|e| CalcError::Configuration(format!("invalid CalcEngine definitions: {e}")))
}

fn load_inputs(config: &AppConfig) -> Result<CalculationInputs, CalcError> {
    let mut inputs = match &config.inputs {
        Some(path) => CalculationInputs::from_json(read_json(path)?)?,
        None => CalculationInputs::new(),
    };
    for (key, value) in &config.overrides {
        inputs.set(key, Some(value.clone()));
    }
    inputs.validate()?;
    Ok(inputs)
}

fn load_manual_results(path: &str) -> Result<Vec<RawTabDef>, CalcError> {
    let tabs = match read_json(path)? {
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        _ => return Err(CalcError::Configuration("manual results must be a TabDef object or array".into())),
    };
    tabs.into_iter()
        .map(|tab| {
            RawTabDef::from_value(tab).ok_or_else(|| CalcError::Configuration("manual result TabDef must be an object".into()))
        })
        .collect()
}
