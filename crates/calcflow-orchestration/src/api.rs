//! Follow-up API calls issued after a calculation.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use calcflow_core::{CalcError, CalculationInputs, InputTable};

use crate::transport::SubmitConfiguration;

/// Body of an API command call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiRequest {
    pub inputs: BTreeMap<String, String>,
    pub input_tables: Vec<InputTable>,
    pub configuration: SubmitConfiguration,
    pub api_parameters: Value,
}

impl ApiRequest {
    #[must_use]
    pub fn new(inputs: &CalculationInputs, configuration: &SubmitConfiguration, api_parameters: Value) -> Self {
        Self {
            inputs: inputs.wire_values(),
            input_tables: inputs.tables.clone(),
            configuration: configuration.clone(),
            api_parameters,
        }
    }
}

/// Client for `{api_endpoint}/{command}` calls.
pub trait ApiClient: Send + Sync {
    fn submit<'a>(&'a self, command: &'a str, request: &'a ApiRequest) -> BoxFuture<'a, Result<Value, CalcError>>;
}
