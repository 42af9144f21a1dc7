//! Configured calculation units.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_INPUT_TAB, TEST_ENGINE_SUFFIX};

fn default_input_tab() -> String {
    DEFAULT_INPUT_TAB.to_string()
}

fn default_enabled() -> bool {
    true
}

/// A configured calculation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcEngine {
    /// User facing identity, used in store keys.
    pub key: String,
    /// Engine registry name sent to the service.
    pub name: String,
    #[serde(default = "default_input_tab")]
    pub input_tab: String,
    #[serde(default)]
    pub result_tabs: Vec<String>,
    /// Pre-calculation directive forwarded as `PreCalcs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_calcs: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub allow_configure_ui: bool,
    /// Results supplied by the host instead of the service.
    #[serde(default)]
    pub manual_result: bool,
}

impl CalcEngine {
    /// Create an enabled, service-backed engine with one result tab.
    #[must_use]
    pub fn new(key: &str, name: &str, result_tab: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            input_tab: default_input_tab(),
            result_tabs: vec![result_tab.to_string()],
            pre_calcs: None,
            enabled: true,
            allow_configure_ui: true,
            manual_result: false,
        }
    }

    /// Whether the transport submits this engine.
    #[must_use]
    pub fn is_service_engine(&self) -> bool {
        self.enabled && !self.manual_result
    }

    /// First declared result tab.
    #[must_use]
    pub fn default_tab(&self) -> Option<&str> {
        self.result_tabs.first().map(String::as_str)
    }

    #[must_use]
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len()).filter(|&at| at > 0)?;
    let (head, tail) = (name.get(..split)?, name.get(split..)?);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// Strip workbook extension and test suffix from a reported engine name.
#[must_use]
pub fn clean_engine_name(name: &str) -> &str {
    let mut cleaned = name.trim();
    if let Some(stem) = [".xlsm", ".xlsx", ".xls"]
        .iter()
        .find_map(|ext| strip_suffix_ignore_case(cleaned, ext))
    {
        cleaned = stem;
    }
    strip_suffix_ignore_case(cleaned, TEST_ENGINE_SUFFIX).unwrap_or(cleaned)
}
