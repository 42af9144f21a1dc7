//! Converts raw engine output into tagged [`TabDef`]s.

use serde_json::Value;
use tracing::{debug, warn};

use crate::calc_engine::{clean_engine_name, CalcEngine};
use crate::constants::RESULT_PROCESSING_ENGINE;
use crate::registry::CalcEngineRegistry;
use crate::tabdef::{is_attribute, RawTabDef, Row, TabDef, TabIdentity, TabTable};

/// Find the configured engine that produced a tab.
///
/// Tries the reported name as-is, then with workbook extension and `_Test`
/// suffix removed.
fn match_engine<'a>(registry: &'a CalcEngineRegistry, reported: &str) -> Option<&'a CalcEngine> {
    registry
        .by_name(reported)
        .or_else(|| registry.by_name(clean_engine_name(reported)))
}

/// Coerce a table value into rows: arrays keep their object items, a lone
/// object becomes a one-row table.
fn to_rows(table: &str, value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                other => {
                    debug!(table, value = %other, "skipping non-object row");
                    None
                }
            })
            .collect(),
        Value::Object(row) => vec![row],
        Value::Null => Vec::new(),
        other => {
            debug!(table, value = %other, "table is not a row or row array");
            Vec::new()
        }
    }
}

/// Normalize one raw tab.
///
/// An engine name that matches no configured engine falls back to the
/// default engine: engines may rename themselves mid-calculation.
#[must_use]
pub fn normalize_tab(raw: RawTabDef, registry: &CalcEngineRegistry) -> TabDef {
    let reported = raw.calc_engine().unwrap_or_default().to_string();
    let name = raw.name().unwrap_or_default().to_string();

    let calc_engine_key = if reported == RESULT_PROCESSING_ENGINE {
        RESULT_PROCESSING_ENGINE.to_string()
    } else if let Some(engine) = match_engine(registry, &reported) {
        engine.key.clone()
    } else {
        let fallback = registry.default_engine().or_else(|| registry.first());
        warn!(
            calc_engine = %reported,
            tab = %name,
            fallback = fallback.map_or("<none>", |ce| ce.key.as_str()),
            "unable to find CalcEngine for result tab, using default"
        );
        fallback.map_or_else(|| reported.clone(), |ce| ce.key.clone())
    };

    let mut tab = TabDef::new(TabIdentity { calc_engine_key, name });
    for (key, value) in raw.0 {
        if is_attribute(&key) {
            tab.attributes.insert(key, value);
        } else {
            let rows = to_rows(&key, value);
            tab.tables.push(TabTable { name: key, rows });
        }
    }
    tab
}

/// Normalize every raw tab, preserving order.
#[must_use]
pub fn normalize(raw_tab_defs: Vec<RawTabDef>, registry: &CalcEngineRegistry) -> Vec<TabDef> {
    raw_tab_defs
        .into_iter()
        .map(|raw| normalize_tab(raw, registry))
        .collect()
}
