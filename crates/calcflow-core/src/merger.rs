//! Folds normalized tabs into the result store.
//!
//! Each table is handled by a [`TableHandler`] chosen from its name. Rows go
//! through the same preprocessing first:
//!
//! - attributed cells (`{ "#text": v, "@x": .. }`) become `v`, with the
//!   attributes hoisted onto a shadow `@column` property;
//! - in `rbl-input` an empty column becomes `null` (not provided);
//! - in every other table a column present on the first row but missing on a
//!   later row becomes `""`.
//!
//! Failures inside one table or downstream pass are reported to the
//! [`MergeSink`] and never stop the remaining work.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::{phases, tables, RESULT_PROCESSING_ENGINE};
use crate::downstream::{collect_data_tokens, collect_documents};
use crate::error::CalcError;
use crate::inputs::CalculationInputs;
use crate::observer::MergeSink;
use crate::registry::CalcEngineRegistry;
use crate::store::{ResultStore, StoreChange};
use crate::tabdef::{cell_text, is_attribute, row_id, row_text, Row, TabDef, TabTable, TEXT_KEY};
use crate::validation::Validation;

/// How rows of a table reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Update in place by `@id`, append unknown rows.
    Upsert,
    /// Replace the whole table for the engine/tab.
    Replace,
    /// Rows only feed the live inputs and never reach the store.
    InputsOnly,
}

/// Table-specific rule, selected by table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableHandler {
    /// `rbl-defaults`: values are written into the live inputs.
    Defaults,
    /// `rbl-input`: default injection plus error/warning promotion.
    Input,
    /// `errors`: rows appended to the error list.
    Errors,
    /// `warnings`: rows appended to the warning list.
    Warnings,
    /// `table-output-control`: clears exported tables the engine stopped emitting.
    OutputControl,
    /// `rbl-skip`: keyed by `key`, missing `value` means `"1"`.
    Skip,
    /// Remaining `rbl-` tables upserted by `@id`.
    Mergeable,
    /// Everything else.
    Generic,
}

impl TableHandler {
    #[must_use]
    pub fn for_table(name: &str) -> Self {
        match name {
            tables::RBL_DEFAULTS => Self::Defaults,
            tables::RBL_INPUT => Self::Input,
            tables::ERRORS => Self::Errors,
            tables::WARNINGS => Self::Warnings,
            tables::TABLE_OUTPUT_CONTROL => Self::OutputControl,
            tables::RBL_SKIP => Self::Skip,
            name if tables::MERGEABLE.contains(&name) => Self::Mergeable,
            _ => Self::Generic,
        }
    }

    #[must_use]
    pub fn policy(self) -> MergePolicy {
        match self {
            Self::Defaults => MergePolicy::InputsOnly,
            Self::Input | Self::Skip | Self::Mergeable => MergePolicy::Upsert,
            Self::Errors | Self::Warnings | Self::OutputControl | Self::Generic => MergePolicy::Replace,
        }
    }
}

/// The mutable state a merge writes to.
pub struct MergeTarget<'a> {
    pub store: &'a mut ResultStore,
    pub inputs: &'a mut CalculationInputs,
    pub errors: &'a mut Vec<Validation>,
    pub warnings: &'a mut Vec<Validation>,
}

/// Replace an attributed cell with its text and return the hoisted attributes.
fn split_attributed(value: &Value) -> Option<(Value, Map<String, Value>)> {
    let Value::Object(obj) = value else {
        return None;
    };
    let text = obj
        .get(TEXT_KEY)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let attributes: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| k.as_str() != TEXT_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some((Value::String(text), attributes))
}

fn hoist_row(row: &Row) -> Row {
    let mut out = Row::new();
    for (column, value) in row {
        match split_attributed(value) {
            Some((text, attributes)) => {
                out.insert(column.clone(), text);
                if !attributes.is_empty() {
                    out.insert(format!("@{column}"), Value::Object(attributes));
                }
            }
            None => {
                out.insert(column.clone(), value.clone());
            }
        }
    }
    out
}

/// Apply the shared row preprocessing for a table.
#[must_use]
pub fn preprocess_rows(handler: TableHandler, rows: &[Row]) -> Vec<Row> {
    let mut prepared: Vec<Row> = rows.iter().map(hoist_row).collect();

    if handler == TableHandler::Skip {
        for row in &mut prepared {
            if let Some(key) = row.remove("key") {
                row.insert("@id".into(), key);
            }
            if row.get("value").map_or(true, Value::is_null) {
                row.insert("value".into(), Value::String("1".into()));
            }
        }
    }

    if handler == TableHandler::Input {
        for row in &mut prepared {
            for (column, value) in row.iter_mut() {
                if column != "@id" && value.as_str() == Some("") {
                    *value = Value::Null;
                }
            }
        }
        return prepared;
    }

    let first_columns: Vec<String> = prepared
        .first()
        .map(|r| r.keys().filter(|k| !is_attribute(k)).cloned().collect())
        .unwrap_or_default();
    for row in prepared.iter_mut().skip(1) {
        for column in &first_columns {
            if !row.contains_key(column) {
                row.insert(column.clone(), Value::String(String::new()));
            }
        }
    }
    prepared
}

fn required_id<'r>(row: &'r Row, table: &str) -> Result<&'r str, CalcError> {
    row_id(row)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CalcError::processing(phases::PROCESS_TABLE, format!("{table} row has no @id")))
}

/// Applies table rules and downstream passes.
pub struct ResultMerger<'a> {
    registry: &'a CalcEngineRegistry,
    sink: &'a dyn MergeSink,
}

impl<'a> ResultMerger<'a> {
    #[must_use]
    pub fn new(registry: &'a CalcEngineRegistry, sink: &'a dyn MergeSink) -> Self {
        Self { registry, sink }
    }

    /// Merge every tab, then run the data-token and document passes.
    pub fn merge(&self, tab_defs: &[TabDef], target: &mut MergeTarget<'_>) -> StoreChange {
        let mut change = StoreChange::default();

        for tab in tab_defs {
            let key = match self.store_key(tab) {
                Ok(key) => key,
                Err(err) => {
                    self.report(phases::PROCESS_TABLE, err);
                    continue;
                }
            };
            for table in &tab.tables {
                if let Err(err) = self.merge_table(tab, table, &key, target, &mut change) {
                    self.report(phases::PROCESS_TABLE, err);
                }
            }
        }

        self.process_data_updates(tab_defs);
        self.process_documents(tab_defs);
        change
    }

    /// Store key of a tab; `_ResultProcessing` maps to the first engine/tab.
    fn store_key(&self, tab: &TabDef) -> Result<String, CalcError> {
        if tab.ka.calc_engine_key != RESULT_PROCESSING_ENGINE {
            return Ok(ResultStore::key(&tab.ka.calc_engine_key, &tab.ka.name));
        }
        let engine = self.registry.first().ok_or_else(|| {
            CalcError::Configuration("cannot find CalcEngine for _ResultProcessing results".into())
        })?;
        let result_tab = engine.default_tab().ok_or_else(|| {
            CalcError::Configuration(format!("cannot find Table for CalcEngine {}", engine.key))
        })?;
        Ok(ResultStore::key(&engine.key, result_tab))
    }

    fn merge_table(
        &self,
        tab: &TabDef,
        table: &TabTable,
        key: &str,
        target: &mut MergeTarget<'_>,
        change: &mut StoreChange,
    ) -> Result<(), CalcError> {
        let handler = TableHandler::for_table(&table.name);
        let rows = preprocess_rows(handler, &table.rows);
        let mut cleared = Vec::new();

        for row in &rows {
            match handler {
                TableHandler::Defaults => {
                    let id = required_id(row, &table.name)?;
                    if let Some(value) = row.get("value").filter(|v| !v.is_null()) {
                        target.inputs.set_from_cell(id, value);
                    }
                }
                TableHandler::Input => {
                    let id = required_id(row, &table.name)?;
                    if let Some(value) = row.get("value").filter(|v| !v.is_null()) {
                        target.inputs.set_from_cell(id, value);
                    }
                    if let Some(text) = row_text(row, "error").filter(|t| !t.is_empty()) {
                        target.errors.push(Validation::new(id, text));
                    }
                    if let Some(text) = row_text(row, "warning").filter(|t| !t.is_empty()) {
                        target.warnings.push(Validation::new(id, text));
                    }
                }
                TableHandler::Errors => target.errors.push(Validation::from_row(row)),
                TableHandler::Warnings => target.warnings.push(Validation::from_row(row)),
                TableHandler::OutputControl => {
                    let id = required_id(row, &table.name)?;
                    let export = row.get("export").and_then(cell_text);
                    if matches!(export, Some("1" | "-1")) && !tab.has_table(id) {
                        cleared.push(id.to_string());
                    }
                }
                TableHandler::Skip | TableHandler::Mergeable | TableHandler::Generic => {}
            }
        }

        let total = rows.len();
        let rows: Vec<Row> = rows
            .into_iter()
            .filter(|r| row_id(r).is_some_and(|id| !id.is_empty()))
            .collect();
        if rows.len() != total {
            warn!(key, table = %table.name, dropped = total - rows.len(), "dropping rows without @id");
        }

        debug!(key, table = %table.name, rows = rows.len(), policy = ?handler.policy(), "merging table");
        match handler.policy() {
            MergePolicy::InputsOnly => return Ok(()),
            MergePolicy::Upsert => target.store.upsert_rows(key, &table.name, rows),
            MergePolicy::Replace => target.store.replace_table(key, &table.name, rows),
        }
        change.touch(key);

        for name in cleared {
            debug!(key, table = %name, "clearing exported table missing from results");
            target.store.replace_table(key, &name, Vec::new());
        }
        Ok(())
    }

    fn process_data_updates(&self, tab_defs: &[TabDef]) {
        let update = collect_data_tokens(tab_defs);
        if update.is_empty() {
            return;
        }
        debug!(tokens = update.data_tokens.len(), "pushing data updates");
        if let Err(err) = self.sink.push_data_tokens(update) {
            self.report(phases::PROCESS_DATA_UPDATE_RESULTS, err);
        }
    }

    fn process_documents(&self, tab_defs: &[TabDef]) {
        for document in collect_documents(tab_defs) {
            if let Err(err) = document.and_then(|doc| self.sink.download(doc)) {
                self.report(phases::PROCESS_DOCGEN_RESULTS, err);
            }
        }
    }

    fn report(&self, phase: &str, err: CalcError) {
        warn!(phase, error = %err, "result processing failed");
        self.sink.processing_error(phase, err);
    }
}
