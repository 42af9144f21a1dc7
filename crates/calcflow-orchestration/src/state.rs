//! Application state read by the UI layer.

use serde::Serialize;

use calcflow_core::store::column_value;
use calcflow_core::tabdef::cell_text;
use calcflow_core::{CalcEngineRegistry, CalcError, CalculationInputs, MergeTarget, ResultStore, Row, Validation};

use crate::interfaces::CalculationSnapshot;

/// Inputs, merged results, and validation messages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplicationState {
    pub inputs: CalculationInputs,
    #[serde(rename = "rbl")]
    pub store: ResultStore,
    pub errors: Vec<Validation>,
    pub warnings: Vec<Validation>,
    #[serde(skip)]
    pub last_calculation: Option<CalculationSnapshot>,
}

impl ApplicationState {
    #[must_use]
    pub fn with_inputs(inputs: CalculationInputs) -> Self {
        Self {
            inputs,
            ..Self::default()
        }
    }

    /// Borrow the mutable parts the merger writes to.
    pub fn merge_target(&mut self) -> MergeTarget<'_> {
        MergeTarget {
            store: &mut self.store,
            inputs: &mut self.inputs,
            errors: &mut self.errors,
            warnings: &mut self.warnings,
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Rows of a table, defaulting engine and tab through the registry.
    ///
    /// An unknown engine or tab is an error; a table the engine never
    /// returned is empty.
    pub fn table<'a>(
        &'a self,
        registry: &CalcEngineRegistry,
        table: &str,
        calc_engine: Option<&str>,
        tab: Option<&str>,
    ) -> Result<&'a [Row], CalcError> {
        let (engine, tab) = registry.resolve(calc_engine, tab)?;
        let key = ResultStore::key(&engine.key, tab);
        Ok(self.store.table(&key, table).unwrap_or_default())
    }

    /// Text of one cell; the column defaults to `value`.
    pub fn value<'a>(
        &'a self,
        registry: &CalcEngineRegistry,
        table: &str,
        id: &str,
        column: Option<&str>,
        calc_engine: Option<&str>,
        tab: Option<&str>,
    ) -> Result<Option<&'a str>, CalcError> {
        let (engine, tab) = registry.resolve(calc_engine, tab)?;
        let key = ResultStore::key(&engine.key, tab);
        Ok(self
            .store
            .row(&key, table, id)
            .and_then(|row| column_value(row, column.unwrap_or("value")))
            .and_then(cell_text))
    }
}
