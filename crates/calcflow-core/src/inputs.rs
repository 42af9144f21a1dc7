//! Calculation inputs: a scalar map plus optional input tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CalcError;
use crate::tabdef::{cell_text, Row};

/// A named input table. Every row carries an `index` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputTable {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl InputTable {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Append a row, stamping its `index` column.
    pub fn add_row(&mut self, index: impl Into<String>, mut row: Row) {
        row.insert("index".into(), Value::String(index.into()));
        self.rows.push(row);
    }
}

/// Inputs submitted with a calculation.
///
/// `None` values are inputs known to the form but without a value; they are
/// not sent to the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationInputs {
    #[serde(default)]
    pub values: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub tables: Vec<InputTable>,
}

impl CalculationInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.set(name, Some(value.to_string()));
        self
    }

    pub fn set(&mut self, name: &str, value: Option<String>) {
        self.values.insert(name.to_string(), value);
    }

    /// Set an input from a result cell (`null` clears the value).
    pub fn set_from_cell(&mut self, name: &str, cell: &Value) {
        let value = match cell {
            Value::Null => None,
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            other => cell_text(other).map(str::to_string),
        };
        self.set(name, value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Option::as_deref)
    }

    pub fn remove(&mut self, name: &str) -> Option<Option<String>> {
        self.values.remove(name)
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&InputTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Overlay `other` on top of `self`: scalar values win per key, tables
    /// replace same-named tables.
    #[must_use]
    pub fn overlaid_with(&self, other: &CalculationInputs) -> CalculationInputs {
        let mut merged = self.clone();
        for (name, value) in &other.values {
            merged.values.insert(name.clone(), value.clone());
        }
        for table in &other.tables {
            match merged.tables.iter_mut().find(|t| t.name == table.name) {
                Some(existing) => *existing = table.clone(),
                None => merged.tables.push(table.clone()),
            }
        }
        merged
    }

    /// Scalar inputs as sent on the wire (values that are set only).
    #[must_use]
    pub fn wire_values(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Check that every input table row carries an `index`.
    pub fn validate(&self) -> Result<(), CalcError> {
        for table in &self.tables {
            if let Some(pos) = table.rows.iter().position(|r| !r.contains_key("index")) {
                return Err(CalcError::Configuration(format!(
                    "input table {} row {pos} has no index",
                    table.name
                )));
            }
        }
        Ok(())
    }

    /// Parse from a JSON object; an `InputTables` key holds the input tables.
    pub fn from_json(value: Value) -> Result<Self, CalcError> {
        let Value::Object(mut map) = value else {
            return Err(CalcError::Configuration("inputs must be a JSON object".into()));
        };
        let tables = match map.remove("InputTables") {
            Some(tables) => serde_json::from_value(tables)?,
            None => Vec::new(),
        };
        let mut inputs = Self {
            values: BTreeMap::new(),
            tables,
        };
        for (name, value) in &map {
            inputs.set_from_cell(name, value);
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_values_drop_unset() {
        let mut inputs = CalculationInputs::new().with("iAge", "65");
        inputs.set("iName", None);
        let wire = inputs.wire_values();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire["iAge"], "65");
    }

    #[test]
    fn overlay_prefers_other() {
        let base = CalculationInputs::new().with("a", "1").with("b", "2");
        let custom = CalculationInputs::new().with("b", "3");
        let merged = base.overlaid_with(&custom);
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("3"));
        assert_eq!(base.get("b"), Some("2"));
    }

    #[test]
    fn validate_requires_index() {
        let mut inputs = CalculationInputs::new();
        let mut table = InputTable::new("dependents");
        table.add_row("0", Row::new());
        inputs.tables.push(table);
        assert!(inputs.validate().is_ok());

        inputs.tables[0].rows.push(Row::new());
        assert!(matches!(inputs.validate(), Err(CalcError::Configuration(_))));
    }

    #[test]
    fn from_json_reads_scalars_and_tables() {
        let inputs = CalculationInputs::from_json(json!({
            "iAge": "65",
            "iCount": 3,
            "iEmpty": null,
            "InputTables": [{"Name": "kids", "Rows": [{"index": "0", "age": "4"}]}]
        }))
        .unwrap();
        assert_eq!(inputs.get("iAge"), Some("65"));
        assert_eq!(inputs.get("iCount"), Some("3"));
        assert_eq!(inputs.get("iEmpty"), None);
        assert_eq!(inputs.table("kids").map(|t| t.rows.len()), Some(1));
    }

    #[test]
    fn from_json_rejects_arrays() {
        assert!(CalculationInputs::from_json(json!([])).is_err());
    }
}
