//! Validation messages produced by calculations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tabdef::{cell_text, Row};

/// An error or warning keyed by the input or rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(rename = "@id")]
    pub id: String,
    pub text: String,
    /// Remaining columns of the source row (`dependsOn`, `event`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Validation {
    #[must_use]
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            extra: Map::new(),
        }
    }

    /// Build from an `errors`/`warnings` row, keeping every other column.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        let mut extra = row.clone();
        let id = extra
            .remove("@id")
            .as_ref()
            .and_then(cell_text)
            .unwrap_or_default()
            .to_string();
        let text = extra
            .remove("text")
            .as_ref()
            .and_then(cell_text)
            .unwrap_or_default()
            .to_string();
        Self { id, text, extra }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_row_keeps_extra_columns() {
        let row = match json!({"@id": "iAge", "text": "Too old", "dependsOn": "iRetAge"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let v = Validation::from_row(&row);
        assert_eq!(v.id, "iAge");
        assert_eq!(v.text, "Too old");
        assert_eq!(v.extra["dependsOn"], "iRetAge");
    }

    #[test]
    fn serializes_with_at_id() {
        let v = Validation::new("System", "failed");
        assert_eq!(serde_json::to_value(&v).unwrap(), json!({"@id": "System", "text": "failed"}));
    }
}
