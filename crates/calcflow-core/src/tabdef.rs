//! Raw and normalized tab definitions.
//!
//! A tab is the group of result tables one engine produced for one result
//! tab. Keys starting with `@` are attributes; every other key is a table.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// A result row: column name to value. `Value::Null` marks an absent value.
pub type Row = Map<String, Value>;

/// Key of the text payload inside an attributed cell.
pub const TEXT_KEY: &str = "#text";

/// Whether a key names an attribute rather than a table or column.
#[must_use]
pub fn is_attribute(key: &str) -> bool {
    key.starts_with('@')
}

/// Scalar text of a cell, looking through attributed `{ "#text": .. }` objects.
#[must_use]
pub fn cell_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(obj) => obj.get(TEXT_KEY).and_then(Value::as_str),
        _ => None,
    }
}

/// Text of a row column.
#[must_use]
pub fn row_text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(cell_text)
}

/// The `@id` of a row, if present and textual.
#[must_use]
pub fn row_id(row: &Row) -> Option<&str> {
    row_text(row, "@id")
}

/// Engine output exactly as the service returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTabDef(pub Map<String, Value>);

impl RawTabDef {
    #[must_use]
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build from a JSON value; anything but an object yields `None`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Attribute value (key given with its `@` prefix).
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(cell_text)
    }

    /// Engine name the service reported.
    #[must_use]
    pub fn calc_engine(&self) -> Option<&str> {
        self.attribute("@calcEngine")
    }

    /// Engine key assigned by the host (manual results only).
    #[must_use]
    pub fn calc_engine_key(&self) -> Option<&str> {
        self.attribute("@calcEngineKey")
    }

    /// Result tab name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attribute("@name")
    }

    pub fn set_attribute(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), Value::String(value.to_string()));
    }
}

/// Identity of the configured engine and tab that produced a [`TabDef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabIdentity {
    pub calc_engine_key: String,
    pub name: String,
}

/// One named table inside a tab.
#[derive(Debug, Clone, PartialEq)]
pub struct TabTable {
    pub name: String,
    pub rows: Vec<Row>,
}

/// Normalized tab definition.
///
/// The identity block is not serialized; serializing yields the raw shape
/// with attributes first and every table as a row array.
#[derive(Debug, Clone, PartialEq)]
pub struct TabDef {
    pub ka: TabIdentity,
    pub attributes: Map<String, Value>,
    pub tables: Vec<TabTable>,
}

impl TabDef {
    #[must_use]
    pub fn new(ka: TabIdentity) -> Self {
        Self {
            ka,
            attributes: Map::new(),
            tables: Vec::new(),
        }
    }

    /// Rows of a table, if the tab carries it.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&[Row]> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.rows.as_slice())
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name == name)
    }

    /// Mutable rows of a table, creating it when missing.
    pub fn table_mut(&mut self, name: &str) -> &mut Vec<Row> {
        let index = match self.tables.iter().position(|t| t.name == name) {
            Some(index) => index,
            None => {
                self.tables.push(TabTable {
                    name: name.to_string(),
                    rows: Vec::new(),
                });
                self.tables.len() - 1
            }
        };
        &mut self.tables[index].rows
    }

    /// Append rows to a table. Used by results-processing hooks to inject data.
    pub fn push_rows(&mut self, name: &str, rows: impl IntoIterator<Item = Row>) {
        self.table_mut(name).extend(rows);
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(cell_text)
    }
}

impl Serialize for TabDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len() + self.tables.len()))?;
        for (key, value) in &self.attributes {
            map.serialize_entry(key, value)?;
        }
        for table in &self.tables {
            map.serialize_entry(&table.name, &table.rows)?;
        }
        map.end()
    }
}
