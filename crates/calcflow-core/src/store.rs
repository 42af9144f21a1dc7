//! Keyed result store read by the UI.
//!
//! Two levels: `"{calcEngineKey}.{tab}"` then table name. Rows inside a
//! table are unique by `@id`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::tabdef::{row_id, Row};

/// Tables of one engine/tab.
pub type TabTables = BTreeMap<String, Vec<Row>>;

/// Long-lived result store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultStore {
    tabs: BTreeMap<String, TabTables>,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store key of an engine/tab pair.
    #[must_use]
    pub fn key(calc_engine_key: &str, tab: &str) -> String {
        format!("{calc_engine_key}.{tab}")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tabs.keys().map(String::as_str)
    }

    #[must_use]
    pub fn tab(&self, key: &str) -> Option<&TabTables> {
        self.tabs.get(key)
    }

    #[must_use]
    pub fn table(&self, key: &str, table: &str) -> Option<&[Row]> {
        self.tabs.get(key)?.get(table).map(Vec::as_slice)
    }

    /// Row of a table by `@id`.
    #[must_use]
    pub fn row(&self, key: &str, table: &str, id: &str) -> Option<&Row> {
        self.table(key, table)?
            .iter()
            .find(|r| row_id(r) == Some(id))
    }

    /// Replace a table wholesale. Incoming rows sharing an `@id` collapse
    /// into one, later columns winning.
    pub fn replace_table(&mut self, key: &str, table: &str, rows: Vec<Row>) {
        debug_assert!(rows.iter().all(|r| row_id(r).is_some()));
        let mut replaced = Vec::with_capacity(rows.len());
        for row in rows {
            upsert_row(&mut replaced, row);
        }
        self.tabs
            .entry(key.to_string())
            .or_default()
            .insert(table.to_string(), replaced);
    }

    /// Upsert rows by `@id`: existing rows are shallow-merged, new rows appended.
    pub fn upsert_rows(&mut self, key: &str, table: &str, rows: Vec<Row>) {
        let existing = self
            .tabs
            .entry(key.to_string())
            .or_default()
            .entry(table.to_string())
            .or_default();
        for row in rows {
            upsert_row(existing, row);
        }
    }

    /// Total number of rows across the store.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tabs
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }
}

fn upsert_row(rows: &mut Vec<Row>, row: Row) {
    let id = row_id(&row).map(str::to_string);
    let found = id
        .as_deref()
        .and_then(|id| rows.iter_mut().find(|r| row_id(r) == Some(id)));
    match found {
        Some(current) => {
            for (column, value) in row {
                current.insert(column, value);
            }
        }
        None => rows.push(row),
    }
}

/// Store keys touched by one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreChange {
    pub keys: BTreeSet<String>,
}

impl StoreChange {
    pub fn touch(&mut self, key: &str) {
        if !self.keys.contains(key) {
            self.keys.insert(key.to_string());
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Column value of a store row, `None` when absent or unset.
#[must_use]
pub fn column_value<'a>(row: &'a Row, column: &str) -> Option<&'a Value> {
    row.get(column).filter(|v| !v.is_null())
}
