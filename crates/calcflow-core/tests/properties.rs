//! Property-based tests for the result store and merge rules.

use proptest::prelude::*;
use serde_json::{Map, Value};

use calcflow_core::observers::NoOpSink;
use calcflow_core::tabdef::TabTable;
use calcflow_core::{
    CalcEngine, CalcEngineRegistry, CalculationInputs, MergeTarget, ResultMerger, ResultStore, Row, TabDef,
    TabIdentity, Validation,
};

const KEY: &str = "Main.RBLResult";

fn row(id: &str, value: &str) -> Row {
    let mut row = Map::new();
    row.insert("@id".into(), Value::String(id.into()));
    row.insert("value".into(), Value::String(value.into()));
    row
}

fn rows_strategy() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(("[a-e]", "[0-9]{1,3}"), 0..12)
        .prop_map(|pairs| pairs.iter().map(|(id, value)| row(id, value)).collect())
}

fn tab(table: &str, rows: Vec<Row>) -> TabDef {
    let mut tab = TabDef::new(TabIdentity {
        calc_engine_key: "Main".into(),
        name: "RBLResult".into(),
    });
    tab.tables.push(TabTable {
        name: table.into(),
        rows,
    });
    tab
}

fn merge_into(store: &mut ResultStore, tabs: &[TabDef]) {
    let registry = CalcEngineRegistry::new(vec![CalcEngine::new("Main", "Main_SE", "RBLResult")]).unwrap();
    let mut inputs = CalculationInputs::new();
    let mut errors: Vec<Validation> = Vec::new();
    let mut warnings: Vec<Validation> = Vec::new();
    let mut target = MergeTarget {
        store,
        inputs: &mut inputs,
        errors: &mut errors,
        warnings: &mut warnings,
    };
    ResultMerger::new(&registry, &NoOpSink).merge(tabs, &mut target);
}

fn ids(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get("@id").and_then(Value::as_str).map(str::to_string))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Upserting the same rows twice leaves the store as upserting them once.
    #[test]
    fn upsert_is_idempotent(seed in rows_strategy(), incoming in rows_strategy()) {
        let mut once = ResultStore::new();
        once.upsert_rows(KEY, "rbl-value", seed.clone());
        once.upsert_rows(KEY, "rbl-value", incoming.clone());

        let mut twice = once.clone();
        twice.upsert_rows(KEY, "rbl-value", incoming);

        prop_assert_eq!(once, twice);
    }

    /// Upsert never duplicates an `@id` and keeps the last value per id.
    #[test]
    fn upsert_keeps_one_row_per_id(seed in rows_strategy(), incoming in rows_strategy()) {
        let mut store = ResultStore::new();
        store.upsert_rows(KEY, "rbl-value", seed.clone());
        store.upsert_rows(KEY, "rbl-value", incoming.clone());

        let table = store.table(KEY, "rbl-value").unwrap();
        let mut seen = ids(table);
        let total = seen.len();
        seen.sort();
        seen.dedup();
        prop_assert_eq!(seen.len(), total);

        for row in seed.iter().chain(&incoming) {
            let id = row["@id"].as_str().unwrap();
            let expected = seed
                .iter()
                .chain(&incoming)
                .filter(|r| r["@id"] == row["@id"])
                .last()
                .unwrap();
            prop_assert_eq!(&store.row(KEY, "rbl-value", id).unwrap()["value"], &expected["value"]);
        }
    }

    /// A replaced table holds one row per incoming `@id`, first-seen order,
    /// whatever came before.
    #[test]
    fn replace_discards_previous_rows(seed in rows_strategy(), incoming in rows_strategy()) {
        let mut store = ResultStore::new();
        merge_into(&mut store, &[tab("chart", seed)]);
        merge_into(&mut store, &[tab("chart", incoming.clone())]);

        let mut expected: Vec<String> = Vec::new();
        for id in ids(&incoming) {
            if !expected.contains(&id) {
                expected.push(id);
            }
        }
        prop_assert_eq!(ids(store.table(KEY, "chart").unwrap()), expected);

        for row in &incoming {
            let id = row["@id"].as_str().unwrap();
            let last = incoming.iter().filter(|r| r["@id"] == row["@id"]).last().unwrap();
            prop_assert_eq!(&store.row(KEY, "chart", id).unwrap()["value"], &last["value"]);
        }
    }

    /// Merging the same results twice through the merge rules is a no-op.
    #[test]
    fn merge_is_idempotent(values in rows_strategy(), chart in rows_strategy()) {
        let tabs = [tab("rbl-value", values), tab("chart", chart)];
        let mut store = ResultStore::new();
        merge_into(&mut store, &tabs);
        let first = store.clone();
        merge_into(&mut store, &tabs);

        prop_assert_eq!(first, store);
    }
}
