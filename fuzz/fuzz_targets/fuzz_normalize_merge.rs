#![no_main]

use libfuzzer_sys::fuzz_target;

use calcflow_core::observers::NoOpSink;
use calcflow_core::{
    normalize, CalcEngine, CalcEngineRegistry, CalculationInputs, MergeTarget, RawTabDef, ResultMerger, ResultStore,
};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let raw: Vec<RawTabDef> = match value {
        serde_json::Value::Array(items) => items.into_iter().filter_map(RawTabDef::from_value).collect(),
        other => RawTabDef::from_value(other).into_iter().collect(),
    };

    let Ok(registry) = CalcEngineRegistry::new(vec![
        CalcEngine::new("Main", "Conduent_Main_SE", "RBLResult"),
        CalcEngine::new("Chart", "Conduent_Chart_SE", "RBLChart"),
    ]) else {
        return;
    };
    let tab_defs = normalize(raw, &registry);

    let mut store = ResultStore::new();
    let mut inputs = CalculationInputs::new();
    let (mut errors, mut warnings) = (Vec::new(), Vec::new());
    let mut target = MergeTarget {
        store: &mut store,
        inputs: &mut inputs,
        errors: &mut errors,
        warnings: &mut warnings,
    };

    // Arbitrary results must merge without panicking
    let _ = ResultMerger::new(&registry, &NoOpSink).merge(&tab_defs, &mut target);
});
