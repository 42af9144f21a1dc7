#![no_main]

use libfuzzer_sys::fuzz_target;

use calcflow_core::{CalcEngine, CalcEngineRegistry, RawTabDef};

fuzz_target!(|data: &[u8]| {
    let Ok(serde_json::Value::Array(items)) = serde_json::from_slice(data) else {
        return;
    };
    let raw: Vec<RawTabDef> = items.into_iter().filter_map(RawTabDef::from_value).collect();

    let Ok(registry) = CalcEngineRegistry::new(vec![CalcEngine::new("Main", "Main", "RBLResult")]) else {
        return;
    };
    let Ok(engines) = registry.to_calc_engines(&raw) else {
        return;
    };

    // One engine per key, never shadowing a service engine's name
    for (i, engine) in engines.iter().enumerate() {
        assert!(engine.manual_result);
        assert!(!engine.name_matches("Main"));
        assert!(engines[..i].iter().all(|other| other.key != engine.key));
    }
});
