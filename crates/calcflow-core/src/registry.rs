//! CalcEngine registry and default resolution.

use tracing::{debug, info};

use crate::calc_engine::{clean_engine_name, CalcEngine};
use crate::constants::{DEFAULT_INPUT_TAB, MANUAL_ENGINE_PREFIX};
use crate::error::CalcError;
use crate::tabdef::RawTabDef;

/// Ordered list of configured engines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalcEngineRegistry {
    engines: Vec<CalcEngine>,
}

impl CalcEngineRegistry {
    /// Create a registry, rejecting duplicate keys.
    pub fn new(engines: Vec<CalcEngine>) -> Result<Self, CalcError> {
        let mut registry = Self::default();
        registry.register(engines)?;
        Ok(registry)
    }

    /// Append engines to the registry.
    pub fn register(&mut self, engines: Vec<CalcEngine>) -> Result<(), CalcError> {
        for engine in engines {
            if self.by_key(&engine.key).is_some() {
                return Err(CalcError::Configuration(format!(
                    "CalcEngine key {} is configured more than once",
                    engine.key
                )));
            }
            debug!(key = %engine.key, name = %engine.name, manual = engine.manual_result, "registered CalcEngine");
            self.engines.push(engine);
        }
        Ok(())
    }

    /// Register synthesized manual engines.
    ///
    /// A key already held by a manual engine is reused and gains any new
    /// result tabs. A key held by a service engine is rejected, and nothing
    /// is registered.
    pub fn register_manual(&mut self, engines: Vec<CalcEngine>) -> Result<(), CalcError> {
        if let Some(clash) = engines
            .iter()
            .find(|ce| self.by_key(&ce.key).is_some_and(|existing| !existing.manual_result))
        {
            return Err(CalcError::Configuration(format!(
                "manual results key {} is already used by a service CalcEngine",
                clash.key
            )));
        }

        for engine in engines {
            match self.engines.iter_mut().find(|ce| ce.key == engine.key) {
                Some(existing) => {
                    for tab in engine.result_tabs {
                        if !existing.result_tabs.contains(&tab) {
                            existing.result_tabs.push(tab);
                        }
                    }
                    debug!(key = %existing.key, tabs = existing.result_tabs.len(), "reused manual CalcEngine");
                }
                None => self.register(vec![engine])?,
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn engines(&self) -> &[CalcEngine] {
        &self.engines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&CalcEngine> {
        self.engines.first()
    }

    /// Engines the transport submits, in registry order.
    pub fn service_engines(&self) -> impl Iterator<Item = &CalcEngine> {
        self.engines.iter().filter(|ce| ce.is_service_engine())
    }

    /// First enabled, service-backed engine.
    #[must_use]
    pub fn default_engine(&self) -> Option<&CalcEngine> {
        self.service_engines().next()
    }

    #[must_use]
    pub fn by_key(&self, key: &str) -> Option<&CalcEngine> {
        self.engines.iter().find(|ce| ce.key == key)
    }

    /// Case-insensitive lookup by engine name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&CalcEngine> {
        self.engines.iter().find(|ce| ce.name_matches(name))
    }

    /// Resolve a requested engine key and tab.
    ///
    /// A missing key selects the default engine; a missing tab selects that
    /// engine's first result tab.
    pub fn resolve(&self, key: Option<&str>, tab: Option<&str>) -> Result<(&CalcEngine, &str), CalcError> {
        let engine = match key {
            Some(key) => self.by_key(key),
            None => self.default_engine(),
        }
        .ok_or_else(|| {
            CalcError::Configuration(format!("cannot find CalcEngine {}", key.unwrap_or("<default>")))
        })?;

        let tab = match tab {
            Some(tab) => engine.result_tabs.iter().find(|t| t.as_str() == tab),
            None => engine.result_tabs.first(),
        }
        .ok_or_else(|| {
            CalcError::Configuration(format!(
                "cannot find Table {} for CalcEngine {}",
                tab.unwrap_or("<default>"),
                engine.key
            ))
        })?;

        Ok((engine, tab.as_str()))
    }

    /// Synthesize engines for host-supplied results.
    ///
    /// Tabs are grouped by `@calcEngineKey` in first-seen order. A name that
    /// collides with a service engine gets the `Manual.` prefix.
    pub fn to_calc_engines(&self, manual_results: &[RawTabDef]) -> Result<Vec<CalcEngine>, CalcError> {
        let mut synthesized: Vec<CalcEngine> = Vec::new();

        for tab in manual_results {
            let key = tab.calc_engine_key().ok_or_else(|| {
                CalcError::Configuration("manual results require a @calcEngineKey attribute".into())
            })?;
            let tab_name = tab.name().unwrap_or(DEFAULT_INPUT_TAB);

            if let Some(existing) = synthesized.iter_mut().find(|ce| ce.key == key) {
                if !existing.result_tabs.iter().any(|t| t == tab_name) {
                    existing.result_tabs.push(tab_name.to_string());
                }
                continue;
            }

            let resolved = clean_engine_name(tab.calc_engine().unwrap_or(key));
            let collides = self
                .engines
                .iter()
                .any(|ce| !ce.manual_result && ce.name_matches(resolved));
            let name = if collides {
                format!("{MANUAL_ENGINE_PREFIX}{resolved}")
            } else {
                resolved.to_string()
            };

            info!(key, name = %name, "synthesized manual CalcEngine");
            synthesized.push(CalcEngine {
                key: key.to_string(),
                name,
                input_tab: DEFAULT_INPUT_TAB.to_string(),
                result_tabs: vec![tab_name.to_string()],
                pre_calcs: None,
                enabled: true,
                allow_configure_ui: true,
                manual_result: true,
            });
        }

        Ok(synthesized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> CalcEngineRegistry {
        let mut disabled = CalcEngine::new("Off", "Off_SE", "RBLResult");
        disabled.enabled = false;
        let mut secondary = CalcEngine::new("Secondary", "Secondary_SE", "RBLResult");
        secondary.result_tabs.push("RBLChart".into());
        CalcEngineRegistry::new(vec![disabled, CalcEngine::new("Main", "Main", "RBLResult"), secondary]).unwrap()
    }

    fn manual(value: serde_json::Value) -> RawTabDef {
        RawTabDef::from_value(value).unwrap()
    }

    #[test]
    fn default_is_first_enabled_service_engine() {
        let reg = registry();
        let (ce, tab) = reg.resolve(None, None).unwrap();
        assert_eq!(ce.key, "Main");
        assert_eq!(tab, "RBLResult");
    }

    #[test]
    fn resolve_explicit_tab() {
        let reg = registry();
        let (ce, tab) = reg.resolve(Some("Secondary"), Some("RBLChart")).unwrap();
        assert_eq!(ce.key, "Secondary");
        assert_eq!(tab, "RBLChart");
    }

    #[test]
    fn resolve_unknown_engine_fails() {
        let reg = registry();
        assert!(matches!(reg.resolve(Some("Nope"), None), Err(CalcError::Configuration(_))));
    }

    #[test]
    fn resolve_unknown_tab_fails() {
        let reg = registry();
        let err = reg.resolve(Some("Main"), Some("RBLChart")).unwrap_err();
        assert!(err.to_string().contains("cannot find Table"));
    }

    #[test]
    fn resolve_without_service_engines_fails() {
        let reg = CalcEngineRegistry::default();
        assert!(reg.resolve(None, None).is_err());
    }

    #[test]
    fn duplicate_keys_rejected() {
        let result = CalcEngineRegistry::new(vec![
            CalcEngine::new("Main", "A", "RBLResult"),
            CalcEngine::new("Main", "B", "RBLResult"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn by_name_is_case_insensitive() {
        let reg = registry();
        assert_eq!(reg.by_name("secondary_se").map(|c| c.key.as_str()), Some("Secondary"));
    }

    #[test]
    fn manual_engine_colliding_name_gets_prefix() {
        let reg = registry();
        let engines = reg
            .to_calc_engines(&[manual(json!({
                "@calcEngineKey": "M1",
                "@calcEngine": "Main",
                "@name": "RBLResult"
            }))])
            .unwrap();
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].key, "M1");
        assert_eq!(engines[0].name, "Manual.Main");
        assert!(engines[0].manual_result);
    }

    #[test]
    fn manual_engine_groups_tabs_by_key() {
        let reg = registry();
        let engines = reg
            .to_calc_engines(&[
                manual(json!({"@calcEngineKey": "M1", "@name": "RBLResult"})),
                manual(json!({"@calcEngineKey": "M1", "@name": "RBLExtra"})),
                manual(json!({"@calcEngineKey": "M2", "@calcEngine": "Other_Test", "@name": "RBLResult"})),
            ])
            .unwrap();
        assert_eq!(engines.len(), 2);
        assert_eq!(engines[0].name, "M1");
        assert_eq!(engines[0].result_tabs, ["RBLResult", "RBLExtra"]);
        assert_eq!(engines[1].name, "Other");
    }

    #[test]
    fn manual_tab_without_key_fails() {
        let reg = registry();
        let result = reg.to_calc_engines(&[manual(json!({"@name": "RBLResult"}))]);
        assert!(matches!(result, Err(CalcError::Configuration(_))));
    }

    #[test]
    fn manual_key_is_reused_across_loads() {
        let mut registry = registry();
        let first = registry
            .to_calc_engines(&[manual(json!({"@calcEngineKey": "M1", "@name": "RBLResult"}))])
            .unwrap();
        registry.register_manual(first).unwrap();
        let second = registry
            .to_calc_engines(&[manual(json!({"@calcEngineKey": "M1", "@name": "RBLExtra"}))])
            .unwrap();
        registry.register_manual(second).unwrap();

        let manual = registry.by_key("M1").unwrap();
        assert!(manual.manual_result);
        assert_eq!(manual.result_tabs, ["RBLResult", "RBLExtra"]);
        assert_eq!(registry.engines().iter().filter(|ce| ce.key == "M1").count(), 1);
    }

    #[test]
    fn manual_key_of_service_engine_rejected() {
        let mut registry = registry();
        let before = registry.clone();
        let mut fresh = CalcEngine::new("M2", "M2", "RBLResult");
        fresh.manual_result = true;
        let mut clash = CalcEngine::new("Main", "Other", "RBLResult");
        clash.manual_result = true;

        let err = registry.register_manual(vec![fresh, clash]).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(registry, before);
    }
}
