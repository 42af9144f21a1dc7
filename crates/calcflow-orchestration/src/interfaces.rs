//! Orchestration interfaces.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use calcflow_core::{CalcEngineRegistry, CalcError, CalculationInputs, TabDef, Validation};

use crate::state::ApplicationState;
use crate::transport::SubmitConfiguration;

/// What one completed calculation saw and produced.
#[derive(Debug, Clone)]
pub struct CalculationSnapshot {
    /// Inputs as submitted, after custom overlays.
    pub inputs: CalculationInputs,
    /// Normalized results, after `results_processing` observers ran.
    pub tab_defs: Vec<TabDef>,
    pub configuration: SubmitConfiguration,
    /// Submission through merge.
    pub duration: Duration,
}

/// Lifecycle hooks of a calculation.
///
/// Every method has a no-op default so observers implement only what they
/// care about.
pub trait CalculationObserver: Send + Sync {
    /// Return `false` to cancel the calculation before anything is submitted.
    fn on_calculate_start(&self, _inputs: &CalculationInputs) -> bool {
        true
    }

    /// Inspect or rewrite normalized results before they are merged.
    fn on_results_processing(&self, _tab_defs: &mut Vec<TabDef>, _inputs: &CalculationInputs) {}

    /// Results were merged into the store.
    fn on_calculation(&self, _snapshot: &CalculationSnapshot) {}

    /// Fired after every calculation that started, whatever the outcome.
    fn on_calculate_end(&self) {}

    /// The calculation failed as a whole.
    fn on_calculation_errors(&self, _phase: &str, _error: &CalcError) {}

    /// A merge rule or downstream pass failed; the calculation still completed.
    fn on_processing_error(&self, _phase: &str, _error: &CalcError) {}
}

/// Fan-out over registered calculation observers.
#[derive(Default)]
pub struct CalculationSubject {
    observers: RwLock<Vec<Arc<dyn CalculationObserver>>>,
}

impl CalculationSubject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn CalculationObserver>) {
        self.observers.write().push(observer);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.observers.read().len()
    }

    /// Every observer is asked; any `false` cancels.
    pub fn calculate_start(&self, inputs: &CalculationInputs) -> bool {
        self.observers
            .read()
            .iter()
            .fold(true, |proceed, o| o.on_calculate_start(inputs) && proceed)
    }

    pub fn results_processing(&self, tab_defs: &mut Vec<TabDef>, inputs: &CalculationInputs) {
        for observer in self.observers.read().iter() {
            observer.on_results_processing(tab_defs, inputs);
        }
    }

    pub fn calculation(&self, snapshot: &CalculationSnapshot) {
        for observer in self.observers.read().iter() {
            observer.on_calculation(snapshot);
        }
    }

    pub fn calculate_end(&self) {
        for observer in self.observers.read().iter() {
            observer.on_calculate_end();
        }
    }

    pub fn calculation_errors(&self, phase: &str, error: &CalcError) {
        for observer in self.observers.read().iter() {
            observer.on_calculation_errors(phase, error);
        }
    }

    pub fn processing_error(&self, phase: &str, error: &CalcError) {
        for observer in self.observers.read().iter() {
            observer.on_processing_error(phase, error);
        }
    }
}

/// Observer that does nothing.
pub struct NullCalculationObserver;

impl CalculationObserver for NullCalculationObserver {}

/// Trait for presenting results to the user.
pub trait ResultPresenter: Send + Sync {
    /// Present the merged result store.
    fn present_state(&self, state: &ApplicationState, registry: &CalcEngineRegistry);

    /// Present validation messages.
    fn present_validations(&self, errors: &[Validation], warnings: &[Validation]);

    /// Present an error.
    fn present_error(&self, error: &str);
}
