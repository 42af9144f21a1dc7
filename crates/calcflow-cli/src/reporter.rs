//! Calculation lifecycle reporting on the terminal.

use std::sync::atomic::{AtomicUsize, Ordering};

use calcflow_core::{CalcError, CalculationInputs};
use calcflow_orchestration::{CalculationObserver, CalculationSnapshot};

use crate::output::format_duration;
use crate::ui::{print_error, print_status, print_warning};

/// Prints lifecycle events to stderr so stdout stays machine-readable.
pub struct CLICalculationReporter {
    quiet: bool,
    processing_errors: AtomicUsize,
}

impl CLICalculationReporter {
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            processing_errors: AtomicUsize::new(0),
        }
    }

    /// Merge or downstream failures seen so far.
    #[must_use]
    pub fn processing_errors(&self) -> usize {
        self.processing_errors.load(Ordering::Relaxed)
    }
}

impl CalculationObserver for CLICalculationReporter {
    fn on_calculate_start(&self, inputs: &CalculationInputs) -> bool {
        if !self.quiet {
            print_status(&format!(
                "Calculating with {} input(s), {} input table(s)...",
                inputs.values.len(),
                inputs.tables.len()
            ));
        }
        true
    }

    fn on_calculation(&self, snapshot: &CalculationSnapshot) {
        if !self.quiet {
            print_status(&format!(
                "Received {} result tab(s) in {}",
                snapshot.tab_defs.len(),
                format_duration(snapshot.duration)
            ));
        }
    }

    fn on_calculation_errors(&self, phase: &str, error: &CalcError) {
        print_error(&format!("{phase}: {error}"));
    }

    fn on_processing_error(&self, phase: &str, error: &CalcError) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
        print_warning(&format!("{phase}: {error}"));
    }
}
