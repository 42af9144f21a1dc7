//! CLI result presenter.

use calcflow_core::{CalcEngineRegistry, Validation};
use calcflow_orchestration::{ApplicationState, ResultPresenter};

use crate::output::{format_state_json, format_state_tables, OutputFormat};
use crate::ui::{print_error, print_header, print_warning};

/// Renders results to stdout and validation messages to stderr.
pub struct CLIResultPresenter {
    format: OutputFormat,
    verbose: bool,
    quiet: bool,
}

impl CLIResultPresenter {
    #[must_use]
    pub fn new(format: OutputFormat, verbose: bool, quiet: bool) -> Self {
        Self { format, verbose, quiet }
    }

    /// Text the presenter prints for a state.
    #[must_use]
    pub fn render(&self, state: &ApplicationState) -> String {
        match self.format {
            OutputFormat::Json => format_state_json(state),
            OutputFormat::Table => format_state_tables(state),
        }
    }
}

fn describe(v: &Validation) -> String {
    format!("{}: {}", v.id, v.text)
}

impl ResultPresenter for CLIResultPresenter {
    fn present_state(&self, state: &ApplicationState, registry: &CalcEngineRegistry) {
        if !self.quiet && self.format == OutputFormat::Table {
            print_header("Results");
            if self.verbose {
                for ce in registry.engines() {
                    println!("  {} ({}) tabs: {}", ce.key, ce.name, ce.result_tabs.join(", "));
                }
            }
        }
        println!("{}", self.render(state));
    }

    fn present_validations(&self, errors: &[Validation], warnings: &[Validation]) {
        if !self.quiet {
            for warning in warnings {
                print_warning(&describe(warning));
            }
        }
        for error in errors {
            print_error(&describe(error));
        }
    }

    fn present_error(&self, error: &str) {
        print_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcflow_core::CalcEngine;

    fn registry() -> CalcEngineRegistry {
        CalcEngineRegistry::new(vec![CalcEngine::new("Main", "Main_SE", "RBLResult")]).unwrap()
    }

    #[test]
    fn render_json_by_default() {
        let presenter = CLIResultPresenter::new(OutputFormat::default(), false, false);
        assert!(presenter.render(&ApplicationState::default()).starts_with('{'));
    }

    #[test]
    fn render_table_of_empty_state_is_empty() {
        let presenter = CLIResultPresenter::new(OutputFormat::Table, false, true);
        assert!(presenter.render(&ApplicationState::default()).is_empty());
    }

    #[test]
    fn present_does_not_panic() {
        let presenter = CLIResultPresenter::new(OutputFormat::Table, true, false);
        presenter.present_state(&ApplicationState::default(), &registry());
        presenter.present_validations(
            &[Validation::new("System", "An error occurred during form calculation.")],
            &[Validation::new("iAge", "check age")],
        );
        presenter.present_error("boom");
    }
}
