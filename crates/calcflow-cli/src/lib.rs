//! # calcflow-cli
//!
//! CLI output, lifecycle reporting, and shell completion.

pub mod completion;
pub mod output;
pub mod presenter;
pub mod reporter;
pub mod ui;

pub use output::OutputFormat;
pub use presenter::CLIResultPresenter;
pub use reporter::CLICalculationReporter;
