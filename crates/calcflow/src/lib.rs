//! calcflow library: application logic for the calculation runner.

pub mod app;
pub mod config;
pub mod errors;
pub mod version;
