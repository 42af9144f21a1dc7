//! # calcflow-core
//!
//! Data model and merge rules for driving form calculators against a remote
//! CalcEngine service: engine registry, result normalization, and the keyed
//! result store the UI reads from.

pub mod calc_engine;
pub mod constants;
pub mod downstream;
pub mod error;
pub mod inputs;
pub mod merger;
pub mod normalizer;
pub mod observer;
pub mod observers;
pub mod registry;
pub mod store;
pub mod tabdef;
pub mod validation;

// Re-exports
pub use calc_engine::CalcEngine;
pub use error::{CalcError, CalculationError, EngineFailure};
pub use inputs::{CalculationInputs, InputTable};
pub use merger::{MergeTarget, ResultMerger, TableHandler};
pub use normalizer::normalize;
pub use observer::{MergeSink, StoreObserver, StoreSubject};
pub use registry::CalcEngineRegistry;
pub use store::{ResultStore, StoreChange};
pub use tabdef::{RawTabDef, Row, TabDef, TabIdentity};
pub use validation::Validation;
