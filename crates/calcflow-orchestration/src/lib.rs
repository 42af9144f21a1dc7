//! # calcflow-orchestration
//!
//! Concurrent CalcEngine submission, HTTP clients, and the calculation
//! lifecycle around the result store.

pub mod api;
pub mod coordinator;
pub mod downstream;
pub mod http;
pub mod interfaces;
pub mod state;
pub mod transport;
pub mod ui_block;

pub use api::{ApiClient, ApiRequest};
pub use coordinator::{CalculationCoordinator, CalculationOutcome, CoordinatorPhase};
pub use downstream::{DirectoryDocumentSink, DocumentSink};
pub use http::{HttpApiClient, HttpCalcService};
pub use interfaces::{CalculationObserver, CalculationSnapshot, ResultPresenter};
pub use state::ApplicationState;
pub use transport::{CalcService, CalculationTransport, SubmitConfiguration};
pub use ui_block::UiBlock;
