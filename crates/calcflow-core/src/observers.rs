//! Concrete observer and sink implementations.

use tracing::{debug, info, warn};

use crate::downstream::{DataTokenUpdate, GeneratedDocument};
use crate::error::CalcError;
use crate::observer::{MergeSink, StoreObserver};
use crate::store::StoreChange;

/// Sink that discards side effects, logging what it drops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl NoOpSink {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MergeSink for NoOpSink {
    fn push_data_tokens(&self, update: DataTokenUpdate) -> Result<(), CalcError> {
        debug!(tokens = update.data_tokens.len(), "discarding data tokens");
        Ok(())
    }

    fn download(&self, document: GeneratedDocument) -> Result<(), CalcError> {
        debug!(file = %document.file_name, bytes = document.content.len(), "discarding document");
        Ok(())
    }

    fn processing_error(&self, phase: &str, error: CalcError) {
        warn!(phase, error = %error, "processing error");
    }
}

/// Observer that logs every store change.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStoreObserver;

impl LoggingStoreObserver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StoreObserver for LoggingStoreObserver {
    fn on_store_changed(&self, change: &StoreChange) {
        info!(keys = ?change.keys, "result store changed");
    }
}
