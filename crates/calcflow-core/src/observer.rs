//! Observer seams: store change notification and merge side effects.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::downstream::{DataTokenUpdate, GeneratedDocument};
use crate::error::CalcError;
use crate::store::StoreChange;

/// Receives one notification per merge that touched the store.
pub trait StoreObserver: Send + Sync {
    fn on_store_changed(&self, change: &StoreChange);
}

/// Side-effect targets of the merger.
///
/// Failures returned here are caught by the merger and reported back through
/// [`MergeSink::processing_error`]; they never abort the merge.
pub trait MergeSink: Send + Sync {
    /// Accept the aggregated `jwt-data` tokens for the follow-up API call.
    fn push_data_tokens(&self, update: DataTokenUpdate) -> Result<(), CalcError>;

    /// Hand a generated document to the client for download.
    fn download(&self, document: GeneratedDocument) -> Result<(), CalcError>;

    /// A merge rule or downstream pass failed.
    /// Takes the error by value so implementations may queue it.
    fn processing_error(&self, phase: &str, error: CalcError);
}

/// Subject that manages a collection of store observers.
pub struct StoreSubject {
    observers: RwLock<Vec<Arc<dyn StoreObserver>>>,
}

impl StoreSubject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, observer: Arc<dyn StoreObserver>) {
        self.observers.write().push(observer);
    }

    pub fn clear(&self) {
        self.observers.write().clear();
    }

    /// Notify all observers; empty changes are not published.
    pub fn notify(&self, change: &StoreChange) {
        if change.is_empty() {
            return;
        }
        let observers = self.observers.read();
        for observer in observers.iter() {
            observer.on_store_changed(change);
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.observers.read().len()
    }
}

impl Default for StoreSubject {
    fn default() -> Self {
        Self::new()
    }
}
