//! Merge side effects: document delivery and the per-calculation queue.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use calcflow_core::constants::phases;
use calcflow_core::downstream::{DataTokenUpdate, GeneratedDocument};
use calcflow_core::{CalcError, MergeSink};

/// Receives generated documents.
pub trait DocumentSink: Send + Sync {
    fn deliver(&self, document: &GeneratedDocument) -> Result<(), CalcError>;
}

/// Writes documents into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSink {
    dir: PathBuf,
}

impl DirectoryDocumentSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target path; only the final component of the reported name is used.
    #[must_use]
    pub fn path_for(&self, document: &GeneratedDocument) -> PathBuf {
        let name = Path::new(&document.file_name)
            .file_name()
            .map_or_else(|| calcflow_core::constants::downstream::DEFAULT_FILE_NAME.into(), PathBuf::from);
        self.dir.join(name)
    }
}

impl DocumentSink for DirectoryDocumentSink {
    fn deliver(&self, document: &GeneratedDocument) -> Result<(), CalcError> {
        let path = self.path_for(document);
        std::fs::create_dir_all(&self.dir)
            .and_then(|()| std::fs::write(&path, &document.content))
            .map_err(|e| {
                CalcError::processing(
                    phases::PROCESS_DOCGEN_RESULTS,
                    format!("failed to write {}: {e}", path.display()),
                )
            })?;
        info!(path = %path.display(), content_type = %document.content_type, bytes = document.content.len(), "document saved");
        Ok(())
    }
}

/// [`MergeSink`] for one calculation.
///
/// Every side effect is queued. The merge runs under the state write lock,
/// so the coordinator drains the queues and notifies only after releasing it.
#[derive(Default)]
pub struct CalculationSink {
    data_updates: Mutex<Vec<DataTokenUpdate>>,
    documents: Mutex<Vec<GeneratedDocument>>,
    errors: Mutex<Vec<(String, CalcError)>>,
}

impl CalculationSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain queued data-token updates.
    pub fn take_data_updates(&self) -> Vec<DataTokenUpdate> {
        std::mem::take(&mut *self.data_updates.lock())
    }

    /// Drain queued documents.
    pub fn take_documents(&self) -> Vec<GeneratedDocument> {
        std::mem::take(&mut *self.documents.lock())
    }

    /// Drain queued processing errors with their phase.
    pub fn take_processing_errors(&self) -> Vec<(String, CalcError)> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl MergeSink for CalculationSink {
    fn push_data_tokens(&self, update: DataTokenUpdate) -> Result<(), CalcError> {
        debug!(tokens = update.data_tokens.len(), "queueing data updates");
        self.data_updates.lock().push(update);
        Ok(())
    }

    fn download(&self, document: GeneratedDocument) -> Result<(), CalcError> {
        debug!(file_name = %document.file_name, "queueing document");
        self.documents.lock().push(document);
        Ok(())
    }

    fn processing_error(&self, phase: &str, error: CalcError) {
        self.errors.lock().push((phase.to_string(), error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcflow_core::downstream::DataToken;

    fn document(name: &str) -> GeneratedDocument {
        GeneratedDocument {
            file_name: name.into(),
            content_type: "application/pdf".into(),
            content: b"%PDF".to_vec(),
        }
    }

    #[test]
    fn directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryDocumentSink::new(dir.path().join("out"));
        sink.deliver(&document("Report.pdf")).unwrap();
        assert_eq!(std::fs::read(dir.path().join("out/Report.pdf")).unwrap(), b"%PDF");
    }

    #[test]
    fn directory_sink_strips_path_components() {
        let sink = DirectoryDocumentSink::new("/tmp/downloads");
        assert_eq!(
            sink.path_for(&document("../../etc/passwd")),
            PathBuf::from("/tmp/downloads/passwd")
        );
    }

    #[test]
    fn calculation_sink_queues_tokens() {
        let sink = CalculationSink::new();
        sink.push_data_tokens(DataTokenUpdate {
            data_tokens: vec![DataToken { name: "data-updates".into(), token: "t".into() }],
        })
        .unwrap();
        assert_eq!(sink.take_data_updates().len(), 1);
        assert!(sink.take_data_updates().is_empty());
    }

    #[test]
    fn calculation_sink_queues_documents_and_errors() {
        let sink = CalculationSink::new();
        sink.download(document("a.pdf")).unwrap();
        sink.processing_error(phases::PROCESS_TABLE, CalcError::processing(phases::PROCESS_TABLE, "bad row"));

        let documents = sink.take_documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].file_name, "a.pdf");
        let errors = sink.take_processing_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, phases::PROCESS_TABLE);
        assert!(sink.take_documents().is_empty());
        assert!(sink.take_processing_errors().is_empty());
    }
}
