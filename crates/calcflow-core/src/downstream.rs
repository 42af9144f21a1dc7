//! Downstream passes over normalized results: data-token push and
//! document generation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::constants::{downstream, phases, tables};
use crate::error::CalcError;
use crate::tabdef::{row_id, row_text, Row, TabDef};

/// One token pushed back to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataToken {
    pub name: String,
    pub token: String,
}

/// Aggregate payload of the `rble/jwtupdate` API call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataTokenUpdate {
    pub data_tokens: Vec<DataToken>,
}

impl DataTokenUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_tokens.is_empty()
    }
}

/// A decoded document ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Gather every `jwt-data` row with `@id == "data-updates"` across all tabs.
#[must_use]
pub fn collect_data_tokens(tab_defs: &[TabDef]) -> DataTokenUpdate {
    let data_tokens = tab_defs
        .iter()
        .filter_map(|t| t.table(tables::JWT_DATA))
        .flatten()
        .filter(|r| row_id(r) == Some(downstream::DATA_UPDATES_ID))
        .map(|r| DataToken {
            name: downstream::DATA_UPDATES_ID.to_string(),
            token: row_text(r, "value").unwrap_or_default().to_string(),
        })
        .collect();
    DataTokenUpdate { data_tokens }
}

/// Decode every `api-actions` row with `action == "DocGen"`, one result per row.
///
/// A row that reports an exception or fails to decode yields an error in its
/// own slot; the remaining rows are unaffected.
#[must_use]
pub fn collect_documents(tab_defs: &[TabDef]) -> Vec<Result<GeneratedDocument, CalcError>> {
    tab_defs
        .iter()
        .filter_map(|t| t.table(tables::API_ACTIONS))
        .flatten()
        .filter(|r| row_text(r, "action") == Some(downstream::DOCGEN_ACTION))
        .map(decode_document)
        .collect()
}

fn decode_document(row: &Row) -> Result<GeneratedDocument, CalcError> {
    let file_name = row_text(row, "file-name")
        .filter(|s| !s.is_empty())
        .unwrap_or(downstream::DEFAULT_FILE_NAME);

    if let Some(exception) = row_text(row, "exception").filter(|s| !s.is_empty()) {
        return Err(CalcError::processing(
            phases::PROCESS_DOCGEN_RESULTS,
            format!("document {file_name} failed: {exception}"),
        ));
    }

    let encoded = row_text(row, "content").unwrap_or_default();
    let content = STANDARD.decode(encoded.trim()).map_err(|e| {
        CalcError::processing(
            phases::PROCESS_DOCGEN_RESULTS,
            format!("document {file_name} is not valid base64: {e}"),
        )
    })?;

    Ok(GeneratedDocument {
        file_name: file_name.to_string(),
        content_type: row_text(row, "content-type")
            .filter(|s| !s.is_empty())
            .unwrap_or(downstream::DEFAULT_CONTENT_TYPE)
            .to_string(),
        content,
    })
}
