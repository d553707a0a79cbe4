//! Wire payloads for the import wizard subjects

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::import::{ImportResult, ImportRowError, ImportType, TransformedRow};

/// Payload of `invoport.import.wizard.start`: pick the target and upload
/// the raw CSV content in one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWizardPayload {
    pub import_type: ImportType,
    pub content: String,
}

/// Payload of `invoport.import.wizard.map`: point one CSV header at a
/// target field, or clear it with `target_field: null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapColumnPayload {
    pub session_id: Uuid,
    pub header: String,
    pub target_field: Option<String>,
}

/// Payload for session-scoped calls that carry no other data
/// (back, preview, run, state, reset).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub session_id: Uuid,
}

/// Snapshot of a wizard session returned from every wizard call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardStateView {
    pub session_id: Uuid,
    pub step: String,
    pub import_type: ImportType,
    pub headers: Vec<String>,
    pub row_count: usize,
    /// CSV header -> target field, unmapped headers map to null.
    pub mapping: BTreeMap<String, Option<String>>,
    pub missing_required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ImportResult>,
}

/// Reply to `invoport.import.wizard.preview`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewView {
    pub session_id: Uuid,
    /// Target fields in display order.
    pub fields: Vec<String>,
    pub rows: Vec<TransformedRow>,
    pub errors: Vec<ImportRowError>,
    pub total_rows: usize,
}

/// Reply to `invoport.import.wizard.close`: the session and all run data
/// it held are gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClosedView {
    pub session_id: Uuid,
}

/// Reply to `invoport.import.wizard.run`: the import continues in the
/// background, progress arrives on `status_subject`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartedView {
    pub session_id: Uuid,
    pub job_id: Uuid,
    pub status_subject: String,
}
