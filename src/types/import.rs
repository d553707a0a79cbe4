//! Import pipeline types for CSV bulk import of clients and invoices

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two supported import targets. Selected once per wizard run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    Clients,
    Invoices,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Clients => "clients",
            ImportType::Invoices => "invoices",
        }
    }
}

/// A single transformed cell value.
///
/// Dates are kept as calendar dates internally; each consumer formats them
/// on demand (date-only for preview, UTC-midnight instant for the commit
/// payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

/// A row after mapping and coercion: target field name -> value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformedRow {
    pub values: BTreeMap<String, CellValue>,
}

impl TransformedRow {
    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.values.get(field)
    }

    /// Build the commit payload object: dates become RFC 3339 UTC-midnight
    /// instants, numbers stay native JSON numbers.
    pub fn to_payload(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut payload = serde_json::Map::new();
        for (field, value) in &self.values {
            let json = match value {
                CellValue::Null => serde_json::Value::Null,
                CellValue::Number(n) => serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
                CellValue::Date(d) => serde_json::Value::String(
                    d.and_hms_opt(0, 0, 0).unwrap().and_utc().to_rfc3339(),
                ),
                CellValue::Text(s) => serde_json::Value::String(s.clone()),
            };
            payload.insert(field.clone(), json);
        }
        payload
    }

    /// Render a cell for the preview table.
    pub fn preview_value(&self, field: &str) -> String {
        match self.values.get(field) {
            Some(CellValue::Text(s)) => s.clone(),
            Some(CellValue::Number(n)) => n.to_string(),
            Some(CellValue::Date(d)) => d.format("%Y-%m-%d").to_string(),
            Some(CellValue::Null) | None => String::new(),
        }
    }
}

/// Per-field validation messages for one row. Empty map = valid row.
pub type RowErrors = BTreeMap<String, String>;

/// A row-level import error, keyed by row position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    pub row_index: usize,
    pub error: String,
}

/// Accumulated outcome of a full import run.
///
/// Succeeded, skipped-for-validation and errored rows are distinguished
/// explicitly; the run is best-effort, never all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success_count: u32,
    pub skipped_count: u32,
    pub error_rows: Vec<ImportRowError>,
    pub batch_errors: Vec<String>,
}

// =============================================================================
// COMMIT ENDPOINT WIRE TYPES
// =============================================================================

/// Body of the `invoport.import.commit` subject.
///
/// Row objects use the canonical target-storage field names (snake_case);
/// dates are ISO instant strings and amounts native JSON numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    #[serde(rename = "type")]
    pub import_type: ImportType,
    pub rows: Vec<serde_json::Value>,
}

/// Reply for a commit call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub message: String,
    pub success_count: u32,
    pub error_rows: Vec<ImportRowError>,
}

/// A client row as accepted by the commit endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientUpsertRow {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
}

/// An invoice row as accepted by the commit endpoint. `client_email` is the
/// external reference resolved to a client id before the upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceUpsertRow {
    pub invoice_number: String,
    pub client_email: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub subtotal: f64,
    #[serde(default)]
    pub tax: Option<f64>,
    #[serde(default)]
    pub discount: Option<f64>,
    pub total: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
}

// =============================================================================
// IMPORT JOB STATUS
// =============================================================================

/// Status of a running import, published to the per-job status subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ImportJobStatus {
    Queued,
    #[serde(rename_all = "camelCase")]
    Importing {
        attempted: usize,
        total: usize,
        succeeded: u32,
    },
    #[serde(rename_all = "camelCase")]
    Completed { result: ImportResult },
    #[serde(rename_all = "camelCase")]
    Failed { error: String },
}

/// Status update envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobStatusUpdate {
    pub job_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub status: ImportJobStatus,
}

impl ImportJobStatusUpdate {
    pub fn new(job_id: Uuid, status: ImportJobStatus) -> Self {
        Self {
            job_id,
            timestamp: Utc::now(),
            status,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
