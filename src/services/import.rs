//! Import orchestrator
//!
//! Validates the whole dataset, partitions the valid rows into fixed-size
//! batches and submits them strictly one after another. A failed batch is
//! recorded and skipped over; it never aborts the batches behind it, so the
//! run is best-effort with visible partial results.

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::commit::CommitService;
use super::mapping::ColumnMapping;
use super::parser::RawRow;
use super::schema::SchemaDefinition;
use super::transform::transform;
use crate::types::import::{ImportResult, ImportRowError, ImportType, TransformedRow};

pub const BATCH_SIZE: usize = 500;

pub const NO_VALID_ROWS: &str = "No valid data found to import after validation";

/// Cumulative progress after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportProgress {
    /// Valid rows submitted so far, including rows in failed batches.
    pub attempted: usize,
    /// Total valid rows in the run.
    pub total: usize,
    pub succeeded: u32,
}

/// Run a full import. Never fails outright: every stage's failure is folded
/// into the returned result.
pub async fn run_import(
    rows: &[RawRow],
    mapping: &ColumnMapping,
    schema: &SchemaDefinition,
    import_type: ImportType,
    user_id: Uuid,
    commit: &dyn CommitService,
    mut on_progress: impl FnMut(ImportProgress) + Send,
) -> ImportResult {
    let mut result = ImportResult::default();

    // Full-dataset validation pass. Valid rows keep their original file
    // index for error reporting.
    let mut valid: Vec<(usize, TransformedRow)> = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let (transformed, errors) = transform(row, mapping, schema, import_type);
        if errors.is_empty() {
            valid.push((index, transformed));
        } else {
            result.skipped_count += 1;
        }
    }

    if valid.is_empty() {
        result.batch_errors.push(NO_VALID_ROWS.to_string());
        return result;
    }

    let total = valid.len();
    info!(
        "Starting {} import: {} valid rows, {} skipped, {} batches",
        import_type.as_str(),
        total,
        result.skipped_count,
        total.div_ceil(BATCH_SIZE)
    );

    for (batch_index, batch) in valid.chunks(BATCH_SIZE).enumerate() {
        let offset = batch_index * BATCH_SIZE;
        let payloads: Vec<Value> = batch
            .iter()
            .map(|(_, row)| Value::Object(row.to_payload()))
            .collect();

        match commit.commit(user_id, import_type, &payloads).await {
            Ok(response) => {
                result.success_count += response.success_count;
                for row_error in response.error_rows {
                    // The commit service indexes within the batch; translate
                    // back to the original file position.
                    let original = batch
                        .get(row_error.row_index)
                        .map(|(index, _)| *index)
                        .unwrap_or(offset + row_error.row_index);
                    result.error_rows.push(ImportRowError {
                        row_index: original,
                        error: row_error.error,
                    });
                }
            }
            Err(e) => {
                warn!("Import batch at offset {} failed: {}", offset, e);
                result
                    .batch_errors
                    .push(format!("Error processing batch starting at row {}: {}", offset, e));
            }
        }

        on_progress(ImportProgress {
            attempted: offset + batch.len(),
            total,
            succeeded: result.success_count,
        });
    }

    info!(
        "Import finished: {} succeeded, {} skipped, {} row errors, {} batch errors",
        result.success_count,
        result.skipped_count,
        result.error_rows.len(),
        result.batch_errors.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::commit::CommitError;
    use crate::services::schema::get_schema;
    use crate::types::import::CommitResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Test double that records batches and replays scripted outcomes.
    struct ScriptedCommit {
        batches: Mutex<Vec<Vec<Value>>>,
        outcomes: Mutex<Vec<Result<CommitResponse, CommitError>>>,
    }

    impl ScriptedCommit {
        fn succeeding() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                outcomes: Mutex::new(Vec::new()),
            }
        }

        fn with_outcomes(outcomes: Vec<Result<CommitResponse, CommitError>>) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                outcomes: Mutex::new(outcomes),
            }
        }
    }

    #[async_trait]
    impl CommitService for ScriptedCommit {
        async fn commit(
            &self,
            _user_id: Uuid,
            _import_type: ImportType,
            rows: &[Value],
        ) -> Result<CommitResponse, CommitError> {
            self.batches.lock().push(rows.to_vec());
            let mut outcomes = self.outcomes.lock();
            if outcomes.is_empty() {
                Ok(CommitResponse {
                    message: "ok".to_string(),
                    success_count: rows.len() as u32,
                    error_rows: vec![],
                })
            } else {
                outcomes.remove(0)
            }
        }
    }

    fn client_rows(count: usize) -> Vec<RawRow> {
        (0..count)
            .map(|i| {
                let mut row = RawRow::new();
                row.insert("name".to_string(), format!("Client {}", i));
                row.insert("email".to_string(), format!("c{}@x.com", i));
                row
            })
            .collect()
    }

    fn client_mapping() -> ColumnMapping {
        let schema = get_schema(ImportType::Clients);
        ColumnMapping::propose(&["name".to_string(), "email".to_string()], schema)
    }

    #[tokio::test]
    async fn test_batches_partition_valid_rows_exactly() {
        let rows = client_rows(1201);
        let commit = ScriptedCommit::succeeding();
        let schema = get_schema(ImportType::Clients);

        let result = run_import(
            &rows,
            &client_mapping(),
            schema,
            ImportType::Clients,
            Uuid::new_v4(),
            &commit,
            |_| {},
        )
        .await;

        let batches = commit.batches.lock();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 500);
        assert_eq!(batches[1].len(), 500);
        assert_eq!(batches[2].len(), 201);
        assert_eq!(result.success_count, 1201);
        assert_eq!(result.skipped_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_rows_are_skipped_not_submitted() {
        let mut rows = client_rows(3);
        rows[1].insert("email".to_string(), "not-an-email".to_string());
        let commit = ScriptedCommit::succeeding();
        let schema = get_schema(ImportType::Clients);

        let result = run_import(
            &rows,
            &client_mapping(),
            schema,
            ImportType::Clients,
            Uuid::new_v4(),
            &commit,
            |_| {},
        )
        .await;

        assert_eq!(result.success_count, 2);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(commit.batches.lock()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_no_valid_rows_short_circuits() {
        let mut rows = client_rows(2);
        rows[0].insert("email".to_string(), String::new());
        rows[1].insert("email".to_string(), String::new());
        let commit = ScriptedCommit::succeeding();
        let schema = get_schema(ImportType::Clients);

        let result = run_import(
            &rows,
            &client_mapping(),
            schema,
            ImportType::Clients,
            Uuid::new_v4(),
            &commit,
            |_| {},
        )
        .await;

        assert_eq!(result.success_count, 0);
        assert_eq!(result.skipped_count, 2);
        assert_eq!(result.batch_errors, vec![NO_VALID_ROWS.to_string()]);
        assert!(commit.batches.lock().is_empty(), "no batch may be submitted");
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_abort_later_batches() {
        let rows = client_rows(1100);
        let commit = ScriptedCommit::with_outcomes(vec![
            Ok(CommitResponse {
                message: "ok".to_string(),
                success_count: 500,
                error_rows: vec![],
            }),
            Err(CommitError::Storage("connection reset".to_string())),
            Ok(CommitResponse {
                message: "ok".to_string(),
                success_count: 100,
                error_rows: vec![],
            }),
        ]);
        let schema = get_schema(ImportType::Clients);

        let result = run_import(
            &rows,
            &client_mapping(),
            schema,
            ImportType::Clients,
            Uuid::new_v4(),
            &commit,
            |_| {},
        )
        .await;

        assert_eq!(commit.batches.lock().len(), 3);
        assert_eq!(result.success_count, 600);
        assert_eq!(result.batch_errors.len(), 1);
        assert_eq!(
            result.batch_errors[0],
            "Error processing batch starting at row 500: connection reset"
        );
    }

    #[tokio::test]
    async fn test_row_errors_are_translated_to_file_positions() {
        // Row 1 fails validation, so valid rows are file rows 0 and 2. The
        // commit service reports an error for its row 1, which is file row 2.
        let mut rows = client_rows(3);
        rows[1].insert("email".to_string(), String::new());
        let commit = ScriptedCommit::with_outcomes(vec![Ok(CommitResponse {
            message: "ok".to_string(),
            success_count: 1,
            error_rows: vec![ImportRowError {
                row_index: 1,
                error: "Client with email 'c2@x.com' not found.".to_string(),
            }],
        })]);
        let schema = get_schema(ImportType::Clients);

        let result = run_import(
            &rows,
            &client_mapping(),
            schema,
            ImportType::Clients,
            Uuid::new_v4(),
            &commit,
            |_| {},
        )
        .await;

        assert_eq!(result.error_rows.len(), 1);
        assert_eq!(result.error_rows[0].row_index, 2);
    }

    /// Keyed in-memory store mirroring the upsert semantics: clients keyed
    /// by email, invoices keyed by invoice number, invoice rows resolved
    /// against the client set.
    struct InMemoryStore {
        clients: Mutex<std::collections::HashMap<String, Value>>,
        invoices: Mutex<std::collections::HashMap<String, Value>>,
    }

    impl InMemoryStore {
        fn with_clients(emails: &[&str]) -> Self {
            let clients = emails
                .iter()
                .map(|e| (e.to_lowercase(), Value::Null))
                .collect();
            Self {
                clients: Mutex::new(clients),
                invoices: Mutex::new(std::collections::HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl CommitService for InMemoryStore {
        async fn commit(
            &self,
            _user_id: Uuid,
            import_type: ImportType,
            rows: &[Value],
        ) -> Result<CommitResponse, CommitError> {
            match import_type {
                ImportType::Clients => {
                    let mut clients = self.clients.lock();
                    for row in rows {
                        let email = row["email"].as_str().unwrap().to_lowercase();
                        clients.insert(email, row.clone());
                    }
                    Ok(CommitResponse {
                        message: "ok".to_string(),
                        success_count: rows.len() as u32,
                        error_rows: vec![],
                    })
                }
                ImportType::Invoices => {
                    let clients = self.clients.lock();
                    let mut invoices = self.invoices.lock();
                    let mut error_rows = Vec::new();
                    let mut written = 0u32;
                    for (row_index, row) in rows.iter().enumerate() {
                        let email = row["client_email"].as_str().unwrap();
                        if clients.contains_key(&email.to_lowercase()) {
                            let number = row["invoice_number"].as_str().unwrap();
                            invoices.insert(number.to_string(), row.clone());
                            written += 1;
                        } else {
                            error_rows.push(ImportRowError {
                                row_index,
                                error: format!("Client with email '{}' not found.", email),
                            });
                        }
                    }
                    Ok(CommitResponse {
                        message: "ok".to_string(),
                        success_count: written,
                        error_rows,
                    })
                }
            }
        }
    }

    #[tokio::test]
    async fn test_rerunning_same_import_reaches_same_state() {
        let rows = client_rows(7);
        let store = InMemoryStore::with_clients(&[]);
        let schema = get_schema(ImportType::Clients);

        for _ in 0..2 {
            let result = run_import(
                &rows,
                &client_mapping(),
                schema,
                ImportType::Clients,
                Uuid::new_v4(),
                &store,
                |_| {},
            )
            .await;
            assert_eq!(result.success_count, 7);
        }

        // Upserting twice leaves exactly one stored row per email.
        assert_eq!(store.clients.lock().len(), 7);
    }

    #[tokio::test]
    async fn test_clients_end_to_end_with_one_invalid_row() {
        let schema = get_schema(ImportType::Clients);
        let csv = "Full Name,Email,Phone\nAcme,a@x.com,111\nBeta,,222\nGamma,c@x.com,333\n";
        let parsed = crate::services::parser::parse(csv).unwrap();

        let mut mapping = ColumnMapping::propose(&parsed.headers, schema);
        mapping.assign("Full Name", Some("name"), schema).unwrap();
        mapping.assign("Email", Some("email"), schema).unwrap();
        mapping.assign("Phone", Some("phone"), schema).unwrap();

        let bounded = crate::services::preview::preview(
            &parsed.rows,
            &mapping,
            schema,
            ImportType::Clients,
            crate::services::preview::PREVIEW_ROW_LIMIT,
        );
        assert_eq!(bounded.errors[&1]["email"], "Required field is missing");

        let store = InMemoryStore::with_clients(&[]);
        let result = run_import(
            &parsed.rows,
            &mapping,
            schema,
            ImportType::Clients,
            Uuid::new_v4(),
            &store,
            |_| {},
        )
        .await;

        assert_eq!(result.success_count, 2);
        assert_eq!(result.skipped_count, 1);
        assert!(result.batch_errors.is_empty());
        assert_eq!(store.clients.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_invoices_end_to_end_with_unresolved_client() {
        let schema = get_schema(ImportType::Invoices);
        let csv = "invoice_number,client_email,issue_date,due_date,subtotal,total\n\
                   INV-1,A@X.com,2024-03-01,2024-04-01,100,100\n\
                   INV-2,b@x.com,2024-03-02,2024-04-02,50,50\n";
        let parsed = crate::services::parser::parse(csv).unwrap();
        let mapping = ColumnMapping::propose(&parsed.headers, schema);

        let store = InMemoryStore::with_clients(&["a@x.com"]);
        let result = run_import(
            &parsed.rows,
            &mapping,
            schema,
            ImportType::Invoices,
            Uuid::new_v4(),
            &store,
            |_| {},
        )
        .await;

        // Mixed-case email resolves; the absent one is skipped with an error.
        assert_eq!(result.success_count, 1);
        assert_eq!(result.error_rows.len(), 1);
        assert_eq!(result.error_rows[0].row_index, 1);
        assert_eq!(
            result.error_rows[0].error,
            "Client with email 'b@x.com' not found."
        );
        assert_eq!(store.invoices.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let rows = client_rows(1201);
        let commit = ScriptedCommit::succeeding();
        let schema = get_schema(ImportType::Clients);
        let mut seen: Vec<ImportProgress> = Vec::new();

        run_import(
            &rows,
            &client_mapping(),
            schema,
            ImportType::Clients,
            Uuid::new_v4(),
            &commit,
            |p| seen.push(p),
        )
        .await;

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].attempted, 500);
        assert_eq!(seen[1].attempted, 1000);
        assert_eq!(seen[2].attempted, 1201);
        assert!(seen.windows(2).all(|w| w[0].succeeded <= w[1].succeeded));
        assert_eq!(seen[2].total, 1201);
    }
}
