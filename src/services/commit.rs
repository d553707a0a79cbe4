//! Commit service: the storage-writing half of the import pipeline
//!
//! Accepts one batch of rows per call. Clients are a single upsert keyed on
//! (user_id, email). Invoices first resolve each row's client email against
//! a fresh snapshot of the owner's clients, then upsert the resolved rows
//! keyed on (user_id, invoice_number). Both writes are all-or-nothing per
//! call; partial results only arise from the resolution filter.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::queries::{client, invoice};
use crate::types::import::{
    ClientUpsertRow, CommitResponse, ImportRowError, ImportType, InvoiceUpsertRow,
};

#[derive(Debug, Error)]
pub enum CommitError {
    /// Rows do not match the target schema. Maps to a 400-class reply.
    #[error("{0}")]
    InvalidRows(String),
    /// Storage-layer failure. Fails the whole batch.
    #[error("{0}")]
    Storage(String),
}

/// Seam between the import orchestrator and the storage layer.
#[async_trait]
pub trait CommitService: Send + Sync {
    async fn commit(
        &self,
        user_id: Uuid,
        import_type: ImportType,
        rows: &[serde_json::Value],
    ) -> Result<CommitResponse, CommitError>;
}

/// Postgres-backed commit service.
pub struct PgCommitService {
    pool: PgPool,
}

impl PgCommitService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn commit_clients(
        &self,
        user_id: Uuid,
        rows: Vec<ClientUpsertRow>,
    ) -> Result<CommitResponse, CommitError> {
        let count = client::upsert_clients(&self.pool, user_id, &rows)
            .await
            .map_err(|e| CommitError::Storage(e.to_string()))?;

        info!("Upserted {} client rows for user {}", count, user_id);
        Ok(CommitResponse {
            message: format!("Imported {} clients", count),
            success_count: count as u32,
            error_rows: vec![],
        })
    }

    async fn commit_invoices(
        &self,
        user_id: Uuid,
        rows: Vec<InvoiceUpsertRow>,
    ) -> Result<CommitResponse, CommitError> {
        // Fresh snapshot per call; see the client query for consistency notes.
        let email_index = client::client_email_index(&self.pool, user_id)
            .await
            .map_err(|e| CommitError::Storage(e.to_string()))?;

        let mut resolved: Vec<(InvoiceUpsertRow, Uuid)> = Vec::new();
        let mut error_rows: Vec<ImportRowError> = Vec::new();

        for (row_index, row) in rows.into_iter().enumerate() {
            match email_index.get(&row.client_email.to_lowercase()) {
                Some(client_id) => resolved.push((row, *client_id)),
                None => {
                    error_rows.push(ImportRowError {
                        row_index,
                        error: format!("Client with email '{}' not found.", row.client_email),
                    });
                }
            }
        }

        if resolved.is_empty() {
            warn!(
                "Invoice batch for user {} had no resolvable client emails ({} skipped)",
                user_id,
                error_rows.len()
            );
            return Ok(CommitResponse {
                message: "No invoices imported: no rows with a matching client".to_string(),
                success_count: 0,
                error_rows,
            });
        }

        let count = invoice::upsert_invoices(&self.pool, user_id, &resolved)
            .await
            .map_err(|e| CommitError::Storage(e.to_string()))?;

        info!(
            "Upserted {} invoice rows for user {} ({} unresolved)",
            count,
            user_id,
            error_rows.len()
        );
        Ok(CommitResponse {
            message: format!("Imported {} invoices", count),
            success_count: count as u32,
            error_rows,
        })
    }
}

#[async_trait]
impl CommitService for PgCommitService {
    async fn commit(
        &self,
        user_id: Uuid,
        import_type: ImportType,
        rows: &[serde_json::Value],
    ) -> Result<CommitResponse, CommitError> {
        match import_type {
            ImportType::Clients => {
                let rows = decode_rows::<ClientUpsertRow>(rows)?;
                self.commit_clients(user_id, rows).await
            }
            ImportType::Invoices => {
                let rows = decode_rows::<InvoiceUpsertRow>(rows)?;
                self.commit_invoices(user_id, rows).await
            }
        }
    }
}

fn decode_rows<T: serde::de::DeserializeOwned>(
    rows: &[serde_json::Value],
) -> Result<Vec<T>, CommitError> {
    rows.iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value(value.clone())
                .map_err(|e| CommitError::InvalidRows(format!("Invalid row at index {}: {}", i, e)))
        })
        .collect()
}
