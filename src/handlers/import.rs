//! Commit endpoint handler
//!
//! The one outward wire contract of the import pipeline: accepts one batch
//! of pre-validated rows and writes it. Rows that fail schema decoding and
//! invoice batches where no row resolves to a client come back as
//! INVALID_REQUEST; storage failures come back as STORAGE_ERROR.

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::services::commit::{CommitError, CommitService, PgCommitService};
use crate::types::import::CommitRequest;
use crate::types::messages::{ErrorResponse, Request, SuccessResponse};

/// Handle invoport.import.commit requests
pub async fn handle_commit(client: Client, mut subscriber: Subscriber, pool: PgPool) -> Result<()> {
    let service = PgCommitService::new(pool);

    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<CommitRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse commit request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let user_id = match request.user_id {
            Some(id) => id,
            None => {
                let error =
                    ErrorResponse::new(request.id, "UNAUTHORIZED", "Missing user identity");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        info!(
            "Commit request: {} {} rows for user {}",
            request.payload.rows.len(),
            request.payload.import_type.as_str(),
            user_id
        );

        let outcome = service
            .commit(user_id, request.payload.import_type, &request.payload.rows)
            .await;

        match outcome {
            Ok(response) if response.success_count == 0 && !response.error_rows.is_empty() => {
                // Nothing was written; every row was skipped at resolution.
                let error = ErrorResponse::new(request.id, "INVALID_REQUEST", response.message.clone())
                    .with_details(serde_json::json!({
                        "successCount": 0,
                        "errorRows": response.error_rows,
                    }));
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
            Ok(response) => {
                let success = SuccessResponse::new(request.id, response);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(CommitError::InvalidRows(message)) => {
                let error = ErrorResponse::new(request.id, "INVALID_REQUEST", message);
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
            Err(CommitError::Storage(message)) => {
                error!("Commit storage failure: {}", message);
                let error = ErrorResponse::new(request.id, "STORAGE_ERROR", message);
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
