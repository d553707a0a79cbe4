//! Job history handlers

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::services::job_history::JOB_HISTORY;
use crate::types::messages::{ErrorResponse, Request, SuccessResponse};

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobHistoryPayload {
    #[serde(default)]
    limit: Option<usize>,
}

/// Handle invoport.jobs.history requests
pub async fn handle_job_history(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let request: Request<JobHistoryPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse job history request: {}", e);
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

        let limit = request.payload.limit.unwrap_or(DEFAULT_LIMIT);
        let history = JOB_HISTORY.get_recent_for_user(user_id, limit);

        let success = SuccessResponse::new(request.id, history);
        let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
    }

    Ok(())
}
