//! Import wizard handlers
//!
//! Hosts wizard sessions over request/reply subjects. Every call replies
//! with the session snapshot (or a typed error), so the frontend can render
//! the current step without tracking state itself. The import run itself is
//! spawned in the background; progress goes out on a per-job status subject.

use anyhow::Result;
use async_nats::{Client, Subscriber};
use chrono::Utc;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::commit::PgCommitService;
use crate::services::import::{run_import, ImportProgress};
use crate::services::job_history::JOB_HISTORY;
use crate::services::preview::{preview, PREVIEW_ROW_LIMIT};
use crate::services::schema::get_schema;
use crate::services::wizard::{self, WizardError, WizardState, WizardStep};
use crate::types::import::{ImportJobStatus, ImportJobStatusUpdate, ImportRowError};
use crate::types::messages::{ErrorResponse, Request, SuccessResponse};
use crate::types::wizard::{
    MapColumnPayload, PreviewView, RunStartedView, SessionClosedView, SessionPayload,
    StartWizardPayload, WizardStateView,
};

const STATUS_PREFIX: &str = "invoport.job.import.status";

fn error_code(e: &WizardError) -> &'static str {
    match e {
        WizardError::Parse(_) => "PARSE_ERROR",
        WizardError::Mapping(_) => "INVALID_REQUEST",
        WizardError::MappingIncomplete { .. } => "MAPPING_INCOMPLETE",
        WizardError::InvalidTransition { .. } => "INVALID_TRANSITION",
        WizardError::NoCsv => "INVALID_TRANSITION",
        WizardError::SessionNotFound => "SESSION_NOT_FOUND",
    }
}

fn state_view(state: &WizardState) -> WizardStateView {
    let schema = state.schema();
    WizardStateView {
        session_id: state.id,
        step: state.step.as_str().to_string(),
        import_type: state.import_type,
        headers: state
            .csv
            .as_ref()
            .map(|csv| csv.headers.clone())
            .unwrap_or_default(),
        row_count: state.csv.as_ref().map(|csv| csv.rows.len()).unwrap_or(0),
        mapping: state
            .mapping
            .as_ref()
            .map(|m| m.view())
            .unwrap_or_default(),
        missing_required: state
            .mapping
            .as_ref()
            .map(|m| m.missing_required(schema))
            .unwrap_or_else(|| schema.required.to_vec())
            .into_iter()
            .map(str::to_string)
            .collect(),
        result: state.result.clone(),
    }
}

/// Parse the envelope, or reply with INVALID_REQUEST and skip the message.
async fn parse_request<T: DeserializeOwned>(
    client: &Client,
    reply: &async_nats::Subject,
    payload: &[u8],
) -> Option<Request<T>> {
    match serde_json::from_slice(payload) {
        Ok(req) => Some(req),
        Err(e) => {
            error!("Failed to parse wizard request: {}", e);
            let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
            if let Ok(bytes) = serde_json::to_vec(&error) {
                let _ = client.publish(reply.clone(), bytes.into()).await;
            }
            None
        }
    }
}

async fn reply_view(client: &Client, reply: async_nats::Subject, request_id: Uuid, session_id: Uuid) {
    let response = match wizard::get_session(session_id) {
        Ok(state) => serde_json::to_vec(&SuccessResponse::new(request_id, state_view(&state))),
        Err(e) => serde_json::to_vec(&ErrorResponse::new(request_id, error_code(&e), e.to_string())),
    };
    match response {
        Ok(bytes) => {
            let _ = client.publish(reply, bytes.into()).await;
        }
        Err(e) => error!("Failed to serialize wizard reply: {}", e),
    }
}

async fn reply_error(client: &Client, reply: async_nats::Subject, request_id: Uuid, e: &WizardError) {
    let error = ErrorResponse::new(request_id, error_code(e), e.to_string());
    if let Ok(bytes) = serde_json::to_vec(&error) {
        let _ = client.publish(reply, bytes.into()).await;
    }
}

/// Handle invoport.import.wizard.start: pick the target type, upload the
/// CSV, get back a fresh session already at the mapping step.
pub async fn handle_start(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<StartWizardPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        let user_id = match request.user_id {
            Some(id) => id,
            None => {
                let error = ErrorResponse::new(request.id, "UNAUTHORIZED", "Missing user identity");
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let mut state = WizardState::new(user_id, request.payload.import_type);
        match state.upload(&request.payload.content) {
            Ok(()) => {
                info!(
                    "Wizard session {} started: {} import, {} rows",
                    state.id,
                    state.import_type.as_str(),
                    state.csv.as_ref().map(|c| c.rows.len()).unwrap_or(0)
                );
                let session_id = state.id;
                wizard::insert_session(state);
                reply_view(&client, reply, request.id, session_id).await;
            }
            Err(e) => {
                // Nothing retained on parse failure; the user re-uploads.
                reply_error(&client, reply, request.id, &e).await;
            }
        }
    }

    Ok(())
}

/// Handle invoport.import.wizard.map
pub async fn handle_map(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<MapColumnPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        let payload = &request.payload;
        let outcome = wizard::with_session(payload.session_id, |state| {
            state.map_column(&payload.header, payload.target_field.as_deref())
        });
        match outcome {
            Ok(()) => reply_view(&client, reply, request.id, payload.session_id).await,
            Err(e) => reply_error(&client, reply, request.id, &e).await,
        }
    }

    Ok(())
}

/// Handle invoport.import.wizard.back
pub async fn handle_back(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<SessionPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        let session_id = request.payload.session_id;
        match wizard::with_session(session_id, |state| state.back()) {
            Ok(()) => reply_view(&client, reply, request.id, session_id).await,
            Err(e) => reply_error(&client, reply, request.id, &e).await,
        }
    }

    Ok(())
}

/// Handle invoport.import.wizard.preview: move to the preview step if still
/// mapping (gated on completeness) and return the bounded validation view.
pub async fn handle_preview(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<SessionPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        let session_id = request.payload.session_id;
        let outcome = wizard::with_session(session_id, |state| {
            if state.step == WizardStep::MapColumns {
                state.to_preview()?;
            } else if state.step != WizardStep::Preview {
                return Err(WizardError::InvalidTransition {
                    from: state.step.as_str(),
                    action: "preview",
                });
            }
            let csv = state.csv.as_ref().ok_or(WizardError::NoCsv)?;
            let mapping = state.mapping.as_ref().ok_or(WizardError::NoCsv)?;
            let schema = state.schema();
            let bounded = preview(&csv.rows, mapping, schema, state.import_type, PREVIEW_ROW_LIMIT);

            let errors = bounded
                .errors
                .iter()
                .map(|(row_index, fields)| ImportRowError {
                    row_index: *row_index,
                    error: fields
                        .iter()
                        .map(|(field, message)| format!("{}: {}", field, message))
                        .collect::<Vec<_>>()
                        .join("; "),
                })
                .collect();

            Ok(PreviewView {
                session_id,
                fields: schema.fields().map(str::to_string).collect(),
                rows: bounded.rows,
                errors,
                total_rows: csv.rows.len(),
            })
        });

        match outcome {
            Ok(view) => {
                let success = SuccessResponse::new(request.id, view);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => reply_error(&client, reply, request.id, &e).await,
        }
    }

    Ok(())
}

/// Handle invoport.import.wizard.run: start the background import for a
/// session sitting at the preview step.
pub async fn handle_run(client: Client, mut subscriber: Subscriber, pool: PgPool) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<SessionPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        let session_id = request.payload.session_id;
        let job_id = Uuid::new_v4();

        // Single-flight: begin_import only succeeds from the preview step.
        match wizard::with_session(session_id, |state| state.begin_import(job_id)) {
            Ok(()) => {
                let run_client = client.clone();
                let run_pool = pool.clone();
                tokio::spawn(async move {
                    run_session_import(run_client, run_pool, session_id, job_id).await;
                });

                let view = RunStartedView {
                    session_id,
                    job_id,
                    status_subject: format!("{}.{}", STATUS_PREFIX, job_id),
                };
                let success = SuccessResponse::new(request.id, view);
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            Err(e) => reply_error(&client, reply, request.id, &e).await,
        }
    }

    Ok(())
}

/// Handle invoport.import.wizard.state
pub async fn handle_state(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<SessionPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        reply_view(&client, reply, request.id, request.payload.session_id).await;
    }

    Ok(())
}

/// Handle invoport.import.wizard.reset
pub async fn handle_reset(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<SessionPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        let session_id = request.payload.session_id;
        let outcome = wizard::with_session(session_id, |state| {
            state.reset();
            Ok(())
        });
        match outcome {
            Ok(()) => reply_view(&client, reply, request.id, session_id).await,
            Err(e) => reply_error(&client, reply, request.id, &e).await,
        }
    }

    Ok(())
}

/// Handle invoport.import.wizard.close: discard the session and everything
/// it holds. A run already in flight finishes on its own schedule; its
/// result is dropped when it reports back to the missing session.
pub async fn handle_close(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };
        let request: Request<SessionPayload> =
            match parse_request(&client, &reply, &msg.payload).await {
                Some(req) => req,
                None => continue,
            };

        let session_id = request.payload.session_id;
        match wizard::remove_session(session_id) {
            Some(_) => {
                info!("Wizard session {} closed", session_id);
                let success = SuccessResponse::new(request.id, SessionClosedView { session_id });
                let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
            }
            None => {
                reply_error(&client, reply, request.id, &WizardError::SessionNotFound).await;
            }
        }
    }

    Ok(())
}

/// Drive one session's import to completion and publish status along the way.
async fn run_session_import(client: Client, pool: PgPool, session_id: Uuid, job_id: Uuid) {
    let state = match wizard::get_session(session_id) {
        Ok(state) => state,
        Err(e) => {
            error!("Import job {} lost its session: {}", job_id, e);
            return;
        }
    };
    let user_id = state.user_id;
    let import_type = state.import_type;
    let (csv, mapping) = match (state.csv, state.mapping) {
        (Some(csv), Some(mapping)) => (csv, mapping),
        _ => {
            error!("Import job {} has no uploaded data", job_id);
            JOB_HISTORY.record_failed(
                job_id,
                &format!("import.{}", import_type.as_str()),
                user_id,
                Utc::now(),
                "No uploaded data for session".to_string(),
            );
            publish_status(
                &client,
                job_id,
                ImportJobStatus::Failed {
                    error: "No uploaded data for session".to_string(),
                },
            )
            .await;
            return;
        }
    };
    let schema = get_schema(import_type);
    let job_type = format!("import.{}", import_type.as_str());
    let started_at = Utc::now();

    publish_status(&client, job_id, ImportJobStatus::Queued).await;

    // Progress callbacks are synchronous; bridge them to the status subject
    // through a channel so publishing never blocks a batch.
    let (tx, mut rx) = mpsc::unbounded_channel::<ImportProgress>();
    let progress_client = client.clone();
    let progress_task = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            publish_status(
                &progress_client,
                job_id,
                ImportJobStatus::Importing {
                    attempted: p.attempted,
                    total: p.total,
                    succeeded: p.succeeded,
                },
            )
            .await;
        }
    });

    let service = PgCommitService::new(pool);
    let result = run_import(
        &csv.rows,
        &mapping,
        schema,
        import_type,
        user_id,
        &service,
        |p| {
            let _ = tx.send(p);
        },
    )
    .await;

    drop(tx);
    let _ = progress_task.await;

    // The session may have been reset, closed or restarted mid-run; only the
    // still-active run moves it to summary. The job record and the final
    // status publish carry the result either way.
    match wizard::with_session(session_id, |s| Ok(s.complete(job_id, result.clone()))) {
        Ok(true) => {}
        Ok(false) => {
            warn!("Import job {} finished for a superseded run; result dropped", job_id)
        }
        Err(e) => warn!("Import job {} could not update its session: {}", job_id, e),
    }

    JOB_HISTORY.record_completed(
        job_id,
        &job_type,
        user_id,
        started_at,
        Some(format!(
            "{} imported, {} skipped, {} errors",
            result.success_count,
            result.skipped_count,
            result.error_rows.len() + result.batch_errors.len()
        )),
    );

    info!(
        "Import job {} completed: {} imported, {} skipped",
        job_id, result.success_count, result.skipped_count
    );
    publish_status(&client, job_id, ImportJobStatus::Completed { result }).await;
}

async fn publish_status(client: &Client, job_id: Uuid, status: ImportJobStatus) {
    let update = ImportJobStatusUpdate::new(job_id, status);
    let subject = format!("{}.{}", STATUS_PREFIX, job_id);
    match serde_json::to_vec(&update) {
        Ok(bytes) => {
            if let Err(e) = client.publish(subject, bytes.into()).await {
                warn!("Failed to publish status for job {}: {}", job_id, e);
            }
        }
        Err(e) => warn!("Failed to serialize status for job {}: {}", job_id, e),
    }
}
