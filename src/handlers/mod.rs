//! NATS message handlers

pub mod import;
pub mod jobs;
pub mod ping;
pub mod wizard;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

/// Start all message handlers
pub async fn start_handlers(client: Client, pool: PgPool) -> Result<()> {
    info!("Starting message handlers...");

    // Subscribe to all subjects
    let ping_sub = client.subscribe("invoport.ping").await?;
    let commit_sub = client.subscribe("invoport.import.commit").await?;
    let wizard_start_sub = client.subscribe("invoport.import.wizard.start").await?;
    let wizard_map_sub = client.subscribe("invoport.import.wizard.map").await?;
    let wizard_back_sub = client.subscribe("invoport.import.wizard.back").await?;
    let wizard_preview_sub = client.subscribe("invoport.import.wizard.preview").await?;
    let wizard_run_sub = client.subscribe("invoport.import.wizard.run").await?;
    let wizard_state_sub = client.subscribe("invoport.import.wizard.state").await?;
    let wizard_reset_sub = client.subscribe("invoport.import.wizard.reset").await?;
    let wizard_close_sub = client.subscribe("invoport.import.wizard.close").await?;
    let jobs_history_sub = client.subscribe("invoport.jobs.history").await?;

    info!("Subscribed to NATS subjects");

    // Clone for each handler
    let client_ping = client.clone();
    let client_commit = client.clone();
    let client_wizard_start = client.clone();
    let client_wizard_map = client.clone();
    let client_wizard_back = client.clone();
    let client_wizard_preview = client.clone();
    let client_wizard_run = client.clone();
    let client_wizard_state = client.clone();
    let client_wizard_reset = client.clone();
    let client_wizard_close = client.clone();
    let client_jobs_history = client.clone();

    let pool_commit = pool.clone();
    let pool_wizard_run = pool.clone();

    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let commit_handle = tokio::spawn(async move {
        import::handle_commit(client_commit, commit_sub, pool_commit).await
    });

    let wizard_start_handle = tokio::spawn(async move {
        wizard::handle_start(client_wizard_start, wizard_start_sub).await
    });

    let wizard_map_handle = tokio::spawn(async move {
        wizard::handle_map(client_wizard_map, wizard_map_sub).await
    });

    let wizard_back_handle = tokio::spawn(async move {
        wizard::handle_back(client_wizard_back, wizard_back_sub).await
    });

    let wizard_preview_handle = tokio::spawn(async move {
        wizard::handle_preview(client_wizard_preview, wizard_preview_sub).await
    });

    let wizard_run_handle = tokio::spawn(async move {
        wizard::handle_run(client_wizard_run, wizard_run_sub, pool_wizard_run).await
    });

    let wizard_state_handle = tokio::spawn(async move {
        wizard::handle_state(client_wizard_state, wizard_state_sub).await
    });

    let wizard_reset_handle = tokio::spawn(async move {
        wizard::handle_reset(client_wizard_reset, wizard_reset_sub).await
    });

    let wizard_close_handle = tokio::spawn(async move {
        wizard::handle_close(client_wizard_close, wizard_close_sub).await
    });

    let jobs_history_handle = tokio::spawn(async move {
        jobs::handle_job_history(client_jobs_history, jobs_history_sub).await
    });

    info!("All handlers started");

    // Wait for any handler to finish (they shouldn't)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = commit_handle => {
            error!("Commit handler finished: {:?}", result);
        }
        result = wizard_start_handle => {
            error!("Wizard start handler finished: {:?}", result);
        }
        result = wizard_map_handle => {
            error!("Wizard map handler finished: {:?}", result);
        }
        result = wizard_back_handle => {
            error!("Wizard back handler finished: {:?}", result);
        }
        result = wizard_preview_handle => {
            error!("Wizard preview handler finished: {:?}", result);
        }
        result = wizard_run_handle => {
            error!("Wizard run handler finished: {:?}", result);
        }
        result = wizard_state_handle => {
            error!("Wizard state handler finished: {:?}", result);
        }
        result = wizard_reset_handle => {
            error!("Wizard reset handler finished: {:?}", result);
        }
        result = wizard_close_handle => {
            error!("Wizard close handler finished: {:?}", result);
        }
        result = jobs_history_handle => {
            error!("Jobs history handler finished: {:?}", result);
        }
    }

    Ok(())
}
