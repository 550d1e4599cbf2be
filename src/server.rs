//! Process wiring: open the local store, build the remote adapters, hydrate the
//! session, and serve the HTTP API.
//!
//! [`setup_shared_state`] is shared by `serve` and the one-shot CLI commands so
//! both see the same reconciled session.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::api::{self, AppState};
use crate::config::SamsayaConfig;
use crate::identity::IdentityGate;
use crate::llm::gemini::GeminiClient;
use crate::llm::ChatModel;
use crate::store::{self, local::LocalStore};
use crate::sync::coordinator::RemoteLoad;
use crate::sync::SessionCoordinator;

/// Open the local store, build remotes, and hydrate the session from every store.
pub async fn setup_shared_state(config: SamsayaConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let local = Arc::new(
        LocalStore::open(&db_path)
            .with_context(|| format!("failed to open local store at {}", db_path.display()))?,
    );
    tracing::info!(db = %db_path.display(), "local store ready");

    let remotes = store::build_remotes(&config);
    let coordinator = SessionCoordinator::open(Arc::clone(&local), remotes.clone(), &config.sync)
        .context("failed to load local session")?;
    tracing::info!(session_id = %coordinator.session_id(), remotes = remotes.len(), "session loaded");

    for report in coordinator.hydrate_remotes().await {
        match &report.outcome {
            RemoteLoad::Applied { changed } => {
                tracing::info!(store = report.store, changed = *changed, "remote session merged")
            }
            RemoteLoad::Failed { error } => {
                tracing::warn!(store = report.store, error = %error, "remote session not loaded")
            }
            _ => tracing::debug!(store = report.store, outcome = ?report.outcome, "remote hydration"),
        }
    }

    let identity = Arc::new(IdentityGate::new(
        Arc::clone(&local),
        remotes,
        config.identity.guest_limit_minutes,
    ));
    let model: Arc<dyn ChatModel> = Arc::new(GeminiClient::new(config.llm.clone(), Arc::clone(&local)));

    Ok(AppState {
        config: Arc::new(config),
        local,
        coordinator,
        identity,
        model,
    })
}

/// Serve the HTTP API until ctrl-c, then flush pending writes.
pub async fn serve(config: SamsayaConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting samsaya HTTP API");

    let state = setup_shared_state(config).await?;
    let coordinator = state.coordinator.clone();
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}/api");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP API");
        })
        .await?;

    let report = coordinator.flush_now().await;
    if !report.all_ok() {
        tracing::warn!(?report, "final flush incomplete");
    }
    Ok(())
}
