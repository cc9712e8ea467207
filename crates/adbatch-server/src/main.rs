mod api;
mod callback;
mod middleware;

use std::sync::Arc;
use std::time::Duration;

use adbatch_pipeline::{AssetStager, BatchOrchestrator, ObjectStoreBlobStore, OrchestratorConfig};
use adbatch_platform::{AdsPlatform, GraphClient, GraphClientConfig};
use tokio_util::task::TaskTracker;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    callback::{drain_batches, CallbackNotifier},
    middleware::{AuthState, RateLimits},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = adbatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let platform: Arc<dyn AdsPlatform> =
        Arc::new(GraphClient::new(&GraphClientConfig::from_app_config(&config))?);
    let stager = AssetStager::new(&config.upload_dir, config.max_upload_bytes).await?;

    let mut orchestrator = BatchOrchestrator::new(
        Arc::clone(&platform),
        OrchestratorConfig::from_app_config(&config),
    );
    if let Some(bucket) = &config.blob_bucket {
        let blob = ObjectStoreBlobStore::s3_from_env(bucket)?;
        orchestrator = orchestrator.with_blob_store(Arc::new(blob));
        tracing::info!(bucket = %bucket, "blob hosting enabled for video uploads");
    }

    let callbacks = CallbackNotifier::new(
        Duration::from_secs(config.request_timeout_secs),
        config.callback_max_retries,
    )?;

    let auth = AuthState::from_env(matches!(
        config.env,
        adbatch_core::Environment::Development
    ))?;
    let batches = TaskTracker::new();
    let state = AppState {
        platform,
        orchestrator: Arc::new(orchestrator),
        stager,
        callbacks,
        batches: batches.clone(),
        blob_bucket: config.blob_bucket.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };
    let app = build_app(state, auth, RateLimits::default());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        env = %config.env,
        upload_dir = %config.upload_dir.display(),
        "adbatch server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // A running batch may still spend its deadline plus every callback attempt.
    let callback_budget = config
        .request_timeout_secs
        .saturating_mul(u64::from(config.callback_max_retries) + 1);
    let grace = Duration::from_secs(config.batch_timeout_secs.saturating_add(callback_budget));
    if !drain_batches(&batches, grace).await {
        tracing::warn!("exiting with undelivered batch callbacks");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
