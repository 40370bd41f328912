//! Application bootstrapper
//!
//! Handles all initialization and setup for the edgebuild service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, CONFIG};
use crate::db;
use crate::endpoints;
use crate::services::{
    scheduler, BuildDispatcher, BuildQueue, BuildSettings, FilesService, HttpDownloader,
    ImageBuilderClient, ImageService, LocalUploader, OstreeCli, ProcessCommandRunner, RepoBuilder,
    RepoSettings, TarExtractor,
};
use crate::state::AppState;

/// Bootstrap and run the application
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Starting edgebuild v{} ({})",
        CONFIG.version,
        CONFIG.commit_hash
    );

    let shutdown = CancellationToken::new();
    let conn = db::connect(&CONFIG.database).await?;
    let state = init_services(conn, &CONFIG, shutdown.clone())?;

    scheduler::start_scheduler(state.db.clone(), &CONFIG.build, shutdown.clone());
    spawn_signal_listener(shutdown.clone());

    let app = create_app(state.clone());
    serve(app, shutdown).await?;

    // Builds still in flight see the cancelled token and close out their images
    state.queue.shutdown().await;
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("edgebuild={},tower_http=info", CONFIG.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(false))
        .init();
}

/// Wire the production services and start the build workers
pub fn init_services(
    conn: db::DbConn,
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<AppState> {
    let runner = Arc::new(ProcessCommandRunner);

    let http = reqwest::Client::builder()
        .user_agent("edgebuild")
        .connect_timeout(Duration::from_secs(30))
        .build()?;
    let files = FilesService::new(
        Arc::new(HttpDownloader::new(http)),
        Arc::new(TarExtractor),
        Arc::new(LocalUploader::new(
            config.repo.storage_dir.clone(),
            config.repo.storage_url.clone(),
        )),
    );

    let ostree = OstreeCli::new(runner.clone(), config.repo.ostree_bin.clone());
    let repos = RepoBuilder::new(
        conn.clone(),
        files.clone(),
        ostree,
        RepoSettings::from_config(&config.repo),
    );

    let builder = Arc::new(ImageBuilderClient::new(&config.image_builder)?);
    let queue = BuildQueue::new(
        config.build.queue_capacity,
        config.build.workers,
        shutdown,
    );

    let images = Arc::new(ImageService::new(
        conn.clone(),
        builder,
        repos.clone(),
        files,
        runner,
        queue.clone(),
        BuildSettings::from_config(config),
    ));

    queue.start(Arc::new(BuildDispatcher::new(images.clone(), repos.clone())));
    tracing::info!(
        workers = config.build.workers,
        capacity = config.build.queue_capacity,
        "Build workers started"
    );

    Ok(AppState::new(
        conn,
        images,
        repos,
        queue,
        config.repo.storage_dir.clone(),
    ))
}

/// Cancel `shutdown` on SIGINT or SIGTERM
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
            _ = shutdown.cancelled() => return,
        }

        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });
}

/// Create the main application router
fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    endpoints::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the HTTP server
async fn serve(app: Router, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", CONFIG.server.host, CONFIG.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
