use std::time::Duration;

use souk_server::engine::ExpirationScheduler;
use souk_server::tasks::{BackgroundTasks, TaskKind};
use souk_server::{AppState, Config};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "souk_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();

    tracing::info!("Starting souk-server (env: {})", config.environment);

    let state = AppState::new(&config)?;

    let mut tasks = BackgroundTasks::new();

    // Expiration sweep (also catches up on holds that lapsed while down)
    let scheduler = ExpirationScheduler::new(
        state.engine.clone(),
        Duration::from_secs(config.expiry_sweep_secs),
        tasks.shutdown_token(),
    );
    tasks.spawn("expiration-scheduler", TaskKind::Periodic, scheduler.run());

    // Order notice fan-out: the chat message sender attaches here; until
    // one is wired up the notices land in the log.
    let mut events = state.engine.subscribe();
    let events_shutdown = tasks.shutdown_token();
    tasks.spawn("order-notices", TaskKind::Worker, async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => tracing::info!(?event, "Order notice"),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Order notice stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = events_shutdown.cancelled() => break,
            }
        }
    });

    // Rate limiter cleanup (every 5 minutes)
    let rate_limiter = state.rate_limiter.clone();
    let cleanup_shutdown = tasks.shutdown_token();
    tasks.spawn("rate-limit-cleanup", TaskKind::Periodic, async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = interval.tick() => rate_limiter.cleanup().await,
                _ = cleanup_shutdown.cancelled() => break,
            }
        }
    });

    tasks.log_summary();

    let app = souk_server::api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("souk-server HTTP listening on {http_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining background tasks");
    tasks.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
