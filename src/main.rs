//! Quizboard Back binary entrypoint wiring the quiz jobs, the REST surface and the store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizboard_back::{
    config::AppConfig,
    content::QuizCatalog,
    dao::quiz_store::{MemoryQuizStore, QuizStore},
    delivery::{Delivery, LogDelivery},
    routes,
    services::{jobs, storage_supervisor},
    state::{AppState, SharedState},
};

#[cfg(feature = "mongo-store")]
const DEFAULT_BACKEND: &str = "mongo";
#[cfg(not(feature = "mongo-store"))]
const DEFAULT_BACKEND: &str = "memory";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load().context("loading configuration")?;
    let catalog = QuizCatalog::load(&config.content_path).context("loading quiz bank")?;
    info!(
        batches = catalog.batch_count(),
        questions = catalog.question_count(),
        "quiz bank loaded"
    );

    let delivery = build_delivery()?;
    let admin_token = env::var("ADMIN_TOKEN").ok();
    if admin_token.as_deref().is_none_or(str::is_empty) {
        warn!("ADMIN_TOKEN unset; admin routes are disabled");
    }
    let app_state = AppState::new(config, catalog, delivery, admin_token);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = spawn_storage_supervisor(&app_state, shutdown_rx.clone()).await?;
    let mut job_loops = jobs::spawn_all(&app_state, shutdown_rx);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    info!("server stopped; waiting for running jobs");
    shutdown_tx.send_replace(true);
    while let Some(joined) = job_loops.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "job loop ended abnormally");
        }
    }
    if let Err(err) = supervisor.await {
        warn!(error = %err, "storage supervisor ended abnormally");
    }
    app_state.pool().shutdown().await;

    Ok(())
}

/// Start the supervisor of the backend selected by `STORE_BACKEND`.
async fn spawn_storage_supervisor(
    state: &SharedState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<()>> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| DEFAULT_BACKEND.into());
    info!(backend = %backend, "starting storage supervisor");

    match backend.as_str() {
        "memory" => {
            let store = MemoryQuizStore::new();
            Ok(tokio::spawn(storage_supervisor::run(
                state.clone(),
                move || {
                    let store = store.clone();
                    async move { Ok(Arc::new(store) as Arc<dyn QuizStore>) }
                },
                shutdown,
            )))
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use quizboard_back::dao::{
                quiz_store::mongodb::{MongoConfig, MongoQuizStore},
                storage::StorageError,
            };

            let config = MongoConfig::from_env()
                .await
                .context("reading MongoDB settings")?;
            Ok(tokio::spawn(storage_supervisor::run(
                state.clone(),
                move || {
                    let config = config.clone();
                    async move {
                        MongoQuizStore::connect(config)
                            .await
                            .map(|store| Arc::new(store) as Arc<dyn QuizStore>)
                            .map_err(StorageError::from)
                    }
                },
                shutdown,
            )))
        }
        other => anyhow::bail!("unknown STORE_BACKEND `{other}`"),
    }
}

/// Telegram when a bot token is configured, the log otherwise.
fn build_delivery() -> anyhow::Result<Arc<dyn Delivery>> {
    #[cfg(feature = "telegram-delivery")]
    {
        if let Some(token) = env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
        {
            let telegram = quizboard_back::delivery::telegram::TelegramDelivery::new(&token)
                .context("building Telegram client")?;
            info!("delivering through Telegram");
            return Ok(Arc::new(telegram));
        }
    }

    warn!("TELEGRAM_BOT_TOKEN unset; outbound messages are only logged");
    Ok(Arc::new(LogDelivery))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
