//! Watch Party Back binary entrypoint wiring REST, WebSocket, SSE and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watch_party_back::{
    config::AppConfig,
    dao::{
        feed_provider::{FeedProvider, StaticFeedProvider, YouTubeFeedProvider},
        session_store::memory::MemorySessionStore,
    },
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let feed_provider = build_feed_provider(&config)?;
    let app_state = AppState::new(config, feed_provider);

    start_storage(&app_state).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

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

    Ok(())
}

/// Use the YouTube search API when a key is configured, the built-in list otherwise.
fn build_feed_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn FeedProvider>> {
    match env::var("YOUTUBE_API_KEY") {
        Ok(api_key) if !api_key.trim().is_empty() => {
            let provider = YouTubeFeedProvider::new(api_key, config.provider_timeout)
                .context("building YouTube feed provider")?;
            info!("using YouTube feed provider");
            Ok(Arc::new(provider))
        }
        _ => {
            warn!("YOUTUBE_API_KEY not set; feeds use the built-in fallback list");
            Ok(Arc::new(StaticFeedProvider::new(
                config.fallback_feed().to_vec(),
            )))
        }
    }
}

/// Install the in-memory store directly or supervise a MongoDB connection in the background.
async fn start_storage(state: &SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".into());
    match backend.as_str() {
        "memory" => {
            info!("using in-memory session store");
            state
                .install_session_store(Arc::new(MemorySessionStore::new()))
                .await;
            Ok(())
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            tokio::spawn(run_mongo_supervisor(state.clone()));
            Ok(())
        }
        other => anyhow::bail!("unsupported STORE_BACKEND `{other}`"),
    }
}

#[cfg(feature = "mongo-store")]
async fn run_mongo_supervisor(state: SharedState) {
    use watch_party_back::{
        dao::{
            session_store::{
                SessionStore,
                mongodb::{MongoConfig, MongoSessionStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    storage_supervisor::run(state, || async {
        let config = MongoConfig::from_env().await.map_err(StorageError::from)?;
        let store = MongoSessionStore::connect(config)
            .await
            .map_err(StorageError::from)?;
        Ok::<_, StorageError>(Arc::new(store) as Arc<dyn SessionStore>)
    })
    .await;
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
