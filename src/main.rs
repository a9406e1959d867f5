//! sgame-back binary entrypoint wiring REST, WebSocket and the room archive.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sgame_back::{
    config::AppConfig,
    dao::{
        pack_store::MemoryPackStore,
        room_cache::MemoryRoomCache,
        room_repository::{MemoryRoomRepository, RoomRepository},
    },
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let packs = match MemoryPackStore::from_file(&config.packs_path) {
        Ok(packs) => packs,
        Err(err) => {
            warn!(error = %err, "failed to load question packs; starting without any");
            MemoryPackStore::default()
        }
    };

    let app_state = AppState::new(
        config,
        Arc::new(MemoryRoomCache::default()),
        Arc::new(packs),
    );
    start_archive(app_state.clone()).await;

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

/// Archive rooms to MongoDB when `MONGO_URI` is set, in memory otherwise.
#[cfg(feature = "mongo-store")]
async fn start_archive(state: SharedState) {
    use sgame_back::{
        dao::room_repository::mongodb::{MongoConfig, MongoRoomRepository},
        services::storage_supervisor,
    };

    let Ok(uri) = env::var("MONGO_URI") else {
        install_memory_archive(&state).await;
        return;
    };
    let db_name = env::var("MONGO_DB").ok();

    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let repository = MongoRoomRepository::connect(config).await?;
            Ok(Arc::new(repository) as Arc<dyn RoomRepository>)
        }
    }));
}

#[cfg(not(feature = "mongo-store"))]
async fn start_archive(state: SharedState) {
    install_memory_archive(&state).await;
}

async fn install_memory_archive(state: &SharedState) {
    info!("no MONGO_URI configured; archiving rooms in memory");
    state
        .install_archive(Arc::new(MemoryRoomRepository::default()))
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
