//! Focus Vigil - timer engine server
//!
//! Entry point: restores the timer, starts the engine task and serves the
//! command channel and change feed over HTTP.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use focus_vigil::{
    config::Config,
    create_router,
    services::{ChangeFeed, Clock, SystemClock},
    state::{AppState, JsonFileStore, MemoryStore, StateStore, TimerState},
    tasks::{spawn_engine, ClientMirror, LogView, TimerEngine},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!("focus_vigil={},tower_http=info", config.log_level()))
        .init();

    info!("Starting focus-vigil v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, data_dir={}, ephemeral={}",
        config.host,
        config.port,
        config.data_dir.display(),
        config.ephemeral
    );

    let store: Arc<dyn StateStore> = if config.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let store = JsonFileStore::open(&config.data_dir)?;
        info!("Timer record: {}", store.path().display());
        Arc::new(store)
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.alarm_recheck()));
    let feed = ChangeFeed::new(TimerState::default());

    // Loading replays any phases that elapsed while the server was down
    let engine = TimerEngine::load(Arc::clone(&clock), store, feed.clone());
    let (handle, _engine_task) = spawn_engine(engine, config.command_timeout());

    if config.mirror {
        let mirror = ClientMirror::new("console", Arc::new(handle.clone()), feed, clock, LogView);
        tokio::spawn(mirror.run());
    }

    let state = Arc::new(AppState::new(handle, config.port, config.host.clone()));
    let app = create_router(state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /command - Run a timer command ({{\"action\": ...}})");
    info!("  GET  /state   - Current timer state");
    info!("  GET  /events  - Server-sent state and phaseComplete events");
    info!("  GET  /status  - Timer state with server metadata");
    info!("  GET  /health  - Health check");

    // Open event streams never finish on their own, so don't wait on them
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
