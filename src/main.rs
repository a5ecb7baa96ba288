//! Snowfight Server - Authoritative real-time arena server
//!
//! Entry point. It wires together:
//! - the arena task that owns the world and runs the game rules
//! - server-driven bots
//! - the WebSocket gateway and the health endpoint
//! - optional Supabase storage for kill records

mod app;
mod config;
mod game;
mod http;
mod store;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::{ArenaSettings, ArenaState, GameArena};
use crate::http::build_router;
use crate::store::{KillSink, KillStore, LoggedKills, SupabaseClient};
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting Snowfight Server");
    info!("Server address: {}", config.server_addr);

    // One terrain seed per process, shared with every client in `welcome`
    let seed = rand::random::<u32>();

    let kills: Arc<dyn KillSink> = match SupabaseClient::from_config(&config) {
        Some(client) => {
            info!("Kill records go to Supabase");
            Arc::new(KillStore::new(client))
        }
        None => {
            info!("Supabase not configured, kill records are only logged");
            Arc::new(LoggedKills)
        }
    };

    let settings = ArenaSettings {
        world: config.world_name.clone(),
        seed,
        allow_duplicate_names: config.allow_duplicate_names,
        ..ArenaSettings::default()
    };
    let arena = GameArena::spawn(ArenaState::new(settings, kills), config.bot_count);

    let state = AppState::new(config.clone(), arena);
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
