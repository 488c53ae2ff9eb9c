//! HTTP front door for the relay: authentication endpoints, the WebSocket
//! upgrade, and the static demo client.

pub mod auth;
pub mod state;
pub mod ticket;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use shoal_server::chat::{Relay, RedisSubstrate, StaticFriends, Substrate};

use crate::state::AppState;
use crate::ticket::{Issuer, Ticket};

pub fn build_router(state: AppState, public_dir: &str) -> Router {
    Router::new()
        .route("/authenticate", post(auth::authenticate))
        .route("/authorize", post(auth::authorize))
        .route("/ws", get(ws::ws_handler))
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the relay node: connect the substrate, start the engine, serve HTTP
/// until ctrl-c.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = env_or("SHOAL_ADDR", "0.0.0.0:4000");
    let redis_url = env_or("SHOAL_REDIS_URL", "redis://127.0.0.1:6379/");
    let channel = env_or("SHOAL_CHANNEL", "chat");
    let secret = env_or("SHOAL_SECRET", "secret :)");
    let ticket_ttl: u64 =
        env_or("SHOAL_TICKET_TTL_SECS", "86400").parse().unwrap_or(86_400);
    let public_dir = env_or("SHOAL_PUBLIC_DIR", "public");

    let substrate: Arc<dyn Substrate> = Arc::new(RedisSubstrate::connect(&redis_url).await?);
    let relay = Relay::start(substrate, channel, Arc::new(StaticFriends::demo())).await?;
    let tickets: Arc<dyn Issuer> =
        Arc::new(Ticket::new(secret.as_bytes(), Duration::from_secs(ticket_ttl)));

    let app = build_router(AppState::new(Arc::clone(&relay), tickets), &public_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(relay))
        .await?;
    Ok(())
}

async fn shutdown_signal(relay: Arc<Relay>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
    relay.close().await;
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
