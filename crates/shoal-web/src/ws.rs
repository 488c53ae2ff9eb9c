//! WebSocket upgrade endpoint: `GET /ws?token=<bearer>`.
//!
//! The token is checked before the session exists. A bad token still
//! completes the upgrade so the client observes a proper policy-violation
//! close code — no session is created and no events are emitted.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use shoal_server::chat::session::{MAX_MESSAGE_SIZE, WRITE_BUFFER};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let verified = state.tickets.verify(&query.token);
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .write_buffer_size(WRITE_BUFFER)
        .on_upgrade(move |mut socket| async move {
            match verified {
                Ok(username) => state.relay.serve_session(socket, username).await,
                Err(e) => {
                    debug!(error = %e, "ws: rejected upgrade token");
                    let frame = CloseFrame {
                        code: close_code::POLICY,
                        reason: "authorization failed".into(),
                    };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                }
            }
        })
}
