//! Authentication endpoints.
//!
//! `/authenticate` exchanges a username for a bearer ticket; `/authorize`
//! echoes back who a ticket belongs to. Both are collaborators of the
//! relay — the engine itself only ever sees the verified username.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct Credential {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizedUser {
    pub username: String,
}

pub async fn authenticate(
    State(state): State<AppState>,
    Json(req): Json<AuthenticateRequest>,
) -> Result<Json<Credential>, StatusCode> {
    if req.username.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let access_token =
        state.tickets.issue(&req.username).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Json(Credential { access_token }))
}

pub async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AuthorizedUser>, StatusCode> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
    match state.tickets.verify(token) {
        Ok(username) => Ok(Json(AuthorizedUser { username })),
        Err(e) => {
            debug!(error = %e, "authorize: rejected token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
