use std::sync::Arc;

use shoal_server::chat::Relay;

use crate::ticket::Issuer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The session-and-fan-out engine for this process.
    pub relay: Arc<Relay>,
    /// Bearer-ticket issuer/verifier.
    pub tickets: Arc<dyn Issuer>,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, tickets: Arc<dyn Issuer>) -> Self {
        AppState { relay, tickets }
    }
}
