//! Shoal server core — the session-and-fan-out engine behind the chat relay.

pub mod chat;
