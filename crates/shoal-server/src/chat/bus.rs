//! Typed envelope traffic over the shared bus channel.
//!
//! Every process publishes routed envelopes here and subscribes to the
//! same channel; whichever processes hold sessions for the recipient
//! deliver. Duplicates are tolerated (at-least-once), decode failures are
//! logged and skipped, never raised.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::envelope::Envelope;
use super::metrics;
use super::substrate::{Substrate, SubstrateError};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("bus encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("bus publish: {0}")]
    Substrate(#[from] SubstrateError),
}

pub struct BusClient {
    substrate: Arc<dyn Substrate>,
    channel: String,
}

const DECODED_CAPACITY: usize = 256;

impl BusClient {
    pub fn new(substrate: Arc<dyn Substrate>, channel: impl Into<String>) -> Self {
        BusClient { substrate, channel: channel.into() }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Serialize and publish one envelope to the shared channel.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let payload = envelope.to_json()?;
        self.substrate.publish(&self.channel, payload).await?;
        metrics::envelope_published();
        Ok(())
    }

    /// Subscribe to the shared channel. Yields each successfully decoded
    /// envelope in delivery order; cancelling the returned token stops the
    /// decoder and closes the feed.
    pub async fn subscribe(
        &self,
    ) -> Result<(mpsc::Receiver<Envelope>, CancellationToken), SubstrateError> {
        let mut raw = self.substrate.subscribe(&self.channel).await?;
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(DECODED_CAPACITY);

        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                let payload = tokio::select! {
                    _ = token.cancelled() => break,
                    payload = raw.recv() => match payload {
                        Some(payload) => payload,
                        None => break,
                    },
                };
                match Envelope::from_json(&payload) {
                    Ok(envelope) => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            sent = tx.send(envelope) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "bus: undecodable payload — skipping");
                        metrics::decode_skipped();
                    }
                }
            }
        });
        Ok((rx, cancel))
    }
}
