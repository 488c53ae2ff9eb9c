//! Redis-backed substrate — the production key/value + pub/sub layer.
//!
//! One multiplexed connection serves commands (`PUBLISH`, `SADD`, `SREM`,
//! `SMEMBERS`); each subscription holds its own pub/sub connection, as the
//! protocol requires. Reconnect and resubscribe behavior is the client
//! library's; the relay adds no retry of its own.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::substrate::{Substrate, SubstrateError};

const FEED_CAPACITY: usize = 256;

pub struct RedisSubstrate {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisSubstrate {
    /// Connect and ping, so a dead substrate fails at startup rather than
    /// on the first session.
    pub async fn connect(url: &str) -> Result<Self, SubstrateError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        debug!(url, "redis substrate: connected");
        Ok(RedisSubstrate { client, conn })
    }
}

#[async_trait]
impl Substrate for RedisSubstrate {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), SubstrateError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, SubstrateError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "redis substrate: non-string payload — skipping");
                        continue;
                    }
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
            debug!("redis substrate: subscription ended");
        });
        Ok(rx)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, SubstrateError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }
}
