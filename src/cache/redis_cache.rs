use super::types::{CacheClient, CacheError, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Cache client for Redis/DragonflyDB.
///
/// Commands go through a `ConnectionManager`, which reconnects on its own;
/// subscriptions open a dedicated pub/sub connection each.
pub struct RedisCache {
    client: Client,
    connection: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client.clone()).await?;
        info!("Connected to Redis at {}", redis_url);
        Ok(Self { client, connection })
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn ping(&self) -> Result<(), CacheError> {
        let mut con = self.connection.clone();
        redis::cmd("PING").query_async::<_, String>(&mut con).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut con = self.connection.clone();
        con.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn add_members(&self, key: &str, members: &[String]) -> Result<u64, CacheError> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut con = self.connection.clone();
        let added = con.sadd::<_, _, u64>(key, members).await?;
        Ok(added)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), CacheError> {
        let mut con = self.connection.clone();
        con.rename::<_, _, ()>(from, to).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64, CacheError> {
        let mut con = self.connection.clone();
        let receivers = con.publish::<_, _, u64>(channel, message).await?;
        Ok(receivers)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut con = self.connection.clone();
        let members = con.smembers::<_, Vec<String>>(key).await?;
        Ok(members)
    }

    async fn cardinality(&self, key: &str) -> Result<u64, CacheError> {
        let mut con = self.connection.clone();
        let count = con.scard::<_, u64>(key).await?;
        Ok(count)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, CacheError> {
        let con = self.client.get_async_connection().await?;
        let mut pubsub = con.into_pubsub();
        pubsub.subscribe(channel).await?;
        info!("Subscribed to '{}' channel", channel);

        let (tx, rx) = mpsc::channel(16);
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to read payload on '{}': {}", channel, e),
                }
            }
            warn!("Subscription to '{}' closed", channel);
        });

        Ok(rx)
    }
}
