use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failures of the shared cache backend. Any of these aborts a refresh cycle.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache command `{command}` failed: {message}")]
    Command { command: &'static str, message: String },
}

impl CacheError {
    pub fn command(command: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            command,
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::Unavailable(err.to_string())
        } else {
            Self::command("redis", err.to_string())
        }
    }
}

/// Messages delivered on a subscribed channel.
pub type Subscription = mpsc::Receiver<String>;

/// Capability handle to the key/set store that holds the live and staging sets.
///
/// Implementations must make `rename` atomic: a reader of `to` observes either
/// its previous members or all members of `from`, never a mix.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn ping(&self) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Adds one batch of members to the set at `key`. Returns how many were new.
    async fn add_members(&self, key: &str, members: &[String]) -> Result<u64, CacheError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), CacheError>;

    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, CacheError>;

    async fn members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    async fn cardinality(&self, key: &str) -> Result<u64, CacheError>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription, CacheError>;
}
