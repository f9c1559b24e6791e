use crate::cache::CacheClient;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_CHANNEL: &str = "blocklist_update";
pub const RELOAD_MESSAGE: &str = "reload";

/// Fire-and-forget reload hint sent after each promotion.
///
/// Delivery is best effort: there is no acknowledgment and no retry, and a
/// consumer that was disconnected misses the signal. Consumers must also poll
/// the live set on their own schedule (see `LiveSetMirror`).
#[derive(Clone)]
pub struct ChangeNotifier {
    cache: Arc<dyn CacheClient>,
    channel: String,
}

impl ChangeNotifier {
    pub fn new(cache: Arc<dyn CacheClient>, channel: impl Into<String>) -> Self {
        Self {
            cache,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns `true` if the backend accepted the message.
    pub async fn notify(&self) -> bool {
        match self.cache.publish(&self.channel, RELOAD_MESSAGE).await {
            Ok(receivers) => {
                debug!(
                    "Published '{}' on '{}' to {} subscribers",
                    RELOAD_MESSAGE, self.channel, receivers
                );
                true
            }
            Err(e) => {
                warn!("Failed to publish update on '{}': {}", self.channel, e);
                false
            }
        }
    }
}
