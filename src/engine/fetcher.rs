use super::traits::SourceFetcher;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    HttpStatus(u16),
    Network,
    InvalidUrl,
}

impl FailureKind {
    /// Timeouts, connection problems and server-side errors may clear up on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => *code >= 500,
            FailureKind::InvalidUrl => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::HttpStatus(code) => write!(f, "http status {}", code),
            FailureKind::Network => write!(f, "network"),
            FailureKind::InvalidUrl => write!(f, "invalid url"),
        }
    }
}

#[derive(Debug, Error)]
#[error("fetch failed ({kind}): {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_builder() {
        FailureKind::InvalidUrl
    } else {
        FailureKind::Network
    };
    FetchError::new(kind, err.to_string())
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub request_timeout: Duration,
    /// Extra attempts after the first one, for transient failures only.
    pub retries: u32,
    pub retry_backoff: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retries: 2,
            retry_backoff: Duration::from_millis(500),
            user_agent: concat!("blocksync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP fetcher for hosted lists.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client, settings })
    }

    async fn fetch_once(&self, url: &reqwest::Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(body.to_vec())
    }
}

#[async_trait::async_trait]
impl SourceFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let mut attempt = 0;
        loop {
            match self.fetch_once(&parsed).await {
                Ok(body) => {
                    debug!("Fetched {} bytes from {}", body.len(), url);
                    return Ok(body);
                }
                Err(e) if e.kind.is_transient() && attempt < self.settings.retries => {
                    attempt += 1;
                    warn!(
                        "Fetch of {} failed ({}), retry {}/{}",
                        url, e, attempt, self.settings.retries
                    );
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_failures() {
        assert!(FailureKind::Timeout.is_transient());
        assert!(FailureKind::Network.is_transient());
        assert!(FailureKind::HttpStatus(503).is_transient());
        assert!(!FailureKind::HttpStatus(404).is_transient());
        assert!(!FailureKind::InvalidUrl.is_transient());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_without_request() {
        let fetcher = ReqwestFetcher::new(FetchSettings::default()).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidUrl);
    }
}
