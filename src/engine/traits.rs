use super::fetcher::FetchError;

/// Retrieves the raw body of one hosted list.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
