//! Fetcher trait for listing remote directories

#[cfg(test)]
use mockall::automock;

use url::Url;

use crate::locator::error::FetchError;

/// Entry names found at a remote location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryListing {
    /// Location the listing was actually served from (after redirects)
    pub location: Url,
    /// Files and subdirectories, in the order the server returned them
    pub entries: Vec<String>,
}

impl DirectoryListing {
    pub fn new(location: Url, entries: Vec<String>) -> Self {
        Self { location, entries }
    }
}

/// Trait for listing a directory over one transport
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Lists the entries at `location`
    ///
    /// # Returns
    /// * `Ok(DirectoryListing)` - Entry names and the location they were served from
    /// * `Err(FetchError)` - If the listing could not be retrieved
    async fn list(&self, location: &Url) -> Result<DirectoryListing, FetchError>;

    /// Whether this transport can reach `hostname` with the local setup
    fn supports_host(&self, _hostname: &str) -> bool {
        true
    }

    /// Releases any cached connections. Safe to call more than once.
    fn close(&self) {}
}
