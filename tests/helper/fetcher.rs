//! Fetcher test utilities

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use convert_to_tarballs::locator::error::FetchError;
use convert_to_tarballs::locator::fetcher::{DirectoryListing, Fetcher};
use convert_to_tarballs::locator::{Mirrors, TarballLocator};

/// Fetcher serving directory listings from memory
#[derive(Default)]
pub struct InMemoryFetcher {
    listings: HashMap<String, Vec<String>>,
    redirects: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, location: &str, entries: &[&str]) -> Self {
        self.listings.insert(
            location.to_string(),
            entries.iter().map(|e| e.to_string()).collect(),
        );
        self
    }

    /// Serve `from` as if the server redirected it to `to`
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for InMemoryFetcher {
    async fn list(&self, location: &Url) -> Result<DirectoryListing, FetchError> {
        self.requests.lock().unwrap().push(location.to_string());

        let served = self
            .redirects
            .get(location.as_str())
            .cloned()
            .unwrap_or_else(|| location.to_string());
        match self.listings.get(&served) {
            Some(entries) => Ok(DirectoryListing::new(
                Url::parse(&served).unwrap(),
                entries.clone(),
            )),
            None => Err(FetchError::Unavailable(format!("no listing for {}", served))),
        }
    }
}

/// Locator serving `https` from the given fetcher
pub fn create_test_locator(fetcher: Arc<InMemoryFetcher>, mirrors: Mirrors) -> TarballLocator {
    let fetcher: Arc<dyn Fetcher> = fetcher;
    TarballLocator::new(HashMap::from([("https".to_string(), fetcher)]), mirrors)
}
