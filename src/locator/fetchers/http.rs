//! Web directory listings (`http`, `https`)

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::config::USER_AGENT;
use crate::locator::error::FetchError;
use crate::locator::fetcher::{DirectoryListing, Fetcher};

/// Fetcher that reads the links of an HTML directory index
pub struct HttpFetcher {
    client: reqwest::Client,
    /// Matches `<a ... href="target">` and captures the target
    link_re: Regex,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            // Redirects are followed by the client; the final URL is kept
            client: reqwest::Client::builder().user_agent(USER_AGENT).build()?,
            link_re: Regex::new(
                r#"(?is)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
            )
            .unwrap(),
        })
    }

    /// Extract hyperlink targets from an HTML body, in document order
    pub fn links(&self, html: &str) -> Vec<String> {
        self.link_re
            .captures_iter(html)
            .filter_map(|caps| caps.get(1).or(caps.get(2)).or(caps.get(3)))
            .map(|m| m.as_str().replace("&amp;", "&"))
            .collect()
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn list(&self, location: &Url) -> Result<DirectoryListing, FetchError> {
        let response = self.client.get(location.clone()).send().await?;

        let status = response.status();
        let served_from = response.url().clone();
        if served_from != *location {
            debug!("{} redirected to {}", location, served_from);
        }

        if !status.is_success() {
            warn!("Listing returned status {}: {}", status, location);
            return Err(FetchError::Status {
                status,
                url: location.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(DirectoryListing::new(served_from, self.links(&body)))
    }
}
