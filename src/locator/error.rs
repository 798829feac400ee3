use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("SFTP error: {0}")]
    Sftp(#[from] ssh2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot authenticate to {0}")]
    Authentication(String),

    #[error("Host key for {0} does not match known_hosts")]
    HostKey(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Session cache lock poisoned")]
    LockPoisoned,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("No download site found for {0}")]
    NoDownloadSite(String),

    #[error("No versions found for {module} at {location}")]
    NoVersionsFound { module: String, location: String },

    #[error("Invalid location for {module}: {location}")]
    UnsupportedScheme { module: String, location: String },

    #[error("Invalid location {location}: {source}")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to list {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },
}

impl LocateError {
    /// Lookup failures a caller may demote to "ignored" for a single module.
    ///
    /// Unknown schemes and unparsable locations are configuration errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LocateError::NoDownloadSite(_)
                | LocateError::NoVersionsFound { .. }
                | LocateError::Fetch { .. }
        )
    }
}
