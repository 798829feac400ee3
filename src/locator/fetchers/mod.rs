//! Fetcher implementations, one per transport

pub mod http;
pub mod sftp;
pub mod ssh_config;

pub use http::HttpFetcher;
pub use sftp::SftpFetcher;
pub use ssh_config::SshConfig;
