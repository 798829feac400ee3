//! SFTP directory listings (`sftp`)
//!
//! Uses the local OpenSSH setup: `~/.ssh/config` for user/host/port,
//! the SSH agent for keys and `~/.ssh/known_hosts` for host keys. When any
//! of these is missing the fetcher reports itself unavailable instead of
//! failing the run.

use std::collections::HashMap;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DEFAULT_SSH_PORT;
use crate::locator::error::FetchError;
use crate::locator::fetcher::{DirectoryListing, Fetcher};
use crate::locator::fetchers::ssh_config::SshConfig;

struct SftpConnection {
    session: Session,
    sftp: Sftp,
}

/// Local SSH setup plus the per-host session cache
struct SftpState {
    ssh_config: SshConfig,
    known_hosts_path: PathBuf,
    known_host_names: Vec<String>,
    /// Hashed known_hosts entries cannot be matched by name before connecting
    has_hashed_hosts: bool,
    sessions: Mutex<HashMap<String, Arc<Mutex<SftpConnection>>>>,
}

pub struct SftpFetcher {
    state: Option<Arc<SftpState>>,
}

impl SftpFetcher {
    /// Check the user's SSH setup; falls back to an unavailable fetcher
    pub fn from_environment() -> Self {
        match load_environment() {
            Ok(fetcher) => fetcher,
            Err(e) => {
                warn!("SFTP disabled: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn unavailable() -> Self {
        Self { state: None }
    }

    /// Build a fetcher from an already loaded SSH setup
    pub fn with_setup(
        ssh_config: SshConfig,
        known_hosts_path: PathBuf,
        known_host_names: Vec<String>,
        has_hashed_hosts: bool,
    ) -> Self {
        Self {
            state: Some(Arc::new(SftpState {
                ssh_config,
                known_hosts_path,
                known_host_names,
                has_hashed_hosts,
                sessions: Mutex::new(HashMap::new()),
            })),
        }
    }

    pub fn is_available(&self) -> bool {
        self.state.is_some()
    }
}

fn load_environment() -> Result<SftpFetcher, FetchError> {
    let ssh_dir = dirs::home_dir()
        .ok_or_else(|| FetchError::Unavailable("no home directory".to_string()))?
        .join(".ssh");

    let ssh_config = SshConfig::load(&ssh_dir.join("config"))?;

    let session = Session::new()?;
    let mut agent = session.agent()?;
    agent.connect()?;
    agent.list_identities()?;
    let key_count = agent.identities()?.len();
    let _ = agent.disconnect();
    if key_count == 0 {
        return Err(FetchError::Unavailable("no keys in ssh-agent".to_string()));
    }

    let known_hosts_path = ssh_dir.join("known_hosts");
    let mut known_hosts = session.known_hosts()?;
    known_hosts.read_file(&known_hosts_path, KnownHostFileKind::OpenSSH)?;

    let mut names = Vec::new();
    let mut has_hashed_hosts = false;
    for host in known_hosts.hosts()? {
        match host.name() {
            Some(name) => names.extend(name.split(',').map(strip_port)),
            None => has_hashed_hosts = true,
        }
    }

    debug!(
        "SFTP available: {} agent keys, {} known hosts",
        key_count,
        names.len()
    );
    Ok(SftpFetcher::with_setup(
        ssh_config,
        known_hosts_path,
        names,
        has_hashed_hosts,
    ))
}

/// `[host]:port` entries name the host without brackets
fn strip_port(name: &str) -> String {
    match name.strip_prefix('[').and_then(|n| n.split_once("]:")) {
        Some((host, _port)) => host.to_string(),
        None => name.to_string(),
    }
}

impl SftpState {
    fn lock_sessions(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, Arc<Mutex<SftpConnection>>>>, FetchError> {
        self.sessions.lock().map_err(|_| FetchError::LockPoisoned)
    }

    fn supports_host(&self, hostname: &str) -> bool {
        if self.ssh_config.lookup(hostname).user.is_none() {
            debug!("No ssh user configured for {}", hostname);
            return false;
        }
        self.has_hashed_hosts || self.known_host_names.iter().any(|h| h == hostname)
    }

    fn session_for(&self, location: &Url) -> Result<Arc<Mutex<SftpConnection>>, FetchError> {
        let host = location
            .host_str()
            .ok_or_else(|| FetchError::InvalidLocation(location.to_string()))?;

        let mut sessions = self.lock_sessions()?;
        if let Some(connection) = sessions.get(host) {
            return Ok(Arc::clone(connection));
        }

        let connection = Arc::new(Mutex::new(self.connect(location, host)?));
        sessions.insert(host.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    fn connect(&self, location: &Url, host: &str) -> Result<SftpConnection, FetchError> {
        let host_config = self.ssh_config.lookup(host);
        let address = host_config.hostname.unwrap_or_else(|| host.to_string());
        let port = location
            .port()
            .or(host_config.port)
            .unwrap_or(DEFAULT_SSH_PORT);
        let username = match location.username() {
            "" => host_config.user,
            user => Some(user.to_string()),
        }
        .ok_or_else(|| FetchError::Authentication(host.to_string()))?;

        info!("Opening SFTP session to {}@{}:{}", username, address, port);
        let tcp = TcpStream::connect((address.as_str(), port))?;
        tcp.set_nodelay(true)?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        self.verify_host_key(&session, host, port)?;

        if let Err(e) = session.userauth_agent(&username) {
            debug!("Agent authentication to {} failed: {}", host, e);
        }
        if !session.authenticated() {
            let _ = session.disconnect(None, "authentication failed", None);
            return Err(FetchError::Authentication(host.to_string()));
        }

        let sftp = session.sftp()?;
        Ok(SftpConnection { session, sftp })
    }

    fn verify_host_key(&self, session: &Session, host: &str, port: u16) -> Result<(), FetchError> {
        let (key, _) = session
            .host_key()
            .ok_or_else(|| FetchError::HostKey(host.to_string()))?;

        let mut known_hosts = session.known_hosts()?;
        known_hosts.read_file(&self.known_hosts_path, KnownHostFileKind::OpenSSH)?;

        match known_hosts.check_port(host, port, key) {
            CheckResult::Match => Ok(()),
            _ => Err(FetchError::HostKey(host.to_string())),
        }
    }

    fn list_blocking(&self, location: &Url) -> Result<DirectoryListing, FetchError> {
        let connection = self.session_for(location)?;
        let connection = connection.lock().map_err(|_| FetchError::LockPoisoned)?;

        let entries = connection
            .sftp
            .readdir(Path::new(location.path()))?
            .into_iter()
            .filter_map(|(path, _stat)| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect();

        Ok(DirectoryListing::new(location.clone(), entries))
    }

    fn close(&self) {
        let sessions = match self.sessions.lock() {
            Ok(mut sessions) => std::mem::take(&mut *sessions),
            Err(_) => return,
        };

        for (host, connection) in sessions {
            let Ok(connection) = connection.lock() else {
                continue;
            };
            debug!("Closing SFTP session to {}", host);
            if let Err(e) = connection.session.disconnect(None, "done", None) {
                debug!("Failed to disconnect from {}: {}", host, e);
            }
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for SftpFetcher {
    async fn list(&self, location: &Url) -> Result<DirectoryListing, FetchError> {
        let Some(state) = &self.state else {
            return Err(FetchError::Unavailable(format!(
                "no usable SSH setup for {}",
                location
            )));
        };

        let state = Arc::clone(state);
        let location = location.clone();
        tokio::task::spawn_blocking(move || state.list_blocking(&location)).await?
    }

    fn supports_host(&self, hostname: &str) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.supports_host(hostname))
    }

    fn close(&self) {
        if let Some(state) = &self.state {
            state.close();
        }
    }
}

impl Drop for SftpFetcher {
    fn drop(&mut self) {
        Fetcher::close(self);
    }
}
