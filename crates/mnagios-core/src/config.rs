//! mnagios.toml configuration parser.
//!
//! Every field has a default matching a stock managed-Nagios host, so an
//! empty file is a valid configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub nagios: NagiosConfig,
    pub objects: ObjectsConfig,
    pub reload: ReloadConfig,
    pub storage: StorageConfig,
    pub manager: ManagerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NagiosConfig {
    pub objects_dir: PathBuf,
    pub main_config: PathBuf,
    pub object_cache: PathBuf,
    pub status_file: PathBuf,
    pub command_file: PathBuf,
    pub service: String,
    /// Directory of `<name>.template` files overriding the built-in
    /// object templates.
    pub template_dir: Option<PathBuf>,
}

impl Default for NagiosConfig {
    fn default() -> Self {
        Self {
            objects_dir: PathBuf::from("/etc/nagios/objects"),
            main_config: PathBuf::from("/etc/nagios/nagios.cfg"),
            object_cache: PathBuf::from("/var/spool/nagios/objects.cache"),
            status_file: PathBuf::from("/var/log/nagios/status.dat"),
            command_file: PathBuf::from("/var/spool/nagios/cmd/nagios.cmd"),
            service: "nagios".to_string(),
            template_dir: None,
        }
    }
}

/// Ownership and permissions applied to deployed objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsConfig {
    pub owner: String,
    pub group: String,
    pub file_mode: String,
    pub dir_mode: String,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            owner: "nagios:nagios".to_string(),
            group: "nagios".to_string(),
            file_mode: "660".to_string(),
            dir_mode: "770".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub trigger_file: PathBuf,
    /// Time a claimed reload waits to coalesce further changes.
    pub delay_secs: u64,
    /// Extra wait past a peer's deadline before assuming it died.
    pub grace_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            trigger_file: PathBuf::from("/tmp/nagios_reload_triggered"),
            delay_secs: 5,
            grace_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Staging area for deploys and removals.
    pub scratch_dir: PathBuf,
    /// Rate-calculation data of the check scripts
    /// (`instances/<address>`, `nodes/<node>`).
    pub rate_data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            rate_data_dir: PathBuf::from("/var/lib/nagios/rate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub credentials: PathBuf,
    pub connection: PathBuf,
    pub certificate: PathBuf,
    pub max_checks: u32,
    pub check_interval_secs: u64,
    pub page_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            credentials: PathBuf::from("/etc/nagios/cloudify_manager.json"),
            connection: PathBuf::from("/etc/nagios/notify_plugin.cfg"),
            certificate: PathBuf::from("/etc/nagios/notify_plugin.crt"),
            max_checks: 180,
            check_interval_secs: 10,
            page_size: 1000,
        }
    }
}

impl ManagerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

// ── Manager connection ─────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no manager hosts configured in {0}")]
    NoHosts(PathBuf),
}

#[derive(Debug, Deserialize)]
struct ManagerCredentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RestHost {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct ManagerEndpoints {
    rest_host: RestHost,
    rest_port: u16,
    #[serde(default)]
    cluster: Vec<String>,
}

/// Where and how to reach the orchestration manager.
#[derive(Clone)]
pub struct ManagerConnection {
    pub base_urls: Vec<String>,
    pub username: String,
    pub password: String,
    pub certificate: Option<PathBuf>,
}

impl std::fmt::Debug for ManagerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConnection")
            .field("base_urls", &self.base_urls)
            .field("username", &self.username)
            .field("password", &"********")
            .field("certificate", &self.certificate)
            .finish()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl ManagerConnection {
    /// Merge the credentials and connection files into base URLs.
    /// A non-empty `cluster` list wins over `rest_host`.
    pub fn load(config: &ManagerConfig) -> Result<Self, ConfigError> {
        let credentials: ManagerCredentials = read_json(&config.credentials)?;
        let endpoints: ManagerEndpoints = read_json(&config.connection)?;

        let hosts = if endpoints.cluster.is_empty() {
            match endpoints.rest_host {
                RestHost::One(host) => vec![host],
                RestHost::Many(hosts) => hosts,
            }
        } else {
            endpoints.cluster
        };
        if hosts.is_empty() {
            return Err(ConfigError::NoHosts(config.connection.clone()));
        }

        let base_urls = hosts
            .iter()
            .map(|host| format!("https://{host}:{}", endpoints.rest_port))
            .collect();

        Ok(Self {
            base_urls,
            username: credentials.username,
            password: credentials.password,
            certificate: config
                .certificate
                .exists()
                .then(|| config.certificate.clone()),
        })
    }
}
