use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DATA_TIMEOUT_SECS,
    DEFAULT_GREETING, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_LOGIN_FAILURES,
    DEFAULT_READ_TIMEOUT_SECS, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE, USERNAME_REGEX,
};
use crate::core_auth::{Authorizer, CredentialRecord, PermissionSet};
use crate::core_client::{ClientConfig, DataMode};
use crate::session::SessionSettings;
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timeouts in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect: u64,
    pub read: u64,
    pub data: u64,
    pub idle: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT_SECS,
            read: DEFAULT_READ_TIMEOUT_SECS,
            data: DEFAULT_DATA_TIMEOUT_SECS,
            idle: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferConfig {
    pub buffer_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,
    /// A bcrypt hash, or the plain secret.
    pub password: String,
    pub root: PathBuf,
    #[serde(default = "PermissionSet::read_only")]
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub name: String,
    pub bind_address: String,
    pub pasv_address: Option<IpAddr>,
    pub pasv_port_range: Option<(u16, u16)>,
    #[serde(default = "default_max_login_failures")]
    pub max_login_failures: u32,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_max_login_failures() -> u32 {
    DEFAULT_MAX_LOGIN_FAILURES
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default, rename = "server")]
    pub servers: Vec<ServerConfig>,
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            bail!("At least one [[server]] section is required");
        }
        let size = self.transfer.buffer_size;
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&size) {
            bail!(
                "transfer.buffer_size {} is outside {}..={}",
                size,
                MIN_BUFFER_SIZE,
                MAX_BUFFER_SIZE
            );
        }
        if self.timeouts.connect == 0
            || self.timeouts.read == 0
            || self.timeouts.data == 0
            || self.timeouts.idle == 0
        {
            bail!("Timeouts must be at least one second");
        }

        let username_re = Regex::new(USERNAME_REGEX).context("Bad username pattern")?;
        let mut names = HashSet::new();
        for server in &self.servers {
            if !names.insert(server.name.as_str()) {
                bail!("Duplicate server name: {}", server.name);
            }
            server.validate(&username_re)?;
        }
        Ok(())
    }

    /// Client settings drawn from the shared timeout and transfer sections.
    pub fn client_config(&self, data_mode: DataMode) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(self.timeouts.connect),
            read_timeout: Duration::from_secs(self.timeouts.read),
            data_timeout: Duration::from_secs(self.timeouts.data),
            buffer_size: self.transfer.buffer_size,
            data_mode,
        }
    }

    pub fn session_settings(&self, server: &ServerConfig) -> SessionSettings {
        SessionSettings {
            greeting: server.greeting.clone(),
            max_login_failures: server.max_login_failures,
            idle_timeout: Duration::from_secs(self.timeouts.idle),
            data_timeout: Duration::from_secs(self.timeouts.data),
            stall_timeout: Duration::from_secs(self.timeouts.read),
            buffer_size: self.transfer.buffer_size,
            pasv_address: server.pasv_address,
            pasv_port_range: server.pasv_port_range,
        }
    }
}

impl ServerConfig {
    fn validate(&self, username_re: &Regex) -> Result<()> {
        self.bind_addr()?;
        if let Some((low, high)) = self.pasv_port_range {
            if low == 0 || low > high {
                bail!("[{}] Invalid pasv_port_range {}-{}", self.name, low, high);
            }
        }
        if self.max_login_failures == 0 {
            bail!("[{}] max_login_failures must be at least 1", self.name);
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if !username_re.is_match(&user.username) {
                bail!("[{}] Invalid username: {:?}", self.name, user.username);
            }
            if !seen.insert(user.username.as_str()) {
                bail!("[{}] Duplicate username: {}", self.name, user.username);
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("[{}] Invalid bind_address {:?}", self.name, self.bind_address))
    }

    /// The immutable credential table of this instance.
    pub fn authorizer(&self) -> Authorizer {
        Authorizer::new(self.users.iter().map(|u| {
            CredentialRecord::new(&u.username, &u.password, &u.root, u.permissions.clone())
        }))
    }
}
