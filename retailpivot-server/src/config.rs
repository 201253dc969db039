// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retailpivot Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:8000")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// JSON dataset snapshot loaded at startup; in-memory only when unset
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,

    /// Write the snapshot back after every create/ingest
    #[serde(default)]
    pub persist_writes: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Time-to-live of cached aggregations in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// Send through SMTP; otherwise outgoing mail is only logged
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default = "default_from_email")]
    pub from_email: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Pending report jobs before enqueueing is refused
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_max_entries() -> u64 {
    10_000
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_email() -> String {
    "noreply@retailpivot.local".to_string()
}

fn default_from_name() -> String {
    "Retailpivot".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - RETAILPIVOT_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:8000)
    /// - RETAILPIVOT_ENABLE_CORS: Enable CORS (default: true)
    /// - RETAILPIVOT_DATASET: JSON dataset snapshot path
    /// - RETAILPIVOT_PERSIST_WRITES: Write the snapshot back on change (default: false)
    /// - RETAILPIVOT_CACHE_TTL: Cache TTL in seconds (default: 3600)
    /// - RETAILPIVOT_SMTP_HOST / _PORT / _USERNAME / _PASSWORD: SMTP relay; setting the host enables mail
    /// - RETAILPIVOT_FROM_EMAIL: Sender address
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RETAILPIVOT_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(cors) = std::env::var("RETAILPIVOT_ENABLE_CORS") {
            config.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(path) = std::env::var("RETAILPIVOT_DATASET") {
            config.storage.dataset_path = Some(PathBuf::from(path));
        }

        if let Ok(persist) = std::env::var("RETAILPIVOT_PERSIST_WRITES") {
            config.storage.persist_writes = persist.parse().unwrap_or(false);
        }

        if let Ok(ttl) = std::env::var("RETAILPIVOT_CACHE_TTL") {
            if let Ok(val) = ttl.parse() {
                config.cache.ttl_secs = val;
            }
        }

        if let Ok(host) = std::env::var("RETAILPIVOT_SMTP_HOST") {
            config.mail.smtp_host = host;
            config.mail.enabled = true;
        }

        if let Ok(port) = std::env::var("RETAILPIVOT_SMTP_PORT") {
            if let Ok(val) = port.parse() {
                config.mail.smtp_port = val;
            }
        }

        if let Ok(username) = std::env::var("RETAILPIVOT_SMTP_USERNAME") {
            config.mail.username = username;
        }

        if let Ok(password) = std::env::var("RETAILPIVOT_SMTP_PASSWORD") {
            config.mail.password = password;
        }

        if let Ok(from) = std::env::var("RETAILPIVOT_FROM_EMAIL") {
            config.mail.from_email = from;
        }

        config
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config = Self::merge_with_env(config);

        Ok(config)
    }

    /// Merge config with environment variables (env takes priority)
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();
        let is_set = |name: &str| std::env::var(name).is_ok();

        if is_set("RETAILPIVOT_HTTP_ADDR") {
            config.server.listen_addr = env_config.server.listen_addr;
        }
        if is_set("RETAILPIVOT_ENABLE_CORS") {
            config.server.enable_cors = env_config.server.enable_cors;
        }
        if is_set("RETAILPIVOT_DATASET") {
            config.storage.dataset_path = env_config.storage.dataset_path;
        }
        if is_set("RETAILPIVOT_PERSIST_WRITES") {
            config.storage.persist_writes = env_config.storage.persist_writes;
        }
        if is_set("RETAILPIVOT_CACHE_TTL") {
            config.cache.ttl_secs = env_config.cache.ttl_secs;
        }
        if is_set("RETAILPIVOT_SMTP_HOST") {
            config.mail.smtp_host = env_config.mail.smtp_host;
            config.mail.enabled = true;
        }
        if is_set("RETAILPIVOT_SMTP_PORT") {
            config.mail.smtp_port = env_config.mail.smtp_port;
        }
        if is_set("RETAILPIVOT_SMTP_USERNAME") {
            config.mail.username = env_config.mail.username;
        }
        if is_set("RETAILPIVOT_SMTP_PASSWORD") {
            config.mail.password = env_config.mail.password;
        }
        if is_set("RETAILPIVOT_FROM_EMAIL") {
            config.mail.from_email = env_config.mail.from_email;
        }

        config
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.mail.enabled && self.mail.smtp_host.trim().is_empty() {
            anyhow::bail!("Mail enabled but no SMTP host configured");
        }

        if !self.mail.from_email.contains('@') {
            anyhow::bail!("Invalid sender address: {}", self.mail.from_email);
        }

        if self.jobs.queue_capacity == 0 {
            anyhow::bail!("jobs.queue_capacity must be at least 1");
        }

        if self.storage.persist_writes && self.storage.dataset_path.is_none() {
            tracing::warn!("storage.persist_writes is set without a dataset_path; writes stay in memory");
        }

        Ok(())
    }
}
