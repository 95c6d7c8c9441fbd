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

use anyhow::{bail, Context, Result};
use rothko_core::SketchParams;
use rothko_storage::{EngineOptions, Tuning};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rothko configuration, one TOML document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RothkoConfig {
    #[serde(default)]
    pub main: MainConfig,
    #[serde(default)]
    pub listeners: ListenersConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dist: DistConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MainConfig {
    /// Aggregation interval: how often the writer is dumped to disk
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub duration: Duration,

    /// Dynamic plugins. Not supported, must be empty.
    #[serde(default)]
    pub plugins: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ListenersConfig {
    #[serde(default)]
    pub graphite: Vec<GraphiteConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphiteConfig {
    /// TCP address, ":port" listens on all interfaces
    #[serde(default = "default_graphite_address")]
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub files: FilesConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilesConfig {
    /// Root of the metric directories
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Slot size in bytes
    #[serde(default = "default_size")]
    pub size: usize,

    /// Slots per data file
    #[serde(default = "default_cap")]
    pub cap: usize,

    /// Data files kept per metric
    #[serde(default = "default_files")]
    pub files: usize,

    #[serde(default)]
    pub tuning: TuningConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TuningConfig {
    /// Write queue depth
    #[serde(default = "default_buffer")]
    pub buffer: usize,

    /// Drop writes instead of blocking when the queue is full
    #[serde(default)]
    pub drop: bool,

    /// Worker threads, 0 = cpus - 1
    #[serde(default)]
    pub workers: usize,

    /// Cached file handles, 0 = derived from the descriptor limit
    #[serde(default)]
    pub handles: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DistConfig {
    #[serde(default)]
    pub tdigest: TDigestConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TDigestConfig {
    #[serde(default = "default_compression")]
    pub compression: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    /// HTTP listen address, ":port" listens on all interfaces
    #[serde(default = "default_api_address")]
    pub address: String,

    /// Access-Control-Allow-Origin value
    #[serde(default = "default_origin")]
    pub origin: String,

    /// HTML page served at "/"
    #[serde(default)]
    pub index: Option<PathBuf>,

    #[serde(default)]
    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub security: Option<SecurityConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TlsConfig {
    pub key: PathBuf,
    pub cert: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SecurityConfig {
    pub username: String,
    pub password: String,
}

// Default values
fn default_duration() -> Duration {
    Duration::from_secs(600)
}

fn default_graphite_address() -> String {
    ":1111".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_size() -> usize {
    256
}

fn default_cap() -> usize {
    400
}

fn default_files() -> usize {
    2
}

fn default_buffer() -> usize {
    20_000
}

fn default_compression() -> f64 {
    5.0
}

fn default_api_address() -> String {
    ":8080".to_string()
}

fn default_origin() -> String {
    "*".to_string()
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            plugins: Vec::new(),
        }
    }
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            address: default_graphite_address(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            size: default_size(),
            cap: default_cap(),
            files: default_files(),
            tuning: TuningConfig::default(),
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            drop: false,
            workers: 0,
            handles: 0,
        }
    }
}

impl Default for TDigestConfig {
    fn default() -> Self {
        Self {
            compression: default_compression(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_api_address(),
            origin: default_origin(),
            index: None,
            tls: None,
            security: None,
        }
    }
}

const STARTER_CONFIG: &str = r#"# Rothko configuration

[main]
# how often aggregated distributions are written to disk
duration = "10m"

# graphite line protocol: "<metric> <value> <timestamp>\n"
[[listeners.graphite]]
address = ":1111"

[database.files]
directory = "data"
# bytes per slot and slots per file
size = 256
cap = 400
# files retained per metric
files = 2

[database.files.tuning]
buffer = 20000
drop = false
# 0 picks a default
workers = 0
handles = 0

[dist.tdigest]
compression = 5.0

[api]
address = ":8080"
origin = "*"

# [api.security]
# username = "admin"
# password = "change me"
"#;

impl RothkoConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Commented starter configuration written by `rothko init`.
    pub fn initial() -> &'static str {
        STARTER_CONFIG
    }

    /// Load with priority: env > file > defaults, then validate.
    ///
    /// Supported environment variables:
    /// - ROTHKO_API_ADDRESS: HTTP listen address
    /// - ROTHKO_DATA_DIR: metric root directory
    /// - ROTHKO_DURATION: aggregation interval, e.g. "1m"
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading configuration");
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `lookup`, normally the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ROTHKO_API_ADDRESS") {
            self.api.address = addr;
        }
        if let Some(dir) = lookup("ROTHKO_DATA_DIR") {
            self.database.files.directory = PathBuf::from(dir);
        }
        if let Some(duration) = lookup("ROTHKO_DURATION") {
            self.main.duration = humantime::parse_duration(&duration)
                .with_context(|| format!("ROTHKO_DURATION: invalid duration {:?}", duration))?;
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        let files = &self.database.files;
        EngineOptions {
            size: files.size,
            cap: files.cap,
            files: files.files,
            tuning: Tuning {
                buffer: files.tuning.buffer,
                drop: files.tuning.drop,
                workers: files.tuning.workers,
                handles: files.tuning.handles,
            },
        }
    }

    pub fn sketch_params(&self) -> SketchParams {
        SketchParams::tdigest(self.dist.tdigest.compression)
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        parse_listen_addr(&self.api.address)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.main.duration.is_zero() {
            bail!("main.duration must be positive");
        }
        if !self.main.plugins.is_empty() {
            bail!(
                "main.plugins: dynamic plugins are not supported ({} configured)",
                self.main.plugins.len()
            );
        }

        self.engine_options()
            .validate()
            .context("database.files")?;

        let compression = self.dist.tdigest.compression;
        if !compression.is_finite() || compression <= 0.0 {
            bail!("dist.tdigest.compression must be positive, got {}", compression);
        }

        for listener in &self.listeners.graphite {
            parse_listen_addr(&listener.address).context("listeners.graphite.address")?;
        }
        self.api_addr().context("api.address")?;

        if self.api.tls.is_some() {
            bail!("api.tls: TLS is not supported, terminate TLS in a reverse proxy");
        }
        if let Some(security) = &self.api.security {
            if security.username.is_empty() {
                bail!("api.security.username must not be empty");
            }
        }
        Ok(())
    }
}

/// Parse a listen address. A bare ":port" binds every interface.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    full.parse()
        .with_context(|| format!("invalid listen address {:?}", addr))
}
