//! Gateway configuration module
//!
//! Loads the immutable configuration snapshot from a TOML file layered with
//! `HEARTH_<SECTION>__<KEY>` environment overrides. A missing file is
//! replaced by the bundled template and reported as unconfigured, as is an
//! empty token.

use crate::error::GatewayError;
use crate::topology::{CacheFlag, ShardTotal};
use config::{Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use twilight_gateway::Intents;

/// Default configuration path, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "hearth.toml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "HEARTH";

/// Template materialized when no configuration file exists
pub const DEFAULT_TEMPLATE: &str = include_str!("../resources/hearth.toml");

/// Discord bot token. Never printed.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Token(<empty>)")
        } else {
            f.write_str("Token(<redacted>)")
        }
    }
}

/// Discord client settings (`[client]`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub token: Token,
    pub language: String,
    pub activity: String,
    /// Total shard count, `-1` lets the platform decide
    pub shard_total: i64,
    pub shard_min: i64,
    pub shard_max: i64,
    pub gateway_intents: Vec<String>,
    pub enabled_cache_flags: Vec<CacheFlag>,
    pub disabled_cache_flags: Vec<CacheFlag>,
    pub auto_reconnect: bool,
    pub large_threshold: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            token: Token::default(),
            language: "en".to_string(),
            activity: String::new(),
            shard_total: -1,
            shard_min: -1,
            shard_max: -1,
            gateway_intents: vec![
                "GUILDS".to_string(),
                "GUILD_MESSAGES".to_string(),
                "GUILD_MEMBERS".to_string(),
            ],
            enabled_cache_flags: Vec::new(),
            disabled_cache_flags: Vec::new(),
            auto_reconnect: true,
            large_threshold: 250,
        }
    }
}

/// Persistent storage settings (`[storage]`)
///
/// The storage engine itself lives outside the gateway; modules receive
/// these parameters through their context when storage is enabled.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Token,
    pub pool_size: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 5432,
            database: "hearth".to_string(),
            username: "hearth".to_string(),
            password: Token::default(),
            pool_size: 10,
        }
    }
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("pool_size", &self.pool_size)
            .finish_non_exhaustive()
    }
}

/// Module discovery settings (`[modules]`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub directory: PathBuf,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("modules"),
        }
    }
}

/// Background execution settings (`[runtime]`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Concurrent workers in the shared pool
    pub worker_threads: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { worker_threads: 30 }
    }
}

/// Health/metrics HTTP settings (`[http]`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Port for /health, /ready and /metrics. Absent disables the server.
    pub port: Option<u16>,
}

/// Full settings tree
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientSettings,
    pub storage: StorageSettings,
    pub modules: ModuleSettings,
    pub runtime: RuntimeSettings,
    pub http: HttpSettings,
}

impl Settings {
    /// Requested shard total with the `-1` sentinel decoded
    pub fn shard_total(&self) -> Result<ShardTotal, GatewayError> {
        ShardTotal::from_config(self.client.shard_total)
    }

    /// Parse configured intent names into Twilight intents
    pub fn intents(&self) -> Result<Intents, GatewayError> {
        parse_intents(&self.client.gateway_intents)
    }

    /// Activity string if one is configured
    pub fn activity(&self) -> Option<&str> {
        let activity = self.client.activity.trim();
        (!activity.is_empty()).then_some(activity)
    }
}

/// Why this run stopped before connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unconfigured {
    /// No configuration file existed; the template was written here
    TemplateCreated { path: PathBuf },
    /// The configuration has no token
    MissingToken { path: PathBuf },
}

impl fmt::Display for Unconfigured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TemplateCreated { path } => write!(
                f,
                "configuration created at {}, please configure it then restart",
                path.display()
            ),
            Self::MissingToken { path } => write!(
                f,
                "no discord token specified, please configure it in {}",
                path.display()
            ),
        }
    }
}

/// Result of loading configuration
#[derive(Debug, Clone)]
pub enum ConfigOutcome {
    Loaded(ConfigSnapshot),
    Unconfigured(Unconfigured),
}

/// Immutable, shared view of the loaded settings
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    settings: Arc<Settings>,
    source: Option<PathBuf>,
}

impl ConfigSnapshot {
    /// Load the snapshot from `path`, materializing the template if absent
    pub fn load(path: &Path) -> Result<ConfigOutcome, GatewayError> {
        if !path.exists() {
            info!(path = %path.display(), "Configuration file not found, creating it");
            write_template(path)?;
            return Ok(ConfigOutcome::Unconfigured(Unconfigured::TemplateCreated {
                path: path.to_path_buf(),
            }));
        }

        info!(path = %path.display(), "Loading configuration");

        let settings: Settings = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| GatewayError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        if settings.client.token.is_blank() {
            return Ok(ConfigOutcome::Unconfigured(Unconfigured::MissingToken {
                path: path.to_path_buf(),
            }));
        }

        Ok(ConfigOutcome::Loaded(Self {
            settings: Arc::new(settings),
            source: Some(path.to_path_buf()),
        }))
    }

    /// Wrap already-built settings (tests and embedding)
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            source: None,
        }
    }

    /// File the snapshot was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl Deref for ConfigSnapshot {
    type Target = Settings;

    fn deref(&self) -> &Settings {
        &self.settings
    }
}

fn write_template(path: &Path) -> Result<(), GatewayError> {
    let to_error = |source| GatewayError::TemplateWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_error)?;
    }
    std::fs::write(path, DEFAULT_TEMPLATE).map_err(to_error)
}

/// Parse intent names (`GUILDS`, `GUILD_MEMBERS`, ...) into a flag set
pub fn parse_intents<S: AsRef<str>>(names: &[S]) -> Result<Intents, GatewayError> {
    names.iter().try_fold(Intents::empty(), |acc, name| {
        let name = name.as_ref().trim();
        Intents::from_name(&name.to_ascii_uppercase())
            .map(|intent| acc | intent)
            .ok_or_else(|| GatewayError::Config(format!("unknown gateway intent '{name}'")))
    })
}
