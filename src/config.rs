use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::LevelFilter;
use url::Url;

use crate::watcher::WatcherConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },
    #[error("Invalid webhook URL: {0}")]
    Webhook(#[from] url::ParseError),
    #[error("Unknown log level {0:?}")]
    LogLevel(String),
    #[error("{0}")]
    Invalid(String),
}

/// Configuration used by the rest of the program, validated.
#[derive(Debug, Clone)]
pub struct MoondockConfig {
    pub watcher: WatcherConfig,
    pub docker: DockerConfig,
    pub discord: DiscordConfig,
    pub log: LogConfig,
    /// Actions forwarded to the sink. Empty forwards everything.
    pub critical_events: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// `DOCKER_HOST` style address. `None` uses the local defaults.
    pub host: Option<String>,
    /// How often a blocked read checks for cancellation.
    pub read_poll: Duration,
    /// Directory holding `ca.pem`, `cert.pem` and `key.pem`. Set only when
    /// TLS verification is enabled.
    pub tls: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook: Option<Url>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct MoondockConfigFile {
    watcher: WatcherSection,
    docker: DockerSection,
    discord: DiscordSection,
    log: LogSection,
    critical_events: Vec<String>,
}

/// Durations are in seconds.
#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct WatcherSection {
    initial_backoff: f64,
    backoff_factor: f64,
    max_backoff: f64,
    max_retries: Option<u32>,
    stop_grace: f64,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            initial_backoff: 1.0,
            backoff_factor: 2.0,
            max_backoff: 60.0,
            max_retries: None,
            stop_grace: 5.0,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct DockerSection {
    host: Option<String>,
    read_poll: f64,
    tls_verify: bool,
    cert_path: Option<PathBuf>,
}

impl Default for DockerSection {
    fn default() -> Self {
        Self {
            host: None,
            read_poll: 1.0,
            tls_verify: false,
            cert_path: None,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct DiscordSection {
    webhook: Option<String>,
    timeout: u64,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            webhook: None,
            timeout: 5,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct LogSection {
    level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl MoondockConfig {
    /// Reads the TOML file at `path` (a missing file means defaults) and
    /// applies the environment on top.
    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        let file = match std::fs::read_to_string(path) {
            Ok(contents) => MoondockConfigFile::try_init_from_string(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MoondockConfigFile::default(),
            Err(e) => return Err(e.into()),
        };
        file.with_env(|key| std::env::var(key).ok())?.into_config()
    }
}

impl MoondockConfigFile {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(webhook) = var("DISCORD_WEBHOOK") {
            self.discord.webhook = Some(webhook);
        }
        if let Some(host) = var("DOCKER_HOST") {
            self.docker.host = Some(host);
        }
        if let Some(verify) = var("DOCKER_TLS_VERIFY") {
            self.docker.tls_verify = matches!(verify.as_str(), "1" | "true" | "True");
        }
        if let Some(cert_path) = var("DOCKER_CERT_PATH") {
            self.docker.cert_path = Some(PathBuf::from(cert_path));
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(timeout) = var("HTTP_TIMEOUT_SECONDS") {
            self.discord.timeout = timeout.parse().map_err(|_| ConfigError::Env {
                key: "HTTP_TIMEOUT_SECONDS",
                value: timeout.clone(),
            })?;
        }
        if let Some(events) = var("CRITICAL_EVENTS") {
            self.critical_events = events.split(',').map(str::to_string).collect();
        }
        Ok(self)
    }

    fn into_config(self) -> Result<MoondockConfig, ConfigError> {
        let watcher = &self.watcher;
        let initial_backoff = seconds("watcher.initial_backoff", watcher.initial_backoff)?;
        let max_backoff = seconds("watcher.max_backoff", watcher.max_backoff)?;
        if max_backoff < initial_backoff {
            return Err(ConfigError::Invalid(format!(
                "watcher.max_backoff ({}) is smaller than watcher.initial_backoff ({})",
                watcher.max_backoff, watcher.initial_backoff
            )));
        }
        if !watcher.backoff_factor.is_finite() || watcher.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "watcher.backoff_factor must be at least 1, got {}",
                watcher.backoff_factor
            )));
        }

        let webhook = match self.discord.webhook.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(webhook) => Some(Url::parse(webhook)?),
        };

        let tls = match (self.docker.tls_verify, self.docker.cert_path) {
            (false, _) => None,
            (true, Some(path)) if !path.as_os_str().is_empty() => Some(path),
            (true, _) => {
                return Err(ConfigError::Invalid(
                    "docker.tls_verify is enabled but docker.cert_path is not set".to_string(),
                ));
            }
        };

        let level = crate::logging::parse_level(&self.log.level)
            .ok_or_else(|| ConfigError::LogLevel(self.log.level.clone()))?;

        let critical_events = self
            .critical_events
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(MoondockConfig {
            watcher: WatcherConfig {
                initial_backoff,
                backoff_factor: watcher.backoff_factor,
                max_backoff,
                max_retries: watcher.max_retries,
                stop_grace: seconds("watcher.stop_grace", watcher.stop_grace)?,
            },
            docker: DockerConfig {
                host: self.docker.host.filter(|h| !h.trim().is_empty()),
                read_poll: seconds("docker.read_poll", self.docker.read_poll)?,
                tls,
            },
            discord: DiscordConfig {
                webhook,
                timeout: Duration::from_secs(self.discord.timeout),
            },
            log: LogConfig { level },
            critical_events,
        })
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(ConfigError::Invalid(format!(
            "{name} must be a positive number of seconds, got {value}"
        ))),
    }
}
