//! Typed configuration from environment variables or a TOML document.
//!
//! Loads once at startup, fails fast on invalid combinations (e.g. a
//! Postgres backend without a database URL). Sensitive values are wrapped
//! in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::engine::WorkerOptions;
use crate::engine::worker::{DEFAULT_MAX_OPERATION_CONCURRENCY, DEFAULT_MAX_OPERATION_RETRY_COUNT};
use crate::error::{Error, Result};
use crate::queue::dequeuer::DEFAULT_DEQUEUE_INTERVAL;
use crate::queue::{DEFAULT_LEASE_DURATION, DequeuerOptions};
use crate::telemetry::TelemetryConfig;

/// Backend behind the resource store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
    Postgres,
}

/// Backend behind the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueProvider {
    #[default]
    Memory,
    Postgres,
}

fn parse_provider(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "memory" | "inmemory" => Some(false),
        "postgres" | "postgresql" => Some(true),
        _ => None,
    }
}

impl FromStr for StorageProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_provider(s) {
            Some(true) => Ok(Self::Postgres),
            Some(false) => Ok(Self::Memory),
            None => Err(Error::Config(format!("unknown storage provider '{s}'"))),
        }
    }
}

impl FromStr for QueueProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_provider(s) {
            Some(true) => Ok(Self::Postgres),
            Some(false) => Ok(Self::Memory),
            None => Err(Error::Config(format!("unknown queue provider '{s}'"))),
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
        })
    }
}

impl fmt::Display for QueueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: StorageProvider,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub provider: QueueProvider,
    pub name: String,
    pub lease_duration_secs: u64,
    pub dequeue_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            provider: QueueProvider::default(),
            name: "controlplane".to_string(),
            lease_duration_secs: DEFAULT_LEASE_DURATION.as_secs(),
            dequeue_interval_ms: DEFAULT_DEQUEUE_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(deserialize_with = "deserialize_secret")]
    pub url: Option<SecretString>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|v| !v.is_empty()).map(SecretString::from))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_operation_concurrency: usize,
    pub max_operation_retry_count: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_operation_concurrency: DEFAULT_MAX_OPERATION_CONCURRENCY,
            max_operation_retry_count: DEFAULT_MAX_OPERATION_RETRY_COUNT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub service_name: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            otel_endpoint: None,
            log_level: "info".to_string(),
            service_name: "controlplane-store".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub telemetry: TelemetrySettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let config = Self {
            storage: StorageConfig {
                provider: parse_var("STORAGE_PROVIDER", defaults.storage.provider)?,
            },
            queue: QueueConfig {
                provider: parse_var("QUEUE_PROVIDER", defaults.queue.provider)?,
                name: std::env::var("QUEUE_NAME").unwrap_or(defaults.queue.name),
                lease_duration_secs: parse_var(
                    "QUEUE_LEASE_DURATION_SECS",
                    defaults.queue.lease_duration_secs,
                )?,
                dequeue_interval_ms: parse_var(
                    "DEQUEUE_INTERVAL_MS",
                    defaults.queue.dequeue_interval_ms,
                )?,
            },
            database: DatabaseConfig {
                url: secrets::secret_from_env("DATABASE_URL"),
            },
            worker: WorkerConfig {
                max_operation_concurrency: parse_var(
                    "MAX_OPERATION_CONCURRENCY",
                    defaults.worker.max_operation_concurrency,
                )?,
                max_operation_retry_count: parse_var(
                    "MAX_OPERATION_RETRY_COUNT",
                    defaults.worker.max_operation_retry_count,
                )?,
            },
            telemetry: TelemetrySettings {
                otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
                log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.telemetry.log_level),
                service_name: std::env::var("OTEL_SERVICE_NAME")
                    .unwrap_or(defaults.telemetry.service_name),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let config: Self = toml::from_str(document)
            .map_err(|e| Error::Config(format!("invalid configuration document: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let document = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&document)
    }

    /// Whether any selected backend is Postgres.
    pub fn needs_database(&self) -> bool {
        self.storage.provider == StorageProvider::Postgres
            || self.queue.provider == QueueProvider::Postgres
    }

    pub fn validate(&self) -> Result<()> {
        if self.needs_database() && self.database.url.is_none() {
            return Err(Error::Config(
                "a postgres backend is selected but no database url is configured".to_string(),
            ));
        }
        if self.queue.name.is_empty() {
            return Err(Error::Config("queue name must not be empty".to_string()));
        }
        if self.queue.lease_duration_secs == 0 {
            return Err(Error::Config("queue lease duration must be positive".to_string()));
        }
        if self.queue.dequeue_interval_ms == 0 {
            return Err(Error::Config("dequeue interval must be positive".to_string()));
        }
        if self.worker.max_operation_concurrency == 0 {
            return Err(Error::Config(
                "max operation concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.queue.lease_duration_secs)
    }

    pub fn dequeue_interval(&self) -> Duration {
        Duration::from_millis(self.queue.dequeue_interval_ms)
    }

    pub fn dequeuer_options(&self) -> DequeuerOptions {
        DequeuerOptions {
            interval: self.dequeue_interval(),
            ..DequeuerOptions::default()
        }
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            max_operation_concurrency: self.worker.max_operation_concurrency,
            max_operation_retry_count: self.worker.max_operation_retry_count,
            lease_duration: self.lease_duration(),
            dequeuer: self.dequeuer_options(),
            ..WorkerOptions::default()
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            endpoint: self.telemetry.otel_endpoint.clone(),
            service_name: self.telemetry.service_name.clone(),
            log_level: self.telemetry.log_level.clone(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|e| Error::Config(format!("environment variable {name} is invalid: {e}"))),
        _ => Ok(default),
    }
}
