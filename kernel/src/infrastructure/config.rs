use config::{Config, ConfigError, Environment};
use secrecy::SecretString;
use serde::Deserialize;

/// Top-level settings, loaded from code defaults plus `STRATA__*` env vars.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
    /// Database settings.
    pub database: DatabaseSettings,
    /// Branched-mutation settings.
    pub mutation: MutationSettings,
}

/// HTTP bind settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

/// Telemetry settings.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    /// Service name reported to the collector.
    pub service_name: String,
    /// OTLP endpoint; tracing export is disabled when absent.
    pub otlp_endpoint: Option<String>,
    /// Trace sampling ratio.
    #[serde(default = "default_sampling")]
    pub sampling_ratio: f64,
}

fn default_sampling() -> f64 {
    1.0
}

/// Database connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    /// Connection URL for the Dolt SQL server.
    pub url: SecretString,
    /// Pool size; every in-flight mutation holds one connection.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    16
}

/// Settings for the branched-mutation core.
#[derive(Debug, Deserialize, Clone)]
pub struct MutationSettings {
    /// Bound on merge-lock acquisition, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Prefix for generated mutation branch names.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_lock_timeout_ms() -> u64 {
    10_000
}

fn default_branch_prefix() -> String {
    "strata-mut".to_string()
}

impl Settings {
    /// Load settings from defaults and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when required values are missing (`database.url`) or
    /// an environment value does not deserialize.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("telemetry.service_name", "strata-kernel")?
            .set_default("telemetry.sampling_ratio", 1.0)?
            .set_default("mutation.lock_timeout_ms", 10_000)?
            .set_default("mutation.branch_prefix", "strata-mut")?
            // Merge in Environment variables
            .add_source(Environment::with_prefix("STRATA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
