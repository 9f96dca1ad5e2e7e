//! Configuration management for the Vigil server.
//!
//! Configuration is loaded from a TOML file with `${VAR_NAME}` environment
//! placeholders, falling back to defaults for every optional knob.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use vigil_engine::{RoleWeights, ScoringPolicy};

/// Main configuration for the server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Event bus configuration
    #[serde(default)]
    pub bus: BusConfig,

    /// Hex grid configuration
    #[serde(default)]
    pub hex: HexConfig,

    /// Triangulation policy parameters
    #[serde(default)]
    pub triangulation: TriangulationConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://vigil.db")
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Event bus (NATS JetStream) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// NATS server URL
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// Publish deadline in milliseconds; a publish that does not get a
    /// stream acknowledgement within this bound fails.
    #[serde(default = "default_publish_deadline_ms")]
    pub publish_deadline_ms: u64,

    /// Redeliver a message after a handler storage failure instead of
    /// discarding it.
    #[serde(default)]
    pub redeliver_on_handler_error: bool,
}

/// Hex grid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HexConfig {
    /// H3 resolution for report cells. Changing this invalidates every
    /// stored cell until a re-index.
    #[serde(default = "default_hex_resolution")]
    pub resolution: u8,
}

/// Triangulation policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangulationConfig {
    /// Minimum aggregated weight for promotion
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Geodesic neighborhood radius in meters
    #[serde(default = "default_radius_meters")]
    pub radius_meters: f64,

    /// Half-window in minutes before and after the target's creation
    #[serde(default = "default_time_window_minutes")]
    pub time_window_minutes: i64,

    /// Per-role corroboration weights
    #[serde(default)]
    pub weights: WeightsConfig,
}

/// Per-role corroboration weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsConfig {
    /// Weight of an accredited observer
    #[serde(default = "default_weight_observer")]
    pub observer: f64,

    /// Weight of an identity-verified citizen
    #[serde(default = "default_weight_verified_citizen")]
    pub verified_citizen: f64,

    /// Weight of an unverified citizen
    #[serde(default = "default_weight_citizen")]
    pub citizen: f64,

    /// Weight of every other role
    #[serde(default = "default_weight_other")]
    pub other: f64,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (e.g., "0.0.0.0:8080")
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent consumer tasks
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_database_url() -> String {
    "sqlite://vigil.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_bus_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_publish_deadline_ms() -> u64 {
    5000
}

fn default_hex_resolution() -> u8 {
    vigil_core::DEFAULT_RESOLUTION
}

fn default_threshold() -> f64 {
    1.0
}

fn default_radius_meters() -> f64 {
    500.0
}

fn default_time_window_minutes() -> i64 {
    30
}

fn default_weight_observer() -> f64 {
    1.0
}

fn default_weight_verified_citizen() -> f64 {
    0.35
}

fn default_weight_citizen() -> f64 {
    0.2
}

fn default_weight_other() -> f64 {
    0.1
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            publish_deadline_ms: default_publish_deadline_ms(),
            redeliver_on_handler_error: false,
        }
    }
}

impl Default for HexConfig {
    fn default() -> Self {
        Self {
            resolution: default_hex_resolution(),
        }
    }
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            radius_meters: default_radius_meters(),
            time_window_minutes: default_time_window_minutes(),
            weights: WeightsConfig::default(),
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            observer: default_weight_observer(),
            verified_citizen: default_weight_verified_citizen(),
            citizen: default_weight_citizen(),
            other: default_weight_other(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl TriangulationConfig {
    /// Build the engine policy from the configured parameters.
    pub fn policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            threshold: self.threshold,
            radius_meters: self.radius_meters,
            window_minutes: self.time_window_minutes,
            weights: RoleWeights {
                observer: self.weights.observer,
                verified_citizen: self.weights.verified_citizen,
                citizen: self.weights.citizen,
                other: self.weights.other,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax,
    /// for example `url = "${DATABASE_URL}"`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.bus.url.is_empty() {
            anyhow::bail!("Bus URL cannot be empty");
        }
        if self.bus.publish_deadline_ms == 0 {
            anyhow::bail!("Bus publish_deadline_ms must be > 0");
        }

        if self.hex.resolution > 15 {
            anyhow::bail!(
                "Hex resolution must be between 0 and 15 (got {})",
                self.hex.resolution
            );
        }

        self.triangulation
            .policy()
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid [triangulation] section")?;

        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!(
                "Server listen address '{}' is not a valid socket address",
                self.server.listen
            );
        }

        if self.worker.concurrency == 0 {
            anyhow::bail!("Worker concurrency must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

/// Expand `${VAR_NAME}` placeholders against the process environment.
///
/// Unset variables are an error, not an empty substitution.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        if ch != '$' || chars.peek().map(|(_, c)| *c) != Some('{') {
            result.push(ch);
            continue;
        }
        chars.next(); // consume '{'

        let mut var_name = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            var_name.push(c);
        }

        if !closed {
            anyhow::bail!("Unclosed environment variable placeholder at byte {}", pos);
        }
        if var_name.is_empty() {
            anyhow::bail!("Empty environment variable name at byte {}", pos);
        }

        let value = std::env::var(&var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' is not set", var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
