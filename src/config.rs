use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable pointing at an override config file
pub const CONFIG_PATH_ENV: &str = "EOL_INTEGRATOR_CONFIG";

/// Environment variable overriding the base directory (`~/.eol-integrator`)
pub const HOME_DIR_ENV: &str = "EOL_INTEGRATOR_HOME";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reliable publisher configuration
    pub publisher: PublisherConfig,

    /// Exchange and routing keys for scraped data
    pub routing: RoutingConfig,

    /// Credential store configuration
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Undeliverable message handling
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Source runner configuration
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: EOL_INTEGRATOR__)
            .add_source(
                config::Environment::with_prefix("EOL_INTEGRATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publisher: PublisherConfig::default(),
            routing: RoutingConfig::default(),
            credentials: CredentialsConfig::default(),
            escalation: EscalationConfig::default(),
            observability: ObservabilityConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

/// What to do when the broker connection cannot be opened at all
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailurePolicy {
    /// Log and drop the attempt; only broker rejections are retried
    #[default]
    Abandon,
    /// Register the message for retry just like a rejection
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Label recorded as the origin of every registered message
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Retries per message before it is escalated
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between retry sweeps (seconds)
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Upper bound on the wait for a publish confirmation (seconds)
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    /// AMQP heartbeat (seconds)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u16,

    /// Behaviour on connection failure
    #[serde(default)]
    pub connection_failure_policy: ConnectionFailurePolicy,
}

impl PublisherConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            max_retries: default_max_retries(),
            retry_interval_secs: default_retry_interval(),
            confirm_timeout_secs: default_confirm_timeout(),
            heartbeat_secs: default_heartbeat(),
            connection_failure_policy: ConnectionFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Exchange scraped data is published on
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Routing key for software EOL data
    #[serde(default = "default_software_routing_key")]
    pub software_routing_key: String,

    /// Routing key for hardware EOL data
    #[serde(default = "default_hardware_routing_key")]
    pub hardware_routing_key: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            software_routing_key: default_software_routing_key(),
            hardware_routing_key: default_hardware_routing_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Directory of the persistent credential cache
    pub cache_dir: Option<PathBuf>,
}

impl CredentialsConfig {
    /// Resolve the cache directory, falling back to `<home>/cache`
    pub fn resolved_cache_dir(&self) -> crate::error::Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(base_dir()?.join("cache")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationMode {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default)]
    pub mode: EscalationMode,

    /// Target of the webhook sink
    pub webhook_url: Option<String>,

    /// Webhook timeout (seconds)
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            mode: EscalationMode::default(),
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Where test runs write collected rows
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// HTTP timeout for fetching vendor pages (seconds)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Base directory for local state, `$EOL_INTEGRATOR_HOME` or `~/.eol-integrator`
pub fn base_dir() -> crate::error::Result<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        crate::error::AppError::Configuration("Could not determine home directory".to_string())
    })?;

    Ok(home.join(".eol-integrator"))
}

// Default value functions
fn default_service_name() -> String {
    "Scraper-Service".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_interval() -> u64 {
    5
}

fn default_confirm_timeout() -> u64 {
    30
}

fn default_heartbeat() -> u16 {
    60
}

fn default_exchange() -> String {
    "mdm_scraper_integrator_exchange_tp".to_string()
}

fn default_software_routing_key() -> String {
    "mdm.scraper.software.integrator".to_string()
}

fn default_hardware_routing_key() -> String {
    "mdm.scraper.device.integrator".to_string()
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_fetch_timeout() -> u64 {
    30
}
