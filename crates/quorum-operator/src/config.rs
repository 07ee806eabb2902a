//! Configuration for quorum-operator

use quorum_autoscale::MetricsConfig;
use quorum_formation::FormationConfig;
use quorum_store::BackoffConfig;
use quorum_template::RenderConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main operator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Diagnostics server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Reconcile scheduling
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Conflict retry bounds for every managed write
    #[serde(default)]
    pub applier: BackoffConfig,

    /// Formation gate and timeout
    #[serde(default)]
    pub formation: FormationConfig,

    /// Member template rendering
    #[serde(default)]
    pub render: RenderConfig,

    /// Metrics collection and decision thresholds
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Watched scope
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
        }
    }
}

/// Reconcile scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Full sweep interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// Deadline for a single cluster cycle in seconds
    #[serde(default = "default_cycle_deadline")]
    pub cycle_deadline_secs: u64,

    /// Maximum clusters reconciled at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Capacity of the on-demand trigger channel
    #[serde(default = "default_trigger_capacity")]
    pub trigger_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval(),
            cycle_deadline_secs: default_cycle_deadline(),
            max_concurrent: default_max_concurrent(),
            trigger_capacity: default_trigger_capacity(),
        }
    }
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_secs.max(1))
    }
}

/// Namespaces the operator reconciles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Watched namespaces; empty watches every namespace
    #[serde(default)]
    pub namespaces: BTreeSet<String>,

    /// Quiet period before a burst of scope changes is acted on (milliseconds)
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Capacity of the watcher → supervisor channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            namespaces: BTreeSet::new(),
            debounce_ms: default_debounce(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ScopeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 9090))
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_cycle_deadline() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    8
}

fn default_trigger_capacity() -> usize {
    64
}

fn default_debounce() -> u64 {
    500
}

fn default_channel_capacity() -> usize {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

impl OperatorConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `QUORUM_`-prefixed environment variables (`__` between sections)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&OperatorConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("QUORUM")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
