use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::compute::BackendKind;
use crate::jobs::PollPolicy;

pub const DEFAULT_DIRECT_NODE: &str = "https://2.c2d.nodes.oceanprotocol.com";
pub const DEFAULT_INDEXER_URL: &str = "https://v4.aquarius.oceanprotocol.com";
pub const DEFAULT_PROVIDER_URL: &str = "https://v4.provider.oceanprotocol.com";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub compute: ComputeConfig,
    pub assets: AssetPaths,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");
        let format = LogFormat::parse(&var_or("APP_LOG_FORMAT", "compact"))?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            compute: ComputeConfig::load()?,
            assets: AssetPaths {
                algorithm_path: optional_var("ALGORITHM_PATH").map(PathBuf::from),
                hospitals_path: optional_var("HOSPITALS_PATH").map(PathBuf::from),
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Compute backend selection, polling budget and backend endpoints.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub backend: BackendKind,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub direct: DirectNodeConfig,
    pub ledger: LedgerConfig,
}

impl ComputeConfig {
    fn load() -> Result<Self, ConfigError> {
        let backend_name = var_or("COMPUTE_BACKEND", "direct");
        let backend = BackendKind::parse(&backend_name)
            .ok_or(ConfigError::InvalidBackend(backend_name))?;

        let max_attempts = parse_number::<u32>("COMPUTE_MAX_ATTEMPTS", 30)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "COMPUTE_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let ledger = LedgerConfig {
            indexer_url: var_or("AQUARIUS_URL", DEFAULT_INDEXER_URL),
            provider_url: var_or("PROVIDER_URL", DEFAULT_PROVIDER_URL),
            consumer_address: optional_var("CONSUMER_ADDRESS").unwrap_or_default(),
            consumer_signature: optional_var("CONSUMER_SIGNATURE"),
            dataset_did: optional_var("DATASET_DID").unwrap_or_default(),
            algorithm_did: optional_var("ALGORITHM_DID").unwrap_or_default(),
        };
        if backend == BackendKind::Ledger {
            ledger.require_complete()?;
        }

        Ok(Self {
            backend,
            poll_interval: Duration::from_secs(parse_number("COMPUTE_POLL_INTERVAL_SECS", 10)?),
            max_attempts,
            request_timeout: Duration::from_secs(parse_number(
                "COMPUTE_REQUEST_TIMEOUT_SECS",
                30,
            )?),
            direct: DirectNodeConfig {
                node_url: var_or("OCEAN_C2D_NODE", DEFAULT_DIRECT_NODE),
            },
            ledger,
        })
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            max_attempts: self.max_attempts,
        }
    }

    /// Endpoint reported by the health check for the selected backend.
    pub fn endpoint(&self) -> &str {
        match self.backend {
            BackendKind::Direct => &self.direct.node_url,
            BackendKind::Ledger => &self.ledger.provider_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectNodeConfig {
    pub node_url: String,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub indexer_url: String,
    pub provider_url: String,
    pub consumer_address: String,
    pub consumer_signature: Option<String>,
    pub dataset_did: String,
    pub algorithm_did: String,
}

impl LedgerConfig {
    fn require_complete(&self) -> Result<(), ConfigError> {
        let required = [
            ("CONSUMER_ADDRESS", &self.consumer_address),
            ("DATASET_DID", &self.dataset_did),
            ("ALGORITHM_DID", &self.algorithm_did),
        ];
        match required.into_iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(ConfigError::MissingVar(name)),
            None => Ok(()),
        }
    }
}

/// Overrides for the bundled algorithm script and hospital snapshot.
#[derive(Debug, Clone, Default)]
pub struct AssetPaths {
    pub algorithm_path: Option<PathBuf>,
    pub hospitals_path: Option<PathBuf>,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
            var: name,
            value,
        }),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str, value: String },
    InvalidBackend(String),
    InvalidLogFormat(String),
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a positive integer, got '{value}'")
            }
            ConfigError::InvalidBackend(value) => {
                write!(f, "COMPUTE_BACKEND must be 'direct' or 'ledger', got '{value}'")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::MissingVar(var) => {
                write!(f, "{var} is required for the ledger compute backend")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
