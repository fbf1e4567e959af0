use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::allocation::OptimizerConfig;
use crate::recommendation::{RecommendationConfig, DEFAULT_UPSTREAM_TIMEOUT};

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

/// Top-level configuration for the recommendation service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub upstream: UpstreamConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let timeout = match non_empty_var("UPSTREAM_TIMEOUT_MS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidTimeout { value: raw }),
            },
            None => DEFAULT_UPSTREAM_TIMEOUT,
        };

        let max_improvement_rounds = non_empty_var("OPTIMIZER_MAX_ROUNDS")
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|_| ConfigError::InvalidRounds { value: raw })
            })
            .transpose()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            upstream: UpstreamConfig {
                profile_store_path: non_empty_var("PROFILE_STORE_PATH").map(PathBuf::from),
                offer_catalog_path: non_empty_var("OFFER_CATALOG_PATH").map(PathBuf::from),
                timeout,
            },
            optimizer: OptimizerConfig {
                max_improvement_rounds,
            },
        })
    }

    /// Settings handed to the recommendation service at construction time.
    pub fn recommendation(&self) -> RecommendationConfig {
        RecommendationConfig {
            upstream_timeout: self.upstream.timeout,
            optimizer: self.optimizer.clone(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
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
    pub ansi: bool,
}

/// Where the profile store and offer catalog live and how long to wait on them.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub profile_store_path: Option<PathBuf>,
    pub offer_catalog_path: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout { value: String },
    InvalidRounds { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout { value } => write!(
                f,
                "UPSTREAM_TIMEOUT_MS must be a positive number of milliseconds (got '{}')",
                value
            ),
            ConfigError::InvalidRounds { value } => write!(
                f,
                "OPTIMIZER_MAX_ROUNDS must be a non-negative integer (got '{}')",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTimeout { .. }
            | ConfigError::InvalidRounds { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "PROFILE_STORE_PATH",
            "OFFER_CATALOG_PATH",
            "UPSTREAM_TIMEOUT_MS",
            "OPTIMIZER_MAX_ROUNDS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.telemetry.ansi);
        assert!(config.upstream.profile_store_path.is_none());
        assert!(config.upstream.offer_catalog_path.is_none());
        assert_eq!(config.upstream.timeout, DEFAULT_UPSTREAM_TIMEOUT);
        assert_eq!(config.optimizer.max_improvement_rounds, None);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_upstream_and_optimizer_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("PROFILE_STORE_PATH", "data/profiles.csv");
        env::set_var("OFFER_CATALOG_PATH", "  ");
        env::set_var("UPSTREAM_TIMEOUT_MS", "750");
        env::set_var("OPTIMIZER_MAX_ROUNDS", "3");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert!(!config.telemetry.ansi);
        assert_eq!(
            config.upstream.profile_store_path,
            Some(PathBuf::from("data/profiles.csv"))
        );
        assert!(config.upstream.offer_catalog_path.is_none());

        let recommendation = config.recommendation();
        assert_eq!(recommendation.upstream_timeout, Duration::from_millis(750));
        assert_eq!(recommendation.optimizer.max_improvement_rounds, Some(3));
        reset_env();
    }

    #[test]
    fn rejects_zero_timeout_and_bad_rounds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("UPSTREAM_TIMEOUT_MS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidTimeout { .. })
        ));

        reset_env();
        env::set_var("OPTIMIZER_MAX_ROUNDS", "many");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidRounds { .. })
        ));
        reset_env();
    }
}
