use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub ledger: LedgerConfig,
    pub scheduler: SchedulerConfig,
    pub notification: NotificationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub ledger_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Attempts for one counter recompute before it is reported as failed.
    pub recompute_attempts: u32,
}

// Настройки планировщика автоотмены
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub horizon_days: i64,
    pub refresh_interval_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub sweep_lookahead_hours: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_days: 21,
            refresh_interval_seconds: 3600,
            sweep_interval_seconds: 900,
            sweep_lookahead_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// No webhook channel when unset; events are still logged.
    pub webhook_url: Option<String>,
    pub webhook_secret: String,
    pub timeout_seconds: u64,
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

fn var_or(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parsed<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(key, default);
    value.parse().map_err(|_| ConfigError::Invalid { key, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parsed("PORT", "8000")?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "studio_booking=debug,tower_http=debug"),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parsed("DB_POOL_SIZE", "20")?,
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
                ledger_ttl_seconds: parsed("LEDGER_CACHE_TTL_SECONDS", "300")?,
            },
            ledger: LedgerConfig {
                recompute_attempts: parsed("LEDGER_RECOMPUTE_RETRIES", "3")?,
            },
            scheduler: SchedulerConfig {
                horizon_days: parsed("SCHEDULER_HORIZON_DAYS", "21")?,
                refresh_interval_seconds: parsed("SCHEDULER_REFRESH_INTERVAL_SECONDS", "3600")?,
                sweep_interval_seconds: parsed("SCHEDULER_SWEEP_INTERVAL_SECONDS", "900")?,
                sweep_lookahead_hours: parsed("SCHEDULER_SWEEP_LOOKAHEAD_HOURS", "24")?,
            },
            notification: NotificationConfig {
                webhook_url: env::var("NOTIFICATION_WEBHOOK_URL").ok().filter(|u| !u.trim().is_empty()),
                webhook_secret: var_or("NOTIFICATION_WEBHOOK_SECRET", ""),
                timeout_seconds: parsed("NOTIFICATION_TIMEOUT_SECONDS", "5")?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parsed("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "5")?,
                timeout_seconds: parsed("CIRCUIT_BREAKER_TIMEOUT_SECONDS", "60")?,
            },
        })
    }
}
