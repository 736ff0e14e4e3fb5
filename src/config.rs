//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    pub reconciliation: ReconciliationConfig,
    pub retention: RetentionConfig,
    pub local_store: LocalStoreConfig,
    pub security_log: SecurityLogConfig,
    pub logging: LoggingConfig,
}

/// Resource cache TTLs
///
/// Bookings change often and get a short TTL; users, groomers and
/// packages are near-static reference data.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Bookings cache TTL in seconds (default: 30)
    pub bookings_ttl_seconds: u64,
    /// Customers cache TTL in seconds (default: 60)
    pub customers_ttl_seconds: u64,
    /// Groomers cache TTL in seconds (default: 60)
    pub groomers_ttl_seconds: u64,
    /// Packages cache TTL in seconds (default: 60)
    pub packages_ttl_seconds: u64,
}

/// Remote database call bounds
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Timeout for remote reads in seconds (default: 8)
    pub read_timeout_seconds: u64,
    /// Timeout for remote writes in seconds (default: 5)
    pub write_timeout_seconds: u64,
}

/// Ambiguous-outcome reconciliation windows
///
/// Both are heuristic tie-breakers that assume small client/server
/// clock skew. They are configuration, not constants, pending product
/// confirmation of the exact values.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// How far back a `server_generated` record may have been created
    /// and still be matched to an ambiguous transaction (default: 10)
    pub grace_window_seconds: u64,
    /// Window for the dashboard's "recently confirmed" view (default: 24)
    pub recent_confirmation_window_hours: u64,
}

/// Local-store retention windows, all in days
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Completed/cancelled bookings kept in the local snapshot (default: 90)
    pub completed_bookings_days: u64,
    /// History entries (default: 30)
    pub history_days: u64,
    /// Security log entries (default: 7)
    pub security_log_days: u64,
    /// Action locks (default: 1)
    pub action_locks_days: u64,
    /// Janitor sweep interval in seconds (default: 3600)
    pub sweep_interval_seconds: u64,
}

/// Quota-limited local store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStoreConfig {
    /// Byte ceiling for serialized keys + values (default: 5 MiB)
    pub quota_bytes: usize,
    /// Trailing debounce window for batched writes (default: 500)
    pub flush_debounce_ms: u64,
}

/// Security/audit log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityLogConfig {
    /// Maximum retained entries, oldest dropped first (default: 500)
    pub max_entries: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (GROOMBOOK_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("cache.bookings_ttl_seconds", 30)?
            .set_default("cache.customers_ttl_seconds", 60)?
            .set_default("cache.groomers_ttl_seconds", 60)?
            .set_default("cache.packages_ttl_seconds", 60)?
            .set_default("remote.read_timeout_seconds", 8)?
            .set_default("remote.write_timeout_seconds", 5)?
            .set_default("reconciliation.grace_window_seconds", 10)?
            .set_default("reconciliation.recent_confirmation_window_hours", 24)?
            .set_default("retention.completed_bookings_days", 90)?
            .set_default("retention.history_days", 30)?
            .set_default("retention.security_log_days", 7)?
            .set_default("retention.action_locks_days", 1)?
            .set_default("retention.sweep_interval_seconds", 3600)?
            .set_default("local_store.quota_bytes", 5 * 1024 * 1024)?
            .set_default("local_store.flush_debounce_ms", 500)?
            .set_default("security_log.max_entries", 500)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (GROOMBOOK_*)
            .add_source(
                Environment::with_prefix("GROOMBOOK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Configuration suitable for tests: defaults with a tiny sweep
    /// interval and no file/env sources.
    pub fn for_tests() -> Self {
        Self {
            cache: CacheConfig {
                bookings_ttl_seconds: 30,
                customers_ttl_seconds: 60,
                groomers_ttl_seconds: 60,
                packages_ttl_seconds: 60,
            },
            remote: RemoteConfig {
                read_timeout_seconds: 8,
                write_timeout_seconds: 5,
            },
            reconciliation: ReconciliationConfig {
                grace_window_seconds: 10,
                recent_confirmation_window_hours: 24,
            },
            retention: RetentionConfig {
                completed_bookings_days: 90,
                history_days: 30,
                security_log_days: 7,
                action_locks_days: 1,
                sweep_interval_seconds: 3600,
            },
            local_store: LocalStoreConfig {
                quota_bytes: 5 * 1024 * 1024,
                flush_debounce_ms: 500,
            },
            security_log: SecurityLogConfig { max_entries: 500 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_QUOTA_BYTES: usize = 4096;

        if self.reconciliation.grace_window_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "reconciliation.grace_window_seconds must be greater than 0".to_string(),
            ));
        }

        if self.local_store.quota_bytes < MIN_QUOTA_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "local_store.quota_bytes must be at least {} bytes",
                MIN_QUOTA_BYTES
            )));
        }

        if self.local_store.flush_debounce_ms == 0 {
            return Err(crate::error::AppError::Config(
                "local_store.flush_debounce_ms must be greater than 0".to_string(),
            ));
        }

        if self.security_log.max_entries == 0 {
            return Err(crate::error::AppError::Config(
                "security_log.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.remote.read_timeout_seconds == 0 || self.remote.write_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "remote timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_defaults() {
        let config = AppConfig::for_tests();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_grace_window() {
        let mut config = AppConfig::for_tests();
        config.reconciliation.grace_window_seconds = 0;

        let error = config
            .validate()
            .expect_err("zero grace window must fail validation");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("grace_window_seconds")
        ));
    }

    #[test]
    fn validate_rejects_tiny_quota() {
        let mut config = AppConfig::for_tests();
        config.local_store.quota_bytes = 100;

        let error = config.validate().expect_err("tiny quota must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("quota_bytes")
        ));
    }

    #[test]
    fn validate_rejects_zero_debounce() {
        let mut config = AppConfig::for_tests();
        config.local_store.flush_debounce_ms = 0;

        let error = config.validate().expect_err("zero debounce must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("flush_debounce_ms")
        ));
    }
}
