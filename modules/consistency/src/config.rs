use std::env;
use std::time::Duration;

pub const DEFAULT_FALLBACK_CODE: &str = "UNCATEGORIZED";

/// Tuning and remediation settings for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Rows per adapter page
    pub page_size: usize,
    /// Worker count K for concurrent checks
    pub max_concurrent_checks: usize,
    /// Per-check timeout; `None` disables it
    pub check_timeout: Option<Duration>,
    pub fallback_account_type_code: String,
    pub fallback_category_code: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 500,
            max_concurrent_checks: 4,
            check_timeout: Some(Duration::from_secs(60)),
            fallback_account_type_code: DEFAULT_FALLBACK_CODE.to_string(),
            fallback_category_code: DEFAULT_FALLBACK_CODE.to_string(),
        }
    }
}

/// Connection pool bounds for the accounting database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    /// A saturated pool fails after this long; the check then reports a
    /// data access failure instead of hanging
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub pool: PoolSettings,
    pub max_concurrent_checks: usize,
    pub page_size: usize,
    pub check_timeout_secs: u64,
    pub fallback_account_type_code: String,
    pub fallback_category_code: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let database_url =
            var("DATABASE_URL").ok_or_else(|| "DATABASE_URL must be set".to_string())?;

        let max_connections: u32 = var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a positive integer".to_string())?;
        if max_connections == 0 {
            return Err("DB_MAX_CONNECTIONS must be at least 1".to_string());
        }

        let min_connections: u32 = var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid u32".to_string())?;
        if min_connections > max_connections {
            return Err("DB_MIN_CONNECTIONS must not exceed DB_MAX_CONNECTIONS".to_string());
        }

        let acquire_timeout_secs: u64 = var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|| "3".to_string())
            .parse()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid u64".to_string())?;

        let max_concurrent_checks: usize = var("CONSISTENCY_MAX_CONCURRENT_CHECKS")
            .unwrap_or_else(|| "4".to_string())
            .parse()
            .map_err(|_| "CONSISTENCY_MAX_CONCURRENT_CHECKS must be a positive integer".to_string())?;
        if max_concurrent_checks == 0 {
            return Err("CONSISTENCY_MAX_CONCURRENT_CHECKS must be at least 1".to_string());
        }

        let page_size: usize = var("CONSISTENCY_PAGE_SIZE")
            .unwrap_or_else(|| "500".to_string())
            .parse()
            .map_err(|_| "CONSISTENCY_PAGE_SIZE must be a positive integer".to_string())?;
        if page_size == 0 {
            return Err("CONSISTENCY_PAGE_SIZE must be at least 1".to_string());
        }

        let check_timeout_secs: u64 = var("CONSISTENCY_CHECK_TIMEOUT_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .map_err(|_| "CONSISTENCY_CHECK_TIMEOUT_SECS must be a valid u64".to_string())?;

        let fallback_account_type_code = var("CONSISTENCY_FALLBACK_ACCOUNT_TYPE_CODE")
            .unwrap_or_else(|| DEFAULT_FALLBACK_CODE.to_string());

        let fallback_category_code = var("CONSISTENCY_FALLBACK_CATEGORY_CODE")
            .unwrap_or_else(|| DEFAULT_FALLBACK_CODE.to_string());

        Ok(Config {
            database_url,
            pool: PoolSettings {
                max_connections,
                min_connections,
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            },
            max_concurrent_checks,
            page_size,
            check_timeout_secs,
            fallback_account_type_code,
            fallback_category_code,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            page_size: self.page_size,
            max_concurrent_checks: self.max_concurrent_checks,
            check_timeout: (self.check_timeout_secs > 0)
                .then(|| Duration::from_secs(self.check_timeout_secs)),
            fallback_account_type_code: self.fallback_account_type_code.clone(),
            fallback_category_code: self.fallback_category_code.clone(),
        }
    }
}
