use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub indexer_url: String,
    /// Rows per GraphQL page (`first`).
    pub page_size: usize,
    pub max_concurrent_fetches: usize,
    /// Caller-level timeout for one whole domain fetch.
    pub fetch_timeout: Duration,
    /// Upper bound on transport retries for one page.
    pub retry_max_elapsed: Duration,
    /// Decimals of the payment token, for display values only.
    pub token_decimals: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const MAX_PAGE_SIZE: usize = 1000;
const MAX_TOKEN_DECIMALS: u32 = 28;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;

        let indexer_url = env_map
            .get("INDEXER_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("INDEXER_URL".to_string()))?;

        let page_size = parse_or(&env_map, "PAGE_SIZE", MAX_PAGE_SIZE, "must be a valid usize")?;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue(
                "PAGE_SIZE".to_string(),
                format!("must be between 1 and {}, got {}", MAX_PAGE_SIZE, page_size),
            ));
        }

        let max_concurrent_fetches =
            parse_or(&env_map, "MAX_CONCURRENT_FETCHES", 4usize, "must be a valid usize")?;
        if max_concurrent_fetches == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENT_FETCHES".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let fetch_timeout_ms =
            parse_or(&env_map, "FETCH_TIMEOUT_MS", 15_000u64, "must be a valid u64")?;
        let retry_max_elapsed_ms =
            parse_or(&env_map, "RETRY_MAX_ELAPSED_MS", 30_000u64, "must be a valid u64")?;

        let token_decimals = parse_or(&env_map, "TOKEN_DECIMALS", 6u32, "must be a valid u32")?;
        if token_decimals > MAX_TOKEN_DECIMALS {
            return Err(ConfigError::InvalidValue(
                "TOKEN_DECIMALS".to_string(),
                format!("must be at most {}, got {}", MAX_TOKEN_DECIMALS, token_decimals),
            ));
        }

        Ok(Config {
            port,
            indexer_url,
            page_size,
            max_concurrent_fetches,
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            retry_max_elapsed: Duration::from_millis(retry_max_elapsed_ms),
            token_decimals,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string())),
    }
}
