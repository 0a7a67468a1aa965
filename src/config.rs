//! Service configuration read from the environment
//!
//! Binaries call `dotenv::dotenv().ok()` before building a `ServiceConfig`;
//! the library itself never touches `.env` files.

use std::env;
use std::path::PathBuf;

/// Runtime configuration for the query service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// API key for the text-generation service.
    pub api_key: String,

    /// Base URL of the OpenAI-compatible completion endpoint.
    pub api_base_url: String,

    /// Model identifier sent with each generation request.
    pub model: String,

    /// Port the HTTP server listens on.
    pub listen_port: u16,

    /// Directory uploaded CSV files are stored in and resolved against.
    pub uploads_dir: PathBuf,

    /// Maximum generate-execute attempts per request.
    pub max_attempts: u8,

    /// Default row cap hinted to the generator.
    pub row_limit: usize,

    /// Credentials for the legacy single-database mode, used only when a
    /// request does not carry its own connection description.
    pub legacy_database: LegacyDatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct LegacyDatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            api_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            listen_port: parse_env("PORT", 8080),
            uploads_dir: PathBuf::from(
                env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),
            max_attempts: parse_env("QUERY_MAX_ATTEMPTS", 3),
            row_limit: parse_env("QUERY_ROW_LIMIT", crate::prompt::DEFAULT_ROW_LIMIT),
            legacy_database: LegacyDatabaseConfig::from_env(),
        }
    }
}

impl LegacyDatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("DATABASE_HOST").unwrap_or_else(|_| "mysql".to_string()),
            port: parse_env("DATABASE_PORT", 3306),
            user: env::var("DATABASE_USER").unwrap_or_else(|_| "user".to_string()),
            password: env::var("DATABASE_PASSWORD").unwrap_or_else(|_| "password".to_string()),
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "ecommerce".to_string()),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Only assert keys that are never set in CI.
        let config = ServiceConfig::from_env();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.row_limit, 100);
    }
}
