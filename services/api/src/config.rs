//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub allowed_origin: String,
    pub google_books_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: Option<String>,
    pub recommendation_model: String,
    /// Six-field cron expression for the daily due-date reminder scan.
    pub reminder_schedule: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load API Keys (as optional) ---
        let google_books_api_key = std::env::var("GOOGLE_BOOKS_API_KEY").ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY").ok();

        // --- Load Email Settings (all optional: without them, notification
        // --- delivery degrades to a logged warning) ---
        let smtp_host = std::env::var("SMTP_HOST").ok();
        let smtp_username = std::env::var("SMTP_USERNAME").ok();
        let smtp_password = std::env::var("SMTP_PASSWORD").ok();
        let email_from = std::env::var("EMAIL_FROM").ok();

        // --- Load Adapter-specific Settings ---
        let recommendation_model = std::env::var("RECOMMENDATION_MODEL")
            .unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let reminder_schedule =
            std::env::var("REMINDER_SCHEDULE").unwrap_or_else(|_| "0 0 2 * * *".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            allowed_origin,
            google_books_api_key,
            openai_api_key,
            stripe_secret_key,
            smtp_host,
            smtp_username,
            smtp_password,
            email_from,
            recommendation_model,
            reminder_schedule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var mutation is process-global, so everything lives in one test.
    #[test]
    fn from_env_defaults_and_failures() {
        std::env::remove_var("DATABASE_URL");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingVar(var)) if var == "DATABASE_URL"
        ));

        std::env::set_var("DATABASE_URL", "postgres://localhost/library");
        std::env::remove_var("BIND_ADDRESS");
        std::env::remove_var("RUST_LOG");
        std::env::remove_var("RECOMMENDATION_MODEL");
        std::env::remove_var("REMINDER_SCHEDULE");
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address.port(), 3001);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.recommendation_model, "gpt-3.5-turbo");
        assert_eq!(config.reminder_schedule, "0 0 2 * * *");

        std::env::set_var("BIND_ADDRESS", "not-an-address");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(var, _)) if var == "BIND_ADDRESS"
        ));
        std::env::remove_var("BIND_ADDRESS");
    }
}
