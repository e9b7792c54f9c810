//! ORM configuration
//!
//! Connection settings plus the column conventions new model definitions
//! start from. Values load from the environment with defaults.

use std::env;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ModelError, OrmResult};

/// Environment the application runs in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ModelError::Configuration(format!(
                "invalid environment '{}', expected development, testing, or production",
                s
            ))),
        }
    }
}

/// Configuration for the database handle and model defaults
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    pub database_url: Option<String>,
    pub environment: Environment,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub primary_key: String,
    pub soft_delete_column: String,
    pub created_at_column: String,
    pub updated_at_column: String,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            environment: Environment::Development,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            primary_key: "id".to_string(),
            soft_delete_column: "deleted_at".to_string(),
            created_at_column: "created_at".to_string(),
            updated_at_column: "updated_at".to_string(),
        }
    }
}

impl OrmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> OrmResult<Self> {
        let defaults = Self::default();

        let environment = get_env_or_default("APP_ENV", "development").parse()?;
        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", defaults.max_connections)?;
        let min_connections = parse_env("DATABASE_MIN_CONNECTIONS", defaults.min_connections)?;
        let acquire_timeout = parse_env("DATABASE_ACQUIRE_TIMEOUT", defaults.acquire_timeout)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            environment,
            max_connections,
            min_connections,
            acquire_timeout,
            ..defaults
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> OrmResult<()> {
        if self.max_connections == 0 {
            return Err(ModelError::Configuration(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ModelError::Configuration(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }

        for (field, value) in [
            ("primary_key", &self.primary_key),
            ("soft_delete_column", &self.soft_delete_column),
            ("created_at_column", &self.created_at_column),
            ("updated_at_column", &self.updated_at_column),
        ] {
            if value.is_empty() {
                return Err(ModelError::Configuration(format!("{} cannot be empty", field)));
            }
        }

        if let Some(ref database_url) = self.database_url {
            let parsed = url::Url::parse(database_url)
                .map_err(|e| ModelError::Configuration(format!("Invalid database URL: {}", e)))?;
            if !matches!(parsed.scheme(), "postgres" | "postgresql") {
                return Err(ModelError::Configuration(format!(
                    "Unsupported database URL scheme '{}'",
                    parsed.scheme()
                )));
            }
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// The configured database URL or a configuration error
    pub fn require_database_url(&self) -> OrmResult<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ModelError::Configuration("DATABASE_URL is not set".to_string()))
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> OrmResult<T> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| {
            ModelError::Configuration(format!("{} must be a number, got '{}'", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.soft_delete_column, "deleted_at");
        assert!(!config.is_production());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = OrmConfig {
            database_url: Some("mysql://localhost/app".to_string()),
            ..OrmConfig::default()
        };
        assert!(matches!(config.validate(), Err(ModelError::Configuration(_))));

        let config = OrmConfig {
            database_url: Some("postgres://localhost/app".to_string()),
            ..OrmConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_pool_bounds() {
        let config = OrmConfig {
            min_connections: 20,
            ..OrmConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_reads_overrides() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/app_test");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "4");
        std::env::set_var("APP_ENV", "production");

        let config = OrmConfig::from_env().unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app_test"));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, OrmConfig::default().min_connections);
        assert!(config.is_production());
        assert!(config.validate().is_ok());

        std::env::set_var("DATABASE_MAX_CONNECTIONS", "many");
        assert!(matches!(OrmConfig::from_env(), Err(ModelError::Configuration(_))));

        for key in ["DATABASE_URL", "DATABASE_MAX_CONNECTIONS", "APP_ENV"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Testing".parse::<Environment>().unwrap(), Environment::Testing);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: OrmConfig =
            serde_json::from_str(r#"{"environment": "production", "soft_delete_column": "removed_at"}"#).unwrap();
        assert!(config.is_production());
        assert_eq!(config.soft_delete_column, "removed_at");
        assert_eq!(config.max_connections, 10);
    }
}
