use crate::domain::error::{AppError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "evalboard.toml";
pub const ENV_PREFIX: &str = "EVALBOARD_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then `evalboard.toml`, then `EVALBOARD_*` variables (`__` separates sections).
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(AppError::ConfigError(
                "database.url is required (EVALBOARD_DATABASE__URL)".to_string(),
            ));
        }
        if self.auth.url.trim().is_empty() {
            return Err(AppError::ConfigError(
                "auth.url is required (EVALBOARD_AUTH__URL)".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = base().merge(Toml::string(
            r#"
            log_filter = "debug"

            [server]
            port = 8080

            [database]
            url = "postgres://localhost/evals"

            [auth]
            url = "https://auth.example.com"
            anon_key = "anon"
            "#,
        ));
        let config = AppConfig::from_figment(figment).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.url, "postgres://localhost/evals");
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_missing_database_url_is_rejected() {
        let figment = base().merge(Toml::string(
            r#"
            [auth]
            url = "https://auth.example.com"
            "#,
        ));
        assert!(matches!(
            AppConfig::from_figment(figment),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_auth_url_is_rejected() {
        let figment = base().merge(Toml::string(
            r#"
            [database]
            url = "postgres://localhost/evals"
            "#,
        ));
        assert!(matches!(
            AppConfig::from_figment(figment),
            Err(AppError::ConfigError(_))
        ));
    }
}
