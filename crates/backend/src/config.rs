use std::{env, str::FromStr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable `{0}`")]
    InvalidVar(&'static str),
}

/// Where rows live. `memory` keeps everything in-process and is meant for
/// local development and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidVar("BACKEND_STORAGE")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub database_url: Option<String>,
    pub listen_addr: String,
    pub storage: StorageBackend,
    pub max_connections: u32,
    pub cors_allowed_origins: Vec<String>,
    pub auth: AuthConfig,
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage = match env::var("BACKEND_STORAGE") {
            Ok(value) if !value.is_empty() => value.parse()?,
            _ => StorageBackend::default(),
        };

        let database_url = env::var("SERVER_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok();
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("SERVER_DATABASE_URL"));
        }

        let listen_addr =
            env::var("SERVER_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .ok()
                .filter(|count| *count > 0)
                .ok_or(ConfigError::InvalidVar("DATABASE_MAX_CONNECTIONS"))?,
            Err(_) => 10,
        };

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|value| parse_origins(&value))
            .unwrap_or_default();

        let auth = AuthConfig::from_env()?;

        tracing::info!(
            ?storage,
            listen_addr = %listen_addr,
            max_connections,
            cors_origins = cors_allowed_origins.len(),
            "backend config loaded"
        );

        Ok(Self {
            database_url,
            listen_addr,
            storage,
            max_connections,
            cors_allowed_origins,
            auth,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
}

impl AuthConfig {
    pub fn new(jwt_secret: SecretString) -> Result<Self, ConfigError> {
        validate_jwt_secret(jwt_secret.expose_secret())?;
        Ok(Self { jwt_secret })
    }

    fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("AUTH_JWT_SECRET")
            .map_err(|_| ConfigError::MissingVar("AUTH_JWT_SECRET"))?;
        Self::new(SecretString::new(jwt_secret.into()))
    }

    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_JWT_SECRET_BYTES {
        return Err(ConfigError::InvalidVar("AUTH_JWT_SECRET"));
    }
    Ok(())
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses_known_names() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!(" Postgres ".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert!(matches!(
            "sqlite".parse::<StorageBackend>(),
            Err(ConfigError::InvalidVar("BACKEND_STORAGE"))
        ));
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        assert!(AuthConfig::new(SecretString::new("too-short".into())).is_err());
        assert!(AuthConfig::new(SecretString::new("x".repeat(32).into())).is_ok());
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("https://app.example.com, http://localhost:5173,,"),
            vec!["https://app.example.com", "http://localhost:5173"]
        );
    }
}
