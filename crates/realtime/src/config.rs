use std::env;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Path of the backend's realtime WebSocket endpoint.
const REALTIME_PATH: &str = "/realtime";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable `{0}`")]
    InvalidVar(&'static str),
}

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub api_url: Url,
    pub realtime_url: Url,
    pub access_token: SecretString,
}

impl RealtimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("INBOX_API_URL").map_err(|_| ConfigError::MissingVar("INBOX_API_URL"))?;
        let api_url = Url::parse(&api_url).map_err(|_| ConfigError::InvalidVar("INBOX_API_URL"))?;

        let realtime_url = match env::var("INBOX_REALTIME_URL") {
            Ok(value) if !value.is_empty() => {
                Url::parse(&value).map_err(|_| ConfigError::InvalidVar("INBOX_REALTIME_URL"))?
            }
            _ => derive_realtime_url(&api_url).ok_or(ConfigError::InvalidVar("INBOX_API_URL"))?,
        };

        let access_token = env::var("INBOX_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingVar("INBOX_ACCESS_TOKEN"))?;

        Ok(Self {
            api_url,
            realtime_url,
            access_token: SecretString::new(access_token.into()),
        })
    }
}

/// `https://host/base` becomes `wss://host/realtime`.
pub fn derive_realtime_url(api_url: &Url) -> Option<Url> {
    let scheme = match api_url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return None,
    };
    let mut url = api_url.clone();
    url.set_scheme(scheme).ok()?;
    url.set_path(REALTIME_PATH);
    url.set_query(None);
    Some(url)
}
