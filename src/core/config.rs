use std::env;
use std::time::Duration;
use url::Url;

use crate::errors::EtcdError;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4001";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoints: Vec<String>,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoints: vec![endpoint.to_string()],
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            username: None,
            password: None,
        }
    }

    pub fn from_env() -> Result<Self, EtcdError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup; unset variables fall
    /// back to defaults, malformed ones are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EtcdError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoints = lookup("ETCD_ENDPOINTS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_ENDPOINT.to_string()]);

        let request_timeout = Duration::from_secs(parse_var(
            &lookup,
            "ETCD_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        let max_retries = parse_var(&lookup, "ETCD_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let retry_base_ms = parse_var(&lookup, "ETCD_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)?;

        let config = Self {
            endpoints,
            request_timeout,
            max_retries,
            retry_base_ms,
            username: lookup("ETCD_USERNAME").filter(|s| !s.is_empty()),
            password: lookup("ETCD_PASSWORD"),
        };
        config.parsed_endpoints()?;
        Ok(config)
    }

    /// Validates and parses every endpoint; only absolute http(s) URLs are accepted.
    pub fn parsed_endpoints(&self) -> Result<Vec<Url>, EtcdError> {
        if self.endpoints.is_empty() {
            return Err(EtcdError::ConfigError(
                "at least one endpoint is required".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(EtcdError::ConfigError(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        self.endpoints
            .iter()
            .map(|raw| {
                let url = Url::parse(raw)?;
                if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
                    Ok(url)
                } else {
                    Err(EtcdError::ConfigError(format!(
                        "endpoint must be an http(s) URL with a host: {raw}"
                    )))
                }
            })
            .collect()
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, EtcdError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| EtcdError::ConfigError(format!("{name}: {e}"))),
        None => Ok(default),
    }
}
