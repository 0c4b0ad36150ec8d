use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error body returned by the keys API, e.g.
/// `{"errorCode":100,"message":"Key not found","cause":"/foo","index":12}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(rename = "errorCode")]
    pub error_code: u64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub cause: Option<String>,
    /// Cluster index at the time the error was produced.
    #[serde(default)]
    pub index: u64,
}

impl ApiError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self.error_code)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.error_code)?;
        if let Some(cause) = self.cause.as_deref().filter(|c| !c.is_empty()) {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Known error codes of the v2 keys API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    KeyNotFound,
    TestFailed,
    NotFile,
    NotDir,
    NodeExist,
    RootReadOnly,
    DirNotEmpty,
    Unauthorized,
    PrevValueRequired,
    TtlNaN,
    IndexNaN,
    InvalidField,
    InvalidForm,
    RaftInternal,
    LeaderElect,
    WatcherCleared,
    EventIndexCleared,
    Other(u64),
}

impl From<u64> for ErrorCode {
    fn from(code: u64) -> Self {
        match code {
            100 => ErrorCode::KeyNotFound,
            101 => ErrorCode::TestFailed,
            102 => ErrorCode::NotFile,
            104 => ErrorCode::NotDir,
            105 => ErrorCode::NodeExist,
            107 => ErrorCode::RootReadOnly,
            108 => ErrorCode::DirNotEmpty,
            110 => ErrorCode::Unauthorized,
            200 => ErrorCode::PrevValueRequired,
            201 => ErrorCode::TtlNaN,
            202 => ErrorCode::IndexNaN,
            209 => ErrorCode::InvalidField,
            210 => ErrorCode::InvalidForm,
            300 => ErrorCode::RaftInternal,
            301 => ErrorCode::LeaderElect,
            400 => ErrorCode::WatcherCleared,
            401 => ErrorCode::EventIndexCleared,
            other => ErrorCode::Other(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum EtcdError {
    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),

    #[error("Failed to connect to etcd: {0}")]
    ConnectError(String),

    #[error("etcd rejected the request: {0}")]
    Api(ApiError),

    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Failed to decode etcd response: {0}")]
    DecodeError(String),

    #[error("Timed out after {0:?} waiting for etcd")]
    Timeout(Duration),

    #[error("Invalid client configuration: {0}")]
    ConfigError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to start async runtime: {0}")]
    RuntimeError(String),
}

impl EtcdError {
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            EtcdError::Api(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.api_error().map(ApiError::code)
    }

    #[must_use]
    pub fn is_key_not_found(&self) -> bool {
        self.error_code() == Some(ErrorCode::KeyNotFound)
    }

    /// Whether the request never reached a server.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(self, EtcdError::ConnectError(_))
    }

    /// Transient failures worth another attempt, possibly on another endpoint.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            EtcdError::HttpError(_) | EtcdError::ConnectError(_) => true,
            EtcdError::UnexpectedStatus { status, .. } => *status >= 500,
            EtcdError::Api(err) => matches!(
                err.code(),
                ErrorCode::RaftInternal | ErrorCode::LeaderElect
            ),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EtcdError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() {
            EtcdError::ConnectError(error.to_string())
        } else {
            EtcdError::HttpError(error.to_string())
        }
    }
}

impl From<serde_json::Error> for EtcdError {
    fn from(error: serde_json::Error) -> Self {
        EtcdError::DecodeError(error.to_string())
    }
}

impl From<url::ParseError> for EtcdError {
    fn from(error: url::ParseError) -> Self {
        EtcdError::ConfigError(format!("invalid endpoint URL: {error}"))
    }
}

impl From<ApiError> for EtcdError {
    fn from(error: ApiError) -> Self {
        EtcdError::Api(error)
    }
}
