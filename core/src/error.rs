//! Error types for the API client.
//!
//! # Design
//! Failed exchanges are classified into a closed set of variants. Each
//! classified variant carries an explicit subkind where the API distinguishes
//! several causes under one status, so callers match on variants instead of
//! inspecting status codes or message text. Anything the classifier does not
//! recognize lands in `UnexpectedStatus` with the raw status and body intact.
//!
//! Decode failures of a successful exchange are a separate variant and never
//! overlap with status-based errors.

use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse};

/// Why the API rejected a request with 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BadRequestKind {
    Generic,
    PageOutOfRange,
}

/// Why the API refused to authorize a request (403).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationKind {
    Generic,
    InvalidAccessToken,
    MissingScopes,
    MembershipRequired,
    RestrictedToGuildLeaders,
}

/// The exchange a classified error was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    pub request: HttpRequest,
    pub response: HttpResponse,
    /// The `text` field of the error payload, when the body had one.
    pub text: Option<String>,
}

impl ErrorDetails {
    /// The error text if present, otherwise the raw body.
    pub fn message(&self) -> &str {
        self.text.as_deref().unwrap_or(&self.response.body)
    }
}

/// Errors returned by [`crate::Connection::execute`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request ({kind:?}): {}", .details.message())]
    BadRequest {
        kind: BadRequestKind,
        details: Box<ErrorDetails>,
    },

    #[error("authorization required ({kind:?}): {}", .details.message())]
    AuthorizationRequired {
        kind: AuthorizationKind,
        details: Box<ErrorDetails>,
    },

    #[error("not found: {}", .details.message())]
    NotFound { details: Box<ErrorDetails> },

    #[error("server error: {}", .details.message())]
    ServerError { details: Box<ErrorDetails> },

    #[error("service unavailable: {}", .details.message())]
    ServiceUnavailable { details: Box<ErrorDetails> },

    /// No classification rule matched.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: u16,
        body: String,
        details: Box<ErrorDetails>,
    },

    /// The exchange succeeded but the body did not match the expected type.
    #[error("failed to decode response body: {message}")]
    Decode { message: String, body: String },

    /// No response was received (connection, DNS, TLS, timeout).
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request was cancelled")]
    Cancelled,

    #[error(transparent)]
    InvalidRequest(#[from] RequestError),
}

impl ApiError {
    /// HTTP status of the failed exchange, for status-based variants.
    pub fn status(&self) -> Option<u16> {
        self.details().map(|details| details.response.status)
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            ApiError::BadRequest { details, .. }
            | ApiError::AuthorizationRequired { details, .. }
            | ApiError::NotFound { details }
            | ApiError::ServerError { details }
            | ApiError::ServiceUnavailable { details }
            | ApiError::UnexpectedStatus { details, .. } => Some(details),
            ApiError::Decode { .. }
            | ApiError::Transport(_)
            | ApiError::Cancelled
            | ApiError::InvalidRequest(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}

/// A `RequestOptions` descriptor that cannot be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("query parameter `{0}` given more than once")]
    DuplicateQueryParameter(String),

    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),
}

/// Errors raised while building a connection from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unsupported locale `{0}`")]
    UnsupportedLocale(String),

    #[error("invalid base URL `{0}`")]
    InvalidBaseUrl(String),

    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    #[error("failed to build HTTP transport: {0}")]
    Transport(String),
}
