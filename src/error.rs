//! Error types for pan-domain authentication

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for pan-domain authentication
pub type Result<T> = std::result::Result<T, Error>;

/// Pan-domain authentication errors
///
/// `Expired`, `NotAuthorised` and `NotAuthenticated` are not errors: they are
/// [`Disposition`](crate::credential::Disposition) variants returned by
/// credential verification.
#[derive(Error, Debug)]
pub enum Error {
    /// Credential is malformed, unsigned, tampered with or unparseable.
    /// Callers cannot tell these apart.
    #[error("Invalid credential")]
    InvalidCredential,

    /// The OAuth `state` parameter did not match the anti-forgery cookie
    #[error("Anti forgery token did not match")]
    AntiForgeryMismatch,

    /// An upstream endpoint (settings blob, discovery, token, JWKS, user-info)
    /// was unreachable or answered with a non-success status
    #[error("Upstream {endpoint} request failed{}: {body}", fmt_status(.status))]
    Upstream {
        /// Which endpoint failed
        endpoint: &'static str,
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// Response body or transport error message
        body: String,
    },

    /// ID token signature, issuer or audience check failed
    #[error("Invalid identity token: {0}")]
    InvalidIdentityToken(String),

    /// The user-info response lacks a field the credential requires
    #[error("Identity provider profile is missing '{0}'")]
    IncompleteProfile(&'static str),

    /// A required field is missing from a fetched settings blob
    #[error("Settings validation error: {0}")]
    SettingsValidation(String),

    /// Malformed callback request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key parsing or signing failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Build an [`Error::Upstream`] from a transport failure
    pub fn upstream(endpoint: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            endpoint,
            status: None,
            body: err.to_string(),
        }
    }

    /// HTTP status a host should answer with when this error aborts a request
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AntiForgeryMismatch | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredential | Self::InvalidIdentityToken(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream { .. } | Self::Http(_) | Self::IncompleteProfile(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::SettingsValidation(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Copy of this error for callers that shared one failed fetch.
    ///
    /// Transport errors that cannot be cloned keep their message and status.
    #[must_use]
    pub fn replicate(&self) -> Self {
        match self {
            Self::InvalidCredential => Self::InvalidCredential,
            Self::AntiForgeryMismatch => Self::AntiForgeryMismatch,
            Self::Upstream {
                endpoint,
                status,
                body,
            } => Self::Upstream {
                endpoint: *endpoint,
                status: *status,
                body: body.clone(),
            },
            Self::InvalidIdentityToken(m) => Self::InvalidIdentityToken(m.clone()),
            Self::IncompleteProfile(f) => Self::IncompleteProfile(*f),
            Self::SettingsValidation(m) => Self::SettingsValidation(m.clone()),
            Self::InvalidRequest(m) => Self::InvalidRequest(m.clone()),
            Self::Crypto(m) => Self::Crypto(m.clone()),
            Self::Config(m) => Self::Config(m.clone()),
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Json(e) => Self::Json(<serde_json::Error as serde::de::Error>::custom(e)),
            Self::Http(e) => Self::Upstream {
                endpoint: "http",
                status: e.status().map(|s| s.as_u16()),
                body: e.to_string(),
            },
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
