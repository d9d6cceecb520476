//! Per-request authorization gate.
//!
//! The gate turns an incoming credential into a [`Disposition`] using the
//! current public key, then [`decide`] maps the disposition to what the host
//! must do. Only `Expired` and `NotAuthenticated` depend on the endpoint kind:
//!
//! | Disposition | Interactive | Api |
//! |---|---|---|
//! | `Authorised` | continue | continue |
//! | `Expired` | login (hinted) | 419 |
//! | `NotAuthenticated` / `InvalidCredential` | login | 401 |
//! | `NotAuthorised` | 403 | 403 |

use std::sync::Arc;

use axum::http::StatusCode;
use axum_extra::extract::cookie::Cookie;
use tracing::{debug, warn};

use crate::Result;
use crate::audit::{self, AuditEvent};
use crate::credential::{self, Disposition, User};
use crate::policy::ValidateUser;
use crate::settings::VerifierKeys;

/// Non-standard "Authentication Timeout" status for expired API sessions.
#[must_use]
pub fn authentication_timeout() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::UNAUTHORIZED)
}

/// How a protected endpoint is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Browser pages: unauthenticated users are sent to log in
    Interactive,
    /// Machine endpoints: unauthenticated callers get a status code
    Api,
}

/// What the host does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Serve the request as this user
    Continue(User),
    /// Start a login, hinting the IdP with a known email
    Login {
        /// Email of the expired identity, if any
        hint: Option<String>,
    },
    /// Refuse the request
    Reject {
        /// Response status
        status: StatusCode,
        /// Response body
        message: String,
    },
}

/// Map a disposition to a host decision.
#[must_use]
pub fn decide(disposition: Disposition, kind: EndpointKind, system: &str) -> GateDecision {
    match (disposition, kind) {
        (Disposition::Authorised(user), _) => GateDecision::Continue(user),
        (Disposition::Expired(user), EndpointKind::Interactive) => GateDecision::Login {
            hint: Some(user.email),
        },
        (Disposition::Expired(_), EndpointKind::Api) => GateDecision::Reject {
            status: authentication_timeout(),
            message: String::new(),
        },
        (Disposition::NotAuthenticated | Disposition::InvalidCredential, EndpointKind::Interactive) => {
            GateDecision::Login { hint: None }
        }
        (Disposition::NotAuthenticated | Disposition::InvalidCredential, EndpointKind::Api) => {
            GateDecision::Reject {
                status: StatusCode::UNAUTHORIZED,
                message: String::new(),
            }
        }
        (Disposition::NotAuthorised(user), _) => GateDecision::Reject {
            status: StatusCode::FORBIDDEN,
            message: format!("User {} is not authorised to use {system}", user.email),
        },
    }
}

/// Verifies credentials for one system.
pub struct AuthorizationGate {
    keys: Arc<dyn VerifierKeys>,
    system: String,
    validate_user: ValidateUser,
}

impl AuthorizationGate {
    /// Create a gate for `system`
    pub fn new(keys: Arc<dyn VerifierKeys>, system: impl Into<String>, validate_user: ValidateUser) -> Self {
        Self {
            keys,
            system: system.into(),
            validate_user,
        }
    }

    /// Protected system identifier
    #[must_use]
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Verify a raw credential.
    ///
    /// Errors only when no public key has ever been fetched.
    pub async fn verify(&self, raw: Option<&str>) -> Result<Disposition> {
        let key = self.keys.verification_key().await?;
        Ok(credential::verify(
            raw,
            &key.public_key,
            credential::now_millis(),
            |user| (self.validate_user)(user),
        ))
    }

    /// Verify the credential carried in a raw `Cookie` request header.
    pub async fn verify_cookie_header(&self, header: Option<&str>) -> Result<Disposition> {
        let key = self.keys.verification_key().await?;
        let raw = header.and_then(|h| credential_from_cookie_header(h, &key.cookie_name));
        Ok(credential::verify(
            raw.as_deref(),
            &key.public_key,
            credential::now_millis(),
            |user| (self.validate_user)(user),
        ))
    }

    /// Name of the credential cookie, per the current key
    pub async fn cookie_name(&self) -> Result<String> {
        Ok(self.keys.verification_key().await?.cookie_name)
    }

    /// Verify the request's cookies and decide, auditing refusals.
    pub async fn check(&self, cookie_header: Option<&str>, kind: EndpointKind) -> Result<GateDecision> {
        let disposition = self.verify_cookie_header(cookie_header).await?;
        debug!(system = %self.system, status = disposition.label(), "Verified credential");

        if !matches!(disposition, Disposition::Authorised(_)) {
            if disposition == Disposition::InvalidCredential {
                warn!(system = %self.system, "Refusing invalid credential");
            }
            audit::emit(&AuditEvent::refused(&self.system, disposition.user(), disposition.label()));
        }
        Ok(decide(disposition, kind, &self.system))
    }
}

/// Values are percent-decoded: issuers set the credential encoded, so its
/// base64 `+`, `/` and `=` come back as `%2B`, `%2F` and `%3D`.
fn credential_from_cookie_header(header: &str, name: &str) -> Option<String> {
    Cookie::split_parse_encoded(header)
        .filter_map(std::result::Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}
