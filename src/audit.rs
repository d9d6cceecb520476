//! Audit logging for login and credential lifecycle events.
//!
//! Every event is serialized to JSON and emitted through `tracing::info!` in a
//! single `audit` field, so log aggregators can filter on it.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `login.initiated` | A user is redirected to the identity provider |
//! | `login.succeeded` | A callback minted a new credential |
//! | `login.rejected` | The issuer's policy refused the authenticated user |
//! | `login.failed` | The callback aborted (anti-forgery, IdP or token errors) |
//! | `credential.refused` | A protected request was denied |

use serde::Serialize;

use crate::credential::User;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"login.succeeded"`)
    pub event: &'static str,
    /// System emitting the event
    pub system: String,
    /// User email, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Systems the session has passed through (for `login.succeeded`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated_in: Option<Vec<String>>,
    /// Credential expiry, epoch milliseconds (for `login.succeeded`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    /// Reason for denial or failure events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn new(event: &'static str, system: &str) -> Self {
        Self {
            event,
            system: system.to_string(),
            email: None,
            authenticated_in: None,
            expires: None,
            reason: None,
        }
    }

    /// `login.initiated`, with the login hint if one was sent
    #[must_use]
    pub fn initiated(system: &str, login_hint: Option<&str>) -> Self {
        Self {
            email: login_hint.map(String::from),
            ..Self::new("login.initiated", system)
        }
    }

    /// `login.succeeded`
    #[must_use]
    pub fn succeeded(system: &str, user: &User) -> Self {
        Self {
            email: Some(user.email.clone()),
            authenticated_in: Some(user.authenticated_in.clone()),
            expires: Some(user.expires),
            ..Self::new("login.succeeded", system)
        }
    }

    /// `login.rejected`
    #[must_use]
    pub fn rejected(system: &str, user: &User) -> Self {
        Self {
            email: Some(user.email.clone()),
            reason: Some("not authorised by issuer policy".to_string()),
            ..Self::new("login.rejected", system)
        }
    }

    /// `login.failed`
    #[must_use]
    pub fn failed(system: &str, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new("login.failed", system)
        }
    }

    /// `credential.refused`, carrying the disposition label as reason
    #[must_use]
    pub fn refused(system: &str, user: Option<&User>, reason: &str) -> Self {
        Self {
            email: user.map(|u| u.email.clone()),
            reason: Some(reason.to_string()),
            ..Self::new("credential.refused", system)
        }
    }
}

/// Emit an audit event via `tracing::info!`.
///
/// ```text
/// INFO panda_auth::audit audit={"event":"login.succeeded","system":"workflow",...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "panda audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
