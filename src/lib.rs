//! Pan-domain authentication
//!
//! Single sign-on across independently deployed applications sharing a parent
//! domain. An issuer runs the OAuth2/OIDC login against an identity provider
//! and mints a signed session credential; member applications verify that
//! credential locally with the shared public key, without contacting the
//! issuer per request.
//!
//! # Components
//!
//! - [`credential`]: credential wire format, signing and verification
//! - [`refresh`]: lazily-populated, periodically-refreshed cache
//! - [`settings`]: settings blob, [`KeyStore`](settings::KeyStore) and
//!   [`PublicKeyStore`](settings::PublicKeyStore)
//! - [`oidc`]: discovery document, key set, token exchange, user-info
//! - [`login`]: the issuer's login and callback flow
//! - [`gate`]: per-request authorization decisions
//! - [`http`]: axum middleware and routes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod gate;
pub mod http;
pub mod login;
pub mod oidc;
pub mod policy;
pub mod refresh;
pub mod settings;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
