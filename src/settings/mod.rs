//! Pan-domain settings and key stores.
//!
//! The settings blob lives in durable storage (an object-store URL or a local
//! file). [`KeyStore`] is the issuer's view of it: OAuth client settings, the
//! RSA key pair and the optional 2FA group config. [`PublicKeyStore`] is the
//! member application's view: the public key only.
//!
//! Both re-download the blob on a fixed interval through a
//! [`RefreshableCache`]. A blob that fails validation is rejected whole and the
//! previous snapshot keeps being served.

mod blob;
mod source;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tracing::debug;

pub use blob::SettingsBlob;
pub use source::{FileSettingsSource, HttpSettingsSource, SettingsSource};

use crate::credential::{PrivateKey, PublicKey};
use crate::refresh::RefreshableCache;
use crate::{Error, Result};

/// Section name of the 2FA group config in the blob
pub const GOOGLE_2FA_SECTION: &str = "google2FAGroupSettings";

/// Default refresh period of both stores
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

fn parse_failure(field: &str) -> Error {
    Error::SettingsValidation(format!("Failed to parse {field} from panda settings file!"))
}

fn required<'a>(blob: &'a SettingsBlob, field: &str) -> Result<&'a str> {
    blob.get(field).ok_or_else(|| parse_failure(field))
}

/// Group-membership config for two-factor checks.
///
/// Parsed and validated, but not consulted during login.
#[derive(Clone, PartialEq, Eq)]
pub struct Google2faGroupSettings {
    /// Service account used to query group membership
    pub google_service_account_id: String,
    /// Service account certificate
    pub google_service_account_cert: String,
    /// User the service account impersonates
    pub google_2fa_user: String,
    /// Group whose members are enrolled in 2FA
    pub multifactor_group_id: String,
}

impl Google2faGroupSettings {
    fn from_section(section: &HashMap<String, String>) -> Result<Self> {
        let field = |name: &str| {
            section
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| parse_failure(name))
        };
        Ok(Self {
            google_2fa_user: field("google2faUser")?,
            google_service_account_cert: field("googleServiceAccountCert")?,
            google_service_account_id: field("googleServiceAccountId")?,
            multifactor_group_id: field("multifactorGroupId")?,
        })
    }
}

impl fmt::Debug for Google2faGroupSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Google2faGroupSettings")
            .field("google_service_account_id", &self.google_service_account_id)
            .field("google_service_account_cert", &"<redacted>")
            .field("google_2fa_user", &self.google_2fa_user)
            .field("multifactor_group_id", &self.multifactor_group_id)
            .finish()
    }
}

/// One validated generation of the issuer's settings.
#[derive(Clone)]
pub struct Settings {
    /// Name of the session credential cookie
    pub cookie_name: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// OIDC discovery document URL
    pub discovery_document_url: String,
    /// Hosted-domain restriction passed as `hd`
    pub organization_domain: Option<String>,
    /// Credential verification key
    pub public_key: Arc<PublicKey>,
    /// Credential signing key
    pub private_key: Arc<PrivateKey>,
    /// Optional 2FA group config
    pub google_2fa: Option<Google2faGroupSettings>,
}

impl Settings {
    /// Parse and validate blob text. Any missing field rejects the whole blob.
    pub fn from_blob(text: &str) -> Result<Self> {
        let blob = SettingsBlob::parse(text);

        let cookie_name = required(&blob, "cookieName")?;
        let client_id = required(&blob, "clientId")?;
        let client_secret = required(&blob, "clientSecret")?;
        let discovery_document_url = required(&blob, "discoveryDocumentUrl")?;
        let public_key = required(&blob, "publicKey")?;
        let private_key = required(&blob, "privateKey")?;

        let public_key = PublicKey::from_setting(public_key)
            .map_err(|e| Error::SettingsValidation(format!("publicKey: {e}")))?;
        let private_key = PrivateKey::from_setting(private_key)
            .map_err(|e| Error::SettingsValidation(format!("privateKey: {e}")))?;

        let google_2fa = blob
            .section(GOOGLE_2FA_SECTION)
            .map(Google2faGroupSettings::from_section)
            .transpose()?;

        Ok(Self {
            cookie_name: cookie_name.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            discovery_document_url: discovery_document_url.to_string(),
            organization_domain: blob.get("organizationDomain").map(String::from),
            public_key: Arc::new(public_key),
            private_key: Arc::new(private_key),
            google_2fa,
        })
    }

    /// Non-secret view, for operators
    #[must_use]
    pub fn summary(&self) -> SettingsSummary {
        SettingsSummary {
            cookie_name: self.cookie_name.clone(),
            client_id: self.client_id.clone(),
            discovery_document_url: self.discovery_document_url.clone(),
            organization_domain: self.organization_domain.clone(),
            multifactor_group_id: self
                .google_2fa
                .as_ref()
                .map(|g| g.multifactor_group_id.clone()),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("cookie_name", &self.cookie_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("discovery_document_url", &self.discovery_document_url)
            .field("organization_domain", &self.organization_domain)
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key)
            .field("google_2fa", &self.google_2fa)
            .finish()
    }
}

/// Printable settings summary with secrets left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSummary {
    /// Session cookie name
    pub cookie_name: String,
    /// OAuth client id
    pub client_id: String,
    /// Discovery document URL
    pub discovery_document_url: String,
    /// Hosted-domain restriction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_domain: Option<String>,
    /// 2FA group, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multifactor_group_id: Option<String>,
}

/// What a verifier needs for one request.
#[derive(Debug, Clone)]
pub struct VerificationKey {
    /// Cookie carrying the credential
    pub cookie_name: String,
    /// Key to check the signature with
    pub public_key: Arc<PublicKey>,
}

/// Source of the current verification key.
#[async_trait]
pub trait VerifierKeys: Send + Sync + 'static {
    /// Current key, fetching on first use
    async fn verification_key(&self) -> Result<VerificationKey>;
}

/// Issuer-side settings store.
pub struct KeyStore {
    cache: RefreshableCache<Settings>,
}

impl KeyStore {
    /// Create a store refreshing from `source` every `interval`
    pub fn new(source: Arc<dyn SettingsSource>, interval: Duration) -> Self {
        let store = Self::stopped(source, interval);
        store.cache.start();
        store
    }

    /// Create a store without the background timer
    pub fn stopped(source: Arc<dyn SettingsSource>, interval: Duration) -> Self {
        let name = format!("settings:{}", source.describe());
        Self {
            cache: RefreshableCache::stopped(name, interval, move || {
                let source = Arc::clone(&source);
                async move {
                    let text = source.fetch().await?;
                    let settings = Settings::from_blob(&text)?;
                    debug!(cookie = %settings.cookie_name, "Validated settings blob");
                    Ok(settings)
                }
                .boxed()
            }),
        }
    }

    /// Current settings snapshot
    pub async fn settings(&self) -> Result<Arc<Settings>> {
        self.cache.get().await
    }

    /// Re-download now
    pub async fn refresh(&self) -> Result<Arc<Settings>> {
        self.cache.refresh().await
    }

    /// Stop background refresh, keeping the current snapshot
    pub fn stop(&self) {
        self.cache.stop();
    }

    /// Underlying cache
    #[must_use]
    pub fn cache(&self) -> &RefreshableCache<Settings> {
        &self.cache
    }
}

#[async_trait]
impl VerifierKeys for KeyStore {
    async fn verification_key(&self) -> Result<VerificationKey> {
        let settings = self.settings().await?;
        Ok(VerificationKey {
            cookie_name: settings.cookie_name.clone(),
            public_key: Arc::clone(&settings.public_key),
        })
    }
}

/// Verifier-side store holding only the public key.
pub struct PublicKeyStore {
    cookie_name: String,
    cache: RefreshableCache<PublicKey>,
}

impl PublicKeyStore {
    /// Create a store reading `publicKey` from `source` every `interval`
    pub fn new(
        cookie_name: impl Into<String>,
        source: Arc<dyn SettingsSource>,
        interval: Duration,
    ) -> Self {
        let store = Self::stopped(cookie_name, source, interval);
        store.cache.start();
        store
    }

    /// Create a store without the background timer
    pub fn stopped(
        cookie_name: impl Into<String>,
        source: Arc<dyn SettingsSource>,
        interval: Duration,
    ) -> Self {
        let name = format!("public-key:{}", source.describe());
        Self {
            cookie_name: cookie_name.into(),
            cache: RefreshableCache::stopped(name, interval, move || {
                let source = Arc::clone(&source);
                async move {
                    let text = source.fetch().await?;
                    public_key_from_blob(&text)
                }
                .boxed()
            }),
        }
    }

    /// Current public key
    pub async fn public_key(&self) -> Result<Arc<PublicKey>> {
        self.cache.get().await
    }

    /// Stop background refresh
    pub fn stop(&self) {
        self.cache.stop();
    }
}

#[async_trait]
impl VerifierKeys for PublicKeyStore {
    async fn verification_key(&self) -> Result<VerificationKey> {
        Ok(VerificationKey {
            cookie_name: self.cookie_name.clone(),
            public_key: self.public_key().await?,
        })
    }
}

fn public_key_from_blob(text: &str) -> Result<PublicKey> {
    let blob = SettingsBlob::parse(text);
    let value = blob.get("publicKey").ok_or_else(|| {
        Error::SettingsValidation("Missing publicKey setting from config".to_string())
    })?;
    PublicKey::from_setting(value).map_err(|e| Error::SettingsValidation(format!("publicKey: {e}")))
}
