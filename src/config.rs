//! Configuration management

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::oidc::DEFAULT_METADATA_TTL;
use crate::settings::{
    DEFAULT_REFRESH_INTERVAL, FileSettingsSource, HttpSettingsSource, SettingsSource,
};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Issuer listener
    pub server: ServerConfig,
    /// Settings blob location
    pub settings: SettingsConfig,
    /// Issuer identity
    pub issuer: IssuerConfig,
    /// Outbound HTTP
    pub http: HttpConfig,
    /// Acceptance policy
    pub policy: PolicyConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // PANDA_ISSUER__SYSTEM=workflow etc.
        figment = figment.merge(Env::prefixed("PANDA_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    /// Check the fields the issuer binary cannot run without
    pub fn validate_issuer(&self) -> Result<()> {
        let missing = [
            ("issuer.system", &self.issuer.system),
            ("issuer.cookie_domain", &self.issuer.cookie_domain),
            ("issuer.redirect_url", &self.issuer.redirect_url),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("Missing {}", missing.join(", "))))
        }
    }
}

/// Issuer listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7734,
        }
    }
}

/// Where the settings blob is read from. Exactly one of `url` and `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// HTTPS URL of the blob
    pub url: Option<String>,
    /// Local file holding the blob
    pub path: Option<PathBuf>,
    /// Re-download period
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl SettingsConfig {
    /// Build the configured source
    pub fn source(&self, http: &reqwest::Client) -> Result<Arc<dyn SettingsSource>> {
        match (&self.url, &self.path) {
            (Some(url), None) => Ok(Arc::new(HttpSettingsSource::new(http.clone(), url.clone()))),
            (None, Some(path)) => Ok(Arc::new(FileSettingsSource::new(path.clone()))),
            (Some(_), Some(_)) => Err(Error::Config(
                "settings.url and settings.path are mutually exclusive".to_string(),
            )),
            (None, None) => Err(Error::Config(
                "One of settings.url or settings.path is required".to_string(),
            )),
        }
    }
}

/// Identity of this issuer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// System identifier written into credentials
    pub system: String,
    /// Domain the session cookie is scoped to (e.g. `.example.com`)
    pub cookie_domain: String,
    /// OAuth redirect URI registered with the IdP
    pub redirect_url: String,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bound on every outbound request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Refuse plain-HTTP upstreams
    pub https_only: bool,
    /// Lifetime of cached discovery documents and key sets
    #[serde(with = "humantime_serde")]
    pub metadata_ttl: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            https_only: true,
            metadata_ttl: DEFAULT_METADATA_TTL,
        }
    }
}

impl HttpConfig {
    /// Build the shared outbound client
    pub fn client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .https_only(self.https_only)
            .timeout(self.timeout)
            .build()?)
    }
}

/// Acceptance policy applied to every user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Accepted email domains; empty accepts all
    pub allowed_email_domains: Vec<String>,
    /// Require a multi-factor login
    pub require_multifactor: bool,
}

/// Human-readable durations: `"100ms"`, `"30s"`, `"5m"`, `"1h"`
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        let (digits, unit_secs) = if let Some(ms) = s.strip_suffix("ms") {
            let millis = ms.parse::<u64>().map_err(serde::de::Error::custom)?;
            return Ok(Duration::from_millis(millis));
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else {
            // Assume seconds
            (s, 1)
        };

        let count = digits.parse::<u64>().map_err(serde::de::Error::custom)?;
        count
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration '{s}' is out of range")))
    }
}
