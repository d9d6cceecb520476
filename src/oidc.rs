//! OIDC client for the issuer login flow.
//!
//! # Flow
//!
//! 1. The discovery document is fetched from the settings'
//!    `discoveryDocumentUrl` and cached (refreshed every `ttl`).
//! 2. The IdP key set is fetched from the document's `jwks_uri` and cached
//!    independently of the settings snapshot.
//! 3. ID tokens are verified against the cached key set, checking signature,
//!    expiry, `iss` against the document's `issuer` and `aud` against the
//!    OAuth client id. Clock leeway is 60 seconds.
//!
//! An unknown `kid` triggers a single key-set refresh before failing, so IdP
//! key rotation is picked up without waiting for the timer.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use jsonwebtoken::{
    Algorithm, DecodingKey, Header, Validation,
    jwk::{AlgorithmParameters, JwkSet},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::refresh::RefreshableCache;
use crate::settings::KeyStore;
use crate::{Error, Result};

/// Default lifetime of cached discovery documents and key sets
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(3600);

/// Clock skew tolerated on ID token `exp`
const LEEWAY_SECS: u64 = 60;

/// OIDC discovery document, the fields the login flow uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier expected in ID tokens
    pub issuer: String,
    /// Where users are sent to log in
    pub authorization_endpoint: String,
    /// Where authorization codes are exchanged
    pub token_endpoint: String,
    /// Profile endpoint
    pub userinfo_endpoint: String,
    /// IdP public key set
    pub jwks_uri: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for the user-info endpoint
    pub access_token: String,
    /// Signed ID token
    pub id_token: String,
    /// Token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Verified ID token claims.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject
    pub sub: String,
    /// Expiry, epoch seconds
    pub exp: i64,
    /// Email, when the `email` scope was granted
    #[serde(default)]
    pub email: Option<String>,
}

/// User-info endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    /// Email
    #[serde(default)]
    pub email: Option<String>,
    /// Given name
    #[serde(default)]
    pub given_name: Option<String>,
    /// Family name
    #[serde(default)]
    pub family_name: Option<String>,
    /// Profile picture URL
    #[serde(default)]
    pub picture: Option<String>,
}

/// Discovery, key set, token exchange and user-info for one IdP.
pub struct OidcClient {
    http: reqwest::Client,
    discovery: Arc<RefreshableCache<DiscoveryDocument>>,
    jwks: RefreshableCache<JwkSet>,
}

impl OidcClient {
    /// Create a client whose discovery URL comes from `keys`, starting the
    /// background refresh of both caches.
    pub fn new(http: reqwest::Client, keys: Arc<KeyStore>, ttl: Duration) -> Self {
        let client = Self::stopped(http, keys, ttl);
        client.discovery.start();
        client.jwks.start();
        client
    }

    /// Create a client without background refresh
    pub fn stopped(http: reqwest::Client, keys: Arc<KeyStore>, ttl: Duration) -> Self {
        let discovery = Arc::new(RefreshableCache::stopped("oidc-discovery", ttl, {
            let http = http.clone();
            move || {
                let http = http.clone();
                let keys = Arc::clone(&keys);
                async move {
                    let settings = keys.settings().await?;
                    debug!(url = %settings.discovery_document_url, "Fetching discovery document");
                    let response = http
                        .get(&settings.discovery_document_url)
                        .send()
                        .await
                        .map_err(|e| Error::upstream("discovery", e))?;
                    read_json::<DiscoveryDocument>("discovery", response).await
                }
                .boxed()
            }
        }));

        let jwks = RefreshableCache::stopped("oidc-jwks", ttl, {
            let http = http.clone();
            let discovery = Arc::clone(&discovery);
            move || {
                let http = http.clone();
                let discovery = Arc::clone(&discovery);
                async move {
                    let document = discovery.get().await?;
                    debug!(url = %document.jwks_uri, "Fetching JWKS");
                    let response = http
                        .get(&document.jwks_uri)
                        .send()
                        .await
                        .map_err(|e| Error::upstream("jwks", e))?;
                    read_json::<JwkSet>("jwks", response).await
                }
                .boxed()
            }
        });

        Self {
            http,
            discovery,
            jwks,
        }
    }

    /// Current discovery document
    pub async fn discovery(&self) -> Result<Arc<DiscoveryDocument>> {
        self.discovery.get().await
    }

    /// Stop both background timers
    pub fn stop(&self) {
        self.discovery.stop();
        self.jwks.stop();
    }

    /// Exchange an authorization code at the token endpoint.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse> {
        let document = self.discovery().await?;
        let params = [
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&document.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::upstream("token", e))?;
        read_json("token", response).await
    }

    /// Fetch the user's profile with an access token
    pub async fn user_info(&self, access_token: &str) -> Result<UserInfo> {
        let document = self.discovery().await?;
        let response = self
            .http
            .get(&document.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::upstream("userinfo", e))?;
        read_json("userinfo", response).await
    }

    /// Verify an ID token's signature, expiry, issuer and audience.
    pub async fn verify_id_token(&self, token: &str, client_id: &str) -> Result<IdTokenClaims> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| Error::InvalidIdentityToken(e.to_string()))?;
        let kid = header
            .kid
            .clone()
            .ok_or_else(|| Error::InvalidIdentityToken("missing 'kid' in header".to_string()))?;

        let document = self.discovery().await?;
        let key = self.find_decoding_key(&kid).await?;
        let validation = build_validation(&header, &document.issuer, client_id);

        let data = jsonwebtoken::decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| Error::InvalidIdentityToken(e.to_string()))?;
        Ok(data.claims)
    }

    /// Find a decoding key by `kid`, refreshing the key set once if absent.
    async fn find_decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        let jwks = self.jwks.get().await?;
        if let Some(key) = find_key_in_jwks(&jwks, kid) {
            return Ok(key);
        }

        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let jwks = self.jwks.refresh().await?;
        find_key_in_jwks(&jwks, kid)
            .ok_or_else(|| Error::InvalidIdentityToken(format!("unknown key id '{kid}'")))
    }
}

/// Check the status and decode a JSON body. Non-success keeps the body text.
async fn read_json<T: DeserializeOwned>(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Upstream {
            endpoint,
            status: Some(status.as_u16()),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| Error::upstream(endpoint, format!("invalid response: {e}")))
}

fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    let jwk = jwks
        .keys
        .iter()
        .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))?;

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
        AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y).ok(),
        AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
    }
}

fn build_validation(header: &Header, issuer: &str, client_id: &str) -> Validation {
    let alg = match header.alg {
        alg @ (Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::ES256
        | Algorithm::ES384) => alg,
        other => {
            warn!(alg = ?other, "Unsupported ID token algorithm, expecting RS256");
            Algorithm::RS256
        }
    };

    let mut v = Validation::new(alg);
    v.leeway = LEEWAY_SECS;
    v.set_issuer(&[issuer]);
    v.set_audience(&[client_id]);
    v
}
