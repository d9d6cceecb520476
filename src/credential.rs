//! Signed session credential codec.
//!
//! A credential is `base64(payload) + "." + base64(signature)`. The payload is a
//! fixed-order `key=value` list joined by `&`:
//!
//! ```text
//! firstName=Ada&lastName=Lovelace&email=ada@example.com[&avatarUrl=...]&system=composer&authedIn=composer,workflow&expires=1700000000000&multifactor=true
//! ```
//!
//! The signature is RSA PKCS#1 v1.5 over SHA-256 of the raw payload bytes.
//!
//! # Verification order
//!
//! [`verify`] checks the signature before reading any payload field, and checks
//! expiry before the caller's policy predicate. An expired credential is never
//! reported as [`Disposition::Authorised`], whatever the predicate says.

use std::fmt;

use base64::{
    Engine as _, alphabet,
    engine::{
        DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig,
        general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    },
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Standard alphabet, padding optional on decode.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An authenticated user as carried inside a credential.
///
/// Reconstructed fresh from every verified credential; merging produces a new
/// value rather than mutating an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Email address
    pub email: String,
    /// Profile picture URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// System that performed the login
    pub authenticating_system: String,
    /// Systems this browser session has passed through. Order is irrelevant.
    pub authenticated_in: Vec<String>,
    /// Expiry, epoch milliseconds
    pub expires: i64,
    /// Whether the login was multi-factor
    pub multifactor: bool,
}

impl User {
    /// Whether `system` is in [`authenticated_in`](Self::authenticated_in)
    #[must_use]
    pub fn is_authenticated_in(&self, system: &str) -> bool {
        self.authenticated_in.iter().any(|s| s == system)
    }

    /// Whether the user has expired at `now` (epoch milliseconds)
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires <= now
    }
}

/// Outcome of verifying a raw credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "user")]
pub enum Disposition {
    /// Valid, unexpired and accepted by the policy predicate
    Authorised(User),
    /// Valid signature but past its expiry
    Expired(User),
    /// Valid and unexpired, rejected by the policy predicate
    NotAuthorised(User),
    /// No credential was presented
    NotAuthenticated,
    /// Malformed, unsigned or tampered credential
    InvalidCredential,
}

impl Disposition {
    /// The user carried by the credential, when one could be trusted
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authorised(u) | Self::Expired(u) | Self::NotAuthorised(u) => Some(u),
            Self::NotAuthenticated | Self::InvalidCredential => None,
        }
    }

    /// Consume into the carried user
    #[must_use]
    pub fn into_user(self) -> Option<User> {
        match self {
            Self::Authorised(u) | Self::Expired(u) | Self::NotAuthorised(u) => Some(u),
            Self::NotAuthenticated | Self::InvalidCredential => None,
        }
    }

    /// Human-readable status label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authorised(_) => "Authorised",
            Self::Expired(_) => "Expired",
            Self::NotAuthorised(_) => "Not Authorised",
            Self::NotAuthenticated => "Not Authenticated",
            Self::InvalidCredential => "Invalid Credential",
        }
    }
}

/// PEM block type for [`base64_to_pem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemLabel {
    /// `PUBLIC KEY` (SubjectPublicKeyInfo)
    Public,
    /// `RSA PRIVATE KEY` (PKCS#1)
    RsaPrivate,
}

impl PemLabel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Public => "PUBLIC KEY",
            Self::RsaPrivate => "RSA PRIVATE KEY",
        }
    }
}

/// Wrap bare base64 key material as PEM, 64 columns per line.
#[must_use]
pub fn base64_to_pem(key: &str, label: PemLabel) -> String {
    let body: Vec<char> = key.chars().filter(|c| !c.is_whitespace()).collect();
    let mut lines = Vec::with_capacity(body.len() / 64 + 3);
    lines.push(format!("-----BEGIN {}-----", label.as_str()));
    lines.extend(body.chunks(64).map(|chunk| chunk.iter().collect::<String>()));
    lines.push(format!("-----END {}-----", label.as_str()));
    lines.join("\n")
}

fn to_pem(value: &str, label: PemLabel) -> String {
    if value.trim_start().starts_with("-----BEGIN") {
        value.to_string()
    } else {
        base64_to_pem(value, label)
    }
}

/// RSA public key used to verify credentials.
#[derive(Clone)]
pub struct PublicKey {
    pem: String,
    key: DecodingKey,
}

impl PublicKey {
    /// Parse a PEM-encoded RSA public key
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| Error::Crypto(format!("Invalid public key: {e}")))?;
        Ok(Self {
            pem: pem.to_string(),
            key,
        })
    }

    /// Parse a settings value: either PEM or bare base64 DER
    pub fn from_setting(value: &str) -> Result<Self> {
        Self::from_pem(&to_pem(value, PemLabel::Public))
    }

    /// PEM text of this key
    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("pem_len", &self.pem.len())
            .finish()
    }
}

/// RSA private key used by the issuer to sign credentials.
#[derive(Clone)]
pub struct PrivateKey {
    key: EncodingKey,
}

impl PrivateKey {
    /// Parse a PEM-encoded RSA private key (PKCS#1 or PKCS#8)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| Error::Crypto(format!("Invalid private key: {e}")))?;
        Ok(Self { key })
    }

    /// Parse a settings value: either PEM or bare base64 PKCS#1 DER
    pub fn from_setting(value: &str) -> Result<Self> {
        Self::from_pem(&to_pem(value, PemLabel::RsaPrivate))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A credential split into its decoded parts. The payload is not yet trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCredential {
    /// Decoded payload text
    pub payload: String,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
}

/// Serialize a user into the fixed-order payload.
#[must_use]
pub fn serialize(user: &User) -> String {
    let mut fields = vec![
        format!("firstName={}", user.first_name),
        format!("lastName={}", user.last_name),
        format!("email={}", user.email),
    ];
    if let Some(avatar) = user.avatar_url.as_deref().filter(|a| !a.is_empty()) {
        fields.push(format!("avatarUrl={avatar}"));
    }
    fields.push(format!("system={}", user.authenticating_system));
    fields.push(format!("authedIn={}", user.authenticated_in.join(",")));
    fields.push(format!("expires={}", user.expires));
    fields.push(format!("multifactor={}", user.multifactor));
    fields.join("&")
}

/// Payload fields in wire order. The first occurrence of a key wins.
struct PayloadFields<'a>(Vec<(&'a str, &'a str)>);

impl<'a> PayloadFields<'a> {
    fn parse(payload: &'a str) -> Self {
        Self(
            payload
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .collect(),
        )
    }

    fn get(&self, name: &str) -> Option<&'a str> {
        self.0
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<&'a str> {
        self.get(name).ok_or_else(|| {
            debug!(field = name, "Credential payload is missing a field");
            Error::InvalidCredential
        })
    }
}

/// Deserialize a payload produced by [`serialize`].
pub fn deserialize(payload: &str) -> Result<User> {
    let fields = PayloadFields::parse(payload);

    let expires = fields
        .required("expires")?
        .parse::<i64>()
        .map_err(|_| Error::InvalidCredential)?;

    let authenticated_in = fields
        .required("authedIn")?
        .split(',')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    Ok(User {
        first_name: fields.required("firstName")?.to_string(),
        last_name: fields.required("lastName")?.to_string(),
        email: fields.required("email")?.to_string(),
        avatar_url: fields.get("avatarUrl").map(String::from),
        authenticating_system: fields.required("system")?.to_string(),
        authenticated_in,
        expires,
        multifactor: fields.get("multifactor") == Some("true"),
    })
}

/// RSA/SHA-256 signature over the raw payload bytes.
pub fn sign(payload: &str, key: &PrivateKey) -> Result<Vec<u8>> {
    let encoded = jsonwebtoken::crypto::sign(payload.as_bytes(), &key.key, Algorithm::RS256)
        .map_err(|e| Error::Crypto(format!("Signing failed: {e}")))?;
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::Crypto(format!("Signing produced invalid output: {e}")))
}

/// Check an RSA/SHA-256 signature. Any cryptographic failure counts as invalid.
#[must_use]
pub fn verify_signature(payload: &str, signature: &[u8], key: &PublicKey) -> bool {
    let encoded = URL_SAFE_NO_PAD.encode(signature);
    match jsonwebtoken::crypto::verify(&encoded, payload.as_bytes(), &key.key, Algorithm::RS256) {
        Ok(valid) => valid,
        Err(e) => {
            debug!(error = %e, "Signature verification errored");
            false
        }
    }
}

/// Mint a signed credential for `user`.
pub fn build(user: &User, key: &PrivateKey) -> Result<String> {
    let payload = serialize(user);
    let signature = sign(&payload, key)?;
    Ok(format!(
        "{}.{}",
        STANDARD.encode(payload.as_bytes()),
        STANDARD.encode(signature)
    ))
}

/// Split a raw credential on its first `.` and decode both halves.
pub fn parse(raw: &str) -> Result<ParsedCredential> {
    let (payload, signature) = raw.split_once('.').ok_or(Error::InvalidCredential)?;
    let payload = LENIENT_BASE64
        .decode(payload)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(Error::InvalidCredential)?;
    let signature = LENIENT_BASE64
        .decode(signature)
        .map_err(|_| Error::InvalidCredential)?;
    Ok(ParsedCredential { payload, signature })
}

/// Verify a raw credential and classify it.
///
/// Pure and deterministic: `now` is epoch milliseconds supplied by the caller.
pub fn verify<F>(raw: Option<&str>, key: &PublicKey, now: i64, is_authorised: F) -> Disposition
where
    F: Fn(&User) -> bool,
{
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Disposition::NotAuthenticated;
    };
    let Ok(parsed) = parse(raw) else {
        return Disposition::InvalidCredential;
    };
    if !verify_signature(&parsed.payload, &parsed.signature, key) {
        return Disposition::InvalidCredential;
    }
    let Ok(user) = deserialize(&parsed.payload) else {
        return Disposition::InvalidCredential;
    };

    if user.is_expired_at(now) {
        Disposition::Expired(user)
    } else if !is_authorised(&user) {
        Disposition::NotAuthorised(user)
    } else {
        Disposition::Authorised(user)
    }
}

/// Current time in epoch milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
