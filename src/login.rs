//! OAuth2/OIDC login flow: the issuer side of pan-domain auth.
//!
//! ```text
//! Unauthenticated --initiate_login--> CallbackPending --handle_callback--> Authenticated
//!                                                                     \--> Rejected
//! ```
//!
//! [`LoginFlow::initiate_login`] sets two short-lived cookies (the anti-forgery
//! token and the URL the user originally asked for) and redirects to the IdP.
//! [`LoginFlow::handle_callback`] checks the anti-forgery token before anything
//! else, exchanges the code, verifies the ID token, fetches the profile, merges
//! the previous session and mints a new credential.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt as _;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use url::Url;

use crate::audit::{self, AuditEvent};
use crate::config::IssuerConfig;
use crate::credential::{self, User};
use crate::oidc::{IdTokenClaims, OidcClient, UserInfo};
use crate::policy::ValidateUser;
use crate::settings::KeyStore;
use crate::{Error, Result};

/// Cookie holding the URL the user originally requested
pub const LOGIN_ORIGIN_COOKIE: &str = "panda-loginOriginUrl";

/// Cookie holding the anti-forgery token of the pending login
pub const ANTI_FORGERY_COOKIE: &str = "panda-antiForgeryToken";

/// Scopes requested from the IdP
pub const SCOPES: &str = "openid email profile";

/// Lifetime of the login cookies
const LOGIN_COOKIE_MAX_AGE: time::Duration = time::Duration::minutes(10);

/// Query parameters the IdP sends to the callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    #[serde(default)]
    pub code: Option<String>,
    /// Echo of the anti-forgery token
    #[serde(default)]
    pub state: Option<String>,
    /// Error code, when the IdP refused
    #[serde(default)]
    pub error: Option<String>,
    /// Error description
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Where to send the browser to log in, and the cookies to set first.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    /// Authorization request URL
    pub location: String,
    /// Anti-forgery and login-origin cookies
    pub cookies: Vec<Cookie<'static>>,
}

/// Result of a callback that got as far as the issuer's policy.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// A credential was minted
    Authenticated {
        /// The user written into the credential
        user: User,
        /// The originally requested URL
        location: String,
        /// Session cookie plus removals of the login cookies
        cookies: Vec<Cookie<'static>>,
    },
    /// The issuer's policy refused the user. No credential was minted.
    Rejected {
        /// The refused user
        user: User,
    },
}

/// Issuer login flow.
pub struct LoginFlow {
    keys: Arc<KeyStore>,
    oidc: Arc<OidcClient>,
    issuer: IssuerConfig,
    validate_user: ValidateUser,
}

impl LoginFlow {
    /// Create a login flow for the system described by `issuer`
    pub fn new(
        keys: Arc<KeyStore>,
        oidc: Arc<OidcClient>,
        issuer: IssuerConfig,
        validate_user: ValidateUser,
    ) -> Self {
        Self {
            keys,
            oidc,
            issuer,
            validate_user,
        }
    }

    /// System identifier this issuer logs users into
    #[must_use]
    pub fn system(&self) -> &str {
        &self.issuer.system
    }

    /// Start a login: fresh anti-forgery token, login cookies and the
    /// authorization request URL.
    ///
    /// `login_hint` is the email of a known (possibly expired) identity.
    pub async fn initiate_login(
        &self,
        original_url: &str,
        login_hint: Option<&str>,
    ) -> Result<LoginRedirect> {
        let settings = self.keys.settings().await?;
        let document = self.oidc.discovery().await?;
        let token = generate_anti_forgery_token();

        let mut location = Url::parse(&document.authorization_endpoint)
            .map_err(|e| Error::upstream("discovery", format!("invalid authorization_endpoint: {e}")))?;
        {
            let mut params = location.query_pairs_mut();
            params.append_pair("client_id", &settings.client_id);
            params.append_pair("response_type", "code");
            params.append_pair("scope", SCOPES);
            params.append_pair("redirect_uri", &self.issuer.redirect_url);
            params.append_pair("state", &token);
            if let Some(hint) = login_hint {
                params.append_pair("login_hint", hint);
            }
            if let Some(domain) = &settings.organization_domain {
                params.append_pair("hd", domain);
            }
        }

        audit::emit(&AuditEvent::initiated(&self.issuer.system, login_hint));
        Ok(LoginRedirect {
            location: location.into(),
            cookies: vec![
                login_cookie(LOGIN_ORIGIN_COOKIE, local_path(original_url)),
                login_cookie(ANTI_FORGERY_COOKIE, token),
            ],
        })
    }

    /// Complete a login from the IdP redirect.
    ///
    /// The anti-forgery check runs first; on mismatch no upstream call is made.
    /// A previous credential in `cookies`, even expired, contributes its
    /// `authenticatedIn` set and multi-factor flag to the new one.
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
        cookies: &CookieJar,
    ) -> Result<CallbackOutcome> {
        match self.complete_callback(params, cookies).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                audit::emit(&AuditEvent::failed(&self.issuer.system, e.to_string()));
                Err(e)
            }
        }
    }

    async fn complete_callback(
        &self,
        params: &CallbackParams,
        cookies: &CookieJar,
    ) -> Result<CallbackOutcome> {
        check_anti_forgery(
            cookies.get(ANTI_FORGERY_COOKIE).map(Cookie::value),
            params.state.as_deref(),
        )?;

        if let Some(error) = &params.error {
            let description = params.error_description.as_deref().unwrap_or("");
            return Err(Error::InvalidRequest(format!(
                "identity provider returned '{error}' {description}"
            )));
        }
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidRequest("missing authorization code".to_string()))?;

        let settings = self.keys.settings().await?;
        let tokens = self
            .oidc
            .exchange_code(
                code,
                &self.issuer.redirect_url,
                &settings.client_id,
                &settings.client_secret,
            )
            .await?;
        let claims = self
            .oidc
            .verify_id_token(&tokens.id_token, &settings.client_id)
            .await?;
        let info = self.oidc.user_info(&tokens.access_token).await?;
        let user = user_from_identity(&claims, info, &self.issuer.system)?;

        let previous = cookies.get(&settings.cookie_name).and_then(|c| {
            credential::verify(
                Some(c.value()),
                &settings.public_key,
                credential::now_millis(),
                |_| true,
            )
            .into_user()
        });
        let merged = merge_session(user, previous.as_ref(), &self.issuer.system);

        // 2FA group membership is not checked yet.
        let user = User {
            multifactor: true,
            ..merged
        };

        if !(self.validate_user)(&user) {
            info!(email = %user.email, system = %self.issuer.system, "User refused by issuer policy");
            audit::emit(&AuditEvent::rejected(&self.issuer.system, &user));
            return Ok(CallbackOutcome::Rejected { user });
        }

        let credential = credential::build(&user, &settings.private_key)?;
        let location = cookies
            .get(LOGIN_ORIGIN_COOKIE)
            .map_or_else(|| "/".to_string(), |c| local_path(c.value()));

        audit::emit(&AuditEvent::succeeded(&self.issuer.system, &user));
        Ok(CallbackOutcome::Authenticated {
            user,
            location,
            cookies: vec![
                self.session_cookie(settings.cookie_name.clone(), credential),
                removal_cookie(LOGIN_ORIGIN_COOKIE),
                removal_cookie(ANTI_FORGERY_COOKIE),
            ],
        })
    }

    fn session_cookie(&self, name: String, credential: String) -> Cookie<'static> {
        Cookie::build((name, credential))
            .domain(self.issuer.cookie_domain.clone())
            .path("/")
            .secure(true)
            .http_only(true)
            .build()
    }
}

/// Build the user a fresh login describes, before any merge.
pub fn user_from_identity(claims: &IdTokenClaims, info: UserInfo, system: &str) -> Result<User> {
    let email = claims
        .email
        .clone()
        .filter(|e| !e.is_empty())
        .or(info.email)
        .filter(|e| !e.is_empty())
        .ok_or(Error::IncompleteProfile("email"))?;

    Ok(User {
        first_name: info
            .given_name
            .filter(|n| !n.is_empty())
            .ok_or(Error::IncompleteProfile("given_name"))?,
        last_name: info
            .family_name
            .filter(|n| !n.is_empty())
            .ok_or(Error::IncompleteProfile("family_name"))?,
        email,
        avatar_url: info.picture.filter(|p| !p.is_empty()),
        authenticating_system: system.to_string(),
        authenticated_in: vec![system.to_string()],
        expires: claims.exp.saturating_mul(1000),
        multifactor: false,
    })
}

/// Carry a previous session forward into a fresh login.
///
/// `authenticatedIn` becomes the previous set plus `system`; multi-factor never
/// regresses from `true`. Returns a new value; `previous` is untouched.
#[must_use]
pub fn merge_session(user: User, previous: Option<&User>, system: &str) -> User {
    let Some(previous) = previous else {
        return user;
    };

    let mut authenticated_in = previous.authenticated_in.clone();
    if !previous.is_authenticated_in(system) {
        authenticated_in.push(system.to_string());
    }
    debug!(systems = ?authenticated_in, "Merged previous session");

    User {
        authenticated_in,
        multifactor: user.multifactor || previous.multifactor,
        ..user
    }
}

/// `url` when it is a path on this site, else `/`. Rejects protocol-relative
/// `//host` forms, which browsers resolve to another origin.
fn local_path(url: &str) -> String {
    let local = url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\");
    if local {
        url.to_string()
    } else {
        "/".to_string()
    }
}

/// 30 random bytes, base64url without padding.
fn generate_anti_forgery_token() -> String {
    let bytes: [u8; 30] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn check_anti_forgery(expected: Option<&str>, state: Option<&str>) -> Result<()> {
    match (expected, state) {
        (Some(expected), Some(state))
            if !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(state.as_bytes())) =>
        {
            Ok(())
        }
        _ => Err(Error::AntiForgeryMismatch),
    }
}

fn login_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(SameSite::None)
        .max_age(LOGIN_COOKIE_MAX_AGE)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = login_cookie(name, String::new());
    cookie.make_removal();
    cookie
}
