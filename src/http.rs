//! axum host adapter.
//!
//! Wires [`AuthorizationGate`] and [`LoginFlow`] into request handling:
//!
//! - [`protect`] guards browser pages: unauthenticated or expired users are
//!   redirected (302) to the IdP.
//! - [`protect_api`] guards machine endpoints: 401 when unauthenticated, 419
//!   when expired.
//! - `GET /oauthCallback` completes a login.
//!
//! Authorised requests carry an [`AuthenticatedUser`] extension.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::Error;
use crate::credential::User;
use crate::gate::{AuthorizationGate, EndpointKind, GateDecision};
use crate::login::{CallbackOutcome, CallbackParams, LoginFlow};

/// Shared application state
pub struct AppState {
    /// Credential verification
    pub gate: Arc<AuthorizationGate>,
    /// Issuer login flow
    pub login: Arc<LoginFlow>,
}

/// Identity of an authorised request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Create the issuer router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/auth/status",
            get(status_handler).route_layer(middleware::from_fn_with_state(Arc::clone(&state), protect)),
        )
        .route(
            "/auth/api-status",
            get(api_status_handler)
                .route_layer(middleware::from_fn_with_state(Arc::clone(&state), protect_api)),
        )
        .route("/oauthCallback", get(oauth_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Middleware for interactive endpoints
pub async fn protect(State(state): State<Arc<AppState>>, request: Request<Body>, next: Next) -> Response {
    guard(&state, request, next, EndpointKind::Interactive).await
}

/// Middleware for API endpoints
pub async fn protect_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    guard(&state, request, next, EndpointKind::Api).await
}

async fn guard(state: &AppState, mut request: Request<Body>, next: Next, kind: EndpointKind) -> Response {
    let cookies = cookie_header(request.headers());

    match state.gate.check(cookies.as_deref(), kind).await {
        Ok(GateDecision::Continue(user)) => {
            debug!(email = %user.email, path = %request.uri().path(), "Authorised request");
            request.extensions_mut().insert(AuthenticatedUser(user));
            next.run(request).await
        }
        Ok(GateDecision::Login { hint }) => {
            let original_url = request
                .uri()
                .path_and_query()
                .map_or("/", |pq| pq.as_str())
                .to_string();
            match state.login.initiate_login(&original_url, hint.as_deref()).await {
                Ok(redirect) => found(&redirect.location, redirect.cookies),
                Err(e) => error_response(&e),
            }
        }
        Ok(GateDecision::Reject { status, message }) => (status, message).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /oauthCallback
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Response {
    match state.login.handle_callback(&params, &jar).await {
        Ok(CallbackOutcome::Authenticated { location, cookies, .. }) => found(&location, cookies),
        Ok(CallbackOutcome::Rejected { .. }) => StatusCode::FORBIDDEN.into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /auth/status
async fn status_handler(Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>) -> &'static str {
    info!(email = %user.email, "User is successfully authenticated");
    "You are logged in."
}

/// GET /auth/api-status
async fn api_status_handler(Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>) -> Json<User> {
    Json(user)
}

/// All `Cookie` headers joined; HTTP/2 clients send one per cookie.
fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    (!values.is_empty()).then(|| values.join("; "))
}

fn found(location: &str, cookies: Vec<Cookie<'static>>) -> Response {
    let jar = cookies.into_iter().fold(CookieJar::new(), |jar, c| jar.add(c));
    (StatusCode::FOUND, jar, [(header::LOCATION, location.to_string())]).into_response()
}

fn error_response(err: &Error) -> Response {
    let status = err.status_code();
    let message = if status.is_server_error() {
        error!(error = %err, "Authentication request failed");
        "Authentication service unavailable".to_string()
    } else {
        debug!(error = %err, "Rejected authentication request");
        err.to_string()
    };
    (status, Json(json!({ "error": message }))).into_response()
}
