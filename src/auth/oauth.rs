//! Sign-in flow
//!
//! Routes a browser through the provider handshake and manages the
//! session on either side of it.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Redirect,
    routing::{any, get},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use std::collections::HashMap;

use super::flash::Flash;
use super::provider::CallbackRequest;
use crate::AppState;
use crate::error::{AppError, AuthError};
use crate::metrics::record_sign_in;
use crate::service::SessionService;

/// Cookie remembering the CSRF state between initiation and callback
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const UNKNOWN_PROVIDER_LABEL: &str = "unknown";

pub const SIGNED_IN_NOTICE: &str = "Signed in!";
pub const SIGNED_OUT_NOTICE: &str = "Signed out!";
pub const AUTH_FAILED_ALERT: &str = "Authentication failed";

/// Create authentication router
///
/// Routes:
/// - /signin - Start signing in with the configured provider
/// - GET /auth/:provider - Redirect to the provider
/// - /auth/:provider/callback - Provider callback, signs the user in
/// - /signout - Sign out
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/signin", any(new_session))
        .route("/auth/:provider", get(begin_authorization))
        .route("/auth/:provider/callback", any(create_session))
        .route("/signout", any(destroy_session))
}

// =============================================================================
// Sign in
// =============================================================================

/// /signin
///
/// Always sends the browser to the configured provider's initiation
/// endpoint; request parameters are ignored.
async fn new_session(State(state): State<AppState>) -> Redirect {
    Redirect::to(&format!("/auth/{}", state.config.auth.signin_provider))
}

/// GET /auth/:provider
///
/// Redirects user to the provider authorization page.
///
/// # Steps
/// 1. Ask the authenticator for the authorization URL and CSRF state
/// 2. Store state in cookie
/// 3. Redirect to the provider
async fn begin_authorization(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let request = match state.authenticator.authorization_request(&provider) {
        Ok(request) => request,
        Err(AuthError::UnknownProvider(_)) => return Err(AppError::NotFound),
        Err(error) => return Ok(authentication_failed(&state, jar, &provider, &error)),
    };

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, request.state))
        .path("/auth")
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .build();

    tracing::debug!(%provider, "Redirecting to provider");

    Ok((jar.add(cookie), Redirect::to(&request.url)))
}

/// /auth/:provider/callback
///
/// # Steps
/// 1. Let the authenticator validate the callback into an auth payload
/// 2. Find or create the user for `(provider, uid)`
/// 3. Store the user id in the session
/// 4. Redirect to root with a notice
///
/// Handshake failures redirect to root with an alert and leave the
/// session untouched. Persistence failures are returned as errors.
async fn create_session(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_owned());
    let jar = jar.add(oauth_state_removal());

    let callback = CallbackRequest {
        provider: provider.clone(),
        params,
        expected_state,
    };

    let payload = match state.authenticator.complete_callback(callback).await {
        Ok(payload) => payload,
        Err(error) => return Ok(authentication_failed(&state, jar, &provider, &error)),
    };

    let label = provider_label(&state, &payload.provider);
    let mut session = state.sessions.load(&jar);
    let service = SessionService::new(state.users.clone());
    if let Err(error) = service.sign_in(&mut session, &payload).await {
        record_sign_in(label, "error");
        return Err(error);
    }
    record_sign_in(label, "success");

    let secure = state.config.should_use_secure_cookies();
    let jar = state
        .sessions
        .save(jar, &session)?
        .add(Flash::notice(SIGNED_IN_NOTICE).into_cookie(secure));

    Ok((jar, Redirect::to("/")))
}

// =============================================================================
// Sign out
// =============================================================================

/// /signout
///
/// Clears the whole session and redirects to root.
async fn destroy_session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let mut session = state.sessions.load(&jar);
    SessionService::new(state.users.clone()).sign_out(&mut session);

    let secure = state.config.should_use_secure_cookies();
    let jar = state
        .sessions
        .save(jar, &session)?
        .add(Flash::notice(SIGNED_OUT_NOTICE).into_cookie(secure));

    Ok((jar, Redirect::to("/")))
}

// =============================================================================
// Helpers
// =============================================================================

fn authentication_failed(
    state: &AppState,
    jar: CookieJar,
    provider: &str,
    error: &AuthError,
) -> (CookieJar, Redirect) {
    tracing::warn!(%provider, kind = error.kind(), %error, "Authentication failed");
    record_sign_in(provider_label(state, provider), "failure");

    let secure = state.config.should_use_secure_cookies();
    let flash = Flash::alert(AUTH_FAILED_ALERT).into_cookie(secure);
    (jar.add(flash), Redirect::to("/"))
}

/// Metric label for a provider taken from the request path
///
/// Only configured providers get their own series.
fn provider_label<'a>(state: &AppState, provider: &'a str) -> &'a str {
    if state.config.auth.providers.contains_key(provider) {
        provider
    } else {
        UNKNOWN_PROVIDER_LABEL
    }
}

fn oauth_state_removal() -> Cookie<'static> {
    let mut cookie = Cookie::build((OAUTH_STATE_COOKIE, ""))
        .path("/auth")
        .http_only(true)
        .build();
    cookie.make_removal();
    cookie
}
