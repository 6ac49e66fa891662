//! Authentication middleware
//!
//! Resolves the signed-in user from the session cookie and protects
//! routes that require one.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::data::User;
use crate::error::AppError;

/// Look up the user whose id the session carries
async fn authenticate_session(headers: &HeaderMap, state: &AppState) -> Result<User, AppError> {
    let jar = CookieJar::from_headers(headers);
    let session = state.sessions.load(&jar);
    let user_id = session.user_id().ok_or(AppError::Unauthorized)?;

    state
        .users
        .get_user(user_id)
        .await?
        .ok_or(AppError::Unauthorized)
}

/// Middleware to require authentication
///
/// Adds the resolved `User` to request extensions if valid.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/metrics", ...)
///     .route_layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate_session(request.headers(), &state).await?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Extractor for current authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(user): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", user.display_name())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>().cloned() {
            return Ok(CurrentUser(user));
        }

        let state = AppState::from_ref(state);
        let user = authenticate_session(&parts.headers, &state).await?;
        parts.extensions.insert(user.clone());

        Ok(CurrentUser(user))
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error. A session
/// pointing at a user that no longer resolves counts as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>().cloned() {
            return Ok(MaybeUser(Some(user)));
        }

        let app_state = AppState::from_ref(state);
        let user = match authenticate_session(&parts.headers, &app_state).await {
            Ok(user) => Some(user),
            Err(AppError::Unauthorized) => None,
            Err(error) => {
                tracing::warn!(%error, "Failed to resolve session user");
                None
            }
        };

        if let Some(user) = &user {
            parts.extensions.insert(user.clone());
        }

        Ok(MaybeUser(user))
    }
}
