//! OAuth sign-in
//!
//! Handles:
//! - Provider handshake (injected authenticator)
//! - Session management
//! - Flash messages
//! - Authentication middleware

mod flash;
mod middleware;
mod oauth;
pub mod provider;
pub mod session;

pub use flash::{FLASH_COOKIE, Flash, FlashKind};
pub use middleware::{CurrentUser, MaybeUser, require_auth};
pub use oauth::{
    AUTH_FAILED_ALERT, OAUTH_STATE_COOKIE, SIGNED_IN_NOTICE, SIGNED_OUT_NOTICE, auth_router,
};
pub use provider::{
    AuthorizationRequest, CallbackRequest, OAuth2Authenticator, ProviderAuthenticator,
};
pub use session::{CookieSessionStore, SESSION_COOKIE, Session};
