//! Session management
//!
//! Sessions are explicit values: handlers load one from the request's
//! cookies, mutate it, and hand it back to the store to be written out.
//! The cookie carries an HMAC-signed token, so no server-side session
//! storage is needed.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppError;

/// Name of the cookie holding the signed session token
pub const SESSION_COOKIE: &str = "session";

const USER_ID_KEY: &str = "user_id";

/// Per-client key/value state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    values: BTreeMap<String, String>,
}

impl Session {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Drop every key, not just the user id
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Id of the signed-in user, if any
    pub fn user_id(&self) -> Option<&str> {
        self.get(USER_ID_KEY)
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.set(USER_ID_KEY, user_id);
    }
}

/// Signed payload written into the cookie
#[derive(Debug, Serialize, Deserialize)]
struct SessionToken {
    data: Session,
    /// When the token was issued
    created_at: DateTime<Utc>,
    /// When the token stops being accepted
    expires_at: DateTime<Utc>,
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `session` - Session data to encode
/// * `secret` - HMAC secret key
/// * `max_age` - Lifetime of the token in seconds
///
/// # Returns
/// Signed token string
pub fn create_session_token(
    session: &Session,
    secret: &str,
    max_age: i64,
) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let now = Utc::now();
    let token = SessionToken {
        data: session.clone(),
        created_at: now,
        expires_at: now + Duration::seconds(max_age),
    };

    // 1. Serialize session to JSON
    let payload = serde_json::to_string(&token).map_err(|e| AppError::Internal(e.into()))?;

    // 2. Base64 encode the payload
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    // 3. Create HMAC-SHA256 signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    // 4. Return "{payload}.{signature}"
    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// # Arguments
/// * `token` - Token string to verify
/// * `secret` - HMAC secret key
///
/// # Returns
/// Decoded session if valid
///
/// # Errors
/// Returns error if signature is invalid, token is malformed or expired
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // 1. Split token into payload and signature
    let (payload_b64, signature_b64) = token.split_once('.').ok_or(AppError::Unauthorized)?;

    // 2. Verify HMAC signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| AppError::InvalidSignature)?;

    // 3. Decode and deserialize payload
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;

    let token: SessionToken =
        serde_json::from_slice(&payload_bytes).map_err(|_| AppError::Unauthorized)?;

    // 4. Check if session is expired
    if token.expires_at < Utc::now() {
        return Err(AppError::Unauthorized);
    }

    Ok(token.data)
}

/// Reads and writes sessions through a signed cookie
#[derive(Clone)]
pub struct CookieSessionStore {
    secret: Arc<str>,
    max_age: i64,
    secure: bool,
}

impl CookieSessionStore {
    pub fn new(secret: impl Into<Arc<str>>, max_age: i64, secure: bool) -> Self {
        Self {
            secret: secret.into(),
            max_age,
            secure,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.auth.session_secret.as_str(),
            config.auth.session_max_age,
            config.should_use_secure_cookies(),
        )
    }

    /// Session carried by the request
    ///
    /// A missing, tampered or expired cookie yields an empty session.
    pub fn load(&self, jar: &CookieJar) -> Session {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Session::default();
        };

        match verify_session_token(cookie.value(), &self.secret) {
            Ok(session) => session,
            Err(error) => {
                tracing::debug!(%error, "Discarding unusable session cookie");
                Session::default()
            }
        }
    }

    /// Write `session` back into the jar
    ///
    /// An empty session removes the cookie altogether. The cookie itself
    /// lives for the browser session; the signed token carries the expiry.
    pub fn save(&self, jar: CookieJar, session: &Session) -> Result<CookieJar, AppError> {
        if session.is_empty() {
            return Ok(jar.add(self.removal_cookie()));
        }

        let token = create_session_token(session, &self.secret, self.max_age)?;
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build();

        Ok(jar.add(cookie))
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        cookie
    }
}
