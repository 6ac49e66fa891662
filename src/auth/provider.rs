//! OAuth provider handshake
//!
//! The sign-in flow never talks to a provider directly. It asks a
//! [`ProviderAuthenticator`] where to send the browser, and later hands it
//! the callback to turn into a validated [`AuthPayload`].

use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use crate::config::{AppConfig, ProviderEndpoints};
use crate::data::AuthPayload;
use crate::error::{AppError, AuthError};

/// Where to send the browser to start a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Provider authorization URL, query included
    pub url: String,
    /// CSRF token the callback must echo back
    pub state: String,
}

/// Everything the callback request carried
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    pub provider: String,
    /// Callback query parameters
    pub params: HashMap<String, String>,
    /// `state` remembered when the handshake began
    pub expected_state: Option<String>,
}

/// Capability that completes OAuth handshakes
#[async_trait]
pub trait ProviderAuthenticator: Send + Sync {
    fn authorization_request(&self, provider: &str) -> Result<AuthorizationRequest, AuthError>;

    async fn complete_callback(&self, request: CallbackRequest)
    -> Result<AuthPayload, AuthError>;
}

// =============================================================================
// OAuth 2.0 authorization code flow
// =============================================================================

#[derive(Debug, Clone)]
struct RegisteredProvider {
    authorize_url: Url,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    endpoints: ProviderEndpoints,
}

/// Authorization-code flow against the providers listed in configuration
pub struct OAuth2Authenticator {
    providers: HashMap<String, RegisteredProvider>,
    http: reqwest::Client,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl OAuth2Authenticator {
    /// Build from `auth.providers`
    ///
    /// # Errors
    /// Returns a config error for providers without resolvable endpoints
    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Result<Self, AppError> {
        let mut providers = HashMap::new();

        for (name, provider) in &config.auth.providers {
            let endpoints = provider.resolve(name).ok_or_else(|| {
                AppError::Config(format!("auth.providers.{name} has incomplete endpoints"))
            })?;
            let authorize_url = Url::parse(&endpoints.authorize_url).map_err(|e| {
                AppError::Config(format!("auth.providers.{name}.authorize_url: {e}"))
            })?;

            providers.insert(
                name.clone(),
                RegisteredProvider {
                    authorize_url,
                    client_id: provider.client_id.clone(),
                    client_secret: provider.client_secret.clone(),
                    redirect_uri: config.callback_url(name),
                    endpoints,
                },
            );
        }

        tracing::info!(
            providers = ?providers.keys().collect::<Vec<_>>(),
            "OAuth providers registered"
        );

        Ok(Self { providers, http })
    }

    fn provider(&self, name: &str) -> Result<&RegisteredProvider, AuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| AuthError::UnknownProvider(name.to_string()))
    }

    async fn exchange_code(
        &self,
        provider: &RegisteredProvider,
        code: &str,
    ) -> Result<String, AuthError> {
        let response = self
            .http
            .post(&provider.endpoints.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", provider.redirect_uri.as_str()),
                ("client_id", provider.client_id.as_str()),
                ("client_secret", provider.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("unreadable response ({status}): {e}")))?;

        if let Some(error) = token.error {
            let description = token.error_description.unwrap_or_default();
            return Err(AuthError::TokenExchange(
                format!("{error} {description}").trim().to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AuthError::TokenExchange(format!("status {status}")));
        }

        token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::TokenExchange("no access_token in response".to_string()))
    }

    async fn fetch_user_info(
        &self,
        provider: &RegisteredProvider,
        access_token: &str,
    ) -> Result<serde_json::Value, AuthError> {
        let response = self
            .http
            .get(&provider.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::UserInfo(format!("status {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::UserInfo(e.to_string()))
    }
}

#[async_trait]
impl ProviderAuthenticator for OAuth2Authenticator {
    fn authorization_request(&self, provider: &str) -> Result<AuthorizationRequest, AuthError> {
        let registered = self.provider(provider)?;
        let state = generate_csrf_state();

        let mut url = registered.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &registered.client_id)
                .append_pair("redirect_uri", &registered.redirect_uri)
                .append_pair("response_type", "code");
            if !registered.endpoints.scope.is_empty() {
                query.append_pair("scope", &registered.endpoints.scope);
            }
            query.append_pair("state", &state);
        }

        Ok(AuthorizationRequest {
            url: url.into(),
            state,
        })
    }

    async fn complete_callback(
        &self,
        request: CallbackRequest,
    ) -> Result<AuthPayload, AuthError> {
        let provider = self.provider(&request.provider)?;

        if let Some(error) = request.params.get("error") {
            let description = request
                .params
                .get("error_description")
                .map(String::as_str)
                .unwrap_or_default();
            return Err(AuthError::Denied(
                format!("{error} {description}").trim().to_string(),
            ));
        }

        let code = request
            .params
            .get("code")
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::MissingAuthPayload("callback has no code".to_string()))?;

        verify_csrf_state(
            request.params.get("state").map(String::as_str),
            request.expected_state.as_deref(),
        )?;

        let access_token = self.exchange_code(provider, code).await?;
        let info = self.fetch_user_info(provider, &access_token).await?;

        let uid = json_string(&info, &provider.endpoints.uid_field).ok_or_else(|| {
            AuthError::MissingAuthPayload(format!(
                "user info has no '{}' field",
                provider.endpoints.uid_field
            ))
        })?;

        Ok(AuthPayload {
            provider: request.provider,
            uid,
            name: json_string(&info, "name"),
            email: json_string(&info, "email"),
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(received: Option<&str>, expected: Option<&str>) -> Result<(), AuthError> {
    match (received, expected) {
        (Some(received), Some(expected)) if !expected.is_empty() && received == expected => Ok(()),
        _ => Err(AuthError::StateMismatch),
    }
}

/// Read a string or integer field as a string
fn json_string(value: &serde_json::Value, field: &str) -> Option<String> {
    match value.get(field)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
