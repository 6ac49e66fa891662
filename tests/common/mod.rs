//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sessiongate::auth::{AuthorizationRequest, CallbackRequest, ProviderAuthenticator};
use sessiongate::data::{AuthPayload, Database};
use sessiongate::error::AuthError;
use sessiongate::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const SESSION_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// Authenticator that trusts the callback query
///
/// `?uid=...` (and optionally `name=...`) on the callback becomes the
/// auth payload; `?error=...` is a refusal; anything else has no payload.
pub struct StubAuthenticator;

#[async_trait]
impl ProviderAuthenticator for StubAuthenticator {
    fn authorization_request(&self, provider: &str) -> Result<AuthorizationRequest, AuthError> {
        match provider {
            "facebook" | "github" => Ok(AuthorizationRequest {
                url: format!("https://{provider}.test/authorize?state=stub-state"),
                state: "stub-state".to_string(),
            }),
            other => Err(AuthError::UnknownProvider(other.to_string())),
        }
    }

    async fn complete_callback(
        &self,
        request: CallbackRequest,
    ) -> Result<AuthPayload, AuthError> {
        if let Some(error) = request.params.get("error") {
            return Err(AuthError::Denied(error.clone()));
        }

        let uid = request
            .params
            .get("uid")
            .cloned()
            .ok_or_else(|| AuthError::MissingAuthPayload("no uid".to_string()))?;

        Ok(AuthPayload {
            provider: request.provider,
            uid,
            name: request.params.get("name").cloned(),
            email: None,
        })
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub db: Arc<Database>,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        sessiongate::metrics::init_metrics();

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            auth: config::AuthConfig {
                session_secret: SESSION_SECRET.to_string(),
                session_max_age: 604800,
                signin_provider: "facebook".to_string(),
                providers: HashMap::from([(
                    "facebook".to_string(),
                    config::OAuthProviderConfig {
                        client_id: "test-client-id".to_string(),
                        client_secret: "test-client-secret".to_string(),
                        authorize_url: None,
                        token_url: None,
                        userinfo_url: None,
                        scope: None,
                        uid_field: None,
                    },
                )]),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let db = Arc::new(Database::connect(&db_path).await.unwrap());
        let state = AppState::from_parts(config, db.clone(), Arc::new(StubAuthenticator));

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = sessiongate::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            db,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Complete a stubbed provider callback and return the response
    pub async fn callback(&self, provider: &str, uid: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/auth/{provider}/callback?uid={uid}")))
            .send()
            .await
            .expect("request succeeds")
    }

    /// Sign in and return the issued session cookie value
    pub async fn sign_in(&self, provider: &str, uid: &str) -> String {
        let response = self.callback(provider, uid).await;
        assert!(response.status().is_redirection());
        set_cookie_value(&response, "session").expect("session cookie issued")
    }

    /// Render the home page for a flash cookie value, as a browser would
    /// after following the redirect
    pub async fn render_flash(&self, flash: &str) -> String {
        self.client
            .get(self.url("/"))
            .header("Cookie", format!("flash={flash}"))
            .send()
            .await
            .expect("request succeeds")
            .text()
            .await
            .expect("body is text")
    }
}

/// Value of the `Location` header
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

/// Every `Set-Cookie` header of the response
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(ToString::to_string))
        .collect()
}

/// Value assigned to cookie `name`, if the response sets it
pub fn set_cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookies(response).into_iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?.trim().to_string();
        pair.strip_prefix(&prefix).map(ToOwned::to_owned)
    })
}
