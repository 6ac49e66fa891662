//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{collections::HashMap, net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "app.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL
    ///
    /// # Returns
    /// Full URL like "https://app.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// Provider that `/signin` sends users to (default: "facebook")
    #[serde(default = "default_signin_provider")]
    pub signin_provider: String,
    /// OAuth providers keyed by the name used in `/auth/:provider`
    #[serde(default)]
    pub providers: HashMap<String, OAuthProviderConfig>,
}

fn default_signin_provider() -> String {
    "facebook".to_string()
}

/// OAuth 2.0 provider configuration
///
/// Endpoint URLs may be omitted for providers with a built-in preset.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub scope: Option<String>,
    /// JSON field of the user-info response holding the provider uid
    pub uid_field: Option<String>,
}

/// Fully resolved endpoints for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scope: String,
    pub uid_field: String,
}

impl OAuthProviderConfig {
    /// Merge configured endpoints over the built-in preset for `name`.
    ///
    /// Returns `None` when any endpoint is neither configured nor preset.
    pub fn resolve(&self, name: &str) -> Option<ProviderEndpoints> {
        let preset = provider_preset(name);
        let pick = |configured: &Option<String>, preset: Option<&'static str>| {
            configured
                .clone()
                .or_else(|| preset.map(ToOwned::to_owned))
        };

        Some(ProviderEndpoints {
            authorize_url: pick(&self.authorize_url, preset.as_ref().map(|p| p.authorize_url))?,
            token_url: pick(&self.token_url, preset.as_ref().map(|p| p.token_url))?,
            userinfo_url: pick(&self.userinfo_url, preset.as_ref().map(|p| p.userinfo_url))?,
            scope: pick(&self.scope, preset.as_ref().map(|p| p.scope)).unwrap_or_default(),
            uid_field: self.uid_field.clone().unwrap_or_else(|| "id".to_string()),
        })
    }
}

struct ProviderPreset {
    authorize_url: &'static str,
    token_url: &'static str,
    userinfo_url: &'static str,
    scope: &'static str,
}

fn provider_preset(name: &str) -> Option<ProviderPreset> {
    match name {
        "facebook" => Some(ProviderPreset {
            authorize_url: "https://www.facebook.com/v19.0/dialog/oauth",
            token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
            userinfo_url: "https://graph.facebook.com/me?fields=id,name,email",
            scope: "email",
        }),
        "github" => Some(ProviderPreset {
            authorize_url: "https://github.com/login/oauth/authorize",
            token_url: "https://github.com/login/oauth/access_token",
            userinfo_url: "https://api.github.com/user",
            scope: "read:user",
        }),
        _ => None,
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (SESSIONGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/sessiongate.db")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("auth.signin_provider", "facebook")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (SESSIONGATE__*)
            .add_source(
                Environment::with_prefix("SESSIONGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    /// Callback URL registered with the provider
    pub fn callback_url(&self, provider: &str) -> String {
        format!("{}/auth/{}/callback", self.server.base_url(), provider)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if !self.auth.providers.contains_key(&self.auth.signin_provider) {
            return Err(crate::error::AppError::Config(format!(
                "auth.signin_provider '{}' has no entry under auth.providers",
                self.auth.signin_provider
            )));
        }

        for (name, provider) in &self.auth.providers {
            let Some(endpoints) = provider.resolve(name) else {
                return Err(crate::error::AppError::Config(format!(
                    "auth.providers.{name} needs authorize_url, token_url and userinfo_url"
                )));
            };

            for (field, value) in [
                ("authorize_url", &endpoints.authorize_url),
                ("token_url", &endpoints.token_url),
                ("userinfo_url", &endpoints.userinfo_url),
            ] {
                if let Err(error) = url::Url::parse(value) {
                    return Err(crate::error::AppError::Config(format!(
                        "auth.providers.{name}.{field} is not a valid URL: {error}"
                    )));
                }
            }
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facebook() -> OAuthProviderConfig {
        OAuthProviderConfig {
            client_id: "facebook-client-id".to_string(),
            client_secret: "facebook-client-secret".to_string(),
            authorize_url: None,
            token_url: None,
            userinfo_url: None,
            scope: None,
            uid_field: None,
        }
    }

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/sessiongate-test.db"),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 604_800,
                signin_provider: "facebook".to_string(),
                providers: HashMap::from([("facebook".to_string(), facebook())]),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "app.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_unconfigured_signin_provider() {
        let mut config = valid_config();
        config.auth.signin_provider = "github".to_string();

        let error = config
            .validate()
            .expect_err("signin provider must be configured");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("signin_provider")
        ));
    }

    #[test]
    fn validate_rejects_custom_provider_without_endpoints() {
        let mut config = valid_config();
        config
            .auth
            .providers
            .insert("gitea".to_string(), facebook());

        let error = config
            .validate()
            .expect_err("custom providers need explicit endpoints");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("auth.providers.gitea")
        ));
    }

    #[test]
    fn validate_rejects_unparsable_provider_url() {
        let mut config = valid_config();
        if let Some(facebook) = config.auth.providers.get_mut("facebook") {
            facebook.authorize_url = Some("facebook dot com".to_string());
        }

        let error = config
            .validate()
            .expect_err("endpoint URLs must parse");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.providers.facebook.authorize_url")
        ));
    }

    #[test]
    fn resolve_prefers_configured_endpoints_over_preset() {
        let mut provider = facebook();
        provider.token_url = Some("http://127.0.0.1:9999/token".to_string());

        let endpoints = provider.resolve("facebook").expect("preset exists");
        assert_eq!(endpoints.token_url, "http://127.0.0.1:9999/token");
        assert!(endpoints.authorize_url.contains("facebook.com"));
        assert_eq!(endpoints.uid_field, "id");
    }

    #[test]
    fn callback_url_uses_public_base_url() {
        let config = valid_config();
        assert_eq!(
            config.callback_url("facebook"),
            "http://localhost/auth/facebook/callback"
        );
    }
}
