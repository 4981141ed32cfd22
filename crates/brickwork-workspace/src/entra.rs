//! Credential Resolver: OAuth2 client-credentials exchange with Entra ID.
//!
//! The token is requested for the workspace platform's resource ID, so the
//! returned access token is directly usable as a workspace bearer token.
//! There is no caching and no retry; every call performs a fresh exchange.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use brickwork_core::config::DEFAULT_AUTHORITY_HOST;
use brickwork_core::{BearerToken, EntraConfig, Error, Result};

/// Resource ID of the workspace platform application in Entra ID.
pub const PLATFORM_RESOURCE_ID: &str = "2ff814a6-3304-4ab8-85cb-cd0e6f879c1d";

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges client credentials for a workspace bearer token.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    authority_host: String,
    http_client: Client,
}

impl CredentialResolver {
    /// Creates a resolver against the given authority host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(authority_host: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::transport("failed to create token HTTP client", e))?;
        Ok(Self::with_client(authority_host, http_client))
    }

    /// Creates a resolver against the public cloud authority.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn public_cloud() -> Result<Self> {
        Self::new(DEFAULT_AUTHORITY_HOST)
    }

    /// Creates a resolver around a pre-built client.
    #[must_use]
    pub fn with_client(authority_host: impl Into<String>, http_client: Client) -> Self {
        Self {
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// Creates a resolver from identity provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &EntraConfig) -> Result<Self> {
        Self::new(config.authority_host.clone())
    }

    fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{tenant_id}/oauth2/v2.0/token", self.authority_host)
    }

    /// Resolves a bearer token for the service identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] on any non-200 status, unreadable body or
    /// network failure. The error carries the status (if any) and the body.
    #[instrument(skip(self, client_secret), fields(tenant_id = %tenant_id, client_id = %client_id))]
    pub async fn resolve(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<BearerToken> {
        let scope = format!("{PLATFORM_RESOURCE_ID}/.default");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http_client
            .post(self.token_url(tenant_id))
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "token request failed");
                Error::Auth {
                    status: None,
                    body: format!("token request failed: {e}"),
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| Error::Auth {
            status: Some(status),
            body: format!("failed to read token response: {e}"),
        })?;

        if status != 200 {
            warn!(status, body = %body, "token request rejected");
            return Err(Error::Auth { status: Some(status), body });
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| Error::Auth {
            status: Some(status),
            body: format!("failed to parse token response: {e}"),
        })?;

        info!(expires_in = ?token.expires_in, "obtained access token for service identity");
        Ok(BearerToken::new(token.access_token))
    }

    /// Resolves a bearer token using configured credentials.
    ///
    /// # Errors
    ///
    /// See [`CredentialResolver::resolve`].
    pub async fn resolve_config(&self, config: &EntraConfig) -> Result<BearerToken> {
        self.resolve(&config.tenant_id, &config.client_id, config.secret())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::json;
    use std::collections::HashMap;

    async fn spawn_token_server(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/tenant-1/oauth2/v2.0/token",
            post(move |axum::Form(form): axum::Form<HashMap<String, String>>| {
                let body = body.clone();
                async move {
                    let valid = form.get("grant_type").map(String::as_str)
                        == Some("client_credentials")
                        && form.get("scope").map(String::as_str)
                            == Some("2ff814a6-3304-4ab8-85cb-cd0e6f879c1d/.default")
                        && form.get("client_id").map(String::as_str) == Some("client-1")
                        && form.get("client_secret").map(String::as_str) == Some("secret-1");
                    if valid {
                        (status, axum::Json(body))
                    } else {
                        (
                            StatusCode::UNPROCESSABLE_ENTITY,
                            axum::Json(json!({ "error": "unexpected form" })),
                        )
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn resolves_access_token() {
        let base = spawn_token_server(
            StatusCode::OK,
            json!({ "access_token": "eyJ.token", "expires_in": 3599, "token_type": "Bearer" }),
        )
        .await;
        let resolver = CredentialResolver::new(base).expect("resolver");

        let token = resolver
            .resolve("tenant-1", "client-1", "secret-1")
            .await
            .expect("token");
        assert_eq!(token.expose(), "eyJ.token");
    }

    #[tokio::test]
    async fn non_200_is_auth_error_with_status_and_body() {
        let base = spawn_token_server(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "invalid_client" }),
        )
        .await;
        let resolver = CredentialResolver::new(base).expect("resolver");

        let err = resolver
            .resolve("tenant-1", "client-1", "secret-1")
            .await
            .unwrap_err();
        match err {
            Error::Auth { status, body } => {
                assert_eq!(status, Some(401));
                assert!(body.contains("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn network_fault_is_auth_error_without_status() {
        let resolver = CredentialResolver::new("http://127.0.0.1:1").expect("resolver");
        let err = resolver
            .resolve("tenant-1", "client-1", "secret-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth { status: None, .. }));
    }

    #[test]
    fn token_url_layout() {
        let resolver = CredentialResolver::new("https://login.microsoftonline.com/")
            .expect("resolver");
        assert_eq!(
            resolver.token_url("contoso"),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
    }

    #[test]
    fn construction_reports_client_result() {
        let resolver = CredentialResolver::public_cloud().expect("resolver");
        assert_eq!(
            resolver.token_url("t"),
            format!("{DEFAULT_AUTHORITY_HOST}/t/oauth2/v2.0/token")
        );

        let custom = CredentialResolver::with_client("https://login.example.us//", Client::new());
        assert_eq!(custom.token_url("t"), "https://login.example.us/t/oauth2/v2.0/token");
    }
}
