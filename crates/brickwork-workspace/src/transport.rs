//! Transport seam between the managers and the workspace REST API.
//!
//! Managers never talk to `reqwest` directly. They build an [`ApiRequest`]
//! through a [`WorkspaceClient`] and inspect the raw [`ApiResponse`],
//! because most operations branch on the status code (409, 400) or on the
//! error body rather than treating every non-2xx the same way.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;

use brickwork_core::{BearerToken, Error, Result, WorkspaceConfig};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP method subset used by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        })
    }
}

/// Body encoding of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    /// `application/json`
    #[default]
    Json,
    /// `application/scim+json`
    Scim,
}

impl ContentType {
    fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Scim => "application/scim+json",
        }
    }
}

/// A single control-plane request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Versioned path, e.g. `/api/2.1/jobs/list`.
    pub path: String,
    /// Query parameters in order.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
    /// Body encoding.
    pub content_type: ContentType,
    /// Bearer credential for this call.
    pub token: BearerToken,
}

impl ApiRequest {
    /// Returns the value of a query parameter.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw control-plane response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body text.
    pub body: String,
}

impl ApiResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            Error::serialization(format!("invalid response body (status {}): {e}", self.status))
        })
    }

    /// Converts a non-2xx response into [`Error::Http`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] carrying status and body when the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Http {
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Returns the structured `error_code` of a JSON error body.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        self.json_field("error_code")
    }

    /// Returns the `message` of a JSON error body.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.json_field("message")
    }

    fn json_field(&self, field: &str) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()?
            .get(field)?
            .as_str()
            .map(str::to_string)
    }
}

/// Sends control-plane requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns whatever status came back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] only when no response was received.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// `reqwest`-backed transport against a workspace base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Creates a transport for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .user_agent(concat!("brickwork/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transport("failed to create HTTP client", e))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Creates a transport around a pre-built client.
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
        };

        builder = builder
            .bearer_auth(request.token.expose())
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, request.content_type.mime())
                .body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(|e| {
            Error::transport(format!("{} {} failed", request.method, request.path), e)
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport("failed to read response body", e))?;

        Ok(ApiResponse { status, body })
    }
}

/// A transport bound to one bearer credential.
///
/// Cloning is cheap; [`WorkspaceClient::with_token`] returns a client that
/// shares the transport but authenticates as someone else.
#[derive(Clone)]
pub struct WorkspaceClient {
    transport: Arc<dyn Transport>,
    token: BearerToken,
    host: String,
}

impl fmt::Debug for WorkspaceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceClient")
            .field("host", &self.host)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl WorkspaceClient {
    /// Creates an HTTP-backed client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &WorkspaceConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.host.clone())?;
        Ok(Self {
            transport: Arc::new(transport),
            token: config.token.clone(),
            host: config.host.clone(),
        })
    }

    /// Creates a client over an arbitrary transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, token: BearerToken) -> Self {
        Self {
            transport,
            token,
            host: String::from("(custom transport)"),
        }
    }

    /// Returns a client sharing this transport but acting as `token`.
    #[must_use]
    pub fn with_token(&self, token: BearerToken) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            token,
            host: self.host.clone(),
        }
    }

    /// Workspace host used for log fields.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Issues a `GET`.
    ///
    /// # Errors
    ///
    /// Returns an error only if no response was received.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        self.send(Method::Get, path, query, None, ContentType::Json)
            .await
    }

    /// Issues a `POST` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized or no response was received.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.send(Method::Post, path, &[], Some(body), ContentType::Json)
            .await
    }

    /// Issues a `POST` with a SCIM body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized or no response was received.
    pub async fn post_scim<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.send(Method::Post, path, &[], Some(body), ContentType::Scim)
            .await
    }

    /// Issues a `PATCH` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized or no response was received.
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let body = serde_json::to_value(body)?;
        self.send(Method::Patch, path, &[], Some(body), ContentType::Json)
            .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
        content_type: ContentType,
    ) -> Result<ApiResponse> {
        let request = ApiRequest {
            method,
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            body,
            content_type,
            token: self.token.clone(),
        };
        self.transport.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use serde_json::json;

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: &str) -> WorkspaceClient {
        let transport = HttpTransport::new(base_url).expect("transport");
        WorkspaceClient::with_transport(Arc::new(transport), BearerToken::new("token-a"))
    }

    #[tokio::test]
    async fn sends_bearer_header_and_query() {
        let app = Router::new().route(
            "/api/2.1/jobs/list",
            get(
                |headers: HeaderMap,
                 axum::extract::RawQuery(query): axum::extract::RawQuery| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    axum::Json(json!({ "auth": auth, "query": query }))
                },
            ),
        );
        let base_url = spawn_server(app).await;
        let client = client_for(&base_url);

        let response = client
            .get("/api/2.1/jobs/list", &[("limit", "100".to_string())])
            .await
            .expect("response");
        assert_eq!(response.status, 200);
        let body: serde_json::Value = response.json().expect("json");
        assert_eq!(body["auth"], "Bearer token-a");
        assert_eq!(body["query"], "limit=100");

        let other = client.with_token(BearerToken::new("token-b"));
        let body: serde_json::Value = other
            .get("/api/2.1/jobs/list", &[])
            .await
            .expect("response")
            .json()
            .expect("json");
        assert_eq!(body["auth"], "Bearer token-b");
    }

    #[tokio::test]
    async fn scim_posts_use_scim_content_type() {
        let app = Router::new().route(
            "/api/2.0/preview/scim/v2/ServicePrincipals",
            post(|headers: HeaderMap| async move {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (StatusCode::CREATED, axum::Json(json!({ "ct": content_type })))
            }),
        );
        let base_url = spawn_server(app).await;
        let client = client_for(&base_url);

        let response = client
            .post_scim(
                "/api/2.0/preview/scim/v2/ServicePrincipals",
                &json!({ "displayName": "sp" }),
            )
            .await
            .expect("response");
        assert_eq!(response.status, 201);
        let body: serde_json::Value = response.json().expect("json");
        assert_eq!(body["ct"], "application/scim+json");
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let app = Router::new().route(
            "/api/2.1/jobs/create",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    axum::Json(json!({
                        "error_code": "RESOURCE_ALREADY_EXISTS",
                        "message": "Job with name already exists"
                    })),
                )
            }),
        );
        let base_url = spawn_server(app).await;
        let client = client_for(&base_url);

        let response = client
            .post("/api/2.1/jobs/create", &json!({}))
            .await
            .expect("response");
        assert_eq!(response.status, 400);
        assert_eq!(
            response.error_code().as_deref(),
            Some("RESOURCE_ALREADY_EXISTS")
        );
        assert_eq!(
            response.message().as_deref(),
            Some("Job with name already exists")
        );
        let err = response.error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = client_for("http://127.0.0.1:1");
        let err = client.get("/api/2.1/jobs/list", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn error_code_absent_for_plain_text() {
        let response = ApiResponse::new(500, "upstream exploded");
        assert!(response.error_code().is_none());
        assert!(!response.is_success());
    }
}
