//! Identity Registrar: service principals in the workspace, through SCIM.
//!
//! Two kinds of identity reach the workspace. Workspace-local principals
//! are created here with a locally generated application ID and are looked
//! up by display name. Principals issued by the external identity provider
//! arrive with their application ID, which is the lookup key for them.
//! Every operation states which [`IdentityKey`] it uses.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use brickwork_core::{BearerToken, Error, Result};

use crate::transport::{ApiResponse, WorkspaceClient};

pub(crate) const SERVICE_PRINCIPALS_PATH: &str = "/api/2.0/preview/scim/v2/ServicePrincipals";
const SERVICE_PRINCIPAL_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:ServicePrincipal";

/// Lookup key for a service principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// External application (client) ID.
    ByApplicationId(String),
    /// Workspace display name.
    ByDisplayName(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByApplicationId(id) => write!(f, "applicationId={id}"),
            Self::ByDisplayName(name) => write!(f, "displayName={name}"),
        }
    }
}

/// Which key a registration falls back to after a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupBy {
    /// Use the application ID.
    ApplicationId,
    /// Use the display name.
    DisplayName,
}

/// Workspace entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entitlement {
    /// `allow-cluster-create`
    AllowClusterCreate,
    /// `databricks-sql-access`
    SqlAccess,
    /// `workspace-access`
    WorkspaceAccess,
    /// Any other entitlement value.
    Other(String),
}

impl Entitlement {
    /// Wire value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AllowClusterCreate => "allow-cluster-create",
            Self::SqlAccess => "databricks-sql-access",
            Self::WorkspaceAccess => "workspace-access",
            Self::Other(value) => value,
        }
    }

    /// Entitlements given to workspace-local principals.
    #[must_use]
    pub fn workspace_defaults() -> Vec<Self> {
        vec![Self::AllowClusterCreate, Self::SqlAccess]
    }

    /// Entitlements given to externally issued principals.
    #[must_use]
    pub fn external_defaults() -> Vec<Self> {
        vec![Self::AllowClusterCreate, Self::SqlAccess, Self::WorkspaceAccess]
    }
}

impl From<&str> for Entitlement {
    fn from(value: &str) -> Self {
        match value {
            "allow-cluster-create" => Self::AllowClusterCreate,
            "databricks-sql-access" => Self::SqlAccess,
            "workspace-access" => Self::WorkspaceAccess,
            other => Self::Other(other.to_string()),
        }
    }
}

/// SCIM `{ "value": ... }` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRef {
    /// The value.
    pub value: String,
}

/// A service principal as stored in the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    /// Workspace-assigned ID.
    #[serde(default)]
    pub id: String,
    /// Application (client) ID.
    #[serde(default)]
    pub application_id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Whether the principal is active.
    #[serde(default)]
    pub active: Option<bool>,
    /// Granted entitlements.
    #[serde(default)]
    pub entitlements: Vec<ValueRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateServicePrincipal<'a> {
    schemas: [&'static str; 1],
    application_id: &'a str,
    display_name: &'a str,
    active: bool,
    entitlements: Vec<ValueRef>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "Resources", default)]
    resources: Vec<ServicePrincipal>,
}

/// Parameters of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterIdentity {
    /// Application ID; generated locally when absent.
    pub application_id: Option<String>,
    /// Display name.
    pub display_name: String,
    /// Entitlements to grant on creation.
    pub entitlements: Vec<Entitlement>,
    /// Key used to read the principal back after a conflict.
    pub lookup: LookupBy,
}

impl RegisterIdentity {
    /// A workspace-local principal, keyed by display name.
    #[must_use]
    pub fn workspace_local(display_name: impl Into<String>) -> Self {
        Self {
            application_id: None,
            display_name: display_name.into(),
            entitlements: Entitlement::workspace_defaults(),
            lookup: LookupBy::DisplayName,
        }
    }

    /// An externally issued principal, keyed by application ID.
    #[must_use]
    pub fn external(application_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            application_id: Some(application_id.into()),
            display_name: display_name.into(),
            entitlements: Entitlement::external_defaults(),
            lookup: LookupBy::ApplicationId,
        }
    }

    /// Overrides the entitlements.
    #[must_use]
    pub fn with_entitlements(mut self, entitlements: Vec<Entitlement>) -> Self {
        self.entitlements = entitlements;
        self
    }

    fn key_for(&self, application_id: &str) -> IdentityKey {
        match self.lookup {
            LookupBy::ApplicationId => IdentityKey::ByApplicationId(application_id.to_string()),
            LookupBy::DisplayName => IdentityKey::ByDisplayName(self.display_name.clone()),
        }
    }

    /// Key an already-existing principal could be found under, if any.
    fn existing_key(&self) -> Option<IdentityKey> {
        match self.lookup {
            LookupBy::ApplicationId => self
                .application_id
                .as_ref()
                .map(|id| IdentityKey::ByApplicationId(id.clone())),
            LookupBy::DisplayName => Some(IdentityKey::ByDisplayName(self.display_name.clone())),
        }
    }
}

/// Registers and finds service principals.
#[derive(Debug, Clone)]
pub struct IdentityRegistrar {
    client: WorkspaceClient,
}

impl IdentityRegistrar {
    /// Creates a registrar over a workspace client.
    #[must_use]
    pub fn new(client: WorkspaceClient) -> Self {
        Self { client }
    }

    /// Returns a registrar that issues calls as another identity.
    #[must_use]
    pub fn acting_as(&self, token: BearerToken) -> Self {
        Self {
            client: self.client.with_token(token),
        }
    }

    /// Finds a principal by any key.
    pub async fn find(&self, key: &IdentityKey) -> Option<ServicePrincipal> {
        match key {
            IdentityKey::ByApplicationId(id) => self.find_by_application_id(id).await,
            IdentityKey::ByDisplayName(name) => self.find_by_display_name(name).await,
        }
    }

    /// Finds a principal by application ID.
    ///
    /// Tries the server-side filter first. When that yields no matching
    /// principal, lists all principals and filters locally, since filter
    /// support differs between deployments.
    #[instrument(skip(self), fields(workspace = %self.client.host()))]
    pub async fn find_by_application_id(&self, application_id: &str) -> Option<ServicePrincipal> {
        let filter = format!("applicationId eq {}", scim_string(application_id));
        let matches = |sp: &ServicePrincipal| sp.application_id.as_deref() == Some(application_id);

        if let Some(found) = self
            .list(Some(filter))
            .await
            .and_then(|all| all.into_iter().find(matches))
        {
            return Some(found);
        }

        debug!("filtered lookup found nothing, scanning all service principals");
        self.list(None).await?.into_iter().find(matches)
    }

    /// Finds a principal whose display name equals `display_name` exactly.
    #[instrument(skip(self), fields(workspace = %self.client.host()))]
    pub async fn find_by_display_name(&self, display_name: &str) -> Option<ServicePrincipal> {
        let filter = format!("displayName eq {}", scim_string(display_name));
        self.list(Some(filter))
            .await?
            .into_iter()
            .find(|sp| sp.display_name.as_deref() == Some(display_name))
    }

    async fn list(&self, filter: Option<String>) -> Option<Vec<ServicePrincipal>> {
        let query: Vec<(&str, String)> = filter.into_iter().map(|f| ("filter", f)).collect();
        match self.client.get(SERVICE_PRINCIPALS_PATH, &query).await {
            Ok(response) if response.status == 200 => response
                .json::<ListResponse>()
                .map(|list| list.resources)
                .map_err(|e| warn!(error = %e, "could not parse service principal list"))
                .ok(),
            Ok(response) => {
                warn!(status = response.status, body = %response.body, "error getting service principals");
                None
            }
            Err(e) => {
                warn!(error = %e, "error getting service principals");
                None
            }
        }
    }

    /// Creates a principal, or returns the existing one on conflict.
    ///
    /// A 409 falls back to a lookup under the request's key. Other failures
    /// are logged, and a best-effort lookup is still tried in case the
    /// create was applied before the failure surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if a 409 cannot be resolved by lookup,
    /// [`Error::Http`] for other rejected creations, or the transport error,
    /// when the fallback lookup finds nothing.
    #[instrument(skip(self, request), fields(display_name = %request.display_name, workspace = %self.client.host()))]
    pub async fn register_or_get(&self, request: &RegisterIdentity) -> Result<ServicePrincipal> {
        let application_id = request
            .application_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = request.key_for(&application_id);

        let payload = CreateServicePrincipal {
            schemas: [SERVICE_PRINCIPAL_SCHEMA],
            application_id: &application_id,
            display_name: &request.display_name,
            active: true,
            entitlements: request
                .entitlements
                .iter()
                .map(|e| ValueRef {
                    value: e.as_str().to_string(),
                })
                .collect(),
        };

        let failure = match self.client.post_scim(SERVICE_PRINCIPALS_PATH, &payload).await {
            Ok(response) if response.is_success() => match response.json::<ServicePrincipal>() {
                Ok(created) => {
                    info!(id = %created.id, application_id = %application_id, "registered service principal");
                    return Ok(created);
                }
                Err(e) => e,
            },
            Ok(response) if response.status == 409 => {
                info!(key = %key, "service principal already exists, fetching it");
                return self.find(&key).await.ok_or_else(|| Error::Conflict {
                    message: format!("service principal exists but cannot be retrieved ({key})"),
                });
            }
            Ok(ApiResponse { status, body }) => {
                warn!(status, body = %body, "failed to register service principal");
                Error::Http { status, body }
            }
            Err(e) => {
                warn!(error = %e, "error registering service principal");
                e
            }
        };

        match self.find(&key).await {
            Some(existing) => {
                info!(key = %key, "found service principal after failed registration");
                Ok(existing)
            }
            None => Err(failure),
        }
    }

    /// Returns the existing principal, registering it when absent.
    ///
    /// # Errors
    ///
    /// See [`IdentityRegistrar::register_or_get`].
    pub async fn ensure(&self, request: &RegisterIdentity) -> Result<ServicePrincipal> {
        if let Some(key) = request.existing_key() {
            if let Some(existing) = self.find(&key).await {
                info!(key = %key, id = %existing.id, "found existing service principal");
                return Ok(existing);
            }
        }
        self.register_or_get(request).await
    }
}

/// Quotes a value as a SCIM filter string literal.
fn scim_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::transport::Method;
    use serde_json::json;

    fn sp(id: &str, app_id: &str, name: &str) -> serde_json::Value {
        json!({ "id": id, "applicationId": app_id, "displayName": name, "active": true })
    }

    #[test]
    fn scim_string_escapes_quotes() {
        assert_eq!(scim_string(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[tokio::test]
    async fn find_by_application_id_uses_filter_first() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Get,
            SERVICE_PRINCIPALS_PATH,
            200,
            json!({ "totalResults": 1, "Resources": [sp("1", "app-1", "one")] }),
        );
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let found = registrar.find_by_application_id("app-1").await.expect("sp");
        assert_eq!(found.id, "1");
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].query_param("filter"), Some(r#"applicationId eq "app-1""#));
    }

    #[tokio::test]
    async fn find_by_application_id_falls_back_to_full_scan() {
        let transport = ScriptedTransport::new();
        transport
            .respond(Method::Get, SERVICE_PRINCIPALS_PATH, 200, json!({ "Resources": [] }))
            .respond(
                Method::Get,
                SERVICE_PRINCIPALS_PATH,
                200,
                json!({ "Resources": [sp("1", "app-0", "zero"), sp("2", "app-1", "one")] }),
            );
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let found = registrar.find_by_application_id("app-1").await.expect("sp");
        assert_eq!(found.id, "2");
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].query_param("filter").is_none());
    }

    #[tokio::test]
    async fn find_by_display_name_is_exact() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Get,
            SERVICE_PRINCIPALS_PATH,
            200,
            json!({ "Resources": [sp("1", "app-1", "Reporter")] }),
        );
        let registrar = IdentityRegistrar::new(transport.client("t"));

        assert!(registrar.find_by_display_name("reporter").await.is_none());
        assert!(registrar.find_by_display_name("Reporter").await.is_some());
    }

    #[tokio::test]
    async fn register_creates_with_generated_application_id() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Post,
            SERVICE_PRINCIPALS_PATH,
            201,
            sp("77", "generated", "etl-runner"),
        );
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let created = registrar
            .register_or_get(&RegisterIdentity::workspace_local("etl-runner"))
            .await
            .expect("created");
        assert_eq!(created.id, "77");

        let body = transport.calls()[0].body.clone().expect("body");
        assert_eq!(body["schemas"][0], SERVICE_PRINCIPAL_SCHEMA);
        assert_eq!(body["displayName"], "etl-runner");
        assert_eq!(body["active"], true);
        let app_id = body["applicationId"].as_str().expect("app id");
        assert!(Uuid::parse_str(app_id).is_ok());
        assert_eq!(
            body["entitlements"],
            json!([{ "value": "allow-cluster-create" }, { "value": "databricks-sql-access" }])
        );
    }

    #[tokio::test]
    async fn register_conflict_resolves_by_declared_key() {
        let transport = ScriptedTransport::new();
        transport.respond(Method::Post, SERVICE_PRINCIPALS_PATH, 409, json!({ "detail": "exists" }));
        transport.respond(
            Method::Get,
            SERVICE_PRINCIPALS_PATH,
            200,
            json!({ "Resources": [sp("5", "client-5", "ext")] }),
        );
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let found = registrar
            .register_or_get(&RegisterIdentity::external("client-5", "ext"))
            .await
            .expect("existing");
        assert_eq!(found.id, "5");
        let lookup = &transport.calls_to(Method::Get, SERVICE_PRINCIPALS_PATH)[0];
        assert_eq!(lookup.query_param("filter"), Some(r#"applicationId eq "client-5""#));
    }

    #[tokio::test]
    async fn register_conflict_without_lookup_result_is_conflict_error() {
        let transport = ScriptedTransport::new();
        transport.respond(Method::Post, SERVICE_PRINCIPALS_PATH, 409, json!({}));
        transport.respond(Method::Get, SERVICE_PRINCIPALS_PATH, 200, json!({ "Resources": [] }));
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let err = registrar
            .register_or_get(&RegisterIdentity::workspace_local("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn register_failure_still_tries_lookup() {
        let transport = ScriptedTransport::new();
        transport.fail(Method::Post, SERVICE_PRINCIPALS_PATH, "connection reset");
        transport.respond(
            Method::Get,
            SERVICE_PRINCIPALS_PATH,
            200,
            json!({ "Resources": [sp("9", "app-9", "late")] }),
        );
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let found = registrar
            .register_or_get(&RegisterIdentity::workspace_local("late"))
            .await
            .expect("recovered");
        assert_eq!(found.id, "9");
    }

    #[tokio::test]
    async fn register_failure_without_lookup_result_returns_http_error() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Post,
            SERVICE_PRINCIPALS_PATH,
            403,
            json!({ "detail": "not an admin" }),
        );
        transport.respond(Method::Get, SERVICE_PRINCIPALS_PATH, 200, json!({ "Resources": [] }));
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let err = registrar
            .register_or_get(&RegisterIdentity::external("c", "d"))
            .await
            .unwrap_err();
        match err {
            Error::Http { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("not an admin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ensure_skips_creation_when_found() {
        let transport = ScriptedTransport::new();
        transport.respond(
            Method::Get,
            SERVICE_PRINCIPALS_PATH,
            200,
            json!({ "Resources": [sp("3", "app-3", "reporter")] }),
        );
        let registrar = IdentityRegistrar::new(transport.client("t"));

        let found = registrar
            .ensure(&RegisterIdentity::workspace_local("reporter"))
            .await
            .expect("found");
        assert_eq!(found.id, "3");
        assert_eq!(transport.count(Method::Post, SERVICE_PRINCIPALS_PATH), 0);
    }
}
