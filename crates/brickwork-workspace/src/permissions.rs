//! Job access control.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use brickwork_core::{Error, JobId, Result};

use crate::jobs::JobController;

/// Permission level on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    /// View the job and its runs.
    CanView,
    /// Trigger and cancel runs.
    CanManageRun,
    /// Full control.
    CanManage,
    /// Owner.
    IsOwner,
}

impl PermissionLevel {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CanView => "CAN_VIEW",
            Self::CanManageRun => "CAN_MANAGE_RUN",
            Self::CanManage => "CAN_MANAGE",
            Self::IsOwner => "IS_OWNER",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CAN_VIEW" => Ok(Self::CanView),
            "CAN_MANAGE_RUN" => Ok(Self::CanManageRun),
            "CAN_MANAGE" => Ok(Self::CanManage),
            "IS_OWNER" => Ok(Self::IsOwner),
            other => Err(Error::InvalidInput(format!(
                "unknown permission level '{other}'"
            ))),
        }
    }
}

/// One access-control entry for a service principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlRequest {
    /// Application ID of the service principal.
    pub service_principal_name: String,
    /// Granted level.
    pub permission_level: PermissionLevel,
}

#[derive(Debug, Serialize)]
struct PermissionsPatch<'a> {
    access_control_list: &'a [AccessControlRequest],
}

impl JobController {
    /// Grants a service principal a permission level on a job.
    ///
    /// Existing grants for other principals are left alone (PATCH semantics).
    /// Returns the job's updated access-control list as sent by the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on a non-2xx answer, or a transport error.
    #[instrument(skip(self), fields(workspace = %self.client().host()))]
    pub async fn grant_permission(
        &self,
        job_id: JobId,
        service_principal_name: &str,
        level: PermissionLevel,
    ) -> Result<serde_json::Value> {
        let entries = [AccessControlRequest {
            service_principal_name: service_principal_name.to_string(),
            permission_level: level,
        }];
        let path = format!("/api/2.0/permissions/jobs/{job_id}");
        let response = self
            .client()
            .patch(
                &path,
                &PermissionsPatch {
                    access_control_list: &entries,
                },
            )
            .await?;

        if !response.is_success() {
            warn!(status = response.status, body = %response.body, "error granting permission");
        }
        let response = response.error_for_status()?;
        info!("granted job permission");
        response.json()
    }
}
