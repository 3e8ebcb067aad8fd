//! Entity directory client.
//!
//! HTTP client for the downstream user and facility directories,
//! implementing the engine's [`EntityDirectory`] trait. Creation is
//! idempotent on the service side: re-submitting an existing entity
//! returns its existing id, which is exactly what the resolution sweep
//! needs.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use forge_core::error::AppError;
use forge_core::models::{CampaignEmployee, CampaignFacility};
use forge_core::traits::EntityDirectory;

#[derive(Deserialize)]
struct CreatedUser {
    #[serde(rename = "mobileNumber")]
    mobile_number: String,
    #[serde(rename = "userServiceUuid")]
    user_service_uuid: String,
}

#[derive(Deserialize)]
struct CreatedUsersResponse {
    #[serde(default)]
    users: Vec<CreatedUser>,
}

#[derive(Deserialize)]
struct CreatedFacility {
    name: String,
    id: String,
}

#[derive(Deserialize)]
struct CreatedFacilitiesResponse {
    #[serde(default)]
    facilities: Vec<CreatedFacility>,
}

/// HTTP client for the downstream entity directories.
#[derive(Clone)]
pub struct EntityDirectoryClient {
    client: Client,
    base_url: Url,
    tenant_id: String,
}

impl EntityDirectoryClient {
    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new client for the given directory base URL.
    pub fn new(base_url_str: &str, tenant_id: impl Into<String>) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url_str)
            .map_err(|e| AppError::ConfigError(format!("invalid directory URL: {e}")))?;

        let client = Client::builder()
            .user_agent("campaign-forge/0.1")
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            tenant_id: tenant_id.into(),
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, AppError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| AppError::Generic(e.to_string()))?;

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        let status = response.status();
        debug!(%url, %status, "directory response");
        if !status.is_success() {
            return Err(AppError::DownstreamError {
                operation: path.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        response
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))
    }
}

impl EntityDirectory for EntityDirectoryClient {
    async fn create_employees(
        &self,
        employees: &[CampaignEmployee],
    ) -> Result<HashMap<String, String>, AppError> {
        let body = json!({
            "tenantId": self.tenant_id,
            "users": employees
                .iter()
                .map(|e| json!({
                    "name": e.name,
                    "mobileNumber": e.mobile_number,
                    "role": e.role,
                    "employeeType": e.employee_type,
                }))
                .collect::<Vec<_>>(),
        });

        let created: CreatedUsersResponse = self.post("directory/user/_create", &body).await?;
        Ok(created
            .users
            .into_iter()
            .map(|u| (u.mobile_number, u.user_service_uuid))
            .collect())
    }

    async fn create_facilities(
        &self,
        facilities: &[CampaignFacility],
    ) -> Result<HashMap<String, String>, AppError> {
        let body = json!({
            "tenantId": self.tenant_id,
            "facilities": facilities
                .iter()
                .map(|f| json!({
                    "name": f.name,
                    "usage": f.facility_usage,
                    "storageCapacity": f.storage_capacity,
                    "isPermanent": f.is_permanent,
                }))
                .collect::<Vec<_>>(),
        });

        let created: CreatedFacilitiesResponse =
            self.post("directory/facility/_create", &body).await?;
        Ok(created
            .facilities
            .into_iter()
            .map(|f| (f.name, f.id))
            .collect())
    }
}
