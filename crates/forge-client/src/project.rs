//! Project service client.
//!
//! HTTP client for the downstream project service's association endpoints
//! (staff, facility, resource), implementing the engine's
//! [`MappingExecutor`] trait. The service speaks one envelope per
//! association kind (`ProjectStaff`, `ProjectFacility`, `ProjectResource`)
//! and reports domain rejections in an `Errors` array; a
//! `DUPLICATE_ENTITY` rejection is surfaced as [`CreateOutcome::Duplicate`]
//! rather than an error.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use forge_core::error::AppError;
use forge_core::models::MappingType;
use forge_core::traits::{CreateOutcome, MappingExecutor};

/// HTTP client for the downstream project service.
#[derive(Clone)]
pub struct ProjectServiceClient {
    client: Client,
    base_url: Url,
    tenant_id: String,
}

impl ProjectServiceClient {
    /// Request timeout for association calls.
    const TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new client for the given project service base URL.
    pub fn new(base_url_str: &str, tenant_id: impl Into<String>) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url_str)
            .map_err(|e| AppError::ConfigError(format!("invalid project service URL: {e}")))?;

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

    fn endpoint(&self, mapping_type: MappingType, action: &str) -> Result<Url, AppError> {
        let path = format!("project/{}/v1/{action}", mapping_type.as_str());
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Generic(e.to_string()))
    }

    fn association_body(
        &self,
        mapping_type: MappingType,
        project_id: &str,
        target_id: &str,
    ) -> Value {
        json!({
            envelope_key(mapping_type): {
                "tenantId": self.tenant_id,
                "projectId": project_id,
                target_field(mapping_type): target_id,
            }
        })
    }

    async fn post(&self, url: Url, body: &Value) -> Result<Value, AppError> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        debug!(%url, %status, "project service response");
        Ok(payload)
    }
}

/// Envelope key used by the service for this association kind.
fn envelope_key(mapping_type: MappingType) -> &'static str {
    match mapping_type {
        MappingType::Staff => "ProjectStaff",
        MappingType::Facility => "ProjectFacility",
        MappingType::Resource => "ProjectResource",
    }
}

/// Body field naming the association target for this kind.
fn target_field(mapping_type: MappingType) -> &'static str {
    match mapping_type {
        MappingType::Staff => "userId",
        MappingType::Facility => "facilityId",
        MappingType::Resource => "productVariantId",
    }
}

/// Error entries from a response body, if any.
fn response_errors(payload: &Value) -> Vec<String> {
    payload["Errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| {
                    e["code"]
                        .as_str()
                        .or_else(|| e["message"].as_str())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// True when the response rejects the create as a duplicate.
fn is_duplicate(payload: &Value) -> bool {
    response_errors(payload)
        .iter()
        .any(|e| e.contains("DUPLICATE_ENTITY"))
}

/// Association id from a create response (`{Envelope: {id}}`).
fn created_id(payload: &Value, mapping_type: MappingType) -> Option<String> {
    payload[envelope_key(mapping_type)]["id"]
        .as_str()
        .map(str::to_string)
}

/// First association id from a search response (`{Envelope: [{id}, ...]}`).
fn searched_id(payload: &Value, mapping_type: MappingType) -> Option<String> {
    payload[envelope_key(mapping_type)]
        .as_array()
        .and_then(|list| list.first())
        .and_then(|entry| entry["id"].as_str())
        .map(str::to_string)
}

impl MappingExecutor for ProjectServiceClient {
    async fn create_association(
        &self,
        mapping_type: MappingType,
        project_id: &str,
        target_id: &str,
    ) -> Result<CreateOutcome, AppError> {
        let url = self.endpoint(mapping_type, "_create")?;
        let body = self.association_body(mapping_type, project_id, target_id);
        let payload = self.post(url, &body).await?;

        if is_duplicate(&payload) {
            return Ok(CreateOutcome::Duplicate);
        }
        let errors = response_errors(&payload);
        if !errors.is_empty() {
            return Err(AppError::DownstreamError {
                operation: format!("{} association create", mapping_type),
                message: errors.join("; "),
            });
        }
        created_id(&payload, mapping_type)
            .map(CreateOutcome::Created)
            .ok_or_else(|| AppError::DownstreamError {
                operation: format!("{} association create", mapping_type),
                message: "response carried no association id".to_string(),
            })
    }

    async fn search_association(
        &self,
        mapping_type: MappingType,
        project_id: &str,
        target_id: &str,
    ) -> Result<Option<String>, AppError> {
        let url = self.endpoint(mapping_type, "_search")?;
        let body = self.association_body(mapping_type, project_id, target_id);
        let payload = self.post(url, &body).await?;

        let errors = response_errors(&payload);
        if !errors.is_empty() {
            return Err(AppError::DownstreamError {
                operation: format!("{} association search", mapping_type),
                message: errors.join("; "),
            });
        }
        Ok(searched_id(&payload, mapping_type))
    }

    async fn delete_association(
        &self,
        mapping_type: MappingType,
        mapping_code: &str,
    ) -> Result<(), AppError> {
        let url = self.endpoint(mapping_type, "_delete")?;
        let body = json!({
            envelope_key(mapping_type): {
                "id": mapping_code,
                "tenantId": self.tenant_id,
            }
        });
        let payload = self.post(url, &body).await?;

        let errors = response_errors(&payload);
        if !errors.is_empty() {
            return Err(AppError::DownstreamError {
                operation: format!("{} association delete", mapping_type),
                message: errors.join("; "),
            });
        }
        Ok(())
    }
}
