//! PostgreSQL campaign store.
//!
//! Implements the [`EntityStore`] trait over hand-built parameterized SQL.
//! Every query is scoped by campaign number; key-list filters use
//! `= ANY($n)` and are chunked so one upload cannot produce an unbounded
//! parameter array.

use sqlx::{PgPool, Pool, Postgres};
use tracing::debug;
use uuid::Uuid;

use forge_core::error::AppError;
use forge_core::models::{
    AuditDetails, CampaignEmployee, CampaignFacility, CampaignMapping, CampaignProject,
    MappingStatus, MappingType, PhaseStatus, ProcessName, ProcessStatus,
};
use forge_core::traits::EntityStore;

/// Key-list chunk size for `ANY($n)` filters.
const KEY_CHUNK: usize = 100;

/// PostgreSQL implementation of the campaign entity store.
#[derive(Clone)]
pub struct CampaignStore {
    pool: Pool<Postgres>,
}

impl CampaignStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

/// Helper struct for deserializing employee rows from the database.
#[derive(sqlx::FromRow)]
struct EmployeeDbRow {
    id: Uuid,
    campaign_number: String,
    mobile_number: String,
    name: String,
    role: String,
    employee_type: String,
    user_service_uuid: Option<String>,
    is_active: bool,
    created_by: String,
    last_modified_by: String,
    created_time: i64,
    last_modified_time: i64,
}

impl From<EmployeeDbRow> for CampaignEmployee {
    fn from(row: EmployeeDbRow) -> Self {
        Self {
            id: row.id,
            campaign_number: row.campaign_number,
            mobile_number: row.mobile_number,
            name: row.name,
            role: row.role,
            employee_type: row.employee_type,
            user_service_uuid: row.user_service_uuid,
            is_active: row.is_active,
            audit: AuditDetails {
                created_by: row.created_by,
                last_modified_by: row.last_modified_by,
                created_time: row.created_time,
                last_modified_time: row.last_modified_time,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct FacilityDbRow {
    id: Uuid,
    campaign_number: String,
    name: String,
    facility_usage: Option<String>,
    storage_capacity: Option<i64>,
    is_permanent: bool,
    facility_id: Option<String>,
    is_active: bool,
    created_by: String,
    last_modified_by: String,
    created_time: i64,
    last_modified_time: i64,
}

impl From<FacilityDbRow> for CampaignFacility {
    fn from(row: FacilityDbRow) -> Self {
        Self {
            id: row.id,
            campaign_number: row.campaign_number,
            name: row.name,
            facility_usage: row.facility_usage,
            storage_capacity: row.storage_capacity,
            is_permanent: row.is_permanent,
            facility_id: row.facility_id,
            is_active: row.is_active,
            audit: AuditDetails {
                created_by: row.created_by,
                last_modified_by: row.last_modified_by,
                created_time: row.created_time,
                last_modified_time: row.last_modified_time,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct MappingDbRow {
    id: Uuid,
    campaign_number: String,
    mapping_identifier: String,
    mapping_type: String,
    boundary_code: String,
    status: String,
    mapping_code: Option<String>,
    created_by: String,
    last_modified_by: String,
    created_time: i64,
    last_modified_time: i64,
}

impl From<MappingDbRow> for CampaignMapping {
    fn from(row: MappingDbRow) -> Self {
        Self {
            id: row.id,
            campaign_number: row.campaign_number,
            mapping_identifier: row.mapping_identifier,
            mapping_type: row.mapping_type.parse().unwrap_or(MappingType::Staff),
            boundary_code: row.boundary_code,
            status: row.status.parse().unwrap_or(MappingStatus::ToBeMapped),
            mapping_code: row.mapping_code,
            audit: AuditDetails {
                created_by: row.created_by,
                last_modified_by: row.last_modified_by,
                created_time: row.created_time,
                last_modified_time: row.last_modified_time,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectDbRow {
    id: Uuid,
    campaign_number: String,
    boundary_code: String,
    parent_boundary_code: Option<String>,
    project_id: Option<String>,
    additional_details: Option<serde_json::Value>,
    created_by: String,
    last_modified_by: String,
    created_time: i64,
    last_modified_time: i64,
}

impl From<ProjectDbRow> for CampaignProject {
    fn from(row: ProjectDbRow) -> Self {
        Self {
            id: row.id,
            campaign_number: row.campaign_number,
            boundary_code: row.boundary_code,
            parent_boundary_code: row.parent_boundary_code,
            project_id: row.project_id,
            additional_details: row.additional_details,
            audit: AuditDetails {
                created_by: row.created_by,
                last_modified_by: row.last_modified_by,
                created_time: row.created_time,
                last_modified_time: row.last_modified_time,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProcessDbRow {
    id: Uuid,
    campaign_number: String,
    process_name: String,
    status: String,
    error_message: Option<String>,
    created_time: i64,
    last_modified_time: i64,
}

impl From<ProcessDbRow> for ProcessStatus {
    fn from(row: ProcessDbRow) -> Self {
        let process_name = match row.process_name.as_str() {
            "employeeCreation" => ProcessName::EmployeeCreation,
            "facilityCreation" => ProcessName::FacilityCreation,
            "projectCreation" => ProcessName::ProjectCreation,
            _ => ProcessName::Mapping,
        };
        let status = match row.status.as_str() {
            "completed" => PhaseStatus::Completed,
            "failed" => PhaseStatus::Failed,
            _ => PhaseStatus::Pending,
        };
        Self {
            id: row.id,
            campaign_number: row.campaign_number,
            process_name,
            status,
            error_message: row.error_message,
            created_time: row.created_time,
            last_modified_time: row.last_modified_time,
        }
    }
}

// =============================================================================
// EntityStore Trait Implementation
// =============================================================================

impl EntityStore for CampaignStore {
    async fn employees(&self, campaign_number: &str) -> Result<Vec<CampaignEmployee>, AppError> {
        let rows: Vec<EmployeeDbRow> = sqlx::query_as(
            r#"
            SELECT * FROM campaign_employees
            WHERE campaign_number = $1
            ORDER BY created_time ASC
            "#,
        )
        .bind(campaign_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn employees_by_keys(
        &self,
        campaign_number: &str,
        mobile_numbers: &[String],
    ) -> Result<Vec<CampaignEmployee>, AppError> {
        let mut out = Vec::new();
        for chunk in mobile_numbers.chunks(KEY_CHUNK) {
            let rows: Vec<EmployeeDbRow> = sqlx::query_as(
                r#"
                SELECT * FROM campaign_employees
                WHERE campaign_number = $1
                  AND mobile_number = ANY($2)
                "#,
            )
            .bind(campaign_number)
            .bind(chunk)
            .fetch_all(&self.pool)
            .await?;
            out.extend(rows.into_iter().map(Into::into));
        }
        debug!(campaign_number, keys = mobile_numbers.len(), hits = out.len(), "employee key lookup");
        Ok(out)
    }

    async fn facilities(&self, campaign_number: &str) -> Result<Vec<CampaignFacility>, AppError> {
        let rows: Vec<FacilityDbRow> = sqlx::query_as(
            r#"
            SELECT * FROM campaign_facilities
            WHERE campaign_number = $1
            ORDER BY created_time ASC
            "#,
        )
        .bind(campaign_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn facilities_by_keys(
        &self,
        campaign_number: &str,
        names: &[String],
    ) -> Result<Vec<CampaignFacility>, AppError> {
        let mut out = Vec::new();
        for chunk in names.chunks(KEY_CHUNK) {
            let rows: Vec<FacilityDbRow> = sqlx::query_as(
                r#"
                SELECT * FROM campaign_facilities
                WHERE campaign_number = $1
                  AND name = ANY($2)
                "#,
            )
            .bind(campaign_number)
            .bind(chunk)
            .fetch_all(&self.pool)
            .await?;
            out.extend(rows.into_iter().map(Into::into));
        }
        debug!(campaign_number, keys = names.len(), hits = out.len(), "facility key lookup");
        Ok(out)
    }

    async fn mappings(
        &self,
        campaign_number: &str,
        mapping_type: Option<MappingType>,
    ) -> Result<Vec<CampaignMapping>, AppError> {
        let rows: Vec<MappingDbRow> = sqlx::query_as(
            r#"
            SELECT * FROM campaign_mappings
            WHERE campaign_number = $1
              AND ($2::text IS NULL OR mapping_type = $2)
            ORDER BY created_time ASC
            "#,
        )
        .bind(campaign_number)
        .bind(mapping_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn projects(&self, campaign_number: &str) -> Result<Vec<CampaignProject>, AppError> {
        let rows: Vec<ProjectDbRow> = sqlx::query_as(
            r#"
            SELECT * FROM campaign_projects
            WHERE campaign_number = $1
            ORDER BY created_time ASC
            "#,
        )
        .bind(campaign_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_unresolved_employees(&self, campaign_number: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM campaign_employees
            WHERE campaign_number = $1
              AND is_active = TRUE
              AND user_service_uuid IS NULL
            "#,
        )
        .bind(campaign_number)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_unresolved_facilities(&self, campaign_number: &str) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM campaign_facilities
            WHERE campaign_number = $1
              AND is_active = TRUE
              AND facility_id IS NULL
            "#,
        )
        .bind(campaign_number)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn all_mappings_terminal(&self, campaign_number: &str) -> Result<bool, AppError> {
        // Three checks in one scan: nothing pending in either direction,
        // and every mapped row carries its downstream code.
        let (to_be_mapped, to_be_detached, mapped_without_code): (i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE status = 'toBeMapped'),
                    COUNT(*) FILTER (WHERE status = 'toBeDetached'),
                    COUNT(*) FILTER (WHERE status = 'mapped' AND mapping_code IS NULL)
                FROM campaign_mappings
                WHERE campaign_number = $1
                "#,
            )
            .bind(campaign_number)
            .fetch_one(&self.pool)
            .await?;

        Ok(to_be_mapped == 0 && to_be_detached == 0 && mapped_without_code == 0)
    }

    async fn process_statuses(&self, campaign_number: &str) -> Result<Vec<ProcessStatus>, AppError> {
        let rows: Vec<ProcessDbRow> = sqlx::query_as(
            r#"
            SELECT * FROM campaign_process_status
            WHERE campaign_number = $1
            ORDER BY created_time ASC
            "#,
        )
        .bind(campaign_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn has_process_status(
        &self,
        campaign_number: &str,
        process: ProcessName,
        status: PhaseStatus,
    ) -> Result<bool, AppError> {
        let found: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM campaign_process_status
            WHERE campaign_number = $1
              AND process_name = $2
              AND status = $3
            LIMIT 1
            "#,
        )
        .bind(campaign_number)
        .bind(process.as_str())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}
