//! Domain types for campaign resource reconciliation.
//!
//! This module provides the persistent records the engine reconciles
//! (employees, facilities, mappings, projects, process statuses) together
//! with the upload-row types produced by sheet ingestion.
//!
//! # Mapping lifecycle
//!
//! Mapping rows flow through these states:
//! ```text
//! toBeMapped → mapped
//!      ↓
//!   failed
//!
//! toBeDetached → detached
//!      ↓
//!   failed
//! ```
//!
//! `mapped`, `detached` and `failed` are terminal; a fresh reconciliation
//! diff may re-open a cycle by flipping a `detached` row back to
//! `toBeMapped`, but no transition ever mutates a terminal row in place
//! during a mapping pass.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator for composite facility mapping identifiers.
const FACILITY_KEY_SEPARATOR: &str = "!#!";

// =============================================================================
// Usage and entity kinds
// =============================================================================

/// Desired usage of an uploaded row within the campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    /// The row should participate in the campaign.
    Active,
    /// The row should be withdrawn from the campaign.
    Inactive,
}

impl UsageStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, UsageStatus::Active)
    }
}

/// Which kind of campaign record an upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Employee,
    Facility,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Employee => "employee",
            EntityKind::Facility => "facility",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Mapping status and type
// =============================================================================

/// Status of a campaign mapping row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingStatus {
    /// Awaiting a downstream association call.
    #[serde(rename = "toBeMapped")]
    ToBeMapped,
    /// Downstream association confirmed; `mapping_code` is set.
    #[serde(rename = "mapped")]
    Mapped,
    /// Awaiting downstream dissociation.
    #[serde(rename = "toBeDetached")]
    ToBeDetached,
    /// Downstream association removed.
    #[serde(rename = "detached")]
    Detached,
    /// The downstream call failed permanently.
    #[serde(rename = "failed")]
    Failed,
}

impl MappingStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::ToBeMapped => "toBeMapped",
            MappingStatus::Mapped => "mapped",
            MappingStatus::ToBeDetached => "toBeDetached",
            MappingStatus::Detached => "detached",
            MappingStatus::Failed => "failed",
        }
    }

    /// Returns true if the status is terminal for a mapping pass.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MappingStatus::Mapped | MappingStatus::Detached | MappingStatus::Failed
        )
    }
}

/// Error type for parsing MappingStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMappingStatusError(String);

impl std::fmt::Display for ParseMappingStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid mapping status: {}", self.0)
    }
}

impl std::error::Error for ParseMappingStatusError {}

impl std::str::FromStr for MappingStatus {
    type Err = ParseMappingStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toBeMapped" => Ok(MappingStatus::ToBeMapped),
            "mapped" => Ok(MappingStatus::Mapped),
            "toBeDetached" => Ok(MappingStatus::ToBeDetached),
            "detached" => Ok(MappingStatus::Detached),
            "failed" => Ok(MappingStatus::Failed),
            _ => Err(ParseMappingStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a mapping row associates with a campaign project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingType {
    /// Staff association (employee ↔ project).
    Staff,
    /// Facility association (warehouse/health facility ↔ project).
    Facility,
    /// Resource association (product variant ↔ project).
    Resource,
}

impl MappingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Staff => "staff",
            MappingType::Facility => "facility",
            MappingType::Resource => "resource",
        }
    }
}

/// Error type for parsing MappingType from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMappingTypeError(String);

impl std::fmt::Display for ParseMappingTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid mapping type: {}", self.0)
    }
}

impl std::error::Error for ParseMappingTypeError {}

impl std::str::FromStr for MappingType {
    type Err = ParseMappingTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(MappingType::Staff),
            "facility" => Ok(MappingType::Facility),
            "resource" => Ok(MappingType::Resource),
            _ => Err(ParseMappingTypeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for MappingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Process tracking
// =============================================================================

/// Named phase of a campaign build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessName {
    #[serde(rename = "employeeCreation")]
    EmployeeCreation,
    #[serde(rename = "facilityCreation")]
    FacilityCreation,
    #[serde(rename = "projectCreation")]
    ProjectCreation,
    #[serde(rename = "mapping")]
    Mapping,
}

impl ProcessName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessName::EmployeeCreation => "employeeCreation",
            ProcessName::FacilityCreation => "facilityCreation",
            ProcessName::ProjectCreation => "projectCreation",
            ProcessName::Mapping => "mapping",
        }
    }
}

impl std::fmt::Display for ProcessName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a campaign phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-campaign, per-phase progress record.
///
/// The tracker treats writes as last-write-wins; `check_if_*` reads are
/// simple existence predicates on (campaign, process, status).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub id: Uuid,
    pub campaign_number: String,
    pub process_name: ProcessName,
    pub status: PhaseStatus,
    /// Error detail recorded when the phase fails.
    pub error_message: Option<String>,
    pub created_time: i64,
    pub last_modified_time: i64,
}

impl ProcessStatus {
    pub fn new(campaign_number: impl Into<String>, process_name: ProcessName) -> Self {
        let now = epoch_millis();
        Self {
            id: Uuid::new_v4(),
            campaign_number: campaign_number.into(),
            process_name,
            status: PhaseStatus::Pending,
            error_message: None,
            created_time: now,
            last_modified_time: now,
        }
    }
}

// =============================================================================
// Audit details
// =============================================================================

/// Creation/modification audit fields shared by all campaign records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    pub created_by: String,
    pub last_modified_by: String,
    pub created_time: i64,
    pub last_modified_time: i64,
}

impl AuditDetails {
    /// Fresh audit details for a record created now by `user`.
    pub fn new(user: impl Into<String>) -> Self {
        let user = user.into();
        let now = epoch_millis();
        Self {
            created_by: user.clone(),
            last_modified_by: user,
            created_time: now,
            last_modified_time: now,
        }
    }

    /// Record a modification by `user` at the current time.
    pub fn touch(&mut self, user: impl Into<String>) {
        self.last_modified_by = user.into();
        self.last_modified_time = epoch_millis();
    }
}

/// Current time as epoch milliseconds, the store's timestamp format.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Campaign records
// =============================================================================

/// A campaign staff member, keyed by mobile number within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignEmployee {
    pub id: Uuid,
    pub campaign_number: String,
    pub mobile_number: String,
    pub name: String,
    pub role: String,
    /// Employment type from the upload ("permanent"/"temporary").
    pub employee_type: String,
    /// Downstream user id, filled in once the creation phase resolves it.
    pub user_service_uuid: Option<String>,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditDetails,
}

/// A campaign facility, keyed by name within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignFacility {
    pub id: Uuid,
    pub campaign_number: String,
    pub name: String,
    pub facility_usage: Option<String>,
    pub storage_capacity: Option<i64>,
    pub is_permanent: bool,
    /// Downstream facility id, filled in once the creation phase resolves it.
    pub facility_id: Option<String>,
    pub is_active: bool,
    #[serde(flatten)]
    pub audit: AuditDetails,
}

/// A mapping between a campaign entity and a boundary's project.
///
/// `mapping_identifier` is the entity's natural key: the mobile number for
/// staff, the composite `{campaign}!#!{name}` key for facilities, and the
/// product variant id for resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMapping {
    pub id: Uuid,
    pub campaign_number: String,
    pub mapping_identifier: String,
    pub mapping_type: MappingType,
    pub boundary_code: String,
    pub status: MappingStatus,
    /// Downstream association id. Set if and only if the row reached
    /// `mapped`; detached rows keep the code of the association they had.
    pub mapping_code: Option<String>,
    #[serde(flatten)]
    pub audit: AuditDetails,
}

impl CampaignMapping {
    /// Fresh `toBeMapped` row for the given pair.
    pub fn to_be_mapped(
        campaign_number: impl Into<String>,
        mapping_identifier: impl Into<String>,
        mapping_type: MappingType,
        boundary_code: impl Into<String>,
        user: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_number: campaign_number.into(),
            mapping_identifier: mapping_identifier.into(),
            mapping_type,
            boundary_code: boundary_code.into(),
            status: MappingStatus::ToBeMapped,
            mapping_code: None,
            audit: AuditDetails::new(user),
        }
    }

    /// The (identifier, boundary) pair this row covers.
    pub fn pair(&self) -> (&str, &str) {
        (&self.mapping_identifier, &self.boundary_code)
    }
}

/// A downstream project created for one campaign boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProject {
    pub id: Uuid,
    pub campaign_number: String,
    pub boundary_code: String,
    pub parent_boundary_code: Option<String>,
    /// Downstream project id, absent until project creation confirms.
    pub project_id: Option<String>,
    /// Opaque enrichment payload (delivery targets and the like), owned by
    /// the project creation flow. Carried through untouched.
    #[serde(default)]
    pub additional_details: Option<serde_json::Value>,
    #[serde(flatten)]
    pub audit: AuditDetails,
}

// =============================================================================
// Upload rows
// =============================================================================

/// An employee row parsed from an upload sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRow {
    pub mobile_number: String,
    pub name: String,
    pub role: String,
    pub employee_type: String,
    pub usage: UsageStatus,
    /// Boundary codes the employee serves, already normalized.
    pub jurisdictions: Vec<String>,
}

/// A facility row parsed from an upload sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityRow {
    pub name: String,
    pub facility_usage: Option<String>,
    pub storage_capacity: Option<i64>,
    pub is_permanent: bool,
    pub usage: UsageStatus,
    /// Boundary codes the facility serves, already normalized.
    pub boundaries: Vec<String>,
}

/// Shared view of an upload row used by the reconciliation differ.
pub trait UploadRecord {
    /// Natural key of the row within its campaign.
    fn natural_key(&self) -> &str;
    /// Desired usage state.
    fn usage(&self) -> UsageStatus;
    /// Normalized boundary codes this row should be mapped to.
    fn boundaries(&self) -> &[String];
}

impl UploadRecord for EmployeeRow {
    fn natural_key(&self) -> &str {
        &self.mobile_number
    }

    fn usage(&self) -> UsageStatus {
        self.usage
    }

    fn boundaries(&self) -> &[String] {
        &self.jurisdictions
    }
}

impl UploadRecord for FacilityRow {
    fn natural_key(&self) -> &str {
        &self.name
    }

    fn usage(&self) -> UsageStatus {
        self.usage
    }

    fn boundaries(&self) -> &[String] {
        &self.boundaries
    }
}

/// Shared view of a stored campaign record used by the reconciliation differ.
pub trait StoredRecord {
    fn natural_key(&self) -> &str;
    fn is_active(&self) -> bool;
}

impl StoredRecord for CampaignEmployee {
    fn natural_key(&self) -> &str {
        &self.mobile_number
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl StoredRecord for CampaignFacility {
    fn natural_key(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

// =============================================================================
// Key helpers
// =============================================================================

/// Composite mapping identifier for a facility.
///
/// Facility names are only unique within a campaign, so the mapping
/// identifier prefixes the campaign number with a `!#!` separator.
pub fn facility_mapping_identifier(campaign_number: &str, facility_name: &str) -> String {
    format!("{campaign_number}{FACILITY_KEY_SEPARATOR}{facility_name}")
}

/// Extracts the facility name from a composite mapping identifier.
///
/// Returns `None` when the identifier does not carry the separator.
pub fn facility_name_from_identifier(identifier: &str) -> Option<&str> {
    identifier
        .split_once(FACILITY_KEY_SEPARATOR)
        .map(|(_, name)| name)
}

/// Splits a raw jurisdiction cell into normalized boundary codes.
///
/// Splits on commas, trims whitespace, drops empties, and de-duplicates
/// while preserving first-seen order.
pub fn normalize_boundaries(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .filter(|code| seen.insert(code.to_string()))
        .map(str::to_string)
        .collect()
}
