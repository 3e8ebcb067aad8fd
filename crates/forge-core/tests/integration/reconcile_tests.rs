//! Upload reconciliation tests against the in-memory mocks.

use forge_core::models::{
    EmployeeRow, FacilityRow, MappingStatus, MappingType, UsageStatus,
};
use forge_core::reconcile::{EntityUpload, ReconcileService};
use forge_core::EngineConfig;

use super::common::*;

fn engine(
    store: &MockStore,
    bus: &ApplyingBus,
    executor: &MockExecutor,
    directory: &MockDirectory,
) -> ReconcileService<MockStore, ApplyingBus, MockExecutor, MockDirectory> {
    ReconcileService::new(
        store.clone(),
        bus.clone(),
        executor.clone(),
        directory.clone(),
        EngineConfig::default(),
    )
    .unwrap()
}

fn employee_row(mobile: &str, usage: UsageStatus, jurisdictions: &[&str]) -> EmployeeRow {
    EmployeeRow {
        mobile_number: mobile.to_string(),
        name: "Asha Worker".to_string(),
        role: "DIST_ADMIN".to_string(),
        employee_type: "temporary".to_string(),
        usage,
        jurisdictions: jurisdictions.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_first_upload_creates_records_and_mappings() {
    let store = MockStore::new();
    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new(), &MockDirectory::new());

    let upload = EntityUpload::Employees(vec![
        employee_row("+911234567890", UsageStatus::Active, &["B1", "B2"]),
        employee_row("+919999999999", UsageStatus::Inactive, &["B1"]),
    ]);

    let summary = service
        .reconcile_and_persist(CAMPAIGN, &upload, "uploader")
        .await
        .unwrap();

    assert_eq!(summary.new_active, 1);
    assert_eq!(summary.new_inactive, 1);
    assert_eq!(summary.mappings_created, 2);
    assert_eq!(summary.mappings_detach_requested, 0);

    assert_eq!(store.employees.lock().unwrap().len(), 2);
    assert_eq!(store.mapping_count(), 2);
    assert_eq!(store.mappings_with_status(MappingStatus::ToBeMapped), 2);
}

#[tokio::test]
async fn test_reconcile_is_idempotent_once_store_caught_up() {
    let store = MockStore::new();
    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new(), &MockDirectory::new());

    let upload = EntityUpload::Employees(vec![employee_row(
        "+911234567890",
        UsageStatus::Active,
        &["B1", "B2"],
    )]);

    let first = service
        .reconcile_and_persist(CAMPAIGN, &upload, "uploader")
        .await
        .unwrap();
    assert!(!first.is_empty());
    let saves_after_first = bus.submissions("save-campaign-employees");

    let second = service
        .reconcile_and_persist(CAMPAIGN, &upload, "uploader")
        .await
        .unwrap();
    assert!(second.is_empty());
    assert_eq!(second.bus_submissions, 0);
    assert_eq!(bus.submissions("save-campaign-employees"), saves_after_first);
    assert_eq!(store.mapping_count(), 2);
}

#[tokio::test]
async fn test_chunked_dispatch_of_large_upload() {
    let store = MockStore::new();
    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new(), &MockDirectory::new());

    let rows: Vec<EmployeeRow> = (0..250)
        .map(|i| employee_row(&format!("+9112345{i:05}"), UsageStatus::Active, &[]))
        .collect();
    let upload = EntityUpload::Employees(rows);

    let summary = service
        .reconcile_and_persist(CAMPAIGN, &upload, "uploader")
        .await
        .unwrap();

    assert_eq!(summary.new_active, 250);
    assert_eq!(bus.submissions("save-campaign-employees"), 3);
    assert_eq!(
        bus.chunk_sizes("save-campaign-employees", "campaignEmployees"),
        vec![100, 100, 50]
    );
}

#[tokio::test]
async fn test_inactive_reupload_deactivates_and_detaches() {
    let store = MockStore::new();
    store.add_employee(employee("+911234567890", true, None));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::Mapped,
        Some("assoc-1"),
    ));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B2",
        MappingStatus::ToBeMapped,
        None,
    ));
    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new(), &MockDirectory::new());

    let upload = EntityUpload::Employees(vec![employee_row(
        "+911234567890",
        UsageStatus::Inactive,
        &["B1", "B2"],
    )]);

    let summary = service
        .reconcile_and_persist(CAMPAIGN, &upload, "uploader")
        .await
        .unwrap();

    assert_eq!(summary.deactivated, 1);
    assert_eq!(summary.mappings_detach_requested, 2);
    assert!(!store.employees.lock().unwrap()[0].is_active);
    assert_eq!(store.mappings_with_status(MappingStatus::ToBeDetached), 2);
}

#[tokio::test]
async fn test_detached_pair_reopens_on_active_reupload() {
    let store = MockStore::new();
    store.add_employee(employee("+911234567890", true, None));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::Detached,
        Some("assoc-old"),
    ));
    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new(), &MockDirectory::new());

    let upload = EntityUpload::Employees(vec![employee_row(
        "+911234567890",
        UsageStatus::Active,
        &["B1"],
    )]);

    let summary = service
        .reconcile_and_persist(CAMPAIGN, &upload, "uploader")
        .await
        .unwrap();

    assert_eq!(summary.mappings_reopened, 1);
    assert_eq!(summary.mappings_created, 0);
    let mappings = store.mappings.lock().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].status, MappingStatus::ToBeMapped);
    assert!(mappings[0].mapping_code.is_none());
}

#[tokio::test]
async fn test_facility_upload_uses_composite_identifier() {
    let store = MockStore::new();
    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new(), &MockDirectory::new());

    let upload = EntityUpload::Facilities(vec![FacilityRow {
        name: "Central Warehouse".to_string(),
        facility_usage: Some("storage".to_string()),
        storage_capacity: Some(500),
        is_permanent: true,
        usage: UsageStatus::Active,
        boundaries: vec!["B1".to_string()],
    }]);

    service
        .reconcile_and_persist(CAMPAIGN, &upload, "uploader")
        .await
        .unwrap();

    let mappings = store.mappings.lock().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(
        mappings[0].mapping_identifier,
        "CMP-2024-000001!#!Central Warehouse"
    );
    assert_eq!(mappings[0].mapping_type, MappingType::Facility);
}

#[tokio::test]
async fn test_seed_resource_mappings_skips_existing_pairs() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_project(project("B2", Some("prj-2")));
    store.add_mapping(mapping(
        "PVAR-1",
        MappingType::Resource,
        "B1",
        MappingStatus::Mapped,
        Some("assoc-1"),
    ));
    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new(), &MockDirectory::new());

    let created = service
        .seed_resource_mappings(
            CAMPAIGN,
            &["PVAR-1".to_string(), "PVAR-2".to_string()],
            "system",
        )
        .await
        .unwrap();

    assert_eq!(created, 3);
    assert_eq!(store.mapping_count(), 4);
    assert_eq!(store.mappings_with_status(MappingStatus::ToBeMapped), 3);
}
