//! Mapping pass tests against the in-memory mocks.

use forge_core::error::AppError;
use forge_core::models::{
    facility_mapping_identifier, MappingStatus, MappingType, PhaseStatus, ProcessName,
    ProcessStatus,
};
use forge_core::reconcile::ReconcileService;
use forge_core::traits::EntityStore;
use forge_core::EngineConfig;

use super::common::*;

fn engine(
    store: &MockStore,
    bus: &ApplyingBus,
    executor: &MockExecutor,
) -> ReconcileService<MockStore, ApplyingBus, MockExecutor, MockDirectory> {
    ReconcileService::new(
        store.clone(),
        bus.clone(),
        executor.clone(),
        MockDirectory::new(),
        EngineConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_pass_maps_staff_facility_and_resource_rows() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_employee(employee("+911234567890", true, Some("user-1")));
    store.add_facility(facility("Central Warehouse", true, Some("fac-1")));

    let facility_key = facility_mapping_identifier(CAMPAIGN, "Central Warehouse");
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));
    store.add_mapping(mapping(
        &facility_key,
        MappingType::Facility,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));
    store.add_mapping(mapping(
        "PVAR-1",
        MappingType::Resource,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    let service = engine(&store, &bus, &executor);

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.mapped, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.mappings_with_status(MappingStatus::Mapped), 3);
    assert!(store
        .mappings
        .lock()
        .unwrap()
        .iter()
        .all(|m| m.mapping_code.is_some()));
    assert_eq!(executor.association_count(), 3);
}

#[tokio::test]
async fn test_duplicate_create_recovers_code_from_search() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_employee(employee("+911234567890", true, Some("user-1")));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    executor.seed_association(MappingType::Staff, "prj-1", "user-1", "assoc-existing");
    let service = engine(&store, &bus, &executor);

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.mapped, 1);
    let mappings = store.mappings.lock().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].status, MappingStatus::Mapped);
    assert_eq!(mappings[0].mapping_code.as_deref(), Some("assoc-existing"));
    // Still exactly one downstream association.
    assert_eq!(executor.association_count(), 1);
}

#[tokio::test]
async fn test_unresolved_target_is_deferred() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_employee(employee("+911234567890", true, None));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    let service = engine(&store, &bus, &executor);

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.deferred, 1);
    assert_eq!(*executor.create_calls.lock().unwrap(), 0);
    assert_eq!(store.mappings_with_status(MappingStatus::ToBeMapped), 1);
}

#[tokio::test]
async fn test_detach_deletes_downstream_association() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_employee(employee("+911234567890", true, Some("user-1")));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeDetached,
        Some("assoc-1"),
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    executor.seed_association(MappingType::Staff, "prj-1", "user-1", "assoc-1");
    let service = engine(&store, &bus, &executor);

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.detached, 1);
    assert_eq!(store.mappings_with_status(MappingStatus::Detached), 1);
    assert_eq!(executor.association_count(), 0);
}

#[tokio::test]
async fn test_detach_without_downstream_association_removes_row() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_employee(employee("+911234567890", true, Some("user-1")));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeDetached,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockExecutor::new());

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.removed, 1);
    assert_eq!(store.mapping_count(), 0);
}

#[tokio::test]
async fn test_resource_detach_never_calls_downstream() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_mapping(mapping(
        "PVAR-1",
        MappingType::Resource,
        "B1",
        MappingStatus::ToBeDetached,
        Some("assoc-1"),
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    executor.seed_association(MappingType::Resource, "prj-1", "PVAR-1", "assoc-1");
    let service = engine(&store, &bus, &executor);

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.removed, 1);
    assert_eq!(store.mapping_count(), 0);
    // The downstream association is left in place.
    assert_eq!(executor.association_count(), 1);
}

#[tokio::test]
async fn test_record_failure_is_isolated_and_escalated() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_employee(employee("+911111111111", true, Some("user-ok")));
    store.add_employee(employee("+912222222222", true, Some("user-bad")));
    store.add_mapping(mapping(
        "+911111111111",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));
    store.add_mapping(mapping(
        "+912222222222",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    executor.fail_target("user-bad");
    let service = engine(&store, &bus, &executor);

    let err = service
        .run_mapping_pass(CAMPAIGN, "system")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PhaseFailed { .. }));

    // The sibling record still completed.
    assert_eq!(store.mappings_with_status(MappingStatus::Mapped), 1);
    assert_eq!(store.mappings_with_status(MappingStatus::Failed), 1);
    assert_eq!(bus.submissions("campaign-failure"), 1);
    assert!(store
        .has_process_status(CAMPAIGN, ProcessName::Mapping, PhaseStatus::Failed)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_completed_mapping_phase_not_rerun() {
    let store = MockStore::new();
    let mut status = ProcessStatus::new(CAMPAIGN, ProcessName::Mapping);
    status.status = PhaseStatus::Completed;
    store.add_status(status);
    store.add_project(project("B1", Some("prj-1")));
    store.add_employee(employee("+911234567890", true, Some("user-1")));
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    let service = engine(&store, &bus, &executor);

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.total(), 0);
    assert_eq!(*executor.create_calls.lock().unwrap(), 0);
    assert_eq!(store.mappings_with_status(MappingStatus::ToBeMapped), 1);
}

#[tokio::test]
async fn test_terminal_rows_are_never_touched() {
    let store = MockStore::new();
    store.add_project(project("B1", Some("prj-1")));
    store.add_mapping(mapping(
        "+911111111111",
        MappingType::Staff,
        "B1",
        MappingStatus::Mapped,
        Some("assoc-1"),
    ));
    store.add_mapping(mapping(
        "+912222222222",
        MappingType::Staff,
        "B1",
        MappingStatus::Detached,
        Some("assoc-2"),
    ));
    store.add_mapping(mapping(
        "+913333333333",
        MappingType::Staff,
        "B1",
        MappingStatus::Failed,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let executor = MockExecutor::new();
    let service = engine(&store, &bus, &executor);

    let stats = service.run_mapping_pass(CAMPAIGN, "system").await.unwrap();

    assert_eq!(stats.skipped, 3);
    assert_eq!(stats.mapped + stats.detached + stats.removed + stats.failed, 0);
    assert_eq!(*executor.create_calls.lock().unwrap(), 0);
    assert_eq!(bus.submissions("update-campaign-mappings"), 0);
}
