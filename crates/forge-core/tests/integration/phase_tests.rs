//! Creation phase and phase confirmation tests.

use std::time::Duration;

use forge_core::error::AppError;
use forge_core::models::{
    EntityKind, MappingStatus, MappingType, PhaseStatus, ProcessName, ProcessStatus,
};
use forge_core::reconcile::ReconcileService;
use forge_core::traits::EntityStore;
use forge_core::EngineConfig;

use super::common::*;

fn engine(
    store: &MockStore,
    bus: &ApplyingBus,
    directory: &MockDirectory,
) -> ReconcileService<MockStore, ApplyingBus, MockExecutor, MockDirectory> {
    ReconcileService::new(
        store.clone(),
        bus.clone(),
        MockExecutor::new(),
        directory.clone(),
        EngineConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_employee_creation_phase_resolves_ids() {
    let store = MockStore::new();
    store.add_employee(employee("+911111111111", true, None));
    store.add_employee(employee("+912222222222", true, None));
    // Inactive rows are not swept.
    store.add_employee(employee("+913333333333", false, None));

    let bus = ApplyingBus::new(store.clone());
    let directory = MockDirectory::new();
    let service = engine(&store, &bus, &directory);

    let resolved = service
        .run_creation_phase(CAMPAIGN, EntityKind::Employee, "system")
        .await
        .unwrap();

    assert_eq!(resolved, 2);
    assert_eq!(store.count_unresolved_employees(CAMPAIGN).await.unwrap(), 0);
    assert_eq!(
        store.employees.lock().unwrap()[0].user_service_uuid.as_deref(),
        Some("user-+911111111111")
    );
    assert!(store
        .has_process_status(CAMPAIGN, ProcessName::EmployeeCreation, PhaseStatus::Completed)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_facility_creation_phase_resolves_ids() {
    let store = MockStore::new();
    store.add_facility(facility("Central Warehouse", true, None));

    let bus = ApplyingBus::new(store.clone());
    let directory = MockDirectory::new();
    let service = engine(&store, &bus, &directory);

    let resolved = service
        .run_creation_phase(CAMPAIGN, EntityKind::Facility, "system")
        .await
        .unwrap();

    assert_eq!(resolved, 1);
    assert_eq!(
        store.facilities.lock().unwrap()[0].facility_id.as_deref(),
        Some("fac-Central Warehouse")
    );
}

#[tokio::test]
async fn test_completed_creation_phase_is_skipped() {
    let store = MockStore::new();
    let mut status = ProcessStatus::new(CAMPAIGN, ProcessName::EmployeeCreation);
    status.status = PhaseStatus::Completed;
    store.add_status(status);
    store.add_employee(employee("+911111111111", true, None));

    let bus = ApplyingBus::new(store.clone());
    let directory = MockDirectory::new();
    let service = engine(&store, &bus, &directory);

    let resolved = service
        .run_creation_phase(CAMPAIGN, EntityKind::Employee, "system")
        .await
        .unwrap();

    assert_eq!(resolved, 0);
    assert_eq!(*directory.create_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_creation_phase_failure_is_recorded_and_escalated() {
    let store = MockStore::new();
    store.add_employee(employee("+911111111111", true, None));

    let bus = ApplyingBus::new(store.clone());
    let directory = MockDirectory::new();
    directory.set_failing();
    let service = engine(&store, &bus, &directory);

    let err = service
        .run_creation_phase(CAMPAIGN, EntityKind::Employee, "system")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PhaseFailed { .. }));
    assert!(store
        .has_process_status(CAMPAIGN, ProcessName::EmployeeCreation, PhaseStatus::Failed)
        .await
        .unwrap());
    assert_eq!(bus.submissions("campaign-failure"), 1);
}

#[tokio::test]
async fn test_await_phase_confirms_via_store_predicate() {
    let store = MockStore::new();
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::Mapped,
        Some("assoc-1"),
    ));

    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockDirectory::new());

    service.await_phase(CAMPAIGN, ProcessName::Mapping).await.unwrap();

    assert!(store
        .has_process_status(CAMPAIGN, ProcessName::Mapping, PhaseStatus::Completed)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_await_phase_short_circuits_on_completed_record() {
    let store = MockStore::new();
    let mut status = ProcessStatus::new(CAMPAIGN, ProcessName::Mapping);
    status.status = PhaseStatus::Completed;
    store.add_status(status);
    // Store predicate alone would say "not ready".
    store.add_mapping(mapping(
        "+911234567890",
        MappingType::Staff,
        "B1",
        MappingStatus::ToBeMapped,
        None,
    ));

    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockDirectory::new());

    service.await_phase(CAMPAIGN, ProcessName::Mapping).await.unwrap();
    assert_eq!(bus.submissions("update-campaign-process"), 0);
}

#[tokio::test]
async fn test_await_phase_reports_recorded_failure() {
    let store = MockStore::new();
    let mut status = ProcessStatus::new(CAMPAIGN, ProcessName::Mapping);
    status.status = PhaseStatus::Failed;
    store.add_status(status);

    let bus = ApplyingBus::new(store.clone());
    let service = engine(&store, &bus, &MockDirectory::new());

    let err = service
        .await_phase(CAMPAIGN, ProcessName::Mapping)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PhaseFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_await_phase_exhaustion_fails_the_campaign() {
    let store = MockStore::new();
    store.add_employee(employee("+911111111111", true, None));

    let bus = ApplyingBus::new(store.clone());
    let config = EngineConfig::default().with_confirmation(Duration::from_millis(1000), 3);
    let service = ReconcileService::new(
        store.clone(),
        bus.clone(),
        MockExecutor::new(),
        MockDirectory::new(),
        config,
    )
    .unwrap();

    let err = service
        .await_phase(CAMPAIGN, ProcessName::EmployeeCreation)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::PhaseFailed { .. }));
    assert!(store
        .has_process_status(CAMPAIGN, ProcessName::EmployeeCreation, PhaseStatus::Failed)
        .await
        .unwrap());
    assert_eq!(bus.submissions("campaign-failure"), 1);
}
