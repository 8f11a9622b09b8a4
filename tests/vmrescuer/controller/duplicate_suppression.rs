use std::sync::Arc;

use vmrescuer::vmrescuer::api::types::{MigrationPhase, VirtualMachineInstanceMigration};
use vmrescuer::vmrescuer::controller::migration::{
    MigrationError, MigrationRequestManager, LABEL_VMI_NAME,
};
use vmrescuer::vmrescuer::controller::registry::{ActiveMigration, MigrationRegistry};
use vmrescuer::vmrescuer::k8s::store::{ListFilter, MigrationStore, StoreError, VmiSource};
use vmrescuer::vmrescuer::test_support::{seeded_manager, StaticVmiSource, UnavailableStore};

#[test]
fn second_create_reports_duplicate_with_first_request() {
    let (store, manager) = seeded_manager(&["vm-a"]);

    let first = manager.create("vm-a").expect("first create");
    assert_eq!(first.metadata.name.as_deref(), Some("migrate-vm-a"));
    assert_eq!(first.phase(), MigrationPhase::Pending);
    assert_eq!(
        first.metadata.labels.get(LABEL_VMI_NAME).map(String::as_str),
        Some("vm-a")
    );

    let err = manager.create("vm-a").expect_err("duplicate rejected");
    match &err {
        MigrationError::Duplicate { existing } => {
            assert_eq!(existing.metadata.name, first.metadata.name);
            assert_eq!(existing.observed_vmi(), "vm-a");
        }
        other => panic!("expected duplicate, got: {other}"),
    }
    assert!(err.is_duplicate());

    let stored = store.list(&ListFilter::all()).expect("list");
    assert_eq!(stored.items.len(), 1, "exactly one request in the store");
    assert_eq!(stored.items[0].observed_vmi(), "vm-a");
}

#[test]
fn terminal_history_never_blocks_a_new_request() {
    let (store, manager) = seeded_manager(&["vm-a"]);

    let first = manager.create("vm-a").expect("first create");
    let name = first.metadata.name.clone().expect("named");

    let mut running = manager.get(&name, None).expect("fetch");
    running.status.as_mut().expect("status").phase = Some(MigrationPhase::Running);
    manager.update_status(&running).expect("to running");

    let mut succeeded = manager.get(&name, None).expect("fetch");
    succeeded.status.as_mut().expect("status").phase = Some(MigrationPhase::Succeeded);
    manager.update_status(&succeeded).expect("to succeeded");

    let second = manager.create("vm-a").expect("terminal history does not block");
    assert_eq!(second.metadata.name.as_deref(), Some("migrate-vm-a-1"));
    assert_eq!(second.phase(), MigrationPhase::Pending);

    let stored = store.list(&ListFilter::all()).expect("list");
    assert_eq!(stored.items.len(), 2);
}

#[test]
fn active_request_for_another_vmi_squatting_the_name_is_skipped() {
    let (store, manager) = seeded_manager(&["vm-a", "vm-b"]);

    // vm-b's request occupies vm-a's deterministic name.
    let squatter =
        VirtualMachineInstanceMigration::pending("migrate-vm-a", Some("default"), "vm-b");
    store.create(squatter).expect("seed squatter");

    let created = manager.create("vm-a").expect("probe past the squatter");
    assert_eq!(created.metadata.name.as_deref(), Some("migrate-vm-a-1"));
    assert_eq!(created.observed_vmi(), "vm-a");
}

#[test]
fn exists_fails_open_while_find_active_reports_the_outage() {
    let registry = MigrationRegistry::new(Arc::new(UnavailableStore));

    let (found, request) = registry.exists("vm-a");
    assert!(!found);
    assert!(request.is_none());

    match registry.find_active("vm-a") {
        ActiveMigration::QueryFailed(StoreError::Unavailable(_)) => {}
        other => panic!("expected QueryFailed(Unavailable), got: {other:?}"),
    }
}

#[test]
fn create_fails_closed_when_the_duplicate_check_errors() {
    let manager = MigrationRequestManager::with_namespace(
        Arc::new(UnavailableStore) as Arc<dyn MigrationStore>,
        Arc::new(StaticVmiSource::new(&["vm-a"])) as Arc<dyn VmiSource>,
        "default",
    );

    let err = manager.create("vm-a").expect_err("outage must not create");
    match err {
        MigrationError::Store(StoreError::Unavailable(_)) => {}
        other => panic!("expected store outage to surface, got: {other}"),
    }
}

#[test]
fn unknown_vmi_is_rejected() {
    let (store, manager) = seeded_manager(&[]);

    let err = manager.create("ghost").expect_err("unknown vmi");
    match err {
        MigrationError::VmiNotFound(name) => assert_eq!(name, "ghost"),
        other => panic!("expected VmiNotFound, got: {other}"),
    }

    let stored = store.list(&ListFilter::all()).expect("list");
    assert!(stored.items.is_empty(), "nothing written for unknown vmi");
}
