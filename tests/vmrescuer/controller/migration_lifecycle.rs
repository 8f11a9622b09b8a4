use vmrescuer::vmrescuer::api::types::MigrationPhase;
use vmrescuer::vmrescuer::controller::migration::{MigrationError, LABEL_VMI_NAME};
use vmrescuer::vmrescuer::k8s::store::{ListFilter, PatchType, StoreError};
use vmrescuer::vmrescuer::test_support::seeded_manager;

#[test]
fn rescue_flow_runs_to_completion_and_allows_a_second_attempt() {
    let (_store, manager) = seeded_manager(&["vm-a"]);

    let request = manager.create("vm-a").expect("create");
    let name = request.metadata.name.clone().expect("named");
    assert_eq!(name, "migrate-vm-a");
    assert_eq!(request.phase(), MigrationPhase::Pending);

    let mut running = manager.get(&name, None).expect("fetch");
    running.status.as_mut().expect("status").phase = Some(MigrationPhase::Running);
    let running = manager.update_status(&running).expect("to running");
    assert_eq!(running.phase(), MigrationPhase::Running);

    let mut succeeded = manager.get(&name, None).expect("fetch");
    succeeded.status.as_mut().expect("status").phase = Some(MigrationPhase::Succeeded);
    let succeeded = manager.update_status(&succeeded).expect("to succeeded");
    assert_eq!(succeeded.phase(), MigrationPhase::Succeeded);

    let retry = manager.create("vm-a").expect("second rescue");
    assert_eq!(retry.phase(), MigrationPhase::Pending);

    let history = manager
        .list(&ListFilter::namespaced("default").with_label(LABEL_VMI_NAME, "vm-a"))
        .expect("list");
    assert_eq!(history.items.len(), 2);
    let phases: Vec<MigrationPhase> = history.items.iter().map(|item| item.phase()).collect();
    assert!(phases.contains(&MigrationPhase::Succeeded));
    assert!(phases.contains(&MigrationPhase::Pending));
}

#[test]
fn stale_resource_version_conflicts_and_leaves_the_object_unchanged() {
    let (_store, manager) = seeded_manager(&["vm-a"]);

    let request = manager.create("vm-a").expect("create");
    let name = request.metadata.name.clone().expect("named");

    let mut fresh = manager.get(&name, None).expect("fetch");
    let stale_version = fresh.metadata.resource_version.clone();
    fresh.status.as_mut().expect("status").phase = Some(MigrationPhase::Running);
    manager.update_status(&fresh).expect("to running");

    let mut stale = manager.get(&name, None).expect("fetch");
    stale.metadata.resource_version = stale_version;
    stale.status.as_mut().expect("status").phase = Some(MigrationPhase::Failed);
    let err = manager.update_status(&stale).expect_err("stale write");
    match err {
        MigrationError::Store(StoreError::Conflict(_)) => {}
        other => panic!("expected conflict, got: {other}"),
    }

    let current = manager.get(&name, None).expect("fetch");
    assert_eq!(current.phase(), MigrationPhase::Running, "object unchanged");
}

#[test]
fn terminal_phases_absorb_status_writes() {
    let (_store, manager) = seeded_manager(&["vm-a"]);

    let request = manager.create("vm-a").expect("create");
    let name = request.metadata.name.clone().expect("named");

    let mut succeeded = manager.get(&name, None).expect("fetch");
    succeeded.status.as_mut().expect("status").phase = Some(MigrationPhase::Succeeded);
    manager.update_status(&succeeded).expect("to succeeded");

    let mut backwards = manager.get(&name, None).expect("fetch");
    backwards.status.as_mut().expect("status").phase = Some(MigrationPhase::Running);
    let err = manager.update_status(&backwards).expect_err("absorbing");
    match err {
        MigrationError::InvalidTransition { from, to } => {
            assert_eq!(from, MigrationPhase::Succeeded);
            assert_eq!(to, MigrationPhase::Running);
        }
        other => panic!("expected invalid transition, got: {other}"),
    }

    // Re-asserting the terminal phase is an idempotent no-op write.
    let mut reassert = manager.get(&name, None).expect("fetch");
    reassert.status.as_mut().expect("status").phase = Some(MigrationPhase::Succeeded);
    manager.update_status(&reassert).expect("idempotent rewrite");
}

#[test]
fn delete_is_background_and_passes_not_found_through() {
    let (_store, manager) = seeded_manager(&["vm-a"]);

    let request = manager.create("vm-a").expect("create");
    let name = request.metadata.name.clone().expect("named");

    manager.delete(&name, None).expect("delete");
    match manager.get(&name, None).expect_err("gone") {
        MigrationError::Store(StoreError::NotFound(_)) => {}
        other => panic!("expected not found, got: {other}"),
    }

    match manager.delete(&name, None).expect_err("second delete") {
        MigrationError::Store(StoreError::NotFound(_)) => {}
        other => panic!("expected the store's own not found, got: {other}"),
    }
}

#[test]
fn patch_status_records_a_target_node_hint() {
    let (_store, manager) = seeded_manager(&["vm-a"]);

    let request = manager.create("vm-a").expect("create");
    let name = request.metadata.name.clone().expect("named");

    let patched = manager
        .patch_status(
            &name,
            None,
            PatchType::Merge,
            br#"{"targetNode": "node-b"}"#,
        )
        .expect("patch status");

    let status = patched.status.expect("status");
    assert_eq!(status.target_node.as_deref(), Some("node-b"));
    assert_eq!(status.phase, Some(MigrationPhase::Pending), "phase untouched");
    assert_eq!(status.vmi, "vm-a");
}

#[test]
fn patch_status_respects_the_phase_state_machine() {
    let (_store, manager) = seeded_manager(&["vm-a"]);

    let request = manager.create("vm-a").expect("create");
    let name = request.metadata.name.clone().expect("named");

    let mut succeeded = manager.get(&name, None).expect("fetch");
    succeeded.status.as_mut().expect("status").phase = Some(MigrationPhase::Succeeded);
    manager.update_status(&succeeded).expect("to succeeded");

    let err = manager
        .patch_status(&name, None, PatchType::Merge, br#"{"phase": "Running"}"#)
        .expect_err("terminal absorbs patches too");
    match err {
        MigrationError::InvalidTransition { from, to } => {
            assert_eq!(from, MigrationPhase::Succeeded);
            assert_eq!(to, MigrationPhase::Running);
        }
        other => panic!("expected invalid transition, got: {other}"),
    }
}

#[test]
fn patch_cannot_rewrite_the_migration_target() {
    let (_store, manager) = seeded_manager(&["vm-a"]);

    let request = manager.create("vm-a").expect("create");
    let name = request.metadata.name.clone().expect("named");

    let err = manager
        .patch(
            &name,
            None,
            PatchType::Merge,
            br#"{"spec": {"vmiName": "vm-b"}}"#,
        )
        .expect_err("spec is immutable");
    match err {
        MigrationError::Invalid(msg) => assert!(msg.contains("immutable"), "{msg}"),
        other => panic!("expected invalid, got: {other}"),
    }

    // Metadata stays patchable.
    let patched = manager
        .patch(
            &name,
            None,
            PatchType::Merge,
            br#"{"metadata": {"annotations": {"vmrescuer.io/reason": "node-drain"}}}"#,
        )
        .expect("annotate");
    assert_eq!(
        patched
            .metadata
            .annotations
            .get("vmrescuer.io/reason")
            .map(String::as_str),
        Some("node-drain")
    );
    assert_eq!(patched.spec.vmi_name, "vm-a");
}
