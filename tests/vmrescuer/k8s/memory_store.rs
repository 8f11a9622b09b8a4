use vmrescuer::vmrescuer::api::types::{MigrationPhase, VirtualMachineInstanceMigration};
use vmrescuer::vmrescuer::k8s::memory::InMemoryMigrationStore;
use vmrescuer::vmrescuer::k8s::store::{
    DeletionPropagation, ListFilter, MigrationStore, PatchType, StoreError,
};

fn pending(name: &str, namespace: Option<&str>, vmi: &str) -> VirtualMachineInstanceMigration {
    VirtualMachineInstanceMigration::pending(name, namespace, vmi)
}

#[test]
fn create_assigns_version_and_creation_timestamp() {
    let store = InMemoryMigrationStore::new();

    let created = store
        .create(pending("migrate-web", None, "web"))
        .expect("create");
    assert!(created.metadata.resource_version.is_some());
    assert!(created.metadata.creation_timestamp.is_some());
    assert_eq!(created.metadata.namespace.as_deref(), Some("default"));

    let err = store
        .create(pending("migrate-web", None, "web"))
        .expect_err("name taken");
    assert!(err.is_already_exists());
}

#[test]
fn create_rejects_a_preset_resource_version() {
    let store = InMemoryMigrationStore::new();

    let mut request = pending("migrate-web", None, "web");
    request.metadata.resource_version = Some("7".to_string());
    match store.create(request).expect_err("preset version") {
        StoreError::Invalid(msg) => assert!(msg.contains("resourceVersion"), "{msg}"),
        other => panic!("expected invalid, got: {other}"),
    }
}

#[test]
fn update_keeps_the_status_subresource() {
    let store = InMemoryMigrationStore::new();
    let created = store
        .create(pending("migrate-web", None, "web"))
        .expect("create");

    let mut submitted = created.clone();
    submitted
        .metadata
        .labels
        .insert("rescue".to_string(), "true".to_string());
    // A spec update must not be able to smuggle in a status write.
    submitted.status.as_mut().expect("status").phase = Some(MigrationPhase::Succeeded);

    let updated = store.update(submitted).expect("update");
    assert_eq!(updated.metadata.labels.get("rescue").map(String::as_str), Some("true"));
    assert_eq!(updated.phase(), MigrationPhase::Pending, "status preserved");
    assert_ne!(
        updated.metadata.resource_version,
        created.metadata.resource_version
    );
}

#[test]
fn update_status_keeps_the_spec() {
    let store = InMemoryMigrationStore::new();
    let created = store
        .create(pending("migrate-web", None, "web"))
        .expect("create");

    let mut submitted = created.clone();
    submitted.spec.vmi_name = "tampered".to_string();
    submitted.status.as_mut().expect("status").phase = Some(MigrationPhase::Running);

    let updated = store.update_status(submitted).expect("update status");
    assert_eq!(updated.spec.vmi_name, "web", "spec preserved");
    assert_eq!(updated.phase(), MigrationPhase::Running);
}

#[test]
fn stale_writes_conflict() {
    let store = InMemoryMigrationStore::new();
    let created = store
        .create(pending("migrate-web", None, "web"))
        .expect("create");

    let mut first = created.clone();
    first.status.as_mut().expect("status").phase = Some(MigrationPhase::Running);
    store.update_status(first).expect("first status write");

    let mut stale = created.clone();
    stale.status.as_mut().expect("status").phase = Some(MigrationPhase::Failed);
    match store.update_status(stale).expect_err("stale") {
        StoreError::Conflict(_) => {}
        other => panic!("expected conflict, got: {other}"),
    }
}

#[test]
fn delete_on_a_missing_object_is_not_found() {
    let store = InMemoryMigrationStore::new();
    match store
        .delete("migrate-ghost", None, DeletionPropagation::Background)
        .expect_err("missing")
    {
        StoreError::NotFound(_) => {}
        other => panic!("expected not found, got: {other}"),
    }
}

#[test]
fn list_scopes_namespace_and_labels() {
    let store = InMemoryMigrationStore::new();

    let mut default_ns = pending("migrate-web", None, "web");
    default_ns
        .metadata
        .labels
        .insert("tier".to_string(), "frontend".to_string());
    store.create(default_ns).expect("create default");
    store
        .create(pending("migrate-db", Some("rescue"), "db"))
        .expect("create rescue");

    let everything = store.list(&ListFilter::all()).expect("list all");
    assert_eq!(everything.items.len(), 2);

    let scoped = store
        .list(&ListFilter::namespaced("rescue"))
        .expect("list rescue");
    assert_eq!(scoped.items.len(), 1);
    assert_eq!(scoped.items[0].metadata.name.as_deref(), Some("migrate-db"));

    let labeled = store
        .list(&ListFilter::all().with_label("tier", "frontend"))
        .expect("list labeled");
    assert_eq!(labeled.items.len(), 1);
    assert_eq!(labeled.items[0].metadata.name.as_deref(), Some("migrate-web"));
}

#[test]
fn strategic_patches_are_rejected() {
    let store = InMemoryMigrationStore::new();
    store
        .create(pending("migrate-web", None, "web"))
        .expect("create");

    match store
        .patch("migrate-web", None, PatchType::Strategic, b"{}")
        .expect_err("unsupported")
    {
        StoreError::Invalid(msg) => assert!(msg.contains("not supported"), "{msg}"),
        other => panic!("expected invalid, got: {other}"),
    }
}

#[test]
fn patch_cannot_touch_identity_or_status() {
    let store = InMemoryMigrationStore::new();
    store
        .create(pending("migrate-web", None, "web"))
        .expect("create");

    let patched = store
        .patch(
            "migrate-web",
            None,
            PatchType::Merge,
            br#"{"metadata": {"name": "renamed", "labels": {"rescue": "true"}}, "status": {"phase": "Succeeded"}}"#,
        )
        .expect("patch");

    assert_eq!(patched.metadata.name.as_deref(), Some("migrate-web"));
    assert_eq!(patched.phase(), MigrationPhase::Pending, "status preserved");
    assert_eq!(
        patched.metadata.labels.get("rescue").map(String::as_str),
        Some("true")
    );
}

#[test]
fn patch_status_merges_and_deletes_fields() {
    let store = InMemoryMigrationStore::new();
    store
        .create(pending("migrate-web", None, "web"))
        .expect("create");

    let with_node = store
        .patch_status(
            "migrate-web",
            None,
            PatchType::Merge,
            br#"{"targetNode": "node-b", "message": "engine accepted"}"#,
        )
        .expect("patch status");
    let status = with_node.status.clone().expect("status");
    assert_eq!(status.target_node.as_deref(), Some("node-b"));
    assert_eq!(status.message.as_deref(), Some("engine accepted"));

    let cleared = store
        .patch_status(
            "migrate-web",
            None,
            PatchType::Merge,
            br#"{"message": null}"#,
        )
        .expect("clear message");
    let status = cleared.status.expect("status");
    assert_eq!(status.target_node.as_deref(), Some("node-b"));
    assert!(status.message.is_none(), "null removes the field");
}
