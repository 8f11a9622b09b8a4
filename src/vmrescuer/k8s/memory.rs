/*
 * Copyright (C) 2025 The Vmrescuer Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::vmrescuer::api::types::{
    VirtualMachineInstance, VirtualMachineInstanceMigration, VirtualMachineInstanceMigrationList,
};
use crate::vmrescuer::k8s::meta::normalize_namespace;
use crate::vmrescuer::k8s::store::{
    DeletionPropagation, ListFilter, MigrationStore, PatchType, StoreError, VmiSource,
};
use crate::vmrescuer::util::with_context;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

fn storage_key(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}", normalize_namespace(namespace), name)
}

/// Applies an RFC 7386 merge patch onto `target` in place.
fn merge_json(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            let fields = target.as_object_mut().unwrap();
            for (key, value) in entries {
                if value.is_null() {
                    fields.remove(key);
                } else {
                    merge_json(fields.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// Reference realization of the object-store contract, holding migration
/// requests and VMI records in process memory. Resource versions are a
/// monotonic counter; a stale version on any write reports `Conflict`.
pub struct InMemoryMigrationStore {
    migrations: RwLock<HashMap<String, VirtualMachineInstanceMigration>>,
    vmis: RwLock<HashMap<String, VirtualMachineInstance>>,
    resource_counter: AtomicU64,
}

impl Default for InMemoryMigrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMigrationStore {
    pub fn new() -> Self {
        Self {
            migrations: RwLock::new(HashMap::new()),
            vmis: RwLock::new(HashMap::new()),
            resource_counter: AtomicU64::new(1),
        }
    }

    fn next_resource_version(&self) -> String {
        self.resource_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    /// Registers a VMI record so `VmiSource::exists` can see it.
    pub fn insert_vmi(&self, vmi: VirtualMachineInstance) {
        let Some(name) = vmi.metadata.name.clone() else {
            return;
        };
        let key = storage_key(vmi.metadata.namespace.as_deref(), &name);
        let mut vmis = self.vmis.write().expect("vmi table poisoned");
        vmis.insert(key, vmi);
    }

    pub fn remove_vmi(&self, name: &str, namespace: Option<&str>) {
        let mut vmis = self.vmis.write().expect("vmi table poisoned");
        vmis.remove(&storage_key(namespace, name));
    }

    fn decode_merge_document(patch_type: PatchType, payload: &[u8]) -> Result<Value, StoreError> {
        if patch_type != PatchType::Merge {
            return Err(StoreError::Invalid(format!(
                "patch type '{}' is not supported by this store",
                patch_type.as_str()
            )));
        }
        serde_json::from_slice(payload)
            .map_err(|err| StoreError::Invalid(format!("malformed merge patch document: {err}")))
    }

    fn check_resource_version(
        stored: &VirtualMachineInstanceMigration,
        submitted: Option<&str>,
    ) -> Result<(), StoreError> {
        let Some(submitted) = submitted else {
            return Ok(());
        };
        if stored.metadata.resource_version.as_deref().unwrap_or("") != submitted {
            return Err(StoreError::Conflict(format!(
                "resourceVersion '{}' does not match the stored object",
                submitted
            )));
        }
        Ok(())
    }
}

impl MigrationStore for InMemoryMigrationStore {
    fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        let migrations = self.migrations.read().expect("migration table poisoned");
        migrations
            .get(&storage_key(namespace, name))
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "VirtualMachineInstanceMigration '{}' not found",
                    name
                ))
            })
    }

    fn list(
        &self,
        filter: &ListFilter,
    ) -> Result<VirtualMachineInstanceMigrationList, StoreError> {
        let migrations = self.migrations.read().expect("migration table poisoned");
        let mut items: Vec<VirtualMachineInstanceMigration> = migrations
            .values()
            .filter(|migration| filter.matches(&migration.metadata))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(VirtualMachineInstanceMigrationList::new(items))
    }

    fn create(
        &self,
        mut migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        if migration.metadata.resource_version.is_some() {
            return Err(StoreError::Invalid(
                "resourceVersion must not be set on create".to_string(),
            ));
        }
        let Some(name) = migration.metadata.name.clone().filter(|n| !n.is_empty()) else {
            return Err(StoreError::Invalid("metadata.name is required".to_string()));
        };
        let namespace = normalize_namespace(migration.metadata.namespace.as_deref());
        let key = storage_key(Some(&namespace), &name);

        let mut migrations = self.migrations.write().expect("migration table poisoned");
        if migrations.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "VirtualMachineInstanceMigration '{}' already exists",
                name
            )));
        }

        migration.metadata.namespace = Some(namespace);
        migration.metadata.resource_version = Some(self.next_resource_version());
        migration.metadata.creation_timestamp =
            Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        migrations.insert(key, migration.clone());
        Ok(migration)
    }

    fn update(
        &self,
        mut migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        let Some(name) = migration.metadata.name.clone().filter(|n| !n.is_empty()) else {
            return Err(StoreError::Invalid("metadata.name is required".to_string()));
        };
        let key = storage_key(migration.metadata.namespace.as_deref(), &name);

        let mut migrations = self.migrations.write().expect("migration table poisoned");
        let Some(stored) = migrations.get(&key) else {
            return Err(StoreError::NotFound(format!(
                "VirtualMachineInstanceMigration '{}' not found",
                name
            )));
        };
        Self::check_resource_version(stored, migration.metadata.resource_version.as_deref())?;

        // The status subresource is only writable through update_status.
        migration.status = stored.status.clone();
        migration.metadata.namespace = stored.metadata.namespace.clone();
        migration.metadata.creation_timestamp = stored.metadata.creation_timestamp.clone();
        migration.metadata.resource_version = Some(self.next_resource_version());

        migrations.insert(key, migration.clone());
        Ok(migration)
    }

    fn update_status(
        &self,
        migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        let Some(name) = migration.metadata.name.clone().filter(|n| !n.is_empty()) else {
            return Err(StoreError::Invalid("metadata.name is required".to_string()));
        };
        let key = storage_key(migration.metadata.namespace.as_deref(), &name);

        let mut migrations = self.migrations.write().expect("migration table poisoned");
        let Some(stored) = migrations.get(&key) else {
            return Err(StoreError::NotFound(format!(
                "VirtualMachineInstanceMigration '{}' not found",
                name
            )));
        };
        Self::check_resource_version(stored, migration.metadata.resource_version.as_deref())?;

        // Everything except the status subresource stays as stored.
        let mut updated = stored.clone();
        updated.status = migration.status;
        updated.metadata.resource_version = Some(self.next_resource_version());

        migrations.insert(key, updated.clone());
        Ok(updated)
    }

    fn delete(
        &self,
        name: &str,
        namespace: Option<&str>,
        _propagation: DeletionPropagation,
    ) -> Result<(), StoreError> {
        let mut migrations = self.migrations.write().expect("migration table poisoned");
        match migrations.remove(&storage_key(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!(
                "VirtualMachineInstanceMigration '{}' not found",
                name
            ))),
        }
    }

    fn patch(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch_type: PatchType,
        payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        let document = Self::decode_merge_document(patch_type, payload)?;
        let key = storage_key(namespace, name);

        let mut migrations = self.migrations.write().expect("migration table poisoned");
        let Some(stored) = migrations.get(&key) else {
            return Err(StoreError::NotFound(format!(
                "VirtualMachineInstanceMigration '{}' not found",
                name
            )));
        };
        let submitted_version = document
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .map(|v| v.to_string());
        Self::check_resource_version(stored, submitted_version.as_deref())?;

        let mut value = serde_json::to_value(stored).map_err(|err| {
            StoreError::unavailable_box(with_context(err, "encoding stored migration"))
        })?;
        merge_json(&mut value, &document);

        let mut patched: VirtualMachineInstanceMigration = serde_json::from_value(value)
            .map_err(|err| StoreError::Invalid(format!("patch result is not a valid object: {err}")))?;

        // Identity and the status subresource are not patchable here.
        patched.metadata.name = stored.metadata.name.clone();
        patched.metadata.namespace = stored.metadata.namespace.clone();
        patched.metadata.creation_timestamp = stored.metadata.creation_timestamp.clone();
        patched.status = stored.status.clone();
        patched.metadata.resource_version = Some(self.next_resource_version());

        migrations.insert(key, patched.clone());
        Ok(patched)
    }

    fn patch_status(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch_type: PatchType,
        payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        let document = Self::decode_merge_document(patch_type, payload)?;
        let key = storage_key(namespace, name);

        let mut migrations = self.migrations.write().expect("migration table poisoned");
        let Some(stored) = migrations.get(&key) else {
            return Err(StoreError::NotFound(format!(
                "VirtualMachineInstanceMigration '{}' not found",
                name
            )));
        };

        let mut status_value = serde_json::to_value(stored.status.clone().unwrap_or_default())
            .map_err(|err| {
                StoreError::unavailable_box(with_context(err, "encoding stored migration status"))
            })?;
        merge_json(&mut status_value, &document);

        let status = serde_json::from_value(status_value).map_err(|err| {
            StoreError::Invalid(format!("patch result is not a valid status: {err}"))
        })?;

        let mut updated = stored.clone();
        updated.status = Some(status);
        updated.metadata.resource_version = Some(self.next_resource_version());

        migrations.insert(key, updated.clone());
        Ok(updated)
    }
}

impl VmiSource for InMemoryMigrationStore {
    fn exists(&self, name: &str, namespace: Option<&str>) -> bool {
        let vmis = self.vmis.read().expect("vmi table poisoned");
        vmis.contains_key(&storage_key(namespace, name))
    }
}
