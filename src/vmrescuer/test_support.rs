#![allow(dead_code)]

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
    VirtualMachineInstanceStatus,
};
use crate::vmrescuer::controller::migration::MigrationRequestManager;
use crate::vmrescuer::k8s::memory::InMemoryMigrationStore;
use crate::vmrescuer::k8s::meta::{normalize_namespace, ObjectMeta};
use crate::vmrescuer::k8s::store::{
    DeletionPropagation, ListFilter, MigrationStore, PatchType, StoreError, VmiSource,
};
use crate::vmrescuer::util::new_error;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

pub struct EnvTestLock {
    inner: Mutex<()>,
}

impl EnvTestLock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EnvTestLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Global mutex used by tests that manipulate process environment variables
/// to avoid interfering with each other when running in parallel.
pub fn env_lock() -> &'static EnvTestLock {
    static LOCK: OnceLock<EnvTestLock> = OnceLock::new();
    LOCK.get_or_init(EnvTestLock::new)
}

/// Builds a read-only VMI record for seeding stores.
pub fn sample_vmi(name: &str, namespace: Option<&str>, node: &str) -> VirtualMachineInstance {
    VirtualMachineInstance {
        api_version: "vmrescuer.io/v1".to_string(),
        kind: "VirtualMachineInstance".to_string(),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(|ns| ns.to_string()),
            ..Default::default()
        },
        status: Some(VirtualMachineInstanceStatus {
            node_name: Some(node.to_string()),
        }),
    }
}

/// In-memory store pre-populated with VMIs in the default namespace.
pub fn seeded_store(vmis: &[&str]) -> Arc<InMemoryMigrationStore> {
    let store = Arc::new(InMemoryMigrationStore::new());
    for vmi in vmis {
        store.insert_vmi(sample_vmi(vmi, None, "node-a"));
    }
    store
}

/// Manager wired to a seeded in-memory store acting as both object store
/// and VMI source, scoped to the default namespace.
pub fn seeded_manager(vmis: &[&str]) -> (Arc<InMemoryMigrationStore>, MigrationRequestManager) {
    let store = seeded_store(vmis);
    let manager = MigrationRequestManager::with_namespace(
        store.clone() as Arc<dyn MigrationStore>,
        store.clone() as Arc<dyn VmiSource>,
        "default",
    );
    (store, manager)
}

/// VMI source backed by a fixed name set, for tests that need VMI
/// visibility decoupled from the object store.
pub struct StaticVmiSource {
    names: HashSet<String>,
}

impl StaticVmiSource {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names
                .iter()
                .map(|name| format!("default/{}", name))
                .collect(),
        }
    }
}

impl VmiSource for StaticVmiSource {
    fn exists(&self, name: &str, namespace: Option<&str>) -> bool {
        self.names
            .contains(&format!("{}/{}", normalize_namespace(namespace), name))
    }
}

/// Object store in permanent outage: every operation fails with
/// `StoreError::Unavailable`.
pub struct UnavailableStore;

impl UnavailableStore {
    fn offline() -> StoreError {
        StoreError::unavailable_box(new_error("object store offline"))
    }
}

impl MigrationStore for UnavailableStore {
    fn get(
        &self,
        _name: &str,
        _namespace: Option<&str>,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        Err(Self::offline())
    }

    fn list(
        &self,
        _filter: &ListFilter,
    ) -> Result<VirtualMachineInstanceMigrationList, StoreError> {
        Err(Self::offline())
    }

    fn create(
        &self,
        _migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        Err(Self::offline())
    }

    fn update(
        &self,
        _migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        Err(Self::offline())
    }

    fn update_status(
        &self,
        _migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        Err(Self::offline())
    }

    fn delete(
        &self,
        _name: &str,
        _namespace: Option<&str>,
        _propagation: DeletionPropagation,
    ) -> Result<(), StoreError> {
        Err(Self::offline())
    }

    fn patch(
        &self,
        _name: &str,
        _namespace: Option<&str>,
        _patch_type: PatchType,
        _payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        Err(Self::offline())
    }

    fn patch_status(
        &self,
        _name: &str,
        _namespace: Option<&str>,
        _patch_type: PatchType,
        _payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        Err(Self::offline())
    }
}
