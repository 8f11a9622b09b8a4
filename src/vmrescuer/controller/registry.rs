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
    VirtualMachineInstanceMigration, VirtualMachineInstanceMigrationList,
};
use crate::vmrescuer::k8s::store::{ListFilter, MigrationStore, StoreError};
use crate::vmrescuer::logger::log_warn;

use std::sync::Arc;

/// Outcome of a duplicate query. A failed list is reported as its own
/// variant so callers cannot mistake a store outage for "no duplicate".
#[derive(Debug)]
pub enum ActiveMigration {
    /// No non-terminal request targets the VMI.
    None,
    /// A non-terminal request already targets the VMI.
    Found(Box<VirtualMachineInstanceMigration>),
    /// The underlying list query failed; presence is unknown.
    QueryFailed(StoreError),
}

/// Read/query layer over the object store. Answers existence and duplicate
/// questions about migration requests without ever mutating state.
pub struct MigrationRegistry {
    store: Arc<dyn MigrationStore>,
}

impl MigrationRegistry {
    pub fn new(store: Arc<dyn MigrationStore>) -> Self {
        Self { store }
    }

    /// Scans all migration requests for a non-terminal one observed to
    /// target `vmi_name`. Requests whose status subresource has not been
    /// written yet match on their spec target, and an absent phase counts
    /// as Pending.
    pub fn find_active(&self, vmi_name: &str) -> ActiveMigration {
        let list = match self.store.list(&ListFilter::all()) {
            Ok(list) => list,
            Err(err) => return ActiveMigration::QueryFailed(err),
        };

        for migration in list.items {
            if migration.is_active() && migration.observed_vmi() == vmi_name {
                return ActiveMigration::Found(Box::new(migration));
            }
        }
        ActiveMigration::None
    }

    /// Compatibility form of [`find_active`](Self::find_active) with the
    /// historical fail-open contract: a failed query is reported as
    /// `(false, None)`, indistinguishable from "no duplicate". The swallowed
    /// error is logged at WARN; callers that must not act on a false
    /// negative should use `find_active` instead.
    pub fn exists(&self, vmi_name: &str) -> (bool, Option<VirtualMachineInstanceMigration>) {
        match self.find_active(vmi_name) {
            ActiveMigration::Found(migration) => (true, Some(*migration)),
            ActiveMigration::None => (false, None),
            ActiveMigration::QueryFailed(err) => {
                log_warn(
                    "registry",
                    "Duplicate query failed, reporting no match",
                    &[("vmi", vmi_name), ("error", &err.to_string())],
                );
                (false, None)
            }
        }
    }

    /// All migration requests matching `filter`; store errors propagate
    /// unchanged.
    pub fn list(
        &self,
        filter: &ListFilter,
    ) -> Result<VirtualMachineInstanceMigrationList, StoreError> {
        self.store.list(filter)
    }

    /// Exact lookup by identity; `NotFound` when absent.
    pub fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<VirtualMachineInstanceMigration, StoreError> {
        self.store.get(name, namespace)
    }
}
