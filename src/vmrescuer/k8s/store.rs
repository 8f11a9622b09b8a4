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
use crate::vmrescuer::k8s::meta::{normalize_namespace, ObjectMeta};

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Errors surfaced by an object store. The migration core performs no
/// recovery of its own; every variant reaches the caller verbatim.
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    AlreadyExists(String),
    Conflict(String),
    Invalid(String),
    Unavailable(Box<dyn Error + Send + Sync>),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(msg)
            | StoreError::AlreadyExists(msg)
            | StoreError::Conflict(msg)
            | StoreError::Invalid(msg) => f.write_str(msg),
            StoreError::Unavailable(err) => write!(f, "{}", err),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Unavailable(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl StoreError {
    pub fn unavailable_box(err: Box<dyn Error + Send + Sync>) -> Self {
        Self::Unavailable(err)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Deletion propagation policy forwarded to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeletionPropagation {
    /// Dependents are deleted before the parent resource is fully removed.
    Foreground,
    /// The parent is removed immediately; dependents are cleaned up later.
    #[default]
    Background,
    /// Dependents are orphaned and left untouched.
    Orphan,
}

impl DeletionPropagation {
    pub const fn as_str(self) -> &'static str {
        match self {
            DeletionPropagation::Foreground => "Foreground",
            DeletionPropagation::Background => "Background",
            DeletionPropagation::Orphan => "Orphan",
        }
    }
}

impl FromStr for DeletionPropagation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Foreground" => Ok(DeletionPropagation::Foreground),
            "Background" => Ok(DeletionPropagation::Background),
            "Orphan" => Ok(DeletionPropagation::Orphan),
            other => Err(format!("unsupported propagationPolicy '{other}'")),
        }
    }
}

/// Partial-update flavor carried with a patch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchType {
    /// RFC 7386 JSON merge patch.
    Merge,
    /// Kubernetes strategic merge patch. Declared for interface parity; a
    /// store may reject it as `Invalid`.
    Strategic,
}

impl PatchType {
    pub const fn as_str(self) -> &'static str {
        match self {
            PatchType::Merge => "application/merge-patch+json",
            PatchType::Strategic => "application/strategic-merge-patch+json",
        }
    }
}

/// Namespace and label scope applied to list queries.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub namespace: Option<String>,
    pub labels: HashMap<String, String>,
}

impl ListFilter {
    /// Matches everything in every namespace.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts results to one namespace.
    pub fn namespaced(namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    /// Adds an equality label requirement.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn matches(&self, metadata: &ObjectMeta) -> bool {
        if let Some(wanted) = self.namespace.as_deref() {
            let actual = normalize_namespace(metadata.namespace.as_deref());
            if actual != normalize_namespace(Some(wanted)) {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(key, value)| metadata.labels.get(key).is_some_and(|v| v == value))
    }
}

/// Narrow create/read/update/delete surface the migration core consumes.
/// The store is the system of record and the sole arbiter of concurrent
/// writes; implementations detect stale writes via `metadata.resourceVersion`
/// and report them as [`StoreError::Conflict`].
pub trait MigrationStore: Send + Sync {
    /// Exact lookup; `NotFound` when absent.
    fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<VirtualMachineInstanceMigration, StoreError>;

    /// All migration requests matching `filter`.
    fn list(&self, filter: &ListFilter)
        -> Result<VirtualMachineInstanceMigrationList, StoreError>;

    /// Persists a new object. `AlreadyExists` when the name is taken.
    fn create(
        &self,
        migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError>;

    /// Replaces spec and metadata; the stored status subresource is kept.
    fn update(
        &self,
        migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError>;

    /// Replaces the status subresource only; the stored spec is kept.
    fn update_status(
        &self,
        migration: VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, StoreError>;

    /// Removes an object under the given propagation policy.
    fn delete(
        &self,
        name: &str,
        namespace: Option<&str>,
        propagation: DeletionPropagation,
    ) -> Result<(), StoreError>;

    /// Applies a partial update to spec and metadata.
    fn patch(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch_type: PatchType,
        payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, StoreError>;

    /// Applies a partial update to the status subresource.
    fn patch_status(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch_type: PatchType,
        payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, StoreError>;
}

/// Read-only view of virtual machine instances owned elsewhere.
pub trait VmiSource: Send + Sync {
    fn exists(&self, name: &str, namespace: Option<&str>) -> bool;
}
