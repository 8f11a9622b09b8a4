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

use crate::vmrescuer::k8s::meta::{ListMeta, ObjectMeta};
use serde::{Deserialize, Serialize};

/// API group/version served for migration resources.
pub const MIGRATION_API_VERSION: &str = "vmrescuer.io/v1";
/// Kind string for a single migration request.
pub const MIGRATION_KIND: &str = "VirtualMachineInstanceMigration";
/// Kind string for a migration request list.
pub const MIGRATION_LIST_KIND: &str = "VirtualMachineInstanceMigrationList";

fn default_api_version() -> String {
    MIGRATION_API_VERSION.to_string()
}

fn default_kind() -> String {
    MIGRATION_KIND.to_string()
}

fn default_list_kind() -> String {
    MIGRATION_LIST_KIND.to_string()
}

/// Lifecycle phase of a migration request. `Succeeded` and `Failed` are
/// terminal; once reached the request never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "PascalCase")]
pub enum MigrationPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl MigrationPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            MigrationPhase::Pending => "Pending",
            MigrationPhase::Running => "Running",
            MigrationPhase::Succeeded => "Succeeded",
            MigrationPhase::Failed => "Failed",
        }
    }

    /// Returns true for phases after which no further transition occurs.
    pub const fn is_terminal(self) -> bool {
        matches!(self, MigrationPhase::Succeeded | MigrationPhase::Failed)
    }

    /// Whether a status write moving this phase to `next` is legal.
    /// Re-asserting the current phase is always allowed.
    pub fn can_transition_to(self, next: MigrationPhase) -> bool {
        if self == next {
            return true;
        }
        match self {
            MigrationPhase::Pending => true,
            MigrationPhase::Running => next.is_terminal(),
            MigrationPhase::Succeeded | MigrationPhase::Failed => false,
        }
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a migration request. Immutable after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VirtualMachineInstanceMigrationSpec {
    /// Name of the virtual machine instance to move off its current host.
    #[serde(rename = "vmiName")]
    pub vmi_name: String,
}

/// Observed state of a migration request, written only by the manager as it
/// mirrors the live-migration engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VirtualMachineInstanceMigrationStatus {
    /// Observed VMI name; mirrors `spec.vmiName` once the request is accepted.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vmi: String,
    /// Current lifecycle phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<MigrationPhase>,
    /// Node the instance is being moved to, when the engine has picked one.
    #[serde(rename = "targetNode", skip_serializing_if = "Option::is_none")]
    pub target_node: Option<String>,
    /// Human readable context for failures or additional detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One requested, in-flight, or completed migration of a single VMI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VirtualMachineInstanceMigration {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: VirtualMachineInstanceMigrationSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VirtualMachineInstanceMigrationStatus>,
}

impl VirtualMachineInstanceMigration {
    /// Builds a request targeting `vmi_name`, phase `Pending`, with the
    /// observed VMI recorded so duplicate detection sees it immediately.
    pub fn pending(name: &str, namespace: Option<&str>, vmi_name: &str) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: namespace.map(|ns| ns.to_string()),
                ..Default::default()
            },
            spec: VirtualMachineInstanceMigrationSpec {
                vmi_name: vmi_name.to_string(),
            },
            status: Some(VirtualMachineInstanceMigrationStatus {
                vmi: vmi_name.to_string(),
                phase: Some(MigrationPhase::Pending),
                ..Default::default()
            }),
        }
    }

    /// VMI name this request is observed to target, falling back to the
    /// spec while the status subresource has not been populated yet.
    pub fn observed_vmi(&self) -> &str {
        match self.status.as_ref() {
            Some(status) if !status.vmi.is_empty() => &status.vmi,
            _ => &self.spec.vmi_name,
        }
    }

    /// Current phase; an absent status or phase counts as `Pending`.
    pub fn phase(&self) -> MigrationPhase {
        self.status
            .as_ref()
            .and_then(|status| status.phase)
            .unwrap_or(MigrationPhase::Pending)
    }

    /// True when the request still blocks new migrations of the same VMI.
    pub fn is_active(&self) -> bool {
        !self.phase().is_terminal()
    }
}

/// List of migration requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VirtualMachineInstanceMigrationList {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_list_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<VirtualMachineInstanceMigration>,
}

impl VirtualMachineInstanceMigrationList {
    pub fn new(items: Vec<VirtualMachineInstanceMigration>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_list_kind(),
            metadata: ListMeta::default(),
            items,
        }
    }
}

/// Externally owned, read-only status of a virtual machine instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VirtualMachineInstanceStatus {
    /// Node the instance currently runs on.
    #[serde(rename = "nodeName", skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

/// A running virtual machine instance. The migration core only reads its
/// existence and identity; it never mutates one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VirtualMachineInstance {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VirtualMachineInstanceStatus>,
}
