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
    MigrationPhase, VirtualMachineInstanceMigration, VirtualMachineInstanceMigrationList,
};
use crate::vmrescuer::controller::registry::{ActiveMigration, MigrationRegistry};
use crate::vmrescuer::k8s::store::{
    DeletionPropagation, ListFilter, MigrationStore, PatchType, StoreError, VmiSource,
};
use crate::vmrescuer::logger::{log_info, log_warn};
use crate::vmrescuer::Config;

use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Label stamped on every generated request, naming the VMI it targets.
pub const LABEL_VMI_NAME: &str = "vmrescuer.io/vmi-name";

/// Upper bound on name-probe attempts when the deterministic request name
/// is occupied by terminal history.
const MAX_NAME_ATTEMPTS: usize = 16;

#[derive(Debug)]
pub enum MigrationError {
    /// A non-terminal request already targets the VMI; carries that request.
    Duplicate {
        existing: Box<VirtualMachineInstanceMigration>,
    },
    /// The targeted VMI is unknown to the injected VMI source.
    VmiNotFound(String),
    /// A status write attempted to leave a terminal phase or skip backwards.
    InvalidTransition {
        from: MigrationPhase,
        to: MigrationPhase,
    },
    /// The request or patch document violates an invariant of this manager.
    Invalid(String),
    /// The object store rejected or failed the operation; passed through
    /// verbatim so callers can branch on the store's taxonomy.
    Store(StoreError),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Duplicate { existing } => write!(
                f,
                "an active migration request '{}' already targets VMI '{}'",
                existing.metadata.name.as_deref().unwrap_or("<unnamed>"),
                existing.observed_vmi()
            ),
            MigrationError::VmiNotFound(name) => {
                write!(f, "virtual machine instance '{}' not found", name)
            }
            MigrationError::InvalidTransition { from, to } => {
                write!(f, "migration phase may not move from {} to {}", from, to)
            }
            MigrationError::Invalid(msg) => f.write_str(msg),
            MigrationError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MigrationError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for MigrationError {
    fn from(err: StoreError) -> Self {
        MigrationError::Store(err)
    }
}

impl MigrationError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, MigrationError::Duplicate { .. })
    }
}

/// Owns the lifecycle of migration request objects: creation gated by the
/// registry's duplicate check, status transitions mirroring the
/// live-migration engine, and retirement. The only writer of these objects;
/// scheduling, retries, and backoff belong to the calling reconciliation
/// driver.
pub struct MigrationRequestManager {
    store: Arc<dyn MigrationStore>,
    vmis: Arc<dyn VmiSource>,
    registry: MigrationRegistry,
    namespace: String,
}

impl MigrationRequestManager {
    /// Builds a manager over the injected store and VMI source, scoped to
    /// the configured namespace.
    pub fn new(store: Arc<dyn MigrationStore>, vmis: Arc<dyn VmiSource>) -> Self {
        Self::with_namespace(store, vmis, &Config::Namespace.value())
    }

    pub fn with_namespace(
        store: Arc<dyn MigrationStore>,
        vmis: Arc<dyn VmiSource>,
        namespace: &str,
    ) -> Self {
        Self {
            registry: MigrationRegistry::new(store.clone()),
            store,
            vmis,
            namespace: namespace.to_string(),
        }
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Requests a live migration of `vmi_name`. At most one non-terminal
    /// request per VMI: a known duplicate fails with
    /// [`MigrationError::Duplicate`] carrying the existing request, and the
    /// deterministic request name turns the create race into an atomic
    /// `AlreadyExists` from the store. Terminal history never blocks a new
    /// request; occupied names are probed with a numeric suffix.
    pub fn create(
        &self,
        vmi_name: &str,
    ) -> Result<VirtualMachineInstanceMigration, MigrationError> {
        if vmi_name.is_empty() {
            return Err(MigrationError::Invalid(
                "a VMI name is required to create a migration request".to_string(),
            ));
        }
        if !self.vmis.exists(vmi_name, Some(&self.namespace)) {
            return Err(MigrationError::VmiNotFound(vmi_name.to_string()));
        }

        match self.registry.find_active(vmi_name) {
            ActiveMigration::Found(existing) => {
                return Err(MigrationError::Duplicate { existing })
            }
            ActiveMigration::QueryFailed(err) => {
                log_warn(
                    "controller",
                    "Refusing to create migration request, duplicate check failed",
                    &[("vmi", vmi_name), ("error", &err.to_string())],
                );
                return Err(MigrationError::Store(err));
            }
            ActiveMigration::None => {}
        }

        let base = format!("{}-{}", Config::RequestPrefix.value(), vmi_name);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };

            let mut request =
                VirtualMachineInstanceMigration::pending(&name, Some(&self.namespace), vmi_name);
            request
                .metadata
                .labels
                .insert(LABEL_VMI_NAME.to_string(), vmi_name.to_string());

            match self.store.create(request) {
                Ok(created) => {
                    log_info(
                        "controller",
                        "Created migration request",
                        &[("vmi", vmi_name), ("request", &name)],
                    );
                    return Ok(created);
                }
                Err(err) if err.is_already_exists() => {
                    // Another writer beat us to this name. Only an active
                    // request for the same VMI counts as a duplicate;
                    // terminal history and requests for other VMIs just
                    // occupy the name.
                    match self.store.get(&name, Some(&self.namespace)) {
                        Ok(existing)
                            if existing.is_active() && existing.observed_vmi() == vmi_name =>
                        {
                            return Err(MigrationError::Duplicate {
                                existing: Box::new(existing),
                            });
                        }
                        Ok(_) => continue,
                        Err(err) if err.is_not_found() => continue,
                        Err(err) => return Err(MigrationError::Store(err)),
                    }
                }
                Err(err) => return Err(MigrationError::Store(err)),
            }
        }

        Err(MigrationError::Invalid(format!(
            "no free request name for VMI '{}' after {} attempts",
            vmi_name, MAX_NAME_ATTEMPTS
        )))
    }

    /// Writes the status subresource of an existing request, recording a
    /// phase transition observed from the live-migration engine. Terminal
    /// phases are absorbing; a stale resourceVersion surfaces as the
    /// store's `Conflict` and the caller must re-fetch and retry.
    pub fn update_status(
        &self,
        migration: &VirtualMachineInstanceMigration,
    ) -> Result<VirtualMachineInstanceMigration, MigrationError> {
        let Some(name) = migration.metadata.name.as_deref().filter(|n| !n.is_empty()) else {
            return Err(MigrationError::Invalid(
                "metadata.name is required".to_string(),
            ));
        };
        let namespace = migration
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(&self.namespace);

        let stored = self.store.get(name, Some(namespace))?;
        let from = stored.phase();
        let to = migration.phase();
        if !from.can_transition_to(to) {
            return Err(MigrationError::InvalidTransition { from, to });
        }

        let mut submitted = migration.clone();
        let status = submitted.status.get_or_insert_with(Default::default);
        if status.vmi.is_empty() {
            status.vmi = stored.spec.vmi_name.clone();
        } else if status.vmi != stored.spec.vmi_name {
            return Err(MigrationError::Invalid(format!(
                "status.vmi '{}' does not mirror spec.vmiName '{}'",
                status.vmi, stored.spec.vmi_name
            )));
        }

        let updated = self.store.update_status(submitted)?;
        log_info(
            "controller",
            "Recorded migration phase",
            &[
                ("request", name),
                ("vmi", &updated.spec.vmi_name),
                ("phase", updated.phase().as_str()),
            ],
        );
        Ok(updated)
    }

    /// Retires a request with background propagation. Deleting a missing
    /// object reports the store's own `NotFound`, untouched.
    pub fn delete(&self, name: &str, namespace: Option<&str>) -> Result<(), MigrationError> {
        let namespace = namespace.unwrap_or(&self.namespace);
        self.store
            .delete(name, Some(namespace), DeletionPropagation::Background)?;
        log_info(
            "controller",
            "Deleted migration request",
            &[("request", name), ("namespace", namespace)],
        );
        Ok(())
    }

    /// Exact lookup; same error contract as the registry.
    pub fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<VirtualMachineInstanceMigration, MigrationError> {
        let namespace = namespace.unwrap_or(&self.namespace);
        Ok(self.registry.get(name, Some(namespace))?)
    }

    /// Filtered listing; same error contract as the registry.
    pub fn list(
        &self,
        filter: &ListFilter,
    ) -> Result<VirtualMachineInstanceMigrationList, MigrationError> {
        Ok(self.registry.list(filter)?)
    }

    /// Applies a partial update to spec and metadata. The migration target
    /// is immutable: a document that rewrites `spec.vmiName` is rejected.
    pub fn patch(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch_type: PatchType,
        payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, MigrationError> {
        let namespace = namespace.unwrap_or(&self.namespace);
        let document = decode_document(payload)?;

        if let Some(submitted) = document.pointer("/spec/vmiName").and_then(Value::as_str) {
            let stored = self.store.get(name, Some(namespace))?;
            if submitted != stored.spec.vmi_name {
                return Err(MigrationError::Invalid(format!(
                    "spec.vmiName is immutable (stored '{}', patch '{}')",
                    stored.spec.vmi_name, submitted
                )));
            }
        }

        let patched = self
            .store
            .patch(name, Some(namespace), patch_type, payload)?;
        log_info(
            "controller",
            "Patched migration request",
            &[("request", name), ("patchType", patch_type.as_str())],
        );
        Ok(patched)
    }

    /// Applies a partial update to the status subresource, with the same
    /// phase-transition and VMI-mirror guards as `update_status`.
    pub fn patch_status(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch_type: PatchType,
        payload: &[u8],
    ) -> Result<VirtualMachineInstanceMigration, MigrationError> {
        let namespace = namespace.unwrap_or(&self.namespace);
        let document = decode_document(payload)?;

        let stored = self.store.get(name, Some(namespace))?;
        if let Some(phase_value) = document.get("phase") {
            let to: MigrationPhase = serde_json::from_value(phase_value.clone())
                .map_err(|err| MigrationError::Invalid(format!("unknown phase in patch: {err}")))?;
            let from = stored.phase();
            if !from.can_transition_to(to) {
                return Err(MigrationError::InvalidTransition { from, to });
            }
        }
        if let Some(vmi) = document.get("vmi").and_then(Value::as_str) {
            if vmi != stored.spec.vmi_name {
                return Err(MigrationError::Invalid(format!(
                    "status.vmi '{}' does not mirror spec.vmiName '{}'",
                    vmi, stored.spec.vmi_name
                )));
            }
        }

        let patched = self
            .store
            .patch_status(name, Some(namespace), patch_type, payload)?;
        log_info(
            "controller",
            "Patched migration status",
            &[
                ("request", name),
                ("vmi", &patched.spec.vmi_name),
                ("phase", patched.phase().as_str()),
            ],
        );
        Ok(patched)
    }
}

fn decode_document(payload: &[u8]) -> Result<Value, MigrationError> {
    serde_json::from_slice(payload)
        .map_err(|err| MigrationError::Invalid(format!("malformed patch document: {err}")))
}
