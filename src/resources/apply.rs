//! Idempotent apply primitives for owned resources.
//!
//! Server-side apply with a fixed field manager gives create-or-update
//! semantics in one call; re-applying an unchanged spec is a no-op. The
//! optimistic-concurrency handling lives in the API server, not here.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use crate::controller::error::Error;
use crate::crd::ValkeyReplication;
use crate::resources::services::ServiceApplier;

/// Field manager name for server-side apply
pub const FIELD_MANAGER: &str = "valkey-replication-operator";

/// Service applier scoped to the namespace of one replication group.
pub struct NamespacedApplier {
    services: Api<Service>,
}

impl NamespacedApplier {
    pub fn new(client: Client, resource: &ValkeyReplication) -> Self {
        let namespace = resource.namespace().unwrap_or_else(|| "default".to_string());
        Self {
            services: Api::namespaced(client, &namespace),
        }
    }
}

impl ServiceApplier for NamespacedApplier {
    async fn apply(&self, service: &Service) -> Result<(), Error> {
        let name = service.name_any();
        self.services
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(service),
            )
            .await?;
        Ok(())
    }
}

/// Apply a StatefulSet, optionally recreating it when the API server rejects
/// an in-place update.
///
/// StatefulSets carry immutable fields (selector, volumeClaimTemplates);
/// changing those makes the apply fail with 422. When the group carries the
/// recreate annotation we honor that failure by deleting the StatefulSet and
/// applying it fresh. Pods are replaced; data survives in the PVCs.
pub async fn apply_statefulset(
    api: &Api<StatefulSet>,
    statefulset: &StatefulSet,
    recreate_on_change: bool,
) -> Result<(), Error> {
    let name = statefulset.name_any();
    let params = PatchParams::apply(FIELD_MANAGER).force();

    match api.patch(&name, &params, &Patch::Apply(statefulset)).await {
        Ok(_) => {
            debug!(statefulset = %name, "Applied statefulset");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 422 && recreate_on_change => {
            info!(statefulset = %name, "In-place update rejected, recreating statefulset");
            api.delete(&name, &DeleteParams::default()).await?;
            api.patch(&name, &params, &Patch::Apply(statefulset)).await?;
            Ok(())
        }
        Err(e) => Err(Error::Kube(e)),
    }
}
