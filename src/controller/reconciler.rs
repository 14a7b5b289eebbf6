//! Reconciliation loop for ValkeyReplication.
//!
//! Ensures the Service topology and the StatefulSet for each replication
//! group, then mirrors the StatefulSet's readiness into the status
//! subresource. Role labels are not touched here; they are driven by
//! role-change notifications through [`crate::controller::role_sync`].

use std::sync::Arc;
use std::time::Duration;

use kube::{
    Api, ResourceExt,
    api::{Patch, PatchParams},
    runtime::controller::Action,
};
use tracing::{debug, error, warn};

use crate::{
    controller::{context::Context, error::Error},
    crd::{Condition, ValkeyReplication, ValkeyReplicationStatus},
    resources::apply::FIELD_MANAGER,
    resources::services::ensure_replication_services,
    resources::statefulset::ensure_replication_statefulset,
};

/// Reconcile a ValkeyReplication group.
pub async fn reconcile(obj: Arc<ValkeyReplication>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling ValkeyReplication");

    if let Err(e) = validate_spec(&obj) {
        error!(name = %name, error = %e, "Validation failed");
        ctx.publish_warning_event(&obj, "ValidationFailed", "Validating", Some(e.to_string()))
            .await;
        return Err(e);
    }

    // Service topology first so per-pod DNS exists before pods come up.
    // Best-effort failures are surfaced as warning events but do not stop
    // the workload apply.
    let outcomes = ensure_replication_services(ctx.client.clone(), &obj).await?;
    for outcome in &outcomes {
        if let Err(e) = &outcome.result {
            ctx.publish_warning_event(
                &obj,
                "ServiceApplyFailed",
                "Reconciling",
                Some(format!("{} service: {}", outcome.kind, e)),
            )
            .await;
        }
    }

    ensure_replication_statefulset(ctx.client.clone(), &obj).await?;

    let ready_replicas = check_ready_replicas(&ctx, &namespace, &name).await?;
    update_status(&ctx, &obj, &namespace, ready_replicas).await?;

    let requeue = if ready_replicas >= obj.spec.replicas {
        Duration::from_secs(300)
    } else {
        Duration::from_secs(30)
    };
    Ok(Action::requeue(requeue))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<ValkeyReplication>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
        Action::requeue(error.requeue_after())
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
        Action::requeue(Duration::from_secs(300))
    }
}

/// Validate the resource spec before building anything from it.
fn validate_spec(obj: &ValkeyReplication) -> Result<(), Error> {
    if obj.spec.replicas < 1 {
        return Err(Error::Validation("replicas must be at least 1".to_string()));
    }
    if let Some(exporter) = &obj.spec.exporter {
        if exporter.enabled && exporter.image.is_empty() {
            return Err(Error::Validation(
                "exporter.image must be set when the exporter is enabled".to_string(),
            ));
        }
    }
    Ok(())
}

/// Read the ready replica count from the owned StatefulSet.
async fn check_ready_replicas(ctx: &Context, namespace: &str, name: &str) -> Result<i32, Error> {
    let api: Api<k8s_openapi::api::apps::v1::StatefulSet> =
        Api::namespaced(ctx.client.clone(), namespace);

    match api.get(name).await {
        Ok(sts) => Ok(sts
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(0),
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Update the status subresource with the observed readiness.
async fn update_status(
    ctx: &Context,
    obj: &ValkeyReplication,
    namespace: &str,
    ready_replicas: i32,
) -> Result<(), Error> {
    let name = obj.name_any();
    let generation = obj.metadata.generation;

    let conditions = if ready_replicas >= obj.spec.replicas {
        vec![Condition::ready(
            true,
            "AllReplicasReady",
            "All instances are ready",
            generation,
        )]
    } else if ready_replicas > 0 {
        vec![Condition::degraded(
            true,
            "PartiallyReady",
            &format!("{}/{} instances ready", ready_replicas, obj.spec.replicas),
            generation,
        )]
    } else {
        vec![Condition::progressing(
            true,
            "Reconciling",
            "Waiting for instances to become ready",
            generation,
        )]
    };

    let status = ValkeyReplicationStatus {
        ready_replicas,
        observed_generation: generation,
        conditions,
    };

    let api: Api<ValkeyReplication> = Api::namespaced(ctx.client.clone(), namespace);
    api.patch_status(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&serde_json::json!({ "status": status })),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crd::{ExporterSpec, ValkeyReplicationSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn test_resource(spec: ValkeyReplicationSpec) -> ValkeyReplication {
        ValkeyReplication {
            metadata: ObjectMeta {
                name: Some("my-group".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    #[test]
    fn test_validate_rejects_zero_replicas() {
        let resource = test_resource(ValkeyReplicationSpec {
            replicas: 0,
            ..Default::default()
        });
        assert!(validate_spec(&resource).is_err());
    }

    #[test]
    fn test_validate_rejects_enabled_exporter_without_image() {
        let resource = test_resource(ValkeyReplicationSpec {
            exporter: Some(ExporterSpec {
                enabled: true,
                image: String::new(),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(validate_spec(&resource).is_err());
    }

    #[test]
    fn test_validate_accepts_default_spec() {
        let resource = test_resource(ValkeyReplicationSpec::default());
        assert!(validate_spec(&resource).is_ok());
    }
}
