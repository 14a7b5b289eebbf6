//! StatefulSet generation for Valkey replication groups.
//!
//! Composes the workload from the container builders: one Valkey container,
//! an optional exporter sidecar, an optional init container, a volume-claim
//! template when storage is configured, and the scheduling constraints from
//! the spec.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    LocalObjectReference, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSecurityContext,
    PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::crd::ValkeyReplication;
use crate::resources::common::{
    generate_object_meta, headless_service_name, pod_selector_labels, replication_labels,
    standard_annotations,
};
use crate::resources::container::{
    ACL_VOLUME_NAME, DATA_VOLUME_NAME, TLS_VOLUME_NAME, VALKEY_USER_ID, generate_init_container,
    generate_exporter_sidecar, generate_valkey_container,
};

/// Annotation that forces a full StatefulSet replacement instead of an
/// in-place update on the next apply. Honored by the apply primitive.
pub const RECREATE_ANNOTATION: &str = "valkeyoperator.smoketurner.com/recreate-statefulset";

/// Default termination grace period in seconds
const TERMINATION_GRACE_PERIOD: i64 = 30;

/// Workload parameters resolved from the group spec.
///
/// `cluster_mode` and `node_conf_volume` are hard-coded false here: they
/// identify the replication topology. The sharded-cluster builder sets them
/// true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatefulSetParams {
    pub replicas: i32,
    pub cluster_mode: bool,
    pub node_conf_volume: bool,
    pub recreate_on_change: bool,
}

/// Resolve the workload parameters for a replication group.
pub fn replication_statefulset_params(resource: &ValkeyReplication) -> StatefulSetParams {
    StatefulSetParams {
        replicas: resource.spec.replication_counts(),
        cluster_mode: false,
        node_conf_volume: false,
        recreate_on_change: resource
            .annotations()
            .contains_key(RECREATE_ANNOTATION),
    }
}

/// Generate the StatefulSet for a replication group.
pub fn generate_statefulset(
    resource: &ValkeyReplication,
    params: &StatefulSetParams,
) -> StatefulSet {
    let name = resource.name_any();
    let labels = replication_labels(resource);
    let annotations = standard_annotations(resource);

    StatefulSet {
        metadata: generate_object_meta(resource, name, labels.clone(), annotations.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(params.replicas),
            service_name: Some(headless_service_name(resource)),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(resource)),
                ..Default::default()
            },
            update_strategy: generate_update_strategy(resource),
            template: generate_pod_template(resource, params, &labels, &annotations),
            volume_claim_templates: resource
                .spec
                .storage
                .as_ref()
                .map(|_| vec![generate_pvc_template(resource)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_update_strategy(resource: &ValkeyReplication) -> Option<StatefulSetUpdateStrategy> {
    resource.spec.update_strategy.clone()
}

/// Build and apply the StatefulSet for a replication group.
pub async fn ensure_replication_statefulset(
    client: kube::Client,
    resource: &ValkeyReplication,
) -> Result<(), crate::controller::error::Error> {
    let namespace = resource.namespace().unwrap_or_else(|| "default".to_string());
    let api = kube::Api::namespaced(client, &namespace);
    let params = replication_statefulset_params(resource);
    let statefulset = generate_statefulset(resource, &params);
    crate::resources::apply::apply_statefulset(&api, &statefulset, params.recreate_on_change).await
}

/// Generate the pod template for the StatefulSet.
fn generate_pod_template(
    resource: &ValkeyReplication,
    params: &StatefulSetParams,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> PodTemplateSpec {
    let spec = &resource.spec;

    let mut containers = vec![generate_valkey_container(resource)];
    if let Some(sidecar) = generate_exporter_sidecar(resource) {
        containers.push(sidecar);
    }

    // An inert init-container spec means "omit the container", never
    // "include an empty container".
    let init_containers = generate_init_container(resource).map(|c| vec![c]);

    let node_selector = if spec.scheduling.node_selector.is_empty() {
        None
    } else {
        Some(spec.scheduling.node_selector.clone())
    };

    let tolerations = if spec.scheduling.tolerations.is_empty() {
        None
    } else {
        Some(spec.scheduling.tolerations.clone())
    };

    let image_pull_secrets = if spec.image.pull_secrets.is_empty() {
        None
    } else {
        Some(
            spec.image
                .pull_secrets
                .iter()
                .map(|name| LocalObjectReference { name: name.clone() })
                .collect(),
        )
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(annotations.clone())
            },
            ..Default::default()
        }),
        spec: Some(PodSpec {
            termination_grace_period_seconds: Some(
                spec.scheduling
                    .termination_grace_period_seconds
                    .unwrap_or(TERMINATION_GRACE_PERIOD),
            ),
            security_context: Some(
                spec.pod_security_context
                    .clone()
                    .unwrap_or_else(default_pod_security_context),
            ),
            affinity: spec.scheduling.affinity.clone(),
            priority_class_name: spec.scheduling.priority_class_name.clone(),
            service_account_name: spec.service_account_name.clone(),
            init_containers,
            containers,
            volumes: generate_volumes(resource, params),
            node_selector,
            tolerations,
            image_pull_secrets,
            ..Default::default()
        }),
    }
}

fn default_pod_security_context() -> PodSecurityContext {
    PodSecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(VALKEY_USER_ID),
        fs_group: Some(VALKEY_USER_ID),
        seccomp_profile: Some(k8s_openapi::api::core::v1::SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate pod volumes. Secret-backed volumes appear only when the matching
/// spec section is present.
fn generate_volumes(resource: &ValkeyReplication, params: &StatefulSetParams) -> Option<Vec<Volume>> {
    let mut volumes = Vec::new();

    if let Some(tls) = &resource.spec.tls {
        volumes.push(Volume {
            name: TLS_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(tls.secret_name.clone()),
                default_mode: Some(0o400),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    if let Some(acl) = &resource.spec.acl {
        volumes.push(Volume {
            name: ACL_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(acl.secret_name.clone()),
                default_mode: Some(0o400),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    // Only the sharded-cluster topology carries a per-node conf volume.
    if params.node_conf_volume {
        volumes.push(Volume {
            name: "node-conf".to_string(),
            empty_dir: Some(k8s_openapi::api::core::v1::EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    if volumes.is_empty() { None } else { Some(volumes) }
}

/// Generate the PVC template for the StatefulSet.
fn generate_pvc_template(resource: &ValkeyReplication) -> PersistentVolumeClaim {
    let storage = resource.spec.storage.clone().unwrap_or_default();

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME_NAME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some({
                    let mut requests = BTreeMap::new();
                    requests.insert("storage".to_string(), Quantity(storage.size.clone()));
                    requests
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
