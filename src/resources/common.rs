//! Common resource generation utilities.
//!
//! Provides the label map, annotation map, object names and owner reference
//! shared by every resource belonging to a replication group. All functions
//! here are pure: the same ValkeyReplication always yields the same output.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;

use crate::crd::ValkeyReplication;

/// Label key carrying the current replication role of a pod.
///
/// Written by the role synchronizer, selected on by the leader and follower
/// services. Values are "master" and "slave".
pub const ROLE_LABEL_KEY: &str = "valkey-role";

/// Standard labels applied to all managed resources.
///
/// User-supplied labels are merged first so that the operator-reserved keys
/// win on conflict; non-colliding user keys are always preserved.
pub fn replication_labels(resource: &ValkeyReplication) -> BTreeMap<String, String> {
    let mut labels = resource.spec.labels.clone();
    labels.insert("app.kubernetes.io/name".to_string(), resource.name_any());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "valkey-replication-operator".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "replication".to_string(),
    );
    labels
}

/// Standard annotations applied to all managed resources.
pub fn standard_annotations(resource: &ValkeyReplication) -> BTreeMap<String, String> {
    resource.spec.annotations.clone()
}

/// Selector labels matching the pods of a replication group.
///
/// A strict subset of [`replication_labels`]: selectors are immutable on
/// StatefulSets, so user-supplied labels must not leak in here.
pub fn pod_selector_labels(resource: &ValkeyReplication) -> BTreeMap<String, String> {
    let mut selector = BTreeMap::new();
    selector.insert("app.kubernetes.io/name".to_string(), resource.name_any());
    selector.insert(
        "app.kubernetes.io/component".to_string(),
        "replication".to_string(),
    );
    selector
}

/// Selector labels matching only the pods currently holding `role`.
pub fn role_selector_labels(
    resource: &ValkeyReplication,
    role: &str,
) -> BTreeMap<String, String> {
    let mut selector = pod_selector_labels(resource);
    selector.insert(ROLE_LABEL_KEY.to_string(), role.to_string());
    selector
}

/// Name of the headless service for stable per-pod DNS.
pub fn headless_service_name(resource: &ValkeyReplication) -> String {
    format!("{}-headless", resource.name_any())
}

/// Name of the additional service for external exposure.
pub fn additional_service_name(resource: &ValkeyReplication) -> String {
    format!("{}-additional", resource.name_any())
}

/// Name of the service selecting the current master.
pub fn leader_service_name(resource: &ValkeyReplication) -> String {
    format!("{}-leader", resource.name_any())
}

/// Name of the service selecting the current replicas.
pub fn follower_service_name(resource: &ValkeyReplication) -> String {
    format!("{}-follower", resource.name_any())
}

/// Create the owner reference every managed resource carries.
pub fn owner_reference(resource: &ValkeyReplication) -> OwnerReference {
    OwnerReference {
        api_version: "valkeyoperator.smoketurner.com/v1alpha1".to_string(),
        kind: "ValkeyReplication".to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Assemble object metadata for a managed resource.
pub fn generate_object_meta(
    resource: &ValkeyReplication,
    name: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: resource.namespace(),
        labels: Some(labels),
        annotations: if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        },
        owner_references: Some(vec![owner_reference(resource)]),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::crd::ValkeyReplicationSpec;

    fn test_resource(name: &str) -> ValkeyReplication {
        ValkeyReplication {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: ValkeyReplicationSpec::default(),
            status: None,
        }
    }

    #[test]
    fn test_replication_labels() {
        let resource = test_resource("my-group");
        let labels = replication_labels(&resource);

        assert_eq!(
            labels.get("app.kubernetes.io/name"),
            Some(&"my-group".to_string())
        );
        assert_eq!(
            labels.get("app.kubernetes.io/managed-by"),
            Some(&"valkey-replication-operator".to_string())
        );
        assert_eq!(
            labels.get("app.kubernetes.io/component"),
            Some(&"replication".to_string())
        );
    }

    #[test]
    fn test_user_labels_preserved_reserved_keys_win() {
        let mut resource = test_resource("my-group");
        resource
            .spec
            .labels
            .insert("team".to_string(), "storage".to_string());
        resource.spec.labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            "somebody-else".to_string(),
        );

        let labels = replication_labels(&resource);
        assert_eq!(labels.get("team"), Some(&"storage".to_string()));
        assert_eq!(
            labels.get("app.kubernetes.io/managed-by"),
            Some(&"valkey-replication-operator".to_string())
        );
    }

    #[test]
    fn test_service_names_are_deterministic() {
        let resource = test_resource("my-group");
        assert_eq!(headless_service_name(&resource), "my-group-headless");
        assert_eq!(additional_service_name(&resource), "my-group-additional");
        assert_eq!(leader_service_name(&resource), "my-group-leader");
        assert_eq!(follower_service_name(&resource), "my-group-follower");
    }

    #[test]
    fn test_role_selector_labels() {
        let resource = test_resource("my-group");
        let selector = role_selector_labels(&resource, "master");
        assert_eq!(selector.get(ROLE_LABEL_KEY), Some(&"master".to_string()));
        assert_eq!(
            selector.get("app.kubernetes.io/name"),
            Some(&"my-group".to_string())
        );
    }

    #[test]
    fn test_selector_excludes_user_labels() {
        let mut resource = test_resource("my-group");
        resource
            .spec
            .labels
            .insert("team".to_string(), "storage".to_string());
        let selector = pod_selector_labels(&resource);
        assert!(!selector.contains_key("team"));
    }

    #[test]
    fn test_owner_reference() {
        let resource = test_resource("my-group");
        let owner = owner_reference(&resource);
        assert_eq!(owner.kind, "ValkeyReplication");
        assert_eq!(owner.name, "my-group");
        assert_eq!(owner.uid, "test-uid");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_generate_object_meta_empty_annotations() {
        let resource = test_resource("my-group");
        let meta = generate_object_meta(
            &resource,
            "my-group-headless".to_string(),
            replication_labels(&resource),
            BTreeMap::new(),
        );
        assert_eq!(meta.name, Some("my-group-headless".to_string()));
        assert_eq!(meta.namespace, Some("default".to_string()));
        assert!(meta.annotations.is_none());
    }
}
