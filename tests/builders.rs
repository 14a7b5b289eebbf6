//! Builder tests for the valkey-replication-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the resource
//! builders end to end: determinism of the generated specs, the interplay
//! between the container builders, and the replication topology invariants.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use valkey_replication_operator::crd::{
    ExporterSpec, InitContainerSpec, SecretKeyRef, StorageSpec, ValkeyReplication,
    ValkeyReplicationSpec,
};
use valkey_replication_operator::resources::container::{
    generate_init_container, generate_valkey_container,
};
use valkey_replication_operator::resources::services::replication_service_plan;
use valkey_replication_operator::resources::statefulset::{
    generate_statefulset, replication_statefulset_params,
};

fn full_resource(name: &str) -> ValkeyReplication {
    ValkeyReplication {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("cache".to_string()),
            uid: Some("abc-123".to_string()),
            ..Default::default()
        },
        spec: ValkeyReplicationSpec {
            replicas: 3,
            existing_password_secret: Some(SecretKeyRef {
                name: "valkey-auth".to_string(),
                key: "password".to_string(),
            }),
            storage: Some(StorageSpec {
                size: "20Gi".to_string(),
                storage_class_name: None,
                mount_path: "/data".to_string(),
            }),
            exporter: Some(ExporterSpec {
                enabled: true,
                ..Default::default()
            }),
            init_container: Some(InitContainerSpec {
                enabled: true,
                image: "restore-tool:1.0".to_string(),
                pull_policy: "IfNotPresent".to_string(),
                command: vec!["restore".to_string()],
                args: vec!["--from".to_string(), "s3://backup".to_string()],
                env: None,
                resources: None,
            }),
            ..Default::default()
        },
        status: None,
    }
}

#[test]
fn full_topology_is_deterministic() {
    let resource = full_resource("cache-group");

    let services_a: Vec<_> = replication_service_plan(&resource)
        .into_iter()
        .map(|p| p.service)
        .collect();
    let services_b: Vec<_> = replication_service_plan(&resource)
        .into_iter()
        .map(|p| p.service)
        .collect();
    assert_eq!(
        serde_json::to_vec(&services_a).unwrap(),
        serde_json::to_vec(&services_b).unwrap()
    );

    let params = replication_statefulset_params(&resource);
    let sts_a = generate_statefulset(&resource, &params);
    let sts_b = generate_statefulset(&resource, &params);
    assert_eq!(
        serde_json::to_vec(&sts_a).unwrap(),
        serde_json::to_vec(&sts_b).unwrap()
    );
}

#[test]
fn derived_names_are_a_function_of_the_group_name() {
    let resource = full_resource("cache-group");
    let names: Vec<String> = replication_service_plan(&resource)
        .iter()
        .map(|p| p.service.name_any())
        .collect();
    assert_eq!(
        names,
        vec![
            "cache-group-headless",
            "cache-group",
            "cache-group-additional",
            "cache-group-leader",
            "cache-group-follower",
        ]
    );

    let params = replication_statefulset_params(&resource);
    let sts = generate_statefulset(&resource, &params);
    assert_eq!(sts.name_any(), "cache-group");
}

#[test]
fn topology_flags_are_false_regardless_of_input() {
    for resource in [full_resource("a"), {
        let mut r = full_resource("b");
        r.spec.storage = None;
        r.spec.exporter = None;
        r
    }] {
        let params = replication_statefulset_params(&resource);
        assert!(!params.cluster_mode);
        assert!(!params.node_conf_volume);
    }
}

#[test]
fn init_and_primary_share_the_storage_mount_path() {
    let resource = full_resource("cache-group");
    let primary = generate_valkey_container(&resource);
    let init = generate_init_container(&resource).expect("init container configured");

    let primary_paths: Vec<_> = primary
        .volume_mounts
        .unwrap()
        .into_iter()
        .filter(|m| m.name == "data")
        .map(|m| m.mount_path)
        .collect();
    let init_paths: Vec<_> = init
        .volume_mounts
        .unwrap()
        .into_iter()
        .map(|m| m.mount_path)
        .collect();
    assert_eq!(primary_paths, init_paths);
}

#[test]
fn no_storage_means_no_storage_fields_anywhere() {
    let mut resource = full_resource("cache-group");
    resource.spec.storage = None;

    let primary = generate_valkey_container(&resource);
    assert!(primary.volume_mounts.is_none());

    let init = generate_init_container(&resource).expect("init container configured");
    assert!(init.volume_mounts.is_none());

    let params = replication_statefulset_params(&resource);
    let sts = generate_statefulset(&resource, &params);
    assert!(sts.spec.unwrap().volume_claim_templates.is_none());
}

#[test]
fn password_tri_state_is_unambiguous() {
    let with_auth = full_resource("cache-group");
    let container = generate_valkey_container(&with_auth);
    let env = container.env.unwrap();
    let password = env
        .iter()
        .find(|e| e.name == "VALKEY_PASSWORD")
        .expect("password env present");
    let secret_ref = password
        .value_from
        .as_ref()
        .unwrap()
        .secret_key_ref
        .as_ref()
        .unwrap();
    assert!(!secret_ref.name.is_empty());
    assert!(!secret_ref.key.is_empty());

    let mut without_auth = full_resource("cache-group");
    without_auth.spec.existing_password_secret = None;
    let container = generate_valkey_container(&without_auth);
    assert!(
        !container
            .env
            .unwrap()
            .iter()
            .any(|e| e.name == "VALKEY_PASSWORD")
    );
}

#[test]
fn statefulset_carries_all_three_containers() {
    let resource = full_resource("cache-group");
    let params = replication_statefulset_params(&resource);
    let sts = generate_statefulset(&resource, &params);
    let pod = sts.spec.unwrap().template.spec.unwrap();

    let container_names: Vec<_> = pod.containers.iter().map(|c| c.name.clone()).collect();
    assert_eq!(container_names, vec!["valkey", "exporter"]);
    let init_names: Vec<_> = pod
        .init_containers
        .unwrap()
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(init_names, vec!["init"]);
}
