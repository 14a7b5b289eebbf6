//! ValkeyReplication Custom Resource Definition.
//!
//! Defines the ValkeyReplication CRD for deploying a leader/follower Valkey
//! replication group on Kubernetes. Optional sections (storage, TLS, ACL,
//! exporter, init container) are modeled as `Option` so that "not configured"
//! is structurally distinct from "configured with defaults".

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSetUpdateStrategy;
use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, PodSecurityContext, Probe, ResourceRequirements, SecurityContext, Toleration,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ValkeyReplication is a custom resource for deploying a Valkey replication
/// group: one master and a set of replicas managed as a unit.
///
/// Example:
/// ```yaml
/// apiVersion: valkeyoperator.smoketurner.com/v1alpha1
/// kind: ValkeyReplication
/// metadata:
///   name: my-group
/// spec:
///   replicas: 3
///   storage:
///     size: 10Gi
///   exporter:
///     enabled: true
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "valkeyoperator.smoketurner.com",
    version = "v1alpha1",
    kind = "ValkeyReplication",
    plural = "valkeyreplications",
    shortname = "vr",
    status = "ValkeyReplicationStatus",
    namespaced,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ValkeyReplicationSpec {
    // === Topology ===
    /// Number of instances in the replication group (default 3).
    /// One instance becomes the master, the rest replicate from it.
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    // === Image ===
    /// Valkey container image configuration.
    #[serde(default)]
    pub image: ImageSpec,

    /// Resource requests and limits for the Valkey container.
    /// Falls back to the builder defaults when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub resources: Option<ResourceRequirements>,

    // === Authentication ===
    /// Reference to an existing Secret holding the password.
    /// When absent, the group runs without authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_password_secret: Option<SecretKeyRef>,

    // === Storage ===
    /// Persistent storage configuration. When absent, data lives in an
    /// emptyDir and does not survive pod restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    // === TLS ===
    /// TLS configuration. When absent, connections are plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,

    // === ACL ===
    /// ACL configuration mounted from a Secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<AclSpec>,

    // === Metrics exporter ===
    /// Metrics exporter sidecar configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter: Option<ExporterSpec>,

    // === Init container ===
    /// Optional container run before Valkey starts, e.g. to restore a backup
    /// into the data volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_container: Option<InitContainerSpec>,

    // === Environment ===
    /// Additional environment variables for the Valkey container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub env: Option<Vec<EnvVar>>,

    // === Probes ===
    /// Liveness probe override for the Valkey container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub liveness_probe: Option<Probe>,

    /// Readiness probe override for the Valkey container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub readiness_probe: Option<Probe>,

    // === Security ===
    /// Security context override for the Valkey container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub security_context: Option<SecurityContext>,

    /// Pod-level security context override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub pod_security_context: Option<PodSecurityContext>,

    // === Scheduling ===
    /// Pod scheduling constraints.
    #[serde(default)]
    pub scheduling: SchedulingSpec,

    // === Service overrides ===
    /// Overrides for the externally reachable additional service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceOverrideSpec>,

    /// StatefulSet update strategy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub update_strategy: Option<StatefulSetUpdateStrategy>,

    /// Service account for the Valkey pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    // === Custom labels / annotations ===
    /// Additional labels applied to all managed resources. System-reserved
    /// label keys take precedence on conflict.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Additional annotations applied to all managed resources.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Default for ValkeyReplicationSpec {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            image: ImageSpec::default(),
            resources: None,
            existing_password_secret: None,
            storage: None,
            tls: None,
            acl: None,
            exporter: None,
            init_container: None,
            env: None,
            liveness_probe: None,
            readiness_probe: None,
            security_context: None,
            pod_security_context: None,
            scheduling: SchedulingSpec::default(),
            service: None,
            update_strategy: None,
            service_account_name: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }
}

impl ValkeyReplicationSpec {
    /// Replica count for the replication topology.
    ///
    /// The sharded-cluster topology resolves its count differently, so the
    /// workload builder goes through this accessor rather than reading the
    /// field directly.
    pub fn replication_counts(&self) -> i32 {
        self.replicas
    }
}

fn default_replicas() -> i32 {
    3
}

/// Container image specification.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Container image repository (default: valkey/valkey).
    #[serde(default = "default_image_repository")]
    pub repository: String,

    /// Image tag (default: 8-alpine).
    #[serde(default = "default_image_tag")]
    pub tag: String,

    /// Image pull policy (default: IfNotPresent).
    #[serde(default = "default_image_pull_policy")]
    pub pull_policy: String,

    /// Image pull secrets.
    #[serde(default)]
    pub pull_secrets: Vec<String>,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            repository: default_image_repository(),
            tag: default_image_tag(),
            pull_policy: default_image_pull_policy(),
            pull_secrets: Vec::new(),
        }
    }
}

fn default_image_repository() -> String {
    "valkey/valkey".to_string()
}

fn default_image_tag() -> String {
    "8-alpine".to_string()
}

fn default_image_pull_policy() -> String {
    "IfNotPresent".to_string()
}

/// Reference to a key within a Secret.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Name of the Secret.
    pub name: String,

    /// Key within the Secret containing the password (default: password).
    #[serde(default = "default_password_key")]
    pub key: String,
}

fn default_password_key() -> String {
    "password".to_string()
}

/// Persistent storage configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Size of the PersistentVolumeClaim (default: 10Gi).
    #[serde(default = "default_storage_size")]
    pub size: String,

    /// Storage class name. If not set, uses the cluster default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Mount path for the data volume (default: /data).
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            size: default_storage_size(),
            storage_class_name: None,
            mount_path: default_mount_path(),
        }
    }
}

fn default_storage_size() -> String {
    "10Gi".to_string()
}

fn default_mount_path() -> String {
    "/data".to_string()
}

/// TLS configuration for encrypted client and replication traffic.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    /// Name of the Secret holding tls.crt, tls.key and ca.crt.
    pub secret_name: String,

    /// Certificate file name within the Secret (default: tls.crt).
    #[serde(default = "default_cert_file")]
    pub cert_file: String,

    /// Key file name within the Secret (default: tls.key).
    #[serde(default = "default_key_file")]
    pub key_file: String,

    /// CA file name within the Secret (default: ca.crt).
    #[serde(default = "default_ca_file")]
    pub ca_file: String,
}

fn default_cert_file() -> String {
    "tls.crt".to_string()
}

fn default_key_file() -> String {
    "tls.key".to_string()
}

fn default_ca_file() -> String {
    "ca.crt".to_string()
}

/// ACL configuration mounted from a Secret.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AclSpec {
    /// Name of the Secret holding the user.acl file.
    pub secret_name: String,
}

/// Metrics exporter sidecar configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExporterSpec {
    /// Enable the exporter sidecar (default: false).
    #[serde(default)]
    pub enabled: bool,

    /// Exporter container image.
    #[serde(default = "default_exporter_image")]
    pub image: String,

    /// Exporter image pull policy (default: IfNotPresent).
    #[serde(default = "default_image_pull_policy")]
    pub pull_policy: String,

    /// Port the exporter listens on (default: 9121).
    #[serde(default = "default_exporter_port")]
    pub port: i32,

    /// Resource overrides for the exporter container.
    /// Falls back to the builder defaults when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub resources: Option<ResourceRequirements>,

    /// Additional environment variables for the exporter container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub env: Option<Vec<EnvVar>>,
}

impl Default for ExporterSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            image: default_exporter_image(),
            pull_policy: default_image_pull_policy(),
            port: default_exporter_port(),
            resources: None,
            env: None,
        }
    }
}

fn default_exporter_image() -> String {
    "oliver006/redis_exporter:latest".to_string()
}

fn default_exporter_port() -> i32 {
    9121
}

/// Init container run before the Valkey container starts.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitContainerSpec {
    /// Enable the init container (default: true when the section is present).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Init container image.
    pub image: String,

    /// Image pull policy (default: IfNotPresent).
    #[serde(default = "default_image_pull_policy")]
    pub pull_policy: String,

    /// Entrypoint command.
    #[serde(default)]
    pub command: Vec<String>,

    /// Entrypoint arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables for the init container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub env: Option<Vec<EnvVar>>,

    /// Resource overrides for the init container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub resources: Option<ResourceRequirements>,
}

fn default_true() -> bool {
    true
}

/// Pod scheduling configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingSpec {
    /// Node selector for pod placement.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations for pod scheduling.
    #[serde(default)]
    #[schemars(skip)]
    pub tolerations: Vec<Toleration>,

    /// Pod affinity/anti-affinity rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub affinity: Option<Affinity>,

    /// Priority class for the Valkey pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Termination grace period in seconds (default: 30).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

/// Overrides for the externally reachable additional service.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOverrideSpec {
    /// Service type for the additional, leader and follower services
    /// (default: ClusterIP). Supports NodePort and LoadBalancer for
    /// external exposure.
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Extra annotations applied to the additional service only.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Default for ServiceOverrideSpec {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            annotations: BTreeMap::new(),
        }
    }
}

fn default_service_type() -> String {
    "ClusterIP".to_string()
}

/// Status of a ValkeyReplication group.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValkeyReplicationStatus {
    /// Number of ready instances reported by the StatefulSet.
    #[serde(default)]
    pub ready_replicas: i32,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition describes the state of a replication group at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("Progressing", progressing, reason, message, generation)
    }

    /// Create a "Degraded" condition.
    pub fn degraded(degraded: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Degraded", degraded, reason, message, generation)
    }
}

/// Replication role of a single Valkey instance.
///
/// Roles are decided externally (by the failover machinery); the operator
/// only records them as pod labels and selects on them in the leader and
/// follower services.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationRole {
    /// The instance accepting writes.
    Master,
    /// An instance replicating from the master.
    Slave,
}

impl ReplicationRole {
    /// Label value for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationRole::Master => "master",
            ReplicationRole::Slave => "slave",
        }
    }
}

impl std::fmt::Display for ReplicationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default client port for Valkey.
pub const DEFAULT_CLIENT_PORT: i32 = 6379;
