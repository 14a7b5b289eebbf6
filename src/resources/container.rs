//! Container generation for Valkey replication groups.
//!
//! Builds the primary Valkey container, the optional metrics exporter sidecar
//! and the optional init container. The builders are pure functions over the
//! ValkeyReplication spec; optional spec sections that are absent leave no
//! trace in the generated containers.

use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, Probe,
    ResourceRequirements, SecretKeySelector, SecurityContext, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

use crate::crd::{DEFAULT_CLIENT_PORT, ValkeyReplication};

/// Valkey user ID in the official container image
pub(crate) const VALKEY_USER_ID: i64 = 999;
/// Mount path for TLS certificates
const TLS_MOUNT_PATH: &str = "/etc/valkey/certs";
/// Mount path for the ACL file
const ACL_MOUNT_PATH: &str = "/etc/valkey/acl";
/// Volume name for the data mount
pub(crate) const DATA_VOLUME_NAME: &str = "data";
/// Volume name for the TLS secret mount
pub(crate) const TLS_VOLUME_NAME: &str = "tls-certs";
/// Volume name for the ACL secret mount
pub(crate) const ACL_VOLUME_NAME: &str = "acl-secret";

/// Generate the primary Valkey container.
pub fn generate_valkey_container(resource: &ValkeyReplication) -> Container {
    let spec = &resource.spec;

    Container {
        name: "valkey".to_string(),
        image: Some(format!("{}:{}", spec.image.repository, spec.image.tag)),
        image_pull_policy: Some(spec.image.pull_policy.clone()),
        ports: Some(vec![ContainerPort {
            container_port: DEFAULT_CLIENT_PORT,
            name: Some("client".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(generate_env_vars(resource)),
        resources: Some(
            spec.resources
                .clone()
                .unwrap_or_else(default_resource_requirements),
        ),
        volume_mounts: {
            let mounts = generate_volume_mounts(resource);
            if mounts.is_empty() { None } else { Some(mounts) }
        },
        security_context: Some(
            spec.security_context
                .clone()
                .unwrap_or_else(default_container_security_context),
        ),
        liveness_probe: Some(
            spec.liveness_probe
                .clone()
                .unwrap_or_else(|| default_ping_probe(resource, 10)),
        ),
        readiness_probe: Some(
            spec.readiness_probe
                .clone()
                .unwrap_or_else(|| default_ping_probe(resource, 5)),
        ),
        ..Default::default()
    }
}

/// Generate the metrics exporter sidecar.
///
/// Returns `None` unless the exporter is enabled in the spec. Resource and
/// environment overrides are applied only when explicitly set; unset fields
/// fall back to the builder defaults.
pub fn generate_exporter_sidecar(resource: &ValkeyReplication) -> Option<Container> {
    let exporter = resource.spec.exporter.as_ref().filter(|e| e.enabled)?;

    let mut env = vec![EnvVar {
        name: "VALKEY_EXPORTER_WEB_LISTEN_ADDRESS".to_string(),
        value: Some(format!(":{}", exporter.port)),
        ..Default::default()
    }];
    let scheme = if resource.spec.tls.is_some() {
        "valkeys"
    } else {
        "valkey"
    };
    env.push(EnvVar {
        name: "VALKEY_ADDR".to_string(),
        value: Some(format!("{}://localhost:{}", scheme, DEFAULT_CLIENT_PORT)),
        ..Default::default()
    });
    if let Some(password) = password_env(resource, "VALKEY_PASSWORD") {
        env.push(password);
    }
    if let Some(tls) = &resource.spec.tls {
        env.push(EnvVar {
            name: "VALKEY_EXPORTER_TLS_CLIENT_CERT_FILE".to_string(),
            value: Some(format!("{}/{}", TLS_MOUNT_PATH, tls.cert_file)),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "VALKEY_EXPORTER_TLS_CLIENT_KEY_FILE".to_string(),
            value: Some(format!("{}/{}", TLS_MOUNT_PATH, tls.key_file)),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "VALKEY_EXPORTER_TLS_CA_CERT_FILE".to_string(),
            value: Some(format!("{}/{}", TLS_MOUNT_PATH, tls.ca_file)),
            ..Default::default()
        });
    }
    if let Some(extra) = &exporter.env {
        env.extend(extra.iter().cloned());
    }

    let volume_mounts = resource.spec.tls.as_ref().map(|_| {
        vec![VolumeMount {
            name: TLS_VOLUME_NAME.to_string(),
            mount_path: TLS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]
    });

    Some(Container {
        name: "exporter".to_string(),
        image: Some(exporter.image.clone()),
        image_pull_policy: Some(exporter.pull_policy.clone()),
        ports: Some(vec![ContainerPort {
            container_port: exporter.port,
            name: Some("metrics".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env),
        resources: Some(
            exporter
                .resources
                .clone()
                .unwrap_or_else(default_sidecar_resource_requirements),
        ),
        volume_mounts,
        security_context: Some(default_container_security_context()),
        ..Default::default()
    })
}

/// Generate the init container run before Valkey starts.
///
/// Returns `None` when the spec has no init container section, or when the
/// section is disabled; the workload builder then omits the container
/// entirely rather than including an empty one.
pub fn generate_init_container(resource: &ValkeyReplication) -> Option<Container> {
    let init = resource.spec.init_container.as_ref().filter(|i| i.enabled)?;

    let mut env = Vec::new();
    if resource.spec.storage.is_some() {
        env.push(EnvVar {
            name: "PERSISTENCE_ENABLED".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        });
    }
    if let Some(extra) = &init.env {
        env.extend(extra.iter().cloned());
    }

    // The init container shares the data mount path with the primary
    // container so restored data lands where Valkey expects it.
    let volume_mounts = resource.spec.storage.as_ref().map(|storage| {
        vec![VolumeMount {
            name: DATA_VOLUME_NAME.to_string(),
            mount_path: storage.mount_path.clone(),
            ..Default::default()
        }]
    });

    Some(Container {
        name: "init".to_string(),
        image: Some(init.image.clone()),
        image_pull_policy: Some(init.pull_policy.clone()),
        command: if init.command.is_empty() {
            None
        } else {
            Some(init.command.clone())
        },
        args: if init.args.is_empty() {
            None
        } else {
            Some(init.args.clone())
        },
        env: if env.is_empty() { None } else { Some(env) },
        resources: Some(
            init.resources
                .clone()
                .unwrap_or_else(default_sidecar_resource_requirements),
        ),
        volume_mounts,
        security_context: Some(default_container_security_context()),
        ..Default::default()
    })
}

/// Environment variables for the primary Valkey container.
fn generate_env_vars(resource: &ValkeyReplication) -> Vec<EnvVar> {
    let spec = &resource.spec;

    let mut env = vec![EnvVar {
        name: "SETUP_MODE".to_string(),
        value: Some("replication".to_string()),
        ..Default::default()
    }];

    if let Some(password) = password_env(resource, "VALKEY_PASSWORD") {
        env.push(password);
    }

    if spec.storage.is_some() {
        env.push(EnvVar {
            name: "PERSISTENCE_ENABLED".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        });
    }

    if let Some(tls) = &spec.tls {
        env.push(EnvVar {
            name: "TLS_MODE".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "VALKEY_TLS_CERT".to_string(),
            value: Some(format!("{}/{}", TLS_MOUNT_PATH, tls.cert_file)),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "VALKEY_TLS_CERT_KEY".to_string(),
            value: Some(format!("{}/{}", TLS_MOUNT_PATH, tls.key_file)),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "VALKEY_TLS_CA_KEY".to_string(),
            value: Some(format!("{}/{}", TLS_MOUNT_PATH, tls.ca_file)),
            ..Default::default()
        });
    }

    if spec.acl.is_some() {
        env.push(EnvVar {
            name: "ACL_MODE".to_string(),
            value: Some("true".to_string()),
            ..Default::default()
        });
    }

    if let Some(extra) = &spec.env {
        env.extend(extra.iter().cloned());
    }

    env
}

/// Password environment variable from the existing secret, if configured.
///
/// `Some` carries both the secret name and key; `None` means the group runs
/// without authentication. There is no in-between.
fn password_env(resource: &ValkeyReplication, var_name: &str) -> Option<EnvVar> {
    let secret = resource.spec.existing_password_secret.as_ref()?;
    Some(EnvVar {
        name: var_name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.name.clone(),
                key: secret.key.clone(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Volume mounts for the primary container. Empty when nothing is configured.
fn generate_volume_mounts(resource: &ValkeyReplication) -> Vec<VolumeMount> {
    let mut mounts = Vec::new();

    if let Some(storage) = &resource.spec.storage {
        mounts.push(VolumeMount {
            name: DATA_VOLUME_NAME.to_string(),
            mount_path: storage.mount_path.clone(),
            ..Default::default()
        });
    }
    if resource.spec.tls.is_some() {
        mounts.push(VolumeMount {
            name: TLS_VOLUME_NAME.to_string(),
            mount_path: TLS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
    if resource.spec.acl.is_some() {
        mounts.push(VolumeMount {
            name: ACL_VOLUME_NAME.to_string(),
            mount_path: ACL_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    mounts
}

/// Default ping probe for the Valkey container.
fn default_ping_probe(resource: &ValkeyReplication, initial_delay: i32) -> Probe {
    let mut cmd = String::new();
    if resource.spec.existing_password_secret.is_some() {
        cmd.push_str("VALKEYCLI_AUTH=$VALKEY_PASSWORD ");
    }
    cmd.push_str("valkey-cli ");
    if resource.spec.tls.is_some() {
        cmd.push_str("--tls --insecure ");
    }
    cmd.push_str("ping");

    Probe {
        exec: Some(ExecAction {
            command: Some(vec!["sh".to_string(), "-c".to_string(), cmd]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

/// Default hardened security context for all containers.
fn default_container_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(false), // Valkey needs to write its working dir
        run_as_non_root: Some(true),
        run_as_user: Some(VALKEY_USER_ID),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Default resource requirements for the Valkey container.
fn default_resource_requirements() -> ResourceRequirements {
    resource_requirements("100m", "128Mi", "500m", "512Mi")
}

/// Default resource requirements for the exporter and init containers.
fn default_sidecar_resource_requirements() -> ResourceRequirements {
    resource_requirements("50m", "64Mi", "100m", "128Mi")
}

fn resource_requirements(
    req_cpu: &str,
    req_mem: &str,
    lim_cpu: &str,
    lim_mem: &str,
) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some({
            let mut requests = BTreeMap::new();
            requests.insert("cpu".to_string(), Quantity(req_cpu.to_string()));
            requests.insert("memory".to_string(), Quantity(req_mem.to_string()));
            requests
        }),
        limits: Some({
            let mut limits = BTreeMap::new();
            limits.insert("cpu".to_string(), Quantity(lim_cpu.to_string()));
            limits.insert("memory".to_string(), Quantity(lim_mem.to_string()));
            limits
        }),
        ..Default::default()
    }
}
