//! Service topology for Valkey replication groups.
//!
//! Every group owns five Services, generated in a fixed order:
//! - **Headless** (`<group>-headless`): stable per-pod DNS, no cluster IP
//! - **Primary** (`<group>`): client-facing ClusterIP
//! - **Additional** (`<group>-additional`): external exposure, type from the
//!   service override
//! - **Leader** (`<group>-leader`): selects only the current master
//! - **Follower** (`<group>-follower`): selects only the current replicas
//!
//! The headless and primary Services are the critical path: a failure there
//! aborts the whole topology apply. The remaining three are best effort; a
//! failure is logged and the sibling Services still get applied.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::controller::error::Error;
use crate::crd::{DEFAULT_CLIENT_PORT, ReplicationRole, ValkeyReplication};
use crate::resources::common::{
    additional_service_name, follower_service_name, generate_object_meta, headless_service_name,
    leader_service_name, pod_selector_labels, replication_labels, role_selector_labels,
    standard_annotations,
};

/// Default metrics port when the exporter spec carries no override
const DEFAULT_METRICS_PORT: i32 = 9121;

/// The five Services owned by a replication group, in apply order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EndpointKind {
    Headless,
    Primary,
    Additional,
    Leader,
    Follower,
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointKind::Headless => write!(f, "headless"),
            EndpointKind::Primary => write!(f, "primary"),
            EndpointKind::Additional => write!(f, "additional"),
            EndpointKind::Leader => write!(f, "leader"),
            EndpointKind::Follower => write!(f, "follower"),
        }
    }
}

/// Whether a failed apply aborts the topology or is merely logged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Criticality {
    /// Failure aborts the whole apply immediately.
    Critical,
    /// Failure is logged; remaining Services are still attempted.
    BestEffort,
}

/// One planned Service apply.
#[derive(Clone, Debug)]
pub struct ServicePlan {
    pub kind: EndpointKind,
    pub criticality: Criticality,
    pub service: Service,
}

/// Result of one attempted Service apply.
#[derive(Debug)]
pub struct ServiceOutcome {
    pub kind: EndpointKind,
    pub result: Result<(), Error>,
}

/// Seam for applying a Service against the cluster, mockable in tests.
pub trait ServiceApplier {
    fn apply(&self, service: &Service) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Build the full Service plan for a replication group.
///
/// Pure and deterministic: the same spec always yields a byte-identical plan.
pub fn replication_service_plan(resource: &ValkeyReplication) -> Vec<ServicePlan> {
    let metrics_enabled = resource
        .spec
        .exporter
        .as_ref()
        .is_some_and(|e| e.enabled);
    let override_type = resource
        .spec
        .service
        .as_ref()
        .map_or("ClusterIP", |s| s.service_type.as_str());
    let extra_annotations = resource.spec.service.as_ref().map(|s| &s.annotations);

    vec![
        ServicePlan {
            kind: EndpointKind::Headless,
            criticality: Criticality::Critical,
            service: endpoint_service(
                resource,
                headless_service_name(resource),
                pod_selector_labels(resource),
                true,
                false,
                "ClusterIP",
                None,
            ),
        },
        ServicePlan {
            kind: EndpointKind::Primary,
            criticality: Criticality::Critical,
            service: endpoint_service(
                resource,
                resource.name_any(),
                pod_selector_labels(resource),
                false,
                metrics_enabled,
                "ClusterIP",
                None,
            ),
        },
        ServicePlan {
            kind: EndpointKind::Additional,
            criticality: Criticality::BestEffort,
            service: endpoint_service(
                resource,
                additional_service_name(resource),
                pod_selector_labels(resource),
                false,
                false,
                override_type,
                extra_annotations,
            ),
        },
        ServicePlan {
            kind: EndpointKind::Leader,
            criticality: Criticality::BestEffort,
            service: endpoint_service(
                resource,
                leader_service_name(resource),
                role_selector_labels(resource, ReplicationRole::Master.as_str()),
                false,
                metrics_enabled,
                override_type,
                None,
            ),
        },
        ServicePlan {
            kind: EndpointKind::Follower,
            criticality: Criticality::BestEffort,
            service: endpoint_service(
                resource,
                follower_service_name(resource),
                role_selector_labels(resource, ReplicationRole::Slave.as_str()),
                false,
                metrics_enabled,
                override_type,
                None,
            ),
        },
    ]
}

/// Apply a Service plan in order.
///
/// A critical failure is returned immediately and later entries are never
/// attempted. A best-effort failure is logged and recorded in the outcome
/// list while the apply continues.
pub async fn apply_service_plan<A: ServiceApplier>(
    applier: &A,
    plan: Vec<ServicePlan>,
) -> Result<Vec<ServiceOutcome>, Error> {
    let mut outcomes = Vec::with_capacity(plan.len());

    for entry in plan {
        let name = entry.service.name_any();
        match applier.apply(&entry.service).await {
            Ok(()) => {
                debug!(service = %name, kind = %entry.kind, "Applied service");
                outcomes.push(ServiceOutcome {
                    kind: entry.kind,
                    result: Ok(()),
                });
            }
            Err(e) => match entry.criticality {
                Criticality::Critical => {
                    warn!(service = %name, kind = %entry.kind, error = %e, "Cannot apply service");
                    return Err(e);
                }
                Criticality::BestEffort => {
                    warn!(
                        service = %name,
                        kind = %entry.kind,
                        error = %e,
                        "Cannot apply optional service, continuing"
                    );
                    outcomes.push(ServiceOutcome {
                        kind: entry.kind,
                        result: Err(e),
                    });
                }
            },
        }
    }

    Ok(outcomes)
}

/// Build and apply the full Service topology for a replication group.
pub async fn ensure_replication_services(
    client: kube::Client,
    resource: &ValkeyReplication,
) -> Result<Vec<ServiceOutcome>, Error> {
    let applier = crate::resources::apply::NamespacedApplier::new(client, resource);
    apply_service_plan(&applier, replication_service_plan(resource)).await
}

/// Assemble one endpoint Service.
#[allow(clippy::too_many_arguments)]
fn endpoint_service(
    resource: &ValkeyReplication,
    name: String,
    selector: BTreeMap<String, String>,
    headless: bool,
    expose_metrics: bool,
    service_type: &str,
    extra_annotations: Option<&BTreeMap<String, String>>,
) -> Service {
    let labels = replication_labels(resource);
    let mut annotations = standard_annotations(resource);
    if let Some(extra) = extra_annotations {
        for (key, value) in extra {
            annotations.insert(key.clone(), value.clone());
        }
    }

    let mut ports = vec![ServicePort {
        port: DEFAULT_CLIENT_PORT,
        target_port: Some(IntOrString::String("client".to_string())),
        name: Some("client".to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];
    if expose_metrics {
        let metrics_port = resource
            .spec
            .exporter
            .as_ref()
            .map_or(DEFAULT_METRICS_PORT, |e| e.port);
        ports.push(ServicePort {
            port: metrics_port,
            target_port: Some(IntOrString::String("metrics".to_string())),
            name: Some("metrics".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }

    Service {
        metadata: generate_object_meta(resource, name, labels, annotations),
        spec: Some(ServiceSpec {
            cluster_ip: if headless {
                Some("None".to_string())
            } else {
                None
            },
            // DNS must resolve pods before they are ready so replicas can
            // find the master during startup.
            publish_not_ready_addresses: if headless { Some(true) } else { None },
            type_: if headless {
                Some("ClusterIP".to_string())
            } else {
                Some(service_type.to_string())
            },
            selector: Some(selector),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}
