//! Role label synchronization for replication group pods.
//!
//! The failover machinery decides which instance is the master; this module
//! records the decision by writing the `valkey-role` label on each pod so the
//! leader and follower services route correctly.
//!
//! Pods are processed strictly sequentially and the first fetch or write
//! failure aborts the batch: already-updated pods keep their new label and
//! the remainder is left untouched. Callers retry the whole batch; the write
//! is a value overwrite, so retrying is idempotent.
//!
//! There is no compare-and-swap between fetch and write. A concurrent label
//! change on the same pod can be lost; role changes are operator-driven and
//! rare, so this race is accepted.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, ResourceExt};
use tracing::{debug, error};

use crate::controller::error::{Error, Result};
use crate::crd::ReplicationRole;
use crate::resources::common::ROLE_LABEL_KEY;

/// Seam over pod metadata access, mockable in tests.
pub trait PodStore {
    fn get_pod(&self, name: &str) -> impl Future<Output = Result<Pod>> + Send;
    fn update_pod(&self, pod: &Pod) -> impl Future<Output = Result<Pod>> + Send;
}

impl PodStore for Api<Pod> {
    async fn get_pod(&self, name: &str) -> Result<Pod> {
        Api::get(self, name).await.map_err(Error::Kube)
    }

    async fn update_pod(&self, pod: &Pod) -> Result<Pod> {
        Api::replace(self, &pod.name_any(), &PostParams::default(), pod)
            .await
            .map_err(Error::Kube)
    }
}

/// Set the role label on pod metadata, overwriting any prior value.
pub fn set_role_label(meta: &mut ObjectMeta, role: ReplicationRole) {
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(ROLE_LABEL_KEY.to_string(), role.as_str().to_string());
}

/// Label each named pod with the given role, in order.
///
/// Fails fast: the first error is returned and the remaining pods are not
/// processed. No rollback of already-labeled pods.
pub async fn sync_role_labels<S: PodStore>(
    store: &S,
    role: ReplicationRole,
    pod_names: &[String],
) -> Result<()> {
    for name in pod_names {
        let mut pod = match store.get_pod(name).await {
            Ok(pod) => pod,
            Err(e) => {
                error!(pod = %name, role = %role, error = %e, "Cannot get replication pod");
                return Err(e);
            }
        };

        set_role_label(&mut pod.metadata, role);

        if let Err(e) = store.update_pod(&pod).await {
            error!(pod = %name, role = %role, error = %e, "Cannot update replication pod");
            return Err(e);
        }
        debug!(pod = %name, role = %role, "Labeled replication pod");
    }
    Ok(())
}

/// Label the named pods with their roles against the given namespace.
pub async fn sync_role_labels_in_namespace(
    client: kube::Client,
    namespace: &str,
    role: ReplicationRole,
    pod_names: &[String],
) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client, namespace);
    sync_role_labels(&pods, role, pod_names).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    /// In-memory pod store with injectable fetch and write failures.
    struct InMemoryPods {
        pods: Mutex<BTreeMap<String, Pod>>,
        fail_get: HashSet<String>,
        fail_update: HashSet<String>,
    }

    impl InMemoryPods {
        fn new(names: &[&str]) -> Self {
            let pods = names
                .iter()
                .map(|name| {
                    (
                        name.to_string(),
                        Pod {
                            metadata: ObjectMeta {
                                name: Some(name.to_string()),
                                namespace: Some("default".to_string()),
                                ..Default::default()
                            },
                            ..Default::default()
                        },
                    )
                })
                .collect();
            Self {
                pods: Mutex::new(pods),
                fail_get: HashSet::new(),
                fail_update: HashSet::new(),
            }
        }

        fn role_of(&self, name: &str) -> Option<String> {
            self.pods
                .lock()
                .unwrap()
                .get(name)
                .and_then(|p| p.metadata.labels.as_ref())
                .and_then(|l| l.get(ROLE_LABEL_KEY))
                .cloned()
        }
    }

    impl PodStore for InMemoryPods {
        async fn get_pod(&self, name: &str) -> Result<Pod> {
            if self.fail_get.contains(name) {
                return Err(Error::Transient(format!("injected get failure for {}", name)));
            }
            self.pods
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Permanent(format!("pod {} not found", name)))
        }

        async fn update_pod(&self, pod: &Pod) -> Result<Pod> {
            let name = pod.name_any();
            if self.fail_update.contains(&name) {
                return Err(Error::Transient(format!(
                    "injected update failure for {}",
                    name
                )));
            }
            self.pods.lock().unwrap().insert(name, pod.clone());
            Ok(pod.clone())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_labels_all_pods_in_order() {
        let store = InMemoryPods::new(&["pod-0", "pod-1", "pod-2"]);
        sync_role_labels(&store, ReplicationRole::Slave, &names(&["pod-0", "pod-1", "pod-2"]))
            .await
            .unwrap();

        for name in ["pod-0", "pod-1", "pod-2"] {
            assert_eq!(store.role_of(name), Some("slave".to_string()));
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_remaining() {
        let mut store = InMemoryPods::new(&["pod-a", "pod-b", "pod-c"]);
        store.fail_get.insert("pod-b".to_string());

        let result = sync_role_labels(
            &store,
            ReplicationRole::Master,
            &names(&["pod-a", "pod-b", "pod-c"]),
        )
        .await;

        assert!(result.is_err());
        // pod-a was labeled before the failure, pod-c never processed
        assert_eq!(store.role_of("pod-a"), Some("master".to_string()));
        assert_eq!(store.role_of("pod-b"), None);
        assert_eq!(store.role_of("pod-c"), None);
    }

    #[tokio::test]
    async fn test_write_failure_aborts_remaining() {
        let mut store = InMemoryPods::new(&["pod-a", "pod-b"]);
        store.fail_update.insert("pod-a".to_string());

        let result =
            sync_role_labels(&store, ReplicationRole::Master, &names(&["pod-a", "pod-b"])).await;

        assert!(result.is_err());
        assert_eq!(store.role_of("pod-a"), None);
        assert_eq!(store.role_of("pod-b"), None);
    }

    #[tokio::test]
    async fn test_reapply_same_role_is_noop() {
        let store = InMemoryPods::new(&["pod-0"]);
        sync_role_labels(&store, ReplicationRole::Master, &names(&["pod-0"]))
            .await
            .unwrap();
        sync_role_labels(&store, ReplicationRole::Master, &names(&["pod-0"]))
            .await
            .unwrap();
        assert_eq!(store.role_of("pod-0"), Some("master".to_string()));
    }

    #[tokio::test]
    async fn test_role_change_overwrites_prior_value() {
        let store = InMemoryPods::new(&["pod-0"]);
        sync_role_labels(&store, ReplicationRole::Slave, &names(&["pod-0"]))
            .await
            .unwrap();
        sync_role_labels(&store, ReplicationRole::Master, &names(&["pod-0"]))
            .await
            .unwrap();
        assert_eq!(store.role_of("pod-0"), Some("master".to_string()));
    }

    #[test]
    fn test_set_role_label_preserves_other_labels() {
        let mut meta = ObjectMeta {
            labels: Some(BTreeMap::from([(
                "app.kubernetes.io/name".to_string(),
                "my-group".to_string(),
            )])),
            ..Default::default()
        };
        set_role_label(&mut meta, ReplicationRole::Master);
        let labels = meta.labels.unwrap();
        assert_eq!(labels.get(ROLE_LABEL_KEY), Some(&"master".to_string()));
        assert_eq!(
            labels.get("app.kubernetes.io/name"),
            Some(&"my-group".to_string())
        );
    }
}
