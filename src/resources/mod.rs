//! Resource generation module.
//!
//! Contains the builders for the Kubernetes resources owned by a
//! ValkeyReplication group, plus the apply primitives that upsert them.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | StatefulSet | Stable pod identity for the replication group |
//! | Headless Service | Per-pod DNS (publishNotReadyAddresses) |
//! | Primary Service | Client access endpoint |
//! | Additional Service | External exposure (NodePort/LoadBalancer) |
//! | Leader Service | Routes to the current master only |
//! | Follower Service | Routes to the current replicas only |

pub mod apply;
pub mod common;
pub mod container;
pub mod services;
pub mod statefulset;

// Re-export commonly used items from common
pub use common::{ROLE_LABEL_KEY, owner_reference, replication_labels};
