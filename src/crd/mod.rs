//! Custom Resource Definitions (CRDs) for the valkey-replication-operator.
//!
//! - `ValkeyReplication`: Deploy and manage a leader/follower Valkey
//!   replication group

mod valkey_replication;

pub use valkey_replication::*;
