//! Controller module for the valkey-replication-operator.
//!
//! Contains the reconciliation loop, error handling, the shared context and
//! the role label synchronizer.

pub mod context;
pub mod error;
pub mod reconciler;
pub mod role_sync;
