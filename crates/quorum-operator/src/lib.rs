//! Quorum Operator - database cluster reconciliation daemon
//!
//! This crate wires the quorum crates into a running operator:
//! - Operator context shared by every task
//! - Reconcile cycle, scheduler and scope watcher
//! - Substrate trait with an in-memory implementation
//! - Diagnostics API and Prometheus metrics

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod scheduler;
pub mod server;
pub mod substrate;
pub mod watcher;

pub use config::{LogFormat, OperatorConfig};
pub use context::{cancelled, OperatorContext};
pub use error::{ApiError, OperatorError, ReconcileError};
pub use metrics::OperatorMetrics;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use scheduler::{ReconcileTrigger, Scheduler};
pub use server::Server;
pub use substrate::{InMemorySubstrate, Substrate, SubstrateEvent};
pub use watcher::{ReconcileScope, ScopeSignal, ScopeSupervisor};
