//! # Quorum Autoscale
//!
//! Metrics collection and the scale decision engine.
//!
//! ## Key Components
//!
//! - [`MetricsSource`]: external time-series queries (query + time → scalar)
//! - [`PrometheusSource`]: HTTP implementation with a bounded request timeout
//! - [`FallbackValues`]: configurable per-category substitutes used when the
//!   source fails; every substitution lowers decision confidence
//! - [`MetricsCollector`]: builds a [`MetricSnapshot`](quorum_types::MetricSnapshot)
//!   per scalable group, carrying the previous value forward
//! - [`MetricRule`]: finite registry mapping each metric kind to its scoring rule
//! - [`ScaleDecisionEngine`]: one-step decisions with quorum protection,
//!   odd-count preservation, zone distribution and bound clamping

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod rules;
pub mod source;
pub mod zones;

pub use collector::{MetricsCollector, ResolvedValue};
pub use config::{MetricsConfig, QueryTemplates};
pub use engine::{ensure_odd_replicas, Evaluation, ScaleDecisionEngine, ScalingContext};
pub use error::{MetricsError, MetricsResult};
pub use fallback::FallbackValues;
pub use rules::{IdleScoring, MetricRule, RuleOutcome};
pub use source::{MetricsSource, PrometheusSource};
pub use zones::distribute_across_zones;
