//! Per-metric scoring rules
//!
//! Every [`MetricKind`] maps to exactly one [`MetricRule`]; the match is
//! exhaustive, so adding a kind without a rule does not compile.

use quorum_types::MetricKind;
use serde::{Deserialize, Serialize};

/// Score and explanation for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// Scale-up pressure in [0, 1]; 0.5 is neutral
    pub score: f64,
    pub reason: String,
}

/// How a metric well below its target is scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleScoring {
    /// `max(0, 1 - current / target)`
    #[default]
    Inverse,
    /// `current / target`; lets an idle group fall under the scale-down
    /// threshold
    Proportional,
}

/// Scoring rule families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricRule {
    /// CPU and memory, in percent
    Utilisation,
    /// Connections and throughput
    Load,
    /// Query latency, in milliseconds
    Latency,
    /// External query results, unitless
    External,
}

impl MetricRule {
    pub fn for_kind(kind: &MetricKind) -> Self {
        match kind {
            MetricKind::Cpu | MetricKind::Memory => Self::Utilisation,
            MetricKind::Connections | MetricKind::Throughput => Self::Load,
            MetricKind::QueryLatencyP95 => Self::Latency,
            MetricKind::External { .. } => Self::External,
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Self::Utilisation => "%",
            Self::Load => "",
            Self::Latency => "ms",
            Self::External => "",
        }
    }

    /// Score `current` against `target`.
    ///
    /// Above target the score is `min(current / target, 1)`. Below half the
    /// target it is `max(0, 1 - current / target)`. In between it is neutral.
    pub fn evaluate(&self, label: &str, current: f64, target: f64) -> RuleOutcome {
        self.evaluate_with(label, current, target, IdleScoring::Inverse)
    }

    /// Score `current` against `target`, scoring the idle band with `idle`
    pub fn evaluate_with(&self, label: &str, current: f64, target: f64, idle: IdleScoring) -> RuleOutcome {
        let unit = self.unit();
        if target.is_nan() || target <= 0.0 || !current.is_finite() {
            return RuleOutcome {
                score: 0.5,
                reason: format!("{label}: target {target}{unit} unusable, treated as neutral"),
            };
        }
        let ratio = current / target;
        if ratio > 1.0 {
            RuleOutcome {
                score: ratio.min(1.0),
                reason: format!("{label} {current:.1}{unit} above target {target:.1}{unit}"),
            }
        } else if ratio < 0.5 {
            let score = match idle {
                IdleScoring::Inverse => (1.0 - ratio).max(0.0),
                IdleScoring::Proportional => ratio.max(0.0),
            };
            RuleOutcome {
                score: score.min(1.0),
                reason: format!("{label} {current:.1}{unit} below half of target {target:.1}{unit}"),
            }
        } else {
            RuleOutcome {
                score: 0.5,
                reason: format!("{label} {current:.1}{unit} near target {target:.1}{unit}"),
            }
        }
    }
}
