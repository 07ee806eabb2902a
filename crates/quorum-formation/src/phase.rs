//! Cluster phase lifecycle graph

use crate::{FormationError, FormationResult};
use quorum_types::ClusterPhase;
use std::collections::VecDeque;

/// Allowed phase transitions.
///
/// `Forming → AwaitingQuorum → Ready`, `Ready ↔ Scaling`, any phase to
/// `Degraded`, and recovery out of `Degraded`. A formed cluster whose
/// members all restart at once falls back to `AwaitingQuorum`.
pub struct PhaseMachine;

impl PhaseMachine {
    pub fn is_allowed(from: ClusterPhase, to: ClusterPhase) -> bool {
        use ClusterPhase::*;
        if from == to || to == Degraded {
            return true;
        }
        matches!(
            (from, to),
            (Forming, AwaitingQuorum)
                | (AwaitingQuorum, Ready)
                | (AwaitingQuorum, Forming)
                | (Ready, Scaling)
                | (Ready, AwaitingQuorum)
                | (Scaling, Ready)
                | (Scaling, AwaitingQuorum)
                | (Degraded, Forming)
                | (Degraded, AwaitingQuorum)
                | (Degraded, Ready)
        )
    }

    /// Validate a direct transition
    pub fn transition(from: ClusterPhase, to: ClusterPhase) -> FormationResult<ClusterPhase> {
        if Self::is_allowed(from, to) {
            Ok(to)
        } else {
            Err(FormationError::InvalidTransition { from, to })
        }
    }

    /// Move at most one edge from `from` toward `target`.
    ///
    /// Returns `target` when the edge exists, otherwise the first hop of a
    /// shortest path, so a cluster never skips an intermediate phase.
    pub fn step(from: ClusterPhase, target: ClusterPhase) -> ClusterPhase {
        if Self::is_allowed(from, target) {
            return target;
        }
        let mut queue = VecDeque::new();
        let mut visited = vec![from];
        for next in ClusterPhase::ALL {
            if next != from && Self::is_allowed(from, next) {
                visited.push(next);
                queue.push_back((next, next));
            }
        }
        while let Some((phase, first_hop)) = queue.pop_front() {
            if phase == target {
                return first_hop;
            }
            for next in ClusterPhase::ALL {
                if !visited.contains(&next) && Self::is_allowed(phase, next) {
                    visited.push(next);
                    queue.push_back((next, first_hop));
                }
            }
        }
        from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClusterPhase::*;

    #[test]
    fn test_formation_path() {
        assert!(PhaseMachine::is_allowed(Forming, AwaitingQuorum));
        assert!(PhaseMachine::is_allowed(AwaitingQuorum, Ready));
        assert!(!PhaseMachine::is_allowed(Forming, Ready));
    }

    #[test]
    fn test_any_phase_to_degraded() {
        for phase in ClusterPhase::ALL {
            assert!(PhaseMachine::is_allowed(phase, Degraded));
        }
    }

    #[test]
    fn test_step_never_skips_awaiting_quorum() {
        assert_eq!(PhaseMachine::step(Forming, Ready), AwaitingQuorum);
        assert_eq!(PhaseMachine::step(AwaitingQuorum, Ready), Ready);
        assert_eq!(PhaseMachine::step(Forming, Scaling), AwaitingQuorum);
    }

    #[test]
    fn test_transition_rejects_skips() {
        assert!(PhaseMachine::transition(Ready, Scaling).is_ok());
        assert!(matches!(
            PhaseMachine::transition(Forming, Scaling),
            Err(FormationError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_no_phase_is_terminal() {
        for phase in ClusterPhase::ALL {
            let exits = ClusterPhase::ALL
                .iter()
                .filter(|next| **next != phase && PhaseMachine::is_allowed(phase, **next))
                .count();
            assert!(exits > 0, "{phase} is terminal");
        }
    }
}
