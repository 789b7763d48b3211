//! Schedule extraction.
//!
//! Turns a solver [`Outcome`] into a [`Schedule`] and re-validates it
//! directly against the instance, independent of the solver's own
//! feasibility claim. A schedule that fails any check is never returned.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::InconsistentSolutionError;
use crate::models::{Instance, Schedule, Violation};
use crate::solver::Outcome;
use crate::validation::check_schedule;

/// Why no schedule is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoScheduleReason {
    /// The backend proved infeasibility.
    Infeasible,
    /// The backend stopped before finding a solution.
    TimedOut {
        /// Best lower bound reached, if any.
        best_bound: Option<i64>,
    },
}

/// Result of extracting a schedule from an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// A validated schedule.
    Scheduled(Schedule),
    /// No schedule, and why.
    NoFeasibleSchedule(NoScheduleReason),
}

impl Extraction {
    /// The schedule, if one was extracted.
    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            Extraction::Scheduled(s) => Some(s),
            Extraction::NoFeasibleSchedule(_) => None,
        }
    }

    /// Consumes the extraction, returning the schedule if any.
    pub fn into_schedule(self) -> Option<Schedule> {
        match self {
            Extraction::Scheduled(s) => Some(s),
            Extraction::NoFeasibleSchedule(_) => None,
        }
    }
}

/// Extracts and validates the schedule carried by `outcome`.
///
/// For `Optimal` and `Feasible` outcomes, checks that every operation has
/// exactly one start, starts are non-negative, job precedences and machine
/// exclusivity hold, and the reported objective equals the makespan.
///
/// # Errors
/// [`InconsistentSolutionError`] listing every failed check.
pub fn extract_schedule(
    instance: &Instance,
    outcome: &Outcome,
) -> Result<Extraction, InconsistentSolutionError> {
    let (assignment, objective) = match outcome {
        Outcome::Optimal {
            assignment,
            objective,
        }
        | Outcome::Feasible {
            assignment,
            objective,
            ..
        } => (assignment, *objective),
        Outcome::Infeasible => {
            return Ok(Extraction::NoFeasibleSchedule(NoScheduleReason::Infeasible))
        }
        Outcome::TimedOut { best_bound } => {
            return Ok(Extraction::NoFeasibleSchedule(NoScheduleReason::TimedOut {
                best_bound: *best_bound,
            }))
        }
    };

    let mut violations = check_schedule(instance, &assignment.starts);
    let schedule = Schedule::from_starts(instance, &assignment.starts);
    let makespan = schedule.makespan();
    if violations.is_empty() && makespan != objective {
        violations.push(Violation::objective_mismatch(objective, makespan));
    }

    if violations.is_empty() {
        Ok(Extraction::Scheduled(schedule))
    } else {
        error!(
            instance = instance.name(),
            violations = violations.len(),
            first = %violations[0],
            "solver returned an inconsistent solution"
        );
        Err(InconsistentSolutionError { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstanceData, OperationId, ViolationType};
    use crate::solver::Assignment;
    use std::collections::BTreeMap;

    fn instance() -> Instance {
        Instance::new(InstanceData::from_routes(
            "2x2",
            2,
            &[vec![(1, 3), (2, 2)], vec![(2, 4), (1, 1)]],
        ))
        .unwrap()
    }

    fn starts(v: &[((usize, usize), i64)]) -> BTreeMap<OperationId, i64> {
        v.iter()
            .map(|&((j, k), s)| (OperationId::new(j, k), s))
            .collect()
    }

    fn optimal(starts: BTreeMap<OperationId, i64>, objective: i64) -> Outcome {
        Outcome::Optimal {
            assignment: Assignment::from_starts(starts),
            objective,
        }
    }

    #[test]
    fn test_extracts_valid_schedule() {
        let inst = instance();
        let outcome = optimal(starts(&[((0, 0), 0), ((0, 1), 4), ((1, 0), 0), ((1, 1), 4)]), 6);
        let schedule = extract_schedule(&inst, &outcome).unwrap().into_schedule().unwrap();
        assert_eq!(schedule.makespan(), 6);
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.start_of(OperationId::new(0, 1)), Some(4));
    }

    #[test]
    fn test_feasible_outcome_is_extracted() {
        let inst = instance();
        let outcome = Outcome::Feasible {
            assignment: Assignment::from_starts(starts(&[((0, 0), 0), ((0, 1), 4), ((1, 0), 0), ((1, 1), 6)])),
            objective: 7,
            best_bound: 6,
        };
        let extraction = extract_schedule(&inst, &outcome).unwrap();
        assert_eq!(extraction.schedule().map(Schedule::makespan), Some(7));
    }

    #[test]
    fn test_no_schedule_variants() {
        let inst = instance();
        assert_eq!(
            extract_schedule(&inst, &Outcome::Infeasible).unwrap(),
            Extraction::NoFeasibleSchedule(NoScheduleReason::Infeasible)
        );
        assert_eq!(
            extract_schedule(&inst, &Outcome::TimedOut { best_bound: Some(5) }).unwrap(),
            Extraction::NoFeasibleSchedule(NoScheduleReason::TimedOut {
                best_bound: Some(5)
            })
        );
    }

    #[test]
    fn test_rejects_overlap() {
        let inst = instance();
        // J1.O2 and J2.O1 overlap on M2
        let outcome = optimal(starts(&[((0, 0), 0), ((0, 1), 3), ((1, 0), 0), ((1, 1), 4)]), 5);
        let err = extract_schedule(&inst, &outcome).unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::MachineOverlap));
    }

    #[test]
    fn test_rejects_missing_operation() {
        let inst = instance();
        let outcome = optimal(starts(&[((0, 0), 0), ((0, 1), 4), ((1, 0), 0)]), 6);
        let err = extract_schedule(&inst, &outcome).unwrap_err();
        assert_eq!(err.violations[0].violation_type, ViolationType::MissingOperation);
    }

    #[test]
    fn test_rejects_objective_mismatch() {
        let inst = instance();
        let outcome = optimal(starts(&[((0, 0), 0), ((0, 1), 4), ((1, 0), 0), ((1, 1), 4)]), 5);
        let err = extract_schedule(&inst, &outcome).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].violation_type, ViolationType::ObjectiveMismatch);
        assert!(err.to_string().contains("inconsistent"));
    }
}
