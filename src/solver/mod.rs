//! Solver adapter.
//!
//! A [`SolverBackend`] receives a built formulation plus [`SolveParams`]
//! and returns an [`Outcome`]: optimal, feasible with a bound, infeasible,
//! or timed out. Backends are interchangeable; each declares which
//! formulation family it understands.
//!
//! | Backend | Family | Method |
//! |---------|--------|--------|
//! | [`DisjunctiveBranchAndBound`] | MIP (`Model`) | Branch-and-bound on sequencing binaries, longest-path node bounds |
//! | [`ActiveScheduleSearch`] | CP (`IntervalModel`) | Depth-first Giffler–Thompson enumeration with head/tail bounds |
//!
//! # Reference
//! - Applegate & Cook (1991), "A Computational Study of the Job-Shop Scheduling Problem"
//! - Giffler & Thompson (1960), "Algorithms for Solving Production-Scheduling Problems"

mod active;
mod bnb;
mod monitor;

pub use active::ActiveScheduleSearch;
pub use bnb::DisjunctiveBranchAndBound;
pub use monitor::{SearchCommand, SearchMonitor};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::conflict::ConflictPairId;
use crate::error::SolverError;
use crate::formulation::{IntervalModel, Model, ModelSize};
use crate::models::OperationId;

/// Formulation family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulationKind {
    /// Big-M disjunctive MILP.
    #[default]
    Disjunctive,
    /// Interval variables with no-overlap.
    Interval,
}

impl FormulationKind {
    /// Short label.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulationKind::Disjunctive => "disjunctive",
            FormulationKind::Interval => "interval",
        }
    }
}

impl fmt::Display for FormulationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A built model handed to a backend.
#[derive(Debug, Clone, Copy)]
pub enum Formulation<'a> {
    /// Disjunctive MILP.
    Disjunctive(&'a Model),
    /// Interval model.
    Interval(&'a IntervalModel),
}

impl Formulation<'_> {
    /// Family of this formulation.
    pub fn kind(&self) -> FormulationKind {
        match self {
            Formulation::Disjunctive(_) => FormulationKind::Disjunctive,
            Formulation::Interval(_) => FormulationKind::Interval,
        }
    }

    /// Size of the underlying model.
    pub fn size(&self) -> ModelSize {
        match self {
            Formulation::Disjunctive(m) => m.size(),
            Formulation::Interval(m) => m.size(),
        }
    }

    /// Instance name of the underlying model.
    pub fn name(&self) -> &str {
        match self {
            Formulation::Disjunctive(m) => m.name(),
            Formulation::Interval(m) => m.name(),
        }
    }
}

/// Variable values returned by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// Start time of every operation.
    pub starts: BTreeMap<OperationId, i64>,
    /// Value of every sequencing binary (`true`: the pair's first operation
    /// goes first). Empty for interval formulations.
    pub sequencing: BTreeMap<ConflictPairId, bool>,
}

impl Assignment {
    /// Assignment carrying only start times.
    pub fn from_starts(starts: BTreeMap<OperationId, i64>) -> Self {
        Self {
            starts,
            sequencing: BTreeMap::new(),
        }
    }
}

/// Result of an optimization run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Proven optimal.
    Optimal { assignment: Assignment, objective: i64 },
    /// Feasible, optimality not proven. `best_bound <= objective`.
    Feasible {
        assignment: Assignment,
        objective: i64,
        best_bound: i64,
    },
    /// Proven to have no feasible assignment.
    Infeasible,
    /// Stopped before any feasible assignment was found.
    TimedOut { best_bound: Option<i64> },
}

impl Outcome {
    /// Objective of the returned assignment.
    pub fn objective(&self) -> Option<i64> {
        match self {
            Outcome::Optimal { objective, .. } | Outcome::Feasible { objective, .. } => {
                Some(*objective)
            }
            _ => None,
        }
    }

    /// The returned assignment.
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            Outcome::Optimal { assignment, .. } | Outcome::Feasible { assignment, .. } => {
                Some(assignment)
            }
            _ => None,
        }
    }

    /// Best proven lower bound on the objective.
    pub fn best_bound(&self) -> Option<i64> {
        match self {
            Outcome::Optimal { objective, .. } => Some(*objective),
            Outcome::Feasible { best_bound, .. } => Some(*best_bound),
            Outcome::TimedOut { best_bound } => *best_bound,
            Outcome::Infeasible => None,
        }
    }

    /// Relative optimality gap `(objective - bound) / objective`.
    ///
    /// `Some(0.0)` for optimal outcomes, `None` without an assignment.
    pub fn gap(&self) -> Option<f64> {
        match self {
            Outcome::Optimal { .. } => Some(0.0),
            Outcome::Feasible {
                objective,
                best_bound,
                ..
            } => {
                if *objective <= 0 {
                    Some(0.0)
                } else {
                    Some((objective - best_bound) as f64 / *objective as f64)
                }
            }
            _ => None,
        }
    }

    /// Whether optimality is proven.
    #[inline]
    pub fn is_optimal(&self) -> bool {
        matches!(self, Outcome::Optimal { .. })
    }

    /// Whether an assignment is available.
    #[inline]
    pub fn has_solution(&self) -> bool {
        self.assignment().is_some()
    }

    /// Short label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Optimal { .. } => "optimal",
            Outcome::Feasible { .. } => "feasible",
            Outcome::Infeasible => "infeasible",
            Outcome::TimedOut { .. } => "timed out",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Optimal { objective, .. } => write!(f, "Optimal(Cmax={objective})"),
            Outcome::Feasible {
                objective,
                best_bound,
                ..
            } => write!(f, "Feasible(Cmax={objective}, bound={best_bound})"),
            Outcome::Infeasible => write!(f, "Infeasible"),
            Outcome::TimedOut {
                best_bound: Some(b),
            } => write!(f, "TimedOut(bound={b})"),
            Outcome::TimedOut { best_bound: None } => write!(f, "TimedOut"),
        }
    }
}

/// Why a search stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Wall-clock limit reached.
    TimeLimit,
    /// Node limit reached.
    NodeLimit,
    /// Cancelled through a [`CancelToken`].
    Cancelled,
}

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Search space exhausted with a solution.
    OptimalityProven,
    /// Search space exhausted without a solution.
    InfeasibilityProven,
    /// A limit stopped the search.
    Stopped(StopReason),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::OptimalityProven => write!(f, "optimality proven"),
            Termination::InfeasibilityProven => write!(f, "infeasibility proven"),
            Termination::Stopped(reason) => write!(f, "stopped: {reason:?}"),
        }
    }
}

/// Search statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveStats {
    /// Wall-clock time spent in the backend.
    pub elapsed: Duration,
    /// Search nodes explored.
    pub nodes: u64,
    /// Improving solutions found (warm start included).
    pub solutions: u64,
    /// How the search ended.
    pub termination: Termination,
}

/// Outcome plus statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// Result of the run.
    pub outcome: Outcome,
    /// Search statistics.
    pub stats: SolveStats,
}

/// Shared cancellation flag.
///
/// Clones observe the same flag, so one token can stop several concurrent
/// solves.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits for one optimization run. All unlimited by default.
#[derive(Debug, Clone, Default)]
pub struct SolveParams {
    /// Wall-clock limit.
    pub time_limit: Option<Duration>,
    /// Maximum number of search nodes.
    pub node_limit: Option<u64>,
    /// External cancellation.
    pub cancel: Option<CancelToken>,
}

impl SolveParams {
    /// Sets the time limit.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Sets the node limit.
    pub fn with_node_limit(mut self, limit: u64) -> Self {
        self.node_limit = Some(limit);
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// An exact optimization backend.
pub trait SolverBackend: Send + Sync + fmt::Debug {
    /// Backend name, for logs and KPIs.
    fn name(&self) -> &'static str;

    /// Whether this backend understands `kind`.
    fn supports(&self, kind: FormulationKind) -> bool;

    /// Minimizes the makespan of `formulation`.
    ///
    /// `warm_start` seeds the incumbent if it is feasible for the
    /// formulation and is ignored otherwise. Returns promptly once a limit
    /// in `params` trips.
    ///
    /// # Errors
    /// [`SolverError`] if the formulation family or a constraint shape is
    /// not supported.
    fn optimize(
        &self,
        formulation: Formulation<'_>,
        params: &SolveParams,
        warm_start: Option<&Assignment>,
    ) -> Result<SolveReport, SolverError>;
}

/// Turns the end state of a search into a report.
///
/// `stopped` is `None` when the search space was exhausted.
pub(crate) fn conclude(
    backend: &'static str,
    incumbent: Option<(Assignment, i64)>,
    stopped: Option<StopReason>,
    best_bound: Option<i64>,
    monitor: &SearchMonitor<'_>,
    solutions: u64,
) -> SolveReport {
    let (outcome, termination) = match (incumbent, stopped) {
        (Some((assignment, objective)), None) => (
            Outcome::Optimal {
                assignment,
                objective,
            },
            Termination::OptimalityProven,
        ),
        (None, None) => (Outcome::Infeasible, Termination::InfeasibilityProven),
        (Some((assignment, objective)), Some(reason)) => {
            let bound = best_bound.unwrap_or(0).min(objective);
            if bound >= objective {
                (
                    Outcome::Optimal {
                        assignment,
                        objective,
                    },
                    Termination::OptimalityProven,
                )
            } else {
                (
                    Outcome::Feasible {
                        assignment,
                        objective,
                        best_bound: bound,
                    },
                    Termination::Stopped(reason),
                )
            }
        }
        (None, Some(reason)) => (
            Outcome::TimedOut { best_bound },
            Termination::Stopped(reason),
        ),
    };

    if let Termination::Stopped(reason) = termination {
        warn!(
            backend,
            ?reason,
            nodes = monitor.nodes(),
            outcome = %outcome,
            "search stopped before proving optimality"
        );
    }

    SolveReport {
        outcome,
        stats: SolveStats {
            elapsed: monitor.elapsed(),
            nodes: monitor.nodes(),
            solutions,
            termination,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> Assignment {
        Assignment::from_starts([(OperationId::new(0, 0), 0)].into_iter().collect())
    }

    #[test]
    fn test_outcome_accessors() {
        let o = Outcome::Feasible {
            assignment: assignment(),
            objective: 12,
            best_bound: 9,
        };
        assert_eq!(o.objective(), Some(12));
        assert_eq!(o.best_bound(), Some(9));
        assert!((o.gap().unwrap() - 0.25).abs() < 1e-12);
        assert!(o.has_solution());
        assert!(!o.is_optimal());
        assert_eq!(o.to_string(), "Feasible(Cmax=12, bound=9)");

        let o = Outcome::TimedOut { best_bound: Some(7) };
        assert_eq!(o.objective(), None);
        assert_eq!(o.best_bound(), Some(7));
        assert_eq!(o.gap(), None);
        assert!(!o.has_solution());
    }

    #[test]
    fn test_conclude_variants() {
        let params = SolveParams::default();
        let monitor = SearchMonitor::new(&params);

        let r = conclude("t", Some((assignment(), 5)), None, Some(3), &monitor, 1);
        assert!(r.outcome.is_optimal());
        assert_eq!(r.stats.termination, Termination::OptimalityProven);

        let r = conclude("t", None, None, None, &monitor, 0);
        assert_eq!(r.outcome, Outcome::Infeasible);

        let r = conclude("t", Some((assignment(), 5)), Some(StopReason::NodeLimit), Some(3), &monitor, 1);
        assert_eq!(r.outcome.best_bound(), Some(3));
        assert_eq!(r.stats.termination, Termination::Stopped(StopReason::NodeLimit));

        // A bound meeting the incumbent proves optimality even when stopped.
        let r = conclude("t", Some((assignment(), 5)), Some(StopReason::TimeLimit), Some(5), &monitor, 1);
        assert!(r.outcome.is_optimal());

        let r = conclude("t", None, Some(StopReason::Cancelled), Some(4), &monitor, 0);
        assert_eq!(r.outcome, Outcome::TimedOut { best_bound: Some(4) });
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_formulation_kind_serde() {
        let json = serde_json::to_string(&FormulationKind::Interval).unwrap();
        assert_eq!(json, "\"Interval\"");
        assert_eq!(FormulationKind::default(), FormulationKind::Disjunctive);
        assert_eq!(FormulationKind::Interval.to_string(), "interval");
    }
}
