//! Error taxonomy.
//!
//! | Error | Raised by | Meaning |
//! |-------|-----------|---------|
//! | [`MalformedInstanceError`] | `Instance::new`, JSPLIB parser | Bad input data |
//! | [`BuildError`] | `ModelBuilder`, `IntervalModelBuilder` | Caller contract violation |
//! | [`SolverError`] | solver backends | Formulation the backend cannot interpret |
//! | [`InconsistentSolutionError`] | `extract_schedule` | Solver assignment fails re-validation |
//!
//! `Infeasible` and `TimedOut` are not errors: they are
//! [`Outcome`](crate::solver::Outcome) values.

use thiserror::Error;

use crate::conflict::ConflictPair;
use crate::models::{OperationId, Violation};
use crate::validation::InstanceIssue;

/// Input data violates the job-shop instance invariants.
///
/// Carries every detected issue, not only the first one.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed instance: {}", join(.issues))]
pub struct MalformedInstanceError {
    /// Detected issues, in detection order.
    pub issues: Vec<InstanceIssue>,
}

impl MalformedInstanceError {
    /// Wraps a list of issues.
    pub fn new(issues: Vec<InstanceIssue>) -> Self {
        Self { issues }
    }
}

/// Model construction was invoked with inputs that break its contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A pair references an operation the instance does not have.
    #[error("conflict pair {pair} references {operation}, which is outside the instance")]
    OperationOutOfBounds {
        pair: ConflictPair,
        operation: OperationId,
    },
    /// A pair couples an operation with itself.
    #[error("conflict pair {0} couples an operation with itself")]
    SelfPair(ConflictPair),
    /// A pair is not in canonical (job-then-op) orientation.
    #[error("conflict pair {0} is not in canonical orientation")]
    NonCanonicalPair(ConflictPair),
    /// A pair names a machine that does not host both operations.
    #[error("conflict pair {0} does not share its machine in the instance")]
    MachineMismatch(ConflictPair),
    /// The same unordered pair appears twice.
    #[error("conflict pair {0} appears more than once")]
    DuplicatePair(ConflictPair),
    /// An explicit horizon is shorter than the makespan lower bound.
    #[error("horizon {horizon} is below the makespan lower bound {required}")]
    HorizonTooShort { horizon: i64, required: i64 },
}

/// A backend cannot interpret the formulation it was handed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    /// The backend does not handle this formulation family.
    #[error("backend '{backend}' does not support the {formulation} formulation")]
    UnsupportedFormulation {
        backend: &'static str,
        formulation: &'static str,
    },
    /// A constraint does not have a shape the backend can reason about.
    #[error("constraint '{name}' is not supported: {reason}")]
    UnsupportedConstraint { name: String, reason: String },
}

/// A solver assignment failed direct re-validation against the instance.
///
/// Signals an unsound Big-M, a modeling bug or a backend bug. Never
/// silently accepted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("solver returned an inconsistent solution: {}", join(.violations))]
pub struct InconsistentSolutionError {
    /// Every violated check.
    pub violations: Vec<Violation>,
}

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    MalformedInstance(#[from] MalformedInstanceError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    InconsistentSolution(#[from] InconsistentSolutionError),
    /// A backend claimed a well-formed instance is infeasible. Sequential
    /// execution is always feasible, so this is a modeling bug.
    #[error("backend '{backend}' reported instance '{instance}' infeasible")]
    UnexpectedInfeasibility {
        backend: &'static str,
        instance: String,
    },
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
