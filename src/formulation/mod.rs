//! Optimization model construction.
//!
//! Two encodings of the same job-shop instance:
//!
//! - [`Model`] (via [`ModelBuilder`]): the disjunctive Big-M MILP. One
//!   integer start per operation, one integer `Cmax`, one binary per
//!   conflict pair choosing which operation goes first.
//! - [`IntervalModel`] (via [`IntervalModelBuilder`]): one fixed-length
//!   interval per operation, end-before-start links along each job and one
//!   no-overlap global constraint per machine.
//!
//! Both minimize the makespan and both are built deterministically.
//!
//! # Reference
//! - Manne (1960), "On the Job-Shop Scheduling Problem"
//! - Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling"

mod disjunctive;
mod interval;

pub use disjunctive::{
    BigMPolicy, ConstraintKind, LinearConstraint, Model, ModelBuilder, SequenceDecision, Sense,
    VarId, VarKind, VarRole, Variable,
};
pub use interval::{IntervalConstraint, IntervalModel, IntervalModelBuilder, IntervalVar};

use serde::{Deserialize, Serialize};

/// Size of a built model, for KPI reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSize {
    /// All decision variables.
    pub variables: usize,
    /// Integer (non-binary) variables.
    pub integer_variables: usize,
    /// Binary variables.
    pub binaries: usize,
    /// Constraints (linear rows or global constraints).
    pub constraints: usize,
    /// Conflict pairs encoded in the model.
    pub conflict_pairs: usize,
}
