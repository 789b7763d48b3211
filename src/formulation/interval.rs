//! Interval (constraint programming) formulation.
//!
//! Each operation becomes a fixed-length interval variable. Job order is an
//! `EndBeforeStart` link between consecutive intervals; machine exclusivity
//! is one `NoOverlap` global constraint per machine. No binaries and no
//! Big-M: the no-overlap constraint carries the disjunctions implicitly.
//!
//! # Reference
//! - Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling"
//! - Baptiste et al. (2001), "Constraint-Based Scheduling"

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::ModelSize;
use crate::error::BuildError;
use crate::models::{Instance, MachineId, OperationId};

/// A fixed-length interval for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalVar {
    /// Operation the interval represents.
    pub operation: OperationId,
    /// Machine that processes it.
    pub machine: MachineId,
    /// Fixed length.
    pub duration: i64,
    /// Earliest start.
    pub start_min: i64,
    /// Latest start.
    pub start_max: i64,
}

impl IntervalVar {
    /// Whether `start` lies in the start domain.
    #[inline]
    pub fn admits(&self, start: i64) -> bool {
        self.start_min <= start && start <= self.start_max
    }
}

/// Constraints of the interval model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalConstraint {
    /// `end(before) <= start(after)`.
    EndBeforeStart {
        before: OperationId,
        after: OperationId,
    },
    /// Intervals on one machine are pairwise disjoint.
    NoOverlap {
        machine: MachineId,
        operations: Vec<OperationId>,
    },
}

/// A built interval model. Objective: minimize the maximum interval end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalModel {
    name: String,
    horizon: i64,
    intervals: BTreeMap<OperationId, IntervalVar>,
    constraints: Vec<IntervalConstraint>,
}

impl IntervalModel {
    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Horizon `H` bounding every interval end.
    pub fn horizon(&self) -> i64 {
        self.horizon
    }

    /// Intervals keyed by operation.
    pub fn intervals(&self) -> &BTreeMap<OperationId, IntervalVar> {
        &self.intervals
    }

    /// Interval of `op`.
    pub fn interval(&self, op: OperationId) -> Option<&IntervalVar> {
        self.intervals.get(&op)
    }

    /// Constraints in emission order.
    pub fn constraints(&self) -> &[IntervalConstraint] {
        &self.constraints
    }

    /// Model size KPI. The maximum-end objective counts as one variable.
    pub fn size(&self) -> ModelSize {
        ModelSize {
            variables: self.intervals.len() + 1,
            integer_variables: self.intervals.len() + 1,
            binaries: 0,
            constraints: self.constraints.len(),
            conflict_pairs: 0,
        }
    }

    /// Maximum end under `starts`, or `None` if an interval has no start.
    pub fn objective(&self, starts: &BTreeMap<OperationId, i64>) -> Option<i64> {
        self.intervals
            .values()
            .map(|iv| starts.get(&iv.operation).map(|s| s + iv.duration))
            .try_fold(0i64, |acc, end| end.map(|e| acc.max(e)))
    }

    /// Whether `starts` satisfy every domain and constraint.
    pub fn is_feasible(&self, starts: &BTreeMap<OperationId, i64>) -> bool {
        let domains_ok = self
            .intervals
            .values()
            .all(|iv| starts.get(&iv.operation).is_some_and(|&s| iv.admits(s)));
        domains_ok && self.constraints.iter().all(|c| self.holds(c, starts))
    }

    fn holds(&self, constraint: &IntervalConstraint, starts: &BTreeMap<OperationId, i64>) -> bool {
        let end = |op: &OperationId| -> Option<(i64, i64)> {
            let s = *starts.get(op)?;
            Some((s, s + self.intervals.get(op)?.duration))
        };
        match constraint {
            IntervalConstraint::EndBeforeStart { before, after } => {
                matches!((end(before), end(after)), (Some((_, e)), Some((s, _))) if e <= s)
            }
            IntervalConstraint::NoOverlap { operations, .. } => {
                let mut spans = Vec::with_capacity(operations.len());
                for op in operations {
                    match end(op) {
                        Some(span) if span.1 > span.0 => spans.push(span),
                        Some(_) => {}
                        None => return false,
                    }
                }
                spans.sort();
                spans.windows(2).all(|w| w[0].1 <= w[1].0)
            }
        }
    }
}

/// Builds an [`IntervalModel`] from an instance.
#[derive(Debug, Clone)]
pub struct IntervalModelBuilder<'a> {
    instance: &'a Instance,
    horizon: Option<i64>,
}

impl<'a> IntervalModelBuilder<'a> {
    /// Creates a builder using the instance horizon.
    pub fn new(instance: &'a Instance) -> Self {
        Self {
            instance,
            horizon: None,
        }
    }

    /// Overrides the horizon (e.g., with a known upper bound).
    pub fn with_horizon(mut self, horizon: i64) -> Self {
        self.horizon = Some(horizon);
        self
    }

    /// Builds the model.
    ///
    /// Creates:
    /// - An `IntervalVar` per operation with `start ∈ [0, H - d]`
    /// - `EndBeforeStart` for consecutive operations of each job
    /// - `NoOverlap` per machine with two or more operations
    ///
    /// # Errors
    /// [`BuildError::HorizonTooShort`] if an overridden horizon is below the
    /// trivial makespan lower bound, which would leave no feasible schedule.
    pub fn build(&self) -> Result<IntervalModel, BuildError> {
        let inst = self.instance;
        let horizon = self.horizon.unwrap_or_else(|| inst.horizon());
        let required = inst.trivial_lower_bound();
        if horizon < required {
            return Err(BuildError::HorizonTooShort { horizon, required });
        }

        let intervals = inst
            .operations()
            .iter()
            .map(|op| {
                (
                    op.id,
                    IntervalVar {
                        operation: op.id,
                        machine: op.machine,
                        duration: op.duration,
                        start_min: 0,
                        start_max: horizon - op.duration,
                    },
                )
            })
            .collect();

        let mut constraints = Vec::new();
        for job in 0..inst.n_jobs() {
            for w in inst.job_operations(job).windows(2) {
                constraints.push(IntervalConstraint::EndBeforeStart {
                    before: w[0].id,
                    after: w[1].id,
                });
            }
        }
        for m in 0..inst.n_machines() {
            let machine = MachineId(m);
            let operations = inst.operations_on_machine(machine);
            if operations.len() > 1 {
                constraints.push(IntervalConstraint::NoOverlap {
                    machine,
                    operations,
                });
            }
        }

        let model = IntervalModel {
            name: inst.name().to_string(),
            horizon,
            intervals,
            constraints,
        };
        debug!(
            instance = inst.name(),
            intervals = model.intervals.len(),
            constraints = model.constraints.len(),
            "built interval model"
        );
        Ok(model)
    }
}
