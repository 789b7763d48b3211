//! Schedule (solution) model.
//!
//! A schedule assigns a start time to every operation of an instance. It is
//! produced by the schedule extractor (from a solver assignment) or by the
//! dispatching heuristic, and is consumed by validation and KPI reporting.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::{Instance, MachineId, OperationId};

/// A complete schedule: one row per operation, job-major.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Instance name the schedule belongs to.
    pub instance: String,
    /// Scheduled operations.
    pub operations: Vec<ScheduledOperation>,
}

/// A scheduled operation.
///
/// Flat on purpose: one row of the tabular export (job, op, machine,
/// start, end, duration), 1-based like the input data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOperation {
    /// Job number (1-based).
    pub job: usize,
    /// Operation number within the job (1-based).
    pub op: usize,
    /// Machine number (1-based).
    pub machine: usize,
    /// Start time.
    pub start: i64,
    /// End time.
    pub end: i64,
    /// Processing time.
    pub duration: i64,
}

impl ScheduledOperation {
    /// 0-based operation id, `None` if the row carries a 0 job or op.
    #[inline]
    pub fn id(&self) -> Option<OperationId> {
        Some(OperationId::new(self.job.checked_sub(1)?, self.op.checked_sub(1)?))
    }

    /// 0-based machine id, `None` if the row carries machine 0.
    #[inline]
    pub fn machine_id(&self) -> Option<MachineId> {
        self.machine.checked_sub(1).map(MachineId)
    }
}

/// A failed check found while re-validating a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Related entity (operation or machine label).
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
}

/// Classification of schedule violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    /// Operation started before its job predecessor finished.
    PrecedenceViolation,
    /// Two operations overlap on the same machine.
    MachineOverlap,
    /// An instance operation has no start time.
    MissingOperation,
    /// A start time refers to an operation outside the instance.
    UnknownOperation,
    /// Start time below zero.
    NegativeStart,
    /// Reported objective differs from the recomputed makespan.
    ObjectiveMismatch,
}

impl Violation {
    fn new(violation_type: ViolationType, entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violation_type,
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }

    /// Creates a precedence violation.
    pub fn precedence(prev: OperationId, next: OperationId, prev_end: i64, next_start: i64) -> Self {
        Self::new(
            ViolationType::PrecedenceViolation,
            next.to_string(),
            format!("{next} starts at {next_start} before {prev} ends at {prev_end}"),
        )
    }

    /// Creates a machine overlap violation.
    pub fn machine_overlap(machine: MachineId, a: OperationId, b: OperationId) -> Self {
        Self::new(
            ViolationType::MachineOverlap,
            machine.to_string(),
            format!("{a} and {b} overlap on {machine}"),
        )
    }

    /// Creates a missing operation violation.
    pub fn missing_operation(op: OperationId) -> Self {
        Self::new(
            ViolationType::MissingOperation,
            op.to_string(),
            format!("{op} has no start time"),
        )
    }

    /// Creates an unknown operation violation.
    pub fn unknown_operation(op: OperationId) -> Self {
        Self::new(
            ViolationType::UnknownOperation,
            op.to_string(),
            format!("{op} is not part of the instance"),
        )
    }

    /// Creates a negative start violation.
    pub fn negative_start(op: OperationId, start: i64) -> Self {
        Self::new(
            ViolationType::NegativeStart,
            op.to_string(),
            format!("{op} starts at {start}"),
        )
    }

    /// Creates an objective mismatch violation.
    pub fn objective_mismatch(reported: i64, actual: i64) -> Self {
        Self::new(
            ViolationType::ObjectiveMismatch,
            "Cmax",
            format!("reported objective {reported}, recomputed makespan {actual}"),
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [{}]: {}", self.violation_type, self.entity_id, self.message)
    }
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            operations: Vec::new(),
        }
    }

    /// Builds a schedule from start times, job-major.
    ///
    /// Operations without a start time are skipped; callers validate
    /// completeness with [`check_schedule`](crate::validation::check_schedule).
    pub fn from_starts(instance: &Instance, starts: &BTreeMap<OperationId, i64>) -> Self {
        let operations = instance
            .operations()
            .iter()
            .filter_map(|op| {
                let start = *starts.get(&op.id)?;
                Some(ScheduledOperation {
                    job: op.id.job + 1,
                    op: op.id.index + 1,
                    machine: op.machine.0 + 1,
                    start,
                    end: op.end(start),
                    duration: op.duration,
                })
            })
            .collect();
        Self {
            instance: instance.name().to_string(),
            operations,
        }
    }

    /// Start times keyed by operation. Rows with a 0 index are skipped.
    pub fn starts(&self) -> BTreeMap<OperationId, i64> {
        self.operations
            .iter()
            .filter_map(|o| Some((o.id()?, o.start)))
            .collect()
    }

    /// Makespan (Cmax): latest end time.
    pub fn makespan(&self) -> i64 {
        self.operations.iter().map(|o| o.end).max().unwrap_or(0)
    }

    /// Start time of `op`.
    pub fn start_of(&self, op: OperationId) -> Option<i64> {
        self.operations
            .iter()
            .find(|o| o.id() == Some(op))
            .map(|o| o.start)
    }

    /// Operations of a machine in processing order.
    pub fn machine_sequence(&self, machine: MachineId) -> Vec<&ScheduledOperation> {
        let mut ops: Vec<_> = self
            .operations
            .iter()
            .filter(|o| o.machine_id() == Some(machine))
            .collect();
        ops.sort_by_key(|o| (o.start, o.end, o.job));
        ops
    }

    /// Completion time of a job (0-based).
    pub fn job_completion(&self, job: usize) -> Option<i64> {
        self.operations
            .iter()
            .filter(|o| o.job == job + 1)
            .map(|o| o.end)
            .max()
    }

    /// Busy time / makespan for every machine that has operations.
    pub fn all_utilizations(&self) -> HashMap<MachineId, f64> {
        let horizon = self.makespan();
        if horizon <= 0 {
            return HashMap::new();
        }

        let mut busy: HashMap<MachineId, i64> = HashMap::new();
        for o in &self.operations {
            if let Some(m) = o.machine_id() {
                *busy.entry(m).or_insert(0) += o.duration;
            }
        }

        busy.into_iter()
            .map(|(m, b)| (m, b as f64 / horizon as f64))
            .collect()
    }

    /// Number of scheduled operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
