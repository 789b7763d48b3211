//! Input and solution validation.
//!
//! Two independent checks live here:
//!
//! - [`validate_instance_data`]: structural integrity of raw instance data
//!   before an [`Instance`](crate::models::Instance) is built. Detects
//!   bad dimensions, missing operations, out-of-range or repeated machines,
//!   negative durations and horizon overflow.
//! - [`check_schedule`]: direct re-validation of start times against an
//!   instance, independent of any solver's feasibility claim. Detects
//!   missing or unknown operations, negative starts, job precedence
//!   violations and machine overlaps.
//!
//! Both collect every issue instead of stopping at the first one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::MalformedInstanceError;
use crate::models::{Instance, InstanceData, MachineId, OperationId, Violation};

/// A single problem found in raw instance data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceIssue {
    /// Issue category.
    pub kind: InstanceIssueKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of instance issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceIssueKind {
    /// `n_jobs` or `n_machines` is zero.
    InvalidDimensions,
    /// Row count of a matrix differs from `n_jobs`.
    JobCountMismatch,
    /// A job has fewer or more than `n_machines` operations.
    OperationCountMismatch,
    /// A machine id is outside `[1, n_machines]`.
    MachineOutOfRange,
    /// A job visits the same machine twice.
    RepeatedMachine,
    /// A processing time is negative.
    NegativeDuration,
    /// The sum of durations exceeds [`MAX_HORIZON`].
    HorizonOverflow,
    /// Text input could not be parsed.
    Syntax,
}

impl InstanceIssue {
    pub(crate) fn new(kind: InstanceIssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for InstanceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Largest accepted sum of durations.
///
/// Search bounds add heads, durations, tails and Big-M weights, each at
/// most the horizon, so they stay in `i64` below this limit.
pub const MAX_HORIZON: i64 = i64::MAX / 4;

/// Validates raw instance data.
///
/// Checks:
/// 1. `n_jobs > 0` and `n_machines > 0`
/// 2. Both matrices have `n_jobs` rows
/// 3. Every job has exactly `n_machines` operations in both matrices
/// 4. Machine ids lie in `[1, n_machines]`
/// 5. No job repeats a machine (each row is a permutation)
/// 6. Durations are non-negative
/// 7. The sum of durations is at most [`MAX_HORIZON`]
///
/// Jobs are reported 1-based in messages, matching the input convention.
pub fn validate_instance_data(data: &InstanceData) -> Result<(), MalformedInstanceError> {
    let mut issues = Vec::new();

    if data.n_jobs == 0 || data.n_machines == 0 {
        issues.push(InstanceIssue::new(
            InstanceIssueKind::InvalidDimensions,
            format!(
                "dimensions must be positive, got n_jobs={}, n_machines={}",
                data.n_jobs, data.n_machines
            ),
        ));
    }

    for (label, rows) in [("machine", data.machine.len()), ("duration", data.duration.len())] {
        if rows != data.n_jobs {
            issues.push(InstanceIssue::new(
                InstanceIssueKind::JobCountMismatch,
                format!("{label} matrix has {rows} rows, expected {}", data.n_jobs),
            ));
        }
    }

    let mut horizon: Option<i64> = Some(0);
    for (j, (machines, durations)) in data.machine.iter().zip(&data.duration).enumerate() {
        let job = j + 1;
        if machines.len() != data.n_machines || durations.len() != data.n_machines {
            issues.push(InstanceIssue::new(
                InstanceIssueKind::OperationCountMismatch,
                format!(
                    "job {job} has {} machine and {} duration entries, expected {}",
                    machines.len(),
                    durations.len(),
                    data.n_machines
                ),
            ));
        }

        let mut seen = HashSet::new();
        for (k, &m) in machines.iter().enumerate() {
            if m == 0 || m as usize > data.n_machines {
                issues.push(InstanceIssue::new(
                    InstanceIssueKind::MachineOutOfRange,
                    format!(
                        "job {job} operation {} uses machine {m}, expected 1..={}",
                        k + 1,
                        data.n_machines
                    ),
                ));
            } else if !seen.insert(m) {
                issues.push(InstanceIssue::new(
                    InstanceIssueKind::RepeatedMachine,
                    format!("job {job} visits machine {m} more than once"),
                ));
            }
        }

        for (k, &d) in durations.iter().enumerate() {
            if d < 0 {
                issues.push(InstanceIssue::new(
                    InstanceIssueKind::NegativeDuration,
                    format!("job {job} operation {} has negative duration {d}", k + 1),
                ));
            } else {
                horizon = horizon.and_then(|h| h.checked_add(d));
            }
        }
    }

    if horizon.map_or(true, |h| h > MAX_HORIZON) {
        issues.push(InstanceIssue::new(
            InstanceIssueKind::HorizonOverflow,
            format!("sum of durations exceeds {MAX_HORIZON}"),
        ));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(MalformedInstanceError::new(issues))
    }
}

/// Re-validates start times directly against an instance.
///
/// Returns every violation found; an empty list means the start times form
/// a feasible schedule. Checks:
/// 1. Every operation has exactly one start time, and no unknown operation does
/// 2. Start times are non-negative
/// 3. `start[k+1] >= start[k] + duration[k]` within every job
/// 4. Operations sharing a machine have pairwise disjoint `[start, end)` intervals
pub fn check_schedule(instance: &Instance, starts: &BTreeMap<OperationId, i64>) -> Vec<Violation> {
    let mut violations = Vec::new();

    for &op in starts.keys() {
        if !instance.contains(op) {
            violations.push(Violation::unknown_operation(op));
        }
    }
    for operation in instance.operations() {
        match starts.get(&operation.id) {
            None => violations.push(Violation::missing_operation(operation.id)),
            Some(&s) if s < 0 => violations.push(Violation::negative_start(operation.id, s)),
            Some(_) => {}
        }
    }

    for job in 0..instance.n_jobs() {
        for pair in instance.job_operations(job).windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if let (Some(&sp), Some(&sn)) = (starts.get(&prev.id), starts.get(&next.id)) {
                if sn < prev.end(sp) {
                    violations.push(Violation::precedence(prev.id, next.id, prev.end(sp), sn));
                }
            }
        }
    }

    for m in 0..instance.n_machines() {
        let machine = MachineId(m);
        let mut busy: Vec<(i64, i64, OperationId)> = instance
            .operations_on_machine(machine)
            .into_iter()
            .filter_map(|op| {
                let s = *starts.get(&op)?;
                let d = instance.duration(op)?;
                Some((s, s + d, op))
            })
            .collect();
        busy.sort();
        for (i, a) in busy.iter().enumerate() {
            // Sorted by start, so only later entries starting before `a` ends can overlap.
            for b in busy[i + 1..].iter().take_while(|b| b.0 < a.1) {
                if b.1 > b.0 && a.1 > a.0 {
                    violations.push(Violation::machine_overlap(machine, a.2, b.2));
                }
            }
        }
    }

    violations
}
