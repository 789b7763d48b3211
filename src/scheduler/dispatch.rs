//! Non-delay priority dispatching.
//!
//! # Algorithm
//!
//! 1. Every job exposes its next unscheduled operation; its earliest start
//!    is `max(job ready, machine ready)`.
//! 2. Among the operations with the smallest earliest start, pick one by
//!    the dispatching rule (ties broken by job index).
//! 3. Schedule it at that start and update the job and machine ready times.
//!
//! The result is a non-delay schedule: no machine idles while an operation
//! that could use it is waiting. It is not optimal, but it is a cheap
//! incumbent for the exact backends.
//!
//! # Complexity
//! O(n² · m) where n = jobs, m = operations per job.
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 4: Priority Dispatching

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Instance, OperationId, Schedule};

/// Priority rule used to choose among waiting operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchRule {
    /// First in, first out: the job that has waited longest.
    #[default]
    Fifo,
    /// Shortest processing time.
    Spt,
    /// Longest processing time.
    Lpt,
    /// Most work remaining in the job.
    Mwkr,
}

impl DispatchRule {
    /// Sort key; the smallest key is dispatched first.
    fn key(&self, instance: &Instance, op: OperationId, job_ready: i64) -> (i64, usize) {
        let duration = instance.duration(op).unwrap_or(0);
        let primary = match self {
            DispatchRule::Fifo => job_ready,
            DispatchRule::Spt => duration,
            DispatchRule::Lpt => -duration,
            DispatchRule::Mwkr => -(duration + instance.tail(op)),
        };
        (primary, op.job)
    }
}

/// Greedy scheduler producing a non-delay schedule.
///
/// # Example
///
/// ```
/// use u_jobshop::models::{Instance, InstanceData};
/// use u_jobshop::scheduler::{DispatchRule, DispatchScheduler};
///
/// let inst = Instance::new(InstanceData::from_routes(
///     "2x2",
///     2,
///     &[vec![(1, 3), (2, 2)], vec![(2, 4), (1, 1)]],
/// ))
/// .unwrap();
/// let schedule = DispatchScheduler::new(DispatchRule::Spt).schedule(&inst);
/// assert_eq!(schedule.len(), 4);
/// assert_eq!(schedule.makespan(), 6);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchScheduler {
    rule: DispatchRule,
}

impl DispatchScheduler {
    /// Creates a scheduler with the given rule.
    pub fn new(rule: DispatchRule) -> Self {
        Self { rule }
    }

    /// The dispatching rule.
    pub fn rule(&self) -> DispatchRule {
        self.rule
    }

    /// Start times of the dispatched schedule.
    pub fn starts(&self, instance: &Instance) -> BTreeMap<OperationId, i64> {
        let mut next = vec![0usize; instance.n_jobs()];
        let mut job_ready = vec![0i64; instance.n_jobs()];
        let mut machine_ready = vec![0i64; instance.n_machines()];
        let mut starts = BTreeMap::new();

        loop {
            let waiting: Vec<(OperationId, i64)> = (0..instance.n_jobs())
                .filter(|&j| next[j] < instance.job_len(j))
                .filter_map(|j| {
                    let op = OperationId::new(j, next[j]);
                    let m = instance.machine(op)?;
                    Some((op, job_ready[j].max(machine_ready[m.0])))
                })
                .collect();

            let Some(earliest) = waiting.iter().map(|&(_, s)| s).min() else {
                break;
            };
            let Some(&(op, start)) = waiting
                .iter()
                .filter(|&&(_, s)| s == earliest)
                .min_by_key(|&&(op, _)| self.rule.key(instance, op, job_ready[op.job]))
            else {
                break;
            };
            let Some(operation) = instance.operation(op) else {
                break;
            };

            let end = operation.end(start);
            starts.insert(op, start);
            job_ready[op.job] = end;
            machine_ready[operation.machine.0] = end;
            next[op.job] += 1;
        }

        starts
    }

    /// Dispatches every operation of `instance`.
    pub fn schedule(&self, instance: &Instance) -> Schedule {
        Schedule::from_starts(instance, &self.starts(instance))
    }
}
