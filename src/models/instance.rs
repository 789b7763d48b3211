//! Job-shop instance model.
//!
//! An instance holds `n_jobs` jobs, each a fixed sequence of exactly
//! `n_machines` operations visiting every machine once.
//!
//! # Indexing
//!
//! The raw input ([`InstanceData`]) uses 1-based machine ids, as in the
//! JSPLIB/ORLIB benchmark files. Once validated, everything is 0-based:
//! `OperationId { job: 0, index: 0 }` is the first operation of the first job
//! and `MachineId(0)` is machine 1. `Display` prints 1-based labels.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 7

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MalformedInstanceError;
use crate::validation::validate_instance_data;

/// Identifies an operation by job and position within the job (0-based).
///
/// Orders job-major, then by position: the canonical order used for
/// conflict pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId {
    /// Job index.
    pub job: usize,
    /// Position within the job.
    pub index: usize,
}

impl OperationId {
    /// Creates an operation id.
    #[inline]
    pub fn new(job: usize, index: usize) -> Self {
        Self { job, index }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "J{}.O{}", self.job + 1, self.index + 1)
    }
}

/// A machine (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MachineId(pub usize);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0 + 1)
    }
}

/// A single operation: one job step on one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation identifier.
    pub id: OperationId,
    /// Machine that processes the operation.
    pub machine: MachineId,
    /// Processing time.
    pub duration: i64,
}

impl Operation {
    /// Completion time when started at `start`.
    #[inline]
    pub fn end(&self, start: i64) -> i64 {
        start + self.duration
    }
}

/// Raw instance data, as loaded from a dataset.
///
/// `machine[j][k]` is the 1-based machine of operation `k` of job `j`,
/// `duration[j][k]` its processing time. Not validated; turn it into an
/// [`Instance`] with [`Instance::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceData {
    /// Instance name (e.g., "ft06").
    #[serde(default)]
    pub name: String,
    /// Number of jobs.
    pub n_jobs: usize,
    /// Number of machines, which is also the number of operations per job.
    pub n_machines: usize,
    /// Machine routing, 1-based ids.
    pub machine: Vec<Vec<u32>>,
    /// Processing times.
    pub duration: Vec<Vec<i64>>,
}

impl InstanceData {
    /// Builds raw data from per-job `(machine, duration)` routes with 1-based machines.
    pub fn from_routes(name: impl Into<String>, n_machines: usize, routes: &[Vec<(u32, i64)>]) -> Self {
        Self {
            name: name.into(),
            n_jobs: routes.len(),
            n_machines,
            machine: routes
                .iter()
                .map(|r| r.iter().map(|&(m, _)| m).collect())
                .collect(),
            duration: routes
                .iter()
                .map(|r| r.iter().map(|&(_, d)| d).collect())
                .collect(),
        }
    }
}

/// A validated job-shop instance.
///
/// Only constructible through validation, so every `Instance` satisfies the
/// invariants: each job visits every machine exactly once, durations are
/// non-negative and their sum is at most [`MAX_HORIZON`](crate::validation::MAX_HORIZON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "InstanceData", into = "InstanceData")]
pub struct Instance {
    name: String,
    n_jobs: usize,
    n_machines: usize,
    /// Job-major: operation `(j, k)` sits at `j * n_machines + k`.
    operations: Vec<Operation>,
    horizon: i64,
}

impl Instance {
    /// Validates raw data and builds an instance.
    ///
    /// # Errors
    /// [`MalformedInstanceError`] listing every violated invariant.
    pub fn new(data: InstanceData) -> Result<Self, MalformedInstanceError> {
        validate_instance_data(&data)?;

        let mut operations = Vec::with_capacity(data.n_jobs * data.n_machines);
        for (job, (machines, durations)) in data.machine.iter().zip(&data.duration).enumerate() {
            for (index, (&m, &d)) in machines.iter().zip(durations).enumerate() {
                operations.push(Operation {
                    id: OperationId::new(job, index),
                    machine: MachineId(m as usize - 1),
                    duration: d,
                });
            }
        }
        let horizon = operations.iter().map(|o| o.duration).sum();

        Ok(Self {
            name: data.name,
            n_jobs: data.n_jobs,
            n_machines: data.n_machines,
            operations,
            horizon,
        })
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of jobs.
    #[inline]
    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    /// Number of machines.
    #[inline]
    pub fn n_machines(&self) -> usize {
        self.n_machines
    }

    /// Number of operations of `job` (always `n_machines` for a valid job).
    pub fn job_len(&self, job: usize) -> usize {
        if job < self.n_jobs {
            self.n_machines
        } else {
            0
        }
    }

    /// Total number of operations.
    #[inline]
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Whether `op` lies inside the instance.
    #[inline]
    pub fn contains(&self, op: OperationId) -> bool {
        op.job < self.n_jobs && op.index < self.n_machines
    }

    /// Dense position of `op` in [`Instance::operations`].
    #[inline]
    pub fn position(&self, op: OperationId) -> Option<usize> {
        self.contains(op).then(|| op.job * self.n_machines + op.index)
    }

    /// The operation `op`, if it exists.
    pub fn operation(&self, op: OperationId) -> Option<&Operation> {
        self.position(op).map(|i| &self.operations[i])
    }

    /// Machine of `op`.
    pub fn machine(&self, op: OperationId) -> Option<MachineId> {
        self.operation(op).map(|o| o.machine)
    }

    /// Duration of `op`.
    pub fn duration(&self, op: OperationId) -> Option<i64> {
        self.operation(op).map(|o| o.duration)
    }

    /// All operations, job-major.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Operations of one job in processing order.
    pub fn job_operations(&self, job: usize) -> &[Operation] {
        if job >= self.n_jobs {
            return &[];
        }
        let start = job * self.n_machines;
        &self.operations[start..start + self.n_machines]
    }

    /// Operations processed by `machine`, job-major.
    pub fn operations_on_machine(&self, machine: MachineId) -> Vec<OperationId> {
        self.operations
            .iter()
            .filter(|o| o.machine == machine)
            .map(|o| o.id)
            .collect()
    }

    /// Sum of all durations: a valid upper bound on any optimal makespan.
    #[inline]
    pub fn horizon(&self) -> i64 {
        self.horizon
    }

    /// Work of `op`'s job before `op`.
    pub fn head(&self, op: OperationId) -> i64 {
        self.job_operations(op.job)
            .iter()
            .take(op.index)
            .map(|o| o.duration)
            .sum()
    }

    /// Work of `op`'s job after `op`.
    pub fn tail(&self, op: OperationId) -> i64 {
        self.job_operations(op.job)
            .iter()
            .skip(op.index + 1)
            .map(|o| o.duration)
            .sum()
    }

    /// Total work of one job.
    pub fn job_work(&self, job: usize) -> i64 {
        self.job_operations(job).iter().map(|o| o.duration).sum()
    }

    /// Total work of one machine.
    pub fn machine_work(&self, machine: MachineId) -> i64 {
        self.operations
            .iter()
            .filter(|o| o.machine == machine)
            .map(|o| o.duration)
            .sum()
    }

    /// Trivial lower bound on the makespan: the heaviest job or machine.
    pub fn trivial_lower_bound(&self) -> i64 {
        let jobs = (0..self.n_jobs).map(|j| self.job_work(j));
        let machines = (0..self.n_machines).map(|m| self.machine_work(MachineId(m)));
        jobs.chain(machines).max().unwrap_or(0)
    }

    /// Converts back to raw, 1-based data.
    pub fn to_data(&self) -> InstanceData {
        let mut machine = Vec::with_capacity(self.n_jobs);
        let mut duration = Vec::with_capacity(self.n_jobs);
        for job in 0..self.n_jobs {
            let ops = self.job_operations(job);
            machine.push(ops.iter().map(|o| o.machine.0 as u32 + 1).collect());
            duration.push(ops.iter().map(|o| o.duration).collect());
        }
        InstanceData {
            name: self.name.clone(),
            n_jobs: self.n_jobs,
            n_machines: self.n_machines,
            machine,
            duration,
        }
    }
}

impl TryFrom<InstanceData> for Instance {
    type Error = MalformedInstanceError;

    fn try_from(data: InstanceData) -> Result<Self, Self::Error> {
        Instance::new(data)
    }
}

impl From<Instance> for InstanceData {
    fn from(instance: Instance) -> Self {
        instance.to_data()
    }
}
