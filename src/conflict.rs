//! Conflict pair enumeration.
//!
//! Two operations conflict when they need the same machine: the machine can
//! process only one of them at a time, so the model must decide their
//! relative order. Every unordered pair is listed exactly once, in
//! canonical orientation (`first < second` in job-then-op order).
//!
//! The number of pairs is `Σ_m C(count(m), 2)`, i.e. `M · C(J, 2)` for a
//! classic `J × M` job shop. It drives the size of the disjunctive model.
//!
//! # Reference
//! Manne (1960), "On the Job-Shop Scheduling Problem", Operations Research 8(2)

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::models::{Instance, MachineId, OperationId};

/// Dense identifier of a conflict pair, in enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConflictPairId(pub usize);

impl fmt::Display for ConflictPairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Two distinct operations sharing a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictPair {
    /// Lower operation in job-then-op order.
    pub first: OperationId,
    /// Higher operation in job-then-op order.
    pub second: OperationId,
    /// Shared machine.
    pub machine: MachineId,
}

impl ConflictPair {
    /// Creates a pair in canonical orientation, or `None` for `a == b`.
    pub fn canonical(a: OperationId, b: OperationId, machine: MachineId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { first: a, second: b, machine }),
            std::cmp::Ordering::Greater => Some(Self { first: b, second: a, machine }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Whether `first < second`.
    #[inline]
    pub fn is_canonical(&self) -> bool {
        self.first < self.second
    }
}

impl fmt::Display for ConflictPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) on {}", self.first, self.second, self.machine)
    }
}

/// The full conflict pair set of an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPairs {
    pairs: Vec<ConflictPair>,
}

impl ConflictPairs {
    /// Enumerates every machine conflict of `instance`.
    ///
    /// Machines are visited in ascending order. On each machine the
    /// operations are taken job-major and every `i < j` combination is
    /// emitted, so the output is deterministic and already canonical.
    pub fn enumerate(instance: &Instance) -> Self {
        let mut pairs = Vec::with_capacity(Self::expected_count(instance));
        for m in 0..instance.n_machines() {
            let machine = MachineId(m);
            let ops = instance.operations_on_machine(machine);
            for (i, &a) in ops.iter().enumerate() {
                for &b in &ops[i + 1..] {
                    pairs.push(ConflictPair { first: a, second: b, machine });
                }
            }
        }
        debug!(
            instance = instance.name(),
            pairs = pairs.len(),
            "enumerated conflict pairs"
        );
        Self { pairs }
    }

    /// Wraps an explicit pair list without checking it.
    ///
    /// The model builders re-check every pair against the instance.
    pub fn from_pairs(pairs: Vec<ConflictPair>) -> Self {
        Self { pairs }
    }

    /// `Σ_m C(count(m), 2)` for `instance`.
    pub fn expected_count(instance: &Instance) -> usize {
        (0..instance.n_machines())
            .map(|m| {
                let c = instance.operations_on_machine(MachineId(m)).len();
                c * c.saturating_sub(1) / 2
            })
            .sum()
    }

    /// Number of pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no pairs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pair by id.
    pub fn get(&self, id: ConflictPairId) -> Option<&ConflictPair> {
        self.pairs.get(id.0)
    }

    /// Pairs with their ids, in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (ConflictPairId, &ConflictPair)> + '_ {
        self.pairs
            .iter()
            .enumerate()
            .map(|(i, p)| (ConflictPairId(i), p))
    }

    /// Number of pairs on `machine`.
    pub fn on_machine(&self, machine: MachineId) -> usize {
        self.pairs.iter().filter(|p| p.machine == machine).count()
    }

    /// Pairs as a slice.
    pub fn as_slice(&self) -> &[ConflictPair] {
        &self.pairs
    }
}
