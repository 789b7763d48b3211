//! Random instance generation.
//!
//! Taillard-style generator: every job visits the machines in a uniformly
//! random order with uniformly drawn processing times.
//!
//! # Reference
//! Taillard (1993), "Benchmarks for basic scheduling problems", EJOR 64(2)

use rand::seq::SliceRandom;
use rand::Rng;
use std::ops::RangeInclusive;

use super::{Instance, InstanceData};
use crate::error::MalformedInstanceError;

/// Generates a random job-shop instance.
///
/// # Errors
/// [`MalformedInstanceError`] if a dimension is zero or `durations` admits
/// negative values.
///
/// # Example
/// ```
/// use rand::SeedableRng;
/// use u_jobshop::models::generate::random_instance;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let inst = random_instance("r5x4", 5, 4, 1..=9, &mut rng).unwrap();
/// assert_eq!(inst.operation_count(), 20);
/// ```
pub fn random_instance<R: Rng>(
    name: impl Into<String>,
    n_jobs: usize,
    n_machines: usize,
    durations: RangeInclusive<i64>,
    rng: &mut R,
) -> Result<Instance, MalformedInstanceError> {
    let mut machine = Vec::with_capacity(n_jobs);
    let mut duration = Vec::with_capacity(n_jobs);

    for _ in 0..n_jobs {
        let mut route: Vec<u32> = (1..=n_machines as u32).collect();
        route.shuffle(rng);
        machine.push(route);
        duration.push(
            (0..n_machines)
                .map(|_| rng.random_range(durations.clone()))
                .collect(),
        );
    }

    Instance::new(InstanceData {
        name: name.into(),
        n_jobs,
        n_machines,
        machine,
        duration,
    })
}
