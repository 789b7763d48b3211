//! Solve pipeline, dispatching heuristic and KPI evaluation.
//!
//! [`JobShopSolver`] runs the whole chain for one instance (or a batch on
//! scoped threads): enumerate conflict pairs, build the configured model,
//! optimize it with an exact backend, extract and validate the schedule,
//! and summarize the run as a [`SolveKpi`].
//!
//! # Algorithm
//!
//! `DispatchScheduler` is a non-delay, priority-driven heuristic. It is not
//! optimal, but provides fast warm starts for the exact backends.
//!
//! # KPI
//!
//! `SolveKpi` reports makespan, best bound, gap, solve time, search nodes,
//! model size and machine utilization.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3-4
//! - Baker & Trietsch (2019), "Principles of Sequencing and Scheduling"

mod dispatch;
mod kpi;
mod pipeline;

pub use dispatch::{DispatchRule, DispatchScheduler};
pub use kpi::SolveKpi;
pub use pipeline::{solve_batch, JobShopSolver, Solution, SolverConfig};
