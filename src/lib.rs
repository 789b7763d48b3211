//! Job-shop scheduling formulations and exact solvers.
//!
//! Turns a job-shop instance into a makespan-minimization model, solves it
//! exactly, and returns a validated schedule.
//!
//! # Pipeline
//!
//! ```text
//! Instance ──► ConflictPairs ──► Model (Big-M MILP) ──► DisjunctiveBranchAndBound ─┐
//!     │                                                                            ├─► extract_schedule ──► Schedule + SolveKpi
//!     └──────────────────────► IntervalModel (CP) ───► ActiveScheduleSearch ──────┘
//! ```
//!
//! # Modules
//!
//! - **`models`**: `Instance`, `Operation`, `Schedule`, JSPLIB text format,
//!   random instance generation
//! - **`validation`**: instance integrity checks and schedule re-checks
//! - **`conflict`**: pairs of operations competing for a machine
//! - **`formulation`**: disjunctive Big-M model and interval model
//! - **`solver`**: backend trait, outcomes, limits and the two exact backends
//! - **`extract`**: outcome → validated schedule
//! - **`scheduler`**: end-to-end pipeline, dispatching warm starts, KPIs
//! - **`error`**: error types
//!
//! # Example
//!
//! ```
//! use u_jobshop::models::Instance;
//! use u_jobshop::scheduler::{JobShopSolver, SolverConfig};
//!
//! let inst = Instance::from_jsplib("2x2", "2 2\n0 3 1 2\n1 4 0 1\n").unwrap();
//! let solution = JobShopSolver::new(SolverConfig::default()).solve(&inst).unwrap();
//! assert_eq!(solution.makespan(), Some(6));
//! ```
//!
//! # References
//!
//! - Manne (1960), "On the Job-Shop Scheduling Problem"
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Brucker (2007), "Scheduling Algorithms"

pub mod conflict;
pub mod error;
pub mod extract;
pub mod formulation;
pub mod models;
pub mod scheduler;
pub mod solver;
pub mod validation;

pub use error::Error;
