//! Solve quality metrics (KPIs).
//!
//! Summarizes one optimization run: what was solved, how well, and at
//! what cost.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Makespan (C_max) | Latest completion time of the extracted schedule |
//! | Best bound | Proven lower bound on C_max |
//! | Gap | (C_max - bound) / C_max |
//! | Solve time | Backend wall-clock time |
//! | Nodes | Search nodes explored |
//! | Model size | Variables, binaries, constraints, conflict pairs |
//! | Utilization | Busy time / C_max per machine, and its mean |
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 1.2: Performance Measures

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::formulation::ModelSize;
use crate::models::Schedule;
use crate::solver::{FormulationKind, SolveReport};

/// Performance indicators of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveKpi {
    /// Backend name.
    pub method: String,
    /// Formulation family.
    pub formulation: FormulationKind,
    /// Makespan of the extracted schedule, if any.
    pub makespan: Option<i64>,
    /// Best proven lower bound, if any.
    pub best_bound: Option<i64>,
    /// Relative optimality gap, if a solution exists.
    pub gap: Option<f64>,
    /// Backend wall-clock time.
    pub solve_time: Duration,
    /// Search nodes explored.
    pub nodes: u64,
    /// Size of the model handed to the backend.
    pub model_size: ModelSize,
    /// Per-machine utilization keyed by machine label (`M1`, `M2`, ...).
    pub utilization_by_machine: HashMap<String, f64>,
    /// Mean utilization over machines with work.
    pub avg_utilization: f64,
}

impl SolveKpi {
    /// Computes KPIs from a solve report and the extracted schedule.
    ///
    /// # Arguments
    /// * `method` - Backend name.
    /// * `formulation` - Formulation family that was solved.
    /// * `model_size` - Size of the built model.
    /// * `report` - Backend outcome and statistics.
    /// * `schedule` - Extracted schedule, `None` if the run produced none.
    pub fn calculate(
        method: &str,
        formulation: FormulationKind,
        model_size: ModelSize,
        report: &SolveReport,
        schedule: Option<&Schedule>,
    ) -> Self {
        let utilization_by_machine: HashMap<String, f64> = schedule
            .map(|s| {
                s.all_utilizations()
                    .into_iter()
                    .map(|(m, u)| (m.to_string(), u))
                    .collect()
            })
            .unwrap_or_default();
        let avg_utilization = if utilization_by_machine.is_empty() {
            0.0
        } else {
            let sum: f64 = utilization_by_machine.values().sum();
            sum / utilization_by_machine.len() as f64
        };

        Self {
            method: method.to_string(),
            formulation,
            makespan: schedule.map(Schedule::makespan),
            best_bound: report.outcome.best_bound(),
            gap: report.outcome.gap(),
            solve_time: report.stats.elapsed,
            nodes: report.stats.nodes,
            model_size,
            utilization_by_machine,
            avg_utilization,
        }
    }

    /// Whether optimality was proven.
    pub fn is_optimal(&self) -> bool {
        self.gap.is_some_and(|g| g <= 0.0)
    }

    /// Whether the run meets the given quality thresholds.
    pub fn meets_thresholds(&self, max_gap: f64, min_utilization: f64) -> bool {
        self.gap.is_some_and(|g| g <= max_gap) && self.avg_utilization >= min_utilization
    }
}
