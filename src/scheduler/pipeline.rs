//! End-to-end solve pipeline.
//!
//! Instance → conflict pairs → model → backend → extracted schedule → KPIs.
//!
//! # Example
//!
//! ```
//! use u_jobshop::models::{Instance, InstanceData};
//! use u_jobshop::scheduler::{JobShopSolver, SolverConfig};
//! use u_jobshop::solver::FormulationKind;
//!
//! let inst = Instance::new(InstanceData::from_routes(
//!     "2x2",
//!     2,
//!     &[vec![(1, 3), (2, 2)], vec![(2, 4), (1, 1)]],
//! ))
//! .unwrap();
//!
//! for formulation in [FormulationKind::Disjunctive, FormulationKind::Interval] {
//!     let solver = JobShopSolver::new(SolverConfig::default().with_formulation(formulation));
//!     let solution = solver.solve(&inst).unwrap();
//!     assert!(solution.report.outcome.is_optimal());
//!     assert_eq!(solution.makespan(), Some(6));
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{DispatchRule, DispatchScheduler, SolveKpi};
use crate::conflict::ConflictPairs;
use crate::error::{Error, SolverError};
use crate::extract::{extract_schedule, Extraction};
use crate::formulation::{BigMPolicy, IntervalModelBuilder, ModelBuilder};
use crate::models::{Instance, Schedule};
use crate::solver::{
    ActiveScheduleSearch, Assignment, CancelToken, DisjunctiveBranchAndBound, Formulation,
    FormulationKind, Outcome, SolveParams, SolveReport, SolverBackend,
};

/// Pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Formulation family to build and solve.
    pub formulation: FormulationKind,
    /// Big-M choice for the disjunctive model.
    pub big_m: BigMPolicy,
    /// Wall-clock limit per instance.
    pub time_limit: Option<Duration>,
    /// Search node limit per instance.
    pub node_limit: Option<u64>,
    /// Seed the search with a dispatching schedule.
    pub warm_start: Option<DispatchRule>,
}

impl SolverConfig {
    /// Sets the formulation family.
    pub fn with_formulation(mut self, formulation: FormulationKind) -> Self {
        self.formulation = formulation;
        self
    }

    /// Sets the Big-M policy.
    pub fn with_big_m(mut self, big_m: BigMPolicy) -> Self {
        self.big_m = big_m;
        self
    }

    /// Sets or clears the time limit.
    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    /// Sets or clears the node limit.
    pub fn with_node_limit(mut self, limit: Option<u64>) -> Self {
        self.node_limit = limit;
        self
    }

    /// Sets or clears the warm-start rule.
    pub fn with_warm_start(mut self, rule: Option<DispatchRule>) -> Self {
        self.warm_start = rule;
        self
    }

    fn params(&self, cancel: Option<&CancelToken>) -> SolveParams {
        SolveParams {
            time_limit: self.time_limit,
            node_limit: self.node_limit,
            cancel: cancel.cloned(),
        }
    }
}

/// Result of solving one instance.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Instance name.
    pub instance: String,
    /// Validated schedule, or why there is none.
    pub extraction: Extraction,
    /// Raw backend report.
    pub report: SolveReport,
    /// Run metrics.
    pub kpi: SolveKpi,
}

impl Solution {
    /// The extracted schedule, if any.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.extraction.schedule()
    }

    /// Makespan of the extracted schedule.
    pub fn makespan(&self) -> Option<i64> {
        self.schedule().map(Schedule::makespan)
    }

    /// The backend outcome.
    pub fn outcome(&self) -> &Outcome {
        &self.report.outcome
    }
}

/// Job-shop solver: builds the configured formulation and hands it to an
/// exact backend.
///
/// Without an explicit backend, `Disjunctive` runs on
/// [`DisjunctiveBranchAndBound`] and `Interval` on [`ActiveScheduleSearch`].
#[derive(Debug, Clone, Default)]
pub struct JobShopSolver {
    config: SolverConfig,
    backend: Option<Arc<dyn SolverBackend>>,
}

impl JobShopSolver {
    /// Creates a solver with the given configuration.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    /// Uses `backend` instead of the default for the formulation.
    pub fn with_backend(mut self, backend: Arc<dyn SolverBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn backend(&self) -> Result<Arc<dyn SolverBackend>, SolverError> {
        let kind = self.config.formulation;
        let backend: Arc<dyn SolverBackend> = match &self.backend {
            Some(b) => Arc::clone(b),
            None => match kind {
                FormulationKind::Disjunctive => Arc::new(DisjunctiveBranchAndBound::new()),
                FormulationKind::Interval => Arc::new(ActiveScheduleSearch::new()),
            },
        };
        if backend.supports(kind) {
            Ok(backend)
        } else {
            Err(SolverError::UnsupportedFormulation {
                backend: backend.name(),
                formulation: kind.as_str(),
            })
        }
    }

    /// Solves one instance.
    ///
    /// # Errors
    /// - [`Error::Build`] if the model cannot be built.
    /// - [`Error::Solver`] if the backend rejects the formulation.
    /// - [`Error::UnexpectedInfeasibility`] if the backend reports a
    ///   well-formed instance infeasible.
    /// - [`Error::InconsistentSolution`] if the returned schedule fails
    ///   validation.
    pub fn solve(&self, instance: &Instance) -> Result<Solution, Error> {
        self.solve_with_cancel(instance, None)
    }

    /// Solves one instance, stopping early once `cancel` is set.
    ///
    /// A cancelled run still returns `Ok`: with the incumbent as a
    /// `Feasible` outcome, or without a schedule as `TimedOut`.
    pub fn solve_with_cancel(
        &self,
        instance: &Instance,
        cancel: Option<&CancelToken>,
    ) -> Result<Solution, Error> {
        let backend = self.backend()?;
        let kind = self.config.formulation;
        info!(
            instance = instance.name(),
            jobs = instance.n_jobs(),
            machines = instance.n_machines(),
            backend = backend.name(),
            formulation = %kind,
            "solving instance"
        );

        let warm_start = self.config.warm_start.map(|rule| {
            Assignment::from_starts(DispatchScheduler::new(rule).starts(instance))
        });
        let params = self.config.params(cancel);

        let (report, size) = match kind {
            FormulationKind::Disjunctive => {
                let pairs = ConflictPairs::enumerate(instance);
                let model = ModelBuilder::new(instance, &pairs)
                    .with_big_m(self.config.big_m)
                    .build()?;
                let formulation = Formulation::Disjunctive(&model);
                let report = backend.optimize(formulation, &params, warm_start.as_ref())?;
                (report, formulation.size())
            }
            FormulationKind::Interval => {
                let model = IntervalModelBuilder::new(instance).build()?;
                let formulation = Formulation::Interval(&model);
                let report = backend.optimize(formulation, &params, warm_start.as_ref())?;
                (report, formulation.size())
            }
        };

        if matches!(report.outcome, Outcome::Infeasible) {
            error!(
                instance = instance.name(),
                backend = backend.name(),
                "backend reported a well-formed instance infeasible"
            );
            return Err(Error::UnexpectedInfeasibility {
                backend: backend.name(),
                instance: instance.name().to_string(),
            });
        }

        let extraction = extract_schedule(instance, &report.outcome)?;
        let kpi = SolveKpi::calculate(backend.name(), kind, size, &report, extraction.schedule());
        info!(
            instance = instance.name(),
            outcome = report.outcome.label(),
            makespan = ?kpi.makespan,
            best_bound = ?kpi.best_bound,
            gap = ?kpi.gap,
            nodes = kpi.nodes,
            elapsed_ms = kpi.solve_time.as_millis() as u64,
            "instance solved"
        );

        Ok(Solution {
            instance: instance.name().to_string(),
            extraction,
            report,
            kpi,
        })
    }

    /// Solves independent instances in parallel on scoped worker threads.
    ///
    /// At most `available_parallelism()` workers run; each pulls the next
    /// unsolved instance. Results are in input order. Setting `cancel`
    /// stops every run that is still searching.
    pub fn solve_batch(
        &self,
        instances: &[Instance],
        cancel: Option<&CancelToken>,
    ) -> Vec<Result<Solution, Error>> {
        let workers = std::thread::available_parallelism()
            .map_or(1, |n| n.get())
            .min(instances.len());
        let next = AtomicUsize::new(0);
        let mut results: Vec<Option<Result<Solution, Error>>> =
            instances.iter().map(|_| None).collect();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut solved = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(instance) = instances.get(index) else {
                                break;
                            };
                            solved.push((index, self.solve_with_cancel(instance, cancel)));
                        }
                        solved
                    })
                })
                .collect();

            for handle in handles {
                let solved = handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e));
                for (index, result) in solved {
                    results[index] = Some(result);
                }
            }
        });

        debug!(instances = instances.len(), workers, "batch finished");
        results.into_iter().flatten().collect()
    }
}

/// Solves `instances` in parallel with `config`.
pub fn solve_batch(instances: &[Instance], config: &SolverConfig) -> Vec<Result<Solution, Error>> {
    JobShopSolver::new(config.clone()).solve_batch(instances, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::NoScheduleReason;
    use crate::models::generate::random_instance;
    use crate::models::{InstanceData, MachineId, OperationId, ViolationType};
    use crate::solver::{SolveStats, StopReason, Termination};
    use crate::validation::check_schedule;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    const FORMULATIONS: [FormulationKind; 2] =
        [FormulationKind::Disjunctive, FormulationKind::Interval];

    fn three_by_three() -> Instance {
        Instance::new(InstanceData::from_routes(
            "3x3",
            3,
            &[
                vec![(1, 3), (2, 2), (3, 2)],
                vec![(1, 2), (3, 3), (2, 4)],
                vec![(2, 4), (1, 1), (3, 3)],
            ],
        ))
        .unwrap()
    }

    fn permutations(items: &[OperationId]) -> Vec<Vec<OperationId>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    /// Semi-active makespan for fixed machine orders, `None` if cyclic.
    fn evaluate(inst: &Instance, orders: &[Vec<OperationId>]) -> Option<i64> {
        let mut arcs = Vec::new();
        for job in 0..inst.n_jobs() {
            for w in inst.job_operations(job).windows(2) {
                arcs.push((w[0].id, w[1].id));
            }
        }
        for order in orders {
            for w in order.windows(2) {
                arcs.push((w[0], w[1]));
            }
        }

        let mut starts: BTreeMap<OperationId, i64> =
            inst.operations().iter().map(|o| (o.id, 0)).collect();
        for _ in 0..=inst.operation_count() {
            let mut changed = false;
            for &(a, b) in &arcs {
                let ready = starts[&a] + inst.duration(a).unwrap();
                if starts[&b] < ready {
                    starts.insert(b, ready);
                    changed = true;
                }
            }
            if !changed {
                return inst
                    .operations()
                    .iter()
                    .map(|o| starts[&o.id] + o.duration)
                    .max();
            }
        }
        None
    }

    fn brute_force(inst: &Instance) -> i64 {
        let per_machine: Vec<Vec<Vec<OperationId>>> = (0..inst.n_machines())
            .map(|m| permutations(&inst.operations_on_machine(MachineId(m))))
            .collect();

        fn walk(
            inst: &Instance,
            per_machine: &[Vec<Vec<OperationId>>],
            chosen: &mut Vec<Vec<OperationId>>,
            best: &mut i64,
        ) {
            if chosen.len() == per_machine.len() {
                if let Some(c) = evaluate(inst, chosen) {
                    *best = (*best).min(c);
                }
                return;
            }
            for order in &per_machine[chosen.len()] {
                chosen.push(order.clone());
                walk(inst, per_machine, chosen, best);
                chosen.pop();
            }
        }

        let mut best = i64::MAX;
        walk(inst, &per_machine, &mut Vec::new(), &mut best);
        best
    }

    #[test]
    fn test_three_by_three_matches_brute_force() {
        let inst = three_by_three();
        assert_eq!(brute_force(&inst), 11);

        for formulation in FORMULATIONS {
            let solver = JobShopSolver::new(SolverConfig::default().with_formulation(formulation));
            let solution = solver.solve(&inst).unwrap();
            assert!(solution.outcome().is_optimal(), "{formulation}");
            assert_eq!(solution.makespan(), Some(11), "{formulation}");
            assert_eq!(solution.kpi.makespan, Some(11));
            assert_eq!(solution.kpi.formulation, formulation);
            let schedule = solution.schedule().unwrap();
            assert_eq!(schedule.len(), 9);
            assert!(check_schedule(&inst, &schedule.starts()).is_empty());
        }
    }

    #[test]
    fn test_kpi_reports_model_size() {
        let inst = three_by_three();
        let solution = JobShopSolver::new(SolverConfig::default()).solve(&inst).unwrap();
        assert_eq!(solution.kpi.method, "disjunctive-bnb");
        assert_eq!(solution.kpi.model_size.conflict_pairs, 9);
        assert_eq!(solution.kpi.model_size.binaries, 9);
        assert_eq!(solution.kpi.gap, Some(0.0));

        let solution = JobShopSolver::new(
            SolverConfig::default().with_formulation(FormulationKind::Interval),
        )
        .solve(&inst)
        .unwrap();
        assert_eq!(solution.kpi.method, "active-schedule");
        assert_eq!(solution.kpi.model_size.binaries, 0);
    }

    #[test]
    fn test_backends_agree_on_random_instances() {
        let mut rng = StdRng::seed_from_u64(2024);
        for i in 0..6 {
            let inst = random_instance(format!("rand{i}"), 3, 3, 1..=9, &mut rng).unwrap();
            let expected = brute_force(&inst);
            for formulation in FORMULATIONS {
                for big_m in [BigMPolicy::Horizon, BigMPolicy::HeadTail] {
                    let config = SolverConfig::default()
                        .with_formulation(formulation)
                        .with_big_m(big_m);
                    let solution = JobShopSolver::new(config).solve(&inst).unwrap();
                    assert!(solution.outcome().is_optimal());
                    assert_eq!(solution.makespan(), Some(expected), "{} {formulation}", inst.name());
                }
            }
        }
    }

    #[test]
    fn test_single_job_is_sequential() {
        let inst = Instance::new(InstanceData::from_routes(
            "line",
            3,
            &[vec![(2, 4), (1, 3), (3, 5)]],
        ))
        .unwrap();
        for formulation in FORMULATIONS {
            let solution = JobShopSolver::new(SolverConfig::default().with_formulation(formulation))
                .solve(&inst)
                .unwrap();
            assert_eq!(solution.makespan(), Some(12));
            assert_eq!(solution.kpi.model_size.conflict_pairs, 0);
        }
    }

    #[test]
    fn test_warm_start_with_node_limit() {
        let inst = three_by_three();
        for formulation in FORMULATIONS {
            let config = SolverConfig::default()
                .with_formulation(formulation)
                .with_node_limit(Some(1))
                .with_warm_start(Some(DispatchRule::Mwkr));
            let solution = JobShopSolver::new(config).solve(&inst).unwrap();
            let makespan = solution.makespan().unwrap();
            assert!(makespan >= 11);
            assert!(matches!(
                solution.outcome(),
                Outcome::Optimal { .. } | Outcome::Feasible { .. }
            ));
        }
    }

    #[test]
    fn test_zero_time_limit_times_out() {
        let inst = three_by_three();
        for formulation in FORMULATIONS {
            let config = SolverConfig::default()
                .with_formulation(formulation)
                .with_time_limit(Some(Duration::ZERO));
            let solution = JobShopSolver::new(config).solve(&inst).unwrap();
            assert!(matches!(
                solution.extraction,
                Extraction::NoFeasibleSchedule(NoScheduleReason::TimedOut { best_bound: Some(_) })
            ));
            assert_eq!(
                solution.report.stats.termination,
                Termination::Stopped(StopReason::TimeLimit)
            );
            assert_eq!(solution.makespan(), None);
        }
    }

    #[test]
    fn test_cancelled_batch() {
        let inst = three_by_three();
        let cancel = CancelToken::new();
        cancel.cancel();
        let solver = JobShopSolver::new(SolverConfig::default());
        let results = solver.solve_batch(&[inst.clone(), inst], Some(&cancel));
        assert_eq!(results.len(), 2);
        for r in results {
            let solution = r.unwrap();
            assert!(!solution.outcome().is_optimal());
            assert_eq!(
                solution.report.stats.termination,
                Termination::Stopped(StopReason::Cancelled)
            );
        }
    }

    #[test]
    fn test_solve_batch_keeps_order() {
        let mut rng = StdRng::seed_from_u64(5);
        let instances: Vec<Instance> = (0..4)
            .map(|i| random_instance(format!("b{i}"), 3, 2, 1..=5, &mut rng).unwrap())
            .collect();
        let config = SolverConfig::default().with_formulation(FormulationKind::Interval);
        let results = solve_batch(&instances, &config);
        assert_eq!(results.len(), 4);
        for (inst, r) in instances.iter().zip(results) {
            let solution = r.unwrap();
            assert_eq!(solution.instance, inst.name());
            assert_eq!(solution.makespan(), Some(brute_force(inst)));
        }
    }

    #[test]
    fn test_batch_larger_than_worker_pool() {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        let mut rng = StdRng::seed_from_u64(17);
        let instances: Vec<Instance> = (0..2 * workers + 3)
            .map(|i| random_instance(format!("w{i}"), 2, 2, 1..=4, &mut rng).unwrap())
            .collect();
        let results = solve_batch(&instances, &SolverConfig::default());
        assert_eq!(results.len(), instances.len());
        for (inst, r) in instances.iter().zip(results) {
            let solution = r.unwrap();
            assert_eq!(solution.instance, inst.name());
            assert!(solution.outcome().is_optimal());
        }

        assert!(solve_batch(&[], &SolverConfig::default()).is_empty());
    }

    /// Backend that ignores the model and returns a fixed outcome.
    #[derive(Debug)]
    struct FixedOutcome(Outcome);

    impl SolverBackend for FixedOutcome {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn supports(&self, _kind: FormulationKind) -> bool {
            true
        }

        fn optimize(
            &self,
            _formulation: Formulation<'_>,
            _params: &SolveParams,
            _warm_start: Option<&Assignment>,
        ) -> Result<SolveReport, SolverError> {
            Ok(SolveReport {
                outcome: self.0.clone(),
                stats: SolveStats {
                    elapsed: Duration::ZERO,
                    nodes: 0,
                    solutions: 0,
                    termination: Termination::OptimalityProven,
                },
            })
        }
    }

    fn two_by_two() -> Instance {
        Instance::new(InstanceData::from_routes(
            "2x2",
            2,
            &[vec![(1, 3), (2, 2)], vec![(2, 4), (1, 1)]],
        ))
        .unwrap()
    }

    #[test]
    fn test_infeasible_claim_is_an_error() {
        let inst = two_by_two();
        for formulation in FORMULATIONS {
            let solver = JobShopSolver::new(SolverConfig::default().with_formulation(formulation))
                .with_backend(Arc::new(FixedOutcome(Outcome::Infeasible)));
            let err = solver.solve(&inst).unwrap_err();
            assert_eq!(
                err,
                Error::UnexpectedInfeasibility {
                    backend: "fixed",
                    instance: "2x2".to_string(),
                }
            );
        }
    }

    #[test]
    fn test_overlapping_assignment_is_an_error() {
        let inst = two_by_two();
        // J1.O2 [3, 5) and J2.O1 [0, 4) share M2
        let starts: BTreeMap<OperationId, i64> = [
            (OperationId::new(0, 0), 0),
            (OperationId::new(0, 1), 3),
            (OperationId::new(1, 0), 0),
            (OperationId::new(1, 1), 4),
        ]
        .into_iter()
        .collect();
        let outcome = Outcome::Optimal {
            assignment: Assignment::from_starts(starts),
            objective: 5,
        };
        let solver = JobShopSolver::new(SolverConfig::default())
            .with_backend(Arc::new(FixedOutcome(outcome)));

        match solver.solve(&inst) {
            Err(Error::InconsistentSolution(e)) => assert!(e
                .violations
                .iter()
                .any(|v| v.violation_type == ViolationType::MachineOverlap)),
            other => panic!("expected an inconsistent solution, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_backend_must_support_formulation() {
        let inst = three_by_three();
        let solver = JobShopSolver::new(SolverConfig::default())
            .with_backend(Arc::new(ActiveScheduleSearch::new()));
        let err = solver.solve(&inst).unwrap_err();
        assert_eq!(
            err,
            Error::Solver(SolverError::UnsupportedFormulation {
                backend: "active-schedule",
                formulation: "disjunctive",
            })
        );
    }

    #[test]
    fn test_config_serde() {
        let config = SolverConfig::default()
            .with_formulation(FormulationKind::Interval)
            .with_big_m(BigMPolicy::HeadTail)
            .with_time_limit(Some(Duration::from_secs(30)))
            .with_node_limit(Some(10_000))
            .with_warm_start(Some(DispatchRule::Spt));
        let json = serde_json::to_string(&config).unwrap();
        let back: SolverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let partial: SolverConfig = serde_json::from_str(r#"{"node_limit": 5}"#).unwrap();
        assert_eq!(partial.node_limit, Some(5));
        assert_eq!(partial.formulation, FormulationKind::Disjunctive);
        assert_eq!(partial.time_limit, None);
    }
}
