//! Branch-and-bound over the sequencing binaries of a disjunctive model.
//!
//! Once its binaries are fixed, every row of the job-shop MILP is a
//! difference constraint `x[to] - x[from] >= w`. A node therefore needs no
//! LP: rows whose binary is still free are relaxed to the weaker of their
//! two weights and the remaining system is solved by longest-path label
//! correction from the variable lower bounds. That least solution gives the
//! node's makespan bound. If every free binary has a value its rows accept
//! under the least solution, the node is a leaf and the least solution is
//! optimal for the subtree. Otherwise the search branches on the free
//! binary with the largest two-sided violation, most promising child first.
//!
//! # Reference
//! - Balas (1969), "Machine Sequencing via Disjunctive Graphs"
//! - Applegate & Cook (1991), "A Computational Study of the Job-Shop Scheduling Problem"

use std::collections::VecDeque;
use tracing::{debug, warn};

use super::{
    conclude, Assignment, Formulation, FormulationKind, SearchCommand, SearchMonitor,
    SolveParams, SolveReport, SolverBackend,
};
use crate::error::SolverError;
use crate::formulation::{Model, Sense, VarKind};

/// Exact backend for [`Formulation::Disjunctive`].
///
/// # Example
/// ```
/// use u_jobshop::conflict::ConflictPairs;
/// use u_jobshop::formulation::ModelBuilder;
/// use u_jobshop::models::{Instance, InstanceData};
/// use u_jobshop::solver::{DisjunctiveBranchAndBound, Formulation, SolveParams, SolverBackend};
///
/// let inst = Instance::new(InstanceData::from_routes(
///     "2x2",
///     2,
///     &[vec![(1, 3), (2, 2)], vec![(2, 4), (1, 1)]],
/// ))
/// .unwrap();
/// let pairs = ConflictPairs::enumerate(&inst);
/// let model = ModelBuilder::new(&inst, &pairs).build().unwrap();
/// let report = DisjunctiveBranchAndBound::new()
///     .optimize(Formulation::Disjunctive(&model), &SolveParams::default(), None)
///     .unwrap();
/// assert_eq!(report.outcome.objective(), Some(6));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DisjunctiveBranchAndBound;

impl DisjunctiveBranchAndBound {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

/// `x[to] - x[from] >= base - coef * y`, with `y` absent for static rows.
#[derive(Debug, Clone, Copy)]
struct Row {
    to: usize,
    from: usize,
    base: i64,
    binary: Option<(usize, i64)>,
}

impl Row {
    fn weight(&self, fixed: &[Option<bool>]) -> i64 {
        match self.binary {
            None => self.base,
            Some((b, coef)) => match fixed[b] {
                Some(y) => self.base - coef * i64::from(y),
                None => self.base.min(self.base - coef),
            },
        }
    }

    fn shortfall(&self, dist: &[i64], y: bool) -> i64 {
        let coef = self.binary.map_or(0, |(_, c)| c);
        let need = self.base - coef * i64::from(y);
        (need - (dist[self.to] - dist[self.from])).max(0)
    }
}

/// Difference-constraint view of a [`Model`].
///
/// Nodes are the model variables plus a trailing zero node pinned to 0,
/// which absorbs single-variable rows.
#[derive(Debug)]
struct DifferenceGraph {
    rows: Vec<Row>,
    out_rows: Vec<Vec<usize>>,
    binary_rows: Vec<Vec<usize>>,
    binary_vars: Vec<usize>,
    lower: Vec<i64>,
    upper: Vec<i64>,
    objective: usize,
}

impl DifferenceGraph {
    fn new(model: &Model) -> Result<Self, SolverError> {
        let vars = model.variables();
        let n = vars.len();
        let zero = n;

        let mut binary_of = vec![None; n];
        let mut binary_vars = Vec::new();
        for (i, v) in vars.iter().enumerate() {
            if v.kind == VarKind::Binary {
                binary_of[i] = Some(binary_vars.len());
                binary_vars.push(i);
            }
        }

        let mut rows = Vec::with_capacity(model.constraints().len());
        for c in model.constraints() {
            let unsupported = |reason: &str| SolverError::UnsupportedConstraint {
                name: c.name.clone(),
                reason: reason.to_string(),
            };
            let sign = match c.sense {
                Sense::Ge => 1,
                Sense::Le => -1,
            };
            let (mut to, mut from, mut binary) = (None, None, None);
            for &(var, coef) in &c.terms {
                let coef = coef * sign;
                match binary_of.get(var.0) {
                    None => return Err(unsupported("references an unknown variable")),
                    Some(Some(b)) => {
                        if binary.replace((*b, coef)).is_some() {
                            return Err(unsupported("has more than one binary term"));
                        }
                    }
                    Some(None) => match coef {
                        1 if to.is_none() => to = Some(var.0),
                        -1 if from.is_none() => from = Some(var.0),
                        _ => return Err(unsupported("is not a difference constraint")),
                    },
                }
            }
            rows.push(Row {
                to: to.unwrap_or(zero),
                from: from.unwrap_or(zero),
                base: c.rhs * sign,
                binary,
            });
        }

        let mut out_rows = vec![Vec::new(); n + 1];
        let mut binary_rows = vec![Vec::new(); binary_vars.len()];
        for (r, row) in rows.iter().enumerate() {
            out_rows[row.from].push(r);
            if let Some((b, _)) = row.binary {
                binary_rows[b].push(r);
            }
        }

        let mut lower: Vec<i64> = vars.iter().map(|v| v.lower).collect();
        let mut upper: Vec<i64> = vars.iter().map(|v| v.upper).collect();
        lower.push(0);
        upper.push(0);

        Ok(Self {
            rows,
            out_rows,
            binary_rows,
            binary_vars,
            lower,
            upper,
            objective: model.makespan_var().0,
        })
    }

    /// Raises `dist` to the least fixpoint of the active rows.
    ///
    /// Returns `false` when a variable exceeds its upper bound, or the
    /// objective reaches `cap`.
    fn propagate(
        &self,
        dist: &mut [i64],
        fixed: &[Option<bool>],
        seeds: impl IntoIterator<Item = usize>,
        cap: i64,
    ) -> bool {
        let mut queue = VecDeque::new();
        let mut queued = vec![false; dist.len()];
        for s in seeds {
            if !queued[s] {
                queued[s] = true;
                queue.push_back(s);
            }
        }

        while let Some(v) = queue.pop_front() {
            queued[v] = false;
            for &r in &self.out_rows[v] {
                let row = &self.rows[r];
                let candidate = dist[v].saturating_add(row.weight(fixed));
                if candidate <= dist[row.to] {
                    continue;
                }
                let limit = if row.to == self.objective {
                    self.upper[row.to].min(cap - 1)
                } else {
                    self.upper[row.to]
                };
                if candidate > limit {
                    return false;
                }
                dist[row.to] = candidate;
                if !queued[row.to] {
                    queued[row.to] = true;
                    queue.push_back(row.to);
                }
            }
        }
        true
    }
}

/// Open subproblem: fixings plus the least solution of its relaxation.
#[derive(Debug, Clone)]
struct Node {
    fixed: Vec<Option<bool>>,
    dist: Vec<i64>,
}

/// Free binary whose rows reject both values, with its violations.
#[derive(Debug, Clone, Copy)]
struct Conflict {
    binary: usize,
    score: i64,
    if_true: i64,
    if_false: i64,
}

impl DisjunctiveBranchAndBound {
    fn violation(graph: &DifferenceGraph, node: &Node, b: usize, y: bool) -> i64 {
        graph.binary_rows[b]
            .iter()
            .map(|&r| graph.rows[r].shortfall(&node.dist, y))
            .sum()
    }

    fn most_conflicting(graph: &DifferenceGraph, node: &Node) -> Option<Conflict> {
        let mut best: Option<Conflict> = None;
        for b in (0..graph.binary_vars.len()).filter(|&b| node.fixed[b].is_none()) {
            let if_true = Self::violation(graph, node, b, true);
            let if_false = Self::violation(graph, node, b, false);
            if if_true > 0 && if_false > 0 {
                let score = if_true.min(if_false);
                if best.map_or(true, |c| score > c.score) {
                    best = Some(Conflict {
                        binary: b,
                        score,
                        if_true,
                        if_false,
                    });
                }
            }
        }
        best
    }

    /// Full variable vector of a leaf node.
    fn leaf_values(graph: &DifferenceGraph, node: &Node) -> Vec<i64> {
        let mut values = node.dist[..node.dist.len() - 1].to_vec();
        for (b, &var) in graph.binary_vars.iter().enumerate() {
            let y = node.fixed[b].unwrap_or_else(|| Self::violation(graph, node, b, true) == 0);
            values[var] = i64::from(y);
        }
        values
    }

    fn assignment(model: &Model, values: &[i64]) -> Assignment {
        Assignment {
            starts: model.starts_from_values(values),
            sequencing: model.sequencing_from_values(values),
        }
    }

    fn search(
        &self,
        model: &Model,
        params: &SolveParams,
        warm_start: Option<&Assignment>,
    ) -> Result<SolveReport, SolverError> {
        let mut monitor = SearchMonitor::new(params);
        let graph = DifferenceGraph::new(model)?;
        let obj = graph.objective;

        let mut incumbent: Option<(Assignment, i64)> = None;
        let mut solutions = 0u64;

        if let Some(ws) = warm_start {
            match model.complete_from_starts(&ws.starts) {
                Some(values) if model.is_feasible(&values) => {
                    let objective = values[obj];
                    incumbent = Some((Self::assignment(model, &values), objective));
                    solutions += 1;
                    debug!(backend = self.name(), objective, "accepted warm start");
                }
                _ => warn!(
                    backend = self.name(),
                    instance = model.name(),
                    "warm start is not feasible for the model, ignoring it"
                ),
            }
        }
        let cap = |incumbent: &Option<(Assignment, i64)>| incumbent.as_ref().map_or(i64::MAX, |(_, o)| *o);

        let mut stack = Vec::new();
        let root_fixed = vec![None; graph.binary_vars.len()];
        let mut root_dist = graph.lower.clone();
        let all_nodes = 0..root_dist.len();
        let bounds_ok = graph.lower.iter().zip(&graph.upper).all(|(l, u)| l <= u);
        if bounds_ok
            && graph.propagate(&mut root_dist, &root_fixed, all_nodes, cap(&incumbent))
        {
            debug!(
                backend = self.name(),
                root_bound = root_dist[obj],
                binaries = graph.binary_vars.len(),
                "root relaxation solved"
            );
            stack.push(Node {
                fixed: root_fixed,
                dist: root_dist,
            });
        }

        let mut stopped = None;
        while !stack.is_empty() {
            if let SearchCommand::Terminate(reason) = monitor.command() {
                stopped = Some(reason);
                break;
            }
            let Some(node) = stack.pop() else { break };
            monitor.on_node();

            let limit = cap(&incumbent);
            if node.dist[obj] >= limit {
                continue;
            }

            match Self::most_conflicting(&graph, &node) {
                None => {
                    let values = Self::leaf_values(&graph, &node);
                    if !model.is_feasible(&values) {
                        warn!(backend = self.name(), "leaf relaxation is not feasible, skipping");
                        continue;
                    }
                    let objective = values[obj];
                    debug!(backend = self.name(), objective, nodes = monitor.nodes(), "new incumbent");
                    incumbent = Some((Self::assignment(model, &values), objective));
                    solutions += 1;
                }
                Some(conflict) => {
                    let preferred = conflict.if_true <= conflict.if_false;
                    // Pushed last, explored first.
                    for y in [!preferred, preferred] {
                        let mut child = node.clone();
                        child.fixed[conflict.binary] = Some(y);
                        let seeds = graph.binary_rows[conflict.binary]
                            .iter()
                            .map(|&r| graph.rows[r].from);
                        if graph.propagate(&mut child.dist, &child.fixed, seeds, limit) {
                            stack.push(child);
                        }
                    }
                }
            }
        }

        let best_bound = stopped.and_then(|_| stack.iter().map(|n| n.dist[obj]).min());
        Ok(conclude(
            self.name(),
            incumbent,
            stopped,
            best_bound,
            &monitor,
            solutions,
        ))
    }
}

impl SolverBackend for DisjunctiveBranchAndBound {
    fn name(&self) -> &'static str {
        "disjunctive-bnb"
    }

    fn supports(&self, kind: FormulationKind) -> bool {
        kind == FormulationKind::Disjunctive
    }

    fn optimize(
        &self,
        formulation: Formulation<'_>,
        params: &SolveParams,
        warm_start: Option<&Assignment>,
    ) -> Result<SolveReport, SolverError> {
        match formulation {
            Formulation::Disjunctive(model) => self.search(model, params, warm_start),
            other => Err(SolverError::UnsupportedFormulation {
                backend: self.name(),
                formulation: other.kind().as_str(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictPairs;
    use crate::formulation::{BigMPolicy, IntervalModelBuilder, ModelBuilder};
    use crate::models::{Instance, InstanceData, OperationId};
    use crate::solver::{CancelToken, Outcome, StopReason, Termination};
    use crate::validation::check_schedule;
    use std::collections::BTreeMap;
    use std::time::Duration;

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

    fn solve(inst: &Instance, policy: BigMPolicy, params: &SolveParams, warm: Option<&Assignment>) -> SolveReport {
        let pairs = ConflictPairs::enumerate(inst);
        let model = ModelBuilder::new(inst, &pairs).with_big_m(policy).build().unwrap();
        DisjunctiveBranchAndBound::new()
            .optimize(Formulation::Disjunctive(&model), params, warm)
            .unwrap()
    }

    fn sequential_starts(inst: &Instance) -> BTreeMap<OperationId, i64> {
        let mut t = 0;
        inst.operations()
            .iter()
            .map(|o| {
                let s = t;
                t += o.duration;
                (o.id, s)
            })
            .collect()
    }

    #[test]
    fn test_three_by_three_optimal() {
        let inst = three_by_three();
        for policy in [BigMPolicy::Horizon, BigMPolicy::HeadTail] {
            let report = solve(&inst, policy, &SolveParams::default(), None);
            let Outcome::Optimal { assignment, objective } = &report.outcome else {
                panic!("expected optimal, got {}", report.outcome);
            };
            assert_eq!(*objective, 11);
            assert!(check_schedule(&inst, &assignment.starts).is_empty());
            assert_eq!(assignment.sequencing.len(), 9);
            assert_eq!(report.stats.termination, Termination::OptimalityProven);
            assert!(report.stats.nodes >= 1);
        }
    }

    #[test]
    fn test_sequencing_matches_starts() {
        let inst = three_by_three();
        let pairs = ConflictPairs::enumerate(&inst);
        let report = solve(&inst, BigMPolicy::Horizon, &SolveParams::default(), None);
        let assignment = report.outcome.assignment().unwrap();
        for (id, pair) in pairs.iter() {
            let first_first = assignment.sequencing[&id];
            let s1 = assignment.starts[&pair.first];
            let s2 = assignment.starts[&pair.second];
            let d1 = inst.duration(pair.first).unwrap();
            let d2 = inst.duration(pair.second).unwrap();
            if first_first {
                assert!(s1 + d1 <= s2);
            } else {
                assert!(s2 + d2 <= s1);
            }
        }
    }

    #[test]
    fn test_single_job() {
        let inst = Instance::new(InstanceData::from_routes(
            "single",
            3,
            &[vec![(2, 4), (1, 1), (3, 3)]],
        ))
        .unwrap();
        let report = solve(&inst, BigMPolicy::Horizon, &SolveParams::default(), None);
        assert_eq!(report.outcome.objective(), Some(8));
        assert!(report.outcome.is_optimal());
        assert_eq!(report.stats.nodes, 1);
    }

    #[test]
    fn test_zero_durations() {
        let inst = Instance::new(InstanceData::from_routes(
            "zeros",
            2,
            &[vec![(1, 0), (2, 0)], vec![(2, 0), (1, 0)]],
        ))
        .unwrap();
        let report = solve(&inst, BigMPolicy::Horizon, &SolveParams::default(), None);
        assert_eq!(report.outcome.objective(), Some(0));
    }

    #[test]
    fn test_warm_start_accepted() {
        let inst = three_by_three();
        let warm = Assignment::from_starts(sequential_starts(&inst));
        let report = solve(&inst, BigMPolicy::Horizon, &SolveParams::default(), Some(&warm));
        assert_eq!(report.outcome.objective(), Some(11));
        assert!(report.stats.solutions >= 2);
    }

    #[test]
    fn test_infeasible_warm_start_ignored() {
        let inst = three_by_three();
        let starts = inst.operations().iter().map(|o| (o.id, 0)).collect();
        let warm = Assignment::from_starts(starts);
        let report = solve(&inst, BigMPolicy::Horizon, &SolveParams::default(), Some(&warm));
        assert_eq!(report.outcome.objective(), Some(11));
    }

    #[test]
    fn test_node_limit_without_incumbent_times_out() {
        let inst = three_by_three();
        let params = SolveParams::default().with_node_limit(1);
        let report = solve(&inst, BigMPolicy::Horizon, &params, None);
        assert!(matches!(report.outcome, Outcome::TimedOut { best_bound: Some(_) }));
        assert_eq!(
            report.stats.termination,
            Termination::Stopped(StopReason::NodeLimit)
        );
    }

    #[test]
    fn test_node_limit_with_incumbent_is_feasible() {
        let inst = three_by_three();
        let warm = Assignment::from_starts(sequential_starts(&inst));
        let params = SolveParams::default().with_node_limit(1);
        let report = solve(&inst, BigMPolicy::Horizon, &params, Some(&warm));
        let Outcome::Feasible { objective, best_bound, .. } = report.outcome else {
            panic!("expected feasible, got {}", report.outcome);
        };
        assert_eq!(objective, 24);
        assert!((9..=11).contains(&best_bound));
    }

    #[test]
    fn test_zero_time_limit() {
        let inst = three_by_three();
        let params = SolveParams::default().with_time_limit(Duration::ZERO);
        let report = solve(&inst, BigMPolicy::Horizon, &params, None);
        // Root bound: the longest job.
        assert_eq!(report.outcome, Outcome::TimedOut { best_bound: Some(9) });
        assert_eq!(report.stats.nodes, 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let inst = three_by_three();
        let token = CancelToken::new();
        token.cancel();
        let params = SolveParams::default().with_cancel(token);
        let report = solve(&inst, BigMPolicy::Horizon, &params, None);
        assert!(matches!(report.outcome, Outcome::TimedOut { .. }));
        assert_eq!(
            report.stats.termination,
            Termination::Stopped(StopReason::Cancelled)
        );
    }

    #[test]
    fn test_rejects_interval_formulation() {
        let inst = three_by_three();
        let model = IntervalModelBuilder::new(&inst).build().unwrap();
        let backend = DisjunctiveBranchAndBound::new();
        assert!(!backend.supports(FormulationKind::Interval));
        let err = backend
            .optimize(Formulation::Interval(&model), &SolveParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, SolverError::UnsupportedFormulation { .. }));
    }
}
