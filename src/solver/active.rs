//! Active schedule enumeration on an interval model.
//!
//! Depth-first Giffler–Thompson search: at every node the available
//! operation with the earliest completion `ect*` is found, and the search
//! branches on every available operation of the same machine that could
//! start before `ect*`. Every active schedule is reachable this way, and
//! the active schedules contain an optimal one for the makespan.
//!
//! Nodes are pruned with two bounds computed from dynamic heads `h`
//! (earliest start given the partial schedule) and static tails `q`
//! (work left in the job after the operation):
//! - path bound: `max(h[i] + d[i] + q[i])` over unscheduled operations
//! - machine bound: `min h + Σ d + min q` over the unscheduled operations
//!   of each machine
//!
//! # Reference
//! - Giffler & Thompson (1960), "Algorithms for Solving Production-Scheduling Problems"
//! - Brucker et al. (1994), "A branch and bound algorithm for the job-shop scheduling problem"

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::{
    conclude, Assignment, Formulation, FormulationKind, SearchCommand, SearchMonitor,
    SolveParams, SolveReport, SolverBackend,
};
use crate::error::SolverError;
use crate::formulation::{IntervalConstraint, IntervalModel};
use crate::models::OperationId;

/// Exact backend for [`Formulation::Interval`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveScheduleSearch;

impl ActiveScheduleSearch {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

/// Dense view of an interval model.
#[derive(Debug)]
struct Problem {
    ops: Vec<OperationId>,
    duration: Vec<i64>,
    start_min: Vec<i64>,
    start_max: Vec<i64>,
    preds: Vec<Vec<usize>>,
    resource: Vec<Option<usize>>,
    members: Vec<Vec<usize>>,
    topo: Vec<usize>,
    tail: Vec<i64>,
}

/// A partial schedule.
#[derive(Debug, Clone)]
struct Partial {
    start: Vec<Option<i64>>,
    ready: Vec<i64>,
    remaining: usize,
    makespan: i64,
    bound: i64,
}

impl Problem {
    /// Returns `Ok(None)` when the precedence links form a cycle.
    fn new(model: &IntervalModel) -> Result<Option<Self>, SolverError> {
        let ops: Vec<OperationId> = model.intervals().keys().copied().collect();
        let index: HashMap<OperationId, usize> =
            ops.iter().enumerate().map(|(i, &op)| (op, i)).collect();
        let n = ops.len();
        let lookup = |op: &OperationId, name: String| {
            index
                .get(op)
                .copied()
                .ok_or_else(|| SolverError::UnsupportedConstraint {
                    name,
                    reason: format!("references {op}, which has no interval"),
                })
        };

        let mut preds = vec![Vec::new(); n];
        let mut succs = vec![Vec::new(); n];
        let mut resource = vec![None; n];
        let mut members = Vec::new();

        for c in model.constraints() {
            match c {
                IntervalConstraint::EndBeforeStart { before, after } => {
                    let name = format!("end_before_start({before}, {after})");
                    let b = lookup(before, name.clone())?;
                    let a = lookup(after, name)?;
                    preds[a].push(b);
                    succs[b].push(a);
                }
                IntervalConstraint::NoOverlap {
                    machine,
                    operations,
                } => {
                    let r = members.len();
                    let mut list = Vec::with_capacity(operations.len());
                    for op in operations {
                        let name = format!("no_overlap({machine})");
                        let i = lookup(op, name.clone())?;
                        if resource[i].replace(r).is_some() {
                            return Err(SolverError::UnsupportedConstraint {
                                name,
                                reason: format!("{op} is in more than one no-overlap constraint"),
                            });
                        }
                        list.push(i);
                    }
                    members.push(list);
                }
            }
        }

        // Kahn's algorithm; leftovers mean a cycle.
        let mut indegree: Vec<usize> = preds.iter().map(Vec::len).collect();
        let mut topo: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut head = 0;
        while head < topo.len() {
            let i = topo[head];
            head += 1;
            for &s in &succs[i] {
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    topo.push(s);
                }
            }
        }
        if topo.len() < n {
            return Ok(None);
        }

        let intervals = model.intervals();
        let duration: Vec<i64> = ops.iter().map(|op| intervals[op].duration).collect();
        let mut tail = vec![0i64; n];
        for &i in topo.iter().rev() {
            tail[i] = succs[i]
                .iter()
                .map(|&s| duration[s] + tail[s])
                .max()
                .unwrap_or(0);
        }

        Ok(Some(Self {
            start_min: ops.iter().map(|op| intervals[op].start_min).collect(),
            start_max: ops.iter().map(|op| intervals[op].start_max).collect(),
            ops,
            duration,
            preds,
            resource,
            members,
            topo,
            tail,
        }))
    }

    fn root(&self) -> Partial {
        Partial {
            start: vec![None; self.ops.len()],
            ready: vec![0; self.members.len()],
            remaining: self.ops.len(),
            makespan: 0,
            bound: 0,
        }
    }

    /// Earliest start of every operation given the partial schedule.
    fn heads(&self, p: &Partial) -> Vec<i64> {
        let mut h = vec![0i64; self.ops.len()];
        for &i in &self.topo {
            h[i] = match p.start[i] {
                Some(s) => s,
                None => {
                    let ready = self.resource[i].map_or(0, |r| p.ready[r]);
                    self.preds[i]
                        .iter()
                        .map(|&q| h[q] + self.duration[q])
                        .fold(self.start_min[i].max(ready), i64::max)
                }
            };
        }
        h
    }

    /// Lower bound on any completion of `p`, or `None` if a start domain is
    /// already violated.
    fn lower_bound(&self, p: &Partial, h: &[i64]) -> Option<i64> {
        let mut bound = p.makespan;
        for i in (0..self.ops.len()).filter(|&i| p.start[i].is_none()) {
            if h[i] > self.start_max[i] {
                return None;
            }
            bound = bound.max(h[i].saturating_add(self.duration[i]).saturating_add(self.tail[i]));
        }
        for list in &self.members {
            let open = list.iter().filter(|&&i| p.start[i].is_none());
            let (mut min_head, mut load, mut min_tail) = (i64::MAX, 0i64, i64::MAX);
            let mut any = false;
            for &i in open {
                any = true;
                min_head = min_head.min(h[i]);
                load += self.duration[i];
                min_tail = min_tail.min(self.tail[i]);
            }
            if any {
                bound = bound.max(min_head.saturating_add(load).saturating_add(min_tail));
            }
        }
        Some(bound)
    }

    /// Giffler–Thompson conflict set of `p`.
    fn conflict_set(&self, p: &Partial, h: &[i64]) -> Vec<usize> {
        let available: Vec<usize> = (0..self.ops.len())
            .filter(|&i| p.start[i].is_none() && self.preds[i].iter().all(|&q| p.start[q].is_some()))
            .collect();
        let Some(&star) = available
            .iter()
            .min_by_key(|&&i| (h[i] + self.duration[i], i))
        else {
            return Vec::new();
        };
        let ect = h[star] + self.duration[star];
        match self.resource[star] {
            None => vec![star],
            Some(r) => available
                .into_iter()
                .filter(|&i| i == star || (self.resource[i] == Some(r) && h[i] < ect))
                .collect(),
        }
    }

    fn schedule(&self, p: &Partial, i: usize, start: i64, cap: i64) -> Option<Partial> {
        if start > self.start_max[i] {
            return None;
        }
        let mut child = p.clone();
        let end = start + self.duration[i];
        child.start[i] = Some(start);
        if let Some(r) = self.resource[i] {
            child.ready[r] = end;
        }
        child.remaining -= 1;
        child.makespan = child.makespan.max(end);
        let h = self.heads(&child);
        child.bound = self.lower_bound(&child, &h)?;
        (child.bound < cap).then_some(child)
    }

    fn starts(&self, p: &Partial) -> BTreeMap<OperationId, i64> {
        self.ops
            .iter()
            .zip(&p.start)
            .filter_map(|(&op, s)| s.map(|s| (op, s)))
            .collect()
    }
}

impl ActiveScheduleSearch {
    fn search(
        &self,
        model: &IntervalModel,
        params: &SolveParams,
        warm_start: Option<&Assignment>,
    ) -> Result<SolveReport, SolverError> {
        let mut monitor = SearchMonitor::new(params);
        let Some(problem) = Problem::new(model)? else {
            warn!(
                backend = self.name(),
                instance = model.name(),
                "precedence links form a cycle"
            );
            return Ok(conclude(self.name(), None, None, None, &monitor, 0));
        };

        let mut incumbent: Option<(Assignment, i64)> = None;
        let mut solutions = 0u64;
        if let Some(ws) = warm_start {
            match model.objective(&ws.starts) {
                Some(objective) if model.is_feasible(&ws.starts) => {
                    incumbent = Some((Assignment::from_starts(ws.starts.clone()), objective));
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
        let mut root = problem.root();
        let h = problem.heads(&root);
        if let Some(bound) = problem.lower_bound(&root, &h) {
            root.bound = bound;
            debug!(backend = self.name(), root_bound = bound, "root bound computed");
            if bound < cap(&incumbent) {
                stack.push(root);
            }
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
            if node.bound >= limit {
                continue;
            }
            if node.remaining == 0 {
                debug!(backend = self.name(), objective = node.makespan, nodes = monitor.nodes(), "new incumbent");
                incumbent = Some((Assignment::from_starts(problem.starts(&node)), node.makespan));
                solutions += 1;
                continue;
            }

            let h = problem.heads(&node);
            let mut children: Vec<(usize, Partial)> = problem
                .conflict_set(&node, &h)
                .into_iter()
                .filter_map(|i| problem.schedule(&node, i, h[i], limit).map(|c| (i, c)))
                .collect();
            // Smallest bound explored first, larger tail breaking ties.
            children.sort_by_key(|(i, c)| (std::cmp::Reverse(c.bound), problem.tail[*i]));
            stack.extend(children.into_iter().map(|(_, c)| c));
        }

        let best_bound = stopped.and_then(|_| stack.iter().map(|p| p.bound).min());
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

impl SolverBackend for ActiveScheduleSearch {
    fn name(&self) -> &'static str {
        "active-schedule"
    }

    fn supports(&self, kind: FormulationKind) -> bool {
        kind == FormulationKind::Interval
    }

    fn optimize(
        &self,
        formulation: Formulation<'_>,
        params: &SolveParams,
        warm_start: Option<&Assignment>,
    ) -> Result<SolveReport, SolverError> {
        match formulation {
            Formulation::Interval(model) => self.search(model, params, warm_start),
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
    use crate::formulation::{IntervalModelBuilder, ModelBuilder};
    use crate::models::{Instance, InstanceData};
    use crate::solver::{Outcome, StopReason, Termination};
    use crate::validation::check_schedule;
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

    fn solve(inst: &Instance, params: &SolveParams, warm: Option<&Assignment>) -> SolveReport {
        let model = IntervalModelBuilder::new(inst).build().unwrap();
        ActiveScheduleSearch::new()
            .optimize(Formulation::Interval(&model), params, warm)
            .unwrap()
    }

    fn sequential(inst: &Instance) -> Assignment {
        let mut t = 0;
        Assignment::from_starts(
            inst.operations()
                .iter()
                .map(|o| {
                    let s = t;
                    t += o.duration;
                    (o.id, s)
                })
                .collect(),
        )
    }

    #[test]
    fn test_three_by_three_optimal() {
        let inst = three_by_three();
        let report = solve(&inst, &SolveParams::default(), None);
        let Outcome::Optimal { assignment, objective } = &report.outcome else {
            panic!("expected optimal, got {}", report.outcome);
        };
        assert_eq!(*objective, 11);
        assert!(check_schedule(&inst, &assignment.starts).is_empty());
        assert!(assignment.sequencing.is_empty());
        assert_eq!(report.stats.termination, Termination::OptimalityProven);
    }

    #[test]
    fn test_single_job() {
        let inst = Instance::new(InstanceData::from_routes(
            "single",
            3,
            &[vec![(2, 4), (1, 1), (3, 3)]],
        ))
        .unwrap();
        let report = solve(&inst, &SolveParams::default(), None);
        assert_eq!(report.outcome.objective(), Some(8));
        let starts = &report.outcome.assignment().unwrap().starts;
        assert_eq!(starts[&OperationId::new(0, 2)], 5);
    }

    #[test]
    fn test_zero_durations() {
        let inst = Instance::new(InstanceData::from_routes(
            "zeros",
            2,
            &[vec![(1, 0), (2, 5)], vec![(2, 0), (1, 0)]],
        ))
        .unwrap();
        let report = solve(&inst, &SolveParams::default(), None);
        assert_eq!(report.outcome.objective(), Some(5));
        assert!(check_schedule(&inst, &report.outcome.assignment().unwrap().starts).is_empty());
    }

    #[test]
    fn test_zero_time_limit_reports_root_bound() {
        let inst = three_by_three();
        let params = SolveParams::default().with_time_limit(Duration::ZERO);
        let report = solve(&inst, &params, None);
        // Machine 2 carries 10 units of work starting at 0.
        assert_eq!(report.outcome, Outcome::TimedOut { best_bound: Some(10) });
        assert_eq!(
            report.stats.termination,
            Termination::Stopped(StopReason::TimeLimit)
        );
    }

    #[test]
    fn test_node_limit_with_warm_start_is_feasible() {
        let inst = three_by_three();
        let params = SolveParams::default().with_node_limit(1);
        let report = solve(&inst, &params, Some(&sequential(&inst)));
        let Outcome::Feasible { objective, best_bound, .. } = report.outcome else {
            panic!("expected feasible, got {}", report.outcome);
        };
        assert_eq!(objective, 24);
        assert!((10..=11).contains(&best_bound));
    }

    #[test]
    fn test_warm_start_rejected_when_infeasible() {
        let inst = three_by_three();
        let starts = inst.operations().iter().map(|o| (o.id, 0)).collect();
        let report = solve(&inst, &SolveParams::default(), Some(&Assignment::from_starts(starts)));
        assert_eq!(report.outcome.objective(), Some(11));
        assert!(report.outcome.is_optimal());
    }

    #[test]
    fn test_rejects_disjunctive_formulation() {
        let inst = three_by_three();
        let pairs = ConflictPairs::enumerate(&inst);
        let model = ModelBuilder::new(&inst, &pairs).build().unwrap();
        let backend = ActiveScheduleSearch::new();
        assert!(!backend.supports(FormulationKind::Disjunctive));
        assert!(backend.supports(FormulationKind::Interval));
        let err = backend
            .optimize(Formulation::Disjunctive(&model), &SolveParams::default(), None)
            .unwrap_err();
        assert_eq!(
            err,
            SolverError::UnsupportedFormulation {
                backend: "active-schedule",
                formulation: "disjunctive",
            }
        );
    }
}
