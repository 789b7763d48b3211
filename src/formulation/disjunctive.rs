//! Disjunctive (Big-M) MILP formulation.
//!
//! # Model
//!
//! ```text
//! minimize   Cmax
//! s.t.       s[j,k+1] - s[j,k]              >= d[j,k]           (precedence)
//!            s1 - s2 + M1*y                 <= M1 - d1          (disjunctive a)
//!            s2 - s1 - M2*y                 <= -d2              (disjunctive b)
//!            Cmax - s[j,k]                  >= d[j,k]           (makespan)
//!            s, Cmax in [0, H],  y in {0, 1}
//! ```
//!
//! `y = 1` means the pair's first operation runs before the second:
//! (a) then reads `s1 + d1 <= s2` and (b) is slack; `y = 0` swaps the roles.
//! `H` is the sum of all durations, an upper bound on any optimal makespan.
//!
//! # Reference
//! Manne (1960), "On the Job-Shop Scheduling Problem", Operations Research 8(2)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

use super::ModelSize;
use crate::conflict::{ConflictPair, ConflictPairId, ConflictPairs};
use crate::error::BuildError;
use crate::models::{Instance, OperationId};

/// Index of a variable in [`Model::variables`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub usize);

/// Variable domain type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// General integer.
    Integer,
    /// 0/1.
    Binary,
}

/// What a variable stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarRole {
    /// Start time of an operation.
    Start(OperationId),
    /// The makespan.
    Makespan,
    /// Sequencing decision of a conflict pair.
    Sequence(ConflictPairId),
}

/// A decision variable with bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Name, unique within the model.
    pub name: String,
    /// Domain type.
    pub kind: VarKind,
    /// Role in the job-shop model.
    pub role: VarRole,
    /// Lower bound.
    pub lower: i64,
    /// Upper bound.
    pub upper: i64,
}

/// Direction of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    /// `lhs <= rhs`
    Le,
    /// `lhs >= rhs`
    Ge,
}

/// Family of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Consecutive operations of a job.
    Precedence,
    /// One half of a machine disjunction.
    Disjunctive,
    /// `Cmax` dominates an operation's end.
    Makespan,
}

/// `Σ coef · var (sense) rhs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearConstraint {
    /// Name, unique within the model.
    pub name: String,
    /// Constraint family.
    pub kind: ConstraintKind,
    /// `(variable, coefficient)` terms.
    pub terms: Vec<(VarId, i64)>,
    /// Direction.
    pub sense: Sense,
    /// Right-hand side.
    pub rhs: i64,
}

impl LinearConstraint {
    /// Left-hand side under `values` (indexed by [`VarId`]).
    ///
    /// `None` if a term refers to a variable without a value.
    pub fn lhs(&self, values: &[i64]) -> Option<i128> {
        self.terms.iter().try_fold(0i128, |acc, &(v, c)| {
            values.get(v.0).map(|&x| acc + c as i128 * x as i128)
        })
    }

    /// Whether `values` satisfy the constraint.
    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        match (self.lhs(values), self.sense) {
            (Some(lhs), Sense::Le) => lhs <= self.rhs as i128,
            (Some(lhs), Sense::Ge) => lhs >= self.rhs as i128,
            (None, _) => false,
        }
    }
}

impl fmt::Display for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        for (i, (v, c)) in self.terms.iter().enumerate() {
            let sign = match (i, *c < 0) {
                (0, true) => "-",
                (0, false) => "",
                (_, true) => " - ",
                (_, false) => " + ",
            };
            write!(f, "{sign}{}*x{}", c.abs(), v.0)?;
        }
        let op = match self.sense {
            Sense::Le => "<=",
            Sense::Ge => ">=",
        };
        write!(f, " {op} {}", self.rhs)
    }
}

/// Big-M selection for the disjunctive rows.
///
/// Both choices are valid because `Cmax <= H` holds in every feasible
/// solution of the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BigMPolicy {
    /// `M = H` (sum of all durations) for every pair.
    #[default]
    Horizon,
    /// Pair-specific `M1 = H - tail(op1) - head(op2)` and
    /// `M2 = H - tail(op2) - head(op1)`. Tighter linear relaxation.
    HeadTail,
}

/// Binary sequencing variable of one conflict pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDecision {
    /// The pair being ordered.
    pub pair: ConflictPair,
    /// Its binary variable; `1` puts `pair.first` first.
    pub var: VarId,
    /// Big-M of row (a), active when `pair.second` goes first.
    pub m_first: i64,
    /// Big-M of row (b), active when `pair.first` goes first.
    pub m_second: i64,
}

/// A built disjunctive MILP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    name: String,
    horizon: i64,
    big_m: BigMPolicy,
    variables: Vec<Variable>,
    constraints: Vec<LinearConstraint>,
    starts: BTreeMap<OperationId, VarId>,
    durations: BTreeMap<OperationId, i64>,
    makespan: VarId,
    decisions: BTreeMap<ConflictPairId, SequenceDecision>,
}

impl Model {
    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Horizon `H` used for the variable domains.
    pub fn horizon(&self) -> i64 {
        self.horizon
    }

    /// Big-M policy the model was built with.
    pub fn big_m(&self) -> BigMPolicy {
        self.big_m
    }

    /// All variables; starts first (job-major), then `Cmax`, then binaries.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Variable by id.
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    /// All constraints in emission order.
    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// Start variables keyed by operation.
    pub fn start_vars(&self) -> &BTreeMap<OperationId, VarId> {
        &self.starts
    }

    /// Start variable of `op`.
    pub fn start_var(&self, op: OperationId) -> Option<VarId> {
        self.starts.get(&op).copied()
    }

    /// Processing time of `op`.
    pub fn duration(&self, op: OperationId) -> Option<i64> {
        self.durations.get(&op).copied()
    }

    /// The objective variable (`Cmax`, minimized).
    pub fn makespan_var(&self) -> VarId {
        self.makespan
    }

    /// Sequencing decisions keyed by conflict pair.
    pub fn decisions(&self) -> &BTreeMap<ConflictPairId, SequenceDecision> {
        &self.decisions
    }

    /// Model size KPI.
    pub fn size(&self) -> ModelSize {
        let binaries = self
            .variables
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .count();
        ModelSize {
            variables: self.variables.len(),
            integer_variables: self.variables.len() - binaries,
            binaries,
            constraints: self.constraints.len(),
            conflict_pairs: self.decisions.len(),
        }
    }

    /// Whether `values` respect every bound and every constraint.
    pub fn is_feasible(&self, values: &[i64]) -> bool {
        values.len() == self.variables.len()
            && self
                .variables
                .iter()
                .zip(values)
                .all(|(v, &x)| v.lower <= x && x <= v.upper)
            && self.constraints.iter().all(|c| c.is_satisfied(values))
    }

    /// Constraints violated by `values`.
    pub fn violated(&self, values: &[i64]) -> Vec<&LinearConstraint> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(values))
            .collect()
    }

    /// Completes start times into a full variable vector.
    ///
    /// Each binary follows the order of the two starts and `Cmax` is the
    /// latest end. Returns `None` if an operation has no start. The result
    /// still has to pass [`Model::is_feasible`].
    pub fn complete_from_starts(&self, starts: &BTreeMap<OperationId, i64>) -> Option<Vec<i64>> {
        let mut values = vec![0i64; self.variables.len()];
        let mut cmax = 0i64;
        for (op, var) in &self.starts {
            let s = *starts.get(op)?;
            values[var.0] = s;
            cmax = cmax.max(s + self.durations.get(op).copied().unwrap_or(0));
        }
        values[self.makespan.0] = cmax;
        for d in self.decisions.values() {
            let s1 = values[self.starts.get(&d.pair.first)?.0];
            let s2 = values[self.starts.get(&d.pair.second)?.0];
            let d1 = self.durations.get(&d.pair.first).copied().unwrap_or(0);
            values[d.var.0] = i64::from(s1 + d1 <= s2);
        }
        Some(values)
    }

    /// Start times read from a full variable vector.
    pub fn starts_from_values(&self, values: &[i64]) -> BTreeMap<OperationId, i64> {
        self.starts
            .iter()
            .filter_map(|(&op, v)| values.get(v.0).map(|&x| (op, x)))
            .collect()
    }

    /// Sequencing decisions read from a full variable vector.
    pub fn sequencing_from_values(&self, values: &[i64]) -> BTreeMap<ConflictPairId, bool> {
        self.decisions
            .iter()
            .filter_map(|(&id, d)| values.get(d.var.0).map(|&x| (id, x == 1)))
            .collect()
    }
}

/// Builds a disjunctive [`Model`] from an instance and its conflict pairs.
///
/// # Example
/// ```
/// use u_jobshop::conflict::ConflictPairs;
/// use u_jobshop::formulation::ModelBuilder;
/// use u_jobshop::models::{Instance, InstanceData};
///
/// let inst = Instance::new(InstanceData::from_routes(
///     "2x2",
///     2,
///     &[vec![(1, 3), (2, 2)], vec![(2, 4), (1, 1)]],
/// ))
/// .unwrap();
/// let pairs = ConflictPairs::enumerate(&inst);
/// let model = ModelBuilder::new(&inst, &pairs).build().unwrap();
/// assert_eq!(model.size().binaries, 2);
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder<'a> {
    instance: &'a Instance,
    pairs: &'a ConflictPairs,
    big_m: BigMPolicy,
}

impl<'a> ModelBuilder<'a> {
    /// Creates a builder with the default [`BigMPolicy::Horizon`].
    pub fn new(instance: &'a Instance, pairs: &'a ConflictPairs) -> Self {
        Self {
            instance,
            pairs,
            big_m: BigMPolicy::default(),
        }
    }

    /// Sets the Big-M policy.
    pub fn with_big_m(mut self, policy: BigMPolicy) -> Self {
        self.big_m = policy;
        self
    }

    /// Builds the model.
    ///
    /// Emits, in order: start variables (job-major), `Cmax`, one binary per
    /// pair; then precedence rows, two disjunctive rows per pair, makespan
    /// rows.
    ///
    /// # Errors
    /// [`BuildError`] if a pair is outside the instance, couples an
    /// operation with itself, is not canonical, names the wrong machine or
    /// is repeated.
    pub fn build(&self) -> Result<Model, BuildError> {
        self.check_pairs()?;

        let inst = self.instance;
        let horizon = inst.horizon();
        let mut variables = Vec::with_capacity(inst.operation_count() + 1 + self.pairs.len());
        let mut starts = BTreeMap::new();
        let mut durations = BTreeMap::new();

        for op in inst.operations() {
            starts.insert(op.id, VarId(variables.len()));
            durations.insert(op.id, op.duration);
            variables.push(Variable {
                name: format!("s_{}_{}", op.id.job + 1, op.id.index + 1),
                kind: VarKind::Integer,
                role: VarRole::Start(op.id),
                lower: 0,
                upper: horizon,
            });
        }

        let makespan = VarId(variables.len());
        variables.push(Variable {
            name: "Cmax".to_string(),
            kind: VarKind::Integer,
            role: VarRole::Makespan,
            lower: 0,
            upper: horizon,
        });

        let mut decisions = BTreeMap::new();
        for (id, pair) in self.pairs.iter() {
            let (m_first, m_second) = self.big_m_of(pair);
            let var = VarId(variables.len());
            variables.push(Variable {
                name: format!(
                    "y_{}_{}_{}_{}",
                    pair.first.job + 1,
                    pair.first.index + 1,
                    pair.second.job + 1,
                    pair.second.index + 1
                ),
                kind: VarKind::Binary,
                role: VarRole::Sequence(id),
                lower: 0,
                upper: 1,
            });
            decisions.insert(
                id,
                SequenceDecision {
                    pair: *pair,
                    var,
                    m_first,
                    m_second,
                },
            );
        }

        let mut constraints = Vec::new();

        for job in 0..inst.n_jobs() {
            for w in inst.job_operations(job).windows(2) {
                let (cur, next) = (&w[0], &w[1]);
                constraints.push(LinearConstraint {
                    name: format!("prec_{}_{}", job + 1, cur.id.index + 1),
                    kind: ConstraintKind::Precedence,
                    terms: vec![(starts[&next.id], 1), (starts[&cur.id], -1)],
                    sense: Sense::Ge,
                    rhs: cur.duration,
                });
            }
        }

        for (id, d) in &decisions {
            let (s1, s2) = (starts[&d.pair.first], starts[&d.pair.second]);
            let (d1, d2) = (durations[&d.pair.first], durations[&d.pair.second]);
            constraints.push(LinearConstraint {
                name: format!("disj_a_{}", id.0),
                kind: ConstraintKind::Disjunctive,
                terms: vec![(s1, 1), (s2, -1), (d.var, d.m_first)],
                sense: Sense::Le,
                rhs: d.m_first - d1,
            });
            constraints.push(LinearConstraint {
                name: format!("disj_b_{}", id.0),
                kind: ConstraintKind::Disjunctive,
                terms: vec![(s2, 1), (s1, -1), (d.var, -d.m_second)],
                sense: Sense::Le,
                rhs: -d2,
            });
        }

        for op in inst.operations() {
            constraints.push(LinearConstraint {
                name: format!("cmax_{}_{}", op.id.job + 1, op.id.index + 1),
                kind: ConstraintKind::Makespan,
                terms: vec![(makespan, 1), (starts[&op.id], -1)],
                sense: Sense::Ge,
                rhs: op.duration,
            });
        }

        let model = Model {
            name: inst.name().to_string(),
            horizon,
            big_m: self.big_m,
            variables,
            constraints,
            starts,
            durations,
            makespan,
            decisions,
        };
        let size = model.size();
        debug!(
            instance = inst.name(),
            variables = size.variables,
            binaries = size.binaries,
            constraints = size.constraints,
            big_m = ?self.big_m,
            "built disjunctive model"
        );
        Ok(model)
    }

    fn big_m_of(&self, pair: &ConflictPair) -> (i64, i64) {
        let h = self.instance.horizon();
        match self.big_m {
            BigMPolicy::Horizon => (h, h),
            BigMPolicy::HeadTail => {
                let inst = self.instance;
                (
                    h - inst.tail(pair.first) - inst.head(pair.second),
                    h - inst.tail(pair.second) - inst.head(pair.first),
                )
            }
        }
    }

    fn check_pairs(&self) -> Result<(), BuildError> {
        let mut seen = HashSet::with_capacity(self.pairs.len());
        for &pair in self.pairs.as_slice() {
            for operation in [pair.first, pair.second] {
                if !self.instance.contains(operation) {
                    return Err(BuildError::OperationOutOfBounds { pair, operation });
                }
            }
            if pair.first == pair.second {
                return Err(BuildError::SelfPair(pair));
            }
            if !pair.is_canonical() {
                return Err(BuildError::NonCanonicalPair(pair));
            }
            if self.instance.machine(pair.first) != Some(pair.machine)
                || self.instance.machine(pair.second) != Some(pair.machine)
            {
                return Err(BuildError::MachineMismatch(pair));
            }
            if !seen.insert((pair.first, pair.second)) {
                return Err(BuildError::DuplicatePair(pair));
            }
        }
        Ok(())
    }
}
