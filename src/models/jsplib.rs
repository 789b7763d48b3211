//! JSPLIB / ORLIB text format.
//!
//! ```text
//! # comment lines and blank lines are ignored
//! n m
//! <n lines of 2*m integers: machine time machine time ...>
//! ```
//!
//! Machine ids may be 0-based (`0..m-1`) or 1-based (`1..m`); the
//! convention is detected from the observed range.

use std::fmt::Write as _;

use super::{Instance, InstanceData};
use crate::error::MalformedInstanceError;
use crate::validation::{InstanceIssue, InstanceIssueKind};

/// Job rows reserved up front; larger headers grow as lines are read.
const MAX_PREALLOCATED_JOBS: usize = 1024;

fn syntax(message: impl Into<String>) -> MalformedInstanceError {
    MalformedInstanceError::new(vec![InstanceIssue::new(InstanceIssueKind::Syntax, message)])
}

fn parse_ints(line: &str, line_no: usize) -> Result<Vec<i64>, MalformedInstanceError> {
    line.split_whitespace()
        .map(|t| {
            t.parse::<i64>()
                .map_err(|_| syntax(format!("line {line_no}: '{t}' is not an integer")))
        })
        .collect()
}

impl Instance {
    /// Parses an instance in JSPLIB text format.
    ///
    /// Lines after the `n` job lines are ignored.
    ///
    /// # Errors
    /// [`MalformedInstanceError`] with a `Syntax` issue when the text cannot be
    /// read, or the usual validation issues when the data is not a job shop.
    ///
    /// # Example
    /// ```
    /// use u_jobshop::models::Instance;
    ///
    /// let text = "# tiny\n2 2\n0 3 1 2\n1 4 0 1\n";
    /// let inst = Instance::from_jsplib("tiny", text).unwrap();
    /// assert_eq!(inst.n_jobs(), 2);
    /// assert_eq!(inst.horizon(), 10);
    /// ```
    pub fn from_jsplib(name: impl Into<String>, text: &str) -> Result<Self, MalformedInstanceError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        let (header_no, header) = lines
            .next()
            .ok_or_else(|| syntax("no data after removing comments"))?;
        let dims = parse_ints(header, header_no)?;
        let (n_jobs, n_machines) = match dims[..] {
            [n, m] if n > 0 && m > 0 => (n as usize, m as usize),
            _ => {
                return Err(syntax(format!(
                    "line {header_no}: expected positive 'n_jobs n_machines', got '{header}'"
                )))
            }
        };

        let mut rows = Vec::with_capacity(n_jobs.min(MAX_PREALLOCATED_JOBS));
        for job in 0..n_jobs {
            let (line_no, line) = lines.next().ok_or_else(|| {
                syntax(format!("expected {n_jobs} job lines, got {job}"))
            })?;
            let tokens = parse_ints(line, line_no)?;
            if tokens.len() % 2 != 0 || tokens.len() / 2 != n_machines {
                return Err(syntax(format!(
                    "line {line_no}: job {} has {} integers, expected {}",
                    job + 1,
                    tokens.len(),
                    n_machines.saturating_mul(2)
                )));
            }
            rows.push(tokens);
        }

        let ids = rows.iter().flat_map(|r| r.iter().step_by(2).copied());
        let (min_id, max_id) = ids.fold((i64::MAX, i64::MIN), |(lo, hi), m| (lo.min(m), hi.max(m)));
        let m = n_machines as i64;
        let offset = if min_id == 0 && max_id == m - 1 {
            1
        } else if min_id == 1 && max_id == m {
            0
        } else {
            return Err(syntax(format!(
                "cannot detect machine indexing: ids lie in [{min_id}, {max_id}], \
                 expected [0, {}] or [1, {m}]",
                m - 1
            )));
        };

        let data = InstanceData {
            name: name.into(),
            n_jobs,
            n_machines,
            machine: rows
                .iter()
                .map(|r| r.iter().step_by(2).map(|&id| (id + offset) as u32).collect())
                .collect(),
            duration: rows
                .iter()
                .map(|r| r.iter().skip(1).step_by(2).copied().collect())
                .collect(),
        };
        Instance::new(data)
    }

    /// Writes the instance in JSPLIB text format with 0-based machine ids.
    pub fn to_jsplib(&self) -> String {
        let mut out = String::new();
        if !self.name().is_empty() {
            let _ = writeln!(out, "# {}", self.name());
        }
        let _ = writeln!(out, "{} {}", self.n_jobs(), self.n_machines());
        for job in 0..self.n_jobs() {
            let row: Vec<String> = self
                .job_operations(job)
                .iter()
                .map(|o| format!("{} {}", o.machine.0, o.duration))
                .collect();
            let _ = writeln!(out, "{}", row.join(" "));
        }
        out
    }
}
