//! Search limits.
//!
//! [`SearchMonitor`] enforces the limits of a [`SolveParams`] inside a
//! backend's search loop: wall-clock time, explored nodes and external
//! cancellation. The clock is read only every `clock_check_mask + 1`
//! nodes; cancellation and the node limit are checked on every call.

use std::time::{Duration, Instant};

use super::{SolveParams, StopReason};

/// What the search loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCommand {
    /// Keep exploring.
    Continue,
    /// Stop and report the best result so far.
    Terminate(StopReason),
}

/// Tracks nodes and elapsed time against a set of limits.
#[derive(Debug, Clone)]
pub struct SearchMonitor<'a> {
    params: &'a SolveParams,
    start_time: Instant,
    nodes: u64,
    clock_check_mask: u64,
}

impl<'a> SearchMonitor<'a> {
    /// Check the clock every 1,024 nodes (2^10).
    const DEFAULT_CLOCK_CHECK_MASK: u64 = 0x3FF;

    /// Starts monitoring now.
    pub fn new(params: &'a SolveParams) -> Self {
        Self::with_clock_check_mask(params, Self::DEFAULT_CLOCK_CHECK_MASK)
    }

    /// Starts monitoring now with a custom clock mask (`2^k - 1`).
    pub fn with_clock_check_mask(params: &'a SolveParams, clock_check_mask: u64) -> Self {
        Self {
            params,
            start_time: Instant::now(),
            nodes: 0,
            clock_check_mask,
        }
    }

    /// Records one explored node.
    #[inline]
    pub fn on_node(&mut self) {
        self.nodes = self.nodes.wrapping_add(1);
    }

    /// Nodes explored so far.
    #[inline]
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    /// Time since monitoring started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Decides whether the search may continue.
    pub fn command(&self) -> SearchCommand {
        if self
            .params
            .cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return SearchCommand::Terminate(StopReason::Cancelled);
        }
        if self.params.node_limit.is_some_and(|limit| self.nodes >= limit) {
            return SearchCommand::Terminate(StopReason::NodeLimit);
        }
        if let Some(limit) = self.params.time_limit {
            if (self.nodes & self.clock_check_mask) == 0 && self.start_time.elapsed() >= limit {
                return SearchCommand::Terminate(StopReason::TimeLimit);
            }
        }
        SearchCommand::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::CancelToken;

    #[test]
    fn test_default_mask_is_power_of_two_minus_one() {
        let mask = SearchMonitor::DEFAULT_CLOCK_CHECK_MASK;
        assert_eq!(mask, 1023);
        assert_eq!((mask + 1) & mask, 0);
    }

    #[test]
    fn test_unlimited_continues() {
        let params = SolveParams::default();
        let mut monitor = SearchMonitor::new(&params);
        for _ in 0..5000 {
            monitor.on_node();
        }
        assert_eq!(monitor.command(), SearchCommand::Continue);
        assert_eq!(monitor.nodes(), 5000);
    }

    #[test]
    fn test_zero_time_limit_terminates_immediately() {
        let params = SolveParams::default().with_time_limit(Duration::ZERO);
        let monitor = SearchMonitor::new(&params);
        assert_eq!(
            monitor.command(),
            SearchCommand::Terminate(StopReason::TimeLimit)
        );
    }

    #[test]
    fn test_clock_only_read_on_mask_boundaries() {
        let params = SolveParams::default().with_time_limit(Duration::ZERO);
        let mut monitor = SearchMonitor::with_clock_check_mask(&params, 0x3);
        monitor.on_node();
        assert_eq!(monitor.command(), SearchCommand::Continue);
        for _ in 0..3 {
            monitor.on_node();
        }
        assert_eq!(
            monitor.command(),
            SearchCommand::Terminate(StopReason::TimeLimit)
        );
    }

    #[test]
    fn test_node_limit() {
        let params = SolveParams::default().with_node_limit(3);
        let mut monitor = SearchMonitor::new(&params);
        for _ in 0..2 {
            monitor.on_node();
            assert_eq!(monitor.command(), SearchCommand::Continue);
        }
        monitor.on_node();
        assert_eq!(
            monitor.command(),
            SearchCommand::Terminate(StopReason::NodeLimit)
        );
    }

    #[test]
    fn test_cancellation() {
        let token = CancelToken::new();
        let params = SolveParams::default().with_cancel(token.clone());
        let monitor = SearchMonitor::new(&params);
        assert_eq!(monitor.command(), SearchCommand::Continue);
        token.cancel();
        assert_eq!(
            monitor.command(),
            SearchCommand::Terminate(StopReason::Cancelled)
        );
    }
}
