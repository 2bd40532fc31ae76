//! Evaluation statistics.
//!
//! `EvaluationStats` records what a single evaluation did: how many checks
//! actually ran, how many were answered from the cache or deferred, and how
//! much work short-circuiting saved.

/// Counters for one or more evaluations.
///
/// All counters saturate. The struct is `Copy` so it can be returned
/// alongside a result without allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    /// Check predicates actually invoked.
    pub checks_invoked: u32,

    /// Check leaves answered from the permission cache.
    pub cache_hits: u32,

    /// Check leaves that returned `Deferred` without running.
    pub checks_deferred: u32,

    /// Right-hand operands skipped by AND/OR/any-field short-circuiting.
    pub short_circuits: u32,

    /// Expression nodes visited.
    pub nodes_visited: u32,

    /// Deepest the explicit evaluation stack grew.
    pub max_stack_depth: u32,
}

impl EvaluationStats {
    /// Create a new stats tracker initialized to zero.
    #[inline]
    pub const fn new() -> Self {
        EvaluationStats {
            checks_invoked: 0,
            cache_hits: 0,
            checks_deferred: 0,
            short_circuits: 0,
            nodes_visited: 0,
            max_stack_depth: 0,
        }
    }

    #[inline]
    pub(crate) fn inc_invoked(&mut self) {
        self.checks_invoked = self.checks_invoked.saturating_add(1);
    }

    #[inline]
    pub(crate) fn inc_cache_hits(&mut self) {
        self.cache_hits = self.cache_hits.saturating_add(1);
    }

    #[inline]
    pub(crate) fn inc_deferred(&mut self) {
        self.checks_deferred = self.checks_deferred.saturating_add(1);
    }

    #[inline]
    pub(crate) fn inc_short_circuits(&mut self) {
        self.short_circuits = self.short_circuits.saturating_add(1);
    }

    #[inline]
    pub(crate) fn inc_nodes(&mut self) {
        self.nodes_visited = self.nodes_visited.saturating_add(1);
    }

    /// Update the max stack depth if `depth` is higher.
    #[inline]
    pub(crate) fn update_depth(&mut self, depth: usize) {
        let depth = u32::try_from(depth).unwrap_or(u32::MAX);
        if depth > self.max_stack_depth {
            self.max_stack_depth = depth;
        }
    }

    /// Fold another evaluation's counters into this one.
    pub fn merge(&mut self, other: &EvaluationStats) {
        self.checks_invoked = self.checks_invoked.saturating_add(other.checks_invoked);
        self.cache_hits = self.cache_hits.saturating_add(other.cache_hits);
        self.checks_deferred = self.checks_deferred.saturating_add(other.checks_deferred);
        self.short_circuits = self.short_circuits.saturating_add(other.short_circuits);
        self.nodes_visited = self.nodes_visited.saturating_add(other.nodes_visited);
        self.max_stack_depth = self.max_stack_depth.max(other.max_stack_depth);
    }
}
