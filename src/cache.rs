//! Per-request memoization of check results.

use std::collections::HashMap;

use crate::check::InstanceId;
use crate::result::ExpressionResult;

/// Results of check instances already invoked in this request.
///
/// Only final results are stored; a check that deferred has not run.
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    results: HashMap<InstanceId, ExpressionResult>,
}

impl PermissionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        PermissionCache::default()
    }

    /// Cached result for an instance, if it has run.
    #[inline]
    pub fn get(&self, instance: InstanceId) -> Option<ExpressionResult> {
        self.results.get(&instance).copied()
    }

    /// Record a result. The first recorded value wins.
    pub fn insert(&mut self, instance: InstanceId, result: ExpressionResult) -> ExpressionResult {
        debug_assert!(!result.is_deferred());
        *self.results.entry(instance).or_insert(result)
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Forget every result.
    pub fn clear(&mut self) {
        self.results.clear();
    }
}
