//! Engine limits.

use serde::{Deserialize, Serialize};

/// Default maximum depth of a built expression tree.
pub const DEFAULT_MAX_EXPRESSION_DEPTH: usize = 1024;

/// Default maximum number of queued commit expressions per request.
pub const DEFAULT_MAX_COMMIT_QUEUE: usize = 65_536;

/// Bounds enforced by the builder and executor.
///
/// Any-field expressions grow with the number of fields of a type and the
/// commit queue grows with the number of mutated resources, so both are
/// capped rather than left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionConfig {
    /// Deepest expression tree the builder accepts.
    pub max_expression_depth: usize,
    /// Most commit expressions the executor will queue.
    pub max_commit_queue: usize,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        PermissionConfig {
            max_expression_depth: DEFAULT_MAX_EXPRESSION_DEPTH,
            max_commit_queue: DEFAULT_MAX_COMMIT_QUEUE,
        }
    }
}

impl PermissionConfig {
    /// Parse a configuration from YAML. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
