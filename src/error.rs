//! Error types for permission evaluation.
//!
//! Two kinds matter to callers: [`PermissionError::Forbidden`] is the
//! access-denied outcome, everything reported by
//! [`PermissionError::is_configuration`] is a static defect in the declared
//! checks. Neither is retryable.

use std::fmt;

use thiserror::Error;

use crate::check::CheckId;
use crate::types::PermissionKind;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PermissionError>;

/// Denial raised when an expression evaluates to `Fail` with no further
/// deferral possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenAccess {
    /// Resource type the authorization point belongs to.
    pub resource_type: String,
    /// Resource id, when assigned.
    pub id: Option<String>,
    /// Operation being authorized.
    pub kind: PermissionKind,
    /// Last check that evaluated to `Fail`, for diagnostics.
    pub check: Option<CheckId>,
}

impl fmt::Display for ForbiddenAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forbidden: {} on {}", self.kind, self.resource_type)?;
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        if let Some(check) = &self.check {
            write!(f, " (failed check '{check}')")?;
        }
        Ok(())
    }
}

/// Errors raised by the builder and executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// The request is not allowed.
    #[error("{0}")]
    Forbidden(ForbiddenAccess),

    /// A declaration lists neither ANY nor ALL checks.
    #[error("unknown permission '{kind}' on '{resource_type}'{}", field_suffix(.field))]
    UnknownPermission {
        /// Resource type carrying the declaration.
        resource_type: String,
        /// Permission kind of the declaration.
        kind: PermissionKind,
        /// Field carrying the declaration, for field-level declarations.
        field: Option<String>,
    },

    /// The factory has no constructor for a declared check.
    #[error("could not instantiate check '{check}'")]
    CheckNotInstantiable {
        /// The declared check identifier.
        check: CheckId,
    },

    /// A check declares neither the operation nor the commit capability.
    #[error("check '{check}' is neither operation- nor commit-capable")]
    InvalidCheckKind {
        /// The offending check identifier.
        check: CheckId,
    },

    /// A built expression is deeper than the configured limit.
    #[error("expression depth {actual} exceeds maximum {max}")]
    ExpressionTooDeep {
        /// Configured maximum.
        max: usize,
        /// Depth of the built expression.
        actual: usize,
    },

    /// The commit check queue reached its configured capacity.
    #[error("commit check queue is full ({max} entries)")]
    CommitQueueFull {
        /// Configured maximum.
        max: usize,
    },

    /// The resource object was mutably borrowed while a check needed it.
    #[error("object of '{resource_type}' is already mutably borrowed")]
    ObjectBorrowed {
        /// Resource type whose object could not be borrowed.
        resource_type: String,
    },

    /// A deferred result reached a point where no deferral is possible.
    #[error("expression still deferred at a final decision point")]
    UnresolvedDeferral,

    /// Internal evaluator invariant violated.
    #[error("internal evaluation error")]
    Internal,
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" field '{f}'"))
        .unwrap_or_default()
}

impl PermissionError {
    /// Returns `true` for the access-denied outcome.
    #[inline]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, PermissionError::Forbidden(_))
    }

    /// Returns `true` for errors caused by malformed declarations.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PermissionError::UnknownPermission { .. }
                | PermissionError::CheckNotInstantiable { .. }
                | PermissionError::InvalidCheckKind { .. }
                | PermissionError::ExpressionTooDeep { .. }
        )
    }

    /// The denial details, if this is `Forbidden`.
    pub fn forbidden(&self) -> Option<&ForbiddenAccess> {
        match self {
            PermissionError::Forbidden(access) => Some(access),
            _ => None,
        }
    }
}

impl From<ForbiddenAccess> for PermissionError {
    fn from(access: ForbiddenAccess) -> Self {
        PermissionError::Forbidden(access)
    }
}
