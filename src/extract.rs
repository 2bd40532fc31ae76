//! Check-set extraction.
//!
//! Turns raw declarations from the dictionary into [`CheckGroup`]s with an
//! ANY/ALL mode, and instantiated groups into [`CheckSubset`]s that can be
//! split by capability.
//!
//! The capability split is diagnostic: the builder logs it at trace level.
//! Trees are always built from the full subset, and commit-only checks are
//! kept out of the operation phase by the `DeferredCheck` leaf instead.

use serde::{Deserialize, Serialize};

use crate::check::{CheckFactory, CheckId, CheckInstance};
use crate::dictionary::EntityDictionary;
use crate::error::PermissionError;
use crate::types::PermissionKind;

/// How the checks of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckMode {
    /// Any check passing grants access (OR).
    Any,
    /// Every check must pass (AND).
    #[default]
    All,
}

/// A permission declaration as written in entity metadata.
///
/// Exactly one of the lists is used: `any` when non-empty, otherwise `all`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionDeclaration {
    /// Checks combined with OR.
    #[serde(default)]
    pub any: Vec<CheckId>,
    /// Checks combined with AND.
    #[serde(default)]
    pub all: Vec<CheckId>,
}

impl PermissionDeclaration {
    /// Declaration granting access when any listed check passes.
    pub fn any<I, S>(checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CheckId>,
    {
        PermissionDeclaration {
            any: checks.into_iter().map(Into::into).collect(),
            all: Vec::new(),
        }
    }

    /// Declaration granting access when every listed check passes.
    pub fn all<I, S>(checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CheckId>,
    {
        PermissionDeclaration {
            any: Vec::new(),
            all: checks.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve to a group, or `None` when no check is listed at all.
    pub fn to_group(&self) -> Option<CheckGroup> {
        if !self.any.is_empty() {
            Some(CheckGroup::new(self.any.clone(), CheckMode::Any))
        } else if !self.all.is_empty() {
            Some(CheckGroup::new(self.all.clone(), CheckMode::All))
        } else {
            None
        }
    }
}

/// An ordered list of declared checks with a combination mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckGroup {
    checks: Vec<CheckId>,
    mode: CheckMode,
}

impl CheckGroup {
    /// Create a group.
    pub fn new(checks: Vec<CheckId>, mode: CheckMode) -> Self {
        CheckGroup { checks, mode }
    }

    /// Declared checks, in order.
    #[inline]
    pub fn checks(&self) -> &[CheckId] {
        &self.checks
    }

    /// Combination mode.
    #[inline]
    pub fn mode(&self) -> CheckMode {
        self.mode
    }
}

/// Entity- and field-level groups for one authorization point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedChecks {
    entity: Option<CheckGroup>,
    field: Option<CheckGroup>,
}

impl ExtractedChecks {
    /// Read the declarations for `resource_type` (and `field`, if given).
    ///
    /// A declaration that exists but lists no checks is a configuration error.
    pub fn extract(
        dictionary: &dyn EntityDictionary,
        resource_type: &str,
        kind: PermissionKind,
        field: Option<&str>,
    ) -> Result<Self, PermissionError> {
        let entity = dictionary
            .entity_permission(resource_type, kind)
            .map(|decl| resolve(decl, resource_type, kind, None))
            .transpose()?;
        let field = match field {
            Some(name) => dictionary
                .field_permission(resource_type, kind, name)
                .map(|decl| resolve(decl, resource_type, kind, Some(name)))
                .transpose()?,
            None => None,
        };
        Ok(ExtractedChecks { entity, field })
    }

    /// Build from already-resolved groups.
    pub fn from_groups(entity: Option<CheckGroup>, field: Option<CheckGroup>) -> Self {
        ExtractedChecks { entity, field }
    }

    /// Entity-level group, if declared.
    #[inline]
    pub fn entity(&self) -> Option<&CheckGroup> {
        self.entity.as_ref()
    }

    /// Field-level group, if declared.
    #[inline]
    pub fn field(&self) -> Option<&CheckGroup> {
        self.field.as_ref()
    }
}

fn resolve(
    decl: &PermissionDeclaration,
    resource_type: &str,
    kind: PermissionKind,
    field: Option<&str>,
) -> Result<CheckGroup, PermissionError> {
    decl.to_group().ok_or_else(|| {
        tracing::warn!(resource_type, %kind, field, "unknown permission declaration");
        PermissionError::UnknownPermission {
            resource_type: resource_type.to_owned(),
            kind,
            field: field.map(str::to_owned),
        }
    })
}

/// An instantiated group of checks.
#[derive(Debug)]
pub struct CheckSubset<T> {
    checks: Vec<CheckInstance<T>>,
    mode: CheckMode,
}

impl<T> CheckSubset<T> {
    /// Instantiate every check of `group`. An absent group yields an empty
    /// ALL subset.
    pub fn instantiate(
        group: Option<&CheckGroup>,
        factory: &dyn CheckFactory<T>,
    ) -> Result<Self, PermissionError> {
        let Some(group) = group else {
            return Ok(CheckSubset {
                checks: Vec::new(),
                mode: CheckMode::All,
            });
        };
        let checks = group
            .checks()
            .iter()
            .map(|id| factory.instantiate(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CheckSubset {
            checks,
            mode: group.mode(),
        })
    }

    /// Instantiated checks, in declaration order.
    #[inline]
    pub fn checks(&self) -> &[CheckInstance<T>] {
        &self.checks
    }

    /// Combination mode.
    #[inline]
    pub fn mode(&self) -> CheckMode {
        self.mode
    }

    /// Returns `true` if nothing is declared.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Operation-capable checks, keeping the mode.
    pub fn operation_checks(&self) -> CheckSubset<T> {
        self.filtered(|c| c.kind().is_operation())
    }

    /// Commit-capable checks, keeping the mode.
    pub fn commit_checks(&self) -> CheckSubset<T> {
        self.filtered(|c| c.kind().is_commit())
    }

    fn filtered(&self, keep: impl Fn(&CheckInstance<T>) -> bool) -> CheckSubset<T> {
        CheckSubset {
            checks: self.checks.iter().filter(|c| keep(c)).cloned().collect(),
            mode: self.mode,
        }
    }
}
