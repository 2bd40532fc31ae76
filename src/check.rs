//! Checks and their instantiation.
//!
//! A [`Check`] is a predicate over a resource object, the request scope and
//! an optional change description. Its [`CheckKind`] says whether it can run
//! before every mutation is staged (operation-capable), whether it needs the
//! final state (commit-capable), or both.
//!
//! Checks are declared by [`CheckId`] and instantiated fresh for every
//! authorization point through a [`CheckFactory`]. Each instantiation gets a
//! process-unique [`InstanceId`], which is the permission cache key.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::PermissionError;
use crate::types::{ChangeSpec, RequestScope};

/// Capability tags of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckKind {
    operation: bool,
    commit: bool,
}

impl CheckKind {
    /// Safe to run before all mutations are staged.
    pub const OPERATION: CheckKind = CheckKind::new(true, false);
    /// Must see the final, fully staged state.
    pub const COMMIT: CheckKind = CheckKind::new(false, true);
    /// Runs in either phase.
    pub const BOTH: CheckKind = CheckKind::new(true, true);

    /// Build a kind from explicit tags.
    #[inline]
    pub const fn new(operation: bool, commit: bool) -> Self {
        CheckKind { operation, commit }
    }

    /// Returns `true` if the check may run in the operation phase.
    #[inline]
    pub const fn is_operation(&self) -> bool {
        self.operation
    }

    /// Returns `true` if the check may run in the commit phase.
    #[inline]
    pub const fn is_commit(&self) -> bool {
        self.commit
    }

    /// Commit-capable and not operation-capable: must wait for commit.
    #[inline]
    pub const fn is_commit_only(&self) -> bool {
        self.commit && !self.operation
    }

    /// A kind with neither tag cannot be scheduled.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.operation || self.commit
    }
}

/// Declared identifier of a check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    /// Create a check identifier.
    pub fn new(id: impl Into<String>) -> Self {
        CheckId(id.into())
    }

    /// The identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckId {
    fn from(id: &str) -> Self {
        CheckId::new(id)
    }
}

impl Borrow<str> for CheckId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A predicate deciding whether an operation on a resource is allowed.
///
/// Implementations must be deterministic for a given object, scope and
/// change within one request: results are cached per instance.
pub trait Check<T> {
    /// Evaluate the check.
    fn ok(&self, object: &T, scope: &RequestScope, change: Option<&ChangeSpec>) -> bool;

    /// Capability tags of this check.
    fn kind(&self) -> CheckKind;
}

/// Identity of one instantiated check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        InstanceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the id.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

/// An instantiated check, shared by the operation and commit trees of one
/// authorization point.
pub struct CheckInstance<T> {
    instance: InstanceId,
    id: CheckId,
    kind: CheckKind,
    check: Rc<dyn Check<T>>,
}

impl<T> CheckInstance<T> {
    /// Wrap a freshly constructed check, validating its capability tags.
    pub fn new(id: CheckId, check: Box<dyn Check<T>>) -> Result<Self, PermissionError> {
        let kind = check.kind();
        if !kind.is_valid() {
            tracing::warn!(check = %id, "check declares no capability");
            return Err(PermissionError::InvalidCheckKind { check: id });
        }
        Ok(CheckInstance {
            instance: InstanceId::next(),
            id,
            kind,
            check: Rc::from(check),
        })
    }

    /// Cache key of this instance.
    #[inline]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Declared identifier.
    #[inline]
    pub fn id(&self) -> &CheckId {
        &self.id
    }

    /// Capability tags, captured at instantiation.
    #[inline]
    pub fn kind(&self) -> CheckKind {
        self.kind
    }

    /// Invoke the underlying predicate.
    pub fn ok(&self, object: &T, scope: &RequestScope, change: Option<&ChangeSpec>) -> bool {
        self.check.ok(object, scope, change)
    }
}

impl<T> Clone for CheckInstance<T> {
    fn clone(&self) -> Self {
        CheckInstance {
            instance: self.instance,
            id: self.id.clone(),
            kind: self.kind,
            check: Rc::clone(&self.check),
        }
    }
}

impl<T> fmt::Debug for CheckInstance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckInstance")
            .field("id", &self.id)
            .field("instance", &self.instance.0)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Produces fresh check instances from declared identifiers.
pub trait CheckFactory<T> {
    /// Construct a new, unshared instance of the identified check.
    ///
    /// Fails with [`PermissionError::CheckNotInstantiable`] when the
    /// identifier is unknown.
    fn instantiate(&self, id: &CheckId) -> Result<CheckInstance<T>, PermissionError>;
}

type Constructor<T> = Box<dyn Fn() -> Box<dyn Check<T>> + Send + Sync>;

/// A [`CheckFactory`] backed by registered constructors.
pub struct CheckRegistry<T> {
    constructors: HashMap<CheckId, Constructor<T>>,
}

impl<T> CheckRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        CheckRegistry {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor, replacing any previous one for `id`.
    pub fn register<F>(&mut self, id: impl Into<CheckId>, constructor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Check<T>> + Send + Sync + 'static,
    {
        self.constructors.insert(id.into(), Box::new(constructor));
        self
    }

    /// Builder-style variant of [`CheckRegistry::register`].
    pub fn with<F>(mut self, id: impl Into<CheckId>, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Check<T>> + Send + Sync + 'static,
    {
        self.register(id, constructor);
        self
    }

    /// Returns `true` if `id` has a constructor.
    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl<T> Default for CheckRegistry<T> {
    fn default() -> Self {
        CheckRegistry::new()
    }
}

impl<T> CheckFactory<T> for CheckRegistry<T> {
    fn instantiate(&self, id: &CheckId) -> Result<CheckInstance<T>, PermissionError> {
        let constructor = self.constructors.get(id).ok_or_else(|| {
            tracing::warn!(check = %id, "no constructor registered for check");
            PermissionError::CheckNotInstantiable { check: id.clone() }
        })?;
        CheckInstance::new(id.clone(), constructor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(bool, CheckKind);

    impl Check<()> for Always {
        fn ok(&self, _: &(), _: &RequestScope, _: Option<&ChangeSpec>) -> bool {
            self.0
        }

        fn kind(&self) -> CheckKind {
            self.1
        }
    }

    #[test]
    fn test_check_kind() {
        assert!(CheckKind::COMMIT.is_commit_only());
        assert!(!CheckKind::BOTH.is_commit_only());
        assert!(!CheckKind::OPERATION.is_commit_only());
        assert!(!CheckKind::new(false, false).is_valid());
    }

    #[test]
    fn test_registry_instantiates_fresh_instances() {
        let registry = CheckRegistry::new().with("allow", || {
            Box::new(Always(true, CheckKind::OPERATION)) as Box<dyn Check<()>>
        });
        assert!(registry.contains("allow"));
        assert_eq!(registry.len(), 1);

        let a = registry.instantiate(&CheckId::new("allow")).unwrap();
        let b = registry.instantiate(&CheckId::new("allow")).unwrap();
        assert_ne!(a.instance(), b.instance());
        assert_eq!(a.id().as_str(), "allow");
        assert!(a.ok(&(), &RequestScope::anonymous(), None));
    }

    #[test]
    fn test_registry_unknown_check() {
        let registry: CheckRegistry<()> = CheckRegistry::new();
        let err = registry.instantiate(&CheckId::new("missing")).unwrap_err();
        assert_eq!(
            err,
            PermissionError::CheckNotInstantiable {
                check: CheckId::new("missing")
            }
        );
    }

    #[test]
    fn test_invalid_kind_rejected() {
        let registry = CheckRegistry::new().with("broken", || {
            Box::new(Always(true, CheckKind::new(false, false))) as Box<dyn Check<()>>
        });
        let err = registry.instantiate(&CheckId::new("broken")).unwrap_err();
        assert!(matches!(err, PermissionError::InvalidCheckKind { .. }));
    }
}
