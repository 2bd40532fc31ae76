//! Core type definitions shared by the builder and executor.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::PermissionError;
use crate::value::Value;

/// The operation an authorization point guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    /// Reading an entity or field.
    Read,
    /// Creating an entity.
    Create,
    /// Updating an entity or field.
    Update,
    /// Deleting an entity.
    Delete,
}

impl PermissionKind {
    /// Returns `true` for kinds that run inside a staged unit of work and
    /// may therefore defer commit-only checks.
    #[inline]
    pub fn is_mutation(&self) -> bool {
        matches!(self, PermissionKind::Create | PermissionKind::Update)
    }

    /// Lowercase name, as used in manifests and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::Read => "read",
            PermissionKind::Create => "create",
            PermissionKind::Update => "update",
            PermissionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether checks run at all for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Checks are evaluated normally.
    #[default]
    Active,
    /// All checks are skipped (trusted internal callers only).
    BypassSecurity,
}

/// Per-request information handed to every check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestScope {
    /// The principal making the request, if authenticated.
    pub principal: Option<String>,
    /// Security mode for the whole request.
    pub security_mode: SecurityMode,
    /// Additional request attributes, ordered for deterministic iteration.
    pub attributes: BTreeMap<String, Value>,
}

impl RequestScope {
    /// Create an active scope for the given principal.
    pub fn new(principal: impl Into<String>) -> Self {
        RequestScope {
            principal: Some(principal.into()),
            ..RequestScope::default()
        }
    }

    /// Create an active scope with no principal.
    pub fn anonymous() -> Self {
        RequestScope::default()
    }

    /// Set the security mode.
    pub fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    /// Add a request attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up a request attribute by name.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns `true` if checks must be skipped for this request.
    #[inline]
    pub fn is_security_bypassed(&self) -> bool {
        self.security_mode == SecurityMode::BypassSecurity
    }
}

/// Description of a pending change to one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSpec {
    /// Name of the attribute or relationship being changed.
    pub field: String,
    /// Value before the change.
    pub original: Value,
    /// Value after the change.
    pub modified: Value,
}

impl ChangeSpec {
    /// Create a change description.
    pub fn new(
        field: impl Into<String>,
        original: impl Into<Value>,
        modified: impl Into<Value>,
    ) -> Self {
        ChangeSpec {
            field: field.into(),
            original: original.into(),
            modified: modified.into(),
        }
    }
}

/// A handle on one resource instance taking part in a request.
///
/// Cloning is cheap and shares the underlying object, so mutations staged
/// through one handle are visible to expressions queued for commit.
pub struct PersistentResource<T> {
    resource_type: Rc<str>,
    id: Option<String>,
    object: Rc<RefCell<T>>,
    scope: Rc<RequestScope>,
}

impl<T> PersistentResource<T> {
    /// Wrap an object of the given resource type.
    pub fn new(
        resource_type: &str,
        id: Option<String>,
        object: T,
        scope: Rc<RequestScope>,
    ) -> Self {
        PersistentResource {
            resource_type: Rc::from(resource_type),
            id,
            object: Rc::new(RefCell::new(object)),
            scope,
        }
    }

    /// The resource type name, as known to the dictionary.
    #[inline]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// The resource id, if it has been assigned.
    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The request scope this resource belongs to.
    #[inline]
    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    /// Borrow the current object state.
    pub fn object(&self) -> Result<Ref<'_, T>, PermissionError> {
        self.object
            .try_borrow()
            .map_err(|_| PermissionError::ObjectBorrowed {
                resource_type: self.resource_type.to_string(),
            })
    }

    /// Mutably borrow the object to stage a change.
    pub fn object_mut(&self) -> Result<RefMut<'_, T>, PermissionError> {
        self.object
            .try_borrow_mut()
            .map_err(|_| PermissionError::ObjectBorrowed {
                resource_type: self.resource_type.to_string(),
            })
    }
}

impl<T> Clone for PersistentResource<T> {
    fn clone(&self) -> Self {
        PersistentResource {
            resource_type: Rc::clone(&self.resource_type),
            id: self.id.clone(),
            object: Rc::clone(&self.object),
            scope: Rc::clone(&self.scope),
        }
    }
}

impl<T> fmt::Debug for PersistentResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentResource")
            .field("resource_type", &self.resource_type)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
