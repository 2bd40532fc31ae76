//! Entity metadata lookup.
//!
//! [`EntityDictionary`] is the seam between the engine and whatever holds
//! the declared permissions of each resource type. [`StaticDictionary`] is
//! an in-memory implementation, built programmatically or loaded from a
//! manifest (see [`crate::loader`]).

use std::collections::{BTreeMap, HashMap};

use crate::extract::PermissionDeclaration;
use crate::loader::LoadError;
use crate::types::PermissionKind;

/// Read-only access to declared permissions.
pub trait EntityDictionary {
    /// Entity-level declaration for `kind`, if any.
    fn entity_permission(
        &self,
        resource_type: &str,
        kind: PermissionKind,
    ) -> Option<&PermissionDeclaration>;

    /// Field-level declaration for `kind` on `field`, if any.
    fn field_permission(
        &self,
        resource_type: &str,
        kind: PermissionKind,
        field: &str,
    ) -> Option<&PermissionDeclaration>;

    /// Every attribute and relationship of the type, in declaration order.
    fn fields(&self, resource_type: &str) -> Vec<String>;
}

/// Declared permissions of one resource type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityDefinition {
    name: String,
    fields: Vec<String>,
    permissions: BTreeMap<PermissionKind, PermissionDeclaration>,
    field_permissions: BTreeMap<String, BTreeMap<PermissionKind, PermissionDeclaration>>,
}

impl EntityDefinition {
    /// Start a definition for the named resource type.
    pub fn new(name: impl Into<String>) -> Self {
        EntityDefinition {
            name: name.into(),
            ..EntityDefinition::default()
        }
    }

    /// Declare an attribute or relationship. Order is preserved.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
        self
    }

    /// Attach an entity-level declaration.
    pub fn permission(mut self, kind: PermissionKind, declaration: PermissionDeclaration) -> Self {
        self.permissions.insert(kind, declaration);
        self
    }

    /// Attach a field-level declaration.
    pub fn field_permission(
        mut self,
        field: impl Into<String>,
        kind: PermissionKind,
        declaration: PermissionDeclaration,
    ) -> Self {
        self.field_permissions
            .entry(field.into())
            .or_default()
            .insert(kind, declaration);
        self
    }

    /// Resource type name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, in order.
    #[inline]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    fn validate(&self) -> Result<(), LoadError> {
        match self
            .field_permissions
            .keys()
            .find(|field| !self.fields.contains(field))
        {
            Some(field) => Err(LoadError::UnknownField {
                entity: self.name.clone(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// In-memory [`EntityDictionary`].
#[derive(Debug, Clone, Default)]
pub struct StaticDictionary {
    entities: HashMap<String, EntityDefinition>,
}

impl StaticDictionary {
    /// Start building a dictionary.
    pub fn builder() -> StaticDictionaryBuilder {
        StaticDictionaryBuilder::default()
    }

    /// Look up a resource type.
    pub fn entity(&self, resource_type: &str) -> Option<&EntityDefinition> {
        self.entities.get(resource_type)
    }

    /// Number of resource types.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no resource type is declared.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityDictionary for StaticDictionary {
    fn entity_permission(
        &self,
        resource_type: &str,
        kind: PermissionKind,
    ) -> Option<&PermissionDeclaration> {
        self.entities.get(resource_type)?.permissions.get(&kind)
    }

    fn field_permission(
        &self,
        resource_type: &str,
        kind: PermissionKind,
        field: &str,
    ) -> Option<&PermissionDeclaration> {
        self.entities
            .get(resource_type)?
            .field_permissions
            .get(field)?
            .get(&kind)
    }

    fn fields(&self, resource_type: &str) -> Vec<String> {
        self.entities
            .get(resource_type)
            .map(|e| e.fields.clone())
            .unwrap_or_default()
    }
}

/// Builder for [`StaticDictionary`].
#[derive(Debug, Default)]
pub struct StaticDictionaryBuilder {
    entities: Vec<EntityDefinition>,
}

impl StaticDictionaryBuilder {
    /// Add a resource type.
    pub fn entity(mut self, entity: EntityDefinition) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validate and build.
    ///
    /// Fails on duplicate resource types and on field-level declarations
    /// naming undeclared fields.
    pub fn build(self) -> Result<StaticDictionary, LoadError> {
        let mut entities = HashMap::with_capacity(self.entities.len());
        for entity in self.entities {
            entity.validate()?;
            if entities.contains_key(&entity.name) {
                return Err(LoadError::DuplicateEntity(entity.name));
            }
            entities.insert(entity.name.clone(), entity);
        }
        Ok(StaticDictionary { entities })
    }
}
