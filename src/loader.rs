//! YAML manifest loader.
//!
//! Reads entity metadata into a [`StaticDictionary`]:
//!
//! ```yaml
//! entities:
//!   book:
//!     fields: [title, author]
//!     permissions:
//!       read: { any: [is_public, is_owner] }
//!       update: { all: [is_owner] }
//!     field_permissions:
//!       title:
//!         update: { any: [is_editor] }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::dictionary::{EntityDefinition, StaticDictionary};
use crate::extract::PermissionDeclaration;
use crate::types::PermissionKind;

/// Root of a manifest file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    entities: BTreeMap<String, EntityManifest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityManifest {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    permissions: BTreeMap<PermissionKind, PermissionDeclaration>,
    #[serde(default)]
    field_permissions: BTreeMap<String, BTreeMap<PermissionKind, PermissionDeclaration>>,
}

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The manifest file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The manifest is not valid YAML or does not match the schema.
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A field-level declaration names a field the entity does not declare.
    #[error("entity '{entity}' declares permissions on unknown field '{field}'")]
    UnknownField {
        /// Resource type.
        entity: String,
        /// Undeclared field.
        field: String,
    },
    /// The same resource type is defined twice.
    #[error("entity '{0}' is defined more than once")]
    DuplicateEntity(String),
}

/// Load a manifest from disk.
pub fn load_dictionary_file(path: &Path) -> Result<StaticDictionary, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    parse_dictionary(&contents)
}

/// Parse a manifest from a YAML string.
pub fn parse_dictionary(yaml: &str) -> Result<StaticDictionary, LoadError> {
    let manifest: Manifest = serde_yaml::from_str(yaml)?;
    let mut builder = StaticDictionary::builder();
    for (name, entity) in manifest.entities {
        builder = builder.entity(entity.into_definition(name));
    }
    let dictionary = builder.build()?;
    tracing::debug!(entities = dictionary.len(), "loaded permission manifest");
    Ok(dictionary)
}

impl EntityManifest {
    fn into_definition(self, name: String) -> EntityDefinition {
        let mut definition = EntityDefinition::new(name);
        for field in self.fields {
            definition = definition.field(field);
        }
        for (kind, declaration) in self.permissions {
            definition = definition.permission(kind, declaration);
        }
        for (field, declarations) in self.field_permissions {
            for (kind, declaration) in declarations {
                definition = definition.field_permission(field.clone(), kind, declaration);
            }
        }
        definition
    }
}
