//! Schema section
//!
//! The schema lists one notation per non-primitive type that appears in a
//! payload, so a reader can interpret the payload without sharing code with
//! the writer. Notations are keyed by type name and kept in first-seen order.

use crate::error::{Result, SerializationError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Restricted-type source of enums.
pub const ENUM_SOURCE: &str = "enum";
/// Restricted-type source of externally serialized types.
pub const BINARY_SOURCE: &str = "binary";

/// One field of a composite notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Property name
    pub name: String,
    /// Wire type string, see [`crate::types::TypeRef`]
    pub type_name: String,
    /// Interfaces the value must provide
    pub requires: Vec<String>,
    /// Whether null is forbidden
    pub mandatory: bool,
}

impl Field {
    /// Field with no requirements.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, mandatory: bool) -> Self {
        Field {
            name: name.into(),
            type_name: type_name.into(),
            requires: Vec::new(),
            mandatory,
        }
    }
}

/// Whether a composite notation describes a concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeKind {
    /// Instantiable record type
    Class,
    /// Capability set
    Interface,
}

/// Notation of a record type or interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeType {
    /// Type name
    pub name: String,
    /// Class or interface
    pub kind: CompositeKind,
    /// Implemented interfaces
    pub provides: Vec<String>,
    /// Wire descriptor
    pub descriptor: String,
    /// Fields in serialization order
    pub fields: Vec<Field>,
}

/// One enum constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Constant name
    pub name: String,
}

/// Notation of an enum, collection or custom-serialized type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedType {
    /// Type name
    pub name: String,
    /// Implemented interfaces
    pub provides: Vec<String>,
    /// `enum`, a collection kind, `binary` or a proxy type name
    pub source: String,
    /// Wire descriptor
    pub descriptor: String,
    /// Enum constants in ordinal order
    pub choices: Vec<Choice>,
}

impl RestrictedType {
    /// Whether this notation describes an enum.
    pub fn is_enum(&self) -> bool {
        self.source == ENUM_SOURCE
    }
}

/// A schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeNotation {
    /// Record type or interface
    Composite(CompositeType),
    /// Enum, collection or custom type
    Restricted(RestrictedType),
}

impl TypeNotation {
    /// Type name.
    pub fn name(&self) -> &str {
        match self {
            TypeNotation::Composite(c) => &c.name,
            TypeNotation::Restricted(r) => &r.name,
        }
    }

    /// Wire descriptor.
    pub fn descriptor(&self) -> &str {
        match self {
            TypeNotation::Composite(c) => &c.descriptor,
            TypeNotation::Restricted(r) => &r.descriptor,
        }
    }

    /// Implemented interfaces.
    pub fn provides(&self) -> &[String] {
        match self {
            TypeNotation::Composite(c) => &c.provides,
            TypeNotation::Restricted(r) => &r.provides,
        }
    }
}

/// Ordered set of notations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: Vec<TypeNotation>,
    index: FxHashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

#[derive(Serialize, Deserialize)]
struct WireSchema {
    types: Vec<TypeNotation>,
}

impl Schema {
    /// Empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notation unless one with the same name is present.
    ///
    /// Returns `true` when the notation was added. Re-adding an identical
    /// notation is a no-op; a different notation under the same name fails
    /// with `SchemaConflict`.
    pub fn merge(&mut self, notation: TypeNotation) -> Result<bool> {
        match self.index.get(notation.name()) {
            Some(&i) if self.types[i] == notation => Ok(false),
            Some(_) => Err(SerializationError::SchemaConflict {
                type_name: notation.name().to_string(),
            }),
            None => {
                self.index
                    .insert(notation.name().to_string(), self.types.len());
                self.types.push(notation);
                Ok(true)
            }
        }
    }

    /// Notation by type name.
    pub fn get(&self, name: &str) -> Option<&TypeNotation> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    /// Notation by wire descriptor.
    pub fn by_descriptor(&self, descriptor: &str) -> Option<&TypeNotation> {
        self.types.iter().find(|t| t.descriptor() == descriptor)
    }

    /// Notations in first-seen order.
    pub fn types(&self) -> &[TypeNotation] {
        &self.types
    }

    /// Number of notations.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// MessagePack encoding.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(&WireSchema {
            types: self.types.clone(),
        })
    }

    /// Decode and rebuild through [`Schema::merge`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let wire: WireSchema = rmp_serde::from_slice(bytes)
            .map_err(|e| SerializationError::decode(format!("schema section: {}", e)))?;
        let mut schema = Schema::new();
        for notation in wire.types {
            schema.merge(notation)?;
        }
        Ok(schema)
    }
}
