//! Error types for ledgerwire
//!
//! Every failure surfaced by the engine is a [`SerializationError`]. Layer
//! specific errors (envelope framing, transforms, type strings) convert into
//! it so callers only ever match on one type.
//!
//! `NotSerializable` is the rejection a caller is expected to handle: the type
//! graph, allow-list or evolution rules forbid the operation. Malformed input
//! (bad framing, dangling references, corrupted sections) is reported as
//! `Envelope` or `Decode` instead.

use crate::envelope::EnvelopeError;
use crate::transforms::TransformError;
use crate::types::TypeRefParseError;
use thiserror::Error;

/// Result type alias for ledgerwire operations
pub type Result<T> = std::result::Result<T, SerializationError>;

/// Error type for serialization and deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The type graph, allow-list or evolution rules forbid this operation
    #[error("Type {type_name}{} is not serializable: {reason}", property_suffix(.property))]
    NotSerializable {
        /// Type being processed
        type_name: String,
        /// Offending property, parameter or enum constant
        property: Option<String>,
        /// Human readable cause
        reason: String,
    },

    /// Two different notations were produced for the same type name
    #[error("Schema conflict: type {type_name} has two different notations")]
    SchemaConflict {
        /// Conflicting type name
        type_name: String,
    },

    /// A custom or external serializer cannot be registered
    #[error("Serializer registration for {type_name} rejected: {reason}")]
    RegistrationConflict {
        /// Target type of the registration
        type_name: String,
        /// Why the registration was refused
        reason: String,
    },

    /// Envelope framing is broken
    #[error("Malformed envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The payload is structurally invalid
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

fn property_suffix(property: &Option<String>) -> String {
    match property {
        Some(p) => format!(" (property '{}')", p),
        None => String::new(),
    }
}

impl SerializationError {
    /// Rejection for a whole type.
    pub fn not_serializable(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        SerializationError::NotSerializable {
            type_name: type_name.into(),
            property: None,
            reason: reason.into(),
        }
    }

    /// Rejection naming a property, parameter or constant of a type.
    pub fn not_serializable_property(
        type_name: impl Into<String>,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SerializationError::NotSerializable {
            type_name: type_name.into(),
            property: Some(property.into()),
            reason: reason.into(),
        }
    }

    /// Structurally invalid payload.
    pub fn decode(detail: impl Into<String>) -> Self {
        SerializationError::Decode(detail.into())
    }

    /// Whether this is a `NotSerializable` rejection.
    pub fn is_not_serializable(&self) -> bool {
        matches!(self, SerializationError::NotSerializable { .. })
    }

    /// Type name carried by the error, if any.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            SerializationError::NotSerializable { type_name, .. }
            | SerializationError::SchemaConflict { type_name }
            | SerializationError::RegistrationConflict { type_name, .. } => Some(type_name),
            _ => None,
        }
    }
}

impl From<TransformError> for SerializationError {
    fn from(e: TransformError) -> Self {
        SerializationError::not_serializable(e.type_name().to_string(), e.to_string())
    }
}

impl From<TypeRefParseError> for SerializationError {
    fn from(e: TypeRefParseError) -> Self {
        SerializationError::Decode(e.to_string())
    }
}
