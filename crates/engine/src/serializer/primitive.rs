//! Built-in scalars
//!
//! Primitives are written bare, without a descriptor, and never appear in
//! the schema. Their "descriptor" is the wire name of the kind.

use super::AmqpSerializer;
use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use ledgerwire_core::{PrimitiveKind, Result, SerializationError, TypeRef, Value, WireValue};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

static PRIMITIVES: Lazy<FxHashMap<PrimitiveKind, Arc<PrimitiveSerializer>>> = Lazy::new(|| {
    PrimitiveKind::ALL
        .iter()
        .map(|&kind| (kind, Arc::new(PrimitiveSerializer::new(kind))))
        .collect()
});

/// Serializer for one [`PrimitiveKind`].
#[derive(Debug, Clone)]
pub struct PrimitiveSerializer {
    kind: PrimitiveKind,
    type_ref: TypeRef,
}

impl PrimitiveSerializer {
    /// Serializer for `kind`.
    pub fn new(kind: PrimitiveKind) -> Self {
        PrimitiveSerializer {
            kind,
            type_ref: TypeRef::Primitive(kind),
        }
    }

    /// Process-wide shared instance for `kind`.
    pub fn shared(kind: PrimitiveKind) -> Arc<PrimitiveSerializer> {
        match PRIMITIVES.get(&kind) {
            Some(s) => s.clone(),
            None => Arc::new(PrimitiveSerializer::new(kind)),
        }
    }

    /// Kind handled.
    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }
}

impl AmqpSerializer for PrimitiveSerializer {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn descriptor(&self) -> &str {
        self.kind.wire_name()
    }

    fn write_class_info(&self, _output: &mut SerializationOutput<'_>) -> Result<()> {
        Ok(())
    }

    fn write_object(&self, value: &Value, _output: &mut SerializationOutput<'_>) -> Result<WireValue> {
        if value.primitive_kind() != Some(self.kind) {
            return Err(SerializationError::not_serializable(
                self.kind.wire_name(),
                format!("expected a {} value, found {}", self.kind, value.type_label()),
            ));
        }
        WireValue::from_scalar(value).ok_or_else(|| {
            SerializationError::not_serializable(self.kind.wire_name(), "value is not a scalar")
        })
    }

    fn read_object(&self, body: &WireValue, _input: &mut DeserializationInput<'_>) -> Result<Value> {
        if body.primitive_kind() != Some(self.kind) {
            return Err(SerializationError::decode(format!(
                "expected {} on the wire, found {}",
                self.kind,
                body.label()
            )));
        }
        body.to_scalar()
            .ok_or_else(|| SerializationError::decode(format!("{} value out of range", self.kind)))
    }
}
