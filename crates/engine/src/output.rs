//! Encoder
//!
//! A [`SerializationOutput`] turns one object graph into an envelope. It is a
//! single-use-at-a-time session over a shared [`SerializerFactory`]: the
//! histories below live only for the duration of one `serialize` call.
//!
//! # Object references
//!
//! Records and collections are tracked by identity. The first occurrence is
//! written in full; later occurrences become `Reference(index)`, where the
//! index counts objects in the order their encoding *completed*. The decoder
//! numbers objects the same way, so aliasing survives a round trip.

use crate::factory::SerializerFactory;
use crate::serializer::AmqpSerializer;
use ledgerwire_core::{
    Envelope, Result, Schema, SerializationError, TransformSet, TransformsSchema, TypeNotation,
    TypeRef, Value, WireValue,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

/// Encoded bytes together with the schemas written into them.
#[derive(Debug, Clone)]
pub struct BytesAndSchemas {
    /// Framed envelope
    pub bytes: Vec<u8>,
    /// Schema section
    pub schema: Schema,
    /// Transforms section
    pub transforms_schema: TransformsSchema,
}

/// Encoder session.
#[derive(Debug)]
pub struct SerializationOutput<'a> {
    factory: &'a SerializerFactory,
    /// identity -> (completion index, the value itself to pin its address)
    object_history: FxHashMap<usize, (u32, Value)>,
    /// Descriptors whose class info has been written
    serializer_history: FxHashSet<String>,
    schema: Schema,
    transforms: TransformsSchema,
    references_enabled: bool,
    depth: usize,
}

impl<'a> SerializationOutput<'a> {
    /// Session over `factory`, with references enabled per its configuration.
    pub fn new(factory: &'a SerializerFactory) -> Self {
        SerializationOutput {
            factory,
            object_history: FxHashMap::default(),
            serializer_history: FxHashSet::default(),
            schema: Schema::new(),
            transforms: TransformsSchema::new(),
            references_enabled: factory.config().object_references,
            depth: 0,
        }
    }

    /// Override the back-reference switch.
    pub fn with_object_references(mut self, enabled: bool) -> Self {
        self.references_enabled = enabled;
        self
    }

    /// Factory backing this session.
    pub fn factory(&self) -> &'a SerializerFactory {
        self.factory
    }

    /// Encode `value` into a framed envelope.
    pub fn serialize(&mut self, value: &Value) -> Result<Vec<u8>> {
        self.serialize_and_return_schema(value).map(|out| out.bytes)
    }

    /// Encode `value` and also return the schemas that were written.
    pub fn serialize_and_return_schema(&mut self, value: &Value) -> Result<BytesAndSchemas> {
        self.reset();
        let result = self.encode(value);
        let schema = std::mem::take(&mut self.schema);
        let transforms = std::mem::take(&mut self.transforms);
        self.reset();

        let envelope = Envelope::new(result?, schema, transforms);
        let bytes = envelope.to_bytes()?;
        debug!(
            target: "ledgerwire::output",
            bytes = bytes.len(),
            notations = envelope.schema.len(),
            transforms = envelope.transforms_schema.len(),
            "Serialized object graph"
        );
        Ok(BytesAndSchemas {
            bytes,
            schema: envelope.schema,
            transforms_schema: envelope.transforms_schema,
        })
    }

    fn encode(&mut self, value: &Value) -> Result<WireValue> {
        self.write_object_or_null(value, &TypeRef::Any)
    }

    fn reset(&mut self) {
        self.object_history.clear();
        self.serializer_history.clear();
        self.schema = Schema::new();
        self.transforms = TransformsSchema::new();
        self.depth = 0;
    }

    // ========================================================================
    // Used by serializers
    // ========================================================================

    /// Encode a possibly-null value held in a slot of type `declared`.
    ///
    /// Nullability is the caller's concern; this only rejects values whose
    /// runtime type cannot be stored under `declared`.
    pub fn write_object_or_null(&mut self, value: &Value, declared: &TypeRef) -> Result<WireValue> {
        if value.is_null() {
            return Ok(WireValue::Null);
        }
        self.check_declared(value, declared)?;

        let identity = if self.references_enabled {
            value.identity()
        } else {
            None
        };
        if let Some(id) = identity {
            if let Some((index, _)) = self.object_history.get(&id) {
                return Ok(WireValue::Reference(*index));
            }
        }

        let serializer = self.factory.get_for_value(value, declared)?;
        self.require_serializer(&serializer)?;

        // Scalars are written bare and do not nest.
        if serializer.type_ref().is_primitive() {
            return serializer.write_object(value, self);
        }

        self.depth += 1;
        if self.depth > self.factory.config().max_depth {
            self.depth -= 1;
            return Err(SerializationError::not_serializable(
                value.type_label(),
                format!(
                    "object graph is nested deeper than {}",
                    self.factory.config().max_depth
                ),
            ));
        }
        let written = serializer.write_object(value, self);
        self.depth -= 1;
        let written = written?;

        if let Some(id) = identity {
            let index = self.object_history.len() as u32;
            self.object_history.insert(id, (index, value.clone()));
        }
        Ok(written)
    }

    /// Make sure the schema describes `type_ref`. Primitives and `*` need no
    /// notation.
    pub fn require_declared(&mut self, type_ref: &TypeRef) -> Result<()> {
        match type_ref {
            TypeRef::Any | TypeRef::Primitive(_) => Ok(()),
            _ => {
                let serializer = self.factory.get_declared(type_ref)?;
                self.require_serializer(&serializer)
            }
        }
    }

    /// Write class info for `serializer` unless already written in this call.
    pub fn require_serializer(&mut self, serializer: &Arc<dyn AmqpSerializer>) -> Result<()> {
        if serializer.type_ref().is_primitive() {
            return Ok(());
        }
        if self.serializer_history.insert(serializer.descriptor().to_string()) {
            serializer.write_class_info(self)?;
        }
        Ok(())
    }

    /// Merge a notation into the schema.
    pub fn add_notation(&mut self, notation: TypeNotation) -> Result<()> {
        self.schema.merge(notation).map(|_| ())
    }

    /// Record the transforms of an enum present in the payload.
    pub fn add_transforms(&mut self, type_name: &str, transforms: TransformSet) {
        if self.transforms.get(type_name).is_none() {
            self.transforms.insert(type_name, transforms);
        }
    }

    fn check_declared(&self, value: &Value, declared: &TypeRef) -> Result<()> {
        if self.factory.is_assignable(value, declared) {
            Ok(())
        } else {
            Err(SerializationError::not_serializable(
                declared.to_string(),
                format!("a {} value cannot be stored as {}", value.type_label(), declared),
            ))
        }
    }
}
