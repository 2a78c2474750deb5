//! Decoder
//!
//! A [`DeserializationInput`] reads one envelope at a time. Serializers are
//! located by the descriptor on each described node; a descriptor the factory
//! has not seen triggers schema processing, which may synthesize types or
//! build evolution serializers before decoding continues.
//!
//! Everything in the payload is untrusted: back-references are bounds
//! checked, nesting is limited by `max_depth`, and each decoded value must
//! fit the declared type of the slot it lands in.

use crate::factory::SerializerFactory;
use ledgerwire_core::{
    Envelope, Result, Schema, SerializationError, TransformsSchema, TypeRef, Value, WireValue,
};
use std::sync::Arc;
use tracing::debug;

/// Schema and transforms of the envelope being decoded.
#[derive(Debug, Clone, Default)]
pub struct SerializationSchemas {
    /// Schema section
    pub schema: Schema,
    /// Transforms section
    pub transforms: TransformsSchema,
}

/// Decoded value with the envelope it came from.
#[derive(Debug, Clone)]
pub struct ObjectAndEnvelope {
    /// Decoded root
    pub obj: Value,
    /// Parsed envelope
    pub envelope: Envelope,
}

/// Decoder session.
#[derive(Debug)]
pub struct DeserializationInput<'a> {
    factory: &'a SerializerFactory,
    /// Objects in completion order, targets of back-references
    history: Vec<Value>,
    schemas: Arc<SerializationSchemas>,
    depth: usize,
}

impl<'a> DeserializationInput<'a> {
    /// Session over `factory`.
    pub fn new(factory: &'a SerializerFactory) -> Self {
        DeserializationInput {
            factory,
            history: Vec::new(),
            schemas: Arc::new(SerializationSchemas::default()),
            depth: 0,
        }
    }

    /// Factory backing this session.
    pub fn factory(&self) -> &'a SerializerFactory {
        self.factory
    }

    /// Schemas of the envelope currently being decoded.
    pub fn schemas(&self) -> &Arc<SerializationSchemas> {
        &self.schemas
    }

    /// Decode an envelope.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<Value> {
        self.deserialize_as(bytes, &TypeRef::Any)
    }

    /// Decode an envelope whose root must fit `expected`.
    pub fn deserialize_as(&mut self, bytes: &[u8], expected: &TypeRef) -> Result<Value> {
        let Envelope {
            obj,
            schema,
            transforms_schema,
        } = Envelope::from_bytes(bytes, self.factory.config().max_envelope_bytes)?;
        let schemas = Arc::new(SerializationSchemas {
            schema,
            transforms: transforms_schema,
        });
        self.decode(&obj, schemas, expected)
    }

    /// Decode an envelope and also return it.
    pub fn deserialize_and_return_envelope(&mut self, bytes: &[u8]) -> Result<ObjectAndEnvelope> {
        let envelope = Envelope::from_bytes(bytes, self.factory.config().max_envelope_bytes)?;
        let schemas = Arc::new(SerializationSchemas {
            schema: envelope.schema.clone(),
            transforms: envelope.transforms_schema.clone(),
        });
        let obj = self.decode(&envelope.obj, schemas, &TypeRef::Any)?;
        Ok(ObjectAndEnvelope { obj, envelope })
    }

    fn decode(&mut self, obj: &WireValue, schemas: Arc<SerializationSchemas>, expected: &TypeRef) -> Result<Value> {
        self.history.clear();
        self.depth = 0;
        self.schemas = schemas;
        let result = self.read_object_or_null(obj, expected);
        debug!(
            target: "ledgerwire::input",
            objects = self.history.len(),
            notations = self.schemas.schema.len(),
            ok = result.is_ok(),
            "Deserialized envelope"
        );
        self.history.clear();
        self.schemas = Arc::new(SerializationSchemas::default());
        result
    }

    // ========================================================================
    // Used by serializers
    // ========================================================================

    /// Decode a node into a slot of type `declared`.
    pub fn read_object_or_null(&mut self, wire: &WireValue, declared: &TypeRef) -> Result<Value> {
        let value = match wire {
            WireValue::Null => return Ok(Value::Null),
            WireValue::Reference(index) => {
                self.history.get(*index as usize).cloned().ok_or_else(|| {
                    SerializationError::decode(format!(
                        "reference {} is out of bounds, {} objects read so far",
                        index,
                        self.history.len()
                    ))
                })?
            }
            WireValue::Described { descriptor, body } => {
                self.depth += 1;
                let result = if self.depth > self.factory.config().max_depth {
                    Err(SerializationError::decode(format!(
                        "payload is nested deeper than {}",
                        self.factory.config().max_depth
                    )))
                } else {
                    self.read_described(descriptor, body)
                };
                self.depth -= 1;
                let value = result?;
                if value.identity().is_some() {
                    self.history.push(value.clone());
                }
                value
            }
            WireValue::List(_) | WireValue::Map(_) => {
                return Err(SerializationError::decode(format!(
                    "undescribed {} in payload",
                    wire.label()
                )))
            }
            scalar => scalar.to_scalar().ok_or_else(|| {
                SerializationError::decode(format!("{} value out of range", scalar.label()))
            })?,
        };
        if !self.factory.is_assignable(&value, declared) {
            return Err(SerializationError::not_serializable(
                declared.to_string(),
                format!("payload holds a {} where {} is declared", value.type_label(), declared),
            ));
        }
        Ok(value)
    }

    fn read_described(&mut self, descriptor: &str, body: &WireValue) -> Result<Value> {
        let schemas = self.schemas.clone();
        let serializer = self.factory.get_by_descriptor(descriptor, &schemas)?;
        serializer.read_object(body, self)
    }
}
