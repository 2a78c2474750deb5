//! List, set, array and map serializer
//!
//! Collections are described by a restricted notation whose name is the
//! declared type string (`list<int>`, `map<string,*>`) and whose source is
//! the collection kind. Element types get their own notations.

use super::AmqpSerializer;
use crate::factory::SerializerFactory;
use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use ledgerwire_core::{
    CollectionKind, CollectionValue, Elements, RestrictedType, Result, SerializationError,
    TypeNotation, TypeRef, Value, WireValue,
};
use std::sync::Arc;

/// Serializer for one parameterised collection type.
#[derive(Debug)]
pub struct CollectionSerializer {
    type_ref: TypeRef,
    kind: CollectionKind,
    params: Vec<TypeRef>,
    descriptor: String,
    notation: TypeNotation,
}

impl CollectionSerializer {
    /// Serializer for `type_ref`, which must be a sanctioned collection.
    pub fn new(type_ref: TypeRef, factory: &SerializerFactory) -> Result<Self> {
        let (kind, params) = match &type_ref {
            TypeRef::Collection(kind, params) if kind.is_sanctioned() => (*kind, params.clone()),
            TypeRef::Collection(kind, _) => {
                return Err(SerializationError::not_serializable(
                    type_ref.to_string(),
                    format!("{} is not a supported collection kind", kind),
                ))
            }
            other => {
                return Err(SerializationError::not_serializable(
                    other.to_string(),
                    "not a collection type",
                ))
            }
        };
        if params.len() != kind.arity() {
            return Err(SerializationError::not_serializable(
                type_ref.to_string(),
                format!("{} takes {} type parameters", kind, kind.arity()),
            ));
        }
        let descriptor = factory.descriptor_for(&type_ref)?;
        let notation = TypeNotation::Restricted(RestrictedType {
            name: type_ref.to_string(),
            provides: Vec::new(),
            source: kind.wire_name().to_string(),
            descriptor: descriptor.clone(),
            choices: Vec::new(),
        });
        Ok(CollectionSerializer {
            type_ref,
            kind,
            params,
            descriptor,
            notation,
        })
    }

    fn element_type(&self) -> &TypeRef {
        &self.params[0]
    }

    fn check_element(&self, value: &Value) -> Result<()> {
        if value.is_null() && self.kind == CollectionKind::Array && self.element_type().is_primitive() {
            return Err(SerializationError::not_serializable(
                self.type_ref.to_string(),
                "arrays of primitives cannot hold null",
            ));
        }
        Ok(())
    }

    fn check_len(&self, len: usize, input: &DeserializationInput<'_>) -> Result<()> {
        let limit = input.factory().config().max_collection_len;
        if len > limit {
            return Err(SerializationError::decode(format!(
                "{} of {} elements exceeds limit of {}",
                self.type_ref, len, limit
            )));
        }
        Ok(())
    }
}

impl AmqpSerializer for CollectionSerializer {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn write_class_info(&self, output: &mut SerializationOutput<'_>) -> Result<()> {
        output.add_notation(self.notation.clone())?;
        for param in &self.params {
            output.require_declared(param)?;
        }
        Ok(())
    }

    fn write_object(&self, value: &Value, output: &mut SerializationOutput<'_>) -> Result<WireValue> {
        let collection = value
            .as_collection()
            .filter(|c| c.kind() == self.kind)
            .ok_or_else(|| {
                SerializationError::not_serializable(
                    self.type_ref.to_string(),
                    format!("expected a {}, found {}", self.kind, value.type_label()),
                )
            })?;
        let body = match collection.elements() {
            Elements::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.check_element(item)?;
                    out.push(output.write_object_or_null(item, self.element_type())?);
                }
                WireValue::List(out)
            }
            Elements::Entries(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    out.push((
                        output.write_object_or_null(key, &self.params[0])?,
                        output.write_object_or_null(value, &self.params[1])?,
                    ));
                }
                WireValue::Map(out)
            }
        };
        Ok(WireValue::described(self.descriptor.clone(), body))
    }

    fn read_object(&self, body: &WireValue, input: &mut DeserializationInput<'_>) -> Result<Value> {
        let elements = match (self.kind.is_map(), body) {
            (false, WireValue::List(items)) => {
                self.check_len(items.len(), input)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let value = input.read_object_or_null(item, self.element_type())?;
                    self.check_element(&value)?;
                    out.push(value);
                }
                Elements::Sequence(out)
            }
            (true, WireValue::Map(entries)) => {
                self.check_len(entries.len(), input)?;
                let mut out = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = input.read_object_or_null(key, &self.params[0])?;
                    let value = input.read_object_or_null(value, &self.params[1])?;
                    out.push((key, value));
                }
                Elements::Entries(out)
            }
            (_, other) => {
                return Err(SerializationError::decode(format!(
                    "{}: unexpected {} body",
                    self.type_ref,
                    other.label()
                )))
            }
        };
        Ok(Value::Collection(Arc::new(CollectionValue::new(self.kind, elements)?)))
    }
}
