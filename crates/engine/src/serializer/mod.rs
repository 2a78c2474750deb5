//! Serializers
//!
//! One [`AmqpSerializer`] exists per distinct type the factory has seen. A
//! serializer knows three things about its type:
//! - the wire descriptor that tags its values in a payload
//! - how to describe the type in the schema section (`write_class_info`)
//! - how to turn a [`Value`] into a [`WireValue`] body and back
//!
//! Serializers are immutable once built and shared as
//! `Arc<dyn AmqpSerializer>` across threads.

mod collection;
mod custom;
mod enumeration;
mod object;
mod primitive;

pub use collection::CollectionSerializer;
pub use custom::{CustomSerializer, ExternalSerializer, ProxySerializer};
pub use enumeration::EnumSerializer;
pub use object::ObjectSerializer;
pub use primitive::PrimitiveSerializer;

pub(crate) use custom::{CustomSerializerAdapter, ExternalSerializerAdapter};
pub(crate) use enumeration::read_constant;
pub(crate) use object::serialized_properties;

use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use ledgerwire_core::{Mutability, Result, TypeDescriptor, TypeRef, Value, WireValue};
use std::fmt;
use std::sync::Arc;

/// Encodes and decodes values of one type.
pub trait AmqpSerializer: Send + Sync + fmt::Debug {
    /// Declared type this serializer handles.
    fn type_ref(&self) -> &TypeRef;

    /// Wire descriptor tagging values of this type.
    fn descriptor(&self) -> &str;

    /// Runtime type backing this serializer, for named types.
    fn type_descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        None
    }

    /// Add this type's notation, and those of the types it mentions, to the
    /// output schema. Called at most once per output per descriptor.
    fn write_class_info(&self, output: &mut SerializationOutput<'_>) -> Result<()>;

    /// Encode a non-null value.
    fn write_object(&self, value: &Value, output: &mut SerializationOutput<'_>) -> Result<WireValue>;

    /// Decode a body written by a serializer with the same descriptor.
    fn read_object(&self, body: &WireValue, input: &mut DeserializationInput<'_>) -> Result<Value>;
}

/// Give a constructor parameter the collection mutability it asks for.
///
/// Decoded collections are immutable unless the receiving parameter is
/// declared mutable, in which case it gets its own mutable copy.
pub(crate) fn adapt_mutability(value: Value, mutable: bool) -> Value {
    match value {
        Value::Collection(c) if mutable && !c.is_mutable() => {
            Value::Collection(Arc::new(c.with_mutability(Mutability::Mutable)))
        }
        other => other,
    }
}
