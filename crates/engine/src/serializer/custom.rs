//! Custom and external serializers
//!
//! Applications take over the encoding of a type in one of two ways:
//! - [`CustomSerializer`]: convert to and from a *proxy* composite, which is
//!   then written like any other composite. The notation of the target type
//!   is a restricted type whose source is the proxy's name.
//! - [`ExternalSerializer`]: produce opaque bytes. The notation's source is
//!   `binary` and the body is a single binary value.
//!
//! Both are wrapped in adapters implementing [`AmqpSerializer`] and
//! registered with the factory, which consults them before any default.

use super::{AmqpSerializer, ObjectSerializer};
use crate::factory::SerializerFactory;
use crate::fingerprint::descriptor_from_tokens;
use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use ledgerwire_core::{
    Record, RestrictedType, Result, SerializationError, TypeDescriptor, TypeNotation, TypeRef,
    Value, WireValue, BINARY_SOURCE,
};
use std::fmt;
use std::sync::Arc;

/// Converts a type to and from a serializable proxy composite.
pub trait CustomSerializer: Send + Sync + fmt::Debug {
    /// Name of the type this serializer takes over.
    fn type_name(&self) -> &str;

    /// Composite written in place of the target type.
    fn proxy_type(&self) -> &Arc<TypeDescriptor>;

    /// Build the proxy for a value of the target type.
    fn to_proxy(&self, value: &Record) -> Result<Record>;

    /// Rebuild a value of the target type from its proxy.
    fn from_proxy(&self, proxy: &Record) -> Result<Value>;
}

/// Encodes a type as opaque bytes.
pub trait ExternalSerializer: Send + Sync + fmt::Debug {
    /// Name of the type this serializer takes over.
    fn type_name(&self) -> &str;

    /// Encode a value of the target type.
    fn to_bytes(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode bytes produced by [`ExternalSerializer::to_bytes`].
    fn from_bytes(&self, bytes: &[u8]) -> Result<Value>;
}

type ToProxyFn = dyn Fn(&Record) -> Result<Record> + Send + Sync;
type FromProxyFn = dyn Fn(&Record) -> Result<Value> + Send + Sync;

/// [`CustomSerializer`] built from a pair of closures.
pub struct ProxySerializer {
    type_name: String,
    proxy: Arc<TypeDescriptor>,
    to_proxy: Box<ToProxyFn>,
    from_proxy: Box<FromProxyFn>,
}

impl ProxySerializer {
    /// Serializer for `type_name` via `proxy`.
    pub fn new<T, F>(type_name: impl Into<String>, proxy: Arc<TypeDescriptor>, to_proxy: T, from_proxy: F) -> Self
    where
        T: Fn(&Record) -> Result<Record> + Send + Sync + 'static,
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        ProxySerializer {
            type_name: type_name.into(),
            proxy,
            to_proxy: Box::new(to_proxy),
            from_proxy: Box::new(from_proxy),
        }
    }
}

impl fmt::Debug for ProxySerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySerializer")
            .field("type_name", &self.type_name)
            .field("proxy", &self.proxy.name())
            .finish()
    }
}

impl CustomSerializer for ProxySerializer {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn proxy_type(&self) -> &Arc<TypeDescriptor> {
        &self.proxy
    }

    fn to_proxy(&self, value: &Record) -> Result<Record> {
        (self.to_proxy)(value)
    }

    fn from_proxy(&self, proxy: &Record) -> Result<Value> {
        (self.from_proxy)(proxy)
    }
}

// ============================================================================
// Adapters
// ============================================================================

#[derive(Debug)]
pub(crate) struct CustomSerializerAdapter {
    custom: Arc<dyn CustomSerializer>,
    type_ref: TypeRef,
    descriptor: String,
    proxy: ObjectSerializer,
    notation: TypeNotation,
}

impl CustomSerializerAdapter {
    pub(crate) fn new(custom: Arc<dyn CustomSerializer>, factory: &SerializerFactory) -> Result<Self> {
        let proxy = ObjectSerializer::new(custom.proxy_type().clone(), factory)?;
        let type_name = custom.type_name().to_string();
        let descriptor = descriptor_from_tokens(&[&type_name, proxy.descriptor()]);
        let notation = TypeNotation::Restricted(RestrictedType {
            name: type_name.clone(),
            provides: Vec::new(),
            source: custom.proxy_type().name().to_string(),
            descriptor: descriptor.clone(),
            choices: Vec::new(),
        });
        Ok(CustomSerializerAdapter {
            custom,
            type_ref: TypeRef::named(type_name),
            descriptor,
            proxy,
            notation,
        })
    }
}

impl AmqpSerializer for CustomSerializerAdapter {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn write_class_info(&self, output: &mut SerializationOutput<'_>) -> Result<()> {
        output.add_notation(self.notation.clone())?;
        self.proxy.write_class_info(output)
    }

    fn write_object(&self, value: &Value, output: &mut SerializationOutput<'_>) -> Result<WireValue> {
        let record = value.as_record().ok_or_else(|| {
            SerializationError::not_serializable(
                self.custom.type_name(),
                format!("expected a record, found {}", value.type_label()),
            )
        })?;
        let proxy = self.custom.to_proxy(record)?;
        if proxy.type_name() != self.custom.proxy_type().name() {
            return Err(SerializationError::not_serializable(
                self.custom.type_name(),
                format!(
                    "custom serializer produced {}, expected proxy {}",
                    proxy.type_name(),
                    self.custom.proxy_type().name()
                ),
            ));
        }
        match self.proxy.write_object(&Value::record(proxy), output)? {
            WireValue::Described { body, .. } => Ok(WireValue::Described {
                descriptor: self.descriptor.clone(),
                body,
            }),
            other => Ok(WireValue::described(self.descriptor.clone(), other)),
        }
    }

    fn read_object(&self, body: &WireValue, input: &mut DeserializationInput<'_>) -> Result<Value> {
        let proxy = self.proxy.read_object(body, input)?;
        let record = proxy.as_record().ok_or_else(|| {
            SerializationError::decode(format!("{}: proxy did not decode to a record", self.custom.type_name()))
        })?;
        self.custom.from_proxy(record)
    }
}

#[derive(Debug)]
pub(crate) struct ExternalSerializerAdapter {
    external: Arc<dyn ExternalSerializer>,
    type_ref: TypeRef,
    descriptor: String,
    notation: TypeNotation,
}

impl ExternalSerializerAdapter {
    pub(crate) fn new(external: Arc<dyn ExternalSerializer>) -> Self {
        let type_name = external.type_name().to_string();
        let descriptor = descriptor_from_tokens(&[&type_name, BINARY_SOURCE]);
        let notation = TypeNotation::Restricted(RestrictedType {
            name: type_name.clone(),
            provides: Vec::new(),
            source: BINARY_SOURCE.to_string(),
            descriptor: descriptor.clone(),
            choices: Vec::new(),
        });
        ExternalSerializerAdapter {
            external,
            type_ref: TypeRef::named(type_name),
            descriptor,
            notation,
        }
    }
}

impl AmqpSerializer for ExternalSerializerAdapter {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn write_class_info(&self, output: &mut SerializationOutput<'_>) -> Result<()> {
        output.add_notation(self.notation.clone())
    }

    fn write_object(&self, value: &Value, _output: &mut SerializationOutput<'_>) -> Result<WireValue> {
        let bytes = self.external.to_bytes(value)?;
        Ok(WireValue::described(self.descriptor.clone(), WireValue::Binary(bytes)))
    }

    fn read_object(&self, body: &WireValue, _input: &mut DeserializationInput<'_>) -> Result<Value> {
        match body {
            WireValue::Binary(bytes) => self.external.from_bytes(bytes),
            other => Err(SerializationError::decode(format!(
                "{}: expected binary body, found {}",
                self.external.type_name(),
                other.label()
            ))),
        }
    }
}
