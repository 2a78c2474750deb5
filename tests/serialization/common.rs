//! Shared fixtures for the serialization suite.

#![allow(dead_code)]

use std::sync::{Arc, Once};

pub use ledgerwire::{
    AllWhitelist, ClassPath, ClassWhitelist, DeserializationInput, EmptyWhitelist, ListedWhitelist,
    Record, SerializationConfig, SerializationError, SerializationOutput, SerializerFactory,
    Transform, TypeDescriptor, TypeRef, Value,
};

static INIT_TRACING: Once = Once::new();

/// Route engine logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Factories
// ============================================================================

pub fn class_path(types: Vec<TypeDescriptor>) -> Arc<ClassPath> {
    let mut cp = ClassPath::new();
    for ty in types {
        cp.register(ty).unwrap();
    }
    Arc::new(cp)
}

/// Factory over `types` that allows everything.
pub fn open_factory(types: Vec<TypeDescriptor>) -> SerializerFactory {
    init_tracing();
    SerializerFactory::new(class_path(types), Arc::new(AllWhitelist))
}

pub fn factory_with(types: Vec<TypeDescriptor>, whitelist: Arc<dyn ClassWhitelist>) -> SerializerFactory {
    init_tracing();
    SerializerFactory::new(class_path(types), whitelist)
}

pub fn serialize(factory: &SerializerFactory, value: &Value) -> Result<Vec<u8>, SerializationError> {
    SerializationOutput::new(factory).serialize(value)
}

pub fn deserialize(factory: &SerializerFactory, bytes: &[u8]) -> Result<Value, SerializationError> {
    DeserializationInput::new(factory).deserialize(bytes)
}

/// Encode with `writer`, decode with `reader`.
pub fn transfer(
    writer: &SerializerFactory,
    reader: &SerializerFactory,
    value: &Value,
) -> Result<Value, SerializationError> {
    let bytes = serialize(writer, value)?;
    deserialize(reader, &bytes)
}

pub fn round_trip(factory: &SerializerFactory, value: &Value) -> Value {
    let bytes = serialize(factory, value).unwrap();
    deserialize(factory, &bytes).unwrap()
}

// ============================================================================
// Values
// ============================================================================

/// Record of the named type on the factory's class path.
pub fn record(factory: &SerializerFactory, type_name: &str, fields: Vec<Value>) -> Value {
    let ty = factory.class_path().get(type_name).unwrap().clone();
    Value::record(Record::new(ty, fields).unwrap())
}

pub fn constant(factory: &SerializerFactory, type_name: &str, name: &str) -> Value {
    let ty = factory.class_path().get(type_name).unwrap().clone();
    Value::Enum(ledgerwire::EnumValue::new(ty, name).unwrap())
}

pub fn field<'a>(value: &'a Value, name: &str) -> &'a Value {
    value.as_record().unwrap().get(name).unwrap()
}

pub fn items(value: &Value) -> Vec<Value> {
    value.as_collection().unwrap().items().unwrap().to_vec()
}

// ============================================================================
// Types
// ============================================================================

pub fn person() -> TypeDescriptor {
    TypeDescriptor::composite("net.example.Person")
        .property("name", TypeRef::STRING)
        .property("age", TypeRef::INT)
        .nullable_property("friend", TypeRef::named("net.example.Person"))
        .build()
}

pub fn colour(constants: &[&str], transforms: Vec<Transform>) -> TypeDescriptor {
    let mut b = TypeDescriptor::enumeration("net.example.Colour", constants);
    for t in transforms {
        b = b.transform(t);
    }
    b.build()
}

pub fn point_v1() -> TypeDescriptor {
    TypeDescriptor::composite("net.example.Point")
        .property("x", TypeRef::INT)
        .property("y", TypeRef::INT)
        .build()
}
