//! Composite evolution: a reader whose local type differs from the writer's.

use crate::common::*;
use ledgerwire::{ConstructorDescriptor, Parameter};

fn point_with(extra: TypeDescriptor) -> (SerializerFactory, SerializerFactory) {
    (open_factory(vec![point_v1()]), open_factory(vec![extra]))
}

fn sample(writer: &SerializerFactory) -> Value {
    record(writer, "net.example.Point", vec![Value::Int(3), Value::Int(4)])
}

#[test]
fn added_nullable_property_reads_as_null() {
    let (writer, reader) = point_with(
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::INT)
            .property("y", TypeRef::INT)
            .nullable_property("z", TypeRef::INT)
            .build(),
    );
    let decoded = transfer(&writer, &reader, &sample(&writer)).unwrap();
    assert_eq!(field(&decoded, "x"), &Value::Int(3));
    assert_eq!(field(&decoded, "z"), &Value::Null);
    assert_eq!(reader.stats().evolution_serializers_built, 1);
}

#[test]
fn added_defaulted_property_takes_default() {
    let (writer, reader) = point_with(
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::INT)
            .property("y", TypeRef::INT)
            .property("z", TypeRef::INT)
            .default_value("z", Value::Int(7))
            .build(),
    );
    let decoded = transfer(&writer, &reader, &sample(&writer)).unwrap();
    assert_eq!(field(&decoded, "z"), &Value::Int(7));
}

#[test]
fn added_mandatory_property_is_rejected() {
    let (writer, reader) = point_with(
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::INT)
            .property("y", TypeRef::INT)
            .property("z", TypeRef::INT)
            .build(),
    );
    match transfer(&writer, &reader, &sample(&writer)).unwrap_err() {
        SerializationError::NotSerializable { type_name, property, reason } => {
            assert_eq!(type_name, "net.example.Point");
            assert_eq!(property.as_deref(), Some("z"));
            assert!(reason.contains("mandatory"), "{}", reason);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn removed_property_is_dropped() {
    let (writer, reader) = point_with(
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::INT)
            .build(),
    );
    let decoded = transfer(&writer, &reader, &sample(&writer)).unwrap();
    assert_eq!(decoded.as_record().unwrap().fields(), &[Value::Int(3)]);
}

#[test]
fn changed_property_type_is_rejected() {
    let (writer, reader) = point_with(
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::LONG)
            .property("y", TypeRef::INT)
            .build(),
    );
    let err = transfer(&writer, &reader, &sample(&writer)).unwrap_err();
    assert!(err.is_not_serializable());
    assert!(err.to_string().contains("type changed"), "{}", err);
}

#[test]
fn alternate_constructor_is_chosen() {
    let alternate = ConstructorDescriptor::new(vec![
        Parameter::new("x", TypeRef::INT),
        Parameter::new("y", TypeRef::INT),
    ])
    .initialize("label", Value::string("unnamed"));
    let (writer, reader) = point_with(
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::INT)
            .property("y", TypeRef::INT)
            .property("label", TypeRef::STRING)
            .constructor(alternate)
            .build(),
    );
    let decoded = transfer(&writer, &reader, &sample(&writer)).unwrap();
    assert_eq!(field(&decoded, "y"), &Value::Int(4));
    assert_eq!(field(&decoded, "label"), &Value::string("unnamed"));
}

#[test]
fn nested_types_evolve_together() {
    let line = || {
        TypeDescriptor::composite("net.example.Line")
            .property("start", TypeRef::named("net.example.Point"))
            .property("end", TypeRef::named("net.example.Point"))
            .build()
    };
    let writer = open_factory(vec![point_v1(), line()]);
    let reader = open_factory(vec![
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::INT)
            .property("y", TypeRef::INT)
            .nullable_property("colour", TypeRef::STRING)
            .build(),
        line(),
    ]);
    let start = sample(&writer);
    let end = record(&writer, "net.example.Point", vec![Value::Int(9), Value::Int(9)]);
    let value = record(&writer, "net.example.Line", vec![start.clone(), start]);
    let decoded = transfer(&writer, &reader, &value).unwrap();
    assert_eq!(field(field(&decoded, "end"), "x"), &Value::Int(3));
    assert!(field(&decoded, "start").ptr_eq(field(&decoded, "end")));
    assert_eq!(reader.stats().evolution_serializers_built, 2);

    let other = record(&writer, "net.example.Line", vec![sample(&writer), end]);
    let decoded = transfer(&writer, &reader, &other).unwrap();
    assert_eq!(field(field(&decoded, "end"), "colour"), &Value::Null);
}

#[test]
fn evolved_values_are_local_instances() {
    let (writer, reader) = point_with(
        TypeDescriptor::composite("net.example.Point")
            .property("x", TypeRef::INT)
            .property("y", TypeRef::INT)
            .nullable_property("z", TypeRef::INT)
            .build(),
    );
    let decoded = transfer(&writer, &reader, &sample(&writer)).unwrap();
    let local = reader.class_path().get("net.example.Point").unwrap();
    assert!(std::sync::Arc::ptr_eq(decoded.as_record().unwrap().descriptor(), local));

    // The reader still writes its own layout.
    assert_eq!(round_trip(&reader, &decoded), decoded);
}
