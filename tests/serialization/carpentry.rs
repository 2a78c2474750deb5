//! Decoding payloads whose types the reader does not have.

use crate::common::*;
use ledgerwire::{CarpenterError, ClassCarpenter, TypeNotation, TypeSynthesizer};
use std::sync::Arc;
use uuid::Uuid;

fn remote_types() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::interface("net.remote.Sized")
            .property("size", TypeRef::INT)
            .build(),
        TypeDescriptor::composite("net.remote.Gadget")
            .property("size", TypeRef::INT)
            .nullable_property("label", TypeRef::STRING)
            .property("parts", TypeRef::list(TypeRef::named("net.remote.Part")))
            .implements("net.remote.Sized")
            .build(),
        TypeDescriptor::composite("net.remote.Part")
            .property("serial", TypeRef::LONG)
            .build(),
    ]
}

fn gadget(writer: &SerializerFactory) -> Value {
    let part = record(writer, "net.remote.Part", vec![Value::Long(77)]);
    record(
        writer,
        "net.remote.Gadget",
        vec![Value::Int(5), Value::string("widget"), Value::list(vec![part])],
    )
}

#[test]
fn unknown_types_are_synthesized() {
    let writer = open_factory(remote_types());
    let reader = open_factory(vec![]);
    let decoded = transfer(&writer, &reader, &gadget(&writer)).unwrap();

    let gadget = decoded.as_record().unwrap();
    assert_eq!(gadget.type_name(), "net.remote.Gadget");
    assert!(gadget.descriptor().is_synthesized());
    assert_eq!(gadget.get("size"), Some(&Value::Int(5)));
    let parts = items(gadget.get("parts").unwrap());
    assert_eq!(field(&parts[0], "serial"), &Value::Long(77));

    assert!(reader.is_assignable(&decoded, &TypeRef::named("net.remote.Sized")));
    assert_eq!(reader.stats().types_synthesized, 3);
}

#[test]
fn synthesized_types_are_shared_within_a_factory() {
    let writer = open_factory(remote_types());
    let reader = open_factory(vec![]);
    let bytes = serialize(&writer, &gadget(&writer)).unwrap();

    let first = deserialize(&reader, &bytes).unwrap();
    let second = deserialize(&reader, &bytes).unwrap();
    assert!(first
        .as_record()
        .unwrap()
        .same_runtime_type(second.as_record().unwrap()));
    assert_eq!(first, second);
    assert_eq!(reader.stats().types_synthesized, 3);
}

#[test]
fn synthesized_types_differ_across_factories() {
    let writer = open_factory(remote_types());
    let bytes = serialize(&writer, &gadget(&writer)).unwrap();

    let a = deserialize(&open_factory(vec![]), &bytes).unwrap();
    let b = deserialize(&open_factory(vec![]), &bytes).unwrap();
    assert!(!a.as_record().unwrap().same_runtime_type(b.as_record().unwrap()));
    assert_eq!(a, b);
}

#[test]
fn synthesized_values_serialize_back_identically() {
    let writer = open_factory(remote_types());
    let relay = open_factory(vec![]);
    let original = gadget(&writer);
    let relayed = transfer(&writer, &relay, &original).unwrap();

    // The relay writes the same descriptors, so the origin reads its own types.
    let back = transfer(&relay, &writer, &relayed).unwrap();
    assert_eq!(back, original);
    let local = writer.class_path().get("net.remote.Gadget").unwrap();
    assert!(Arc::ptr_eq(back.as_record().unwrap().descriptor(), local));
    assert_eq!(writer.stats().evolution_serializers_built, 0);
}

#[test]
fn self_referencing_unknown_type_is_synthesized() {
    let writer = open_factory(vec![TypeDescriptor::composite("net.remote.Node")
        .property("value", TypeRef::INT)
        .nullable_property("next", TypeRef::named("net.remote.Node"))
        .build()]);
    let tail = record(&writer, "net.remote.Node", vec![Value::Int(2), Value::Null]);
    let head = record(&writer, "net.remote.Node", vec![Value::Int(1), tail]);

    let decoded = transfer(&writer, &open_factory(vec![]), &head).unwrap();
    assert_eq!(field(field(&decoded, "next"), "value"), &Value::Int(2));
}

#[test]
fn carpentry_can_be_disabled() {
    let writer = open_factory(remote_types());
    let config = SerializationConfig {
        carpenter_enabled: false,
        ..SerializationConfig::default()
    };
    let reader = SerializerFactory::with_config(class_path(vec![]), Arc::new(AllWhitelist), config);
    let err = transfer(&writer, &reader, &gadget(&writer)).unwrap_err();
    assert!(err.is_not_serializable());
    assert_eq!(reader.stats().types_synthesized, 0);
}

#[test]
fn partially_known_payload_mixes_local_and_synthesized() {
    let writer = open_factory(remote_types());
    let reader = open_factory(vec![TypeDescriptor::composite("net.remote.Part")
        .property("serial", TypeRef::LONG)
        .build()]);
    let decoded = transfer(&writer, &reader, &gadget(&writer)).unwrap();
    let parts = items(field(&decoded, "parts"));
    let local_part = reader.class_path().get("net.remote.Part").unwrap();
    assert!(Arc::ptr_eq(parts[0].as_record().unwrap().descriptor(), local_part));
    assert!(decoded.as_record().unwrap().descriptor().is_synthesized());
    assert_eq!(reader.stats().types_synthesized, 2);
}

/// Synthesizer that refuses every notation.
#[derive(Debug)]
struct Refusing {
    capability: bool,
}

impl TypeSynthesizer for Refusing {
    fn synthesize(&self, notation: &TypeNotation, _namespace: Uuid) -> Result<TypeDescriptor, CarpenterError> {
        let name = notation.name().to_string();
        Err(if self.capability {
            CarpenterError::CapabilityMismatch {
                name,
                interface: "net.remote.Sized".into(),
                reason: "size is missing".into(),
            }
        } else {
            CarpenterError::CannotSynthesize {
                name,
                reason: "no layout for this notation".into(),
            }
        })
    }
}

fn refusing_reader(capability: bool) -> SerializerFactory {
    open_factory(vec![])
        .with_carpenter(ClassCarpenter::with_synthesizer(Arc::new(Refusing { capability })))
}

#[test]
fn synthesizer_failure_is_not_serializable() {
    let writer = open_factory(remote_types());

    let reader = refusing_reader(false);
    let err = transfer(&writer, &reader, &gadget(&writer)).unwrap_err();
    assert!(err.is_not_serializable(), "{}", err);
    assert!(err.to_string().contains("cannot synthesize"), "{}", err);
    assert!(err.type_name().unwrap().starts_with("net.remote."));
    assert_eq!(reader.stats().types_synthesized, 0);

    let reader = refusing_reader(true);
    let err = transfer(&writer, &reader, &gadget(&writer)).unwrap_err();
    assert!(err.is_not_serializable(), "{}", err);
    assert!(err.to_string().contains("does not satisfy interface net.remote.Sized"), "{}", err);
}
