//! Enum evolution through renames and defaults.

use crate::common::*;
use ledgerwire::{Envelope, TransformSet};

fn holder() -> TypeDescriptor {
    TypeDescriptor::composite("net.example.Paint")
        .property("colour", TypeRef::named("net.example.Colour"))
        .build()
}

fn paint(f: &SerializerFactory, name: &str) -> Value {
    let c = constant(f, "net.example.Colour", name);
    record(f, "net.example.Paint", vec![c])
}

fn decoded_colour(value: &Value) -> String {
    field(value, "colour").as_enum().unwrap().name().to_string()
}

#[test]
fn enum_round_trips_with_transforms_section() {
    let f = open_factory(vec![
        colour(&["RED", "GREEN", "BLUE"], vec![Transform::enum_default("BLUE", "GREEN")]),
        holder(),
    ]);
    let value = paint(&f, "BLUE");
    let out = SerializationOutput::new(&f).serialize_and_return_schema(&value).unwrap();
    assert!(out.transforms_schema.get("net.example.Colour").is_some());
    assert_eq!(deserialize(&f, &out.bytes).unwrap(), value);
}

#[test]
fn writer_default_maps_unknown_constant() {
    let writer = open_factory(vec![
        colour(
            &["RED", "GREEN", "BLUE", "PINK"],
            vec![Transform::enum_default("PINK", "BLUE")],
        ),
        holder(),
    ]);
    let reader = open_factory(vec![colour(&["RED", "GREEN", "BLUE"], vec![]), holder()]);
    let decoded = transfer(&writer, &reader, &paint(&writer, "PINK")).unwrap();
    assert_eq!(decoded_colour(&decoded), "BLUE");
    let decoded = transfer(&writer, &reader, &paint(&writer, "GREEN")).unwrap();
    assert_eq!(decoded_colour(&decoded), "GREEN");
}

#[test]
fn chained_defaults_are_followed() {
    let writer = open_factory(vec![
        colour(
            &["A", "B", "C", "D", "E"],
            vec![Transform::enum_default("E", "D"), Transform::enum_default("D", "C")],
        ),
        holder(),
    ]);
    let reader = open_factory(vec![colour(&["A", "B", "C"], vec![]), holder()]);
    let decoded = transfer(&writer, &reader, &paint(&writer, "E")).unwrap();
    assert_eq!(decoded_colour(&decoded), "C");
}

#[test]
fn reader_rename_reads_old_constant() {
    let writer = open_factory(vec![colour(&["RED", "GREEN"], vec![]), holder()]);
    let reader = open_factory(vec![
        colour(&["RED", "LIME"], vec![Transform::rename("GREEN", "LIME")]),
        holder(),
    ]);
    let decoded = transfer(&writer, &reader, &paint(&writer, "GREEN")).unwrap();
    assert_eq!(decoded_colour(&decoded), "LIME");
}

#[test]
fn writer_rename_reads_new_constant() {
    let writer = open_factory(vec![
        colour(&["RED", "LIME"], vec![Transform::rename("GREEN", "LIME")]),
        holder(),
    ]);
    let reader = open_factory(vec![colour(&["RED", "GREEN"], vec![]), holder()]);
    let decoded = transfer(&writer, &reader, &paint(&writer, "LIME")).unwrap();
    assert_eq!(decoded_colour(&decoded), "GREEN");
}

#[test]
fn cyclic_renames_fail_before_encoding() {
    let f = open_factory(vec![
        colour(
            &["RED", "GREEN"],
            vec![Transform::rename("BLUE", "CYAN"), Transform::rename("CYAN", "BLUE")],
        ),
        holder(),
    ]);
    let value = paint(&f, "RED");
    let mut output = SerializationOutput::new(&f);
    let err = output.serialize_and_return_schema(&value).unwrap_err();
    assert!(err.is_not_serializable());
    assert_eq!(err.type_name(), Some("net.example.Colour"));
}

#[test]
fn unmappable_constant_fails_only_when_read() {
    let writer = open_factory(vec![colour(&["RED", "GREEN", "BLUE"], vec![]), holder()]);
    let reader = open_factory(vec![colour(&["RED", "GREEN"], vec![]), holder()]);

    let decoded = transfer(&writer, &reader, &paint(&writer, "RED")).unwrap();
    assert_eq!(decoded_colour(&decoded), "RED");

    match transfer(&writer, &reader, &paint(&writer, "BLUE")).unwrap_err() {
        SerializationError::NotSerializable { property, .. } => {
            assert_eq!(property.as_deref(), Some("BLUE"))
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn reordered_constants_are_rejected() {
    let writer = open_factory(vec![colour(&["RED", "GREEN"], vec![]), holder()]);
    let reader = open_factory(vec![colour(&["GREEN", "RED"], vec![]), holder()]);
    let err = transfer(&writer, &reader, &paint(&writer, "RED")).unwrap_err();
    assert!(err.is_not_serializable());
    assert!(err.to_string().contains("ordinal"), "{}", err);
}

#[test]
fn wire_transforms_are_honoured_per_payload() {
    let reader = open_factory(vec![colour(&["A", "B"], vec![]), holder()]);
    let first = open_factory(vec![
        colour(&["A", "B", "C"], vec![Transform::enum_default("C", "A")]),
        holder(),
    ]);
    let second = open_factory(vec![
        colour(&["A", "B", "C"], vec![Transform::enum_default("C", "B")]),
        holder(),
    ]);

    let decoded = transfer(&first, &reader, &paint(&first, "C")).unwrap();
    assert_eq!(decoded_colour(&decoded), "A");
    let decoded = transfer(&second, &reader, &paint(&second, "C")).unwrap();
    assert_eq!(decoded_colour(&decoded), "B");
    let decoded = transfer(&first, &reader, &paint(&first, "C")).unwrap();
    assert_eq!(decoded_colour(&decoded), "A");

    // Paint once, Colour once per distinct set of wire transforms.
    assert_eq!(reader.stats().evolution_serializers_built, 3);
}

/// Encode `constant` and attach a transform kind no reader understands.
fn with_unknown_transform(writer: &SerializerFactory, constant: &str) -> Vec<u8> {
    let bytes = serialize(writer, &paint(writer, constant)).unwrap();
    let mut env = Envelope::from_bytes(&bytes, usize::MAX).unwrap();
    let unknown = Transform::Unknown {
        tag: "split".into(),
        args: vec!["C".into(), "C1".into(), "C2".into()],
    };
    env.transforms_schema.insert(
        "net.example.Colour",
        TransformSet::from_declared("net.example.Colour", &[unknown]).unwrap(),
    );
    env.to_bytes().unwrap()
}

#[test]
fn unknown_transform_only_blocks_constants_it_could_affect() {
    let writer = open_factory(vec![colour(&["A", "B", "C"], vec![]), holder()]);
    let reader = open_factory(vec![colour(&["A", "B"], vec![]), holder()]);

    let decoded = deserialize(&reader, &with_unknown_transform(&writer, "A")).unwrap();
    assert_eq!(decoded_colour(&decoded), "A");

    let err = deserialize(&reader, &with_unknown_transform(&writer, "C")).unwrap_err();
    assert!(err.is_not_serializable(), "{}", err);
    assert!(err.to_string().contains("does not understand"), "{}", err);
}
