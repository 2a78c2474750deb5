//! Allow-list and serializable-annotation enforcement.

use crate::common::*;
use std::sync::Arc;

fn annotated_person() -> TypeDescriptor {
    TypeDescriptor::composite("net.example.Person")
        .property("name", TypeRef::STRING)
        .property("age", TypeRef::INT)
        .nullable_property("friend", TypeRef::named("net.example.Person"))
        .serializable()
        .build()
}

fn alice(f: &SerializerFactory) -> Value {
    record(f, "net.example.Person", vec![Value::string("Alice"), Value::Int(30), Value::Null])
}

#[test]
fn empty_whitelist_rejects_unannotated_types() {
    let f = factory_with(vec![person()], Arc::new(EmptyWhitelist));
    let err = serialize(&f, &alice(&f)).unwrap_err();
    assert!(err.is_not_serializable());
    assert_eq!(err.type_name(), Some("net.example.Person"));
    assert!(err.to_string().contains("whitelist"), "{}", err);
}

#[test]
fn annotated_types_pass_an_empty_whitelist() {
    let f = factory_with(vec![annotated_person()], Arc::new(EmptyWhitelist));
    let value = alice(&f);
    assert_eq!(round_trip(&f, &value), value);
    assert!(f.stats().whitelist_queries >= 1);
}

#[test]
fn listed_types_are_accepted() {
    let f = factory_with(
        vec![person()],
        Arc::new(ListedWhitelist::new(["net.example.Person"])),
    );
    let value = alice(&f);
    assert_eq!(round_trip(&f, &value), value);
}

#[test]
fn unlisted_property_type_is_rejected() {
    let wrapper = TypeDescriptor::composite("net.example.Wrapper")
        .property("inner", TypeRef::named("net.example.Person"))
        .build();
    let f = factory_with(
        vec![person(), wrapper],
        Arc::new(ListedWhitelist::new(["net.example.Wrapper"])),
    );
    let value = record(&f, "net.example.Wrapper", vec![alice(&f)]);
    let err = serialize(&f, &value).unwrap_err();
    assert_eq!(err.type_name(), Some("net.example.Person"));
}

#[test]
fn reader_allow_list_applies_on_decode() {
    let writer = open_factory(vec![person()]);
    let reader = factory_with(vec![person()], Arc::new(EmptyWhitelist));
    let err = transfer(&writer, &reader, &alice(&writer)).unwrap_err();
    assert!(err.is_not_serializable());
    assert_eq!(err.type_name(), Some("net.example.Person"));
}

#[test]
fn annotation_is_inherited_through_interfaces() {
    let types = vec![
        TypeDescriptor::interface("net.example.Shape")
            .property("sides", TypeRef::INT)
            .serializable()
            .build(),
        TypeDescriptor::composite("net.example.Square")
            .property("sides", TypeRef::INT)
            .property("length", TypeRef::DOUBLE)
            .implements("net.example.Shape")
            .build(),
    ];
    let f = factory_with(types, Arc::new(EmptyWhitelist));
    let square = record(&f, "net.example.Square", vec![Value::Int(4), Value::Double(1.5)]);
    assert_eq!(round_trip(&f, &square), square);
}

#[test]
fn enums_are_checked_too() {
    let f = factory_with(vec![colour(&["RED", "GREEN"], vec![])], Arc::new(EmptyWhitelist));
    let red = constant(&f, "net.example.Colour", "RED");
    assert!(serialize(&f, &red).unwrap_err().is_not_serializable());

    let annotated = TypeDescriptor::enumeration("net.example.Colour", &["RED", "GREEN"])
        .serializable()
        .build();
    let f = factory_with(vec![annotated], Arc::new(EmptyWhitelist));
    let red = constant(&f, "net.example.Colour", "RED");
    assert_eq!(round_trip(&f, &red), red);
}
