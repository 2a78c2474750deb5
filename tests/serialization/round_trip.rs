//! Round trips through a single factory: aliasing, collections, primitives,
//! singletons, polymorphic properties and the rejections the encoder makes
//! before any bytes are produced.

use crate::common::*;
use chrono::{TimeZone, Utc};
use ledgerwire::{CollectionKind, CollectionValue, Elements, TypeNotation};
use std::sync::Arc;

// ============================================================================
// Aliasing
// ============================================================================

#[test]
fn shared_objects_stay_shared() {
    let f = open_factory(vec![person()]);
    let alice = record(&f, "net.example.Person", vec![Value::string("alice"), Value::Int(30), Value::Null]);
    let bob = record(&f, "net.example.Person", vec![Value::string("bob"), Value::Int(41), alice.clone()]);
    let group = Value::list(vec![alice.clone(), bob, alice]);

    let decoded = round_trip(&f, &group);
    assert_eq!(decoded, group);

    let members = items(&decoded);
    assert!(members[0].ptr_eq(&members[2]));
    assert!(field(&members[1], "friend").ptr_eq(&members[0]));
}

#[test]
fn references_can_be_switched_off() {
    let f = open_factory(vec![person()]);
    let alice = record(&f, "net.example.Person", vec![Value::string("alice"), Value::Int(30), Value::Null]);
    let pair = Value::list(vec![alice.clone(), alice]);

    let bytes = SerializationOutput::new(&f)
        .with_object_references(false)
        .serialize(&pair)
        .unwrap();
    let members = items(&deserialize(&f, &bytes).unwrap());
    assert!(!members[0].ptr_eq(&members[1]));
    assert_eq!(members[0], members[1]);
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn schema_holds_one_notation_per_type() {
    let f = open_factory(vec![person()]);
    let alice = record(&f, "net.example.Person", vec![Value::string("alice"), Value::Int(30), Value::Null]);
    let bob = record(&f, "net.example.Person", vec![Value::string("bob"), Value::Int(41), Value::Null]);
    let group = Value::list(vec![alice, bob]);

    let mut output = SerializationOutput::new(&f);
    let first = output.serialize_and_return_schema(&group).unwrap();
    let second = output.serialize_and_return_schema(&group).unwrap();

    let names: Vec<&str> = first.schema.types().iter().map(TypeNotation::name).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"net.example.Person"));
    assert!(names.contains(&"list<*>"));
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.schema, second.schema);
}

#[test]
fn descriptors_are_stable_across_factories() {
    let a = open_factory(vec![person()]);
    let b = open_factory(vec![person()]);
    let ty = TypeRef::named("net.example.Person");
    assert_eq!(a.descriptor_for(&ty).unwrap(), b.descriptor_for(&ty).unwrap());

    let value = record(&a, "net.example.Person", vec![Value::string("x"), Value::Int(1), Value::Null]);
    let decoded = transfer(&a, &b, &value).unwrap();
    assert_eq!(decoded, value);
    assert_eq!(b.stats().evolution_serializers_built, 0);
}

// ============================================================================
// Collections and primitives
// ============================================================================

fn inventory() -> TypeDescriptor {
    TypeDescriptor::composite("net.example.Inventory")
        .property("counts", TypeRef::map(TypeRef::STRING, TypeRef::INT))
        .property("tags", TypeRef::set(TypeRef::STRING))
        .property("readings", TypeRef::array(TypeRef::DOUBLE))
        .property("notes", TypeRef::list(TypeRef::STRING))
        .build()
}

#[test]
fn sanctioned_collections_round_trip() {
    let f = open_factory(vec![inventory()]);
    let value = record(
        &f,
        "net.example.Inventory",
        vec![
            Value::map(vec![
                (Value::string("apples"), Value::Int(3)),
                (Value::string("pears"), Value::Int(0)),
            ]),
            Value::Collection(Arc::new(CollectionValue::set(vec![Value::string("fresh")]))),
            Value::Collection(Arc::new(CollectionValue::array(vec![Value::Double(1.5), Value::Double(-2.0)]))),
            Value::list(vec![Value::string("a"), Value::Null]),
        ],
    );
    let decoded = round_trip(&f, &value);
    assert_eq!(decoded, value);
    let counts = field(&decoded, "counts").as_collection().unwrap();
    assert_eq!(counts.kind(), CollectionKind::Map);
    assert_eq!(counts.entries().unwrap()[0].0, Value::string("apples"));
}

#[test]
fn null_in_primitive_array_is_rejected() {
    let f = open_factory(vec![inventory()]);
    let value = record(
        &f,
        "net.example.Inventory",
        vec![
            Value::map(vec![]),
            Value::Collection(Arc::new(CollectionValue::set(vec![]))),
            Value::Collection(Arc::new(CollectionValue::array(vec![Value::Double(1.0), Value::Null]))),
            Value::list(vec![]),
        ],
    );
    let err = serialize(&f, &value).unwrap_err();
    assert!(err.is_not_serializable());
}

#[test]
fn unordered_collections_are_rejected() {
    let f = open_factory(vec![TypeDescriptor::composite("net.example.Bag")
        .property("items", TypeRef::Collection(CollectionKind::HashSet, vec![TypeRef::STRING]))
        .build()]);
    let bag = CollectionValue::new(CollectionKind::HashSet, Elements::Sequence(vec![])).unwrap();
    let value = record(&f, "net.example.Bag", vec![Value::Collection(Arc::new(bag))]);
    let err = serialize(&f, &value).unwrap_err();
    assert!(err.is_not_serializable());
    assert!(err.to_string().contains("hash_set"));
}

#[test]
fn every_primitive_round_trips() {
    let f = open_factory(vec![TypeDescriptor::composite("net.example.Everything")
        .property("flag", TypeRef::BOOLEAN)
        .property("tiny", TypeRef::BYTE)
        .property("small", TypeRef::SHORT)
        .property("count", TypeRef::INT)
        .property("big", TypeRef::LONG)
        .property("ratio", TypeRef::FLOAT)
        .property("precise", TypeRef::DOUBLE)
        .property("letter", TypeRef::CHAR)
        .property("text", TypeRef::STRING)
        .property("blob", TypeRef::BINARY)
        .property("at", TypeRef::TIMESTAMP)
        .property("id", TypeRef::UUID)
        .build()]);
    let at = Utc.timestamp_opt(1_650_000_000, 250_000_000).single().unwrap();
    let value = record(
        &f,
        "net.example.Everything",
        vec![
            Value::Bool(true),
            Value::Byte(-8),
            Value::Short(512),
            Value::Int(-70_000),
            Value::Long(i64::MAX),
            Value::Float(0.25),
            Value::Double(6.02e23),
            Value::Char('é'),
            Value::string("ünïcode"),
            Value::Binary(vec![0, 255, 7]),
            Value::Timestamp(at),
            Value::Uuid(uuid::Uuid::new_v4()),
        ],
    );
    assert_eq!(round_trip(&f, &value), value);
}

#[test]
fn bare_primitive_root_round_trips() {
    let f = open_factory(vec![]);
    let out = SerializationOutput::new(&f)
        .serialize_and_return_schema(&Value::Long(9))
        .unwrap();
    assert!(out.schema.is_empty());
    assert_eq!(deserialize(&f, &out.bytes).unwrap(), Value::Long(9));
}

#[test]
fn declared_property_type_is_enforced() {
    let f = open_factory(vec![TypeDescriptor::composite("net.example.Loose")
        .property("anything", TypeRef::Any)
        .property("count", TypeRef::INT)
        .build()]);
    let ok = record(&f, "net.example.Loose", vec![Value::string("free"), Value::Int(1)]);
    assert_eq!(round_trip(&f, &ok), ok);

    let ty = f.class_path().get("net.example.Loose").unwrap().clone();
    // Record::new checks nullability only; the encoder checks declared types.
    let wrong = Value::record(Record::new(ty, vec![Value::Int(1), Value::string("one")]).unwrap());
    assert!(serialize(&f, &wrong).unwrap_err().is_not_serializable());
}

// ============================================================================
// Singletons and polymorphism
// ============================================================================

#[test]
fn singleton_decodes_to_shared_instance() {
    let f = open_factory(vec![TypeDescriptor::composite("net.example.Empty").singleton().build()]);
    let instance = f.class_path().singleton_value("net.example.Empty").unwrap();
    let decoded = round_trip(&f, &instance);
    assert!(decoded.ptr_eq(&instance));
}

fn shapes() -> Vec<TypeDescriptor> {
    vec![
        TypeDescriptor::interface("net.example.Shape")
            .property("area", TypeRef::DOUBLE)
            .build(),
        TypeDescriptor::composite("net.example.Circle")
            .property("area", TypeRef::DOUBLE)
            .property("radius", TypeRef::DOUBLE)
            .implements("net.example.Shape")
            .build(),
        TypeDescriptor::composite("net.example.Drawing")
            .nullable_property("shape", TypeRef::named("net.example.Shape"))
            .build(),
    ]
}

#[test]
fn interface_property_holds_implementation() {
    let f = open_factory(shapes());
    let circle = record(&f, "net.example.Circle", vec![Value::Double(3.14), Value::Double(1.0)]);
    let drawing = record(&f, "net.example.Drawing", vec![circle]);
    let out = SerializationOutput::new(&f).serialize_and_return_schema(&drawing).unwrap();
    assert!(out.schema.get("net.example.Shape").is_some());
    assert!(out.schema.get("net.example.Circle").is_some());

    let decoded = deserialize(&f, &out.bytes).unwrap();
    assert_eq!(decoded, drawing);
    assert_eq!(
        field(&decoded, "shape").as_record().unwrap().type_name(),
        "net.example.Circle"
    );

    let empty = record(&f, "net.example.Drawing", vec![Value::Null]);
    assert_eq!(round_trip(&f, &empty), empty);
}

#[test]
fn root_type_can_be_required() {
    let f = open_factory(shapes());
    let circle = record(&f, "net.example.Circle", vec![Value::Double(1.0), Value::Double(0.5)]);
    let bytes = serialize(&f, &circle).unwrap();
    let as_shape = DeserializationInput::new(&f)
        .deserialize_as(&bytes, &TypeRef::named("net.example.Shape"))
        .unwrap();
    assert_eq!(as_shape, circle);
    let err = DeserializationInput::new(&f)
        .deserialize_as(&bytes, &TypeRef::named("net.example.Drawing"))
        .unwrap_err();
    assert!(err.is_not_serializable());
}

// ============================================================================
// Type validation
// ============================================================================

#[test]
fn private_property_is_rejected_and_getter_accepted() {
    let f = open_factory(vec![
        TypeDescriptor::composite("net.example.Vault")
            .property("label", TypeRef::STRING)
            .private_property("pin", TypeRef::INT)
            .build(),
        TypeDescriptor::composite("net.example.Account")
            .getter_property("balance", TypeRef::LONG)
            .build(),
    ]);
    let vault = record(&f, "net.example.Vault", vec![Value::string("v"), Value::Int(1234)]);
    match serialize(&f, &vault).unwrap_err() {
        SerializationError::NotSerializable { type_name, property, .. } => {
            assert_eq!(type_name, "net.example.Vault");
            assert_eq!(property.as_deref(), Some("pin"));
        }
        other => panic!("unexpected error {:?}", other),
    }

    let account = record(&f, "net.example.Account", vec![Value::Long(100)]);
    assert_eq!(round_trip(&f, &account), account);
}

#[test]
fn constructor_must_match_properties() {
    let f = open_factory(vec![TypeDescriptor::composite("net.example.Odd")
        .property("a", TypeRef::INT)
        .primary_constructor(&["a", "b"])
        .build()]);
    let value = record(&f, "net.example.Odd", vec![Value::Int(1)]);
    match serialize(&f, &value).unwrap_err() {
        SerializationError::NotSerializable { property, .. } => assert_eq!(property.as_deref(), Some("b")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn mutable_constructor_parameter_gets_mutable_collection() {
    let f = open_factory(vec![TypeDescriptor::composite("net.example.Basket")
        .property("items", TypeRef::list(TypeRef::STRING))
        .mutable("items")
        .build()]);
    let value = record(&f, "net.example.Basket", vec![Value::list(vec![Value::string("egg")])]);
    let decoded = round_trip(&f, &value);
    assert_eq!(decoded, value);
    assert!(field(&decoded, "items").as_collection().unwrap().is_mutable());
}

// ============================================================================
// Generics
// ============================================================================

fn holder() -> TypeDescriptor {
    TypeDescriptor::composite("net.x.Holder")
        .type_param("T")
        .property("value", TypeRef::named("T"))
        .build()
}

fn crate_of_holders() -> TypeDescriptor {
    TypeDescriptor::composite("net.x.Crate")
        .property("held", TypeRef::generic("net.x.Holder", vec![TypeRef::INT]))
        .nullable_property("loose", TypeRef::named("net.x.Holder"))
        .build()
}

#[test]
fn generic_instances_are_named_after_their_arguments() {
    let f = open_factory(vec![holder(), crate_of_holders()]);
    let held = record(&f, "net.x.Holder", vec![Value::Int(7)]);
    let loose = record(&f, "net.x.Holder", vec![Value::string("free")]);
    let value = record(&f, "net.x.Crate", vec![held, loose]);

    let written = SerializationOutput::new(&f).serialize_and_return_schema(&value).unwrap();
    let names: Vec<&str> = written.schema.types().iter().map(TypeNotation::name).collect();
    assert!(names.contains(&"net.x.Holder<int>"), "{:?}", names);
    assert!(names.contains(&"net.x.Holder<*>"), "{:?}", names);

    let ints = f.descriptor_for(&TypeRef::generic("net.x.Holder", vec![TypeRef::INT])).unwrap();
    let strings = f.descriptor_for(&TypeRef::generic("net.x.Holder", vec![TypeRef::STRING])).unwrap();
    assert_ne!(ints, strings);

    assert_eq!(deserialize(&f, &written.bytes).unwrap(), value);
}

#[test]
fn generic_instance_is_synthesized_under_its_applied_name() {
    let writer = open_factory(vec![holder(), crate_of_holders()]);
    let reader = open_factory(vec![]);
    let held = record(&writer, "net.x.Holder", vec![Value::Int(7)]);
    let value = record(&writer, "net.x.Crate", vec![held, Value::Null]);

    let decoded = transfer(&writer, &reader, &value).unwrap();
    let held = field(&decoded, "held").as_record().unwrap();
    assert_eq!(held.type_name(), "net.x.Holder<int>");
    assert!(held.descriptor().is_synthesized());
    assert_eq!(held.get("value"), Some(&Value::Int(7)));
}

#[test]
fn generic_type_rejects_wrong_argument_count() {
    let f = open_factory(vec![holder()]);
    let err = f
        .get_declared(&TypeRef::generic("net.x.Holder", vec![TypeRef::INT, TypeRef::INT]))
        .unwrap_err();
    assert!(err.is_not_serializable());
    assert!(err.to_string().contains("takes 1 type argument(s), found 2"), "{}", err);
}
