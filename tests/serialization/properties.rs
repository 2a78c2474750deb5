//! Property tests over generated values and corrupted envelopes.

use crate::common::*;
use proptest::prelude::*;
use proptest::sample::Index;

fn row() -> TypeDescriptor {
    TypeDescriptor::composite("net.example.Row")
        .property("id", TypeRef::LONG)
        .property("label", TypeRef::STRING)
        .property("tags", TypeRef::list(TypeRef::STRING))
        .nullable_property("note", TypeRef::STRING)
        .property("flags", TypeRef::map(TypeRef::STRING, TypeRef::BOOLEAN))
        .build()
}

fn make_row(
    f: &SerializerFactory,
    id: i64,
    label: String,
    tags: Vec<String>,
    note: Option<String>,
    flags: Vec<(String, bool)>,
) -> Value {
    record(
        f,
        "net.example.Row",
        vec![
            Value::Long(id),
            Value::string(label),
            Value::list(tags.into_iter().map(Value::string).collect()),
            note.map(Value::string).unwrap_or(Value::Null),
            Value::map(
                flags
                    .into_iter()
                    .map(|(k, v)| (Value::string(k), Value::Bool(v)))
                    .collect(),
            ),
        ],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_rows_round_trip(
        id in any::<i64>(),
        label in "[a-zA-Z0-9 ]{0,16}",
        tags in prop::collection::vec("[a-z]{1,6}", 0..5),
        note in proptest::option::of("[a-z]{0,8}"),
        flags in prop::collection::btree_map("[a-z]{1,4}", any::<bool>(), 0..4),
    ) {
        let writer = open_factory(vec![row()]);
        let reader = open_factory(vec![row()]);
        let value = make_row(&writer, id, label, tags, note, flags.into_iter().collect());
        let decoded = transfer(&writer, &reader, &value).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn any_single_byte_corruption_is_detected(at in any::<Index>(), mask in 1u8..=255) {
        let f = open_factory(vec![row()]);
        let value = make_row(
            &f,
            42,
            "row".to_string(),
            vec!["a".to_string(), "b".to_string()],
            None,
            vec![("on".to_string(), true)],
        );
        let mut bytes = serialize(&f, &value).unwrap();
        let i = at.index(bytes.len());
        bytes[i] ^= mask;
        prop_assert!(deserialize(&f, &bytes).is_err());
    }
}
