//! Custom (proxy) and external serializers.

use crate::common::*;
use ledgerwire::{
    ExternalSerializer, ProxySerializer, Result, SerializationContext, SerializationScheme,
    TypeNotation, UseCase,
};
use std::sync::Arc;

const MONEY: &str = "net.example.Money";
const MONEY_PROXY: &str = "net.example.MoneyProxy";

/// Money keeps its amount private, so only a custom serializer can write it.
fn money() -> TypeDescriptor {
    TypeDescriptor::composite(MONEY)
        .private_property("cents", TypeRef::LONG)
        .build()
}

fn money_proxy() -> Arc<TypeDescriptor> {
    Arc::new(
        TypeDescriptor::composite(MONEY_PROXY)
            .property("text", TypeRef::STRING)
            .build(),
    )
}

fn money_serializer(money: Arc<TypeDescriptor>) -> Arc<ProxySerializer> {
    let proxy = money_proxy();
    let proxy_ty = proxy.clone();
    Arc::new(ProxySerializer::new(
        MONEY,
        proxy,
        move |record| {
            let cents = match record.get("cents") {
                Some(Value::Long(c)) => *c,
                _ => return Err(SerializationError::not_serializable(MONEY, "cents missing")),
            };
            Record::new(
                proxy_ty.clone(),
                vec![Value::string(format!("{}.{:02}", cents / 100, cents % 100))],
            )
        },
        move |proxy| {
            let text = proxy.get("text").and_then(Value::as_str).unwrap_or_default();
            let (units, fraction) = text
                .split_once('.')
                .ok_or_else(|| SerializationError::decode(format!("bad amount {}", text)))?;
            let parse = |s: &str| {
                s.parse::<i64>()
                    .map_err(|e| SerializationError::decode(format!("bad amount {}: {}", text, e)))
            };
            let cents = parse(units)? * 100 + parse(fraction)?;
            Ok(Value::record(Record::new(money.clone(), vec![Value::Long(cents)])?))
        },
    ))
}

fn money_factory() -> SerializerFactory {
    let f = open_factory(vec![money()]);
    let ty = f.class_path().get(MONEY).unwrap().clone();
    f.register_custom_serializer(money_serializer(ty)).unwrap();
    f
}

#[test]
fn proxy_serializer_round_trips() {
    let writer = money_factory();
    let reader = money_factory();
    let amount = record(&writer, MONEY, vec![Value::Long(12_345)]);

    let decoded = transfer(&writer, &reader, &amount).unwrap();
    assert_eq!(decoded, amount);
    let local = reader.class_path().get(MONEY).unwrap();
    assert!(Arc::ptr_eq(decoded.as_record().unwrap().descriptor(), local));
}

#[test]
fn proxy_appears_in_schema() {
    let writer = money_factory();
    let amount = record(&writer, MONEY, vec![Value::Long(5)]);
    let out = SerializationOutput::new(&writer)
        .serialize_and_return_schema(&amount)
        .unwrap();

    match out.schema.get(MONEY).unwrap() {
        TypeNotation::Restricted(r) => assert_eq!(r.source, MONEY_PROXY),
        other => panic!("expected a restricted notation, found {:?}", other),
    }
    assert!(matches!(out.schema.get(MONEY_PROXY), Some(TypeNotation::Composite(_))));
}

#[test]
fn custom_serialized_values_share_references() {
    let writer = money_factory();
    let reader = money_factory();
    let amount = record(&writer, MONEY, vec![Value::Long(99)]);
    let pair = Value::list(vec![amount.clone(), amount]);

    let decoded = transfer(&writer, &reader, &pair).unwrap();
    let decoded = items(&decoded);
    assert!(decoded[0].ptr_eq(&decoded[1]));
}

#[test]
fn reader_without_registration_rejects() {
    let writer = money_factory();
    let reader = open_factory(vec![money()]);
    let amount = record(&writer, MONEY, vec![Value::Long(1)]);

    let err = transfer(&writer, &reader, &amount).unwrap_err();
    assert!(err.is_not_serializable());
    assert!(err.to_string().contains("no custom serializer"), "{}", err);
}

#[derive(Debug)]
struct HexBlob {
    ty: Arc<TypeDescriptor>,
}

impl ExternalSerializer for HexBlob {
    fn type_name(&self) -> &str {
        "net.example.Blob"
    }

    fn to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        match value.as_record().and_then(|r| r.get("data")) {
            Some(Value::Binary(bytes)) => Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>().into_bytes()),
            _ => Err(SerializationError::not_serializable("net.example.Blob", "data missing")),
        }
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(bytes).map_err(|e| SerializationError::decode(e.to_string()))?;
        let data = (0..text.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&text[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|e| SerializationError::decode(e.to_string()))?;
        Ok(Value::record(Record::new(self.ty.clone(), vec![Value::Binary(data)])?))
    }
}

fn blob() -> TypeDescriptor {
    TypeDescriptor::composite("net.example.Blob")
        .property("data", TypeRef::BINARY)
        .build()
}

fn blob_factory() -> SerializerFactory {
    let f = open_factory(vec![blob()]);
    let ty = f.class_path().get("net.example.Blob").unwrap().clone();
    f.register_external_serializer(Arc::new(HexBlob { ty })).unwrap();
    f
}

#[test]
fn external_serializer_round_trips() {
    let writer = blob_factory();
    let reader = blob_factory();
    let value = record(&writer, "net.example.Blob", vec![Value::Binary(vec![0xde, 0xad, 0x01])]);

    let out = SerializationOutput::new(&writer)
        .serialize_and_return_schema(&value)
        .unwrap();
    match out.schema.get("net.example.Blob").unwrap() {
        TypeNotation::Restricted(r) => assert_eq!(r.source, "binary"),
        other => panic!("expected a restricted notation, found {:?}", other),
    }
    assert_eq!(deserialize(&reader, &out.bytes).unwrap(), value);
}

#[test]
fn scheme_replays_registrations_onto_new_factories() {
    init_tracing();
    let scheme = SerializationScheme::default();
    let cp = class_path(vec![money()]);
    let ty = cp.get(MONEY).unwrap().clone();
    scheme.register_custom_serializer(money_serializer(ty.clone())).unwrap();

    let ctx = SerializationContext::new(UseCase::P2P, cp, Arc::new(AllWhitelist));
    let amount = Value::record(Record::new(ty, vec![Value::Long(250)]).unwrap());
    let bytes = scheme.serialize(&amount, &ctx).unwrap();
    assert_eq!(scheme.deserialize(&bytes, &ctx).unwrap(), amount);

    let factory = scheme.factory_for(&ctx).unwrap();
    assert!(factory.custom_for(MONEY).is_some());
}
