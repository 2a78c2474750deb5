//! Composite evolution
//!
//! Constructor parameters of a generic type are compared to the wire fields
//! with the type arguments of the payload's notation bound.

use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use crate::serializer::{adapt_mutability, AmqpSerializer};
use ledgerwire_core::descriptor::expect_composite;
use ledgerwire_core::{
    CompositeDescriptor, CompositeKind, CompositeType, ConstructorDescriptor, Parameter, Record,
    Result, SerializationError, TypeDescriptor, TypeRef, Value, WireValue,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct WireField {
    name: String,
    type_ref: TypeRef,
}

/// Reads an older or newer layout of a composite into the local type.
///
/// # Constructor selection
///
/// A constructor is viable when every parameter either matches a wire field
/// by name and declared type, or is absent from the wire and optional
/// (nullable or defaulted). Among viable constructors the one consuming the
/// most wire fields wins; ties go to the earlier constructor.
#[derive(Debug)]
pub struct EvolutionSerializer {
    ty: Arc<TypeDescriptor>,
    type_ref: TypeRef,
    wire_descriptor: String,
    wire_fields: Vec<WireField>,
    constructor: usize,
    /// Per constructor parameter, the wire field feeding it
    sources: Vec<Option<usize>>,
    /// Per wire field, the declared type it is read as and whether the
    /// receiving parameter wants a mutable collection
    readers: Vec<(TypeRef, bool)>,
}

impl EvolutionSerializer {
    /// Serializer reading `wire` into `local` applied to `type_args`.
    pub fn new(wire: &CompositeType, local: Arc<TypeDescriptor>, type_args: &[TypeRef]) -> Result<Self> {
        let composite = expect_composite(&local)?;
        if wire.kind == CompositeKind::Interface {
            return Err(SerializationError::not_serializable(
                wire.name.clone(),
                "payload describes an interface, the local type is a composite",
            ));
        }
        let wire_fields = wire
            .fields
            .iter()
            .map(|f| {
                Ok(WireField {
                    name: f.name.clone(),
                    type_ref: TypeRef::parse(&f.type_name)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let binding = Binding {
            composite,
            args: type_args,
        };
        let (constructor, sources) = select_constructor(&binding, &wire_fields)?;
        let params = &composite.constructors[constructor].params;
        let readers = (0..wire_fields.len())
            .map(|i| {
                sources
                    .iter()
                    .position(|s| *s == Some(i))
                    .map(|p| (binding.type_of(&params[p]), params[p].mutable))
                    .unwrap_or((TypeRef::Any, false))
            })
            .collect();

        Ok(EvolutionSerializer {
            type_ref: TypeRef::generic(composite.name.as_str(), type_args.to_vec()),
            ty: local,
            wire_descriptor: wire.descriptor.clone(),
            wire_fields,
            constructor,
            sources,
            readers,
        })
    }

    /// Index of the chosen constructor.
    pub fn constructor_index(&self) -> usize {
        self.constructor
    }
}

/// Local composite with the type arguments it is read as.
struct Binding<'a> {
    composite: &'a CompositeDescriptor,
    args: &'a [TypeRef],
}

impl Binding<'_> {
    fn type_of(&self, param: &Parameter) -> TypeRef {
        param.type_ref.substitute(&self.composite.type_params, self.args)
    }
}

fn match_constructor(
    binding: &Binding<'_>,
    ctor: &ConstructorDescriptor,
    wire_fields: &[WireField],
) -> Option<Vec<Option<usize>>> {
    ctor.params
        .iter()
        .map(|param| match wire_fields.iter().position(|f| f.name == param.name) {
            Some(i) if wire_fields[i].type_ref == binding.type_of(param) => Some(Some(i)),
            Some(_) => None,
            None if param.is_optional() => Some(None),
            None => None,
        })
        .collect()
}

fn select_constructor(
    binding: &Binding<'_>,
    wire_fields: &[WireField],
) -> Result<(usize, Vec<Option<usize>>)> {
    let mut best: Option<(usize, usize, Vec<Option<usize>>)> = None;
    for (index, ctor) in binding.composite.constructors.iter().enumerate() {
        if let Some(sources) = match_constructor(binding, ctor, wire_fields) {
            let consumed = sources.iter().flatten().count();
            if best.as_ref().map_or(true, |(b, _, _)| consumed > *b) {
                best = Some((consumed, index, sources));
            }
        }
    }
    match best {
        Some((_, index, sources)) => Ok((index, sources)),
        None => Err(evolution_failure(binding, wire_fields)),
    }
}

/// Explain why the primary constructor cannot be used.
fn evolution_failure(binding: &Binding<'_>, wire_fields: &[WireField]) -> SerializationError {
    let composite = binding.composite;
    if let Some(primary) = composite.primary_constructor() {
        for param in &primary.params {
            match wire_fields.iter().find(|f| f.name == param.name) {
                None if !param.is_optional() => {
                    return SerializationError::not_serializable_property(
                        composite.name.clone(),
                        param.name.clone(),
                        format!(
                            "New parameter {} is mandatory, should be nullable for evolution to work",
                            param.name
                        ),
                    )
                }
                Some(field) if field.type_ref != binding.type_of(param) => {
                    return SerializationError::not_serializable_property(
                        composite.name.clone(),
                        param.name.clone(),
                        format!(
                            "type changed from {} to {}, which evolution cannot bridge",
                            field.type_ref,
                            binding.type_of(param)
                        ),
                    )
                }
                _ => {}
            }
        }
    }
    SerializationError::not_serializable(
        composite.name.clone(),
        "no constructor accepts the fields of the payload's schema",
    )
}

impl AmqpSerializer for EvolutionSerializer {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn descriptor(&self) -> &str {
        &self.wire_descriptor
    }

    fn type_descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        Some(&self.ty)
    }

    fn write_class_info(&self, _output: &mut SerializationOutput<'_>) -> Result<()> {
        Err(SerializationError::not_serializable(
            self.ty.name(),
            "evolution serializers only read",
        ))
    }

    fn write_object(&self, _value: &Value, _output: &mut SerializationOutput<'_>) -> Result<WireValue> {
        Err(SerializationError::not_serializable(
            self.ty.name(),
            "evolution serializers only read",
        ))
    }

    fn read_object(&self, body: &WireValue, input: &mut DeserializationInput<'_>) -> Result<Value> {
        let items = body.as_list().ok_or_else(|| {
            SerializationError::decode(format!(
                "{}: expected a field list, found {}",
                self.ty.name(),
                body.label()
            ))
        })?;
        if items.len() != self.wire_fields.len() {
            return Err(SerializationError::decode(format!(
                "{}: schema lists {} fields, payload has {}",
                self.ty.name(),
                self.wire_fields.len(),
                items.len()
            )));
        }
        let mut values = Vec::with_capacity(items.len());
        for (item, (declared, mutable)) in items.iter().zip(&self.readers) {
            let value = input.read_object_or_null(item, declared)?;
            values.push(Some(adapt_mutability(value, *mutable)));
        }
        let args = self
            .sources
            .iter()
            .map(|source| source.and_then(|i| values[i].take()))
            .collect();
        Ok(Value::record(Record::construct(&self.ty, self.constructor, args)?))
    }
}
