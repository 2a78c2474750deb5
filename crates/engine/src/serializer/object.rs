//! Composite and interface serializer
//!
//! A composite is written as the list of its primary-constructor properties,
//! in constructor parameter order. That order is also the field order of the
//! notation and the order the fingerprint hashes, so the three always agree.
//!
//! A generic type gets one serializer per list of type arguments. Its
//! properties are written with the arguments bound, and its notation is
//! named after the applied type, e.g. `net.x.Holder<int>`.

use super::{adapt_mutability, AmqpSerializer};
use crate::factory::{bind_type_args, SerializerFactory};
use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use ledgerwire_core::{
    CompositeDescriptor, CompositeKind, CompositeType, Field, PropertyDescriptor, Record, Result,
    SerializationError, TypeDescriptor, TypeNotation, TypeRef, Value, WireValue,
};
use std::sync::Arc;

/// Properties written for `composite`, in primary-constructor order.
///
/// Parameters that do not name a property are skipped; [`ObjectSerializer`]
/// rejects such types, this view only feeds the fingerprint.
pub(crate) fn serialized_properties(composite: &CompositeDescriptor) -> Vec<&PropertyDescriptor> {
    match composite.primary_constructor() {
        Some(ctor) => ctor
            .params
            .iter()
            .filter_map(|p| composite.property(&p.name).map(|(_, prop)| prop))
            .collect(),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone)]
struct PropertySerializer {
    name: String,
    type_ref: TypeRef,
    nullable: bool,
    /// Index of the property in the record's field list
    field_index: usize,
    /// Constructor wants a mutable collection
    mutable: bool,
}

/// Serializer for a composite or interface type.
#[derive(Debug)]
pub struct ObjectSerializer {
    ty: Arc<TypeDescriptor>,
    type_ref: TypeRef,
    descriptor: String,
    properties: Vec<PropertySerializer>,
    notation: TypeNotation,
    singleton: Option<Arc<Record>>,
}

impl ObjectSerializer {
    /// Validate `ty` and derive its notation.
    ///
    /// Fails with `NotSerializable` when a constructor parameter has no
    /// matching property, when their types differ, or when a serialized
    /// property is neither public nor exposed through a getter.
    pub fn new(ty: Arc<TypeDescriptor>, factory: &SerializerFactory) -> Result<Self> {
        Self::with_type_args(ty, &[], factory)
    }

    /// Serializer for a generic `ty` applied to `args`. Without arguments
    /// every type parameter is bound to `*`.
    pub fn with_type_args(
        ty: Arc<TypeDescriptor>,
        args: &[TypeRef],
        factory: &SerializerFactory,
    ) -> Result<Self> {
        let args = bind_type_args(&ty, args)?;
        let params = ty.type_params();
        let (properties, kind) = match &*ty {
            TypeDescriptor::Composite(c) => (composite_properties(c, &args)?, CompositeKind::Class),
            TypeDescriptor::Interface(i) => (
                i.properties
                    .iter()
                    .enumerate()
                    .map(|(field_index, p)| PropertySerializer {
                        name: p.name.clone(),
                        type_ref: p.type_ref.substitute(params, &args),
                        nullable: p.nullable,
                        field_index,
                        mutable: false,
                    })
                    .collect(),
                CompositeKind::Interface,
            ),
            TypeDescriptor::Enum(e) => {
                return Err(SerializationError::not_serializable(
                    e.name.clone(),
                    "enums are not written as composites",
                ))
            }
        };

        let type_ref = TypeRef::generic(ty.name(), args.clone());
        let descriptor = factory.descriptor_of(&ty, &args)?;
        let notation = TypeNotation::Composite(CompositeType {
            name: type_ref.to_string(),
            kind,
            provides: ty.interfaces().to_vec(),
            descriptor: descriptor.clone(),
            fields: properties
                .iter()
                .map(|p| Field::new(p.name.clone(), p.type_ref.to_string(), !p.nullable))
                .collect(),
        });
        let singleton = match ty.as_composite() {
            Some(c) if c.singleton => match factory.class_path().singleton(&c.name) {
                Some(instance) if Arc::ptr_eq(instance.descriptor(), &ty) => Some(instance.clone()),
                _ => Some(Arc::new(Record::new(ty.clone(), Vec::new())?)),
            },
            _ => None,
        };

        Ok(ObjectSerializer {
            type_ref,
            ty,
            descriptor,
            properties,
            notation,
            singleton,
        })
    }

    /// Notation written for this type.
    pub fn notation(&self) -> &TypeNotation {
        &self.notation
    }

    /// Serialized property names, in wire order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    fn type_name(&self) -> &str {
        self.ty.name()
    }
}

fn composite_properties(c: &CompositeDescriptor, args: &[TypeRef]) -> Result<Vec<PropertySerializer>> {
    let ctor = match c.primary_constructor() {
        Some(ctor) => ctor,
        None if c.properties.is_empty() => return Ok(Vec::new()),
        None => {
            return Err(SerializationError::not_serializable(
                c.name.clone(),
                "type has properties but no constructor",
            ))
        }
    };
    ctor.params
        .iter()
        .map(|param| {
            let (field_index, prop) = c.property(&param.name).ok_or_else(|| {
                SerializationError::not_serializable_property(
                    c.name.clone(),
                    param.name.clone(),
                    "constructor parameter does not correspond to a property",
                )
            })?;
            if prop.type_ref != param.type_ref {
                return Err(SerializationError::not_serializable_property(
                    c.name.clone(),
                    param.name.clone(),
                    format!(
                        "constructor parameter type {} does not match property type {}",
                        param.type_ref, prop.type_ref
                    ),
                ));
            }
            if !prop.accessor.is_readable() {
                return Err(SerializationError::not_serializable_property(
                    c.name.clone(),
                    prop.name.clone(),
                    "property is not public and has no public getter",
                ));
            }
            Ok(PropertySerializer {
                name: prop.name.clone(),
                type_ref: prop.type_ref.substitute(&c.type_params, args),
                nullable: prop.nullable,
                field_index,
                mutable: param.mutable,
            })
        })
        .collect()
}

impl AmqpSerializer for ObjectSerializer {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn type_descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        Some(&self.ty)
    }

    fn write_class_info(&self, output: &mut SerializationOutput<'_>) -> Result<()> {
        output.add_notation(self.notation.clone())?;
        for interface in self.ty.interfaces() {
            output.require_declared(&TypeRef::named(interface.as_str()))?;
        }
        for property in &self.properties {
            output.require_declared(&property.type_ref)?;
        }
        Ok(())
    }

    fn write_object(&self, value: &Value, output: &mut SerializationOutput<'_>) -> Result<WireValue> {
        let record = value.as_record().ok_or_else(|| {
            SerializationError::not_serializable(
                self.type_name(),
                format!("expected a record, found {}", value.type_label()),
            )
        })?;
        if self.ty.as_interface().is_some() {
            return Err(SerializationError::not_serializable(
                self.type_name(),
                "interfaces have no instances of their own",
            ));
        }
        let mut fields = Vec::with_capacity(self.properties.len());
        for property in &self.properties {
            let field = record.fields().get(property.field_index).ok_or_else(|| {
                SerializationError::not_serializable_property(
                    self.type_name(),
                    property.name.clone(),
                    "record has no value for this property",
                )
            })?;
            if field.is_null() && !property.nullable {
                return Err(SerializationError::not_serializable_property(
                    self.type_name(),
                    property.name.clone(),
                    "null value for non-nullable property",
                ));
            }
            fields.push(output.write_object_or_null(field, &property.type_ref)?);
        }
        Ok(WireValue::described(self.descriptor.clone(), WireValue::List(fields)))
    }

    fn read_object(&self, body: &WireValue, input: &mut DeserializationInput<'_>) -> Result<Value> {
        if self.ty.as_interface().is_some() {
            return Err(SerializationError::not_serializable(
                self.type_name(),
                "cannot instantiate an interface",
            ));
        }
        if let Some(instance) = &self.singleton {
            return Ok(Value::Record(instance.clone()));
        }
        let items = body.as_list().ok_or_else(|| {
            SerializationError::decode(format!(
                "{}: expected a field list, found {}",
                self.type_name(),
                body.label()
            ))
        })?;
        if items.len() != self.properties.len() {
            return Err(SerializationError::decode(format!(
                "{}: expected {} fields, found {}",
                self.type_name(),
                self.properties.len(),
                items.len()
            )));
        }
        let mut args = Vec::with_capacity(items.len());
        for (property, item) in self.properties.iter().zip(items) {
            let value = input.read_object_or_null(item, &property.type_ref)?;
            args.push(Some(adapt_mutability(value, property.mutable)));
        }
        Ok(Value::record(Record::construct(&self.ty, 0, args)?))
    }
}
