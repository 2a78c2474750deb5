//! Enum serializer
//!
//! Constants are written as `[name, ordinal]`. The notation lists every
//! constant in ordinal order, and the enum's validated transforms travel in
//! the transforms section so that readers with other versions of the enum can
//! map constants they do not know.

use super::AmqpSerializer;
use crate::factory::SerializerFactory;
use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use ledgerwire_core::{
    Choice, EnumValue, RestrictedType, Result, SerializationError, TransformSet, TypeDescriptor,
    TypeNotation, TypeRef, Value, WireValue, ENUM_SOURCE,
};
use std::sync::Arc;

/// Split an enum body into constant name and ordinal.
pub(crate) fn read_constant<'b>(type_name: &str, body: &'b WireValue) -> Result<(&'b str, i32)> {
    match body.as_list() {
        Some([WireValue::String(name), WireValue::Int(ordinal)]) => Ok((name.as_str(), *ordinal)),
        _ => Err(SerializationError::decode(format!(
            "{}: malformed enum body ({})",
            type_name,
            body.label()
        ))),
    }
}

/// Serializer for one enum type.
#[derive(Debug)]
pub struct EnumSerializer {
    ty: Arc<TypeDescriptor>,
    type_ref: TypeRef,
    descriptor: String,
    notation: TypeNotation,
    transforms: TransformSet,
}

impl EnumSerializer {
    /// Serializer for `ty`. Fails with `NotSerializable` when the declared
    /// transforms are invalid.
    pub fn new(ty: Arc<TypeDescriptor>, factory: &SerializerFactory) -> Result<Self> {
        let e = ty.as_enum().ok_or_else(|| {
            SerializationError::not_serializable(ty.name(), format!("{} is not an enum", ty.kind_label()))
        })?;
        let transforms = factory.transforms_for(e)?;
        let descriptor = factory.descriptor_of(&ty, &[])?;
        let notation = TypeNotation::Restricted(RestrictedType {
            name: e.name.clone(),
            provides: Vec::new(),
            source: ENUM_SOURCE.to_string(),
            descriptor: descriptor.clone(),
            choices: e
                .constants
                .iter()
                .map(|c| Choice { name: c.clone() })
                .collect(),
        });
        Ok(EnumSerializer {
            type_ref: TypeRef::named(e.name.as_str()),
            ty,
            descriptor,
            notation,
            transforms,
        })
    }

    /// Validated transforms of this enum.
    pub fn transforms(&self) -> &TransformSet {
        &self.transforms
    }
}

impl AmqpSerializer for EnumSerializer {
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
        if !self.transforms.is_empty() {
            output.add_transforms(self.ty.name(), self.transforms.clone());
        }
        Ok(())
    }

    fn write_object(&self, value: &Value, _output: &mut SerializationOutput<'_>) -> Result<WireValue> {
        let constant = value.as_enum().ok_or_else(|| {
            SerializationError::not_serializable(
                self.ty.name(),
                format!("expected an enum constant, found {}", value.type_label()),
            )
        })?;
        Ok(WireValue::described(
            self.descriptor.clone(),
            WireValue::List(vec![
                WireValue::String(constant.name().to_string()),
                WireValue::Int(constant.ordinal() as i32),
            ]),
        ))
    }

    fn read_object(&self, body: &WireValue, _input: &mut DeserializationInput<'_>) -> Result<Value> {
        let (name, ordinal) = read_constant(self.ty.name(), body)?;
        let constant = EnumValue::new(self.ty.clone(), name)?;
        if constant.ordinal() as i32 != ordinal {
            return Err(SerializationError::decode(format!(
                "{}: constant {} has ordinal {}, payload says {}",
                self.ty.name(),
                name,
                constant.ordinal(),
                ordinal
            )));
        }
        Ok(Value::Enum(constant))
    }
}
