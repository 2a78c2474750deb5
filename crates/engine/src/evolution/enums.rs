//! Enum evolution
//!
//! A constant the reader does not know is resolved by walking transforms
//! until a local constant is reached. Each step tries, in order:
//! 1. the name itself, if it is a local constant
//! 2. a local rename of that name (reader is newer than the writer)
//! 3. a rename on the wire that produced that name (writer is newer)
//! 4. a wire default for that name (writer added the constant)
//!
//! Resolutions are computed once per wire notation. Constants that cannot
//! be resolved only fail when a payload actually carries them.

use crate::input::DeserializationInput;
use crate::output::SerializationOutput;
use crate::serializer::{read_constant, AmqpSerializer};
use ledgerwire_core::{
    EnumDescriptor, EnumValue, RestrictedType, Result, SerializationError, TransformSet,
    TypeDescriptor, TypeRef, Value, WireValue,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

/// Reads another version of an enum into the local type.
#[derive(Debug)]
pub struct EnumEvolutionSerializer {
    ty: Arc<TypeDescriptor>,
    type_ref: TypeRef,
    wire_descriptor: String,
    /// Wire constant -> local ordinal, or why it cannot be mapped
    conversions: FxHashMap<String, std::result::Result<usize, String>>,
}

impl EnumEvolutionSerializer {
    /// Serializer reading `wire` into `local`.
    ///
    /// Fails when a constant present on both sides sits at a different
    /// ordinal: reordering is not an evolution the transforms can express.
    pub fn new(
        wire: &RestrictedType,
        wire_transforms: Option<&TransformSet>,
        local: Arc<TypeDescriptor>,
        local_transforms: &TransformSet,
    ) -> Result<Self> {
        let e = local.as_enum().ok_or_else(|| {
            SerializationError::not_serializable(
                wire.name.clone(),
                format!("payload describes an enum, the local type is {}", local.kind_label()),
            )
        })?;

        for (wire_ordinal, choice) in wire.choices.iter().enumerate() {
            if let Some(local_ordinal) = e.ordinal_of(&choice.name) {
                if local_ordinal != wire_ordinal {
                    return Err(SerializationError::not_serializable_property(
                        e.name.clone(),
                        choice.name.clone(),
                        format!(
                            "constant moved from ordinal {} to {}; only appending, renaming and defaulting are supported",
                            wire_ordinal, local_ordinal
                        ),
                    ));
                }
            }
        }

        let empty = TransformSet::default();
        let wire_transforms = wire_transforms.unwrap_or(&empty);
        let conversions = wire
            .choices
            .iter()
            .map(|choice| {
                let resolved = resolve(&choice.name, e, local_transforms, wire_transforms);
                if let Err(reason) = &resolved {
                    debug!(
                        target: "ledgerwire::evolution",
                        type_name = %e.name,
                        constant = %choice.name,
                        reason = %reason,
                        "Enum constant has no local counterpart"
                    );
                }
                (choice.name.clone(), resolved)
            })
            .collect();

        Ok(EnumEvolutionSerializer {
            type_ref: TypeRef::named(e.name.as_str()),
            ty: local,
            wire_descriptor: wire.descriptor.clone(),
            conversions,
        })
    }

    /// Local constant a wire constant maps to, if any.
    pub fn local_constant(&self, wire_constant: &str) -> Option<&str> {
        let ordinal = *self.conversions.get(wire_constant)?.as_ref().ok()?;
        self.ty
            .as_enum()
            .and_then(|e| e.constants.get(ordinal))
            .map(String::as_str)
    }
}

fn resolve(
    name: &str,
    local: &EnumDescriptor,
    local_transforms: &TransformSet,
    wire_transforms: &TransformSet,
) -> std::result::Result<usize, String> {
    let mut visited: FxHashSet<&str> = FxHashSet::default();
    let mut current = name;
    loop {
        if let Some(ordinal) = local.ordinal_of(current) {
            return Ok(ordinal);
        }
        if !visited.insert(current) {
            return Err(format!("transforms for {} form a cycle", name));
        }
        let next = local_transforms
            .renames()
            .find(|(from, _)| *from == current)
            .map(|(_, to)| to)
            .or_else(|| {
                wire_transforms
                    .renames()
                    .find(|(_, to)| *to == current)
                    .map(|(from, _)| from)
            })
            .or_else(|| {
                wire_transforms
                    .defaults()
                    .find(|(new, _)| *new == current)
                    .map(|(_, old)| old)
            });
        match next {
            Some(next) => current = next,
            None if local_transforms.has_unknown() || wire_transforms.has_unknown() => {
                return Err(format!(
                    "{} cannot be mapped; the transforms include kinds this reader does not understand",
                    name
                ))
            }
            None => {
                return Err(format!(
                    "{} is not a local constant and no transform maps it to one",
                    name
                ))
            }
        }
    }
}

impl AmqpSerializer for EnumEvolutionSerializer {
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

    fn read_object(&self, body: &WireValue, _input: &mut DeserializationInput<'_>) -> Result<Value> {
        let (name, _) = read_constant(self.ty.name(), body)?;
        match self.conversions.get(name) {
            Some(Ok(ordinal)) => Ok(Value::Enum(EnumValue::from_ordinal(self.ty.clone(), *ordinal)?)),
            Some(Err(reason)) => Err(SerializationError::not_serializable_property(
                self.ty.name(),
                name,
                reason.clone(),
            )),
            None => Err(SerializationError::not_serializable_property(
                self.ty.name(),
                name,
                "constant is not listed in the payload's schema",
            )),
        }
    }
}
