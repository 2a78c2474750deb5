//! Runtime values
//!
//! `Value` is the in-memory object graph the engine encodes and rebuilds.
//! Records and collections live behind `Arc`: sharing an `Arc` is how a graph
//! expresses that two fields refer to the same object, and that sharing is
//! preserved across a round trip.
//!
//! Records are immutable once built, so a record can never (transitively)
//! contain itself. Cyclic graphs are therefore unrepresentable.

use crate::descriptor::{InterfaceDescriptor, TypeDescriptor};
use crate::error::{Result, SerializationError};
use crate::types::{CollectionKind, PrimitiveKind};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value
    Null,
    /// `boolean`
    Bool(bool),
    /// `byte`
    Byte(i8),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `char`
    Char(char),
    /// `string`
    String(String),
    /// `binary`
    Binary(Vec<u8>),
    /// `timestamp`
    Timestamp(DateTime<Utc>),
    /// `uuid`
    Uuid(Uuid),
    /// List, set, array or map
    Collection(Arc<CollectionValue>),
    /// Enum constant
    Enum(EnumValue),
    /// Composite instance
    Record(Arc<Record>),
}

impl Value {
    /// String value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Immutable list.
    pub fn list(items: Vec<Value>) -> Self {
        Value::Collection(Arc::new(CollectionValue::list(items)))
    }

    /// Immutable map.
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Collection(Arc::new(CollectionValue::map(entries)))
    }

    /// Wrap a record.
    pub fn record(record: Record) -> Self {
        Value::Record(Arc::new(record))
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Primitive kind of a scalar value.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Value::Bool(_) => PrimitiveKind::Boolean,
            Value::Byte(_) => PrimitiveKind::Byte,
            Value::Short(_) => PrimitiveKind::Short,
            Value::Int(_) => PrimitiveKind::Int,
            Value::Long(_) => PrimitiveKind::Long,
            Value::Float(_) => PrimitiveKind::Float,
            Value::Double(_) => PrimitiveKind::Double,
            Value::Char(_) => PrimitiveKind::Char,
            Value::String(_) => PrimitiveKind::String,
            Value::Binary(_) => PrimitiveKind::Binary,
            Value::Timestamp(_) => PrimitiveKind::Timestamp,
            Value::Uuid(_) => PrimitiveKind::Uuid,
            _ => return None,
        })
    }

    /// Short description of the runtime type, for error messages.
    pub fn type_label(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Collection(c) => c.kind().wire_name().to_string(),
            Value::Enum(e) => e.type_name().to_string(),
            Value::Record(r) => r.type_name().to_string(),
            other => other
                .primitive_kind()
                .map(|k| k.wire_name().to_string())
                .unwrap_or_default(),
        }
    }

    /// Address of the shared allocation for values that can be aliased.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Record(r) => Some(Arc::as_ptr(r) as *const () as usize),
            Value::Collection(c) => Some(Arc::as_ptr(c) as *const () as usize),
            _ => None,
        }
    }

    /// Whether both values are the same shared allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b),
            (Value::Collection(a), Value::Collection(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Record view.
    pub fn as_record(&self) -> Option<&Arc<Record>> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Collection view.
    pub fn as_collection(&self) -> Option<&Arc<CollectionValue>> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Enum view.
    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Int view.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

// ============================================================================
// Collections
// ============================================================================

/// Whether a collection may be modified by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    /// Read-only snapshot
    Immutable,
    /// Owner may modify
    Mutable,
}

/// Collection contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    /// List, set or array items
    Sequence(Vec<Value>),
    /// Map entries in insertion order
    Entries(Vec<(Value, Value)>),
}

impl Elements {
    /// Number of items or entries.
    pub fn len(&self) -> usize {
        match self {
            Elements::Sequence(items) => items.len(),
            Elements::Entries(entries) => entries.len(),
        }
    }

    /// Whether there are no items or entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A list, set, array or map.
///
/// Equality compares kind and contents; mutability is a property of the
/// holder, not of the value.
#[derive(Debug, Clone)]
pub struct CollectionValue {
    kind: CollectionKind,
    mutability: Mutability,
    elements: Elements,
}

impl CollectionValue {
    /// Build a collection, checking that the element shape fits the kind.
    pub fn new(kind: CollectionKind, elements: Elements) -> Result<Self> {
        let shape_ok = match &elements {
            Elements::Entries(_) => kind.is_map(),
            Elements::Sequence(_) => !kind.is_map(),
        };
        if !shape_ok {
            return Err(SerializationError::not_serializable(
                kind.wire_name(),
                "element shape does not match collection kind",
            ));
        }
        Ok(CollectionValue {
            kind,
            mutability: Mutability::Immutable,
            elements,
        })
    }

    /// Immutable list.
    pub fn list(items: Vec<Value>) -> Self {
        Self::sequence(CollectionKind::List, items)
    }

    /// Immutable set. Items are kept in the given order.
    pub fn set(items: Vec<Value>) -> Self {
        Self::sequence(CollectionKind::Set, items)
    }

    /// Immutable array.
    pub fn array(items: Vec<Value>) -> Self {
        Self::sequence(CollectionKind::Array, items)
    }

    /// Immutable map.
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        CollectionValue {
            kind: CollectionKind::Map,
            mutability: Mutability::Immutable,
            elements: Elements::Entries(entries),
        }
    }

    fn sequence(kind: CollectionKind, items: Vec<Value>) -> Self {
        CollectionValue {
            kind,
            mutability: Mutability::Immutable,
            elements: Elements::Sequence(items),
        }
    }

    /// Kind of container.
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Mutability flag.
    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    /// Whether the holder may modify it.
    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    /// Contents.
    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    /// Items of a list, set or array.
    pub fn items(&self) -> Option<&[Value]> {
        match &self.elements {
            Elements::Sequence(items) => Some(items),
            Elements::Entries(_) => None,
        }
    }

    /// Entries of a map.
    pub fn entries(&self) -> Option<&[(Value, Value)]> {
        match &self.elements {
            Elements::Entries(entries) => Some(entries),
            Elements::Sequence(_) => None,
        }
    }

    /// Number of items or entries.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Copy with the given mutability.
    pub fn with_mutability(&self, mutability: Mutability) -> Self {
        CollectionValue {
            kind: self.kind,
            mutability,
            elements: self.elements.clone(),
        }
    }
}

impl PartialEq for CollectionValue {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.elements == other.elements
    }
}

// ============================================================================
// Enums
// ============================================================================

/// An enum constant.
#[derive(Debug, Clone)]
pub struct EnumValue {
    ty: Arc<TypeDescriptor>,
    ordinal: usize,
}

impl EnumValue {
    /// Constant `name` of enum type `ty`.
    pub fn new(ty: Arc<TypeDescriptor>, name: &str) -> Result<Self> {
        let ordinal = match ty.as_enum() {
            Some(e) => e.ordinal_of(name).ok_or_else(|| {
                SerializationError::not_serializable_property(
                    e.name.clone(),
                    name,
                    "no such enum constant",
                )
            })?,
            None => {
                return Err(SerializationError::not_serializable(
                    ty.name(),
                    format!("expected an enum type, found {}", ty.kind_label()),
                ))
            }
        };
        Ok(EnumValue { ty, ordinal })
    }

    /// Constant at `ordinal` of enum type `ty`.
    pub fn from_ordinal(ty: Arc<TypeDescriptor>, ordinal: usize) -> Result<Self> {
        let in_range = ty
            .as_enum()
            .map(|e| ordinal < e.constants.len())
            .unwrap_or(false);
        if !in_range {
            return Err(SerializationError::not_serializable(
                ty.name(),
                format!("ordinal {} is not a constant", ordinal),
            ));
        }
        Ok(EnumValue { ty, ordinal })
    }

    /// Enum type.
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.ty
    }

    /// Enum type name.
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// Constant name.
    pub fn name(&self) -> &str {
        self.ty
            .as_enum()
            .and_then(|e| e.constants.get(self.ordinal))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Declaration index.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.name() == other.name()
    }
}

// ============================================================================
// Records
// ============================================================================

/// An instance of a composite type.
///
/// Fields are aligned with the type's properties. Equality compares type name
/// and field values; use [`Record::same_runtime_type`] for type identity.
#[derive(Debug, Clone)]
pub struct Record {
    ty: Arc<TypeDescriptor>,
    fields: Vec<Value>,
}

impl Record {
    /// Record with one value per property, in property order.
    pub fn new(ty: Arc<TypeDescriptor>, fields: Vec<Value>) -> Result<Self> {
        let composite = match ty.as_composite() {
            Some(c) => c,
            None => {
                return Err(SerializationError::not_serializable(
                    ty.name(),
                    format!("cannot instantiate {}", ty.kind_label()),
                ))
            }
        };
        if composite.properties.len() != fields.len() {
            return Err(SerializationError::not_serializable(
                composite.name.clone(),
                format!(
                    "expected {} field values, found {}",
                    composite.properties.len(),
                    fields.len()
                ),
            ));
        }
        for (prop, value) in composite.properties.iter().zip(&fields) {
            if value.is_null() && !prop.nullable {
                return Err(SerializationError::not_serializable_property(
                    composite.name.clone(),
                    prop.name.clone(),
                    "null value for non-nullable property",
                ));
            }
        }
        Ok(Record { ty, fields })
    }

    /// Build through constructor `index`. `None` arguments take the
    /// parameter's default, or null when the parameter is nullable.
    pub fn construct(ty: &Arc<TypeDescriptor>, index: usize, args: Vec<Option<Value>>) -> Result<Self> {
        let composite = crate::descriptor::expect_composite(ty)?;
        let ctor = composite.constructors.get(index).ok_or_else(|| {
            SerializationError::not_serializable(
                composite.name.clone(),
                format!("no constructor at index {}", index),
            )
        })?;
        if ctor.params.len() != args.len() {
            return Err(SerializationError::not_serializable(
                composite.name.clone(),
                format!(
                    "constructor takes {} arguments, {} supplied",
                    ctor.params.len(),
                    args.len()
                ),
            ));
        }

        let mut fields: Vec<Option<Value>> = vec![None; composite.properties.len()];
        for (param, arg) in ctor.params.iter().zip(args) {
            let value = match arg {
                Some(v) => v,
                None => param.default.clone().unwrap_or(Value::Null),
            };
            if value.is_null() && !param.nullable {
                return Err(SerializationError::not_serializable_property(
                    composite.name.clone(),
                    param.name.clone(),
                    "null supplied for non-nullable constructor parameter",
                ));
            }
            let (idx, _) = composite.property(&param.name).ok_or_else(|| {
                SerializationError::not_serializable_property(
                    composite.name.clone(),
                    param.name.clone(),
                    "constructor parameter does not name a property",
                )
            })?;
            fields[idx] = Some(value);
        }
        for (name, value) in &ctor.initializers {
            if let Some((idx, _)) = composite.property(name) {
                if fields[idx].is_none() {
                    fields[idx] = Some(value.clone());
                }
            }
        }

        let mut out = Vec::with_capacity(fields.len());
        for (prop, field) in composite.properties.iter().zip(fields) {
            match field {
                Some(v) => out.push(v),
                None if prop.nullable => out.push(Value::Null),
                None => {
                    return Err(SerializationError::not_serializable_property(
                        composite.name.clone(),
                        prop.name.clone(),
                        "property is not initialised by the constructor",
                    ))
                }
            }
        }
        Record::new(ty.clone(), out)
    }

    /// Runtime type.
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.ty
    }

    /// Runtime type name.
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// Field values in property order.
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Field by property name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let (idx, _) = self.ty.as_composite()?.property(name)?;
        self.fields.get(idx)
    }

    /// Whether both records share one runtime type.
    pub fn same_runtime_type(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty)
    }

    /// View this record through an interface it directly implements.
    pub fn capability<'a>(&'a self, interface: &'a TypeDescriptor) -> Option<Capability<'a>> {
        let iface = interface.as_interface()?;
        if !self.ty.interfaces().iter().any(|i| i == &iface.name) {
            return None;
        }
        let composite = self.ty.as_composite()?;
        let complete = iface
            .properties
            .iter()
            .all(|p| composite.property(&p.name).is_some());
        complete.then_some(Capability {
            record: self,
            interface: iface,
        })
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.fields == other.fields
    }
}

/// A record seen through one of its interfaces.
#[derive(Debug, Clone, Copy)]
pub struct Capability<'a> {
    record: &'a Record,
    interface: &'a InterfaceDescriptor,
}

impl<'a> Capability<'a> {
    /// Interface name.
    pub fn name(&self) -> &str {
        &self.interface.name
    }

    /// Interface property; properties outside the interface are not visible.
    pub fn get(&self, property: &str) -> Option<&'a Value> {
        self.interface
            .properties
            .iter()
            .find(|p| p.name == property)?;
        self.record.get(property)
    }

    /// The underlying record.
    pub fn record(&self) -> &'a Record {
        self.record
    }
}
