//! Type descriptors
//!
//! A `TypeDescriptor` is the canonical, immutable description of one named
//! type: its properties, constructors, enum constants or interface members.
//! It is built once (by hand for local types, by the carpenter for types
//! learned from a payload) and shared behind an `Arc`. The `Arc` is the
//! runtime type's identity: two records have the same runtime type exactly
//! when their descriptors are the same allocation.

use crate::error::{Result, SerializationError};
use crate::transforms::Transform;
use crate::types::TypeRef;
use crate::value::Value;
use uuid::Uuid;

// ============================================================================
// Properties and constructors
// ============================================================================

/// How a property can be read from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    /// Public field
    Public,
    /// Non-public field exposed through an explicit public getter
    Getter,
    /// Non-public and without a getter
    Private,
}

impl Accessor {
    /// Whether the serializer may read the property.
    pub fn is_readable(&self) -> bool {
        !matches!(self, Accessor::Private)
    }
}

/// A property of a composite or interface.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Declared type
    pub type_ref: TypeRef,
    /// Whether null is a legal value
    pub nullable: bool,
    /// Visibility
    pub accessor: Accessor,
}

impl PropertyDescriptor {
    /// Public, non-nullable property.
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        PropertyDescriptor {
            name: name.into(),
            type_ref,
            nullable: false,
            accessor: Accessor::Public,
        }
    }

    /// Mark the property nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the accessor.
    pub fn with_accessor(mut self, accessor: Accessor) -> Self {
        self.accessor = accessor;
        self
    }
}

/// A constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name, matched against property names and wire field names
    pub name: String,
    /// Declared type
    pub type_ref: TypeRef,
    /// Whether null is accepted
    pub nullable: bool,
    /// Value used when the caller supplies nothing
    pub default: Option<Value>,
    /// Whether a collection argument must be a mutable copy
    pub mutable: bool,
}

impl Parameter {
    /// Non-nullable parameter without a default.
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Parameter {
            name: name.into(),
            type_ref,
            nullable: false,
            default: None,
            mutable: false,
        }
    }

    /// Accept null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Supply a default value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Require a mutable collection.
    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    /// Whether the parameter may be left out by a caller.
    pub fn is_optional(&self) -> bool {
        self.nullable || self.default.is_some()
    }
}

/// One way of building a composite.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstructorDescriptor {
    /// Parameters in declaration order
    pub params: Vec<Parameter>,
    /// Fixed values for properties this constructor does not take
    pub initializers: Vec<(String, Value)>,
}

impl ConstructorDescriptor {
    /// Constructor taking `params`.
    pub fn new(params: Vec<Parameter>) -> Self {
        ConstructorDescriptor {
            params,
            initializers: Vec::new(),
        }
    }

    /// Set a property the constructor does not take as a parameter.
    pub fn initialize(mut self, property: impl Into<String>, value: Value) -> Self {
        self.initializers.push((property.into(), value));
        self
    }

    /// Parameter by name.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Where a descriptor came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOrigin {
    /// Declared by the application
    Local,
    /// Built by a carpenter from a payload schema
    Synthesized {
        /// Namespace of the carpenter that built it
        namespace: Uuid,
        /// Wire descriptor of the notation it was built from
        descriptor: String,
    },
}

// ============================================================================
// Descriptors
// ============================================================================

/// A record type.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeDescriptor {
    /// Fully qualified name
    pub name: String,
    /// Type parameters of a generic type, in order
    pub type_params: Vec<String>,
    /// Properties in declaration order
    pub properties: Vec<PropertyDescriptor>,
    /// Constructors; the first is the primary constructor
    pub constructors: Vec<ConstructorDescriptor>,
    /// Names of implemented interfaces
    pub interfaces: Vec<String>,
    /// Annotated as serializable
    pub serializable: bool,
    /// Exactly one instance exists
    pub singleton: bool,
    /// Provenance
    pub origin: TypeOrigin,
}

impl CompositeDescriptor {
    /// Property and its index.
    pub fn property(&self, name: &str) -> Option<(usize, &PropertyDescriptor)> {
        self.properties.iter().enumerate().find(|(_, p)| p.name == name)
    }

    /// The primary constructor.
    pub fn primary_constructor(&self) -> Option<&ConstructorDescriptor> {
        self.constructors.first()
    }
}

/// An enum type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    /// Fully qualified name
    pub name: String,
    /// Constants in ordinal order
    pub constants: Vec<String>,
    /// Declared evolution transforms
    pub transforms: Vec<Transform>,
    /// Annotated as serializable
    pub serializable: bool,
    /// Provenance
    pub origin: TypeOrigin,
}

impl EnumDescriptor {
    /// Ordinal of a constant.
    pub fn ordinal_of(&self, constant: &str) -> Option<usize> {
        self.constants.iter().position(|c| c == constant)
    }
}

/// An interface (capability set).
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDescriptor {
    /// Fully qualified name
    pub name: String,
    /// Type parameters of a generic interface, in order
    pub type_params: Vec<String>,
    /// Abstract properties every implementation exposes
    pub properties: Vec<PropertyDescriptor>,
    /// Names of super-interfaces
    pub interfaces: Vec<String>,
    /// Annotated as serializable
    pub serializable: bool,
    /// Provenance
    pub origin: TypeOrigin,
}

/// Description of a named type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    /// Record type
    Composite(CompositeDescriptor),
    /// Enum type
    Enum(EnumDescriptor),
    /// Interface
    Interface(InterfaceDescriptor),
}

impl TypeDescriptor {
    /// Start describing a composite.
    pub fn composite(name: impl Into<String>) -> CompositeBuilder {
        CompositeBuilder::new(name)
    }

    /// Describe an enum.
    pub fn enumeration(name: impl Into<String>, constants: &[&str]) -> EnumBuilder {
        EnumBuilder {
            desc: EnumDescriptor {
                name: name.into(),
                constants: constants.iter().map(|c| c.to_string()).collect(),
                transforms: Vec::new(),
                serializable: false,
                origin: TypeOrigin::Local,
            },
        }
    }

    /// Start describing an interface.
    pub fn interface(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            desc: InterfaceDescriptor {
                name: name.into(),
                type_params: Vec::new(),
                properties: Vec::new(),
                interfaces: Vec::new(),
                serializable: false,
                origin: TypeOrigin::Local,
            },
        }
    }

    /// Fully qualified name.
    pub fn name(&self) -> &str {
        match self {
            TypeDescriptor::Composite(c) => &c.name,
            TypeDescriptor::Enum(e) => &e.name,
            TypeDescriptor::Interface(i) => &i.name,
        }
    }

    /// Provenance.
    pub fn origin(&self) -> &TypeOrigin {
        match self {
            TypeDescriptor::Composite(c) => &c.origin,
            TypeDescriptor::Enum(e) => &e.origin,
            TypeDescriptor::Interface(i) => &i.origin,
        }
    }

    /// Type parameters; empty for non-generic types.
    pub fn type_params(&self) -> &[String] {
        match self {
            TypeDescriptor::Composite(c) => &c.type_params,
            TypeDescriptor::Interface(i) => &i.type_params,
            TypeDescriptor::Enum(_) => &[],
        }
    }

    /// Directly implemented interfaces.
    pub fn interfaces(&self) -> &[String] {
        match self {
            TypeDescriptor::Composite(c) => &c.interfaces,
            TypeDescriptor::Interface(i) => &i.interfaces,
            TypeDescriptor::Enum(_) => &[],
        }
    }

    /// Carries the serializable annotation itself.
    pub fn is_annotated_serializable(&self) -> bool {
        match self {
            TypeDescriptor::Composite(c) => c.serializable,
            TypeDescriptor::Enum(e) => e.serializable,
            TypeDescriptor::Interface(i) => i.serializable,
        }
    }

    /// Whether the descriptor was built by a carpenter.
    pub fn is_synthesized(&self) -> bool {
        matches!(self.origin(), TypeOrigin::Synthesized { .. })
    }

    /// Composite view.
    pub fn as_composite(&self) -> Option<&CompositeDescriptor> {
        match self {
            TypeDescriptor::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Enum view.
    pub fn as_enum(&self) -> Option<&EnumDescriptor> {
        match self {
            TypeDescriptor::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Interface view.
    pub fn as_interface(&self) -> Option<&InterfaceDescriptor> {
        match self {
            TypeDescriptor::Interface(i) => Some(i),
            _ => None,
        }
    }

    /// Properties of a composite or interface; empty for enums.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        match self {
            TypeDescriptor::Composite(c) => &c.properties,
            TypeDescriptor::Interface(i) => &i.properties,
            TypeDescriptor::Enum(_) => &[],
        }
    }

    /// Short label used in log lines and errors.
    pub fn kind_label(&self) -> &'static str {
        match self {
            TypeDescriptor::Composite(_) => "composite",
            TypeDescriptor::Enum(_) => "enum",
            TypeDescriptor::Interface(_) => "interface",
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Builder for [`CompositeDescriptor`].
///
/// Unless [`CompositeBuilder::primary_constructor`] is called, the primary
/// constructor takes every property in declaration order.
#[derive(Debug)]
pub struct CompositeBuilder {
    desc: CompositeDescriptor,
    primary: Option<Vec<String>>,
    defaults: Vec<(String, Value)>,
    mutable: Vec<String>,
    alternates: Vec<ConstructorDescriptor>,
}

impl CompositeBuilder {
    fn new(name: impl Into<String>) -> Self {
        CompositeBuilder {
            desc: CompositeDescriptor {
                name: name.into(),
                type_params: Vec::new(),
                properties: Vec::new(),
                constructors: Vec::new(),
                interfaces: Vec::new(),
                serializable: false,
                singleton: false,
                origin: TypeOrigin::Local,
            },
            primary: None,
            defaults: Vec::new(),
            mutable: Vec::new(),
            alternates: Vec::new(),
        }
    }

    /// Declare a type parameter. Properties refer to it as
    /// `TypeRef::named(param)`.
    pub fn type_param(mut self, param: impl Into<String>) -> Self {
        self.desc.type_params.push(param.into());
        self
    }

    /// Public, non-nullable property.
    pub fn property(self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.add_property(PropertyDescriptor::new(name, type_ref))
    }

    /// Public, nullable property.
    pub fn nullable_property(self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.add_property(PropertyDescriptor::new(name, type_ref).nullable())
    }

    /// Non-public property exposed through a public getter.
    pub fn getter_property(self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.add_property(PropertyDescriptor::new(name, type_ref).with_accessor(Accessor::Getter))
    }

    /// Non-public property without a getter.
    pub fn private_property(self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.add_property(PropertyDescriptor::new(name, type_ref).with_accessor(Accessor::Private))
    }

    /// Any property.
    pub fn add_property(mut self, property: PropertyDescriptor) -> Self {
        self.desc.properties.push(property);
        self
    }

    /// Declare an implemented interface.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.desc.interfaces.push(interface.into());
        self
    }

    /// Carry the serializable annotation.
    pub fn serializable(mut self) -> Self {
        self.desc.serializable = true;
        self
    }

    /// Declare an object with exactly one instance.
    pub fn singleton(mut self) -> Self {
        self.desc.singleton = true;
        self
    }

    /// Restrict the primary constructor to the named properties, in order.
    pub fn primary_constructor(mut self, params: &[&str]) -> Self {
        self.primary = Some(params.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Default value for a primary constructor parameter.
    pub fn default_value(mut self, param: impl Into<String>, value: Value) -> Self {
        self.defaults.push((param.into(), value));
        self
    }

    /// Primary constructor parameter that needs a mutable collection.
    pub fn mutable(mut self, param: impl Into<String>) -> Self {
        self.mutable.push(param.into());
        self
    }

    /// Secondary constructor, tried after the primary in declaration order.
    pub fn constructor(mut self, constructor: ConstructorDescriptor) -> Self {
        self.alternates.push(constructor);
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> TypeDescriptor {
        let CompositeBuilder {
            mut desc,
            primary,
            defaults,
            mutable,
            alternates,
        } = self;

        let names: Vec<String> = match primary {
            Some(names) => names,
            None => desc.properties.iter().map(|p| p.name.clone()).collect(),
        };
        let params = names
            .iter()
            .map(|name| {
                let mut param = match desc.property(name) {
                    Some((_, prop)) => Parameter {
                        name: prop.name.clone(),
                        type_ref: prop.type_ref.clone(),
                        nullable: prop.nullable,
                        default: None,
                        mutable: false,
                    },
                    // Left for the serializer to reject with the type's name attached.
                    None => Parameter::new(name.clone(), TypeRef::Any),
                };
                param.default = defaults
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone());
                param.mutable = mutable.iter().any(|m| m == name);
                param
            })
            .collect();

        desc.constructors.push(ConstructorDescriptor::new(params));
        desc.constructors.extend(alternates);
        TypeDescriptor::Composite(desc)
    }
}

/// Builder for [`EnumDescriptor`].
#[derive(Debug)]
pub struct EnumBuilder {
    desc: EnumDescriptor,
}

impl EnumBuilder {
    /// Declare an evolution transform.
    pub fn transform(mut self, transform: Transform) -> Self {
        self.desc.transforms.push(transform);
        self
    }

    /// Carry the serializable annotation.
    pub fn serializable(mut self) -> Self {
        self.desc.serializable = true;
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor::Enum(self.desc)
    }
}

/// Builder for [`InterfaceDescriptor`].
#[derive(Debug)]
pub struct InterfaceBuilder {
    desc: InterfaceDescriptor,
}

impl InterfaceBuilder {
    /// Declare a type parameter.
    pub fn type_param(mut self, param: impl Into<String>) -> Self {
        self.desc.type_params.push(param.into());
        self
    }

    /// Abstract, non-nullable property.
    pub fn property(mut self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.desc.properties.push(PropertyDescriptor::new(name, type_ref));
        self
    }

    /// Abstract, nullable property.
    pub fn nullable_property(mut self, name: impl Into<String>, type_ref: TypeRef) -> Self {
        self.desc
            .properties
            .push(PropertyDescriptor::new(name, type_ref).nullable());
        self
    }

    /// Declare a super-interface.
    pub fn extends(mut self, interface: impl Into<String>) -> Self {
        self.desc.interfaces.push(interface.into());
        self
    }

    /// Carry the serializable annotation.
    pub fn serializable(mut self) -> Self {
        self.desc.serializable = true;
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor::Interface(self.desc)
    }
}

/// Ensure `descriptor` is a composite, naming it in the error otherwise.
pub fn expect_composite(descriptor: &TypeDescriptor) -> Result<&CompositeDescriptor> {
    descriptor.as_composite().ok_or_else(|| {
        SerializationError::not_serializable(
            descriptor.name(),
            format!("expected a composite type, found {}", descriptor.kind_label()),
        )
    })
}
