//! Core types for ledgerwire
//!
//! This crate defines the data model shared by the encoder and decoder:
//! - TypeRef: declared types and their wire strings
//! - TypeDescriptor: reflective description of composites, enums and interfaces
//! - ClassPath / ClassWhitelist: local types and the allow-list policy
//! - Value / Record: the runtime object graph
//! - WireValue: the payload tree
//! - Schema / TransformsSchema: the self-describing sections of an envelope
//! - Envelope: framing
//! - SerializationConfig: limits and switches
//! - SerializationError: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod class_path;
pub mod config;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod schema;
pub mod transforms;
pub mod types;
pub mod value;
pub mod wire;

pub use class_path::{AllWhitelist, ClassPath, ClassWhitelist, EmptyWhitelist, ListedWhitelist};
pub use config::{SerializationConfig, CONFIG_FILE_NAME};
pub use descriptor::{
    Accessor, CompositeBuilder, CompositeDescriptor, ConstructorDescriptor, EnumBuilder,
    EnumDescriptor, InterfaceBuilder, InterfaceDescriptor, Parameter, PropertyDescriptor,
    TypeDescriptor, TypeOrigin,
};
pub use envelope::{Envelope, EnvelopeError, ENVELOPE_MAGIC, FORMAT_MAJOR, FORMAT_MINOR};
pub use error::{Result, SerializationError};
pub use schema::{
    Choice, CompositeKind, CompositeType, Field, RestrictedType, Schema, TypeNotation,
    BINARY_SOURCE, ENUM_SOURCE,
};
pub use transforms::{Transform, TransformError, TransformKind, TransformSet, TransformsSchema};
pub use types::{CollectionKind, PrimitiveKind, TypeRef, TypeRefParseError};
pub use value::{Capability, CollectionValue, Elements, EnumValue, Mutability, Record, Value};
pub use wire::WireValue;
