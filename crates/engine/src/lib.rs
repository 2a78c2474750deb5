//! Serialization engine for ledgerwire
//!
//! This crate turns runtime object graphs into self-describing envelopes and
//! back:
//! - SerializerFactory: builds and caches one serializer per type
//! - Fingerprinter: structural wire descriptors
//! - SerializationOutput: encoder session (payload, schema, transforms)
//! - DeserializationInput: decoder session (references, evolution)
//! - Evolution serializers: reading older or newer layouts into local types
//! - ClassCarpenter: stand-in types for schema entries unknown locally
//! - SerializationScheme: per-context factories for callers
//!
//! The data model (types, values, schema, envelope framing) lives in
//! `ledgerwire-core`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod carpenter;
pub mod evolution;
pub mod factory;
pub mod fingerprint;
pub mod input;
pub mod output;
pub mod scheme;
pub mod serializer;

pub use carpenter::{CarpenterError, ClassCarpenter, SchemaSynthesizer, TypeSynthesizer};
pub use evolution::{EnumEvolutionSerializer, EvolutionSerializer};
pub use factory::{FactoryStats, SerializerFactory};
pub use fingerprint::{Fingerprinter, DESCRIPTOR_DOMAIN};
pub use input::{DeserializationInput, ObjectAndEnvelope, SerializationSchemas};
pub use output::{BytesAndSchemas, SerializationOutput};
pub use scheme::{SerializationContext, SerializationScheme, UseCase};
pub use serializer::{
    AmqpSerializer, CollectionSerializer, CustomSerializer, EnumSerializer, ExternalSerializer,
    ObjectSerializer, PrimitiveSerializer, ProxySerializer,
};
