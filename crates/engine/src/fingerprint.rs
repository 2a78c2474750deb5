//! Type fingerprints
//!
//! A wire descriptor is `"net.ledgerwire:" + base64(xxh3_128(shape))`. The
//! shape covers everything that changes how a value is laid out: type names,
//! property names in serialization order, their declared types and
//! nullability, enum constants in ordinal order and implemented interfaces.
//! A generic type also hashes its type arguments, and its properties are
//! hashed with those arguments bound, so `Holder<int>` and `Holder<string>`
//! are distinct types on the wire.
//! Two processes that declare a type identically derive the same descriptor
//! without talking to each other.
//!
//! Self-referential types hash a marker for a name already being hashed, so
//! cycles in the type graph terminate.
//!
//! Synthesized types never hash: they report the descriptor of the notation
//! they were built from, which is what makes a payload written from a
//! synthesized type indistinguishable from the original.

use crate::factory::SerializerFactory;
use crate::serializer::serialized_properties;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use ledgerwire_core::{
    CollectionKind, PropertyDescriptor, Result, TypeDescriptor, TypeOrigin,
    TypeRef,
};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// Prefix of every wire descriptor.
pub const DESCRIPTOR_DOMAIN: &str = "net.ledgerwire";

const ANY_TYPE_HASH: &str = "Any type = true";
const ARRAY_HASH: &str = "Array = true";
const TYPE_ARGUMENT_HASH: &str = "Type argument = true";
const ENUM_HASH: &str = "Enum = true";
const INTERFACE_HASH: &str = "Interface = true";
const SINGLETON_HASH: &str = "Singleton = true";
const ALREADY_SEEN_HASH: &str = "Already seen = true";
const NULLABLE_HASH: &str = "Nullable = true";
const NOT_NULLABLE_HASH: &str = "Nullable = false";

struct ShapeHasher {
    hasher: Xxh3,
}

impl ShapeHasher {
    fn new() -> Self {
        ShapeHasher {
            hasher: Xxh3::new(),
        }
    }

    /// Feed one token. Tokens are NUL-terminated so that adjacent tokens
    /// cannot run together.
    fn put(&mut self, token: &str) {
        self.hasher.update(token.as_bytes());
        self.hasher.update(&[0]);
    }

    fn finish(&self) -> String {
        format!(
            "{}:{}",
            DESCRIPTOR_DOMAIN,
            STANDARD.encode(self.hasher.digest128().to_le_bytes())
        )
    }
}

/// Descriptor over a fixed list of tokens, for serializers whose identity is
/// not a type shape.
pub(crate) fn descriptor_from_tokens(tokens: &[&str]) -> String {
    let mut hasher = ShapeHasher::new();
    for token in tokens {
        hasher.put(token);
    }
    hasher.finish()
}

/// Computes and caches wire descriptors.
///
/// The cache is keyed by declared type and only holds descriptors of types
/// resolved through the owning factory, so it is valid for that factory's
/// lifetime.
#[derive(Debug, Default)]
pub struct Fingerprinter {
    cache: DashMap<TypeRef, String>,
}

impl Fingerprinter {
    /// Empty fingerprinter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached descriptors.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Descriptor of a declared type as resolved by `factory`.
    pub fn descriptor_for(&self, type_ref: &TypeRef, factory: &SerializerFactory) -> Result<String> {
        let cached = self.cache.get(type_ref).map(|hit| hit.value().clone());
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let descriptor = match type_ref {
            TypeRef::Named(name, _) => {
                if let Some(custom) = factory.custom_for(name) {
                    return Ok(custom.descriptor().to_string());
                }
                let (ty, args) = factory.resolve_named(type_ref)?;
                self.compute_named(&ty, &args, factory)?
            }
            other => {
                let mut hasher = ShapeHasher::new();
                self.hash_type(other, factory, &mut FxHashSet::default(), &mut hasher)?;
                hasher.finish()
            }
        };
        Ok(self
            .cache
            .entry(type_ref.clone())
            .or_insert(descriptor)
            .value()
            .clone())
    }

    /// Descriptor of a specific runtime type applied to `args`. Types that
    /// are not the factory's own view of their name are hashed without
    /// caching.
    pub fn descriptor_of(
        &self,
        ty: &Arc<TypeDescriptor>,
        args: &[TypeRef],
        factory: &SerializerFactory,
    ) -> Result<String> {
        match factory.lookup_type(ty.name()) {
            Some(local) if Arc::ptr_eq(&local, ty) => {
                self.descriptor_for(&TypeRef::generic(ty.name(), args.to_vec()), factory)
            }
            _ => self.compute_named(ty, args, factory),
        }
    }

    fn compute_named(
        &self,
        ty: &Arc<TypeDescriptor>,
        args: &[TypeRef],
        factory: &SerializerFactory,
    ) -> Result<String> {
        if let TypeOrigin::Synthesized { descriptor, .. } = ty.origin() {
            return Ok(descriptor.clone());
        }
        let mut seen = FxHashSet::default();
        seen.insert(TypeRef::generic(ty.name(), args.to_vec()).to_string());
        let mut hasher = ShapeHasher::new();
        self.hash_descriptor(ty, args, factory, &mut seen, &mut hasher)?;
        Ok(hasher.finish())
    }

    fn hash_type(
        &self,
        type_ref: &TypeRef,
        factory: &SerializerFactory,
        seen: &mut FxHashSet<String>,
        hasher: &mut ShapeHasher,
    ) -> Result<()> {
        match type_ref {
            TypeRef::Any => hasher.put(ANY_TYPE_HASH),
            TypeRef::Primitive(kind) => hasher.put(kind.wire_name()),
            TypeRef::Collection(CollectionKind::Array, params) => {
                for param in params {
                    self.hash_type(param, factory, seen, hasher)?;
                }
                hasher.put(ARRAY_HASH);
            }
            TypeRef::Collection(kind, params) => {
                hasher.put(kind.wire_name());
                for param in params {
                    self.hash_type(param, factory, seen, hasher)?;
                }
            }
            TypeRef::Named(name, _) => {
                let rendered = type_ref.to_string();
                if seen.contains(&rendered) {
                    hasher.put(ALREADY_SEEN_HASH);
                    hasher.put(&rendered);
                    return Ok(());
                }
                seen.insert(rendered);
                if let Some(custom) = factory.custom_for(name) {
                    hasher.put(custom.descriptor());
                    return Ok(());
                }
                let (ty, args) = factory.resolve_named(type_ref)?;
                match ty.origin() {
                    TypeOrigin::Synthesized { descriptor, .. } => hasher.put(descriptor),
                    TypeOrigin::Local => self.hash_descriptor(&ty, &args, factory, seen, hasher)?,
                }
            }
        }
        Ok(())
    }

    fn hash_descriptor(
        &self,
        ty: &TypeDescriptor,
        args: &[TypeRef],
        factory: &SerializerFactory,
        seen: &mut FxHashSet<String>,
        hasher: &mut ShapeHasher,
    ) -> Result<()> {
        let params = ty.type_params();
        match ty {
            TypeDescriptor::Enum(e) => {
                hasher.put(&e.name);
                for constant in &e.constants {
                    hasher.put(constant);
                }
                hasher.put(ENUM_HASH);
            }
            TypeDescriptor::Composite(c) => {
                hasher.put(&c.name);
                self.hash_type_args(args, factory, seen, hasher)?;
                if c.singleton {
                    hasher.put(SINGLETON_HASH);
                }
                for property in serialized_properties(c) {
                    self.hash_property(property, params, args, factory, seen, hasher)?;
                }
                for interface in &c.interfaces {
                    self.hash_type(&TypeRef::named(interface.as_str()), factory, seen, hasher)?;
                }
            }
            TypeDescriptor::Interface(i) => {
                hasher.put(&i.name);
                hasher.put(INTERFACE_HASH);
                self.hash_type_args(args, factory, seen, hasher)?;
                for property in &i.properties {
                    self.hash_property(property, params, args, factory, seen, hasher)?;
                }
                for interface in &i.interfaces {
                    self.hash_type(&TypeRef::named(interface.as_str()), factory, seen, hasher)?;
                }
            }
        }
        Ok(())
    }

    fn hash_type_args(
        &self,
        args: &[TypeRef],
        factory: &SerializerFactory,
        seen: &mut FxHashSet<String>,
        hasher: &mut ShapeHasher,
    ) -> Result<()> {
        for arg in args {
            hasher.put(TYPE_ARGUMENT_HASH);
            self.hash_type(arg, factory, seen, hasher)?;
        }
        Ok(())
    }

    fn hash_property(
        &self,
        property: &PropertyDescriptor,
        params: &[String],
        args: &[TypeRef],
        factory: &SerializerFactory,
        seen: &mut FxHashSet<String>,
        hasher: &mut ShapeHasher,
    ) -> Result<()> {
        self.hash_type(&property.type_ref.substitute(params, args), factory, seen, hasher)?;
        hasher.put(&property.name);
        hasher.put(if property.nullable {
            NULLABLE_HASH
        } else {
            NOT_NULLABLE_HASH
        });
        Ok(())
    }
}
