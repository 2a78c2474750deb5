//! Serializer factory
//!
//! The factory is the long-lived, thread-safe half of the engine. It owns:
//! - the class path and allow-list it was created for
//! - the serializer caches, keyed by declared type and by wire descriptor
//! - registered custom and external serializers
//! - the fingerprinter and the class carpenter
//!
//! Encoder and decoder sessions are cheap and borrow a factory.
//!
//! # Concurrency
//!
//! Serializers reachable by descriptor live in two maps. The first only
//! holds serializers whose own descriptor is the key. Serializers that read a
//! foreign layout (evolution, or an interface or collection under another
//! descriptor) are keyed by the notation's name, its descriptor and the wire
//! transforms of that name, so one payload's schema never decides how another
//! payload is read.
//!
//! Cache reads are lock-free lookups in `DashMap`s. Serializers are built
//! outside any map guard and published with insert-if-absent, so two threads
//! racing to build the same serializer both end up using the first one
//! published. Registration is serialized by its own mutex.

use crate::carpenter::ClassCarpenter;
use crate::evolution::{EnumEvolutionSerializer, EvolutionSerializer};
use crate::fingerprint::Fingerprinter;
use crate::input::SerializationSchemas;
use crate::serializer::{
    AmqpSerializer, CollectionSerializer, CustomSerializer, CustomSerializerAdapter, EnumSerializer,
    ExternalSerializer, ExternalSerializerAdapter, ObjectSerializer, PrimitiveSerializer,
};
use dashmap::DashMap;
use ledgerwire_core::{
    ClassPath, ClassWhitelist, EnumDescriptor, Result, SerializationConfig, SerializationError,
    TransformSet, TypeDescriptor, TypeNotation, TypeRef, Value,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters describing the work a factory has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryStats {
    /// Default serializers built for local or synthesized types
    pub serializers_built: u64,
    /// Evolution serializers built for payload schemas
    pub evolution_serializers_built: u64,
    /// Types synthesized by the carpenter
    pub types_synthesized: u64,
    /// Custom or external registrations attempted
    pub registrations: u64,
    /// Allow-list consultations
    pub whitelist_queries: u64,
    /// Serializers reachable by their own wire descriptor
    pub cached_descriptors: usize,
    /// Serializers for foreign payload layouts
    pub cached_foreign_layouts: usize,
}

/// Identity of a payload layout that is read by something other than the
/// local serializer of the same descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ForeignLayout {
    type_name: String,
    descriptor: String,
    transforms: Option<TransformSet>,
}

impl ForeignLayout {
    fn of(notation: &TypeNotation, schemas: &SerializationSchemas) -> Self {
        let transforms = match notation {
            TypeNotation::Restricted(r) if r.is_enum() => schemas.transforms.get(&r.name).cloned(),
            _ => None,
        };
        ForeignLayout {
            type_name: notation.name().to_string(),
            descriptor: notation.descriptor().to_string(),
            transforms,
        }
    }
}

/// Type arguments `ty` is applied to. A generic type used without arguments
/// is bound to `*` throughout; a non-generic type takes none.
pub(crate) fn bind_type_args(ty: &TypeDescriptor, args: &[TypeRef]) -> Result<Vec<TypeRef>> {
    let params = ty.type_params();
    if args.is_empty() {
        return Ok(vec![TypeRef::Any; params.len()]);
    }
    if args.len() != params.len() {
        return Err(SerializationError::not_serializable(
            ty.name(),
            format!("takes {} type argument(s), found {}", params.len(), args.len()),
        ));
    }
    Ok(args.to_vec())
}

/// Whether `serializer` is the one a notation of this name asks for.
fn reads_notation(serializer: &dyn AmqpSerializer, notation: &TypeNotation) -> bool {
    let type_ref = serializer.type_ref();
    type_ref.to_string() == notation.name()
        || TypeRef::parse(notation.name()).map_or(false, |parsed| &parsed == type_ref)
}

/// Builds, caches and hands out serializers.
pub struct SerializerFactory {
    class_path: Arc<ClassPath>,
    whitelist: Arc<dyn ClassWhitelist>,
    config: SerializationConfig,
    fingerprinter: Fingerprinter,
    carpenter: ClassCarpenter,
    serializers_by_type: DashMap<TypeRef, Arc<dyn AmqpSerializer>>,
    serializers_by_descriptor: DashMap<String, Arc<dyn AmqpSerializer>>,
    foreign_serializers: DashMap<ForeignLayout, Arc<dyn AmqpSerializer>>,
    /// Custom and external serializers by target type name
    custom_serializers: RwLock<FxHashMap<String, Arc<dyn AmqpSerializer>>>,
    registration: Mutex<()>,
    /// Proxy types of custom serializers that are not on the class path
    proxy_types: DashMap<String, Arc<TypeDescriptor>>,
    transforms_cache: DashMap<String, TransformSet>,
    // Observational counters; Relaxed ordering throughout
    serializers_built: AtomicU64,
    evolution_serializers_built: AtomicU64,
    registrations: AtomicU64,
    whitelist_queries: AtomicU64,
}

impl fmt::Debug for SerializerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerFactory")
            .field("class_path", &self.class_path.id())
            .field("whitelist", &self.whitelist)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SerializerFactory {
    /// Factory with the default configuration.
    pub fn new(class_path: Arc<ClassPath>, whitelist: Arc<dyn ClassWhitelist>) -> Self {
        Self::with_config(class_path, whitelist, SerializationConfig::default())
    }

    /// Factory with an explicit configuration.
    pub fn with_config(
        class_path: Arc<ClassPath>,
        whitelist: Arc<dyn ClassWhitelist>,
        config: SerializationConfig,
    ) -> Self {
        SerializerFactory {
            class_path,
            whitelist,
            config,
            fingerprinter: Fingerprinter::new(),
            carpenter: ClassCarpenter::new(),
            serializers_by_type: DashMap::new(),
            serializers_by_descriptor: DashMap::new(),
            foreign_serializers: DashMap::new(),
            custom_serializers: RwLock::new(FxHashMap::default()),
            registration: Mutex::new(()),
            proxy_types: DashMap::new(),
            transforms_cache: DashMap::new(),
            serializers_built: AtomicU64::new(0),
            evolution_serializers_built: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            whitelist_queries: AtomicU64::new(0),
        }
    }

    /// Replace the carpenter, e.g. to plug in a different synthesizer.
    pub fn with_carpenter(mut self, carpenter: ClassCarpenter) -> Self {
        self.carpenter = carpenter;
        self
    }

    /// Local types.
    pub fn class_path(&self) -> &Arc<ClassPath> {
        &self.class_path
    }

    /// Allow-list policy.
    pub fn whitelist(&self) -> &Arc<dyn ClassWhitelist> {
        &self.whitelist
    }

    /// Configuration.
    pub fn config(&self) -> &SerializationConfig {
        &self.config
    }

    /// Carpenter used for unknown schema entries.
    pub fn carpenter(&self) -> &ClassCarpenter {
        &self.carpenter
    }

    /// Fingerprinter and its cache.
    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> FactoryStats {
        FactoryStats {
            serializers_built: self.serializers_built.load(Ordering::Relaxed),
            evolution_serializers_built: self.evolution_serializers_built.load(Ordering::Relaxed),
            types_synthesized: self.carpenter.synthesized_count(),
            registrations: self.registrations.load(Ordering::Relaxed),
            whitelist_queries: self.whitelist_queries.load(Ordering::Relaxed),
            cached_descriptors: self.serializers_by_descriptor.len(),
            cached_foreign_layouts: self.foreign_serializers.len(),
        }
    }

    // ========================================================================
    // Type resolution
    // ========================================================================

    /// Resolve a type name: class path, then custom proxies, then types this
    /// factory's carpenter synthesized.
    pub fn lookup_type(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        if let Some(ty) = self.class_path.get(name) {
            return Some(ty.clone());
        }
        let proxy = self.proxy_types.get(name).map(|ty| ty.value().clone());
        if proxy.is_some() {
            return proxy;
        }
        self.carpenter.get(name)
    }

    /// Resolve a named reference to a type and its bound arguments. A generic
    /// reference with no local type of that name may still name a type the
    /// carpenter built from a notation of the applied type, e.g.
    /// `net.x.Holder<int>`.
    pub fn resolve_named(&self, type_ref: &TypeRef) -> Result<(Arc<TypeDescriptor>, Vec<TypeRef>)> {
        let name = type_ref.as_named().ok_or_else(|| {
            SerializationError::not_serializable(type_ref.to_string(), "not a named type")
        })?;
        if let Some(ty) = self.lookup_type(name) {
            let args = bind_type_args(&ty, type_ref.type_args())?;
            return Ok((ty, args));
        }
        if !type_ref.type_args().is_empty() {
            if let Some(ty) = self.lookup_type(&type_ref.to_string()) {
                return Ok((ty, Vec::new()));
            }
        }
        Err(SerializationError::not_serializable(name, "type is not on the class path"))
    }

    /// Custom or external serializer registered for `type_name`.
    pub fn custom_for(&self, type_name: &str) -> Option<Arc<dyn AmqpSerializer>> {
        self.custom_serializers.read().get(type_name).cloned()
    }

    /// Wire descriptor of a declared type.
    pub fn descriptor_for(&self, type_ref: &TypeRef) -> Result<String> {
        self.fingerprinter.descriptor_for(type_ref, self)
    }

    /// Wire descriptor of a specific runtime type applied to `args`.
    pub fn descriptor_of(&self, ty: &Arc<TypeDescriptor>, args: &[TypeRef]) -> Result<String> {
        self.fingerprinter.descriptor_of(ty, args, self)
    }

    /// Whether `ty` implements `interface`, directly or through other
    /// interfaces.
    pub fn implements(&self, ty: &TypeDescriptor, interface: &str) -> bool {
        self.interface_closure(ty).any(|name| name == interface)
    }

    fn interface_closure(&self, ty: &TypeDescriptor) -> impl Iterator<Item = String> {
        let mut pending: Vec<String> = ty.interfaces().to_vec();
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(parent) = self.lookup_type(&name) {
                pending.extend(parent.interfaces().iter().cloned());
            }
            out.push(name);
        }
        out.into_iter()
    }

    /// Whether `value` may be stored in a slot declared as `declared`.
    pub fn is_assignable(&self, value: &Value, declared: &TypeRef) -> bool {
        match (declared, value) {
            (_, Value::Null) | (TypeRef::Any, _) => true,
            (TypeRef::Primitive(kind), v) => v.primitive_kind() == Some(*kind),
            (TypeRef::Collection(kind, _), Value::Collection(c)) => c.kind() == *kind,
            (TypeRef::Named(name, args), Value::Record(r)) => {
                r.type_name() == name
                    || (!args.is_empty() && r.type_name() == declared.to_string())
                    || self.implements(r.descriptor(), name)
            }
            (TypeRef::Named(name, _), Value::Enum(e)) => e.type_name() == name,
            _ => false,
        }
    }

    // ========================================================================
    // Allow-list
    // ========================================================================

    fn check_whitelist(&self, ty: &TypeDescriptor) -> Result<()> {
        if ty.is_synthesized() || self.proxy_types.contains_key(ty.name()) {
            return Ok(());
        }
        self.whitelist_queries.fetch_add(1, Ordering::Relaxed);
        if self.whitelist.has_listed(ty.name()) || self.is_annotated(ty) {
            return Ok(());
        }
        warn!(
            target: "ledgerwire::factory",
            type_name = %ty.name(),
            "Type rejected by allow-list"
        );
        Err(SerializationError::not_serializable(
            ty.name(),
            "type is neither on the whitelist nor annotated as serializable",
        ))
    }

    /// Annotated itself or through any interface it implements.
    fn is_annotated(&self, ty: &TypeDescriptor) -> bool {
        ty.is_annotated_serializable()
            || self.interface_closure(ty).any(|name| {
                self.lookup_type(&name)
                    .map_or(false, |i| i.is_annotated_serializable())
            })
    }

    // ========================================================================
    // Encoding side
    // ========================================================================

    /// Serializer for a declared type.
    pub fn get_declared(&self, type_ref: &TypeRef) -> Result<Arc<dyn AmqpSerializer>> {
        let cached = self.serializers_by_type.get(type_ref).map(|hit| hit.value().clone());
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let built: Arc<dyn AmqpSerializer> = match type_ref {
            TypeRef::Any => {
                return Err(SerializationError::not_serializable(
                    "*",
                    "an unconstrained slot has no serializer of its own",
                ))
            }
            TypeRef::Primitive(kind) => return Ok(PrimitiveSerializer::shared(*kind)),
            TypeRef::Collection(kind, _) => {
                if !kind.is_sanctioned() {
                    return Err(SerializationError::not_serializable(
                        type_ref.to_string(),
                        format!(
                            "{} is not a supported collection kind; use list, set, array or map",
                            kind
                        ),
                    ));
                }
                self.serializers_built.fetch_add(1, Ordering::Relaxed);
                Arc::new(CollectionSerializer::new(type_ref.clone(), self)?)
            }
            TypeRef::Named(name, _) => {
                if let Some(custom) = self.custom_for(name) {
                    return Ok(custom);
                }
                let (ty, args) = self.resolve_named(type_ref)?;
                let canonical = TypeRef::generic(ty.name(), args.clone());
                if &canonical != type_ref {
                    // `Holder` and `Holder<*>` share one serializer.
                    let serializer = self.get_declared(&canonical)?;
                    return Ok(self.publish(type_ref.clone(), serializer));
                }
                self.build_named(&ty, &args)?
            }
        };
        Ok(self.publish(type_ref.clone(), built))
    }

    /// Serializer for a runtime value stored in a slot of type `declared`.
    pub fn get_for_value(&self, value: &Value, declared: &TypeRef) -> Result<Arc<dyn AmqpSerializer>> {
        match value {
            Value::Null => Err(SerializationError::not_serializable(
                declared.to_string(),
                "null has no serializer",
            )),
            Value::Record(r) => {
                let ty = r.descriptor();
                // A generic record takes its type arguments from the slot.
                let args: &[TypeRef] = match declared {
                    TypeRef::Named(name, args) if name == ty.name() => args.as_slice(),
                    _ => &[],
                };
                self.get_for_runtime_type(ty, &bind_type_args(ty, args)?)
            }
            Value::Enum(e) => self.get_for_runtime_type(e.descriptor(), &[]),
            Value::Collection(c) => {
                let type_ref = match declared {
                    TypeRef::Collection(kind, _) if *kind == c.kind() => declared.clone(),
                    _ => TypeRef::Collection(c.kind(), vec![TypeRef::Any; c.kind().arity()]),
                };
                self.get_declared(&type_ref)
            }
            scalar => match scalar.primitive_kind() {
                Some(kind) => Ok(PrimitiveSerializer::shared(kind)),
                None => Err(SerializationError::not_serializable(
                    scalar.type_label(),
                    "value has no serializer",
                )),
            },
        }
    }

    fn get_for_runtime_type(
        &self,
        ty: &Arc<TypeDescriptor>,
        args: &[TypeRef],
    ) -> Result<Arc<dyn AmqpSerializer>> {
        if let Some(custom) = self.custom_for(ty.name()) {
            return Ok(custom);
        }
        match self.lookup_type(ty.name()) {
            Some(local) if Arc::ptr_eq(&local, ty) || *local == **ty => {
                self.get_declared(&TypeRef::generic(ty.name(), args.to_vec()))
            }
            _ => {
                debug!(
                    target: "ledgerwire::factory",
                    type_name = %ty.name(),
                    "Value's runtime type is foreign to this factory"
                );
                self.build_named(ty, args)
            }
        }
    }

    fn build_named(&self, ty: &Arc<TypeDescriptor>, args: &[TypeRef]) -> Result<Arc<dyn AmqpSerializer>> {
        self.check_whitelist(ty)?;
        let serializer: Arc<dyn AmqpSerializer> = match &**ty {
            TypeDescriptor::Enum(_) => Arc::new(EnumSerializer::new(ty.clone(), self)?),
            TypeDescriptor::Composite(_) | TypeDescriptor::Interface(_) => {
                Arc::new(ObjectSerializer::with_type_args(ty.clone(), args, self)?)
            }
        };
        self.serializers_built.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "ledgerwire::factory",
            type_name = %ty.name(),
            descriptor = %serializer.descriptor(),
            "Built serializer"
        );
        Ok(serializer)
    }

    /// Insert-if-absent under both keys; returns whichever serializer won.
    fn publish(&self, type_ref: TypeRef, built: Arc<dyn AmqpSerializer>) -> Arc<dyn AmqpSerializer> {
        let serializer = self
            .serializers_by_type
            .entry(type_ref)
            .or_insert(built)
            .value()
            .clone();
        self.serializers_by_descriptor
            .entry(serializer.descriptor().to_string())
            .or_insert_with(|| serializer.clone());
        serializer
    }

    /// Validated transforms of an enum, cached for the factory's own types.
    pub fn transforms_for(&self, e: &EnumDescriptor) -> Result<TransformSet> {
        let cached = self.transforms_cache.get(&e.name).map(|hit| hit.value().clone());
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let set = TransformSet::from_declared(&e.name, &e.transforms)?;
        set.validate(&e.name, &e.constants)?;
        let is_local = self
            .lookup_type(&e.name)
            .map_or(false, |ty| ty.as_enum() == Some(e));
        if is_local {
            self.transforms_cache.insert(e.name.clone(), set.clone());
        }
        Ok(set)
    }

    // ========================================================================
    // Decoding side
    // ========================================================================

    /// Serializer for a wire descriptor, processing `schemas` on a miss.
    ///
    /// The payload's notation for `descriptor` decides which type is being
    /// read. A cached serializer for a different type under the same
    /// descriptor is a conflict, never a match.
    pub fn get_by_descriptor(
        &self,
        descriptor: &str,
        schemas: &SerializationSchemas,
    ) -> Result<Arc<dyn AmqpSerializer>> {
        let notation = schemas.schema.by_descriptor(descriptor).ok_or_else(|| {
            SerializationError::decode(format!(
                "descriptor {} is not described by the payload's schema",
                descriptor
            ))
        })?;
        if let Some(hit) = self.resolved(notation, schemas)? {
            return Ok(hit);
        }
        self.process_schema(schemas)?;
        self.resolved(notation, schemas)?.ok_or_else(|| {
            SerializationError::not_serializable(
                notation.name(),
                "no serializer could be resolved for the payload's notation",
            )
        })
    }

    /// Cached serializer for `notation`, if any.
    fn resolved(
        &self,
        notation: &TypeNotation,
        schemas: &SerializationSchemas,
    ) -> Result<Option<Arc<dyn AmqpSerializer>>> {
        // Clone out so the shard guard is released before anything below
        // touches the map again.
        let cached = self
            .serializers_by_descriptor
            .get(notation.descriptor())
            .map(|hit| hit.value().clone());
        if let Some(hit) = cached {
            if !reads_notation(hit.as_ref(), notation) {
                if let Some(owner) = self.rightful_owner(notation, hit.as_ref())? {
                    return Ok(Some(owner));
                }
                warn!(
                    target: "ledgerwire::factory",
                    type_name = %notation.name(),
                    descriptor = %notation.descriptor(),
                    local = %hit.type_ref(),
                    "Payload reuses the descriptor of another type"
                );
                return Err(SerializationError::not_serializable(
                    notation.name(),
                    format!(
                        "descriptor {} belongs to {} in this factory",
                        notation.descriptor(),
                        hit.type_ref()
                    ),
                ));
            }
            return Ok(Some(hit));
        }
        Ok(self
            .foreign_serializers
            .get(&ForeignLayout::of(notation, schemas))
            .map(|hit| hit.value().clone()))
    }

    /// A synthesized type may have been built from a notation that claimed
    /// the descriptor of a local type. When `notation` names that local type
    /// and the factory derives the same descriptor for it, the local type
    /// takes the descriptor back.
    fn rightful_owner(
        &self,
        notation: &TypeNotation,
        squatter: &dyn AmqpSerializer,
    ) -> Result<Option<Arc<dyn AmqpSerializer>>> {
        if !squatter.type_descriptor().map_or(false, |ty| ty.is_synthesized()) {
            return Ok(None);
        }
        let (ty, args) = match self.resolve_notation(notation.name()) {
            Some((ty, args)) if !ty.is_synthesized() => (ty, args),
            _ => return Ok(None),
        };
        let local = self.get_for_runtime_type(&ty, &args)?;
        if local.descriptor() != notation.descriptor() {
            return Ok(None);
        }
        warn!(
            target: "ledgerwire::factory",
            type_name = %notation.name(),
            squatter = %squatter.type_ref(),
            "Local type reclaimed its descriptor from a synthesized type"
        );
        self.serializers_by_descriptor
            .insert(notation.descriptor().to_string(), local.clone());
        Ok(Some(local))
    }

    /// Make every notation in `schemas` resolvable by descriptor.
    fn process_schema(&self, schemas: &SerializationSchemas) -> Result<()> {
        let missing: Vec<&TypeNotation> = schemas
            .schema
            .types()
            .iter()
            .filter(|n| matches!(self.resolved(n, schemas), Ok(None)))
            .filter(|n| match n {
                TypeNotation::Composite(_) => true,
                TypeNotation::Restricted(r) => r.is_enum(),
            })
            .filter(|n| self.resolve_notation(n.name()).is_none())
            .collect();

        if let Some(first) = missing.first() {
            if !self.config.carpenter_enabled {
                return Err(crate::carpenter::CarpenterError::Disabled {
                    name: first.name().to_string(),
                }
                .into());
            }
            let lookup = |name: &str| self.lookup_type(name);
            self.carpenter.build_all(&missing, &lookup)?;
        }

        for notation in schemas.schema.types() {
            if self.resolved(notation, schemas)?.is_none() {
                self.process_notation(notation, schemas)?;
            }
        }
        Ok(())
    }

    fn process_notation(&self, notation: &TypeNotation, schemas: &SerializationSchemas) -> Result<()> {
        let wire_descriptor = notation.descriptor();
        match notation {
            TypeNotation::Composite(c) => {
                let (ty, args) = self.require_type(&c.name)?;
                let local = self.get_for_runtime_type(&ty, &args)?;
                if local.descriptor() == wire_descriptor {
                    self.alias_own(local);
                    return Ok(());
                }
                match &*ty {
                    TypeDescriptor::Composite(_) => {
                        let evolution = EvolutionSerializer::new(c, ty.clone(), &args)?;
                        self.evolution_serializers_built.fetch_add(1, Ordering::Relaxed);
                        info!(
                            target: "ledgerwire::evolution",
                            type_name = %c.name,
                            constructor = evolution.constructor_index(),
                            "Built evolution serializer"
                        );
                        self.adopt_foreign(notation, schemas, Arc::new(evolution));
                    }
                    // Interfaces never carry values; any layout resolves to the local one.
                    TypeDescriptor::Interface(_) => self.adopt_foreign(notation, schemas, local),
                    TypeDescriptor::Enum(_) => {
                        return Err(SerializationError::not_serializable(
                            c.name.clone(),
                            "payload describes a composite, the local type is an enum",
                        ))
                    }
                }
            }
            TypeNotation::Restricted(r) if r.is_enum() => {
                let (ty, args) = self.require_type(&r.name)?;
                let local = self.get_for_runtime_type(&ty, &args)?;
                if local.descriptor() == wire_descriptor {
                    self.alias_own(local);
                    return Ok(());
                }
                let e = ty.as_enum().ok_or_else(|| {
                    SerializationError::not_serializable(
                        r.name.clone(),
                        format!("payload describes an enum, the local type is {}", ty.kind_label()),
                    )
                })?;
                let local_transforms = self.transforms_for(e)?;
                let evolution = EnumEvolutionSerializer::new(
                    r,
                    schemas.transforms.get(&r.name),
                    ty.clone(),
                    &local_transforms,
                )?;
                self.evolution_serializers_built.fetch_add(1, Ordering::Relaxed);
                info!(
                    target: "ledgerwire::evolution",
                    type_name = %r.name,
                    "Built enum evolution serializer"
                );
                self.adopt_foreign(notation, schemas, Arc::new(evolution));
            }
            TypeNotation::Restricted(r) => match TypeRef::parse(&r.name) {
                Ok(type_ref @ TypeRef::Collection(..)) => {
                    let local = self.get_declared(&type_ref)?;
                    if local.descriptor() == wire_descriptor {
                        self.alias_own(local);
                    } else {
                        self.adopt_foreign(notation, schemas, local);
                    }
                }
                _ => match self.custom_for(&r.name) {
                    Some(custom) => {
                        return Err(SerializationError::not_serializable(
                            r.name.clone(),
                            format!(
                                "registered serializer writes {}, payload uses {}",
                                custom.descriptor(),
                                wire_descriptor
                            ),
                        ))
                    }
                    None => {
                        return Err(SerializationError::not_serializable(
                            r.name.clone(),
                            format!("no custom serializer is registered for source {}", r.source),
                        ))
                    }
                },
            },
        }
        Ok(())
    }

    /// Type a notation name refers to. `net.x.Holder<int>` is the local
    /// generic `net.x.Holder` applied to `int` when one exists, and otherwise
    /// a type of that full name (one the carpenter synthesized).
    fn resolve_notation(&self, name: &str) -> Option<(Arc<TypeDescriptor>, Vec<TypeRef>)> {
        if let Some(ty) = self.lookup_type(name) {
            return Some((ty, Vec::new()));
        }
        match TypeRef::parse(name) {
            Ok(type_ref @ TypeRef::Named(..)) if !type_ref.type_args().is_empty() => {
                self.resolve_named(&type_ref).ok()
            }
            _ => None,
        }
    }

    fn require_type(&self, name: &str) -> Result<(Arc<TypeDescriptor>, Vec<TypeRef>)> {
        let (ty, args) = self.resolve_notation(name).ok_or_else(|| {
            SerializationError::not_serializable(name, "type is not known locally and was not synthesized")
        })?;
        let args = bind_type_args(&ty, &args)?;
        Ok((ty, args))
    }

    /// Publish a local serializer under the descriptor the factory derives
    /// for it.
    fn alias_own(&self, serializer: Arc<dyn AmqpSerializer>) {
        self.serializers_by_descriptor
            .entry(serializer.descriptor().to_string())
            .or_insert(serializer);
    }

    /// Make `serializer` the reader of a layout whose descriptor is not its
    /// own.
    fn adopt_foreign(
        &self,
        notation: &TypeNotation,
        schemas: &SerializationSchemas,
        serializer: Arc<dyn AmqpSerializer>,
    ) {
        self.foreign_serializers
            .entry(ForeignLayout::of(notation, schemas))
            .or_insert(serializer);
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Take over a type with a proxy-based serializer.
    ///
    /// Registering the same serializer twice is a no-op. Registration fails
    /// with `RegistrationConflict` when a different serializer is already
    /// registered for the type, or when the type's default serializer has
    /// already been used by this factory.
    pub fn register_custom_serializer(&self, custom: Arc<dyn CustomSerializer>) -> Result<()> {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        let _guard = self.registration.lock();
        let type_name = custom.type_name().to_string();
        self.check_registrable(&type_name)?;

        let proxy = custom.proxy_type().clone();
        if proxy.as_composite().is_none() {
            return Err(SerializationError::RegistrationConflict {
                type_name,
                reason: format!("proxy {} must be a composite", proxy.name()),
            });
        }
        match self.lookup_type(proxy.name()) {
            Some(existing) if !Arc::ptr_eq(&existing, &proxy) && *existing != *proxy => {
                return Err(SerializationError::RegistrationConflict {
                    type_name,
                    reason: format!("proxy {} clashes with a different type of that name", proxy.name()),
                })
            }
            _ => {
                self.proxy_types.insert(proxy.name().to_string(), proxy);
            }
        }

        let adapter = CustomSerializerAdapter::new(custom, self)?;
        self.install(type_name, Arc::new(adapter))
    }

    /// Take over a type with an opaque byte encoding.
    pub fn register_external_serializer(&self, external: Arc<dyn ExternalSerializer>) -> Result<()> {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        let _guard = self.registration.lock();
        let type_name = external.type_name().to_string();
        self.check_registrable(&type_name)?;
        self.install(type_name, Arc::new(ExternalSerializerAdapter::new(external)))
    }

    fn check_registrable(&self, type_name: &str) -> Result<()> {
        if self.serializers_by_type.contains_key(&TypeRef::named(type_name)) {
            warn!(
                target: "ledgerwire::factory",
                type_name = %type_name,
                "Custom serializer registered after the default was used"
            );
            return Err(SerializationError::RegistrationConflict {
                type_name: type_name.to_string(),
                reason: "the default serializer for this type is already in use".to_string(),
            });
        }
        Ok(())
    }

    fn install(&self, type_name: String, adapter: Arc<dyn AmqpSerializer>) -> Result<()> {
        let mut customs = self.custom_serializers.write();
        if let Some(existing) = customs.get(&type_name) {
            if existing.descriptor() == adapter.descriptor() {
                debug!(
                    target: "ledgerwire::factory",
                    type_name = %type_name,
                    "Serializer already registered"
                );
                return Ok(());
            }
            return Err(SerializationError::RegistrationConflict {
                type_name,
                reason: "a different serializer is already registered for this type".to_string(),
            });
        }
        self.serializers_by_descriptor
            .insert(adapter.descriptor().to_string(), adapter.clone());
        info!(
            target: "ledgerwire::factory",
            type_name = %type_name,
            descriptor = %adapter.descriptor(),
            "Registered serializer"
        );
        customs.insert(type_name, adapter);
        Ok(())
    }
}
