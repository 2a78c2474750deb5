//! Class carpenter
//!
//! When a payload mentions a composite, interface or enum that the local
//! process does not have, the carpenter synthesizes a stand-in type from the
//! schema notation. Synthesized composites expose every field as a public
//! property, have one constructor taking the fields in notation order, and
//! carry the wire descriptor they were built from, so re-encoding them
//! reproduces the original notation exactly.
//!
//! Each carpenter owns a namespace. Within it a name is synthesized at most
//! once; concurrent requests for the same name observe the same `Arc`.

use dashmap::DashMap;
use ledgerwire_core::{
    CompositeDescriptor, CompositeKind, ConstructorDescriptor, EnumDescriptor, InterfaceDescriptor,
    Parameter, PropertyDescriptor, SerializationError, TypeDescriptor, TypeNotation, TypeOrigin,
    TypeRef,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Carpentry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CarpenterError {
    /// Synthesis is switched off by configuration
    #[error("type {name} is not known locally and carpentry is disabled")]
    Disabled {
        /// Missing type
        name: String,
    },

    /// The notation cannot be turned into a type
    #[error("cannot synthesize {name}: {reason}")]
    CannotSynthesize {
        /// Type being synthesized
        name: String,
        /// Cause
        reason: String,
    },

    /// A synthesized type does not satisfy an interface it declares
    #[error("{name} does not satisfy interface {interface}: {reason}")]
    CapabilityMismatch {
        /// Type being synthesized
        name: String,
        /// Declared interface
        interface: String,
        /// Cause
        reason: String,
    },

    /// Types to synthesize depend on each other in a cycle
    #[error("cyclic dependency while synthesizing {name}")]
    CyclicDependency {
        /// A type on the cycle
        name: String,
    },
}

impl CarpenterError {
    fn cannot(name: &str, reason: impl Into<String>) -> Self {
        CarpenterError::CannotSynthesize {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    fn mismatch(name: &str, interface: &str, reason: impl Into<String>) -> Self {
        CarpenterError::CapabilityMismatch {
            name: name.to_string(),
            interface: interface.to_string(),
            reason: reason.into(),
        }
    }

    /// Type the failure concerns.
    pub fn type_name(&self) -> &str {
        match self {
            CarpenterError::Disabled { name }
            | CarpenterError::CannotSynthesize { name, .. }
            | CarpenterError::CapabilityMismatch { name, .. }
            | CarpenterError::CyclicDependency { name } => name,
        }
    }
}

impl From<CarpenterError> for SerializationError {
    fn from(e: CarpenterError) -> Self {
        SerializationError::not_serializable(e.type_name().to_string(), e.to_string())
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Turns one schema notation into a type descriptor.
pub trait TypeSynthesizer: Send + Sync + fmt::Debug {
    /// Describe the type of `notation`. `namespace` identifies the carpenter.
    fn synthesize(&self, notation: &TypeNotation, namespace: Uuid) -> Result<TypeDescriptor, CarpenterError>;
}

/// Default synthesizer: public fields, one constructor in field order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaSynthesizer;

impl TypeSynthesizer for SchemaSynthesizer {
    fn synthesize(&self, notation: &TypeNotation, namespace: Uuid) -> Result<TypeDescriptor, CarpenterError> {
        let name = notation.name();
        let origin = TypeOrigin::Synthesized {
            namespace,
            descriptor: notation.descriptor().to_string(),
        };
        match notation {
            TypeNotation::Composite(c) => {
                let mut seen = FxHashSet::default();
                let mut properties = Vec::with_capacity(c.fields.len());
                for field in &c.fields {
                    if field.name.is_empty() {
                        return Err(CarpenterError::cannot(name, "field with an empty name"));
                    }
                    if !seen.insert(field.name.as_str()) {
                        return Err(CarpenterError::cannot(
                            name,
                            format!("field {} appears twice", field.name),
                        ));
                    }
                    let type_ref = TypeRef::parse(&field.type_name).map_err(|e| {
                        CarpenterError::cannot(name, format!("field {}: {}", field.name, e))
                    })?;
                    let mut property = PropertyDescriptor::new(field.name.clone(), type_ref);
                    property.nullable = !field.mandatory;
                    properties.push(property);
                }
                match c.kind {
                    CompositeKind::Class => {
                        let params = properties
                            .iter()
                            .map(|p| {
                                let mut param = Parameter::new(p.name.clone(), p.type_ref.clone());
                                param.nullable = p.nullable;
                                param
                            })
                            .collect();
                        Ok(TypeDescriptor::Composite(CompositeDescriptor {
                            name: name.to_string(),
                            type_params: Vec::new(),
                            properties,
                            constructors: vec![ConstructorDescriptor::new(params)],
                            interfaces: c.provides.clone(),
                            serializable: true,
                            singleton: false,
                            origin,
                        }))
                    }
                    CompositeKind::Interface => Ok(TypeDescriptor::Interface(InterfaceDescriptor {
                        name: name.to_string(),
                        type_params: Vec::new(),
                        properties,
                        interfaces: c.provides.clone(),
                        serializable: true,
                        origin,
                    })),
                }
            }
            TypeNotation::Restricted(r) if r.is_enum() => {
                let mut seen = FxHashSet::default();
                for choice in &r.choices {
                    if !seen.insert(choice.name.as_str()) {
                        return Err(CarpenterError::cannot(
                            name,
                            format!("constant {} appears twice", choice.name),
                        ));
                    }
                }
                Ok(TypeDescriptor::Enum(EnumDescriptor {
                    name: name.to_string(),
                    constants: r.choices.iter().map(|c| c.name.clone()).collect(),
                    transforms: Vec::new(),
                    serializable: true,
                    origin,
                }))
            }
            TypeNotation::Restricted(r) => Err(CarpenterError::cannot(
                name,
                format!("restricted types with source {} cannot be synthesized", r.source),
            )),
        }
    }
}

// ============================================================================
// Carpenter
// ============================================================================

/// Lookup of types already known outside the carpenter.
pub type TypeLookup<'a> = dyn Fn(&str) -> Option<Arc<TypeDescriptor>> + 'a;

/// Synthesizes and remembers stand-in types.
#[derive(Debug)]
pub struct ClassCarpenter {
    namespace: Uuid,
    types: DashMap<String, Arc<TypeDescriptor>>,
    synthesizer: Arc<dyn TypeSynthesizer>,
    synthesized: AtomicU64,
}

impl Default for ClassCarpenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassCarpenter {
    /// Carpenter with a fresh namespace and the default synthesizer.
    pub fn new() -> Self {
        Self::with_synthesizer(Arc::new(SchemaSynthesizer))
    }

    /// Carpenter with a fresh namespace and a custom synthesizer.
    pub fn with_synthesizer(synthesizer: Arc<dyn TypeSynthesizer>) -> Self {
        ClassCarpenter {
            namespace: Uuid::new_v4(),
            types: DashMap::new(),
            synthesizer,
            synthesized: AtomicU64::new(0),
        }
    }

    /// Namespace of this carpenter.
    pub fn namespace(&self) -> Uuid {
        self.namespace
    }

    /// Previously synthesized type.
    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).map(|t| t.value().clone())
    }

    /// Number of synthesized types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether nothing has been synthesized.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Total types synthesized, including ones discarded after losing a race.
    pub fn synthesized_count(&self) -> u64 {
        self.synthesized.load(Ordering::Relaxed)
    }

    /// Synthesize one type. Interfaces it declares must already be
    /// resolvable through `lookup` or this carpenter.
    pub fn build(&self, notation: &TypeNotation, lookup: &TypeLookup<'_>) -> Result<Arc<TypeDescriptor>, CarpenterError> {
        let name = notation.name();
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let descriptor = self.synthesizer.synthesize(notation, self.namespace)?;
        if descriptor.name() != name {
            return Err(CarpenterError::cannot(
                name,
                format!("synthesizer produced {}", descriptor.name()),
            ));
        }
        self.check_capabilities(&descriptor, lookup)?;
        self.synthesized.fetch_add(1, Ordering::Relaxed);

        let built = self
            .types
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(descriptor))
            .value()
            .clone();
        debug!(
            target: "ledgerwire::carpenter",
            type_name = %name,
            kind = built.kind_label(),
            "Synthesized type"
        );
        Ok(built)
    }

    /// Synthesize a batch, dependencies first.
    pub fn build_all(
        &self,
        notations: &[&TypeNotation],
        lookup: &TypeLookup<'_>,
    ) -> Result<Vec<Arc<TypeDescriptor>>, CarpenterError> {
        let order = dependency_order(notations)?;
        let combined = |name: &str| lookup(name).or_else(|| self.get(name));
        let mut built = Vec::with_capacity(order.len());
        for notation in order {
            built.push(self.build(notation, &combined)?);
        }
        if !built.is_empty() {
            info!(
                target: "ledgerwire::carpenter",
                count = built.len(),
                namespace = %self.namespace,
                "Synthesized types for unknown schema entries"
            );
        }
        Ok(built)
    }

    /// Every declared interface must be an interface whose properties the
    /// synthesized composite exposes with the same type and nullability.
    fn check_capabilities(&self, descriptor: &TypeDescriptor, lookup: &TypeLookup<'_>) -> Result<(), CarpenterError> {
        let composite = match descriptor.as_composite() {
            Some(c) => c,
            None => return Ok(()),
        };
        let mut pending: Vec<String> = composite.interfaces.clone();
        let mut checked = FxHashSet::default();
        while let Some(interface) = pending.pop() {
            if !checked.insert(interface.clone()) {
                continue;
            }
            let found = lookup(&interface)
                .or_else(|| self.get(&interface))
                .ok_or_else(|| CarpenterError::mismatch(&composite.name, &interface, "interface is not known"))?;
            let iface = found.as_interface().ok_or_else(|| {
                CarpenterError::mismatch(
                    &composite.name,
                    &interface,
                    format!("{} is a {}", interface, found.kind_label()),
                )
            })?;
            for required in &iface.properties {
                let required_type = required.type_ref.substitute(&iface.type_params, &[]);
                match composite.property(&required.name) {
                    Some((_, p)) if fits(&p.type_ref, &required_type) && p.nullable == required.nullable => {}
                    Some((_, p)) => {
                        return Err(CarpenterError::mismatch(
                            &composite.name,
                            &interface,
                            format!(
                                "property {} is {}{}, interface requires {}{}",
                                required.name,
                                p.type_ref,
                                if p.nullable { "?" } else { "" },
                                required.type_ref,
                                if required.nullable { "?" } else { "" }
                            ),
                        ))
                    }
                    None => {
                        return Err(CarpenterError::mismatch(
                            &composite.name,
                            &interface,
                            format!("property {} is missing", required.name),
                        ))
                    }
                }
            }
            pending.extend(iface.interfaces.iter().cloned());
        }
        Ok(())
    }
}

/// Whether a property of type `actual` satisfies `required`, where `*` in
/// `required` stands for an unbound type variable of a generic interface.
fn fits(actual: &TypeRef, required: &TypeRef) -> bool {
    match (actual, required) {
        (_, TypeRef::Any) => true,
        (TypeRef::Named(a, a_args), TypeRef::Named(r, r_args)) if a == r && a_args.len() == r_args.len() => {
            a_args.iter().zip(r_args).all(|(a, r)| fits(a, r))
        }
        (TypeRef::Collection(a, a_params), TypeRef::Collection(r, r_params)) if a == r => {
            a_params.len() == r_params.len() && a_params.iter().zip(r_params).all(|(a, r)| fits(a, r))
        }
        _ => actual == required,
    }
}

/// Names a type reference depends on: bare names, plus the full rendering
/// of generic references, which is how synthesized instances are named.
fn mentioned_names(type_ref: &TypeRef, out: &mut Vec<String>) {
    match type_ref {
        TypeRef::Named(name, args) => {
            out.push(name.clone());
            if !args.is_empty() {
                out.push(type_ref.to_string());
            }
            args.iter().for_each(|a| mentioned_names(a, out));
        }
        TypeRef::Collection(_, params) => params.iter().for_each(|p| mentioned_names(p, out)),
        TypeRef::Any | TypeRef::Primitive(_) => {}
    }
}

/// Order notations so that every notation follows the notations it depends
/// on (field types and interfaces within the batch). Self references are
/// allowed; longer cycles are not.
fn dependency_order<'n>(notations: &[&'n TypeNotation]) -> Result<Vec<&'n TypeNotation>, CarpenterError> {
    let by_name: FxHashMap<&str, &'n TypeNotation> =
        notations.iter().map(|n| (n.name(), *n)).collect();

    let dependencies = |notation: &TypeNotation| -> Vec<String> {
        let mut deps: Vec<String> = notation.provides().to_vec();
        if let TypeNotation::Composite(c) = notation {
            for field in &c.fields {
                if let Ok(type_ref) = TypeRef::parse(&field.type_name) {
                    mentioned_names(&type_ref, &mut deps);
                }
            }
        }
        deps.retain(|d| d != notation.name() && by_name.contains_key(d.as_str()));
        deps
    };

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'n>(
        notation: &'n TypeNotation,
        by_name: &FxHashMap<&str, &'n TypeNotation>,
        dependencies: &dyn Fn(&TypeNotation) -> Vec<String>,
        marks: &mut FxHashMap<String, Mark>,
        out: &mut Vec<&'n TypeNotation>,
    ) -> Result<(), CarpenterError> {
        match marks.get(notation.name()) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(CarpenterError::CyclicDependency {
                    name: notation.name().to_string(),
                })
            }
            None => {}
        }
        marks.insert(notation.name().to_string(), Mark::Visiting);
        for dep in dependencies(notation) {
            if let Some(next) = by_name.get(dep.as_str()) {
                visit(next, by_name, dependencies, marks, out)?;
            }
        }
        marks.insert(notation.name().to_string(), Mark::Done);
        out.push(notation);
        Ok(())
    }

    let mut marks = FxHashMap::default();
    let mut out = Vec::with_capacity(notations.len());
    for notation in notations {
        visit(notation, &by_name, &dependencies, &mut marks, &mut out)?;
    }
    Ok(out)
}
