//! Local types and the allow-list
//!
//! A [`ClassPath`] is the set of types a process knows about, keyed by fully
//! qualified name. It is assembled once at startup and then only read, so it
//! is shared behind an `Arc` without interior locking.
//!
//! The allow-list is an external policy. The engine only asks it one
//! question, [`ClassWhitelist::has_listed`].

use crate::descriptor::TypeDescriptor;
use crate::error::{Result, SerializationError};
use crate::value::{Record, Value};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Types known to the local process.
#[derive(Debug)]
pub struct ClassPath {
    id: Uuid,
    types: BTreeMap<String, Arc<TypeDescriptor>>,
    singletons: BTreeMap<String, Arc<Record>>,
}

impl Default for ClassPath {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassPath {
    /// Empty class path with a fresh identity.
    pub fn new() -> Self {
        ClassPath {
            id: Uuid::new_v4(),
            types: BTreeMap::new(),
            singletons: BTreeMap::new(),
        }
    }

    /// Register a type, returning the shared descriptor.
    ///
    /// Singleton composites get their one instance created here.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        let name = descriptor.name().to_string();
        if self.types.contains_key(&name) {
            return Err(SerializationError::not_serializable(
                name,
                "type is already registered on this class path",
            ));
        }
        let descriptor = Arc::new(descriptor);
        if let Some(composite) = descriptor.as_composite() {
            if composite.singleton {
                if !composite.properties.is_empty() {
                    return Err(SerializationError::not_serializable(
                        name,
                        "singleton types cannot declare properties",
                    ));
                }
                let instance = Record::new(descriptor.clone(), Vec::new())?;
                self.singletons.insert(name.clone(), Arc::new(instance));
            }
        }
        self.types.insert(name, descriptor.clone());
        Ok(descriptor)
    }

    /// Builder-style [`ClassPath::register`].
    pub fn with(mut self, descriptor: TypeDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Identity of this class path.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Descriptor by name.
    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// The one instance of a singleton type.
    pub fn singleton(&self, name: &str) -> Option<&Arc<Record>> {
        self.singletons.get(name)
    }

    /// The singleton instance as a value.
    pub fn singleton_value(&self, name: &str) -> Option<Value> {
        self.singleton(name).map(|r| Value::Record(r.clone()))
    }

    /// All registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ============================================================================
// Allow-list
// ============================================================================

/// Allow-list policy consulted before a composite, enum or interface is
/// serialized or deserialized.
pub trait ClassWhitelist: Send + Sync + std::fmt::Debug {
    /// Whether `type_name` is explicitly allowed.
    fn has_listed(&self, type_name: &str) -> bool;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllWhitelist;

impl ClassWhitelist for AllWhitelist {
    fn has_listed(&self, _type_name: &str) -> bool {
        true
    }
}

/// Allows nothing; only annotated types pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyWhitelist;

impl ClassWhitelist for EmptyWhitelist {
    fn has_listed(&self, _type_name: &str) -> bool {
        false
    }
}

/// Allows an explicit set of names.
#[derive(Debug, Clone, Default)]
pub struct ListedWhitelist {
    names: FxHashSet<String>,
}

impl ListedWhitelist {
    /// Allow the given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ListedWhitelist {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ClassWhitelist for ListedWhitelist {
    fn has_listed(&self, type_name: &str) -> bool {
        self.names.contains(type_name)
    }
}
