//! Serialization scheme
//!
//! The consumer-facing entry point. A scheme hands out one
//! [`SerializerFactory`] per (class path, allow-list) pair and replays
//! scheme-level serializer registrations onto every factory it creates, so
//! callers only ever deal with a [`SerializationContext`].

use crate::factory::SerializerFactory;
use crate::input::{DeserializationInput, ObjectAndEnvelope};
use crate::output::SerializationOutput;
use crate::serializer::{CustomSerializer, ExternalSerializer};
use ledgerwire_core::{ClassPath, ClassWhitelist, Result, SerializationConfig, Value};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What a payload is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseCase {
    /// Peer-to-peer messaging
    P2P,
    /// Remote procedure calls
    Rpc,
    /// Long-term storage
    Storage,
    /// Workflow checkpoints
    Checkpoint,
    /// Tests
    Testing,
}

/// Per-call settings.
#[derive(Debug, Clone)]
pub struct SerializationContext {
    /// What the payload is for
    pub use_case: UseCase,
    /// Local types
    pub class_path: Arc<ClassPath>,
    /// Allow-list policy
    pub whitelist: Arc<dyn ClassWhitelist>,
    /// Write repeated objects once
    pub object_references_enabled: bool,
    /// Free-form properties for custom serializers and callers
    pub properties: BTreeMap<String, String>,
}

impl SerializationContext {
    /// Context with object references enabled and no properties.
    pub fn new(use_case: UseCase, class_path: Arc<ClassPath>, whitelist: Arc<dyn ClassWhitelist>) -> Self {
        SerializationContext {
            use_case,
            class_path,
            whitelist,
            object_references_enabled: true,
            properties: BTreeMap::new(),
        }
    }

    /// Switch object references on or off.
    pub fn with_object_references(mut self, enabled: bool) -> Self {
        self.object_references_enabled = enabled;
        self
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Same context for a different use case.
    pub fn with_use_case(mut self, use_case: UseCase) -> Self {
        self.use_case = use_case;
        self
    }
}

/// Factories are shared by class path identity and allow-list instance.
type FactoryKey = (Uuid, usize);

fn factory_key(ctx: &SerializationContext) -> FactoryKey {
    let whitelist = Arc::as_ptr(&ctx.whitelist) as *const () as usize;
    (ctx.class_path.id(), whitelist)
}

/// Serializes values for a set of contexts.
pub struct SerializationScheme {
    config: SerializationConfig,
    /// Held for the whole lookup-or-create so racers share one factory
    factories: Mutex<FxHashMap<FactoryKey, Arc<SerializerFactory>>>,
    custom: RwLock<Vec<Arc<dyn CustomSerializer>>>,
    external: RwLock<Vec<Arc<dyn ExternalSerializer>>>,
}

impl fmt::Debug for SerializationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationScheme")
            .field("config", &self.config)
            .field("factories", &self.factory_count())
            .field("custom", &self.custom.read().len())
            .field("external", &self.external.read().len())
            .finish()
    }
}

impl Default for SerializationScheme {
    fn default() -> Self {
        Self::new(SerializationConfig::default())
    }
}

impl SerializationScheme {
    /// Scheme whose factories use `config`.
    pub fn new(config: SerializationConfig) -> Self {
        SerializationScheme {
            config,
            factories: Mutex::new(FxHashMap::default()),
            custom: RwLock::new(Vec::new()),
            external: RwLock::new(Vec::new()),
        }
    }

    /// Configuration handed to new factories.
    pub fn config(&self) -> &SerializationConfig {
        &self.config
    }

    /// Register a custom serializer with every current and future factory.
    pub fn register_custom_serializer(&self, custom: Arc<dyn CustomSerializer>) -> Result<()> {
        let factories = self.factories.lock();
        for factory in factories.values() {
            factory.register_custom_serializer(custom.clone())?;
        }
        self.custom.write().push(custom);
        Ok(())
    }

    /// Register an external serializer with every current and future factory.
    pub fn register_external_serializer(&self, external: Arc<dyn ExternalSerializer>) -> Result<()> {
        let factories = self.factories.lock();
        for factory in factories.values() {
            factory.register_external_serializer(external.clone())?;
        }
        self.external.write().push(external);
        Ok(())
    }

    /// Factory serving `ctx`, created on first use.
    pub fn factory_for(&self, ctx: &SerializationContext) -> Result<Arc<SerializerFactory>> {
        let key = factory_key(ctx);
        let mut factories = self.factories.lock();
        if let Some(existing) = factories.get(&key) {
            return Ok(existing.clone());
        }

        let factory = SerializerFactory::with_config(
            ctx.class_path.clone(),
            ctx.whitelist.clone(),
            self.config.clone(),
        );
        for custom in self.custom.read().iter() {
            factory.register_custom_serializer(custom.clone())?;
        }
        for external in self.external.read().iter() {
            factory.register_external_serializer(external.clone())?;
        }
        let factory = Arc::new(factory);
        factories.insert(key, factory.clone());
        info!(
            target: "ledgerwire::scheme",
            class_path = %ctx.class_path.id(),
            use_case = ?ctx.use_case,
            factories = factories.len(),
            "Created serializer factory"
        );
        Ok(factory)
    }

    /// Encode `value` for `ctx`.
    pub fn serialize(&self, value: &Value, ctx: &SerializationContext) -> Result<Vec<u8>> {
        let factory = self.factory_for(ctx)?;
        let bytes = SerializationOutput::new(&factory)
            .with_object_references(ctx.object_references_enabled)
            .serialize(value)?;
        debug!(
            target: "ledgerwire::scheme",
            use_case = ?ctx.use_case,
            bytes = bytes.len(),
            "Serialized"
        );
        Ok(bytes)
    }

    /// Decode `bytes` for `ctx`.
    pub fn deserialize(&self, bytes: &[u8], ctx: &SerializationContext) -> Result<Value> {
        let factory = self.factory_for(ctx)?;
        DeserializationInput::new(&factory).deserialize(bytes)
    }

    /// Decode `bytes` for `ctx`, keeping the envelope.
    pub fn deserialize_and_return_envelope(
        &self,
        bytes: &[u8],
        ctx: &SerializationContext,
    ) -> Result<ObjectAndEnvelope> {
        let factory = self.factory_for(ctx)?;
        DeserializationInput::new(&factory).deserialize_and_return_envelope(bytes)
    }

    /// Number of factories created so far.
    pub fn factory_count(&self) -> usize {
        self.factories.lock().len()
    }
}
