//! ledgerwire - self-describing binary object serialization
//!
//! ledgerwire encodes object graphs into envelopes that carry their own
//! schema, so a reader can decode a payload written by a different version of
//! the same types, or by a process whose types it has never seen.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use ledgerwire::{
//!     AllWhitelist, ClassPath, Record, SerializationContext, SerializationScheme,
//!     TypeDescriptor, TypeRef, UseCase, Value,
//! };
//!
//! let mut class_path = ClassPath::new();
//! let point = class_path
//!     .register(
//!         TypeDescriptor::composite("net.example.Point")
//!             .property("x", TypeRef::INT)
//!             .property("y", TypeRef::INT)
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let ctx = SerializationContext::new(UseCase::P2P, Arc::new(class_path), Arc::new(AllWhitelist));
//! let scheme = SerializationScheme::default();
//!
//! let value = Value::record(Record::new(point, vec![Value::Int(1), Value::Int(2)]).unwrap());
//! let bytes = scheme.serialize(&value, &ctx).unwrap();
//! assert_eq!(scheme.deserialize(&bytes, &ctx).unwrap(), value);
//! ```
//!
//! # Architecture
//!
//! - `ledgerwire-core`: type references, descriptors, values, schema and
//!   envelope framing
//! - `ledgerwire-engine`: serializer factory, encoder and decoder sessions,
//!   evolution and carpentry
//!
//! Both are re-exported here.

pub use ledgerwire_core::*;
pub use ledgerwire_engine::*;
