//! Declared type references
//!
//! A `TypeRef` names the declared type of a property, constructor parameter
//! or collection element. Its textual form is what travels on the wire in
//! schema fields:
//!
//! ```text
//! int                     primitive
//! net.example.Foo         named composite, enum or interface
//! list<int>               sanctioned collection
//! map<string,list<*>>     nested collections, `*` is "any type"
//! int[]                   array
//! ```
//!
//! Parsing is bounded because type strings come from untrusted payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum nesting of collection parameters accepted by the parser.
pub const MAX_TYPE_NESTING: usize = 32;

/// Maximum length of a type string accepted by the parser.
pub const MAX_TYPE_STRING_LEN: usize = 4096;

// ============================================================================
// PrimitiveKind
// ============================================================================

/// Built-in scalar types. These are written as bare wire values and never
/// produce a schema notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    /// `boolean`
    Boolean,
    /// `byte`, signed 8 bit
    Byte,
    /// `short`, signed 16 bit
    Short,
    /// `int`, signed 32 bit
    Int,
    /// `long`, signed 64 bit
    Long,
    /// `float`, 32 bit IEEE
    Float,
    /// `double`, 64 bit IEEE
    Double,
    /// `char`, a unicode scalar value
    Char,
    /// `string`, UTF-8 text
    String,
    /// `binary`, opaque bytes
    Binary,
    /// `timestamp`, UTC instant with microsecond precision
    Timestamp,
    /// `uuid`
    Uuid,
}

impl PrimitiveKind {
    /// All primitive kinds, in wire-name order.
    pub const ALL: [PrimitiveKind; 12] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::Char,
        PrimitiveKind::String,
        PrimitiveKind::Binary,
        PrimitiveKind::Timestamp,
        PrimitiveKind::Uuid,
    ];

    /// Name used in schema type strings.
    pub fn wire_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Char => "char",
            PrimitiveKind::String => "string",
            PrimitiveKind::Binary => "binary",
            PrimitiveKind::Timestamp => "timestamp",
            PrimitiveKind::Uuid => "uuid",
        }
    }

    /// Inverse of [`PrimitiveKind::wire_name`].
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.wire_name() == name)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ============================================================================
// CollectionKind
// ============================================================================

/// Container shapes understood by the engine.
///
/// `HashMap` and `HashSet` parse so that they can be rejected with a precise
/// error: their iteration order is not part of the value, so a decoded copy
/// could not be guaranteed to reproduce the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Ordered sequence, `list<T>`
    List,
    /// Insertion-ordered set, `set<T>`
    Set,
    /// Fixed sequence, `T[]`
    Array,
    /// Insertion-ordered map, `map<K,V>`
    Map,
    /// Unordered map, always rejected
    HashMap,
    /// Unordered set, always rejected
    HashSet,
}

impl CollectionKind {
    /// Name used in schema type strings and as restricted-type source.
    pub fn wire_name(&self) -> &'static str {
        match self {
            CollectionKind::List => "list",
            CollectionKind::Set => "set",
            CollectionKind::Array => "array",
            CollectionKind::Map => "map",
            CollectionKind::HashMap => "hash_map",
            CollectionKind::HashSet => "hash_set",
        }
    }

    /// Number of type parameters this kind takes.
    pub fn arity(&self) -> usize {
        match self {
            CollectionKind::Map | CollectionKind::HashMap => 2,
            _ => 1,
        }
    }

    /// Whether values of this kind can be reproduced exactly on decode.
    pub fn is_sanctioned(&self) -> bool {
        !matches!(self, CollectionKind::HashMap | CollectionKind::HashSet)
    }

    /// Whether elements are key/value entries.
    pub fn is_map(&self) -> bool {
        matches!(self, CollectionKind::Map | CollectionKind::HashMap)
    }

    fn from_generic_name(name: &str) -> Option<Self> {
        match name {
            "list" => Some(CollectionKind::List),
            "set" => Some(CollectionKind::Set),
            "map" => Some(CollectionKind::Map),
            "hash_map" => Some(CollectionKind::HashMap),
            "hash_set" => Some(CollectionKind::HashSet),
            _ => None,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ============================================================================
// TypeRef
// ============================================================================

/// A declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeRef {
    /// Unconstrained; the runtime value's own type is used. Written `*`.
    Any,
    /// A built-in scalar.
    Primitive(PrimitiveKind),
    /// A composite, enum or interface looked up by name, with the type
    /// arguments of a generic type. Inside a generic type's own descriptor,
    /// a bare name matching one of its type parameters is a type variable.
    Named(String, Vec<TypeRef>),
    /// A container with its type parameters.
    Collection(CollectionKind, Vec<TypeRef>),
}

impl TypeRef {
    /// `boolean`
    pub const BOOLEAN: TypeRef = TypeRef::Primitive(PrimitiveKind::Boolean);
    /// `byte`
    pub const BYTE: TypeRef = TypeRef::Primitive(PrimitiveKind::Byte);
    /// `short`
    pub const SHORT: TypeRef = TypeRef::Primitive(PrimitiveKind::Short);
    /// `int`
    pub const INT: TypeRef = TypeRef::Primitive(PrimitiveKind::Int);
    /// `long`
    pub const LONG: TypeRef = TypeRef::Primitive(PrimitiveKind::Long);
    /// `float`
    pub const FLOAT: TypeRef = TypeRef::Primitive(PrimitiveKind::Float);
    /// `double`
    pub const DOUBLE: TypeRef = TypeRef::Primitive(PrimitiveKind::Double);
    /// `char`
    pub const CHAR: TypeRef = TypeRef::Primitive(PrimitiveKind::Char);
    /// `string`
    pub const STRING: TypeRef = TypeRef::Primitive(PrimitiveKind::String);
    /// `binary`
    pub const BINARY: TypeRef = TypeRef::Primitive(PrimitiveKind::Binary);
    /// `timestamp`
    pub const TIMESTAMP: TypeRef = TypeRef::Primitive(PrimitiveKind::Timestamp);
    /// `uuid`
    pub const UUID: TypeRef = TypeRef::Primitive(PrimitiveKind::Uuid);

    /// Named composite, enum or interface.
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into(), Vec::new())
    }

    /// Generic named type applied to `args`, e.g. `net.x.Holder<int>`.
    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        TypeRef::Named(name.into(), args)
    }

    /// `list<element>`
    pub fn list(element: TypeRef) -> Self {
        TypeRef::Collection(CollectionKind::List, vec![element])
    }

    /// `set<element>`
    pub fn set(element: TypeRef) -> Self {
        TypeRef::Collection(CollectionKind::Set, vec![element])
    }

    /// `element[]`
    pub fn array(element: TypeRef) -> Self {
        TypeRef::Collection(CollectionKind::Array, vec![element])
    }

    /// `map<key,value>`
    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Collection(CollectionKind::Map, vec![key, value])
    }

    /// Whether this is a built-in scalar.
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_))
    }

    /// The name for `Named` references, without type arguments.
    pub fn as_named(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name, _) => Some(name),
            _ => None,
        }
    }

    /// Type arguments of a `Named` reference.
    pub fn type_args(&self) -> &[TypeRef] {
        match self {
            TypeRef::Named(_, args) => args,
            _ => &[],
        }
    }

    /// Replace the type variables `params` with `args`. Variables without a
    /// matching argument become `*`.
    pub fn substitute(&self, params: &[String], args: &[TypeRef]) -> TypeRef {
        if params.is_empty() {
            return self.clone();
        }
        match self {
            TypeRef::Named(name, inner) if inner.is_empty() => {
                match params.iter().position(|p| p == name) {
                    Some(i) => args.get(i).cloned().unwrap_or(TypeRef::Any),
                    None => self.clone(),
                }
            }
            TypeRef::Named(name, inner) => TypeRef::Named(
                name.clone(),
                inner.iter().map(|t| t.substitute(params, args)).collect(),
            ),
            TypeRef::Collection(kind, inner) => TypeRef::Collection(
                *kind,
                inner.iter().map(|t| t.substitute(params, args)).collect(),
            ),
            TypeRef::Any | TypeRef::Primitive(_) => self.clone(),
        }
    }

    /// Every named type mentioned by this reference, outermost first.
    /// Generic references contribute their bare name.
    pub fn named_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_named(&mut out);
        out
    }

    fn collect_named<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeRef::Named(name, args) => {
                out.push(name);
                args.iter().for_each(|p| p.collect_named(out));
            }
            TypeRef::Collection(_, params) => params.iter().for_each(|p| p.collect_named(out)),
            TypeRef::Any | TypeRef::Primitive(_) => {}
        }
    }

    /// Parse a wire type string.
    pub fn parse(input: &str) -> Result<Self, TypeRefParseError> {
        if input.len() > MAX_TYPE_STRING_LEN {
            return Err(TypeRefParseError::TooLong(input.len()));
        }
        let mut parser = Parser {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        };
        let parsed = parser.parse_type(0)?;
        if parser.pos != parser.bytes.len() {
            return Err(parser.unexpected());
        }
        Ok(parsed)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Any => f.write_str("*"),
            TypeRef::Primitive(kind) => f.write_str(kind.wire_name()),
            TypeRef::Named(name, args) if args.is_empty() => f.write_str(name),
            TypeRef::Named(name, args) => {
                f.write_str(name)?;
                write_params(f, args)
            }
            TypeRef::Collection(CollectionKind::Array, params) => match params.first() {
                Some(element) => write!(f, "{}[]", element),
                None => f.write_str("*[]"),
            },
            TypeRef::Collection(kind, params) => {
                f.write_str(kind.wire_name())?;
                write_params(f, params)
            }
        }
    }
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[TypeRef]) -> fmt::Result {
    f.write_str("<")?;
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", param)?;
    }
    f.write_str(">")
}

/// Errors produced while parsing a wire type string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeRefParseError {
    /// Input ended where a type was expected
    #[error("unexpected end of type string '{0}'")]
    UnexpectedEnd(String),

    /// A character that cannot appear at this position
    #[error("unexpected '{found}' at offset {offset} in type string '{input}'")]
    Unexpected {
        /// Offending character
        found: char,
        /// Byte offset
        offset: usize,
        /// Whole input
        input: String,
    },

    /// Wrong number of type parameters for a collection
    #[error("{kind} takes {expected} type parameter(s), found {found}")]
    Arity {
        /// Collection kind
        kind: CollectionKind,
        /// Expected parameter count
        expected: usize,
        /// Actual parameter count
        found: usize,
    },

    /// Collection nesting exceeds [`MAX_TYPE_NESTING`]
    #[error("type string nests deeper than {MAX_TYPE_NESTING} levels")]
    TooDeep,

    /// Input exceeds [`MAX_TYPE_STRING_LEN`]
    #[error("type string of {0} bytes exceeds limit of {MAX_TYPE_STRING_LEN}")]
    TooLong(usize),
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_type(&mut self, depth: usize) -> Result<TypeRef, TypeRefParseError> {
        if depth > MAX_TYPE_NESTING {
            return Err(TypeRefParseError::TooDeep);
        }
        let mut parsed = if self.peek() == Some(b'*') {
            self.pos += 1;
            TypeRef::Any
        } else {
            let ident = self.identifier()?;
            if self.peek() == Some(b'<') {
                self.generic(ident, depth)?
            } else if let Some(kind) = PrimitiveKind::from_wire_name(ident) {
                TypeRef::Primitive(kind)
            } else {
                TypeRef::named(ident)
            }
        };
        let mut suffixes = 0;
        while self.peek() == Some(b'[') {
            self.pos += 1;
            if self.peek() != Some(b']') {
                return Err(self.unexpected());
            }
            self.pos += 1;
            suffixes += 1;
            if depth + suffixes > MAX_TYPE_NESTING {
                return Err(TypeRefParseError::TooDeep);
            }
            parsed = TypeRef::array(parsed);
        }
        Ok(parsed)
    }

    fn generic(&mut self, ident: &str, depth: usize) -> Result<TypeRef, TypeRefParseError> {
        let kind = CollectionKind::from_generic_name(ident);
        if kind.is_none() && PrimitiveKind::from_wire_name(ident).is_some() {
            return Err(self.unexpected());
        }
        self.pos += 1;
        let mut params = vec![self.parse_type(depth + 1)?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            params.push(self.parse_type(depth + 1)?);
        }
        match self.peek() {
            Some(b'>') => self.pos += 1,
            Some(_) => return Err(self.unexpected()),
            None => return Err(TypeRefParseError::UnexpectedEnd(self.input.to_string())),
        }
        let Some(kind) = kind else {
            return Ok(TypeRef::generic(ident, params));
        };
        if params.len() != kind.arity() {
            return Err(TypeRefParseError::Arity {
                kind,
                expected: kind.arity(),
                found: params.len(),
            });
        }
        Ok(TypeRef::Collection(kind, params))
    }

    fn identifier(&mut self) -> Result<&'a str, TypeRefParseError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'$') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return match self.peek() {
                None => Err(TypeRefParseError::UnexpectedEnd(self.input.to_string())),
                Some(_) => Err(self.unexpected()),
            };
        }
        Ok(&self.input[start..self.pos])
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn unexpected(&self) -> TypeRefParseError {
        match self.input[self.pos..].chars().next() {
            Some(found) => TypeRefParseError::Unexpected {
                found,
                offset: self.pos,
                input: self.input.to_string(),
            },
            None => TypeRefParseError::UnexpectedEnd(self.input.to_string()),
        }
    }
}
