//! Enum evolution transforms
//!
//! An enum may declare how its constants evolved so that older and newer
//! peers can still exchange values:
//!
//! * `EnumDefault { new, old }`: a reader that does not know `new` should use
//!   `old` instead. `old` must be declared before `new`.
//! * `Rename { from, to }`: the constant once called `from` is now `to`.
//!
//! Transforms travel in the envelope's transforms section as a generic
//! `(tag, args)` form so that a reader can carry transforms it does not
//! understand (`Transform::Unknown`) without failing.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Wire tag of `EnumDefault`.
pub const ENUM_DEFAULT_TAG: &str = "enum_default";
/// Wire tag of `Rename`.
pub const RENAME_TAG: &str = "rename";

/// Transform categories, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformKind {
    /// Tag not understood by this reader
    Unknown,
    /// Default to an older constant
    EnumDefault,
    /// Constant renamed
    Rename,
}

/// One transform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Transform kind this reader does not know
    Unknown {
        /// Wire tag
        tag: String,
        /// Opaque arguments
        args: Vec<String>,
    },
    /// Use `old` where `new` is unknown
    EnumDefault {
        /// Newer constant
        new: String,
        /// Older fallback constant
        old: String,
    },
    /// `from` is now called `to`
    Rename {
        /// Previous name
        from: String,
        /// Current name
        to: String,
    },
}

impl Transform {
    /// `EnumDefault` shorthand.
    pub fn enum_default(new: impl Into<String>, old: impl Into<String>) -> Self {
        Transform::EnumDefault {
            new: new.into(),
            old: old.into(),
        }
    }

    /// `Rename` shorthand.
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Transform::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Category.
    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Unknown { .. } => TransformKind::Unknown,
            Transform::EnumDefault { .. } => TransformKind::EnumDefault,
            Transform::Rename { .. } => TransformKind::Rename,
        }
    }

    fn to_wire(&self) -> WireTransform {
        match self {
            Transform::Unknown { tag, args } => WireTransform {
                tag: tag.clone(),
                args: args.clone(),
            },
            Transform::EnumDefault { new, old } => WireTransform {
                tag: ENUM_DEFAULT_TAG.to_string(),
                args: vec![new.clone(), old.clone()],
            },
            Transform::Rename { from, to } => WireTransform {
                tag: RENAME_TAG.to_string(),
                args: vec![from.clone(), to.clone()],
            },
        }
    }

    fn from_wire(wire: WireTransform) -> Self {
        match (wire.tag.as_str(), wire.args.as_slice()) {
            (ENUM_DEFAULT_TAG, [new, old]) => Transform::enum_default(new.clone(), old.clone()),
            (RENAME_TAG, [from, to]) => Transform::rename(from.clone(), to.clone()),
            _ => Transform::Unknown {
                tag: wire.tag,
                args: wire.args,
            },
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Unknown { tag, .. } => write!(f, "Unknown({})", tag),
            Transform::EnumDefault { new, old } => write!(f, "EnumDefault({} -> {})", new, old),
            Transform::Rename { from, to } => write!(f, "Rename({} -> {})", from, to),
        }
    }
}

/// Errors raised while validating transforms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// A transform contradicts the enum or the other transforms
    #[error("Invalid transform on {type_name}: {reason}")]
    InvalidTransform {
        /// Enum type
        type_name: String,
        /// What is wrong
        reason: String,
    },

    /// The same transform is declared twice
    #[error("Duplicate transform {transform} on {type_name}")]
    DuplicateTransform {
        /// Enum type
        type_name: String,
        /// Rendered transform
        transform: String,
    },
}

impl TransformError {
    fn invalid(type_name: &str, reason: impl Into<String>) -> Self {
        TransformError::InvalidTransform {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }

    /// Enum type the error is about.
    pub fn type_name(&self) -> &str {
        match self {
            TransformError::InvalidTransform { type_name, .. }
            | TransformError::DuplicateTransform { type_name, .. } => type_name,
        }
    }
}

// ============================================================================
// TransformSet
// ============================================================================

/// Transforms of one enum, grouped by kind in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TransformSet {
    by_kind: BTreeMap<TransformKind, Vec<Transform>>,
}

impl TransformSet {
    /// Group declared transforms, rejecting exact duplicates.
    pub fn from_declared(type_name: &str, declared: &[Transform]) -> Result<Self, TransformError> {
        let mut seen = FxHashSet::default();
        let mut by_kind: BTreeMap<TransformKind, Vec<Transform>> = BTreeMap::new();
        for transform in declared {
            if !seen.insert(transform) {
                return Err(TransformError::DuplicateTransform {
                    type_name: type_name.to_string(),
                    transform: transform.to_string(),
                });
            }
            by_kind
                .entry(transform.kind())
                .or_default()
                .push(transform.clone());
        }
        Ok(TransformSet { by_kind })
    }

    /// Whether no transform is present.
    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(Vec::is_empty)
    }

    /// Number of transforms.
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    /// Transforms in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.by_kind.values().flatten()
    }

    /// Transforms of one kind, in declaration order.
    pub fn of_kind(&self, kind: TransformKind) -> &[Transform] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a transform of an unknown kind is present.
    pub fn has_unknown(&self) -> bool {
        !self.of_kind(TransformKind::Unknown).is_empty()
    }

    /// `(from, to)` pairs.
    pub fn renames(&self) -> impl Iterator<Item = (&str, &str)> {
        self.of_kind(TransformKind::Rename).iter().filter_map(|t| match t {
            Transform::Rename { from, to } => Some((from.as_str(), to.as_str())),
            _ => None,
        })
    }

    /// `(new, old)` pairs.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.of_kind(TransformKind::EnumDefault)
            .iter()
            .filter_map(|t| match t {
                Transform::EnumDefault { new, old } => Some((new.as_str(), old.as_str())),
                _ => None,
            })
    }

    /// Checks that need nothing but the transforms themselves: no self
    /// renames, no self defaults, no rename cycles, no name renamed twice.
    pub fn validate_structure(&self, type_name: &str) -> Result<(), TransformError> {
        for (new, old) in self.defaults() {
            if new == old {
                return Err(TransformError::invalid(
                    type_name,
                    format!("EnumDefault({} -> {}) defaults a constant to itself", new, old),
                ));
            }
        }

        let mut forward: FxHashMap<&str, &str> = FxHashMap::default();
        let mut targets: FxHashSet<&str> = FxHashSet::default();
        for (from, to) in self.renames() {
            if from == to {
                return Err(TransformError::invalid(
                    type_name,
                    format!("Rename({} -> {}) renames a constant to itself", from, to),
                ));
            }
            if forward.insert(from, to).is_some() {
                return Err(TransformError::invalid(
                    type_name,
                    format!("{} is renamed more than once", from),
                ));
            }
            if !targets.insert(to) {
                return Err(TransformError::invalid(
                    type_name,
                    format!("more than one constant is renamed to {}", to),
                ));
            }
        }

        for start in forward.keys() {
            let mut visited = FxHashSet::default();
            let mut current = *start;
            while let Some(&next) = forward.get(current) {
                if !visited.insert(current) {
                    return Err(TransformError::invalid(
                        type_name,
                        format!("rename chain through {} is cyclic", start),
                    ));
                }
                current = next;
            }
        }
        Ok(())
    }

    /// Full check against the enum's current constants, done where the enum
    /// is declared.
    pub fn validate(&self, type_name: &str, constants: &[String]) -> Result<(), TransformError> {
        self.validate_structure(type_name)?;

        let ordinal = |name: &str| constants.iter().position(|c| c == name);
        for (new, old) in self.defaults() {
            let new_ord = ordinal(new).ok_or_else(|| {
                TransformError::invalid(
                    type_name,
                    format!("EnumDefault new value {} is not a constant", new),
                )
            })?;
            let old_ord = ordinal(old).ok_or_else(|| {
                TransformError::invalid(
                    type_name,
                    format!("EnumDefault old value {} is not a constant", old),
                )
            })?;
            if old_ord >= new_ord {
                return Err(TransformError::invalid(
                    type_name,
                    format!(
                        "EnumDefault({} -> {}) must default to a constant declared earlier",
                        new, old
                    ),
                ));
            }
        }

        let mut backward: FxHashMap<&str, &str> = FxHashMap::default();
        for (from, to) in self.renames() {
            backward.insert(to, from);
        }
        for constant in constants {
            let mut visited: FxHashSet<&str> = FxHashSet::default();
            visited.insert(constant.as_str());
            let mut current = constant.as_str();
            while let Some(&previous) = backward.get(current) {
                if !visited.insert(previous) {
                    return Err(TransformError::invalid(
                        type_name,
                        format!("renames of {} form a cycle", constant),
                    ));
                }
                if ordinal(previous).is_some() {
                    return Err(TransformError::invalid(
                        type_name,
                        format!(
                            "{} was renamed from {}, which is still a constant",
                            constant, previous
                        ),
                    ));
                }
                current = previous;
            }
        }
        Ok(())
    }
}

// ============================================================================
// TransformsSchema
// ============================================================================

/// Transforms of every enum mentioned in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformsSchema {
    types: BTreeMap<String, TransformSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireTransform {
    tag: String,
    args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTransformsSchema {
    types: Vec<(String, Vec<WireTransform>)>,
}

impl TransformsSchema {
    /// Empty transforms section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the transforms of an enum. Empty sets are not recorded.
    pub fn insert(&mut self, type_name: impl Into<String>, set: TransformSet) {
        if !set.is_empty() {
            self.types.insert(type_name.into(), set);
        }
    }

    /// Transforms of one enum.
    pub fn get(&self, type_name: &str) -> Option<&TransformSet> {
        self.types.get(type_name)
    }

    /// Enums with transforms, by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TransformSet)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of enums with transforms.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Structural validation of every set.
    pub fn validate(&self) -> Result<(), TransformError> {
        for (name, set) in &self.types {
            set.validate_structure(name)?;
        }
        Ok(())
    }

    /// MessagePack encoding of the generic wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        let wire = WireTransformsSchema {
            types: self
                .types
                .iter()
                .map(|(name, set)| (name.clone(), set.iter().map(Transform::to_wire).collect()))
                .collect(),
        };
        rmp_serde::to_vec(&wire)
    }

    /// Decode the generic wire form. Unknown tags become
    /// `Transform::Unknown`; duplicates are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransformsDecodeError> {
        let wire: WireTransformsSchema = rmp_serde::from_slice(bytes)?;
        let mut schema = TransformsSchema::new();
        for (name, transforms) in wire.types {
            let declared: Vec<Transform> = transforms.into_iter().map(Transform::from_wire).collect();
            let set = TransformSet::from_declared(&name, &declared)?;
            if schema.types.contains_key(&name) {
                return Err(TransformsDecodeError::Transform(TransformError::invalid(
                    &name,
                    "transforms listed twice",
                )));
            }
            schema.insert(name, set);
        }
        Ok(schema)
    }
}

/// Errors decoding a transforms section.
#[derive(Debug, Error)]
pub enum TransformsDecodeError {
    /// Bytes are not a valid transforms section
    #[error("transforms section: {0}")]
    Format(#[from] rmp_serde::decode::Error),

    /// Section decodes but is inconsistent
    #[error(transparent)]
    Transform(#[from] TransformError),
}
