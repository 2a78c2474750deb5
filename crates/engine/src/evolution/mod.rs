//! Schema evolution
//!
//! When a payload's notation for a type differs from the local type (the
//! descriptors do not match), the factory builds an evolution serializer
//! that reads the *wire* layout and produces a value of the *local* type.
//!
//! - [`EvolutionSerializer`]: composites. Fields are matched to constructor
//!   parameters by name and type; removed fields are read and dropped, added
//!   parameters must be nullable or defaulted.
//! - [`EnumEvolutionSerializer`]: enums. Unknown constants are mapped with
//!   the renames and defaults declared on either side.
//!
//! Evolution serializers are cached under the wire descriptor, never the
//! local one, so the local encoding of the type is unaffected.

mod enums;
mod object;

pub use enums::EnumEvolutionSerializer;
pub use object::EvolutionSerializer;
