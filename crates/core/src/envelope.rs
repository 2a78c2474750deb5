//! Envelope framing
//!
//! # Layout
//!
//! ```text
//! ┌────────────┬───────────┬────────────┐
//! │ Magic (4)  │ Major (1) │ Minor (2)  │
//! ├────────────┴───────────┴────────────┤
//! │ Payload length (4) | payload        │  MessagePack WireValue
//! ├─────────────────────────────────────┤
//! │ Schema length (4)  | schema         │  MessagePack Schema
//! ├─────────────────────────────────────┤
//! │ Transforms length (4) | transforms  │  MessagePack TransformsSchema
//! ├─────────────────────────────────────┤
//! │ CRC32 (4) over all preceding bytes  │
//! └─────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Bytes after the checksum are rejected.

use crate::error::{Result, SerializationError};
use crate::schema::Schema;
use crate::transforms::TransformsSchema;
use crate::wire::WireValue;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use std::io;
use thiserror::Error;

/// Magic bytes opening every envelope: "LWAM"
pub const ENVELOPE_MAGIC: [u8; 4] = *b"LWAM";

/// Current major format version. Readers reject other majors.
pub const FORMAT_MAJOR: u8 = 1;

/// Current minor format version. Newer minors are readable.
pub const FORMAT_MINOR: u16 = 0;

/// Magic plus version bytes.
pub const HEADER_SIZE: usize = 7;

const LENGTH_SIZE: usize = 4;
const CHECKSUM_SIZE: usize = 4;

/// Smallest possible envelope: header, three empty sections, checksum.
pub const MIN_ENVELOPE_SIZE: usize = HEADER_SIZE + 3 * LENGTH_SIZE + CHECKSUM_SIZE;

/// A decoded or about-to-be-encoded payload with its schemas.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Payload tree
    pub obj: WireValue,
    /// Notations for every non-primitive type in the payload
    pub schema: Schema,
    /// Enum transforms for enums in the payload
    pub transforms_schema: TransformsSchema,
}

impl Envelope {
    /// Assemble an envelope.
    pub fn new(obj: WireValue, schema: Schema, transforms_schema: TransformsSchema) -> Self {
        Envelope {
            obj,
            schema,
            transforms_schema,
        }
    }

    /// Frame the envelope.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, EnvelopeError> {
        let payload = rmp_serde::to_vec(&self.obj).map_err(|e| EnvelopeError::section("payload", e))?;
        let schema = self
            .schema
            .to_bytes()
            .map_err(|e| EnvelopeError::section("schema", e))?;
        let transforms = self
            .transforms_schema
            .to_bytes()
            .map_err(|e| EnvelopeError::section("transforms", e))?;

        let mut out = Vec::with_capacity(
            MIN_ENVELOPE_SIZE + payload.len() + schema.len() + transforms.len(),
        );
        out.extend_from_slice(&ENVELOPE_MAGIC);
        out.write_u8(FORMAT_MAJOR)?;
        out.write_u16::<LittleEndian>(FORMAT_MINOR)?;
        for section in [&payload, &schema, &transforms] {
            let len = u32::try_from(section.len()).map_err(|_| EnvelopeError::TooLarge {
                len: section.len(),
                limit: u32::MAX as usize,
            })?;
            out.write_u32::<LittleEndian>(len)?;
            out.extend_from_slice(section);
        }

        let mut hasher = Hasher::new();
        hasher.update(&out);
        out.write_u32::<LittleEndian>(hasher.finalize())?;
        Ok(out)
    }

    /// Parse and verify a framed envelope no larger than `max_len` bytes.
    pub fn from_bytes(bytes: &[u8], max_len: usize) -> Result<Self> {
        let sections = Sections::split(bytes, max_len)?;
        let obj: WireValue = rmp_serde::from_slice(sections.payload)
            .map_err(|e| EnvelopeError::section("payload", e))?;
        let schema = Schema::from_bytes(sections.schema)?;
        let transforms_schema = TransformsSchema::from_bytes(sections.transforms)
            .map_err(|e| EnvelopeError::section("transforms", e))?;
        transforms_schema
            .validate()
            .map_err(|e| SerializationError::decode(e.to_string()))?;
        Ok(Envelope {
            obj,
            schema,
            transforms_schema,
        })
    }
}

struct Sections<'a> {
    payload: &'a [u8],
    schema: &'a [u8],
    transforms: &'a [u8],
}

impl<'a> Sections<'a> {
    fn split(bytes: &'a [u8], max_len: usize) -> std::result::Result<Self, EnvelopeError> {
        if bytes.len() > max_len {
            return Err(EnvelopeError::TooLarge {
                len: bytes.len(),
                limit: max_len,
            });
        }
        // Anything long enough to carry a magic is judged by it first.
        if bytes.len() >= ENVELOPE_MAGIC.len() && bytes[0..4] != ENVELOPE_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&bytes[0..4]);
            return Err(EnvelopeError::BadMagic(found));
        }
        if bytes.len() < MIN_ENVELOPE_SIZE {
            return Err(EnvelopeError::InsufficientData);
        }
        let major = bytes[4];
        let minor = LittleEndian::read_u16(&bytes[5..7]);
        if major != FORMAT_MAJOR {
            return Err(EnvelopeError::UnsupportedVersion { major, minor });
        }

        let mut pos = HEADER_SIZE;
        let payload = Self::section(bytes, &mut pos)?;
        let schema = Self::section(bytes, &mut pos)?;
        let transforms = Self::section(bytes, &mut pos)?;

        if bytes.len() < pos + CHECKSUM_SIZE {
            return Err(EnvelopeError::InsufficientData);
        }
        let stored = LittleEndian::read_u32(&bytes[pos..pos + CHECKSUM_SIZE]);
        let mut hasher = Hasher::new();
        hasher.update(&bytes[..pos]);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(EnvelopeError::ChecksumMismatch {
                expected: stored,
                computed,
            });
        }
        let end = pos + CHECKSUM_SIZE;
        if end != bytes.len() {
            return Err(EnvelopeError::TrailingBytes(bytes.len() - end));
        }
        Ok(Sections {
            payload,
            schema,
            transforms,
        })
    }

    fn section(bytes: &'a [u8], pos: &mut usize) -> std::result::Result<&'a [u8], EnvelopeError> {
        if bytes.len() < *pos + LENGTH_SIZE {
            return Err(EnvelopeError::InsufficientData);
        }
        let len = LittleEndian::read_u32(&bytes[*pos..*pos + LENGTH_SIZE]) as usize;
        let start = *pos + LENGTH_SIZE;
        let end = start.checked_add(len).ok_or(EnvelopeError::InsufficientData)?;
        if end > bytes.len() {
            return Err(EnvelopeError::InsufficientData);
        }
        *pos = end;
        Ok(&bytes[start..end])
    }
}

/// Envelope framing errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Input ends before the frame does
    #[error("Insufficient data to parse envelope")]
    InsufficientData,

    /// Input does not start with the envelope magic
    #[error("Bad magic bytes: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Major version not understood
    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion {
        /// Major version found
        major: u8,
        /// Minor version found
        minor: u16,
    },

    /// Input exceeds the configured limit
    #[error("Envelope of {len} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Actual size
        len: usize,
        /// Limit
        limit: usize,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame
        expected: u32,
        /// Checksum of the received bytes
        computed: u32,
    },

    /// Bytes follow the checksum
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),

    /// A section could not be encoded or decoded
    #[error("Invalid {section} section: {detail}")]
    Section {
        /// Section name
        section: &'static str,
        /// Codec message
        detail: String,
    },

    /// Writing the frame failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EnvelopeError {
    fn section(section: &'static str, err: impl std::fmt::Display) -> Self {
        EnvelopeError::Section {
            section,
            detail: err.to_string(),
        }
    }
}
