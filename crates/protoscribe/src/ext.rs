//! Extension value lookup on descriptor options.
//!
//! The linker indexes every *declared* extension on the graph; this module
//! is the session-side registry a plugin fills with the extensions it wants
//! to read, plus the wire-level decoding of their values.
//!
//! Values are read by re-encoding the typed options message and scanning
//! the bytes for the extension's field number, so lookup works for any
//! options message the runtime can encode. A field number that does not
//! occur in the encoded options is reported as "not present", never as an
//! error.

use std::collections::BTreeMap;

use prost::bytes::Buf;
use prost::encoding::{decode_key, decode_varint, skip_field, DecodeContext, WireType};
use prost::{DecodeError, Message as _};

use crate::error::Error;
use crate::graph::{ExtensionId, Graph, Kind, MessageId};

/// A decoded extension value, typed per the extension's declared [`Kind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Enum-kind extensions decode to the raw number.
    EnumNumber(i32),
    /// Message-kind extensions decode to the nested encoding; the caller
    /// decides what message type to decode it as.
    Message(Vec<u8>),
}

/// Explicitly registered extension declarations, queryable by
/// `(extendee, field number)`.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    by_target: BTreeMap<(MessageId, i32), ExtensionId>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declared extension for value lookup. Re-registering the
    /// same declaration is a no-op; registering a *different* declaration
    /// for an occupied `(extendee, number)` slot is an error.
    pub fn register(&mut self, graph: &Graph, id: ExtensionId) -> Result<(), Error> {
        let extension = graph.extension(id);
        let key = (extension.extendee, extension.number);
        if let Some(&existing) = self.by_target.get(&key) {
            if existing == id {
                return Ok(());
            }
            return Err(Error::DuplicateExtension {
                extendee: graph.message(extension.extendee).full_name.clone(),
                number: extension.number,
                first: graph.extension(existing).full_name.clone(),
                second: extension.full_name.clone(),
            });
        }
        self.by_target.insert(key, id);
        Ok(())
    }

    /// The registered extension for `(extendee, number)`, if any.
    pub fn lookup(&self, extendee: MessageId, number: i32) -> Option<ExtensionId> {
        self.by_target.get(&(extendee, number)).copied()
    }

    /// Decode the value of the registered extension `(extendee, number)`
    /// from an options message. `Ok(None)` means the extension is not
    /// registered or not set on this particular instance.
    pub fn value(
        &self,
        graph: &Graph,
        extendee: MessageId,
        number: i32,
        options: &impl prost::Message,
    ) -> Result<Option<ExtensionValue>, Error> {
        self.value_from_bytes(graph, extendee, number, &options.encode_to_vec())
    }

    /// Like [`ExtensionRegistry::value`], for already-encoded options bytes.
    pub fn value_from_bytes(
        &self,
        graph: &Graph,
        extendee: MessageId,
        number: i32,
        bytes: &[u8],
    ) -> Result<Option<ExtensionValue>, Error> {
        let Some(id) = self.lookup(extendee, number) else {
            return Ok(None);
        };
        let kind = graph.extension(id).kind;
        scan(bytes, number, kind)
    }
}

/// Scan an encoded message for field `number`, decoding it per `kind`.
/// Later occurrences win, matching wire semantics for singular fields.
fn scan(bytes: &[u8], number: i32, kind: Kind) -> Result<Option<ExtensionValue>, Error> {
    let mut buf = bytes;
    let mut found = None;
    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(&mut buf)?;
        if tag == number as u32 {
            found = Some(decode_value(&mut buf, wire_type, kind)?);
        } else {
            skip_field(wire_type, tag, &mut buf, DecodeContext::default())?;
        }
    }
    Ok(found)
}

fn decode_value(
    buf: &mut impl Buf,
    wire_type: WireType,
    kind: Kind,
) -> Result<ExtensionValue, Error> {
    match (kind, wire_type) {
        (Kind::Bool, WireType::Varint) => Ok(ExtensionValue::Bool(decode_varint(buf)? != 0)),
        (Kind::Int32, WireType::Varint) => Ok(ExtensionValue::Int32(decode_varint(buf)? as i32)),
        (Kind::Int64, WireType::Varint) => Ok(ExtensionValue::Int64(decode_varint(buf)? as i64)),
        (Kind::Uint32, WireType::Varint) => Ok(ExtensionValue::Uint32(decode_varint(buf)? as u32)),
        (Kind::Uint64, WireType::Varint) => Ok(ExtensionValue::Uint64(decode_varint(buf)?)),
        (Kind::Sint32, WireType::Varint) => {
            let value = decode_varint(buf)? as u32;
            Ok(ExtensionValue::Int32(((value >> 1) as i32) ^ -((value & 1) as i32)))
        }
        (Kind::Sint64, WireType::Varint) => {
            let value = decode_varint(buf)?;
            Ok(ExtensionValue::Int64(((value >> 1) as i64) ^ -((value & 1) as i64)))
        }
        (Kind::Enum, WireType::Varint) => {
            Ok(ExtensionValue::EnumNumber(decode_varint(buf)? as i32))
        }
        (Kind::Fixed64, WireType::SixtyFourBit) => {
            Ok(ExtensionValue::Uint64(take_u64(buf)?))
        }
        (Kind::Sfixed64, WireType::SixtyFourBit) => {
            Ok(ExtensionValue::Int64(take_u64(buf)? as i64))
        }
        (Kind::Double, WireType::SixtyFourBit) => {
            Ok(ExtensionValue::Double(f64::from_bits(take_u64(buf)?)))
        }
        (Kind::Fixed32, WireType::ThirtyTwoBit) => {
            Ok(ExtensionValue::Uint32(take_u32(buf)?))
        }
        (Kind::Sfixed32, WireType::ThirtyTwoBit) => {
            Ok(ExtensionValue::Int32(take_u32(buf)? as i32))
        }
        (Kind::Float, WireType::ThirtyTwoBit) => {
            Ok(ExtensionValue::Float(f32::from_bits(take_u32(buf)?)))
        }
        (Kind::String, WireType::LengthDelimited) => {
            let data = take_length_delimited(buf)?;
            String::from_utf8(data)
                .map(ExtensionValue::String)
                .map_err(|_| decode_error("invalid utf-8 in string extension value"))
        }
        (Kind::Bytes, WireType::LengthDelimited) => {
            Ok(ExtensionValue::Bytes(take_length_delimited(buf)?))
        }
        (Kind::Message | Kind::Group, WireType::LengthDelimited) => {
            Ok(ExtensionValue::Message(take_length_delimited(buf)?))
        }
        (kind, wire_type) => Err(decode_error(format!(
            "wire type {wire_type:?} does not match extension kind {}",
            kind.as_str()
        ))),
    }
}

fn take_length_delimited(buf: &mut impl Buf) -> Result<Vec<u8>, Error> {
    let len = decode_varint(buf)? as usize;
    if buf.remaining() < len {
        return Err(decode_error("length-delimited extension value truncated"));
    }
    Ok(buf.copy_to_bytes(len).to_vec())
}

fn take_u64(buf: &mut impl Buf) -> Result<u64, Error> {
    if buf.remaining() < 8 {
        return Err(decode_error("fixed64 extension value truncated"));
    }
    Ok(buf.get_u64_le())
}

fn take_u32(buf: &mut impl Buf) -> Result<u32, Error> {
    if buf.remaining() < 4 {
        return Err(decode_error("fixed32 extension value truncated"));
    }
    Ok(buf.get_u32_le())
}

fn decode_error(message: impl Into<String>) -> Error {
    Error::Decode(DecodeError::new(message.into()))
}
