//! # Dynamic Message Builder
//!
//! Converts a [`MessageValue`] tree into a concrete, encodable
//! [`DynamicMessage`], guided by a [`MessageDescriptor`].
//!
//! Fields absent from the tree are simply left unset, and tree entries that
//! match no declared field are ignored. Shape disagreements
//! between a value node and its field descriptor (a scalar where a message
//! is declared, a single value where a list is declared, and so on) are
//! fatal and surface as [`BuildError::SchemaMismatch`].
//!
//! Malformed scalar text is NOT fatal by default: a numeric field fed
//! `"banana"` becomes zero, a bool becomes false. The input typically comes
//! from free-text form fields that cannot be pre-validated against the wire
//! type, so the builder favors producing a best-effort message over refusing
//! the whole request. [`MessageBuilder::strict`] turns the same condition
//! into [`BuildError::InvalidScalar`] for callers that want the check.
use crate::value::{FieldValue, MessageValue};
use bytes::Bytes;
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("field '{field}': expected a {expected} value, got a {actual} value")]
    SchemaMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("field '{field}': '{text}' is not a valid {kind}")]
    InvalidScalar {
        field: String,
        text: String,
        kind: &'static str,
    },
}

/// Builds a message with the default lenient scalar conversion rules.
pub fn build_message(
    descriptor: &MessageDescriptor,
    value: &MessageValue,
) -> Result<DynamicMessage, BuildError> {
    MessageBuilder::new().build(descriptor, value)
}

/// Descriptor-directed construction of [`DynamicMessage`]s from value trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageBuilder {
    strict: bool,
}

impl MessageBuilder {
    /// Lenient builder: malformed scalar text defaults to zero/false.
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Strict builder: malformed scalar text fails the build.
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn build(
        &self,
        descriptor: &MessageDescriptor,
        value: &MessageValue,
    ) -> Result<DynamicMessage, BuildError> {
        let mut message = DynamicMessage::new(descriptor.clone());
        for field in descriptor.fields() {
            let Some(node) = value.get(field.name()) else {
                continue;
            };
            let converted = self.convert_field(&field, node)?;
            message.set_field(&field, converted);
        }
        Ok(message)
    }

    fn convert_field(&self, field: &FieldDescriptor, node: &FieldValue) -> Result<Value, BuildError> {
        if field.is_map() {
            return self.convert_map(field, node);
        }

        match (field.kind(), field.is_list()) {
            (Kind::Message(nested), true) => {
                let items = repeated(field, node)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let value = message(field, item)?;
                    values.push(Value::Message(self.build(&nested, value)?));
                }
                Ok(Value::List(values))
            }
            (Kind::Message(nested), false) => {
                let value = message(field, node)?;
                Ok(Value::Message(self.build(&nested, value)?))
            }
            (kind, true) => {
                let items = repeated(field, node)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let text = scalar(field, item)?;
                    values.push(self.convert_scalar(field, &kind, text)?);
                }
                Ok(Value::List(values))
            }
            (kind, false) => {
                let text = scalar(field, node)?;
                self.convert_scalar(field, &kind, text)
            }
        }
    }

    /// Map fields take the same shape a form renders them in: a repeated
    /// list of `{ key, value }` entry messages.
    fn convert_map(&self, field: &FieldDescriptor, node: &FieldValue) -> Result<Value, BuildError> {
        let entry_descriptor = match field.kind() {
            Kind::Message(entry) => entry,
            _ => return Err(mismatch(field, "repeated", node)),
        };
        let key_field = entry_descriptor.map_entry_key_field();
        let value_field = entry_descriptor.map_entry_value_field();

        let items = repeated(field, node)?;
        let mut entries = HashMap::with_capacity(items.len());
        for item in items {
            let value = message(field, item)?;
            let entry = self.build(&entry_descriptor, value)?;
            let Some(key) = to_map_key(entry.get_field(&key_field).into_owned()) else {
                continue;
            };
            entries.insert(key, entry.get_field(&value_field).into_owned());
        }
        Ok(Value::Map(entries))
    }

    fn convert_scalar(
        &self,
        field: &FieldDescriptor,
        kind: &Kind,
        text: &str,
    ) -> Result<Value, BuildError> {
        let parsed = match kind {
            Kind::Double => text.parse::<f64>().ok().map(Value::F64),
            Kind::Float => text.parse::<f64>().ok().map(|v| Value::F32(v as f32)),
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
                text.parse::<i32>().ok().map(Value::I32)
            }
            Kind::Enum(_) => text.parse::<i32>().ok().map(Value::EnumNumber),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
                text.parse::<i64>().ok().map(Value::I64)
            }
            Kind::Uint32 | Kind::Fixed32 => text.parse::<u32>().ok().map(Value::U32),
            Kind::Uint64 | Kind::Fixed64 => text.parse::<u64>().ok().map(Value::U64),
            Kind::Bool => text.parse::<bool>().ok().map(Value::Bool),
            Kind::Bytes => Some(Value::Bytes(Bytes::copy_from_slice(text.as_bytes()))),
            Kind::String => Some(Value::String(text.to_string())),
            Kind::Message(_) => {
                return Err(BuildError::SchemaMismatch {
                    field: field.name().to_string(),
                    expected: "message",
                    actual: "scalar",
                });
            }
        };

        match parsed {
            Some(value) => Ok(value),
            None if self.strict => Err(BuildError::InvalidScalar {
                field: field.name().to_string(),
                text: text.to_string(),
                kind: kind_name(kind),
            }),
            None => Ok(zero_value(kind)),
        }
    }
}

fn mismatch(field: &FieldDescriptor, expected: &'static str, node: &FieldValue) -> BuildError {
    BuildError::SchemaMismatch {
        field: field.name().to_string(),
        expected,
        actual: node.shape(),
    }
}

fn repeated<'a>(field: &FieldDescriptor, node: &'a FieldValue) -> Result<&'a [FieldValue], BuildError> {
    node.as_repeated().ok_or_else(|| mismatch(field, "repeated", node))
}

fn message<'a>(field: &FieldDescriptor, node: &'a FieldValue) -> Result<&'a MessageValue, BuildError> {
    node.as_message().ok_or_else(|| mismatch(field, "message", node))
}

fn scalar<'a>(field: &FieldDescriptor, node: &'a FieldValue) -> Result<&'a str, BuildError> {
    node.as_scalar().ok_or_else(|| mismatch(field, "scalar", node))
}

fn zero_value(kind: &Kind) -> Value {
    match kind {
        Kind::Double => Value::F64(0.0),
        Kind::Float => Value::F32(0.0),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(0),
        Kind::Enum(_) => Value::EnumNumber(0),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Value::I64(0),
        Kind::Uint32 | Kind::Fixed32 => Value::U32(0),
        Kind::Uint64 | Kind::Fixed64 => Value::U64(0),
        Kind::Bool => Value::Bool(false),
        Kind::Bytes => Value::Bytes(Bytes::new()),
        Kind::String => Value::String(String::new()),
        Kind::Message(descriptor) => Value::Message(DynamicMessage::new(descriptor.clone())),
    }
}

fn kind_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Sint32 => "sint32",
        Kind::Sfixed32 => "sfixed32",
        Kind::Int64 => "int64",
        Kind::Sint64 => "sint64",
        Kind::Sfixed64 => "sfixed64",
        Kind::Uint32 => "uint32",
        Kind::Fixed32 => "fixed32",
        Kind::Uint64 => "uint64",
        Kind::Fixed64 => "fixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Enum(_) => "enum number",
        Kind::Message(_) => "message",
    }
}

/// Proto map keys are restricted to bool, integer and string kinds; a
/// well-formed entry descriptor never yields the remaining variants.
fn to_map_key(value: Value) -> Option<MapKey> {
    match value {
        Value::Bool(v) => Some(MapKey::Bool(v)),
        Value::I32(v) => Some(MapKey::I32(v)),
        Value::I64(v) => Some(MapKey::I64(v)),
        Value::U32(v) => Some(MapKey::U32(v)),
        Value::U64(v) => Some(MapKey::U64(v)),
        Value::String(v) => Some(MapKey::String(v)),
        _ => None,
    }
}
