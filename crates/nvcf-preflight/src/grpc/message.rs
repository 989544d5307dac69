//! Schema-driven protobuf messages.
//!
//! A [`DynamicMessage`] holds scalar values keyed by field number and
//! encodes and decodes the protobuf wire format against a
//! [`MessageSchema`]. Only the scalar kinds reachable from flat JSON are
//! represented; other fields are skipped on decode and recorded by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use prost::bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext, WireType};
use prost::DecodeError;
use serde_json::{Map, Number, Value};

use super::error::FieldError;
use super::schema::{FieldKind, FieldSchema, MessageSchema};

/// A scalar field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `string`
    String(String),
    /// `int32` or `int64`
    Int64(i64),
    /// `bool`
    Bool(bool),
    /// `float` or `double`
    Double(f64),
}

impl FieldValue {
    /// JSON rendering.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Int64(v) => Value::from(*v),
            Self::Bool(b) => Value::Bool(*b),
            Self::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Double(v) => write!(f, "{v}"),
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert a JSON value into a value for `field`.
///
/// # Errors
///
/// Returns a [`FieldError`] naming the field when the kind is unsupported
/// or the JSON value does not fit it.
pub fn coerce(field: &FieldSchema, value: &Value) -> Result<FieldValue, FieldError> {
    if field.repeated || !field.kind.is_supported() {
        return Err(FieldError::Unsupported {
            field: field.name.clone(),
            kind: field.describe(),
        });
    }

    let mismatch = |expected| FieldError::TypeMismatch {
        field: field.name.clone(),
        expected,
        found: json_kind(value),
    };
    let out_of_range = |kind| FieldError::OutOfRange {
        field: field.name.clone(),
        value: value.to_string(),
        kind,
    };

    match (field.kind, value) {
        (FieldKind::String, Value::String(s)) => Ok(FieldValue::String(s.clone())),
        (FieldKind::Bool, Value::Bool(b)) => Ok(FieldValue::Bool(*b)),
        (FieldKind::Int64, Value::Number(n)) => {
            n.as_i64().map(FieldValue::Int64).ok_or_else(|| mismatch("integer"))
        }
        (FieldKind::Int32, Value::Number(n)) => {
            let v = n.as_i64().ok_or_else(|| mismatch("integer"))?;
            if i32::try_from(v).is_err() {
                return Err(out_of_range("int32"));
            }
            Ok(FieldValue::Int64(v))
        }
        (FieldKind::Float, Value::Number(n)) => {
            let v = n.as_f64().ok_or_else(|| mismatch("number"))?;
            if !v.is_finite() || v.abs() > f64::from(f32::MAX) {
                return Err(out_of_range("float"));
            }
            Ok(FieldValue::Double(v))
        }
        (FieldKind::Double, Value::Number(n)) => {
            n.as_f64().map(FieldValue::Double).ok_or_else(|| mismatch("number"))
        }
        (FieldKind::String, _) => Err(mismatch("string")),
        (FieldKind::Bool, _) => Err(mismatch("bool")),
        (FieldKind::Int32 | FieldKind::Int64, _) => Err(mismatch("integer")),
        _ => Err(mismatch("number")),
    }
}

/// A message instance over a [`MessageSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    schema: Arc<MessageSchema>,
    values: BTreeMap<u32, FieldValue>,
    skipped: Vec<String>,
}

impl DynamicMessage {
    /// Empty message.
    #[must_use]
    pub fn new(schema: Arc<MessageSchema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Build a message from a flat JSON object.
    ///
    /// # Errors
    ///
    /// Returns the first [`FieldError`] encountered.
    pub fn from_json(schema: Arc<MessageSchema>, input: &Map<String, Value>) -> Result<Self, FieldError> {
        let mut message = Self::new(schema);
        for (name, value) in input {
            message.set(name, value)?;
        }
        Ok(message)
    }

    /// Set a field by name from JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] for unknown fields or values that do not fit.
    pub fn set(&mut self, name: &str, value: &Value) -> Result<(), FieldError> {
        let field = self.schema.field(name).ok_or_else(|| FieldError::Unknown {
            field: name.to_string(),
            message: self.schema.full_name.clone(),
        })?;
        let value = coerce(field, value)?;
        self.values.insert(field.number, value);
        Ok(())
    }

    /// Value of a field by name, if populated.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let field = self.schema.field(name)?;
        self.values.get(&field.number)
    }

    /// Populated fields in field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> + '_ {
        self.values.iter().filter_map(|(number, value)| {
            self.schema
                .field_by_number(*number)
                .map(|field| (field.name.as_str(), value))
        })
    }

    /// Fields seen on decode whose kind is not represented.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Whether no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Schema this message was built against.
    #[must_use]
    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }

    /// Populated fields as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        self.fields()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }

    /// Append the wire encoding to `buf`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        for (&number, value) in &self.values {
            let Some(field) = self.schema.field_by_number(number) else {
                continue;
            };
            match (field.kind, value) {
                (FieldKind::String, FieldValue::String(s)) => encoding::string::encode(number, s, buf),
                (FieldKind::Int64, FieldValue::Int64(v)) => encoding::int64::encode(number, v, buf),
                (FieldKind::Int32, FieldValue::Int64(v)) => {
                    encoding::int32::encode(number, &(*v as i32), buf);
                }
                (FieldKind::Bool, FieldValue::Bool(b)) => encoding::bool::encode(number, b, buf),
                (FieldKind::Double, FieldValue::Double(v)) => encoding::double::encode(number, v, buf),
                (FieldKind::Float, FieldValue::Double(v)) => {
                    encoding::float::encode(number, &(*v as f32), buf);
                }
                _ => {}
            }
        }
    }

    /// Encode into a new buffer.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Decode wire bytes against `schema`.
    ///
    /// Unknown field numbers are skipped silently; known fields of
    /// unrepresented kinds are skipped and listed in [`Self::skipped`].
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed input or wire-type mismatches.
    pub fn decode<B: Buf>(schema: Arc<MessageSchema>, buf: &mut B) -> Result<Self, DecodeError> {
        let mut message = Self::new(schema);
        while buf.has_remaining() {
            let (number, wire_type) = encoding::decode_key(buf)?;
            message.merge_field(number, wire_type, buf)?;
        }
        Ok(message)
    }

    fn merge_field<B: Buf>(
        &mut self,
        number: u32,
        wire_type: WireType,
        buf: &mut B,
    ) -> Result<(), DecodeError> {
        let ctx = DecodeContext::default();
        let Some(field) = self.schema.field_by_number(number) else {
            return encoding::skip_field(wire_type, number, buf, ctx);
        };

        let value = match field.kind {
            _ if field.repeated => None,
            FieldKind::String => {
                let mut v = String::new();
                encoding::string::merge(wire_type, &mut v, buf, ctx.clone())?;
                Some(FieldValue::String(v))
            }
            FieldKind::Int64 => {
                let mut v = 0i64;
                encoding::int64::merge(wire_type, &mut v, buf, ctx.clone())?;
                Some(FieldValue::Int64(v))
            }
            FieldKind::Int32 => {
                let mut v = 0i32;
                encoding::int32::merge(wire_type, &mut v, buf, ctx.clone())?;
                Some(FieldValue::Int64(i64::from(v)))
            }
            FieldKind::Bool => {
                let mut v = false;
                encoding::bool::merge(wire_type, &mut v, buf, ctx.clone())?;
                Some(FieldValue::Bool(v))
            }
            FieldKind::Double => {
                let mut v = 0f64;
                encoding::double::merge(wire_type, &mut v, buf, ctx.clone())?;
                Some(FieldValue::Double(v))
            }
            FieldKind::Float => {
                let mut v = 0f32;
                encoding::float::merge(wire_type, &mut v, buf, ctx.clone())?;
                Some(FieldValue::Double(f64::from(v)))
            }
            _ => None,
        };

        match value {
            Some(value) => {
                self.values.insert(number, value);
            }
            None => {
                if !self.skipped.contains(&field.name) {
                    self.skipped.push(field.name.clone());
                }
                encoding::skip_field(wire_type, number, buf, ctx)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                FieldValue::String(s) => write!(f, "{name}: {s:?}")?,
                other => write!(f, "{name}: {other}")?,
            }
        }
        f.write_str("}")
    }
}
