//! # Dynamic Value Model
//!
//! A recursive, schema-agnostic representation of a message's field values.
//! Scalars are carried as plain text; their wire type is only decided later,
//! when a [`crate::builder::MessageBuilder`] converts the tree against a
//! message descriptor. This is what lets a caller describe a request without
//! any compile-time knowledge of the schema.
use std::collections::BTreeMap;
use thiserror::Error;

/// One node of a value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A textual scalar or enum value; converted per the corresponding field
    /// descriptor's kind at build time.
    Scalar(String),
    /// A nested message value.
    Message(MessageValue),
    /// An ordered sequence of values for a repeated field.
    Repeated(Vec<FieldValue>),
}

impl FieldValue {
    pub fn scalar(text: impl Into<String>) -> Self {
        FieldValue::Scalar(text.into())
    }

    pub(crate) fn as_scalar(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(text) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn as_message(&self) -> Option<&MessageValue> {
        match self {
            FieldValue::Message(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn as_repeated(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Repeated(items) => Some(items),
            _ => None,
        }
    }

    /// Shape label used in error messages.
    pub(crate) fn shape(&self) -> &'static str {
        match self {
            FieldValue::Scalar(_) => "scalar",
            FieldValue::Message(_) => "message",
            FieldValue::Repeated(_) => "repeated",
        }
    }
}

/// A message node: field name to value node.
///
/// Fields absent from the map are left unset when the message is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageValue {
    fields: BTreeMap<String, FieldValue>,
}

#[derive(Error, Debug)]
pub enum JsonValueError {
    #[error("expected a JSON object for a message body, got {0}")]
    NotAnObject(&'static str),
    #[error("field '{0}': null is not a valid array element")]
    NullElement(String),
    #[error("field '{0}': nested arrays have no field value representation")]
    NestedArray(String),
}

impl MessageValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field's value, replacing any previous one.
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style [`MessageValue::set`].
    pub fn with(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Converts a JSON object into a value tree.
    ///
    /// Objects map to message nodes, arrays to repeated nodes, and every JSON
    /// scalar to its textual rendering (`"a"` and `1` and `true` become the
    /// texts `a`, `1`, `true`). A `null` member means "leave the field unset"
    /// and is skipped; `null` array elements and arrays of arrays have no
    /// field value equivalent and are rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, JsonValueError> {
        let serde_json::Value::Object(members) = json else {
            return Err(JsonValueError::NotAnObject(json_kind(json)));
        };

        let mut value = MessageValue::new();
        for (field, member) in members {
            let Some(node) = field_from_json(field, member)? else {
                continue;
            };
            value.set(field.clone(), node);
        }
        Ok(value)
    }
}

fn field_from_json(
    field: &str,
    json: &serde_json::Value,
) -> Result<Option<FieldValue>, JsonValueError> {
    let node = match json {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Array(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for item in items {
                let node = match item {
                    serde_json::Value::Null => {
                        return Err(JsonValueError::NullElement(field.to_string()));
                    }
                    serde_json::Value::Array(_) => {
                        return Err(JsonValueError::NestedArray(field.to_string()));
                    }
                    serde_json::Value::Object(_) => FieldValue::Message(MessageValue::from_json(item)?),
                    scalar => FieldValue::Scalar(scalar_text(scalar)),
                };
                nodes.push(node);
            }
            FieldValue::Repeated(nodes)
        }
        serde_json::Value::Object(_) => FieldValue::Message(MessageValue::from_json(json)?),
        scalar => FieldValue::Scalar(scalar_text(scalar)),
    };
    Ok(Some(node))
}

fn scalar_text(json: &serde_json::Value) -> String {
    match json {
        // Strings drop their quotes; everything else keeps its JSON rendering.
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_maps_shapes() {
        let value = MessageValue::from_json(&json!({
            "name": "ada",
            "age": 36,
            "active": true,
            "tags": ["a", "b"],
            "inner": { "note": "x" },
            "skipped": null,
        }))
        .unwrap();

        assert_eq!(value.get("name"), Some(&FieldValue::scalar("ada")));
        assert_eq!(value.get("age"), Some(&FieldValue::scalar("36")));
        assert_eq!(value.get("active"), Some(&FieldValue::scalar("true")));
        assert_eq!(
            value.get("tags"),
            Some(&FieldValue::Repeated(vec![
                FieldValue::scalar("a"),
                FieldValue::scalar("b"),
            ]))
        );
        assert_eq!(
            value.get("inner"),
            Some(&FieldValue::Message(
                MessageValue::new().with("note", FieldValue::scalar("x"))
            ))
        );
        assert_eq!(value.get("skipped"), None);
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(
            MessageValue::from_json(&json!([1, 2])),
            Err(JsonValueError::NotAnObject("an array"))
        ));
    }

    #[test]
    fn from_json_rejects_null_array_elements() {
        assert!(matches!(
            MessageValue::from_json(&json!({ "xs": [null] })),
            Err(JsonValueError::NullElement(field)) if field == "xs"
        ));
    }

    #[test]
    fn from_json_rejects_nested_arrays() {
        assert!(matches!(
            MessageValue::from_json(&json!({ "xs": [[1]] })),
            Err(JsonValueError::NestedArray(field)) if field == "xs"
        ));
    }
}
