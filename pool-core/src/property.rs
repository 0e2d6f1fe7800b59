//! Property schema and value types shared by the loader (C2) and the
//! property binder (C3), spec §4.2/§4.3/§6.

use serde::{Deserialize, Serialize};

/// A scalar or array property value. Arrays are homogeneous; the loader
/// rejects a schema declaring anything else (spec §4.2's `type` set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PropertyValue {
    Bool(bool),
    Int32(i32),
    Float64(f64),
    String(String),
    BoolArray(Vec<bool>),
    Int32Array(Vec<i32>),
    Float64Array(Vec<f64>),
    StringArray(Vec<String>),
}

/// The declared type of a property, independent of any particular value
/// (spec §4.2: `bool, int32, float64, string, bool[], int32[], float64[],
/// string[]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Bool,
    Int32,
    Float64,
    String,
    BoolArray,
    Int32Array,
    Float64Array,
    StringArray,
}

impl PropertyType {
    pub fn name(self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Int32 => "int32",
            PropertyType::Float64 => "float64",
            PropertyType::String => "string",
            PropertyType::BoolArray => "bool[]",
            PropertyType::Int32Array => "int32[]",
            PropertyType::Float64Array => "float64[]",
            PropertyType::StringArray => "string[]",
        }
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            PropertyType::BoolArray
                | PropertyType::Int32Array
                | PropertyType::Float64Array
                | PropertyType::StringArray
        )
    }
}

/// One entry of a class's declared property schema, in declaration order
/// (spec §4.3 step 5: "positional conventions ... survive the round-trip").
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: PropertyType,
    pub description: String,
    pub default: Option<PropertyValue>,
}

/// An ordered list of `PropertyDescriptor`s, as extracted from a loaded
/// class (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct PropertySchema {
    pub entries: Vec<PropertyDescriptor>,
}

impl PropertySchema {
    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.entries.iter().find(|d| d.name == name)
    }
}

/// Serialize a value to the config-store wire format (spec §6): scalars as
/// their textual representation, arrays as elements separated by `\n`, with
/// a literal embedded newline in a string element escaped as `\n\n`.
pub fn serialize_value(value: &PropertyValue) -> String {
    fn escape(s: &str) -> String {
        s.replace('\n', "\n\n")
    }
    match value {
        PropertyValue::Bool(b) => b.to_string(),
        PropertyValue::Int32(i) => i.to_string(),
        PropertyValue::Float64(f) => f.to_string(),
        PropertyValue::String(s) => escape(s),
        PropertyValue::BoolArray(v) => v.iter().map(|b| b.to_string()).collect::<Vec<_>>().join("\n"),
        PropertyValue::Int32Array(v) => v.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("\n"),
        PropertyValue::Float64Array(v) => v.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("\n"),
        PropertyValue::StringArray(v) => v.iter().map(|s| escape(s)).collect::<Vec<_>>().join("\n"),
    }
}

/// Parse the wire format back into a typed value per `ty`. Array elements
/// are split on single `\n` while a doubled `\n\n` is unescaped back to a
/// literal newline inside one element.
pub fn deserialize_value(raw: &str, ty: PropertyType) -> Option<PropertyValue> {
    fn split_escaped(raw: &str) -> Vec<String> {
        // Placeholder sentinel unlikely to occur in real property text.
        const ESCAPED: &str = "\u{0}ESCAPED_NEWLINE\u{0}";
        let protected = raw.replace("\n\n", ESCAPED);
        protected
            .split('\n')
            .map(|s| s.replace(ESCAPED, "\n"))
            .collect()
    }

    match ty {
        PropertyType::Bool => raw.parse().ok().map(PropertyValue::Bool),
        PropertyType::Int32 => raw.parse().ok().map(PropertyValue::Int32),
        PropertyType::Float64 => raw.parse().ok().map(PropertyValue::Float64),
        PropertyType::String => Some(PropertyValue::String(raw.replace("\n\n", "\n"))),
        PropertyType::BoolArray => split_escaped(raw)
            .into_iter()
            .map(|s| s.parse().ok())
            .collect::<Option<Vec<_>>>()
            .map(PropertyValue::BoolArray),
        PropertyType::Int32Array => split_escaped(raw)
            .into_iter()
            .map(|s| s.parse().ok())
            .collect::<Option<Vec<_>>>()
            .map(PropertyValue::Int32Array),
        PropertyType::Float64Array => split_escaped(raw)
            .into_iter()
            .map(|s| s.parse().ok())
            .collect::<Option<Vec<_>>>()
            .map(PropertyValue::Float64Array),
        PropertyType::StringArray => Some(PropertyValue::StringArray(split_escaped(raw))),
    }
}
