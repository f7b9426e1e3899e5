//! Polymorphic output-format values.
//!
//! A revision's `output_format` maps field names to either a bare type name
//! (`"str"`) or a structured descriptor (`{"type": "list", "item_type": ...}`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry of a revision's output format.
///
/// Decoding tries `Simple` first and falls back to `Extended`: a JSON string
/// only matches the first variant, an object only the second. Numbers,
/// booleans and null match neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputFormatValue {
    Simple(String),
    Extended(ExtendedOutputFormat),
}

/// Structured output-format descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedOutputFormat {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, String>>,
}

impl ExtendedOutputFormat {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }
}

impl OutputFormatValue {
    pub fn simple(kind: impl Into<String>) -> Self {
        OutputFormatValue::Simple(kind.into())
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, OutputFormatValue::Simple(_))
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, OutputFormatValue::Extended(_))
    }

    pub fn as_simple(&self) -> Option<&str> {
        match self {
            OutputFormatValue::Simple(kind) => Some(kind),
            OutputFormatValue::Extended(_) => None,
        }
    }

    pub fn as_extended(&self) -> Option<&ExtendedOutputFormat> {
        match self {
            OutputFormatValue::Extended(format) => Some(format),
            OutputFormatValue::Simple(_) => None,
        }
    }

    /// The primitive or structured type name, whichever form is held.
    pub fn type_name(&self) -> &str {
        match self {
            OutputFormatValue::Simple(kind) => kind,
            OutputFormatValue::Extended(format) => &format.kind,
        }
    }
}

impl From<ExtendedOutputFormat> for OutputFormatValue {
    fn from(format: ExtendedOutputFormat) -> Self {
        OutputFormatValue::Extended(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_decodes_as_simple() {
        let value: OutputFormatValue = serde_json::from_str(r#""str""#).unwrap();
        assert!(value.is_simple());
        assert_eq!(value.as_simple(), Some("str"));
        assert!(value.as_extended().is_none());
    }

    #[test]
    fn object_decodes_as_extended() {
        let value: OutputFormatValue = serde_json::from_str(
            r#"{"type":"list","item_type":"int","description":"scores"}"#,
        )
        .unwrap();
        let ext = value.as_extended().unwrap();
        assert_eq!(ext.kind, "list");
        assert_eq!(ext.item_type.as_deref(), Some("int"));
        assert_eq!(ext.description.as_deref(), Some("scores"));
        assert_eq!(value.type_name(), "list");
    }

    #[test]
    fn other_json_is_rejected() {
        assert!(serde_json::from_str::<OutputFormatValue>("42").is_err());
        assert!(serde_json::from_str::<OutputFormatValue>("true").is_err());
        assert!(serde_json::from_str::<OutputFormatValue>("null").is_err());
    }

    #[test]
    fn simple_survives_encode_decode() {
        let value = OutputFormatValue::simple("str");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#""str""#);
        let back: OutputFormatValue = serde_json::from_str(&json).unwrap();
        assert!(back.is_simple());
        assert_eq!(back, value);
    }

    #[test]
    fn extended_survives_encode_decode_with_all_fields() {
        let value = OutputFormatValue::from(ExtendedOutputFormat {
            kind: "object".to_string(),
            description: Some("applicant".to_string()),
            item_type: Some("str".to_string()),
            object: Some(BTreeMap::from([
                ("name".to_string(), "str".to_string()),
                ("age".to_string(), "int".to_string()),
            ])),
            options: Some(BTreeMap::from([("strict".to_string(), "true".to_string())])),
        });
        let json = serde_json::to_string(&value).unwrap();
        let back: OutputFormatValue = serde_json::from_str(&json).unwrap();
        assert!(back.is_extended());
        assert_eq!(back, value);
    }

    #[test]
    fn extended_omits_unset_fields() {
        let value = OutputFormatValue::from(ExtendedOutputFormat::new("str"));
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"type": "str"}));
    }
}
