//! Tool schema declarations.
//!
//! Every tool record carries an explicit parameter schema, frozen at
//! registration time.  Parameters are stored in declaration order because the
//! synthesizer's backward-compatibility merge must keep prior parameters at
//! their prior positions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Where a tool record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Compiled into the binary.
    BuiltIn,
    /// Registered at runtime by a user.
    UserSupplied,
    /// Emitted by the code synthesizer.
    Synthesized,
}

impl Provenance {
    /// Stable string form used in the catalog and in events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuiltIn => "built_in",
            Self::UserSupplied => "user_supplied",
            Self::Synthesized => "synthesized",
        }
    }

    /// Parse the catalog string form, defaulting to `Synthesized` for
    /// unrecognized tags.
    pub fn parse(s: &str) -> Self {
        match s {
            "built_in" => Self::BuiltIn,
            "user_supplied" => Self::UserSupplied,
            _ => Self::Synthesized,
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter specs
// ---------------------------------------------------------------------------

/// Declaration of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Declared type: `string`, `number`, `boolean`, `array`, `object`, or
    /// `any` when the inspector cannot tell.
    #[serde(rename = "type")]
    pub param_type: String,
    /// Whether the parameter must be supplied (no default).
    pub required: bool,
    /// Default value used when the parameter is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    /// A required parameter with no default.
    pub fn required(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: true,
            default: None,
        }
    }

    /// An optional parameter with a default value.
    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        default: Value,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: false,
            default: Some(default),
        }
    }
}

/// An ordered parameter schema attached to every tool record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Parameters in declaration order.
    pub params: Vec<ParamSpec>,
}

impl ToolSchema {
    /// Build a schema from an ordered list of parameter specs.
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Serialize to the catalog's JSON-array column form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.params).unwrap_or_else(|_| Value::Array(Vec::new()))
    }

    /// Deserialize from the catalog's JSON-array column form.  Unparseable
    /// entries are dropped rather than failing the whole record.
    pub fn from_value(value: &Value) -> Self {
        let params = value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Self { params }
    }

    /// Infer a parameter schema from an observed params object: every field
    /// becomes a required parameter typed after its value.
    pub fn infer_from_params(params: &serde_json::Map<String, Value>) -> Self {
        Self {
            params: params
                .iter()
                .map(|(name, value)| ParamSpec::required(name.clone(), json_type_name(value)))
                .collect(),
        }
    }
}

/// The schema type tag for a JSON value.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "any",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_round_trip() {
        for p in [
            Provenance::BuiltIn,
            Provenance::UserSupplied,
            Provenance::Synthesized,
        ] {
            assert_eq!(Provenance::parse(p.as_str()), p);
        }
        assert_eq!(Provenance::parse("garbage"), Provenance::Synthesized);
    }

    #[test]
    fn schema_preserves_order() {
        let schema = ToolSchema::new(vec![
            ParamSpec::required("query", "string"),
            ParamSpec::optional("limit", "number", serde_json::json!(5)),
        ]);
        assert_eq!(schema.names(), vec!["query", "limit"]);

        let round_tripped = ToolSchema::from_value(&schema.to_value());
        assert_eq!(round_tripped, schema);
    }

    #[test]
    fn infer_from_params_types_each_field() {
        let params = serde_json::json!({"q": "x", "n": 3, "flag": true});
        let schema = ToolSchema::infer_from_params(params.as_object().unwrap());

        assert_eq!(schema.get("q").unwrap().param_type, "string");
        assert_eq!(schema.get("n").unwrap().param_type, "number");
        assert_eq!(schema.get("flag").unwrap().param_type, "boolean");
        assert!(schema.get("q").unwrap().required);
    }

    #[test]
    fn unknown_value_types_record_any() {
        assert_eq!(json_type_name(&Value::Null), "any");
    }
}
