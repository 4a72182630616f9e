//! Output-to-input adaptation.
//!
//! Producers and consumers in a plan rarely agree on exact shapes.  The
//! adapter layer reconciles a producer's output value with the parameter
//! shape a consumer declares, without prearranged contracts between tool
//! authors.  Adapters are derived per node and never cached across
//! executions.
//!
//! Rules, in priority order:
//! 1. A value already matching the expected shape is a no-op.
//! 2. Scalar string expected, mapping supplied: pick the first non-empty of
//!    `formatted_text`, `report_content`, `message`, `content`, `text`,
//!    `result`; else render the mapping as compact text.
//! 3. Sequence expected, mapping supplied with a `results` sequence: pick it.
//! 4. Mapping expected, mapping supplied: copy matching keys and fill
//!    defaults for missing keys that declare one.
//! 5. Otherwise pass through unchanged and mark `adapter_fallback`.

use serde::Serialize;
use serde_json::Value;

use pipeflow_registry::{ParamSpec, ToolSchema};

/// Priority list for rule 2's scalar pick.
const SCALAR_PICK_KEYS: [&str; 6] = [
    "formatted_text",
    "report_content",
    "message",
    "content",
    "text",
    "result",
];

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// The coarse shape a consumer expects for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Text,
    Number,
    Boolean,
    Sequence,
    Mapping,
    Any,
}

impl TargetKind {
    /// Map a schema type tag to a target kind.
    pub fn from_type(param_type: &str) -> Self {
        match param_type {
            "string" => Self::Text,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Sequence,
            "object" => Self::Mapping,
            _ => Self::Any,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Sequence => value.is_array(),
            Self::Mapping => value.is_object(),
            Self::Any => true,
        }
    }
}

/// The full expectation for one parameter: its kind, and for mapping targets
/// the field specs used for default filling.
#[derive(Debug, Clone)]
pub struct TargetShape {
    pub kind: TargetKind,
    pub fields: Vec<ParamSpec>,
}

impl TargetShape {
    /// Build the shape for one declared parameter.  Mapping targets borrow
    /// the tool's parameter specs as field declarations.
    pub fn from_param(spec: &ParamSpec, schema: &ToolSchema) -> Self {
        let kind = TargetKind::from_type(&spec.param_type);
        let fields = if kind == TargetKind::Mapping {
            schema.params.clone()
        } else {
            Vec::new()
        };
        Self { kind, fields }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// The outcome of comparing a source value against a target shape.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub compatible: bool,
    pub missing: Vec<String>,
    pub type_mismatches: Vec<String>,
}

/// Compare a producer's value with a consumer's expected shape.
pub fn analyze(source: &Value, target: &TargetShape) -> Analysis {
    if target.kind.matches(source) {
        let missing: Vec<String> = match (target.kind, source.as_object()) {
            (TargetKind::Mapping, Some(map)) => target
                .fields
                .iter()
                .filter(|f| f.required && !map.contains_key(&f.name))
                .map(|f| f.name.clone())
                .collect(),
            _ => Vec::new(),
        };
        return Analysis {
            compatible: missing.is_empty(),
            missing,
            type_mismatches: Vec::new(),
        };
    }

    Analysis {
        compatible: false,
        missing: Vec::new(),
        type_mismatches: vec![format!(
            "expected {:?}, found {}",
            target.kind,
            value_kind(source)
        )],
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
        Value::Null => "null",
    }
}

// ---------------------------------------------------------------------------
// Adapter specs
// ---------------------------------------------------------------------------

/// One field-mapping rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AdapterRule {
    /// Rename a mapping key.
    Rename { from: String, to: String },
    /// Pick one field out of a mapping.
    PathPick { path: String },
    /// Render the value as compact text.
    Flatten,
    /// Insert a default for a missing mapping key.
    DefaultFill { key: String, value: Value },
}

/// A reshape specification from one producer to one consumer parameter.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterSpec {
    /// The producing component id.
    pub source_node: String,
    /// The consuming tool name.
    pub target_tool: String,
    /// Rules applied in order.
    pub rules: Vec<AdapterRule>,
    /// True when no rule applied and the value passes through unchanged.
    pub fallback: bool,
}

/// Derive an adapter for a mismatched value, or `None` when the value
/// already fits (rule 1).
pub fn build_adapter(
    source_node: &str,
    target_tool: &str,
    source: &Value,
    target: &TargetShape,
) -> Option<AdapterSpec> {
    let spec = |rules: Vec<AdapterRule>, fallback: bool| AdapterSpec {
        source_node: source_node.to_string(),
        target_tool: target_tool.to_string(),
        rules,
        fallback,
    };

    match (target.kind, source) {
        // Rule 1: exact shape match is a no-op — except mapping targets with
        // missing defaultable fields, handled below.
        (kind, value) if kind.matches(value) && kind != TargetKind::Mapping => None,

        // Rule 2: string expected, mapping supplied.
        (TargetKind::Text, Value::Object(map)) => {
            for key in SCALAR_PICK_KEYS {
                if let Some(Value::String(s)) = map.get(key) {
                    if !s.is_empty() {
                        return Some(spec(vec![AdapterRule::PathPick { path: key.to_string() }], false));
                    }
                }
            }
            Some(spec(vec![AdapterRule::Flatten], false))
        }

        // Rule 3: sequence expected, mapping supplied with a `results` field.
        (TargetKind::Sequence, Value::Object(map)) if map.get("results").is_some_and(Value::is_array) => {
            Some(spec(vec![AdapterRule::PathPick { path: "results".to_string() }], false))
        }

        // Rule 4: mapping expected, mapping supplied — fill declared defaults
        // for missing keys.
        (TargetKind::Mapping, Value::Object(map)) => {
            let fills: Vec<AdapterRule> = target
                .fields
                .iter()
                .filter(|f| !map.contains_key(&f.name))
                .filter_map(|f| {
                    f.default.as_ref().map(|default| AdapterRule::DefaultFill {
                        key: f.name.clone(),
                        value: default.clone(),
                    })
                })
                .collect();
            if fills.is_empty() {
                None
            } else {
                Some(spec(fills, false))
            }
        }

        // Rule 5: pass through unchanged, flagged as a fallback.
        _ => Some(spec(Vec::new(), true)),
    }
}

/// Apply an adapter spec to a source value.
pub fn apply(spec: &AdapterSpec, source: &Value) -> Value {
    let mut value = source.clone();
    for rule in &spec.rules {
        value = match rule {
            AdapterRule::Rename { from, to } => match value {
                Value::Object(mut map) => {
                    if let Some(v) = map.remove(from) {
                        map.insert(to.clone(), v);
                    }
                    Value::Object(map)
                }
                other => other,
            },
            AdapterRule::PathPick { path } => value.get(path).cloned().unwrap_or(value),
            AdapterRule::Flatten => Value::String(render_flat(&value)),
            AdapterRule::DefaultFill { key, value: default } => match value {
                Value::Object(mut map) => {
                    map.entry(key.clone()).or_insert_with(|| default.clone());
                    Value::Object(map)
                }
                other => other,
            },
        };
    }
    value
}

fn render_flat(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
