//! Placeholder resolution and execution ordering.
//!
//! Parameters may reference the outputs of earlier components with
//! `$<id>.output` or `$<id>.output.<key>`.  The resolver extracts those
//! references, substitutes resolved values, and derives a topological
//! execution order over the implicit dependency graph.
//!
//! Substitution is value-typed when a string consists of exactly one
//! placeholder, and textual otherwise (non-string values render in their
//! compact JSON form).  A `.key` that is missing from a mapping output falls
//! back to the full stored value and records an `adapter_fallback` warning.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::plan::{Component, OutputDescriptor};

/// The stored result of a completed component.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    /// The producing component's id.
    pub node_id: String,
    /// The conceptual output key declared by the component.
    pub output_key: String,
    /// The tool's return value.
    pub value: Value,
    /// The component's full output descriptor.
    pub descriptor: OutputDescriptor,
}

/// One parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The referenced component id.
    pub node_id: String,
    /// The optional output key.
    pub key: Option<String>,
}

/// Resolved parameters plus any non-fatal fallback warnings.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub params: Value,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Parses and substitutes `$id.output[.key]` placeholders.
pub struct PlaceholderResolver {
    pattern: Regex,
}

impl PlaceholderResolver {
    /// Create a resolver with the placeholder grammar compiled.
    pub fn new() -> Self {
        Self {
            // id and key are identifiers: [A-Za-z_][A-Za-z0-9_]*
            pattern: Regex::new(
                r"\$([A-Za-z_][A-Za-z0-9_]*)\.output(?:\.([A-Za-z_][A-Za-z0-9_]*))?",
            )
            .expect("placeholder pattern is valid"),
        }
    }

    /// Recursively collect every placeholder reference in a params structure.
    pub fn extract_references(&self, params: &Value) -> Vec<Reference> {
        let mut refs = Vec::new();
        self.collect_refs(params, &mut refs);
        refs
    }

    fn collect_refs(&self, value: &Value, refs: &mut Vec<Reference>) {
        match value {
            Value::String(s) => {
                for captures in self.pattern.captures_iter(s) {
                    refs.push(Reference {
                        node_id: captures[1].to_string(),
                        key: captures.get(2).map(|m| m.as_str().to_string()),
                    });
                }
            }
            Value::Object(map) => {
                for v in map.values() {
                    self.collect_refs(v, refs);
                }
            }
            Value::Array(arr) => {
                for v in arr {
                    self.collect_refs(v, refs);
                }
            }
            _ => {}
        }
    }

    /// Return a deep copy of `params` with every placeholder substituted
    /// against `outputs`.  Missing references are fatal.
    pub fn resolve(&self, params: &Value, outputs: &HashMap<String, NodeOutput>) -> Result<Resolved> {
        let mut warnings = Vec::new();
        let params = self.resolve_value(params, outputs, &mut warnings)?;
        Ok(Resolved { params, warnings })
    }

    fn resolve_value(
        &self,
        value: &Value,
        outputs: &HashMap<String, NodeOutput>,
        warnings: &mut Vec<String>,
    ) -> Result<Value> {
        match value {
            Value::String(s) => self.resolve_string(s, outputs, warnings),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(k.clone(), self.resolve_value(v, outputs, warnings)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(arr) => {
                let resolved = arr
                    .iter()
                    .map(|v| self.resolve_value(v, outputs, warnings))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &self,
        s: &str,
        outputs: &HashMap<String, NodeOutput>,
        warnings: &mut Vec<String>,
    ) -> Result<Value> {
        // Whole-string placeholder: substitute at native type.
        if let Some(m) = self.pattern.find(s) {
            if m.start() == 0 && m.end() == s.len() {
                let captures = self.pattern.captures(s).expect("find implies captures");
                let reference = Reference {
                    node_id: captures[1].to_string(),
                    key: captures.get(2).map(|c| c.as_str().to_string()),
                };
                return self.lookup(&reference, outputs, warnings);
            }
        } else {
            return Ok(Value::String(s.to_string()));
        }

        // Mixed text: textual interpolation, UTF-8 safe via match offsets.
        let mut result = String::with_capacity(s.len());
        let mut last_end = 0;
        for captures in self.pattern.captures_iter(s) {
            let whole = captures.get(0).expect("group 0 always present");
            let reference = Reference {
                node_id: captures[1].to_string(),
                key: captures.get(2).map(|c| c.as_str().to_string()),
            };
            let value = self.lookup(&reference, outputs, warnings)?;
            result.push_str(&s[last_end..whole.start()]);
            result.push_str(&render_compact(&value));
            last_end = whole.end();
        }
        result.push_str(&s[last_end..]);
        Ok(Value::String(result))
    }

    /// Resolve one reference against the output map.
    ///
    /// Key-path semantics: a top-level field of a mapping output wins; a key
    /// equal to the producer's declared output key yields the full value;
    /// anything else falls back to the full value with a warning.
    fn lookup(
        &self,
        reference: &Reference,
        outputs: &HashMap<String, NodeOutput>,
        warnings: &mut Vec<String>,
    ) -> Result<Value> {
        let output = outputs
            .get(&reference.node_id)
            .ok_or_else(|| EngineError::DanglingReference {
                reference: render_reference(reference),
                node: reference.node_id.clone(),
            })?;

        let Some(key) = &reference.key else {
            return Ok(output.value.clone());
        };

        if let Some(map) = output.value.as_object() {
            if let Some(field) = map.get(key) {
                return Ok(field.clone());
            }
        }

        if &output.output_key == key {
            return Ok(output.value.clone());
        }

        warnings.push(format!(
            "adapter_fallback: `{}` has no key `{key}`; using the full output of `{}`",
            render_reference(reference),
            reference.node_id,
        ));
        Ok(output.value.clone())
    }

    /// Derive a topological execution order over the implicit dependency
    /// graph, preserving plan order among unrelated components.
    pub fn build_execution_order(&self, components: &[Component]) -> Result<Vec<String>> {
        let index_of: HashMap<&str, usize> = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.as_str(), i))
            .collect();

        // Edge a -> b whenever b's params reference a.  Unknown references
        // are left for `validate` to report.
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
        let mut indegree: Vec<usize> = vec![0; components.len()];
        let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();

        for (b, component) in components.iter().enumerate() {
            for reference in self.extract_references(&component.params) {
                let Some(&a) = index_of.get(reference.node_id.as_str()) else {
                    continue;
                };
                if seen_edges.insert((a, b)) {
                    dependents[a].push(b);
                    indegree[b] += 1;
                }
            }
        }

        // Kahn's algorithm; the ready set always yields the smallest plan
        // index, so unrelated components keep their original order.
        let mut ready: std::collections::BinaryHeap<std::cmp::Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| std::cmp::Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(components.len());
        while let Some(std::cmp::Reverse(a)) = ready.pop() {
            order.push(components[a].id.clone());
            for &b in &dependents[a] {
                indegree[b] -= 1;
                if indegree[b] == 0 {
                    ready.push(std::cmp::Reverse(b));
                }
            }
        }

        if order.len() < components.len() {
            let stuck: Vec<&str> = components
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, c)| c.id.as_str())
                .collect();
            return Err(EngineError::CyclicPlan {
                reason: format!("components form a reference cycle: {}", stuck.join(", ")),
            });
        }

        Ok(order)
    }

    /// Assert that every referenced id exists and precedes its referrer in
    /// `order`.
    pub fn validate(&self, components: &[Component], order: &[String]) -> Result<()> {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        for component in components {
            let own_position =
                *position
                    .get(component.id.as_str())
                    .ok_or_else(|| EngineError::MalformedPlan {
                        reason: format!("component `{}` missing from execution order", component.id),
                    })?;

            for reference in self.extract_references(&component.params) {
                match position.get(reference.node_id.as_str()) {
                    None => {
                        return Err(EngineError::DanglingReference {
                            reference: render_reference(&reference),
                            node: component.id.clone(),
                        });
                    }
                    Some(&ref_position) if ref_position >= own_position => {
                        return Err(EngineError::CyclicPlan {
                            reason: format!(
                                "`{}` references `{}` which does not precede it",
                                component.id, reference.node_id
                            ),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }
}

impl Default for PlaceholderResolver {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Compact textual form used when a placeholder is interpolated into
/// surrounding text.
fn render_compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn render_reference(reference: &Reference) -> String {
    match &reference.key {
        Some(key) => format!("${}.output.{key}", reference.node_id),
        None => format!("${}.output", reference.node_id),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(node_id: &str, output_key: &str, value: Value) -> (String, NodeOutput) {
        (
            node_id.to_string(),
            NodeOutput {
                node_id: node_id.to_string(),
                output_key: output_key.to_string(),
                value,
                descriptor: OutputDescriptor::default(),
            },
        )
    }

    fn component(id: &str, params: Value) -> Component {
        Component {
            id: id.to_string(),
            tool_name: "t".to_string(),
            params,
            output: OutputDescriptor {
                kind: "object".to_string(),
                key: "out".to_string(),
                description: String::new(),
            },
        }
    }

    #[test]
    fn extract_finds_nested_references() {
        let resolver = PlaceholderResolver::new();
        let params = json!({
            "a": "$n1.output",
            "b": {"c": ["$n2.output.results", "plain"]},
        });

        let refs = resolver.extract_references(&params);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&Reference {
            node_id: "n1".to_string(),
            key: None
        }));
        assert!(refs.contains(&Reference {
            node_id: "n2".to_string(),
            key: Some("results".to_string())
        }));
    }

    #[test]
    fn whole_string_placeholder_keeps_native_type() {
        let resolver = PlaceholderResolver::new();
        let outputs: HashMap<_, _> = [output("a", "results", json!({"results": [1, 2, 3]}))].into();

        let resolved = resolver
            .resolve(&json!({"items": "$a.output.results"}), &outputs)
            .unwrap();
        assert_eq!(resolved.params["items"], json!([1, 2, 3]));
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn interpolated_placeholder_renders_text() {
        let resolver = PlaceholderResolver::new();
        let outputs: HashMap<_, _> = [
            output("a", "text", json!({"text": "world"})),
            output("b", "n", json!({"n": 42})),
        ]
        .into();

        let resolved = resolver
            .resolve(
                &json!({"msg": "hello $a.output.text, count=$b.output.n"}),
                &outputs,
            )
            .unwrap();
        assert_eq!(resolved.params["msg"], "hello world, count=42");
    }

    #[test]
    fn interpolated_mapping_renders_compact_json() {
        let resolver = PlaceholderResolver::new();
        let outputs: HashMap<_, _> = [output("a", "out", json!({"k": 1}))].into();

        let resolved = resolver
            .resolve(&json!({"msg": "payload: $a.output"}), &outputs)
            .unwrap();
        assert_eq!(resolved.params["msg"], "payload: {\"k\":1}");
    }

    #[test]
    fn null_output_substitutes_null() {
        let resolver = PlaceholderResolver::new();
        let outputs: HashMap<_, _> = [output("a", "out", Value::Null)].into();

        let whole = resolver.resolve(&json!({"v": "$a.output"}), &outputs).unwrap();
        assert_eq!(whole.params["v"], Value::Null);

        let mixed = resolver.resolve(&json!({"v": "x=$a.output"}), &outputs).unwrap();
        assert_eq!(mixed.params["v"], "x=null");
    }

    #[test]
    fn key_equal_to_output_key_yields_full_value() {
        let resolver = PlaceholderResolver::new();
        // The stored value is a sequence, so `.results` is not a field of it,
        // but it matches the producer's declared output key.
        let outputs: HashMap<_, _> = [output("a", "results", json!([1, 2]))].into();

        let resolved = resolver
            .resolve(&json!({"items": "$a.output.results"}), &outputs)
            .unwrap();
        assert_eq!(resolved.params["items"], json!([1, 2]));
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn missing_key_falls_back_with_warning() {
        let resolver = PlaceholderResolver::new();
        let outputs: HashMap<_, _> = [output("a", "results", json!({"other": 1}))].into();

        let resolved = resolver
            .resolve(&json!({"items": "$a.output.missing"}), &outputs)
            .unwrap();
        assert_eq!(resolved.params["items"], json!({"other": 1}));
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("adapter_fallback"));
    }

    #[test]
    fn missing_reference_is_fatal() {
        let resolver = PlaceholderResolver::new();
        let outputs = HashMap::new();

        let err = resolver
            .resolve(&json!({"v": "$ghost.output"}), &outputs)
            .unwrap_err();
        assert!(matches!(err, EngineError::DanglingReference { .. }));
    }

    #[test]
    fn placeholder_in_sequence_behaves_like_in_mapping() {
        let resolver = PlaceholderResolver::new();
        let outputs: HashMap<_, _> = [output("a", "text", json!({"text": "v"}))].into();

        let resolved = resolver
            .resolve(&json!({"list": ["$a.output.text", "plain"]}), &outputs)
            .unwrap();
        assert_eq!(resolved.params["list"], json!(["v", "plain"]));
    }

    #[test]
    fn utf8_text_around_placeholders_survives() {
        let resolver = PlaceholderResolver::new();
        let outputs: HashMap<_, _> = [output("a", "text", json!({"text": "北京"}))].into();

        let resolved = resolver
            .resolve(&json!({"msg": "查询：$a.output.text 的天气"}), &outputs)
            .unwrap();
        assert_eq!(resolved.params["msg"], "查询：北京 的天气");
    }

    #[test]
    fn order_respects_dependencies() {
        let resolver = PlaceholderResolver::new();
        let components = vec![
            component("b", json!({"items": "$a.output.results"})),
            component("a", json!({"query": "x"})),
        ];

        let order = resolver.build_execution_order(&components).unwrap();
        assert_eq!(order, vec!["a", "b"]);
        resolver.validate(&components, &order).unwrap();
    }

    #[test]
    fn order_preserves_plan_order_without_edges() {
        let resolver = PlaceholderResolver::new();
        let components = vec![
            component("c", json!({})),
            component("a", json!({})),
            component("b", json!({})),
        ];

        let order = resolver.build_execution_order(&components).unwrap();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn cycle_is_detected() {
        let resolver = PlaceholderResolver::new();
        let components = vec![
            component("a", json!({"v": "$b.output"})),
            component("b", json!({"v": "$a.output"})),
        ];

        let err = resolver.build_execution_order(&components).unwrap_err();
        assert!(matches!(err, EngineError::CyclicPlan { .. }));
    }

    #[test]
    fn validate_reports_dangling_reference() {
        let resolver = PlaceholderResolver::new();
        let components = vec![component("a", json!({"v": "$ghost.output"}))];

        let order = resolver.build_execution_order(&components).unwrap();
        let err = resolver.validate(&components, &order).unwrap_err();
        assert!(matches!(err, EngineError::DanglingReference { .. }));
    }

    #[test]
    fn duplicate_references_add_one_edge() {
        let resolver = PlaceholderResolver::new();
        let components = vec![
            component("a", json!({})),
            component(
                "b",
                json!({"x": "$a.output.text", "y": "$a.output.text"}),
            ),
        ];

        let order = resolver.build_execution_order(&components).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }
}
