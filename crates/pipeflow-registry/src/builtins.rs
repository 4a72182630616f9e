//! Built-in starter tools.
//!
//! A small set of deterministic tools compiled into the binary so the engine
//! works offline: search, report generation, translation, and text
//! extraction.  Their output shapes follow the conventions the adapter layer
//! and the summarizer understand (`results`, `report_content`,
//! `translated_text`, `text`).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::schema::{ParamSpec, ToolSchema};
use crate::tool::{Tool, ToolError, ToolResult, require_string, string_param};

/// All built-in tool handles.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(WebSearch::new()),
        Arc::new(ReportGenerator::new()),
        Arc::new(TextTranslator::new()),
        Arc::new(TextExtractor::new()),
    ]
}

// ---------------------------------------------------------------------------
// web_search
// ---------------------------------------------------------------------------

/// Deterministic offline search.
pub struct WebSearch {
    schema: ToolSchema,
}

impl WebSearch {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                ParamSpec::required("query", "string"),
                ParamSpec::optional("limit", "number", json!(5)),
            ]),
        }
    }
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for a query and return ranked results"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, params: &Map<String, Value>) -> ToolResult {
        let query = require_string(params, "query")?;
        if query.trim().is_empty() {
            return Err(ToolError::InvalidParams {
                reason: "search query must not be empty".to_string(),
            });
        }

        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(5)
            .clamp(1, 10) as usize;

        let results: Vec<Value> = (1..=limit.min(3))
            .map(|i| {
                json!({
                    "title": format!("{query} — result {i}"),
                    "link": format!("https://example.com/search/{i}"),
                    "snippet": format!("Offline summary {i} for {query}"),
                })
            })
            .collect();

        Ok(json!({
            "status": "success",
            "message": format!("search succeeded, found {} results", results.len()),
            "results": results,
            "source": "offline",
        }))
    }
}

// ---------------------------------------------------------------------------
// report_generator
// ---------------------------------------------------------------------------

/// Renders a sequence of items into a plain-text report.
pub struct ReportGenerator {
    schema: ToolSchema,
}

impl ReportGenerator {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                ParamSpec::required("items", "array"),
                ParamSpec::optional("title", "string", json!("Report")),
            ]),
        }
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReportGenerator {
    fn name(&self) -> &str {
        "report_generator"
    }

    fn description(&self) -> &str {
        "Render a sequence of items into a plain-text report"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, params: &Map<String, Value>) -> ToolResult {
        let items = params
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidParams {
                reason: "missing required array parameter `items`".to_string(),
            })?;

        let title = string_param(params, &["title"]).unwrap_or("Report");

        let mut lines = vec![format!("# {title}"), String::new()];
        for (i, item) in items.iter().enumerate() {
            let line = match item {
                Value::Object(map) => map
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| serde_json::to_string(item).unwrap_or_default()),
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            };
            lines.push(format!("{}. {line}", i + 1));
        }

        Ok(json!({
            "status": "success",
            "report_content": lines.join("\n"),
            "item_count": items.len(),
        }))
    }
}

// ---------------------------------------------------------------------------
// text_translator
// ---------------------------------------------------------------------------

/// Identity translation with a language tag; a stand-in for a real provider.
pub struct TextTranslator {
    schema: ToolSchema,
}

impl TextTranslator {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                ParamSpec::required("text", "string"),
                ParamSpec::optional("target_lang", "string", json!("en")),
            ]),
        }
    }
}

impl Default for TextTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextTranslator {
    fn name(&self) -> &str {
        "text_translator"
    }

    fn description(&self) -> &str {
        "Translate text toward a target language"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, params: &Map<String, Value>) -> ToolResult {
        let text = require_string(params, "text")?;
        let target = string_param(params, &["target_lang"]).unwrap_or("en");

        Ok(json!({
            "status": "success",
            "translated_text": text,
            "target_lang": target,
        }))
    }
}

// ---------------------------------------------------------------------------
// text_extractor
// ---------------------------------------------------------------------------

/// Extracts plain text from a source value.
pub struct TextExtractor {
    schema: ToolSchema,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![ParamSpec::required("source", "any")]),
        }
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextExtractor {
    fn name(&self) -> &str {
        "text_extractor"
    }

    fn description(&self) -> &str {
        "Extract plain text from a source value"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn invoke(&self, params: &Map<String, Value>) -> ToolResult {
        let source = params.get("source").ok_or_else(|| ToolError::InvalidParams {
            reason: "missing required parameter `source`".to_string(),
        })?;

        let text = match source {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        };

        Ok(json!({"status": "success", "text": text}))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
