//! End-to-end engine tests: chat short-circuit, linear plans, adaptation,
//! synthesis-on-miss with catalog persistence, cycle detection, and the
//! structured weather summary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use pipeflow_catalog::{Database, ToolCatalog};
use pipeflow_engine::{
    CancelFlag, Component, Engine, EngineConfig, EventSink, EventStreamer, ExecutionEvent,
    OutputDescriptor, Phase, Plan, StreamMode,
};
use pipeflow_registry::{
    ParamSpec, Provenance, Synthesizer, Tool, ToolRegistry, ToolResult, ToolSchema, builtin_tools,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A tool returning a fixed value under a fixed name and schema.
struct FixedTool {
    name: &'static str,
    schema: ToolSchema,
    value: Value,
}

#[async_trait]
impl Tool for FixedTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "test fixture"
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn invoke(&self, _params: &Map<String, Value>) -> ToolResult {
        Ok(self.value.clone())
    }
}

/// A tool that echoes the parameters it received.
struct EchoTool {
    name: &'static str,
    schema: ToolSchema,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "echoes received parameters"
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    async fn invoke(&self, params: &Map<String, Value>) -> ToolResult {
        Ok(json!({"received": Value::Object(params.clone())}))
    }
}

fn engine_without_catalog() -> Engine {
    let registry = Arc::new(ToolRegistry::new());
    for tool in builtin_tools() {
        registry.register(tool, Provenance::BuiltIn);
    }
    Engine::new(registry, Synthesizer::template(), EngineConfig::default())
}

async fn engine_with_catalog() -> Engine {
    let db = Database::open_in_memory().unwrap();
    let catalog = ToolCatalog::new(db).await.unwrap();
    let registry = Arc::new(ToolRegistry::new().with_catalog(catalog));
    for tool in builtin_tools() {
        registry.register(tool, Provenance::BuiltIn);
    }
    Engine::new(registry, Synthesizer::template(), EngineConfig::default())
}

fn component(id: &str, tool_name: &str, params: Value, output_key: &str) -> Component {
    Component {
        id: id.to_string(),
        tool_name: tool_name.to_string(),
        params,
        output: OutputDescriptor {
            kind: "object".to_string(),
            key: output_key.to_string(),
            description: String::new(),
        },
    }
}

async fn collect_events(
    engine: &Engine,
    plan: &Plan,
) -> (pipeflow_engine::RunResult, Vec<ExecutionEvent>) {
    let (sink, mut rx) = EventSink::channel();
    let result = engine.execute_plan(plan, &sink, &CancelFlag::new()).await;
    drop(sink);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, events)
}

// ---------------------------------------------------------------------------
// Chat-only path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_only_path() {
    let engine = engine_without_catalog();

    let (sink, mut rx) = EventSink::channel();
    let result = engine
        .run_utterance("hello", None, &sink, &CancelFlag::new())
        .await;
    drop(sink);

    assert!(result.success);
    assert!(result.node_results.is_empty());
    assert!(!result.final_output.as_str().unwrap().is_empty());

    let event = rx.recv().await.unwrap();
    let line = EventStreamer::frame(&event);
    assert_eq!(line.mode, StreamMode::Chat);
    assert_eq!(line.step, "chat_completed");
    assert!(!line.message.is_empty());
    assert!(rx.recv().await.is_none());
}

// ---------------------------------------------------------------------------
// Two-node linear plan
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_node_linear_plan() {
    let engine = engine_without_catalog();
    engine.registry().register(
        Arc::new(FixedTool {
            name: "search",
            schema: ToolSchema::new(vec![ParamSpec::required("query", "string")]),
            value: json!({"results": [{"title": "t1"}, {"title": "t2"}]}),
        }),
        Provenance::UserSupplied,
    );
    engine.registry().register(
        Arc::new(EchoTool {
            name: "report",
            schema: ToolSchema::new(vec![ParamSpec::required("items", "array")]),
        }),
        Provenance::UserSupplied,
    );

    let plan = Plan::task(
        "p",
        vec![
            component("a", "search", json!({"query": "X"}), "results"),
            component("b", "report", json!({"items": "$a.output.results"}), "report_content"),
        ],
    );

    let (result, events) = collect_events(&engine, &plan).await;
    assert!(result.success, "errors: {:?}", result.errors);

    // Execution order [a, b].
    let node_ids: Vec<String> = result.node_results.iter().map(|r| r.node_id.clone()).collect();
    assert_eq!(node_ids, vec!["a", "b"]);

    // b received the sequence at native type.
    assert_eq!(
        result.node_results[1].input_params["items"],
        json!([{"title": "t1"}, {"title": "t2"}])
    );

    // Final output follows the extraction precedence over b's return value.
    assert_eq!(
        result.final_output,
        json!({"received": {"items": [{"title": "t1"}, {"title": "t2"}]}})
    );

    // Success events appear in execution order.
    let success_nodes: Vec<&str> = events
        .iter()
        .filter(|e| e.phase == Phase::NodeSuccess)
        .map(|e| e.node_id.as_deref().unwrap())
        .collect();
    assert_eq!(success_nodes, vec!["a", "b"]);
}

// ---------------------------------------------------------------------------
// Scalar adaptation: mapping output into a string parameter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn adapter_picks_formatted_text() {
    let engine = engine_without_catalog();
    engine.registry().register(
        Arc::new(FixedTool {
            name: "emit_formatted",
            schema: ToolSchema::default(),
            value: json!({"formatted_text": "abc"}),
        }),
        Provenance::UserSupplied,
    );
    engine.registry().register(
        Arc::new(EchoTool {
            name: "consume_text",
            schema: ToolSchema::new(vec![ParamSpec::required("text", "string")]),
        }),
        Provenance::UserSupplied,
    );

    let plan = Plan::task(
        "p",
        vec![
            component("a", "emit_formatted", json!({}), "formatted_text"),
            component("b", "consume_text", json!({"text": "$a.output"}), "received"),
        ],
    );

    let (result, events) = collect_events(&engine, &plan).await;
    assert!(result.success, "errors: {:?}", result.errors);

    // The adapter unwrapped the mapping into the expected scalar.
    assert_eq!(result.node_results[1].input_params["text"], "abc");

    // No adapter_fallback warning on b's success event.
    let b_success = events
        .iter()
        .find(|e| e.phase == Phase::NodeSuccess && e.node_id.as_deref() == Some("b"))
        .unwrap();
    let warnings = b_success.data.as_ref().unwrap()["warnings"].as_array().unwrap();
    assert!(warnings.iter().all(|w| !w.as_str().unwrap().contains("adapter_fallback")));
}

// ---------------------------------------------------------------------------
// Synthesis on miss, persisted across runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn synthesis_on_miss_then_cache_hit() {
    let engine = engine_with_catalog().await;
    let plan = Plan::task(
        "p",
        vec![component(
            "a",
            "customTranslator",
            json!({"text": "hello"}),
            "translated_text",
        )],
    );

    let (first, first_events) = collect_events(&engine, &plan).await;
    assert!(first.success, "errors: {:?}", first.errors);

    let synth_events = |events: &[ExecutionEvent]| {
        events
            .iter()
            .filter(|e| e.step.as_deref() == Some("tool_synthesis"))
            .count()
    };
    let save_events = |events: &[ExecutionEvent]| {
        events
            .iter()
            .filter(|e| e.step.as_deref() == Some("catalog_saved"))
            .count()
    };

    assert_eq!(synth_events(&first_events), 1);
    assert_eq!(save_events(&first_events), 1);
    assert!(engine.registry().resolve("customTranslator").await.is_some());

    // Second run: the registry already holds the handle, so no synthesis.
    let (second, second_events) = collect_events(&engine, &plan).await;
    assert!(second.success);
    assert_eq!(synth_events(&second_events), 0);
}

#[tokio::test]
async fn synthesized_parameters_match_observation() {
    let engine = engine_with_catalog().await;
    let plan = Plan::task(
        "p",
        vec![component(
            "a",
            "customTranslator",
            json!({"text": "hi", "target_lang": "fr"}),
            "translated_text",
        )],
    );

    let (result, _) = collect_events(&engine, &plan).await;
    assert!(result.success);

    // The synthesized callable's parameter list is exactly the observed
    // one (JSON object fields iterate in sorted order).
    let schema = engine.registry().schema_of("customTranslator").unwrap();
    let mut names = schema.names();
    names.sort();
    assert_eq!(names, vec!["target_lang", "text"]);
    assert!(schema.get("text").unwrap().required);
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cycle_detected_before_any_node() {
    let engine = engine_without_catalog();
    let plan = Plan::task(
        "p",
        vec![
            component("a", "web_search", json!({"query": "$b.output"}), "results"),
            component("b", "web_search", json!({"query": "$a.output"}), "results"),
        ],
    );

    let (result, events) = collect_events(&engine, &plan).await;
    assert!(!result.success);
    assert!(result.node_results.is_empty());

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].phase, Phase::SystemError);
    assert_eq!(events[0].data.as_ref().unwrap()["kind"], "CyclicPlan");
}

// ---------------------------------------------------------------------------
// Empty plan
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_plan_fails_cleanly() {
    let engine = engine_without_catalog();
    let plan = Plan::task("p", vec![]);

    let (result, events) = collect_events(&engine, &plan).await;
    assert!(!result.success);
    assert!(result.errors[0].contains("EmptyPlan"));

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].phase, Phase::PipelineEnd);
    assert_eq!(events[0].data.as_ref().unwrap()["error"], "EmptyPlan");
}

// ---------------------------------------------------------------------------
// Weather summary extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn weather_summary_extraction() {
    let engine = engine_without_catalog();
    engine.registry().register(
        Arc::new(FixedTool {
            name: "weather_search",
            schema: ToolSchema::new(vec![ParamSpec::required("query", "string")]),
            value: json!({
                "data": {"primary": [
                    {"title": "Beijing 18~25°C sunny, north wind 3 level, air quality good"}
                ]},
                "metadata": {"parameters": {"query": "Beijing weather"}},
            }),
        }),
        Provenance::UserSupplied,
    );

    let plan = Plan::task(
        "p",
        vec![component(
            "a",
            "weather_search",
            json!({"query": "Beijing weather"}),
            "results",
        )],
    );

    let (result, _) = collect_events(&engine, &plan).await;
    assert!(result.success);

    let lines: Vec<&str> = result.final_output.as_str().unwrap().lines().collect();
    assert_eq!(
        lines,
        vec![
            "📍 Beijing",
            "🌡️ 18°C~25°C",
            "☁️ sunny",
            "💨 north wind 3 level",
            "🌬️ air quality good",
        ]
    );
}

// ---------------------------------------------------------------------------
// Deterministic replay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_plan_replays_identically() {
    let engine = engine_without_catalog();
    let plan = Plan::task(
        "p",
        vec![
            component("a", "web_search", json!({"query": "rust"}), "results"),
            component(
                "b",
                "report_generator",
                json!({"items": "$a.output.results"}),
                "report_content",
            ),
        ],
    );

    let fingerprint = |events: &[ExecutionEvent]| -> Vec<(Phase, Option<String>, String)> {
        events
            .iter()
            .map(|e| (e.phase, e.node_id.clone(), e.message.clone()))
            .collect()
    };

    let (first, first_events) = collect_events(&engine, &plan).await;
    let (second, second_events) = collect_events(&engine, &plan).await;

    assert!(first.success && second.success);
    assert_eq!(first.final_output, second.final_output);
    assert_eq!(fingerprint(&first_events), fingerprint(&second_events));
}

// ---------------------------------------------------------------------------
// Missing key falls back with a warning on the success event
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_key_reference_warns_and_falls_back() {
    let engine = engine_without_catalog();
    engine.registry().register(
        Arc::new(FixedTool {
            name: "emit_mapping",
            schema: ToolSchema::default(),
            value: json!({"other_field": 7}),
        }),
        Provenance::UserSupplied,
    );
    engine.registry().register(
        Arc::new(EchoTool {
            name: "consume_any",
            schema: ToolSchema::new(vec![ParamSpec::required("value", "any")]),
        }),
        Provenance::UserSupplied,
    );

    let plan = Plan::task(
        "p",
        vec![
            component("a", "emit_mapping", json!({}), "payload"),
            component("b", "consume_any", json!({"value": "$a.output.missing"}), "received"),
        ],
    );

    let (result, events) = collect_events(&engine, &plan).await;
    assert!(result.success, "errors: {:?}", result.errors);

    // The full mapping was substituted in place of the missing key.
    assert_eq!(result.node_results[1].input_params["value"], json!({"other_field": 7}));

    let b_success = events
        .iter()
        .find(|e| e.phase == Phase::NodeSuccess && e.node_id.as_deref() == Some("b"))
        .unwrap();
    let warnings = b_success.data.as_ref().unwrap()["warnings"].as_array().unwrap();
    assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("adapter_fallback")));
}
