//! Plan executor.
//!
//! Walks a plan in topological order, one node at a time: resolve
//! placeholders, adapt mismatched upstream outputs, resolve the tool (with a
//! single synthesis retry on a miss), invoke it, store the output, and
//! narrate every step through the event sink.  The first node error stops
//! the plan.
//!
//! Handles are captured at resolution time: re-registering a name mid-plan
//! never affects nodes that already resolved it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use pipeflow_registry::{Synthesizer, ToolRegistry, ToolSchema};

use crate::adapter::{self, TargetShape};
use crate::chat::{ChatResponder, PresetResponder};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ExecutionEvent};
use crate::parser::{KeywordPlanParser, ParserHints, PlanParser};
use crate::plan::{Component, ExecutionSummary, LogEntry, NodeResult, NodeStatus, Plan, RunResult};
use crate::resolver::{NodeOutput, PlaceholderResolver};
use crate::summary::{extract_final_output, result_summary};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal, checked between nodes.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next check point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The orchestration engine.
///
/// Owns the resolver and the synthesizer, and borrows the shared registry.
/// Everything is injected at construction; there is no process-wide state.
pub struct Engine {
    registry: Arc<ToolRegistry>,
    synthesizer: Synthesizer,
    resolver: PlaceholderResolver,
    parser: Arc<dyn PlanParser>,
    responder: Arc<dyn ChatResponder>,
    preset: PresetResponder,
    config: EngineConfig,
}

/// A successfully executed node, before bookkeeping.
struct NodeRun {
    params: Value,
    output: Value,
    provenance: String,
    warnings: Vec<String>,
}

impl Engine {
    /// Create an engine with the bundled keyword parser and preset responder.
    pub fn new(registry: Arc<ToolRegistry>, synthesizer: Synthesizer, config: EngineConfig) -> Self {
        Self {
            registry,
            synthesizer,
            resolver: PlaceholderResolver::new(),
            parser: Arc::new(KeywordPlanParser),
            responder: Arc::new(PresetResponder::new()),
            preset: PresetResponder::new(),
            config,
        }
    }

    /// Replace the parser collaborator.
    pub fn with_parser(mut self, parser: Arc<dyn PlanParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replace the conversational responder collaborator.
    pub fn with_responder(mut self, responder: Arc<dyn ChatResponder>) -> Self {
        self.responder = responder;
        self
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    // -- Public entry points -------------------------------------------------

    /// Run an utterance, returning the event stream and a cancellation
    /// handle.  Execution proceeds in a background task; the stream ends
    /// when the run does.
    pub fn run_task(
        self: &Arc<Self>,
        user_text: impl Into<String>,
        user_data: Option<Value>,
    ) -> (mpsc::UnboundedReceiver<ExecutionEvent>, CancelFlag) {
        let (sink, rx) = EventSink::channel();
        let cancel = CancelFlag::new();

        let engine = Arc::clone(self);
        let user_text = user_text.into();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = engine
                .run_utterance(&user_text, user_data, &sink, &task_cancel)
                .await;
        });

        (rx, cancel)
    }

    /// Run an utterance to completion and return the aggregate result.
    pub async fn run_task_sync(&self, user_text: &str, user_data: Option<Value>) -> RunResult {
        let sink = EventSink::disabled();
        let cancel = CancelFlag::new();
        self.run_utterance(user_text, user_data, &sink, &cancel).await
    }

    /// Parse an utterance and execute the resulting plan.
    pub async fn run_utterance(
        &self,
        user_text: &str,
        user_data: Option<Value>,
        sink: &EventSink,
        cancel: &CancelFlag,
    ) -> RunResult {
        let started = Instant::now();

        let hints = ParserHints {
            tool_names: self.registry.names(),
            context: user_data.unwrap_or(Value::Null),
        };

        let plan = match self.parser.parse(user_text, &hints).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(error = %e, "parser failed");
                sink.emit(ExecutionEvent::system_error(
                    e.kind(),
                    format!("## ❌ System error\n\n{e}"),
                ));
                return RunResult::failure(e.to_string(), started.elapsed().as_secs_f64());
            }
        };

        self.execute(&plan, sink, cancel, started).await
    }

    /// Execute a pre-parsed plan.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        sink: &EventSink,
        cancel: &CancelFlag,
    ) -> RunResult {
        self.execute(plan, sink, cancel, Instant::now()).await
    }

    // -- Execution -----------------------------------------------------------

    async fn execute(
        &self,
        plan: &Plan,
        sink: &EventSink,
        cancel: &CancelFlag,
        started: Instant,
    ) -> RunResult {
        if plan.chat_only {
            return self.chat_reply(plan, sink, started).await;
        }

        if plan.components.is_empty() {
            let message = "EmptyPlan: the plan has no components";
            sink.emit(
                ExecutionEvent::pipeline_end(false, format!("## ❌ Execution failed\n\n{message}"))
                    .with_data(json!({"error": "EmptyPlan"})),
            );
            return RunResult::failure(message, started.elapsed().as_secs_f64());
        }

        // Plan-level validation happens before any node runs; failures emit
        // a single system_error event.
        let order = match self.prepare(plan) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(plan_id = %plan.id, error = %e, "plan rejected");
                sink.emit(ExecutionEvent::system_error(
                    e.kind(),
                    format!("## ❌ System error\n\n{e}"),
                ));
                return RunResult::failure(e.to_string(), started.elapsed().as_secs_f64());
            }
        };

        tracing::info!(plan_id = %plan.id, order = ?order, "execution order resolved");
        sink.emit(ExecutionEvent::pipeline_start(order.len()));

        let by_id: HashMap<&str, &Component> =
            plan.components.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut outputs: HashMap<String, NodeOutput> = HashMap::new();
        let mut node_results: Vec<NodeResult> = Vec::new();
        let mut detailed_logs: Vec<LogEntry> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut synth_count: u32 = 0;

        for node_id in &order {
            if cancel.is_cancelled() {
                tracing::warn!(plan_id = %plan.id, "execution cancelled");
                sink.emit(
                    ExecutionEvent::pipeline_end(false, "## ❌ Execution cancelled")
                        .with_data(json!({"reason": "cancelled"})),
                );
                // Partial node-output state is discarded with the run.
                outputs.clear();
                return RunResult::failure(
                    EngineError::Cancelled.to_string(),
                    started.elapsed().as_secs_f64(),
                );
            }

            let component = by_id[node_id.as_str()];
            let node_started = Instant::now();

            tracing::info!(node_id = %node_id, tool = %component.tool_name, "node start");
            sink.emit(ExecutionEvent::node_start(node_id, &component.tool_name));
            detailed_logs.push(log_entry(
                node_id,
                &component.tool_name,
                "start",
                format!("node `{node_id}` started"),
            ));

            match self
                .run_node(component, &outputs, &mut synth_count, sink, &mut detailed_logs)
                .await
            {
                Ok(run) => {
                    let elapsed = node_started.elapsed().as_secs_f64();
                    let summary = result_summary(&run.output);

                    outputs.insert(
                        node_id.clone(),
                        NodeOutput {
                            node_id: node_id.clone(),
                            output_key: component.output.key.clone(),
                            value: run.output.clone(),
                            descriptor: component.output.clone(),
                        },
                    );

                    tracing::info!(
                        node_id = %node_id,
                        provenance = %run.provenance,
                        elapsed_secs = elapsed,
                        summary = %summary,
                        "node succeeded"
                    );

                    sink.emit(
                        ExecutionEvent::node_success(node_id, &component.tool_name, &summary)
                            .with_data(json!({
                                "result_summary": summary,
                                "tool_provenance": run.provenance,
                                "warnings": run.warnings,
                            })),
                    );
                    detailed_logs.push(log_entry(
                        node_id,
                        &component.tool_name,
                        "success",
                        format!("node `{node_id}` succeeded ({summary})"),
                    ));

                    node_results.push(NodeResult {
                        node_id: node_id.clone(),
                        tool_name: component.tool_name.clone(),
                        input_params: run.params,
                        output: run.output,
                        status: NodeStatus::Success,
                        tool_provenance: run.provenance,
                        execution_time: elapsed,
                        result_summary: summary,
                        error: None,
                        warnings: run.warnings,
                    });
                }
                Err(reason) => {
                    let elapsed = node_started.elapsed().as_secs_f64();
                    tracing::error!(node_id = %node_id, error = %reason, "node failed");

                    sink.emit(ExecutionEvent::node_error(
                        node_id,
                        &component.tool_name,
                        &reason,
                    ));
                    detailed_logs.push(log_entry(
                        node_id,
                        &component.tool_name,
                        "error",
                        reason.clone(),
                    ));

                    node_results.push(NodeResult {
                        node_id: node_id.clone(),
                        tool_name: component.tool_name.clone(),
                        input_params: Value::Null,
                        output: Value::Null,
                        status: NodeStatus::Failed,
                        tool_provenance: self.provenance_label(&component.tool_name),
                        execution_time: elapsed,
                        result_summary: String::new(),
                        error: Some(reason.clone()),
                        warnings: Vec::new(),
                    });
                    errors.push(format!("node `{node_id}` failed: {reason}"));

                    // No further nodes are scheduled after an error.
                    break;
                }
            }
        }

        let success = errors.is_empty();
        let final_output = if success {
            order
                .last()
                .and_then(|id| outputs.get(id))
                .map(extract_final_output)
                .unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        let end_message = if success {
            format!(
                "## ✅ Task complete\n\n{}",
                render_final(&final_output)
            )
        } else {
            format!("## ❌ Execution failed\n\n{}", errors.join("; "))
        };
        sink.emit(ExecutionEvent::pipeline_end(success, end_message).with_data(json!({
            "total_nodes": order.len(),
            "successful_nodes": node_results
                .iter()
                .filter(|r| r.status == NodeStatus::Success)
                .count(),
        })));

        let execution_time = started.elapsed().as_secs_f64();
        let successful = node_results
            .iter()
            .filter(|r| r.status == NodeStatus::Success)
            .count();
        let failed = node_results.len() - successful;
        let average = if node_results.is_empty() {
            0.0
        } else {
            execution_time / node_results.len() as f64
        };

        RunResult {
            success,
            node_results,
            final_output,
            execution_time,
            errors,
            detailed_logs,
            execution_summary: ExecutionSummary {
                total_nodes: order.len(),
                successful_nodes: successful,
                failed_nodes: failed,
                total_execution_time: execution_time,
                average_node_time: average,
            },
        }
    }

    /// Validate the plan and derive the execution order.
    fn prepare(&self, plan: &Plan) -> Result<Vec<String>> {
        plan.validate()?;
        let order = self.resolver.build_execution_order(&plan.components)?;
        self.resolver.validate(&plan.components, &order)?;
        Ok(order)
    }

    /// Execute one node; any returned error is node-fatal.
    async fn run_node(
        &self,
        component: &Component,
        outputs: &HashMap<String, NodeOutput>,
        synth_count: &mut u32,
        sink: &EventSink,
        detailed_logs: &mut Vec<LogEntry>,
    ) -> std::result::Result<NodeRun, String> {
        // 1. Resolve placeholders.
        let resolved = self
            .resolver
            .resolve(&component.params, outputs)
            .map_err(|e| e.to_string())?;
        let mut params = resolved.params;
        let mut warnings = resolved.warnings;

        // 2. Adapt upstream outputs to the declared parameter shapes.
        self.adapt_params(component, outputs, &mut params, &mut warnings);

        // 3. Resolve the tool; a miss triggers one synthesis attempt.
        let tool = match self.registry.resolve(&component.tool_name).await {
            Some(tool) => tool,
            None => {
                self.synthesize_tool(component, &params, synth_count, sink, detailed_logs, &mut warnings)
                    .await?;
                // Second miss in a row is fatal.
                self.registry
                    .resolve(&component.tool_name)
                    .await
                    .ok_or_else(|| {
                        format!(
                            "unknown tool `{}`: synthesis did not produce a loadable handle",
                            component.tool_name
                        )
                    })?
            }
        };

        // 4. Invoke, with the configured per-node timeout.
        let params_obj: Map<String, Value> = params.as_object().cloned().unwrap_or_default();
        let output = match self.config.node_timeout {
            Some(timeout) => tokio::time::timeout(timeout, tool.invoke(&params_obj))
                .await
                .map_err(|_| format!("node timed out after {timeout:?}"))?,
            None => tool.invoke(&params_obj).await,
        }
        .map_err(|e| e.to_string())?;

        Ok(NodeRun {
            params: Value::Object(params_obj),
            output,
            provenance: self.provenance_label(&component.tool_name),
            warnings,
        })
    }

    /// Apply the adapter layer to every parameter that references an
    /// upstream node.
    fn adapt_params(
        &self,
        component: &Component,
        outputs: &HashMap<String, NodeOutput>,
        params: &mut Value,
        warnings: &mut Vec<String>,
    ) {
        let Some(schema) = self.registry.schema_of(&component.tool_name) else {
            // Tool not yet known (about to be synthesized): no declared
            // expectations to adapt toward.
            return;
        };
        let Some(raw) = component.params.as_object() else {
            return;
        };
        let Some(resolved) = params.as_object_mut() else {
            return;
        };

        for (key, raw_value) in raw {
            let references = self.resolver.extract_references(raw_value);
            let Some(reference) = references.first() else {
                continue;
            };
            if !outputs.contains_key(&reference.node_id) {
                continue;
            }
            let Some(spec) = schema.get(key) else {
                continue;
            };
            let Some(current) = resolved.get(key) else {
                continue;
            };

            let target = TargetShape::from_param(spec, &schema);
            let analysis = adapter::analyze(current, &target);
            if analysis.compatible {
                continue;
            }

            if let Some(adapter_spec) =
                adapter::build_adapter(&reference.node_id, &component.tool_name, current, &target)
            {
                tracing::debug!(
                    node = %component.id,
                    param = %key,
                    source = %reference.node_id,
                    fallback = adapter_spec.fallback,
                    "adapter applied"
                );
                let adapted = adapter::apply(&adapter_spec, current);
                if adapter_spec.fallback {
                    warnings.push(format!(
                        "adapter_fallback: parameter `{key}` passed through unadapted"
                    ));
                }
                resolved.insert(key.clone(), adapted);
            }
        }
    }

    /// Synthesize, install, and persist a missing tool.
    async fn synthesize_tool(
        &self,
        component: &Component,
        params: &Value,
        synth_count: &mut u32,
        sink: &EventSink,
        detailed_logs: &mut Vec<LogEntry>,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<(), String> {
        let name = &component.tool_name;

        if *synth_count >= self.config.max_synth_depth {
            return Err(format!(
                "unknown tool `{name}`: synthesis depth {} exhausted",
                self.config.max_synth_depth
            ));
        }
        *synth_count += 1;

        sink.emit(
            ExecutionEvent::node_start(&component.id, name)
                .with_step("tool_synthesis")
                .with_data(json!({"tool_name": name})),
        );
        detailed_logs.push(log_entry(
            &component.id,
            name,
            "synthesis",
            format!("synthesizing tool `{name}`"),
        ));

        let observed = params
            .as_object()
            .map(ToolSchema::infer_from_params)
            .unwrap_or_default();
        // A prior schema means we are extending, not creating.
        let existing = self.registry.schema_of(name);

        let source = self
            .synthesizer
            .generate(name, &observed, existing.as_ref())
            .await
            .map_err(|e| format!("synthesis failed for `{name}`: {e}"))?;

        let (_handle, save_warning) = self
            .registry
            .install_synthesized(name, &source)
            .await
            .map_err(|e| format!("failed to load synthesized tool `{name}`: {e}"))?;

        match save_warning {
            None => {
                sink.emit(
                    ExecutionEvent::node_start(&component.id, name)
                        .with_step("catalog_saved")
                        .with_data(json!({"tool_name": name})),
                );
                detailed_logs.push(log_entry(
                    &component.id,
                    name,
                    "catalog_saved",
                    format!("tool `{name}` saved to catalog"),
                ));
            }
            Some(reason) => warnings.push(format!("catalog_save_failed: {reason}")),
        }

        Ok(())
    }

    // -- Chat path -----------------------------------------------------------

    async fn chat_reply(&self, plan: &Plan, sink: &EventSink, started: Instant) -> RunResult {
        let user_text = plan.user_text.clone().unwrap_or_default();

        let reply = match self.responder.reply(&user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "responder failed, using preset replies");
                self.preset.preset(&user_text)
            }
        };

        sink.emit(ExecutionEvent::chat_reply(reply.clone()));

        let execution_time = started.elapsed().as_secs_f64();
        RunResult {
            success: true,
            node_results: Vec::new(),
            final_output: Value::String(reply),
            execution_time,
            errors: Vec::new(),
            detailed_logs: Vec::new(),
            execution_summary: ExecutionSummary {
                total_execution_time: execution_time,
                ..ExecutionSummary::default()
            },
        }
    }

    fn provenance_label(&self, tool_name: &str) -> String {
        self.registry
            .provenance_of(tool_name)
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn log_entry(node_id: &str, tool_name: &str, action: &str, message: String) -> LogEntry {
    LogEntry {
        timestamp: Utc::now().timestamp_millis(),
        node_id: node_id.to_string(),
        tool_name: tool_name.to_string(),
        action: action.to_string(),
        message,
    }
}

fn render_final(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeflow_registry::{Provenance, Tool, ToolError, ToolResult, builtin_tools};
    use crate::plan::OutputDescriptor;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "always_fails"
        }
        fn description(&self) -> &str {
            "Fails on every invocation"
        }
        fn schema(&self) -> &ToolSchema {
            static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
            SCHEMA.get_or_init(ToolSchema::default)
        }
        async fn invoke(&self, _params: &Map<String, Value>) -> ToolResult {
            Err(ToolError::Failed {
                reason: "simulated failure".to_string(),
            })
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow_tool"
        }
        fn description(&self) -> &str {
            "Sleeps longer than any sane timeout"
        }
        fn schema(&self) -> &ToolSchema {
            static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
            SCHEMA.get_or_init(ToolSchema::default)
        }
        async fn invoke(&self, _params: &Map<String, Value>) -> ToolResult {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    fn engine() -> Engine {
        let registry = Arc::new(ToolRegistry::new());
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

    #[tokio::test]
    async fn linear_plan_feeds_outputs_forward() {
        let engine = engine();
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

        let result = engine
            .execute_plan(&plan, &EventSink::disabled(), &CancelFlag::new())
            .await;

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.node_results.len(), 2);
        // The report tool received the search hits as a native sequence.
        assert!(result.node_results[1].input_params["items"].is_array());
        assert_eq!(result.execution_summary.successful_nodes, 2);
        let report = result.final_output.as_str().unwrap();
        assert!(report.contains("rust — result 1"));
    }

    #[tokio::test]
    async fn failing_node_stops_the_plan() {
        let engine = engine();
        engine
            .registry()
            .register(Arc::new(FailingTool), Provenance::UserSupplied);

        let plan = Plan::task(
            "p",
            vec![
                component("a", "always_fails", json!({}), "out"),
                component("b", "web_search", json!({"query": "$a.output"}), "results"),
            ],
        );

        let (sink, mut rx) = EventSink::channel();
        let result = engine.execute_plan(&plan, &sink, &CancelFlag::new()).await;
        drop(sink);

        assert!(!result.success);
        assert_eq!(result.node_results.len(), 1);
        assert_eq!(result.execution_summary.failed_nodes, 1);

        // pipeline_start, node_start(a), node_error(a), pipeline_end — no b.
        let mut phases = Vec::new();
        while let Some(event) = rx.recv().await {
            phases.push(event.phase);
        }
        assert_eq!(
            phases,
            vec![
                crate::events::Phase::PipelineStart,
                crate::events::Phase::NodeStart,
                crate::events::Phase::NodeError,
                crate::events::Phase::PipelineEnd,
            ]
        );
    }

    #[tokio::test]
    async fn missing_tool_is_synthesized_once() {
        let engine = engine();
        let plan = Plan::task(
            "p",
            vec![component(
                "a",
                "customTranslator",
                json!({"text": "hello"}),
                "translated_text",
            )],
        );

        let result = engine
            .execute_plan(&plan, &EventSink::disabled(), &CancelFlag::new())
            .await;
        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.node_results[0].tool_provenance, "synthesized");

        // The registry now resolves the name directly.
        assert!(engine.registry().resolve("customTranslator").await.is_some());
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_node() {
        let engine = engine();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let plan = Plan::task(
            "p",
            vec![component("a", "web_search", json!({"query": "x"}), "results")],
        );

        let result = engine.execute_plan(&plan, &EventSink::disabled(), &cancel).await;
        assert!(!result.success);
        assert!(result.node_results.is_empty());
        assert!(result.errors[0].contains("cancelled"));
    }

    #[tokio::test]
    async fn node_timeout_marks_node_errored() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(SlowTool), Provenance::UserSupplied);
        let config = EngineConfig {
            node_timeout: Some(std::time::Duration::from_millis(50)),
            ..EngineConfig::default()
        };
        let engine = Engine::new(registry, Synthesizer::template(), config);

        let plan = Plan::task("p", vec![component("a", "slow_tool", json!({}), "out")]);
        let result = engine
            .execute_plan(&plan, &EventSink::disabled(), &CancelFlag::new())
            .await;

        assert!(!result.success);
        assert!(result.errors[0].contains("timed out"));
    }

    #[tokio::test]
    async fn chat_only_plan_short_circuits() {
        let engine = engine();
        let plan = Plan::chat("p", "hello");

        let (sink, mut rx) = EventSink::channel();
        let result = engine.execute_plan(&plan, &sink, &CancelFlag::new()).await;
        drop(sink);

        assert!(result.success);
        assert!(result.node_results.is_empty());
        assert!(!result.final_output.as_str().unwrap().is_empty());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.phase, crate::events::Phase::ChatReply);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn run_task_streams_in_background() {
        let engine = Arc::new(engine());
        let (mut rx, _cancel) = engine.run_task("search for rust", None);

        let mut phases = Vec::new();
        while let Some(event) = rx.recv().await {
            phases.push(event.phase);
        }
        assert_eq!(phases.first(), Some(&crate::events::Phase::PipelineStart));
        assert_eq!(phases.last(), Some(&crate::events::Phase::PipelineEnd));
    }
}
