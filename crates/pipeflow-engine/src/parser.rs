//! Plan parser collaborator.
//!
//! The parser turns a free-form utterance into a [`Plan`].  The real parser
//! is an external collaborator (typically LLM-backed); it receives the
//! current tool names as a hint but may reference tools that do not exist
//! yet — synthesis covers the gaps.  A keyword-based fallback is bundled so
//! the engine works offline and in tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::plan::{Component, OutputDescriptor, Plan};

/// Hints handed to the parser alongside the utterance.
#[derive(Debug, Clone, Default)]
pub struct ParserHints {
    /// Names currently registered; a hint, not a restriction.
    pub tool_names: Vec<String>,
    /// Opaque caller context (locale, user data).
    pub context: Value,
}

/// Turns user text into a plan.
#[async_trait]
pub trait PlanParser: Send + Sync {
    async fn parse(&self, user_text: &str, hints: &ParserHints) -> Result<Plan>;
}

// ---------------------------------------------------------------------------
// Keyword fallback parser
// ---------------------------------------------------------------------------

/// Verbs that mark a search-style task request.
const SEARCH_MARKERS: [&str; 5] = ["search", "find", "look up", "查", "搜索"];

/// Offline fallback: a search marker yields a single-step search plan,
/// anything else is conversational.
pub struct KeywordPlanParser;

#[async_trait]
impl PlanParser for KeywordPlanParser {
    async fn parse(&self, user_text: &str, _hints: &ParserHints) -> Result<Plan> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(EngineError::Parse {
                reason: "empty input".to_string(),
            });
        }

        let plan_id = Uuid::now_v7().to_string();
        let lower = text.to_lowercase();

        if SEARCH_MARKERS.iter().any(|m| lower.contains(m)) {
            let query = strip_leading_verb(text);
            tracing::debug!(query = %query, "keyword parser built search plan");
            return Ok(Plan::task(
                plan_id,
                vec![Component {
                    id: "s1".to_string(),
                    tool_name: "web_search".to_string(),
                    params: json!({"query": query}),
                    output: OutputDescriptor {
                        kind: "object".to_string(),
                        key: "results".to_string(),
                        description: "search results".to_string(),
                    },
                }],
            ));
        }

        Ok(Plan::chat(plan_id, text))
    }
}

/// Drop a leading search verb ("search for X" -> "X").
fn strip_leading_verb(text: &str) -> String {
    let lower = text.to_lowercase();
    for prefix in ["search for ", "search ", "find ", "look up "] {
        if lower.starts_with(prefix) {
            return text[prefix.len()..].trim().to_string();
        }
    }
    text.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
