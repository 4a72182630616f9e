//! Synthesis back-ends.
//!
//! The core treats the synthesis back-end as an opaque function from
//! `(name, parameters, existing?)` to source text.  Two implementations are
//! bundled: the deterministic [`TemplateBackend`] (default) and a
//! [`RemoteBackend`] that asks an OpenAI-compatible chat endpoint for the
//! implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{RegistryError, Result};
use crate::schema::{ParamSpec, ToolSchema};
use crate::synth::{TemplateFamily, render_source};

/// A synthesis request: what to emit.
#[derive(Debug, Clone)]
pub struct SynthRequest {
    /// The tool name — the emitted text must define a callable of this name.
    pub name: String,
    /// The behavior family chosen from the name.
    pub family: TemplateFamily,
    /// The merged parameter list, in final signature order.
    pub params: Vec<ParamSpec>,
    /// Prior schema when an existing tool is being extended.
    pub existing: Option<ToolSchema>,
}

/// Back-end contract: produce source text defining a callable named
/// `request.name`.
#[async_trait]
pub trait SynthBackend: Send + Sync {
    async fn synthesize(&self, request: &SynthRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Template back-end
// ---------------------------------------------------------------------------

/// Deterministic template emission; never fails for a well-formed request.
pub struct TemplateBackend;

#[async_trait]
impl SynthBackend for TemplateBackend {
    async fn synthesize(&self, request: &SynthRequest) -> Result<String> {
        Ok(render_source(request))
    }
}

// ---------------------------------------------------------------------------
// Remote back-end
// ---------------------------------------------------------------------------

/// Synthesis through an OpenAI-compatible `/chat/completions` endpoint.
pub struct RemoteBackend {
    http: reqwest::Client,
    model: String,
    api_key: String,
    api_base: String,
}

impl RemoteBackend {
    /// Create a remote back-end for the given endpoint.
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            model: model.into(),
            api_key: api_key.into(),
            api_base: api_base.into(),
        }
    }

    fn build_prompt(request: &SynthRequest) -> String {
        let params = request
            .params
            .iter()
            .map(|p| format!("- `{}` ({}, required: {})", p.name, p.param_type, p.required))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "Implement a tool named `{}` in the `{}` family.\n\nParameters:\n{params}\n\n\
             Emit only the source text, starting with the standard pipeflow manifest header.",
            request.name,
            request.family.as_str(),
        );

        if let Some(existing) = &request.existing {
            prompt.push_str(&format!(
                "\n\nA prior tool of this name exists with parameters {:?}; keep those names \
                 and positions and give any new parameters defaults.",
                existing.names()
            ));
        }

        prompt
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl SynthBackend for RemoteBackend {
    async fn synthesize(&self, request: &SynthRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You generate tool implementations. Respond with source text only, \
                                no explanations.",
                },
                { "role": "user", "content": Self::build_prompt(request) },
            ],
            "temperature": 0.1,
            "max_tokens": 1024,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::SynthesisError {
                reason: format!("synthesis endpoint returned {status}: {body}"),
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| RegistryError::SynthesisError {
                reason: "synthesis endpoint returned no choices".to_string(),
            })?;

        Ok(extract_code_block(content).to_string())
    }
}

/// Strip markdown code fences the model may wrap the source in, despite
/// instructions.
fn extract_code_block(text: &str) -> &str {
    let trimmed = text.trim();

    for tag in ["```rust", "```"] {
        if let Some(start) = trimmed.find(tag) {
            let body_start = start + tag.len();
            if let Some(end) = trimmed[body_start..].find("```") {
                return trimmed[body_start..body_start + end].trim();
            }
        }
    }

    trimmed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
