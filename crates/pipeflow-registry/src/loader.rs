//! Loading source text into callable handles.
//!
//! The registry never executes source text directly; it hands the text to a
//! [`ToolLoader`], the seam where a real dylib or wasm loader would plug in.
//! The bundled [`TemplateLoader`] understands the manifest header emitted by
//! the synthesizer and reconstructs a [`SynthesizedTool`] from it.

use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::schema::{ParamSpec, ToolSchema};
use crate::synth::{SynthesizedTool, TemplateFamily, extract_description};
use crate::tool::Tool;

/// Turns stored source text into an invocable handle.
pub trait ToolLoader: Send + Sync {
    /// Load `source` as a callable named `name`.
    ///
    /// Fails with [`RegistryError::LoadError`] when the source does not
    /// define a callable of that name.
    fn load(&self, name: &str, source: &str) -> Result<Arc<dyn Tool>>;
}

// ---------------------------------------------------------------------------
// Template loader
// ---------------------------------------------------------------------------

/// Loader for synthesizer-emitted source text.
pub struct TemplateLoader;

impl ToolLoader for TemplateLoader {
    fn load(&self, name: &str, source: &str) -> Result<Arc<dyn Tool>> {
        let manifest = parse_manifest(source).ok_or_else(|| RegistryError::LoadError {
            name: name.to_string(),
            reason: "source has no pipeflow-tool manifest header".to_string(),
        })?;

        if manifest.name != name {
            return Err(RegistryError::LoadError {
                name: name.to_string(),
                reason: format!("source defines `{}`, not `{name}`", manifest.name),
            });
        }

        let description = extract_description(source);
        Ok(Arc::new(SynthesizedTool::new(
            manifest.name,
            description,
            manifest.family,
            ToolSchema::new(manifest.params),
        )))
    }
}

/// Parsed manifest header data.
struct Manifest {
    name: String,
    family: TemplateFamily,
    params: Vec<ParamSpec>,
}

fn parse_manifest(source: &str) -> Option<Manifest> {
    let mut name = None;
    let mut family = None;
    let mut params = Vec::new();

    for line in source.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("// pipeflow-tool:") {
            for token in rest.split_whitespace() {
                if let Some(v) = token.strip_prefix("name=") {
                    name = Some(v.to_string());
                } else if let Some(v) = token.strip_prefix("family=") {
                    family = TemplateFamily::parse(v);
                }
            }
        } else if let Some(rest) = line.strip_prefix("// param:") {
            if let Some(param) = parse_param_line(rest) {
                params.push(param);
            }
        } else if !line.starts_with("//") && !line.is_empty() {
            // Manifest lines only appear before the first code line.
            break;
        }
    }

    Some(Manifest {
        name: name?,
        family: family?,
        params,
    })
}

/// Parse one `name=<n> type=<t> required=<bool> [default=<json>]` line.
/// The default, when present, is the remainder of the line so JSON values
/// containing spaces survive.
fn parse_param_line(rest: &str) -> Option<ParamSpec> {
    let (head, default) = match rest.find("default=") {
        Some(idx) => {
            let default_text = rest[idx + "default=".len()..].trim();
            let default = serde_json::from_str(default_text).ok()?;
            (&rest[..idx], Some(default))
        }
        None => (rest, None),
    };

    let mut name = None;
    let mut param_type = "any".to_string();
    let mut required = false;

    for token in head.split_whitespace() {
        if let Some(v) = token.strip_prefix("name=") {
            name = Some(v.to_string());
        } else if let Some(v) = token.strip_prefix("type=") {
            param_type = v.to_string();
        } else if let Some(v) = token.strip_prefix("required=") {
            required = v == "true";
        }
    }

    Some(ParamSpec {
        name: name?,
        param_type,
        required,
        default,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
