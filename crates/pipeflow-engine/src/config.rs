//! Engine configuration.
//!
//! Recognized environment variables:
//!
//! - `PIPEFLOW_CATALOG_URL` — SQLite path for the tool catalog
//!   (default `data/pipeflow.db`)
//! - `PIPEFLOW_SYNTH_MODEL` — model identifier for the remote synthesis
//!   back-end; unset means the deterministic template back-end
//! - `PIPEFLOW_SYNTH_API_KEY` / `PIPEFLOW_SYNTH_API_BASE` — remote back-end
//!   credentials
//! - `PIPEFLOW_STATIC_DIR` — directory mirroring synthesized source text
//! - `PIPEFLOW_MAX_SYNTH_DEPTH` — cap on syntheses per plan run (default 5)
//! - `PIPEFLOW_NODE_TIMEOUT_SECS` — per-node timeout (default unbounded)

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite path for the tool catalog.
    pub catalog_url: String,

    /// Model identifier passed to the remote synthesis back-end.  `None`
    /// selects the deterministic template back-end.
    pub synth_model: Option<String>,

    /// API key for the remote synthesis back-end.
    pub synth_api_key: Option<String>,

    /// Base URL of the remote synthesis back-end.
    pub synth_api_base: String,

    /// Directory mirroring synthesized source text to disk.
    pub static_dir: Option<PathBuf>,

    /// Maximum consecutive synthesis attempts per plan run.
    pub max_synth_depth: u32,

    /// Per-node execution timeout; `None` means unbounded.
    pub node_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_url: "data/pipeflow.db".to_string(),
            synth_model: None,
            synth_api_key: None,
            synth_api_base: "https://api.openai.com/v1".to_string(),
            static_dir: None,
            max_synth_depth: 5,
            node_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = env_non_empty("PIPEFLOW_CATALOG_URL") {
            config.catalog_url = url;
        }
        config.synth_model = env_non_empty("PIPEFLOW_SYNTH_MODEL");
        config.synth_api_key = env_non_empty("PIPEFLOW_SYNTH_API_KEY");
        if let Some(base) = env_non_empty("PIPEFLOW_SYNTH_API_BASE") {
            config.synth_api_base = base;
        }
        config.static_dir = env_non_empty("PIPEFLOW_STATIC_DIR").map(PathBuf::from);

        if let Some(depth) = env_non_empty("PIPEFLOW_MAX_SYNTH_DEPTH") {
            match depth.parse() {
                Ok(depth) => config.max_synth_depth = depth,
                Err(_) => {
                    tracing::warn!(value = %depth, "invalid PIPEFLOW_MAX_SYNTH_DEPTH, using default")
                }
            }
        }

        if let Some(secs) = env_non_empty("PIPEFLOW_NODE_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => config.node_timeout = Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(value = %secs, "invalid PIPEFLOW_NODE_TIMEOUT_SECS, ignoring")
                }
            }
        }

        config
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
