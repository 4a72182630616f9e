//! CLI argument definitions for Pipeflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand};

/// Pipeflow -- a natural-language task orchestrator.
#[derive(Parser)]
#[command(
    name = "pipeflow",
    version,
    about = "Pipeflow -- natural-language task orchestrator",
    long_about = "Decomposes a free-form request into a plan of tool invocations, resolves \
                  data dependencies between steps, synthesizes missing tools on demand, and \
                  streams progress events while it runs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task from a free-form utterance, streaming NDJSON events.
    Run {
        /// The utterance to execute.
        text: String,

        /// Print only the aggregate final result as JSON instead of the
        /// event stream.
        #[arg(long)]
        sync: bool,
    },

    /// List all registered tools.
    Tools,
}
