//! CLI argument parsing for the sandbox verifier.
//!
//! The CLI only gathers inputs; boundary resolution, probing and
//! classification live in their own modules.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::boundary::{ModeSelection, DEFAULT_SOURCE_TREE_ENV};
use crate::probe::Strategy;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "sbv",
    version,
    about = "Check whether module resolution escapes a symlinked build sandbox",
    after_help = "Exit codes:\n  0  NO_ESCAPE\n  1  BUG_REPRODUCED\n  2  fatal error (boundary undetermined, ambiguous path, bad config)\n\nExamples:\n  sbv check --preset dirname-escape --entry ./entry.mjs\n  sbv check --scenario scenarios/esm.json --json\n  sbv check --preset vitest --entry ./entry.mjs --tool-command 'npx vitest run'\n  sbv classify --mode test /tmp/x/bin.runfiles/_main/a.mjs\n  sbv presets",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log probe activity to stderr (debug level unless RUST_LOG is set)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Check(CheckArgs),
    Classify(ClassifyArgs),
    Presets,
}

/// Inputs that decide the sandbox boundary.
#[derive(Args, Debug, Clone)]
pub struct BoundaryArgs {
    /// How to pick the execution mode
    #[arg(long, value_enum, default_value_t = ModeSelection::Auto)]
    pub mode: ModeSelection,

    /// Environment variable naming the source tree in run mode
    #[arg(long, value_name = "VAR", default_value = DEFAULT_SOURCE_TREE_ENV)]
    pub source_env: String,

    /// Sandbox landmark for test mode (repeatable; replaces scenario landmarks)
    #[arg(long = "landmark", value_name = "TEXT")]
    pub landmarks: Vec<String>,
}

/// Run a scenario's probes and report whether any path escaped.
#[derive(Parser, Debug)]
#[command(about = "Run a scenario and report whether resolution escaped the sandbox")]
pub struct CheckArgs {
    /// Scenario file (JSON)
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with = "preset",
        required_unless_present = "preset"
    )]
    pub scenario: Option<PathBuf>,

    /// Built-in scenario name (see `sbv presets`)
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Entry unit; required with --preset, overrides the scenario's entry otherwise
    #[arg(long, value_name = "PATH")]
    pub entry: Option<PathBuf>,

    /// Command for tool-driven presets, split with shell quoting rules
    #[arg(long, value_name = "CMD", requires = "preset")]
    pub tool_command: Option<String>,

    /// Keep symlinked paths for imported modules
    #[arg(long)]
    pub preserve_symlinks: bool,

    /// Keep the symlinked path of the entry module
    #[arg(long)]
    pub preserve_symlinks_main: bool,

    /// Turn on the external tool's own symlink-preserving option
    #[arg(long, requires = "preset")]
    pub tool_preserve_symlinks: bool,

    #[command(flatten)]
    pub boundary: BoundaryArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to this path
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

/// Classify paths gathered elsewhere against the resolved boundary.
#[derive(Parser, Debug)]
#[command(about = "Classify already-resolved paths against the sandbox boundary")]
pub struct ClassifyArgs {
    /// Strategy the paths are attributed to in the report
    #[arg(long, value_enum, default_value_t = Strategy::ExternalTool)]
    pub strategy: Strategy,

    #[command(flatten)]
    pub boundary: BoundaryArgs,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Absolute paths to classify
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}
