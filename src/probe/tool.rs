//! Observation of paths an embedded third-party tool loads.
//!
//! The tool is opaque. It reports each file it loads through a hook and the
//! verifier only records what it is told.
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::process::run_with_timeout;
use super::{Observation, ObservedPath, Origin, Probe, ProbeContext, Strategy};
use crate::error::{VerifierError, VerifierResult};
use crate::util::absolutize;

pub const DEFAULT_REPORT_PREFIX: &str = "load:";

/// Callback invoked once per file the tool resolves.
pub trait LoadHook {
    fn on_load(&mut self, path: &Path);
}

pub trait ExternalTool {
    fn name(&self) -> &str;

    /// Run the tool to completion, reporting every loaded file to `hook`.
    ///
    /// Files reported before a failure stay reported.
    fn run(&self, hook: &mut dyn LoadHook) -> VerifierResult<()>;
}

/// Hook that records loaded paths, optionally keeping only those matching `filter`.
#[derive(Debug, Default)]
pub struct CapturingHook {
    filter: Option<Regex>,
    paths: Vec<PathBuf>,
}

impl CapturingHook {
    pub fn new(filter: Option<Regex>) -> Self {
        Self {
            filter,
            paths: Vec::new(),
        }
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

impl LoadHook for CapturingHook {
    fn on_load(&mut self, path: &Path) {
        if let Some(filter) = &self.filter {
            if !filter.is_match(&path.to_string_lossy()) {
                return;
            }
        }
        self.paths.push(path.to_path_buf());
    }
}

/// A tool run as a subprocess that prints `<prefix><path>` for each file it loads.
///
/// Relative reported paths are resolved against the working directory the
/// tool ran in.
#[derive(Debug, Clone)]
pub struct CommandTool {
    argv: Vec<String>,
    report_prefix: String,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(argv: Vec<String>, report_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            argv,
            report_prefix: report_prefix.into(),
            timeout,
        }
    }
}

impl ExternalTool for CommandTool {
    fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("tool")
    }

    fn run(&self, hook: &mut dyn LoadHook) -> VerifierResult<()> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(VerifierError::unavailable(
                Strategy::ExternalTool,
                "no tool command configured",
            ));
        };
        let program = which::which(program).map_err(|err| {
            VerifierError::unavailable(Strategy::ExternalTool, format!("locate {program}: {err}"))
        })?;
        let cwd = env::current_dir().map_err(|err| {
            VerifierError::unavailable(
                Strategy::ExternalTool,
                format!("read working directory: {err}"),
            )
        })?;

        let mut command = Command::new(&program);
        command.args(args).current_dir(&cwd);
        tracing::info!(program = %program.display(), cwd = %cwd.display(), "running external tool");
        let output = run_with_timeout(command, self.timeout)?;
        if !output.stderr.trim().is_empty() {
            tracing::debug!(stderr = %output.stderr.trim(), "external tool stderr");
        }

        for line in output.stdout.lines() {
            let Some(reported) = line.strip_prefix(self.report_prefix.as_str()) else {
                continue;
            };
            let reported = reported.trim();
            if reported.is_empty() {
                continue;
            }
            hook.on_load(&absolutize(Path::new(reported), &cwd));
        }
        output.into_success()?;
        Ok(())
    }
}

pub struct ExternalToolProbe {
    tool: Box<dyn ExternalTool>,
    filter: Option<Regex>,
}

impl ExternalToolProbe {
    pub fn new(tool: Box<dyn ExternalTool>, filter: Option<Regex>) -> Self {
        Self { tool, filter }
    }
}

impl Probe for ExternalToolProbe {
    fn strategy(&self) -> Strategy {
        Strategy::ExternalTool
    }

    fn probe(&self, _context: &ProbeContext) -> Vec<Observation> {
        let strategy = self.strategy();
        let name = self.tool.name().to_string();
        let mut hook = CapturingHook::new(self.filter.clone());
        let result = self.tool.run(&mut hook);
        let mut observations: Vec<Observation> = hook
            .into_paths()
            .into_iter()
            .map(|path| {
                Observation::Observed(ObservedPath::new(
                    strategy,
                    name.as_str(),
                    path,
                    Origin::ToolHook,
                ))
            })
            .collect();
        match result {
            Err(err) => {
                tracing::warn!(
                    tool = %name,
                    error = %err,
                    reported = observations.len(),
                    "external tool failed"
                );
                observations.push(Observation::from_error(strategy, name, &err));
            }
            Ok(()) if observations.is_empty() => {
                observations.push(Observation::unavailable(
                    strategy,
                    name,
                    "tool reported no loaded files",
                ));
            }
            Ok(()) => {}
        }
        observations
    }
}
