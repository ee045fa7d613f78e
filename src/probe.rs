//! Resolution probes.
//!
//! Each strategy is an independent implementation of [`Probe`]; the scenario
//! runner holds them as an ordered list of trait objects and classification
//! never needs to know which strategy produced an observation.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::VerifierError;

mod cwd;
mod identity;
mod loader;
mod oracle;
mod process;
mod tool;

pub use cwd::{CwdProbe, ScopedCwd};
pub use identity::SelfIdentityProbe;
pub use loader::{DynamicImportProbe, LoaderOptions, ModuleLoader, StaticImportProbe};
pub use oracle::{OracleTarget, ShellOracleProbe, DEFAULT_ORACLE_PROGRAM};
pub use process::DEFAULT_TIMEOUT;
pub use tool::{CommandTool, ExternalToolProbe, DEFAULT_REPORT_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SelfIdentity,
    CwdCanonicalize,
    StaticImport,
    DynamicImport,
    ExternalTool,
    ShellOracle,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::SelfIdentity => "self_identity",
            Strategy::CwdCanonicalize => "cwd_canonicalize",
            Strategy::StaticImport => "static_import",
            Strategy::DynamicImport => "dynamic_import",
            Strategy::ExternalTool => "external_tool",
            Strategy::ShellOracle => "shell_oracle",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an observed path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Module URL converted back into a filesystem path.
    ModuleUrl,
    /// In-process OS canonicalization.
    OsCanonicalize,
    /// The raw working directory, kept because canonicalization failed.
    RawCwd,
    /// Out-of-process canonicalization command.
    ShellSubprocess,
    /// Reported by an external tool's load hook.
    ToolHook,
    /// Handed in by the caller, already resolved elsewhere.
    Supplied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedPath {
    pub strategy: Strategy,
    /// Which path of the probe this is (`module dir`, `./dep.mjs`, ...).
    pub label: String,
    pub path: PathBuf,
    pub origin: Origin,
    /// Side information that does not affect classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ObservedPath {
    pub fn new(strategy: Strategy, label: impl Into<String>, path: PathBuf, origin: Origin) -> Self {
        Self {
            strategy,
            label: label.into(),
            path,
            origin,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// One result slot of a probe: either a usable path or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Observed(ObservedPath),
    Unavailable {
        strategy: Strategy,
        label: String,
        reason: String,
    },
}

impl Observation {
    pub fn unavailable(strategy: Strategy, label: impl Into<String>, reason: impl Into<String>) -> Self {
        Observation::Unavailable {
            strategy,
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Degrade a probe failure into an unavailable slot.
    pub fn from_error(strategy: Strategy, label: impl Into<String>, err: &VerifierError) -> Self {
        let reason = match err {
            VerifierError::ProbeUnavailable { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        Observation::unavailable(strategy, label, reason)
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Observation::Observed(observed) => observed.strategy,
            Observation::Unavailable { strategy, .. } => *strategy,
        }
    }

    pub fn observed(&self) -> Option<&ObservedPath> {
        match self {
            Observation::Observed(observed) => Some(observed),
            Observation::Unavailable { .. } => None,
        }
    }
}

/// Inputs handed to each probe of a scenario run.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    /// The sandboxed entry unit as invoked, absolute but not canonicalized.
    pub entry: PathBuf,
    pub loader: ModuleLoader,
    /// Paths observed by the probes that ran before this one, in order.
    pub prior: Vec<ObservedPath>,
}

pub trait Probe {
    fn strategy(&self) -> Strategy;

    /// Exercise the strategy once. Failures become `Observation::Unavailable`
    /// so the run can continue.
    fn probe(&self, context: &ProbeContext) -> Vec<Observation>;
}
