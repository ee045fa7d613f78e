//! Sandbox boundary derivation.
//!
//! The boundary is computed once per run from the environment signal and the
//! explicit mode selection, with no filesystem access.
use crate::error::{VerifierError, VerifierResult};
use crate::util::normalize_lexically;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Variable that names the authoritative source tree when running outside a test sandbox.
pub const DEFAULT_SOURCE_TREE_ENV: &str = "BUILD_WORKSPACE_DIRECTORY";

/// Landmarks inserted by the isolation mechanism into every materialized path.
pub const DEFAULT_LANDMARKS: &[&str] = &[".runfiles/", "/execroot/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Run,
    Test,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Run => f.write_str("run"),
            ExecutionMode::Test => f.write_str("test"),
        }
    }
}

/// How the caller wants the execution mode decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ModeSelection {
    /// Derive the mode from the presence of the source-tree signal.
    #[default]
    Auto,
    /// Require the source-tree signal.
    Run,
    /// Ignore any source-tree signal and check landmarks.
    Test,
}

/// Raw inputs to boundary resolution, captured once from the environment.
#[derive(Debug, Clone)]
pub struct ModeSignal {
    pub selection: ModeSelection,
    pub source_tree: Option<OsString>,
    pub landmarks: Vec<String>,
}

impl ModeSignal {
    pub fn from_env(selection: ModeSelection, var: &str, landmarks: Vec<String>) -> Self {
        Self {
            selection,
            source_tree: std::env::var_os(var),
            landmarks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Boundary {
    /// RUN mode: any observed path inside this directory has escaped.
    Run { source_tree: PathBuf },
    /// TEST mode: an observed path lacking every landmark has escaped.
    Test { landmarks: Vec<String> },
}

impl Boundary {
    pub fn mode(&self) -> ExecutionMode {
        match self {
            Boundary::Run { .. } => ExecutionMode::Run,
            Boundary::Test { .. } => ExecutionMode::Test,
        }
    }

    pub fn source_tree(source_tree: &Path) -> VerifierResult<Self> {
        if !source_tree.is_absolute() {
            return Err(VerifierError::BoundaryUndetermined(format!(
                "source tree {} is not an absolute path",
                source_tree.display()
            )));
        }
        Ok(Boundary::Run {
            source_tree: normalize_lexically(source_tree),
        })
    }

    pub fn landmarks<I, S>(landmarks: I) -> VerifierResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let landmarks: Vec<String> = landmarks
            .into_iter()
            .map(Into::into)
            .filter(|landmark| !landmark.trim().is_empty())
            .collect();
        if landmarks.is_empty() {
            return Err(VerifierError::BoundaryUndetermined(
                "test mode requires at least one non-empty landmark".to_string(),
            ));
        }
        Ok(Boundary::Test { landmarks })
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Run { source_tree } => write!(f, "source tree {}", source_tree.display()),
            Boundary::Test { landmarks } => write!(f, "landmark {}", landmarks.join(" | ")),
        }
    }
}

/// Derive the boundary for this run.
///
/// An empty signal value counts as absent. A present value that is not an
/// absolute path is fatal.
pub fn resolve(signal: &ModeSignal) -> VerifierResult<Boundary> {
    let source_tree = signal
        .source_tree
        .as_ref()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);

    let landmarks = || {
        if signal.landmarks.is_empty() {
            Boundary::landmarks(DEFAULT_LANDMARKS.iter().copied())
        } else {
            Boundary::landmarks(signal.landmarks.iter().cloned())
        }
    };

    let boundary = match (signal.selection, source_tree) {
        (ModeSelection::Test, Some(path)) => {
            tracing::info!(
                ignored = %path.display(),
                "test mode selected explicitly; ignoring source tree signal"
            );
            landmarks()?
        }
        (ModeSelection::Test, None) | (ModeSelection::Auto, None) => landmarks()?,
        (ModeSelection::Run, None) => {
            return Err(VerifierError::BoundaryUndetermined(
                "run mode selected but no source tree signal is set".to_string(),
            ))
        }
        (ModeSelection::Run, Some(path)) | (ModeSelection::Auto, Some(path)) => {
            Boundary::source_tree(&path)?
        }
    };
    tracing::debug!(mode = %boundary.mode(), boundary = %boundary, "resolved sandbox boundary");
    Ok(boundary)
}
