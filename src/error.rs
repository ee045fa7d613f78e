//! Error taxonomy for the verifier core.
//!
//! Only `BoundaryUndetermined` and `ClassificationAmbiguous` are fatal. Every
//! other variant is recovered inside a probe and surfaces as an
//! INDETERMINATE classification.
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::probe::Strategy;

#[derive(Debug, Error)]
pub enum VerifierError {
    /// A resolution strategy could not execute at all.
    #[error("{strategy} probe unavailable: {reason}")]
    ProbeUnavailable { strategy: Strategy, reason: String },

    /// The environment signal was present but did not name a usable boundary.
    #[error("sandbox boundary undetermined: {0}")]
    BoundaryUndetermined(String),

    /// A probe handed the classifier a path that cannot be compared to the boundary.
    #[error("cannot classify non-absolute path {}", path.display())]
    ClassificationAmbiguous { path: PathBuf },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}ms", timeout.as_millis())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with {status}")]
    Exited { program: String, status: String },
}

impl VerifierError {
    pub fn unavailable(strategy: Strategy, reason: impl Into<String>) -> Self {
        VerifierError::ProbeUnavailable {
            strategy,
            reason: reason.into(),
        }
    }
}

pub type VerifierResult<T> = std::result::Result<T, VerifierError>;
