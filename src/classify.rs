//! Per-path escape classification.
//!
//! Classification is strategy-agnostic: it sees a boundary and one
//! observation, nothing else.
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::boundary::Boundary;
use crate::error::{VerifierError, VerifierResult};
use crate::probe::{Observation, Origin, Strategy};
use crate::util::normalize_lexically;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationStatus {
    Contained,
    Escaped,
    Indeterminate,
}

impl fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationStatus::Contained => f.write_str("CONTAINED"),
            ClassificationStatus::Escaped => f.write_str("ESCAPED"),
            ClassificationStatus::Indeterminate => f.write_str("INDETERMINATE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub strategy: Strategy,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    pub status: ClassificationStatus,
    /// Why this status was chosen; never empty.
    pub evidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Classification {
    pub fn is_escaped(&self) -> bool {
        self.status == ClassificationStatus::Escaped
    }

    pub fn is_indeterminate(&self) -> bool {
        self.status == ClassificationStatus::Indeterminate
    }
}

/// Classify one observation against the boundary.
///
/// A relative path is a probe contract violation and fails instead of being
/// guessed at.
pub fn classify(boundary: &Boundary, observation: &Observation) -> VerifierResult<Classification> {
    let observed = match observation {
        Observation::Observed(observed) => observed,
        Observation::Unavailable {
            strategy,
            label,
            reason,
        } => {
            return Ok(Classification {
                strategy: *strategy,
                label: label.clone(),
                path: None,
                origin: None,
                status: ClassificationStatus::Indeterminate,
                evidence: format!("no usable path: {reason}"),
                note: None,
            })
        }
    };
    if !observed.path.is_absolute() {
        return Err(VerifierError::ClassificationAmbiguous {
            path: observed.path.clone(),
        });
    }

    let (status, evidence) = match boundary {
        Boundary::Run { source_tree } => classify_against_source_tree(&observed.path, source_tree),
        Boundary::Test { landmarks } => classify_against_landmarks(&observed.path, landmarks),
    };
    Ok(Classification {
        strategy: observed.strategy,
        label: observed.label.clone(),
        path: Some(observed.path.clone()),
        origin: Some(observed.origin),
        status,
        evidence,
        note: observed.note.clone(),
    })
}

fn classify_against_source_tree(path: &Path, source_tree: &Path) -> (ClassificationStatus, String) {
    // Component-wise: `/src2` is not inside `/src`.
    let normalized = normalize_lexically(path);
    let source_tree = normalize_lexically(source_tree);
    if normalized.starts_with(&source_tree) {
        (
            ClassificationStatus::Escaped,
            format!(
                "{} is inside source tree {}",
                path.display(),
                source_tree.display()
            ),
        )
    } else {
        (
            ClassificationStatus::Contained,
            format!(
                "{} is outside source tree {}",
                path.display(),
                source_tree.display()
            ),
        )
    }
}

fn classify_against_landmarks(path: &Path, landmarks: &[String]) -> (ClassificationStatus, String) {
    // A trailing separator lets `dir/` landmarks match the directory itself.
    let mut text = path.to_string_lossy().into_owned();
    if !text.ends_with('/') {
        text.push('/');
    }
    match landmarks.iter().find(|landmark| text.contains(landmark.as_str())) {
        Some(landmark) => (
            ClassificationStatus::Contained,
            format!("{} contains landmark {landmark:?}", path.display()),
        ),
        None => (
            ClassificationStatus::Escaped,
            format!(
                "{} lacks every sandbox landmark ({})",
                path.display(),
                landmarks
                    .iter()
                    .map(|landmark| format!("{landmark:?}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ),
    }
}
