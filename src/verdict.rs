//! Scenario verdict aggregation.
use serde::Serialize;
use std::fmt;

use crate::classify::{Classification, ClassificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    BugReproduced,
    NoEscape,
}

impl Outcome {
    /// Process exit code carrying this outcome.
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::NoEscape => 0,
            Outcome::BugReproduced => 1,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::BugReproduced => f.write_str("BUG_REPRODUCED"),
            Outcome::NoEscape => f.write_str("NO_ESCAPE"),
        }
    }
}

/// Final result of one scenario run. Only [`aggregate`] constructs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioVerdict {
    outcome: Outcome,
    escaped: usize,
    contained: usize,
    indeterminate: usize,
    /// Every classification, in probe invocation order.
    evidence: Vec<Classification>,
}

impl ScenarioVerdict {
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn evidence(&self) -> &[Classification] {
        &self.evidence
    }

    /// The classifications that justify a BUG_REPRODUCED outcome.
    pub fn offending(&self) -> impl Iterator<Item = &Classification> {
        self.evidence.iter().filter(|entry| entry.is_escaped())
    }

    /// Entries that could not be observed; reported as warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Classification> {
        self.evidence.iter().filter(|entry| entry.is_indeterminate())
    }

    pub fn has_warnings(&self) -> bool {
        self.indeterminate > 0
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.escaped, self.contained, self.indeterminate)
    }
}

/// Fold classifications into a verdict.
///
/// One escaped path is enough to fail. Indeterminate entries never flip the
/// outcome on their own.
pub fn aggregate(classifications: Vec<Classification>) -> ScenarioVerdict {
    let mut escaped = 0;
    let mut contained = 0;
    let mut indeterminate = 0;
    for classification in &classifications {
        match classification.status {
            ClassificationStatus::Escaped => escaped += 1,
            ClassificationStatus::Contained => contained += 1,
            ClassificationStatus::Indeterminate => indeterminate += 1,
        }
    }
    let outcome = if escaped > 0 {
        Outcome::BugReproduced
    } else {
        Outcome::NoEscape
    };
    ScenarioVerdict {
        outcome,
        escaped,
        contained,
        indeterminate,
        evidence: classifications,
    }
}
