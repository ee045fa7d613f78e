use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{Observation, ObservedPath, Origin, Probe, ProbeContext, Strategy};
use crate::error::{VerifierError, VerifierResult};

const CWD_LABEL: &str = "cwd";

/// The working directory as seen through the native canonicalization call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CwdProbe;

impl Probe for CwdProbe {
    fn strategy(&self) -> Strategy {
        Strategy::CwdCanonicalize
    }

    fn probe(&self, _context: &ProbeContext) -> Vec<Observation> {
        let strategy = self.strategy();
        let cwd = match env::current_dir() {
            Ok(cwd) => cwd,
            Err(err) => {
                return vec![Observation::unavailable(
                    strategy,
                    CWD_LABEL,
                    format!("read working directory: {err}"),
                )]
            }
        };
        let canonical = fs::canonicalize(&cwd);
        vec![Observation::Observed(observe_cwd(cwd, canonical))]
    }
}

fn observe_cwd(cwd: PathBuf, canonical: io::Result<PathBuf>) -> ObservedPath {
    let strategy = Strategy::CwdCanonicalize;
    match canonical {
        Ok(real) => ObservedPath::new(strategy, CWD_LABEL, real, Origin::OsCanonicalize),
        Err(error) => {
            tracing::warn!(
                cwd = %cwd.display(),
                %error,
                "failed to canonicalize working directory; falling back to raw value"
            );
            ObservedPath::new(strategy, CWD_LABEL, cwd, Origin::RawCwd)
        }
    }
}

/// A working-directory change that is undone when the guard drops.
#[derive(Debug)]
pub struct ScopedCwd {
    original: PathBuf,
}

impl ScopedCwd {
    pub fn enter(target: &Path) -> VerifierResult<Self> {
        let original = env::current_dir().map_err(|err| {
            VerifierError::unavailable(
                Strategy::CwdCanonicalize,
                format!("read working directory: {err}"),
            )
        })?;
        env::set_current_dir(target).map_err(|err| {
            VerifierError::unavailable(
                Strategy::CwdCanonicalize,
                format!("change directory to {}: {err}", target.display()),
            )
        })?;
        tracing::debug!(
            from = %original.display(),
            to = %target.display(),
            "entered scoped working directory"
        );
        Ok(Self { original })
    }

    pub fn original(&self) -> &Path {
        &self.original
    }
}

impl Drop for ScopedCwd {
    fn drop(&mut self) {
        match env::set_current_dir(&self.original) {
            Ok(()) => tracing::debug!(cwd = %self.original.display(), "restored working directory"),
            Err(error) => tracing::warn!(
                cwd = %self.original.display(),
                %error,
                "failed to restore working directory"
            ),
        }
    }
}
