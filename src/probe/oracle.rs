//! Out-of-process canonicalization used as ground truth.
//!
//! Nothing in this process can intercept the result, so it stays valid
//! whether or not the embedding environment patches path resolution.
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::process::{run_with_timeout, CapturedOutput};
use super::{Observation, ObservedPath, Origin, Probe, ProbeContext, Strategy};

pub const DEFAULT_ORACLE_PROGRAM: &str = "realpath";

/// What the oracle should canonicalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleTarget {
    /// The working directory at the time the probe runs.
    Cwd,
    /// The entry unit as invoked.
    Entry,
    /// Every path observed earlier in the run, cross-checked in place.
    Observed,
    Path(PathBuf),
}

/// One canonicalization the oracle will attempt.
struct Request {
    label: String,
    target: Result<PathBuf, String>,
    /// Set when the result is compared against an earlier observation
    /// instead of being reported as a path of its own.
    cross_check: Option<ObservedPath>,
}

impl Request {
    fn direct(label: String, target: Result<PathBuf, String>) -> Self {
        Self {
            label,
            target,
            cross_check: None,
        }
    }
}

impl OracleTarget {
    fn requests(&self, context: &ProbeContext) -> Vec<Request> {
        match self {
            OracleTarget::Cwd => vec![Request::direct(
                "realpath cwd".to_string(),
                env::current_dir().map_err(|err| format!("read working directory: {err}")),
            )],
            OracleTarget::Entry => vec![Request::direct(
                "realpath entry".to_string(),
                Ok(context.entry.clone()),
            )],
            OracleTarget::Observed => {
                let requests: Vec<Request> = context
                    .prior
                    .iter()
                    .filter(|observed| observed.strategy != Strategy::ShellOracle)
                    .map(|observed| Request {
                        label: format!("realpath {}:{}", observed.strategy, observed.label),
                        target: Ok(observed.path.clone()),
                        cross_check: Some(observed.clone()),
                    })
                    .collect();
                if requests.is_empty() {
                    vec![Request::direct(
                        "realpath observed".to_string(),
                        Err("no earlier observations to cross-check".to_string()),
                    )]
                } else {
                    requests
                }
            }
            OracleTarget::Path(path) => {
                let label = format!("realpath {}", path.display());
                let target = if path.is_absolute() {
                    Ok(path.clone())
                } else {
                    Err(format!("oracle target {} is not absolute", path.display()))
                };
                vec![Request::direct(label, target)]
            }
        }
    }
}

/// Keep the in-process path under judgment and record what the oracle saw.
///
/// A sandbox that preserves symlinks disagrees with `realpath` by
/// construction, so disagreement alone never decides an escape.
fn cross_checked(observed: &ObservedPath, label: String, canonical: &Path) -> ObservedPath {
    let note = if canonical == observed.path {
        "realpath agrees".to_string()
    } else {
        format!(
            "realpath resolves to {}; the in-process path did not follow every symlink",
            canonical.display()
        )
    };
    ObservedPath::new(Strategy::ShellOracle, label, observed.path.clone(), observed.origin)
        .with_note(note)
}

#[derive(Debug, Clone)]
pub struct ShellOracleProbe {
    program: String,
    targets: Vec<OracleTarget>,
    timeout: Duration,
}

impl ShellOracleProbe {
    pub fn new(program: impl Into<String>, targets: Vec<OracleTarget>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            targets,
            timeout,
        }
    }

    fn canonicalize(&self, program: &Path, target: &Path) -> Result<PathBuf, String> {
        let mut command = Command::new(program);
        command.arg(target);
        let output = run_with_timeout(command, self.timeout)
            .and_then(CapturedOutput::into_success)
            .map_err(|err| err.to_string())?;
        parse_single_line(&output.stdout)
    }
}

fn parse_single_line(stdout: &str) -> Result<PathBuf, String> {
    let text = stdout.trim();
    if text.is_empty() {
        return Err("oracle produced no output".to_string());
    }
    if text.contains('\n') {
        return Err("oracle produced more than one line".to_string());
    }
    let path = PathBuf::from(text);
    if !path.is_absolute() {
        return Err(format!("oracle produced non-absolute path {text:?}"));
    }
    Ok(path)
}

impl Probe for ShellOracleProbe {
    fn strategy(&self) -> Strategy {
        Strategy::ShellOracle
    }

    fn probe(&self, context: &ProbeContext) -> Vec<Observation> {
        let strategy = self.strategy();
        let requests: Vec<Request> = self
            .targets
            .iter()
            .flat_map(|target| target.requests(context))
            .collect();
        let program = match which::which(&self.program) {
            Ok(program) => program,
            Err(err) => {
                let reason = format!("locate {}: {err}", self.program);
                return requests
                    .into_iter()
                    .map(|request| Observation::unavailable(strategy, request.label, reason.as_str()))
                    .collect();
            }
        };

        requests
            .into_iter()
            .map(|request| {
                let Request {
                    label,
                    target,
                    cross_check,
                } = request;
                match target.and_then(|path| self.canonicalize(&program, &path)) {
                    Ok(path) => {
                        tracing::debug!(%label, path = %path.display(), "oracle resolved");
                        let observed = match &cross_check {
                            Some(observed) => cross_checked(observed, label, &path),
                            None => ObservedPath::new(strategy, label, path, Origin::ShellSubprocess),
                        };
                        Observation::Observed(observed)
                    }
                    Err(reason) => {
                        tracing::warn!(%label, %reason, "oracle unavailable");
                        Observation::unavailable(strategy, label, reason)
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ModuleLoader;
    use crate::probe::process::DEFAULT_TIMEOUT;

    fn context(entry: PathBuf) -> ProbeContext {
        ProbeContext {
            entry,
            prior: Vec::new(),
            loader: ModuleLoader::default(),
        }
    }

    #[test]
    fn parses_single_absolute_line() {
        assert_eq!(
            parse_single_line("/a/b\n").unwrap(),
            PathBuf::from("/a/b")
        );
        assert!(parse_single_line("").is_err());
        assert!(parse_single_line("  \n").is_err());
        assert!(parse_single_line("/a\n/b\n").is_err());
        assert!(parse_single_line("relative/path\n").is_err());
    }

    #[test]
    fn missing_program_is_indeterminate_for_every_target() {
        let probe = ShellOracleProbe::new(
            "sbv-no-such-realpath",
            vec![OracleTarget::Cwd, OracleTarget::Entry],
            DEFAULT_TIMEOUT,
        );
        let observations = probe.probe(&context(PathBuf::from("/x/entry.mjs")));
        assert_eq!(observations.len(), 2);
        assert!(observations
            .iter()
            .all(|observation| matches!(observation, Observation::Unavailable { .. })));
    }

    #[test]
    fn relative_target_is_indeterminate() {
        let Ok(_) = which::which(DEFAULT_ORACLE_PROGRAM) else {
            return;
        };
        let probe = ShellOracleProbe::new(
            DEFAULT_ORACLE_PROGRAM,
            vec![OracleTarget::Path(PathBuf::from("rel/entry.mjs"))],
            DEFAULT_TIMEOUT,
        );
        let observations = probe.probe(&context(PathBuf::from("/x/entry.mjs")));
        assert!(matches!(
            &observations[0],
            Observation::Unavailable { reason, .. } if reason.contains("not absolute")
        ));
    }

    #[test]
    fn observed_target_without_earlier_paths_is_indeterminate() {
        let probe = ShellOracleProbe::new(
            DEFAULT_ORACLE_PROGRAM,
            vec![OracleTarget::Observed],
            DEFAULT_TIMEOUT,
        );
        let observations = probe.probe(&context(PathBuf::from("/x/entry.mjs")));
        assert_eq!(observations.len(), 1);
        assert!(matches!(
            &observations[0],
            Observation::Unavailable { label, .. } if label == "realpath observed"
        ));
    }

    #[test]
    fn observed_target_deserializes_from_snake_case() {
        let targets: Vec<OracleTarget> =
            serde_json::from_str(r#"["cwd", "observed", {"path": "/a"}]"#).unwrap();
        assert_eq!(
            targets,
            vec![
                OracleTarget::Cwd,
                OracleTarget::Observed,
                OracleTarget::Path(PathBuf::from("/a"))
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn cross_check_notes_disagreement_and_keeps_in_process_path() {
        use crate::test_support::SymlinkSandbox;

        let Ok(_) = which::which(DEFAULT_ORACLE_PROGRAM) else {
            return;
        };
        let sandbox = SymlinkSandbox::new();
        let mut context = context(sandbox.sandbox_file("entry.mjs"));
        context.prior = vec![
            ObservedPath::new(
                Strategy::SelfIdentity,
                "module file",
                sandbox.sandbox_file("entry.mjs"),
                Origin::ModuleUrl,
            ),
            ObservedPath::new(
                Strategy::StaticImport,
                "./dep.mjs",
                sandbox.source_file("dep.mjs"),
                Origin::ModuleUrl,
            ),
            ObservedPath::new(
                Strategy::ShellOracle,
                "realpath cwd",
                sandbox.sandbox_dir(),
                Origin::ShellSubprocess,
            ),
        ];
        let probe = ShellOracleProbe::new(
            DEFAULT_ORACLE_PROGRAM,
            vec![OracleTarget::Observed],
            DEFAULT_TIMEOUT,
        );
        let observations = probe.probe(&context);

        // Earlier oracle results are not checked against themselves.
        assert_eq!(observations.len(), 2);
        let symlinked = observations[0].observed().unwrap();
        assert_eq!(symlinked.strategy, Strategy::ShellOracle);
        assert_eq!(symlinked.label, "realpath self_identity:module file");
        assert_eq!(symlinked.path, sandbox.sandbox_file("entry.mjs"));
        assert_eq!(symlinked.origin, Origin::ModuleUrl);
        let note = symlinked.note.as_deref().unwrap();
        assert!(
            note.contains(&sandbox.source_file("entry.mjs").display().to_string()),
            "{note}"
        );

        let resolved = observations[1].observed().unwrap();
        assert_eq!(resolved.path, sandbox.source_file("dep.mjs"));
        assert_eq!(resolved.note.as_deref(), Some("realpath agrees"));
    }

    #[cfg(unix)]
    #[test]
    fn resolves_symlinked_entry_to_source() {
        use crate::test_support::SymlinkSandbox;

        let Ok(_) = which::which(DEFAULT_ORACLE_PROGRAM) else {
            return;
        };
        let sandbox = SymlinkSandbox::new();
        let probe = ShellOracleProbe::new(
            DEFAULT_ORACLE_PROGRAM,
            vec![OracleTarget::Entry],
            DEFAULT_TIMEOUT,
        );
        let observations = probe.probe(&context(sandbox.sandbox_file("entry.mjs")));
        assert_eq!(
            observations,
            vec![Observation::Observed(ObservedPath::new(
                Strategy::ShellOracle,
                "realpath entry",
                sandbox.source_file("entry.mjs"),
                Origin::ShellSubprocess,
            ))]
        );
    }
}
